use crate::error::{Error, Result};
use crate::token::{Token, TokenKind};

/// Scan raw source bytes into a flat token stream.
///
/// Number tokens are lexed greedily (`0x` switches to hex mode) but not
/// validated here; the dialect rules for immediates live in the analyzer.
pub fn lex(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        match byte {
            b' ' | b'\t' | b'\n' | b'\r' => i += 1,
            b',' => {
                tokens.push(Token::new(TokenKind::Comma, ","));
                i += 1;
            }
            b':' => {
                tokens.push(Token::new(TokenKind::Colon, ":"));
                i += 1;
            }
            b'(' => {
                tokens.push(Token::new(TokenKind::LeftParen, "("));
                i += 1;
            }
            b')' => {
                tokens.push(Token::new(TokenKind::RightParen, ")"));
                i += 1;
            }
            b'{' => {
                tokens.push(Token::new(TokenKind::LeftBrace, "{"));
                i += 1;
            }
            b'}' => {
                tokens.push(Token::new(TokenKind::RightBrace, "}"));
                i += 1;
            }
            b'[' => {
                tokens.push(Token::new(TokenKind::LeftBracket, "["));
                i += 1;
            }
            b']' => {
                tokens.push(Token::new(TokenKind::RightBracket, "]"));
                i += 1;
            }
            b'"' => {
                let start = i;
                i += 1;
                loop {
                    match bytes.get(i).copied() {
                        None | Some(b'\n') => {
                            return Err(Error::UnterminatedString(start))
                        }
                        Some(b'"') => break,
                        Some(_) => i += 1,
                    }
                }
                tokens.push(Token::new(
                    TokenKind::Str,
                    &input[start + 1..i],
                ));
                i += 1;
            }
            _ if byte.is_ascii_alphabetic() => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_alphanumeric() {
                    i += 1;
                }
                tokens.push(Token::new(TokenKind::Identifier, &input[start..i]));
            }
            _ if byte.is_ascii_digit() => {
                let start = i;
                i += 1;
                if byte == b'0' && matches!(bytes.get(i).copied(), Some(b'x' | b'X')) {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                        i += 1;
                    }
                } else {
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                tokens.push(Token::new(TokenKind::Number, &input[start..i]));
            }
            _ => return Err(Error::UnknownByte { byte, offset: i }),
        }
    }

    Ok(tokens)
}
