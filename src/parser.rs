use crate::analyze::{self, Family};
use crate::ast::{
    AddressPair, Executable, Function, Inst, IType, Item, LoadImm, SType,
    UjType, UninitData, UType,
};
use crate::error::{Error, Result};
use crate::token::{Token, TokenKind};

/// Recursive-descent parser over the token stream. Performs structural
/// (grammar) validation only; register names, immediates, and ranges are
/// the analyzer's concern.
pub struct Parser {
    tokens: Vec<Token>,
    index: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, index: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek().map(|t| t.kind == kind).unwrap_or(false)
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            let token = self.tokens[self.index].clone();
            self.index += 1;
            Some(token)
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        match self.peek() {
            None => Err(Error::UnexpectedEnd { expected: kind.describe() }),
            Some(token) if token.kind == kind => {
                let token = token.clone();
                self.index += 1;
                Ok(token)
            }
            Some(token) => Err(Error::UnexpectedToken {
                expected: kind.describe(),
                found: token.kind.describe(),
                text: token.text.clone(),
            }),
        }
    }

    /// An operand that may be a numeric literal or a symbol name.
    fn expect_number_or_identifier(&mut self) -> Result<Token> {
        match self.peek() {
            None => Err(Error::UnexpectedEnd { expected: "number or identifier" }),
            Some(token)
                if matches!(token.kind, TokenKind::Number | TokenKind::Identifier) =>
            {
                let token = token.clone();
                self.index += 1;
                Ok(token)
            }
            Some(token) => Err(Error::UnexpectedToken {
                expected: "number or identifier",
                found: token.kind.describe(),
                text: token.text.clone(),
            }),
        }
    }

    pub fn parse_items(mut self) -> Result<Vec<Item>> {
        let mut items = Vec::new();
        while self.peek().is_some() {
            let keyword = self.expect(TokenKind::Identifier)?;
            match keyword.text.as_str() {
                "executable" => items.push(Item::Executable(self.executable()?)),
                "func" => items.push(Item::Function(self.function()?)),
                "uninit" => items.push(Item::Uninit(self.uninit()?)),
                _ => {
                    return Err(Error::UnexpectedToken {
                        expected: "`executable`, `func`, or `uninit`",
                        found: "identifier",
                        text: keyword.text,
                    })
                }
            }
        }
        Ok(items)
    }

    fn executable(&mut self) -> Result<Executable> {
        let output_path = self.expect(TokenKind::Str)?.text;
        self.expect(TokenKind::LeftBrace)?;

        let mut entry = None;
        let mut code = None;
        let mut addresses = Vec::new();
        let mut files = Vec::new();

        loop {
            if self.at(TokenKind::RightBrace) {
                break;
            }
            let key = self.expect(TokenKind::Identifier)?;
            match key.text.as_str() {
                "entry" => {
                    self.expect(TokenKind::Colon)?;
                    entry = Some(self.expect(TokenKind::Identifier)?.text);
                }
                "code" => {
                    self.expect(TokenKind::Colon)?;
                    code = Some(self.expect(TokenKind::Number)?.text);
                }
                "address" => {
                    self.expect(TokenKind::LeftParen)?;
                    let function = self.expect(TokenKind::Identifier)?.text;
                    self.expect(TokenKind::RightParen)?;
                    self.expect(TokenKind::Colon)?;
                    let imm = self.expect(TokenKind::Number)?.text;
                    addresses.push(AddressPair {
                        function,
                        imm_text: imm,
                        address: 0,
                    });
                }
                "files" => {
                    self.expect(TokenKind::Colon)?;
                    self.expect(TokenKind::LeftBracket)?;
                    loop {
                        if self.at(TokenKind::RightBracket) {
                            break;
                        }
                        files.push(self.expect(TokenKind::Str)?.text);
                        if self.eat(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect(TokenKind::RightBracket)?;
                }
                _ => {
                    return Err(Error::UnexpectedToken {
                        expected: "`entry`, `code`, `address`, or `files`",
                        found: "identifier",
                        text: key.text,
                    })
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBrace)?;

        Ok(Executable {
            output_path,
            entry: entry.ok_or(Error::MissingManifestField("entry"))?,
            code_text: code.ok_or(Error::MissingManifestField("code"))?,
            code_address: 0,
            addresses,
            files,
        })
    }

    fn function(&mut self) -> Result<Function> {
        let name = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::LeftBrace)?;
        let mut insts = Vec::new();
        while !self.at(TokenKind::RightBrace) {
            insts.push(self.instruction()?);
        }
        self.expect(TokenKind::RightBrace)?;
        Ok(Function { name, insts })
    }

    fn instruction(&mut self) -> Result<Inst> {
        let mnemonic = self.expect(TokenKind::Identifier)?.text;
        let family = analyze::mnemonic_family(&mnemonic)
            .ok_or_else(|| Error::UnknownMnemonic(mnemonic.clone()))?;

        match family {
            Family::I => {
                // `mn rd, rs1, imm` or `mn rd, imm(rs1)`
                let rd = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Comma)?;
                if self.at(TokenKind::Identifier) {
                    let rs1 = self.expect(TokenKind::Identifier)?.text;
                    self.expect(TokenKind::Comma)?;
                    let imm = self.expect(TokenKind::Number)?.text;
                    Ok(Inst::I(IType::new(mnemonic, rd, rs1, imm)))
                } else {
                    let imm = self.expect(TokenKind::Number)?.text;
                    self.expect(TokenKind::LeftParen)?;
                    let rs1 = self.expect(TokenKind::Identifier)?.text;
                    self.expect(TokenKind::RightParen)?;
                    Ok(Inst::I(IType::new(mnemonic, rd, rs1, imm)))
                }
            }
            Family::S => {
                // `mn rs2, imm(rs1)`
                let rs2 = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Comma)?;
                let imm = self.expect(TokenKind::Number)?.text;
                self.expect(TokenKind::LeftParen)?;
                let rs1 = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::RightParen)?;
                Ok(Inst::S(SType::new(mnemonic, rs1, rs2, imm)))
            }
            Family::U => {
                let rd = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Comma)?;
                let imm = self.expect(TokenKind::Number)?.text;
                Ok(Inst::U(UType::new(mnemonic, rd, imm)))
            }
            Family::Uj => {
                let rd = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Comma)?;
                let offset = self.expect_number_or_identifier()?;
                Ok(Inst::Uj(UjType::new(mnemonic, rd, offset)))
            }
            Family::Li => {
                let rd = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Comma)?;
                let imm = self.expect_number_or_identifier()?;
                Ok(Inst::Li(LoadImm::new(rd, imm)))
            }
        }
    }

    fn uninit(&mut self) -> Result<UninitData> {
        let name = self.expect(TokenKind::Identifier)?.text;
        self.expect(TokenKind::Comma)?;
        let size = self.expect(TokenKind::Number)?.text;
        let unit = self.expect(TokenKind::Identifier)?.text;
        Ok(UninitData {
            name,
            size_text: size,
            unit_text: unit,
            size: 0,
            offset: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse(src: &str) -> Result<Vec<Item>> {
        Parser::new(lex(src).unwrap()).parse_items()
    }

    #[test]
    fn manifest_block() {
        let items = parse(
            "executable \"out.elf\" {\n\
             entry: main,\n\
             code: 0x1000,\n\
             address(boot): 0x1000,\n\
             files: [\"main.asm\", \"boot.asm\"],\n\
             }",
        )
        .unwrap();
        let Item::Executable(exec) = &items[0] else {
            panic!("expected executable item");
        };
        assert_eq!(exec.output_path, "out.elf");
        assert_eq!(exec.entry, "main");
        assert_eq!(exec.code_text, "0x1000");
        assert_eq!(exec.addresses.len(), 1);
        assert_eq!(exec.addresses[0].function, "boot");
        assert_eq!(exec.files, ["main.asm", "boot.asm"]);
    }

    #[test]
    fn function_block_with_each_operand_shape() {
        let items = parse(
            "func main {\n\
             lui a0, 0x5\n\
             addiw a0, a0, 0x555\n\
             sw a0, 0(a1)\n\
             jalr ra, 0(t0)\n\
             jal ra, other\n\
             li a1, buffer\n\
             }",
        )
        .unwrap();
        let Item::Function(func) = &items[0] else {
            panic!("expected function item");
        };
        assert_eq!(func.name, "main");
        assert_eq!(func.insts.len(), 6);
        assert!(matches!(&func.insts[4], Inst::Uj(uj) if uj.offset_token.text == "other"));
        assert!(matches!(&func.insts[5], Inst::Li(li) if li.imm_token.text == "buffer"));
    }

    #[test]
    fn uninit_declaration() {
        let items = parse("uninit buffer, 0x40 B").unwrap();
        let Item::Uninit(data) = &items[0] else {
            panic!("expected uninit item");
        };
        assert_eq!(data.name, "buffer");
        assert_eq!(data.size_text, "0x40");
        assert_eq!(data.unit_text, "B");
    }

    #[test]
    fn unknown_mnemonic_is_rejected() {
        assert!(matches!(
            parse("func f { mul a0, a1, a2 }"),
            Err(Error::UnknownMnemonic(m)) if m == "mul"
        ));
    }

    #[test]
    fn missing_manifest_field_is_rejected() {
        assert!(matches!(
            parse("executable \"o\" { code: 0x1000 }"),
            Err(Error::MissingManifestField("entry"))
        ));
    }
}
