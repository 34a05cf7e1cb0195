use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way an assembly unit can fail. The first detected violation is
/// propagated to the top-level handler; nothing is recovered mid-pipeline
/// and no artifact is written after an error.
#[derive(Error, Debug)]
pub enum Error {
    // Lexical
    #[error("unrecognized byte {byte:#04x} at offset {offset}")]
    UnknownByte { byte: u8, offset: usize },
    #[error("unterminated string literal at offset {0}")]
    UnterminatedString(usize),

    // Syntactic
    #[error("expected {expected}, got {found} `{text}`")]
    UnexpectedToken {
        expected: &'static str,
        found: &'static str,
        text: String,
    },
    #[error("expected {expected}, got end of input")]
    UnexpectedEnd { expected: &'static str },
    #[error("executable manifest is missing `{0}`")]
    MissingManifestField(&'static str),
    #[error("no executable manifest in `{0}`")]
    NoManifest(String),
    #[error("source file declares a nested executable manifest")]
    NestedManifest,

    // Semantic
    #[error("unknown register `{0}`")]
    UnknownRegister(String),
    #[error("unknown mnemonic `{0}`")]
    UnknownMnemonic(String),
    #[error("malformed number `{0}`")]
    MalformedNumber(String),
    #[error("immediate {value:#x} out of range (limit {limit:#x})")]
    ImmediateRange { value: u64, limit: u64 },
    #[error("malformed opcode {0:#04x}")]
    MalformedOpcode(u8),
    #[error("unknown size unit `{0}`")]
    UnknownSizeUnit(String),
    #[error("size of `{0}` must be nonzero")]
    ZeroSize(String),
    #[error("bit size of `{0}` must be divisible by 8")]
    RaggedBitSize(String),

    // Encoding
    #[error("no encoding for opcode {0:#04x}")]
    UnsupportedEncoding(u8),

    // Linking
    #[error("symbol `{0}` defined twice")]
    DuplicateSymbol(String),
    #[error("address set for unknown function `{0}`")]
    UnknownFunction(String),
    #[error("jump to unknown function `{0}`")]
    UnknownJumpTarget(String),
    #[error("unknown symbol `{0}`")]
    UnknownSymbol(String),
    #[error("function `{name}` placed at {address:#x} ends before the code segment base")]
    EndsBeforeCodeStart { name: String, address: u64 },
    #[error("jump offset {0:#x} out of range")]
    OffsetRange(i64),
    #[error("jump offset {0:#x} is odd")]
    OddOffset(i64),
    #[error("code segment base not set")]
    CodeStartUnset,
    #[error("entry function not set")]
    EntryUnset,
    #[error("entry function `{0}` does not exist")]
    EntryMissing(String),
    #[error("entry function `{0}` has no address")]
    EntryUnplaced(String),

    // Resources
    #[error("{path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
