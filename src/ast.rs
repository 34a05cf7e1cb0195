use crate::token::Token;

/// Top-level syntax tree nodes. Each source file parses to a list of these;
/// the manifest file is expected to contain exactly one `Executable`.
#[derive(Debug, Clone)]
pub enum Item {
    Executable(Executable),
    Function(Function),
    Uninit(UninitData),
}

/// The `executable "..." { ... }` manifest block. `code_address` and each
/// pair's `address` are 0 until the analyzer resolves them; the analyzer
/// also sorts `addresses` ascending by resolved address (stable).
#[derive(Debug, Clone)]
pub struct Executable {
    pub output_path: String,
    pub entry: String,
    pub code_text: String,
    pub code_address: u64,
    pub addresses: Vec<AddressPair>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AddressPair {
    pub function: String,
    pub imm_text: String,
    pub address: u64,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub insts: Vec<Inst>,
}

/// `uninit <name>, <size> <unit>`. `size` is resolved to bytes by the
/// analyzer; `offset` within `.bss` is assigned by the linker.
#[derive(Debug, Clone)]
pub struct UninitData {
    pub name: String,
    pub size_text: String,
    pub unit_text: String,
    pub size: u64,
    pub offset: u64,
}

/// One instruction node. Raw operand texts are filled by the parser; the
/// numeric fields stay 0 until the analyzer resolves them in place.
#[derive(Debug, Clone)]
pub enum Inst {
    I(IType),
    S(SType),
    U(UType),
    Uj(UjType),
    Li(LoadImm),
}

#[derive(Debug, Clone)]
pub struct IType {
    pub mnemonic: String,
    pub rd_text: String,
    pub rs1_text: String,
    pub imm_text: String,

    pub opcode: u8,
    pub funct: u8,
    pub rd: u8,
    pub rs1: u8,
    pub imm: u16,
}

impl IType {
    pub fn new(mnemonic: String, rd: String, rs1: String, imm: String) -> Self {
        Self {
            mnemonic,
            rd_text: rd,
            rs1_text: rs1,
            imm_text: imm,
            opcode: 0,
            funct: 0,
            rd: 0,
            rs1: 0,
            imm: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SType {
    pub mnemonic: String,
    pub rs1_text: String,
    pub rs2_text: String,
    pub imm_text: String,

    pub opcode: u8,
    pub funct: u8,
    pub rs1: u8,
    pub rs2: u8,
    pub imm: u16,
}

impl SType {
    pub fn new(mnemonic: String, rs1: String, rs2: String, imm: String) -> Self {
        Self {
            mnemonic,
            rs1_text: rs1,
            rs2_text: rs2,
            imm_text: imm,
            opcode: 0,
            funct: 0,
            rs1: 0,
            rs2: 0,
            imm: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UType {
    pub mnemonic: String,
    pub rd_text: String,
    pub imm_text: String,

    pub opcode: u8,
    pub rd: u8,
    pub imm: u32,
}

impl UType {
    pub fn new(mnemonic: String, rd: String, imm: String) -> Self {
        Self { mnemonic, rd_text: rd, imm_text: imm, opcode: 0, rd: 0, imm: 0 }
    }
}

/// `jal rd, <offset|name>`. An identifier operand marks the node for a
/// symbol-table lookup during link finalize; its offset stays 0 until then.
#[derive(Debug, Clone)]
pub struct UjType {
    pub mnemonic: String,
    pub rd_text: String,
    pub offset_token: Token,

    pub opcode: u8,
    pub rd: u8,
    pub offset: i32,
    pub needs_lookup: bool,
}

impl UjType {
    pub fn new(mnemonic: String, rd: String, offset: Token) -> Self {
        Self {
            mnemonic,
            rd_text: rd,
            offset_token: offset,
            opcode: 0,
            rd: 0,
            offset: 0,
            needs_lookup: false,
        }
    }
}

/// `li rd, <imm|name>` pseudo instruction, expanded to `lui` + `addiw`.
#[derive(Debug, Clone)]
pub struct LoadImm {
    pub rd_text: String,
    pub imm_token: Token,

    pub rd: u8,
    pub imm: u64,
    pub needs_lookup: bool,
}

impl LoadImm {
    pub fn new(rd: String, imm: Token) -> Self {
        Self { rd_text: rd, imm_token: imm, rd: 0, imm: 0, needs_lookup: false }
    }
}
