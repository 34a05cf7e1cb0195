use crate::ast::{
    Executable, Function, Inst, IType, Item, LoadImm, SType, UjType,
    UninitData, UType,
};
use crate::encode::{OP_ADDIW, OP_AUIPC, OP_JAL, OP_JALR, OP_LUI, OP_STORE};
use crate::error::{Error, Result};
use crate::token::TokenKind;

/// Instruction format family a mnemonic belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    I,
    S,
    U,
    Uj,
    Li,
}

pub fn mnemonic_family(mnemonic: &str) -> Option<Family> {
    if itype_funct(mnemonic).is_some() {
        return Some(Family::I);
    }
    if stype_funct(mnemonic).is_some() {
        return Some(Family::S);
    }
    if utype_opcode(mnemonic).is_some() {
        return Some(Family::U);
    }
    match mnemonic {
        "jal" => Some(Family::Uj),
        "li" => Some(Family::Li),
        _ => None,
    }
}

fn itype_funct(mnemonic: &str) -> Option<(u8, u8)> {
    match mnemonic {
        "addiw" => Some((OP_ADDIW, 0)),
        "jalr" => Some((OP_JALR, 0)),
        _ => None,
    }
}

fn stype_funct(mnemonic: &str) -> Option<(u8, u8)> {
    match mnemonic {
        "sb" => Some((OP_STORE, 0)),
        "sh" => Some((OP_STORE, 1)),
        "sw" => Some((OP_STORE, 2)),
        "sd" => Some((OP_STORE, 3)),
        _ => None,
    }
}

fn utype_opcode(mnemonic: &str) -> Option<u8> {
    match mnemonic {
        "lui" => Some(OP_LUI),
        "auipc" => Some(OP_AUIPC),
        _ => None,
    }
}

/// Resolve a register spelling to its 5-bit index per the RISC-V ABI.
pub fn register_index(name: &str) -> Result<u8> {
    match name {
        "zero" => return Ok(0),
        "ra" => return Ok(1),
        "sp" => return Ok(2),
        "gp" => return Ok(3),
        "tp" => return Ok(4),
        "fp" => return Ok(8),
        _ => {}
    }
    if name.len() < 2 || !name.is_ascii() {
        return Err(Error::UnknownRegister(name.to_string()));
    }
    let (family, suffix) = name.split_at(1);
    let n: u8 = suffix
        .parse()
        .map_err(|_| Error::UnknownRegister(name.to_string()))?;
    let index = match (family, n) {
        ("a", 0..=7) => 10 + n,
        ("s", 0..=1) => 8 + n,
        ("s", 2..=11) => 14 + n,
        ("t", 0..=2) => 5 + n,
        ("t", 3..=6) => 25 + n,
        ("x", 0..=31) => n,
        _ => return Err(Error::UnknownRegister(name.to_string())),
    };
    Ok(index)
}

/// Resolve a numeric token per the dialect: a single decimal digit is its
/// literal value; anything else must be `0x` plus 1-8 hex digits, either
/// case. Multi-digit decimal literals are rejected on purpose.
pub fn immediate(text: &str) -> Result<u64> {
    let bytes = text.as_bytes();
    if bytes.len() == 1 && bytes[0].is_ascii_digit() {
        return Ok(u64::from(bytes[0] - b'0'));
    }
    if text.len() > 10 {
        return Err(Error::MalformedNumber(text.to_string()));
    }
    let digits = match text.get(..2) {
        Some("0x") | Some("0X") => &text[2..],
        _ => return Err(Error::MalformedNumber(text.to_string())),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(Error::MalformedNumber(text.to_string()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|_| Error::MalformedNumber(text.to_string()))
}

/// Wide (32-bit) opcodes must have bits [1:0] == 11 and bits [4:2] != 111.
fn check_wide_opcode(opcode: u8) -> Result<()> {
    if opcode & 0x3 != 0x3 || opcode & 0x1C == 0x1C {
        return Err(Error::MalformedOpcode(opcode));
    }
    Ok(())
}

/// A jump offset must be even and fit the signed 21-bit UJ immediate.
pub fn check_jump_offset(offset: i64) -> Result<()> {
    if offset % 2 != 0 {
        return Err(Error::OddOffset(offset));
    }
    if offset.unsigned_abs() >= (1 << 20) {
        return Err(Error::OffsetRange(offset));
    }
    Ok(())
}

pub fn analyze_item(item: &mut Item) -> Result<()> {
    match item {
        Item::Executable(exec) => analyze_executable(exec),
        Item::Function(func) => analyze_function(func),
        Item::Uninit(data) => analyze_uninit(data),
    }
}

/// Resolve the manifest's numeric fields and order the explicit placements
/// ascending by address. The sort is stable, so declaration order breaks
/// ties.
pub fn analyze_executable(exec: &mut Executable) -> Result<()> {
    exec.code_address = immediate(&exec.code_text)?;
    for pair in &mut exec.addresses {
        pair.address = immediate(&pair.imm_text)?;
    }
    exec.addresses.sort_by_key(|pair| pair.address);
    Ok(())
}

pub fn analyze_function(func: &mut Function) -> Result<()> {
    for inst in &mut func.insts {
        analyze_inst(inst)?;
    }
    Ok(())
}

pub fn analyze_inst(inst: &mut Inst) -> Result<()> {
    match inst {
        Inst::I(node) => analyze_itype(node),
        Inst::S(node) => analyze_stype(node),
        Inst::U(node) => analyze_utype(node),
        Inst::Uj(node) => analyze_ujtype(node),
        Inst::Li(node) => analyze_loadimm(node),
    }
}

fn analyze_itype(node: &mut IType) -> Result<()> {
    let (opcode, funct) = itype_funct(&node.mnemonic)
        .ok_or_else(|| Error::UnknownMnemonic(node.mnemonic.clone()))?;
    node.opcode = opcode;
    node.funct = funct;
    node.rd = register_index(&node.rd_text)?;
    node.rs1 = register_index(&node.rs1_text)?;
    let imm = immediate(&node.imm_text)?;
    if imm >= 0x1000 {
        return Err(Error::ImmediateRange { value: imm, limit: 0x1000 });
    }
    node.imm = imm as u16;
    Ok(())
}

fn analyze_stype(node: &mut SType) -> Result<()> {
    let (opcode, funct) = stype_funct(&node.mnemonic)
        .ok_or_else(|| Error::UnknownMnemonic(node.mnemonic.clone()))?;
    node.opcode = opcode;
    node.funct = funct;
    node.rs1 = register_index(&node.rs1_text)?;
    node.rs2 = register_index(&node.rs2_text)?;
    let imm = immediate(&node.imm_text)?;
    if imm >= 0x1000 {
        return Err(Error::ImmediateRange { value: imm, limit: 0x1000 });
    }
    node.imm = imm as u16;
    Ok(())
}

fn analyze_utype(node: &mut UType) -> Result<()> {
    let opcode = utype_opcode(&node.mnemonic)
        .ok_or_else(|| Error::UnknownMnemonic(node.mnemonic.clone()))?;
    check_wide_opcode(opcode)?;
    node.opcode = opcode;
    node.rd = register_index(&node.rd_text)?;
    let imm = immediate(&node.imm_text)?;
    if imm >= 0x100000 {
        return Err(Error::ImmediateRange { value: imm, limit: 0x100000 });
    }
    node.imm = imm as u32;
    Ok(())
}

fn analyze_ujtype(node: &mut UjType) -> Result<()> {
    if node.mnemonic != "jal" {
        return Err(Error::UnknownMnemonic(node.mnemonic.clone()));
    }
    check_wide_opcode(OP_JAL)?;
    node.opcode = OP_JAL;
    node.rd = register_index(&node.rd_text)?;
    if node.offset_token.kind == TokenKind::Identifier {
        // Resolved against the function table during link finalize.
        node.needs_lookup = true;
        node.offset = 0;
    } else {
        let offset = immediate(&node.offset_token.text)? as i64;
        check_jump_offset(offset)?;
        node.offset = offset as i32;
    }
    Ok(())
}

fn analyze_loadimm(node: &mut LoadImm) -> Result<()> {
    node.rd = register_index(&node.rd_text)?;
    if node.imm_token.kind == TokenKind::Identifier {
        node.needs_lookup = true;
        node.imm = 0;
    } else {
        node.imm = immediate(&node.imm_token.text)?;
    }
    Ok(())
}

/// Resolve an uninitialized-data size: `B` counts bytes, `b` counts bits
/// and must be divisible by 8. The size must be nonzero.
pub fn analyze_uninit(node: &mut UninitData) -> Result<()> {
    let raw = immediate(&node.size_text)?;
    let size = match node.unit_text.as_str() {
        "B" => raw,
        "b" => {
            if raw % 8 != 0 {
                return Err(Error::RaggedBitSize(node.name.clone()));
            }
            raw / 8
        }
        _ => return Err(Error::UnknownSizeUnit(node.unit_text.clone())),
    };
    if size == 0 {
        return Err(Error::ZeroSize(node.name.clone()));
    }
    node.size = size;
    Ok(())
}
