//! Machine-code emission for analyzed instruction nodes.
//!
//! ```text
//! I-type:  [  imm[11:0]  | rs1 | funct3 | rd  | opcode]
//! S-type:  [imm[11:5]|rs2| rs1 | funct3 |imm[4:0]|opcode]
//! U-type:  [      imm[31:12]             | rd  | opcode]
//! UJ-type: [imm[20|10:1|11|19:12]        | rd  | opcode]
//! C.LUI:   [funct3 | imm[5] | rd | imm[4:0] | 01]
//! C.SW:    [funct3 | imm[5:3] | rs1' | imm[2|6] | rs2' | 00]
//! ```

use crate::ast::Inst;
use crate::error::{Error, Result};

pub const OP_LUI: u8 = 0x37;
pub const OP_AUIPC: u8 = 0x17;
pub const OP_JAL: u8 = 0x6F;
pub const OP_JALR: u8 = 0x67;
pub const OP_ADDIW: u8 = 0x1B;
pub const OP_STORE: u8 = 0x23;

/// An address-dependent instruction recorded during the first encoding
/// pass. `offset` is the byte position of the instruction within its
/// function's code buffer; `target` is the symbol name to resolve.
#[derive(Debug, Clone)]
pub struct Fixup {
    pub offset: usize,
    pub target: String,
    pub kind: FixupKind,
}

#[derive(Debug, Clone)]
pub enum FixupKind {
    Jump { opcode: u8, rd: u8 },
    LoadImm { rd: u8 },
}

/// A function's encoded bytes plus the fixups the linker must apply once
/// every symbol address is known.
#[derive(Debug, Clone, Default)]
pub struct FnCode {
    pub bytes: Vec<u8>,
    pub fixups: Vec<Fixup>,
}

/// Whether an instruction qualifies for the 2-byte encoding. Pure: depends
/// only on the node's resolved fields, never on addresses, so it can be
/// decided before link-time resolution.
pub fn is_compressible(inst: &Inst) -> bool {
    match inst {
        // No compressed I-type forms are emitted.
        Inst::I(_) => false,
        // UJ-type stays 4 bytes by design even where the ISA has a
        // compressed jump; keeps fixup sizes address-independent.
        Inst::Uj(_) => false,
        Inst::Li(_) => false,
        Inst::U(node) => {
            node.opcode == OP_LUI
                && node.imm < 0x40
                && (8..=15).contains(&node.rd)
                && node.rd != 0
                && node.rd != 2
        }
        Inst::S(node) => {
            node.funct == 2
                && (8..=15).contains(&node.rs1)
                && (8..=15).contains(&node.rs2)
                && node.imm & 0x3 == 0
                && node.imm < 0x80
        }
    }
}

fn itype_word(opcode: u8, rd: u8, funct: u8, rs1: u8, imm: u16) -> u32 {
    u32::from(opcode)
        | (u32::from(rd) << 7)
        | (u32::from(funct) << 12)
        | (u32::from(rs1) << 15)
        | (u32::from(imm) << 20)
}

fn stype_word(opcode: u8, funct: u8, rs1: u8, rs2: u8, imm: u16) -> u32 {
    u32::from(opcode)
        | (u32::from(imm & 0x1F) << 7)
        | (u32::from(funct) << 12)
        | (u32::from(rs1) << 15)
        | (u32::from(rs2) << 20)
        | (u32::from(imm >> 5) << 25)
}

fn utype_word(opcode: u8, rd: u8, imm: u32) -> u32 {
    u32::from(opcode) | (u32::from(rd) << 7) | (imm << 12)
}

fn ujtype_word(opcode: u8, rd: u8, offset: i32) -> u32 {
    let off = offset as u32;
    u32::from(opcode)
        | (u32::from(rd) << 7)
        | (((off >> 12) & 0xFF) << 12)
        | (((off >> 11) & 0x1) << 20)
        | (((off >> 1) & 0x3FF) << 21)
        | (((off >> 20) & 0x1) << 31)
}

/// `li rd, value` expands to `lui` + `addiw`. The high part is rounded up
/// when bit 11 is set because `addiw` sign-extends its immediate.
fn loadimm_words(rd: u8, value: u64) -> [u32; 2] {
    let hi = (((value >> 12) + ((value >> 11) & 1)) & 0xF_FFFF) as u32;
    let lo = (value & 0xFFF) as u16;
    [utype_word(OP_LUI, rd, hi), itype_word(OP_ADDIW, rd, 0, rd, lo)]
}

/// Encode the 2-byte form. Only call for instructions that satisfy
/// [`is_compressible`]; anything else is an internal consistency error.
pub fn encode_u16(inst: &Inst) -> Result<u16> {
    match inst {
        Inst::U(node) => {
            if node.opcode != OP_LUI {
                return Err(Error::UnsupportedEncoding(node.opcode));
            }
            let imm = node.imm as u16;
            Ok((0b011 << 13)
                | (((imm >> 5) & 0x1) << 12)
                | (u16::from(node.rd) << 7)
                | ((imm & 0x1F) << 2)
                | 0b01)
        }
        Inst::S(node) => {
            if node.funct != 2 {
                return Err(Error::UnsupportedEncoding(node.opcode));
            }
            let imm = node.imm;
            let rs1 = u16::from(node.rs1 - 8);
            let rs2 = u16::from(node.rs2 - 8);
            Ok((0b110 << 13)
                | (((imm >> 3) & 0x7) << 10)
                | (rs1 << 7)
                | (((imm >> 2) & 0x1) << 6)
                | (((imm >> 6) & 0x1) << 5)
                | (rs2 << 2))
        }
        Inst::I(node) => Err(Error::UnsupportedEncoding(node.opcode)),
        Inst::Uj(node) => Err(Error::UnsupportedEncoding(node.opcode)),
        Inst::Li(_) => Err(Error::UnsupportedEncoding(OP_LUI)),
    }
}

/// Encode the full 4-byte form. The load-immediate pseudo has no single
/// word; it is expanded by [`encode_function`].
pub fn encode_u32(inst: &Inst) -> Result<u32> {
    match inst {
        Inst::I(node) => {
            Ok(itype_word(node.opcode, node.rd, node.funct, node.rs1, node.imm))
        }
        Inst::S(node) => {
            Ok(stype_word(node.opcode, node.funct, node.rs1, node.rs2, node.imm))
        }
        Inst::U(node) => Ok(utype_word(node.opcode, node.rd, node.imm)),
        Inst::Uj(node) => Ok(ujtype_word(node.opcode, node.rd, node.offset)),
        Inst::Li(_) => Err(Error::UnsupportedEncoding(OP_LUI)),
    }
}

/// Encode a function body, collecting a fixup for every `jal`/`li` whose
/// operand names a symbol. Those instructions are emitted with a zero
/// offset/immediate here and re-encoded in place during link finalize.
pub fn encode_function(insts: &[Inst]) -> Result<FnCode> {
    let mut code = FnCode::default();
    for inst in insts {
        let offset = code.bytes.len();
        match inst {
            Inst::Li(node) => {
                if node.needs_lookup {
                    code.fixups.push(Fixup {
                        offset,
                        target: node.imm_token.text.clone(),
                        kind: FixupKind::LoadImm { rd: node.rd },
                    });
                }
                for word in loadimm_words(node.rd, node.imm) {
                    code.bytes.extend_from_slice(&word.to_le_bytes());
                }
            }
            Inst::Uj(node) => {
                if node.needs_lookup {
                    code.fixups.push(Fixup {
                        offset,
                        target: node.offset_token.text.clone(),
                        kind: FixupKind::Jump { opcode: node.opcode, rd: node.rd },
                    });
                }
                code.bytes.extend_from_slice(&encode_u32(inst)?.to_le_bytes());
            }
            _ if is_compressible(inst) => {
                code.bytes.extend_from_slice(&encode_u16(inst)?.to_le_bytes());
            }
            _ => {
                code.bytes.extend_from_slice(&encode_u32(inst)?.to_le_bytes());
            }
        }
    }
    Ok(code)
}

/// Re-encode a resolved jump in place. Pure in the final addresses:
/// patching twice with the same offset is byte-identical.
pub fn patch_jump(bytes: &mut [u8], offset: usize, opcode: u8, rd: u8, rel: i32) {
    let word = ujtype_word(opcode, rd, rel);
    bytes[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
}

/// Re-encode a resolved load-immediate pair in place.
pub fn patch_load_imm(bytes: &mut [u8], offset: usize, rd: u8, value: u64) {
    let words = loadimm_words(rd, value);
    bytes[offset..offset + 4].copy_from_slice(&words[0].to_le_bytes());
    bytes[offset + 4..offset + 8].copy_from_slice(&words[1].to_le_bytes());
}
