use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use crate::analyze;
use crate::ast::AddressPair;
use crate::encode::{self, FixupKind, FnCode};
use crate::error::{Error, Result};

pub const PAGE_SIZE: u64 = 0x1000;

/// A registered function: its encoded bytes, pending fixups, and assigned
/// load address. Address 0 doubles as the "unplaced" sentinel; user code
/// is never placed at 0.
#[derive(Debug)]
pub struct FunctionEntry {
    pub bytes: Vec<u8>,
    pub fixups: Vec<encode::Fixup>,
    pub address: u64,
}

/// A registered uninitialized-data object. `offset` within `.bss` is
/// assigned during finalize.
#[derive(Debug)]
pub struct ObjectEntry {
    pub size: u64,
    pub offset: u64,
}

/// Collects functions, objects, and the manifest's placement directives,
/// then resolves every address in one finalize pass.
#[derive(Debug, Default)]
pub struct Linker {
    code_start: Option<u64>,
    entry: Option<String>,
    addresses: Vec<AddressPair>,
    functions: IndexMap<String, FunctionEntry>,
    objects: IndexMap<String, ObjectEntry>,
}

/// Fully resolved link state, ready for emission.
#[derive(Debug)]
pub struct Linked {
    pub code_start: u64,
    pub code_size: u64,
    pub data_start: u64,
    pub data_size: u64,
    pub bss_start: u64,
    pub bss_size: u64,
    pub entry_address: u64,
    pub functions: IndexMap<String, FunctionEntry>,
    pub objects: IndexMap<String, ObjectEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionMap {
    pub name: &'static str,
    pub address: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolMap {
    pub name: String,
    pub kind: &'static str,
    pub address: u64,
    pub size: u64,
}

/// Serializable layout report for `--map`.
#[derive(Debug, Clone, Serialize)]
pub struct LinkMap {
    pub entry: u64,
    pub sections: Vec<SectionMap>,
    pub symbols: Vec<SymbolMap>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_code_start(&mut self, address: u64) {
        self.code_start = Some(address);
    }

    pub fn set_entry(&mut self, name: &str) {
        self.entry = Some(name.to_string());
    }

    /// Explicit placements, already resolved and sorted by the analyzer.
    pub fn set_addresses(&mut self, addresses: Vec<AddressPair>) {
        self.addresses = addresses;
    }

    pub fn add_function(&mut self, name: &str, code: FnCode) -> Result<()> {
        if self.functions.contains_key(name) {
            return Err(Error::DuplicateSymbol(name.to_string()));
        }
        self.functions.insert(
            name.to_string(),
            FunctionEntry { bytes: code.bytes, fixups: code.fixups, address: 0 },
        );
        Ok(())
    }

    pub fn add_object(&mut self, name: &str, size: u64) -> Result<()> {
        if self.objects.contains_key(name) {
            return Err(Error::DuplicateSymbol(name.to_string()));
        }
        self.objects.insert(name.to_string(), ObjectEntry { size, offset: 0 });
        Ok(())
    }

    /// Assign every address and apply every fixup.
    ///
    /// Explicit placements come first, growing the code-size high-water
    /// mark; remaining functions pack after it in registration order. The
    /// data region starts at the next page boundary after code, `.bss`
    /// right after `.data`. Fixups run last, once every symbol is known.
    pub fn finalize(mut self) -> Result<Linked> {
        let code_start = self.code_start.ok_or(Error::CodeStartUnset)?;
        let entry_name = self.entry.clone().ok_or(Error::EntryUnset)?;
        let mut code_size = 0u64;

        for pair in &self.addresses {
            let entry = self
                .functions
                .get_mut(&pair.function)
                .ok_or_else(|| Error::UnknownFunction(pair.function.clone()))?;
            entry.address = pair.address;
            let code_end = pair.address + entry.bytes.len() as u64;
            if code_end <= code_start {
                return Err(Error::EndsBeforeCodeStart {
                    name: pair.function.clone(),
                    address: pair.address,
                });
            }
            code_size = code_size.max(code_end - code_start);
            debug!(function = %pair.function, address = pair.address, "placed");
        }

        for (name, entry) in &mut self.functions {
            if entry.address == 0 {
                entry.address = code_start + code_size;
                code_size += entry.bytes.len() as u64;
                debug!(function = %name, address = entry.address, "auto-placed");
            }
        }

        let mut data_start = code_start + code_size;
        if data_start % PAGE_SIZE != 0 {
            data_start = (data_start & !(PAGE_SIZE - 1)) + PAGE_SIZE;
        }
        // No initialized data in the current design; `.bss` begins where
        // `.data`'s (empty) region ends.
        let data_size = 0u64;
        let bss_start = data_start + data_size;

        let mut bss_size = 0u64;
        for (_, object) in &mut self.objects {
            object.offset = bss_size;
            bss_size += object.size;
        }

        let entry_address = match self.functions.get(&entry_name) {
            None => return Err(Error::EntryMissing(entry_name)),
            Some(entry) if entry.address == 0 => {
                return Err(Error::EntryUnplaced(entry_name))
            }
            Some(entry) => entry.address,
        };

        let function_addresses: HashMap<String, u64> = self
            .functions
            .iter()
            .map(|(name, entry)| (name.clone(), entry.address))
            .collect();
        let object_addresses: HashMap<String, u64> = self
            .objects
            .iter()
            .map(|(name, object)| (name.clone(), bss_start + object.offset))
            .collect();

        for (_, entry) in &mut self.functions {
            let base = entry.address;
            for fixup in &entry.fixups {
                match &fixup.kind {
                    FixupKind::Jump { opcode, rd } => {
                        let target = *function_addresses
                            .get(&fixup.target)
                            .ok_or_else(|| {
                                Error::UnknownJumpTarget(fixup.target.clone())
                            })?;
                        let rel =
                            target as i64 - (base + fixup.offset as u64) as i64;
                        analyze::check_jump_offset(rel)?;
                        encode::patch_jump(
                            &mut entry.bytes,
                            fixup.offset,
                            *opcode,
                            *rd,
                            rel as i32,
                        );
                        debug!(target = %fixup.target, rel, "jump fixup");
                    }
                    FixupKind::LoadImm { rd } => {
                        let target = function_addresses
                            .get(&fixup.target)
                            .or_else(|| object_addresses.get(&fixup.target))
                            .copied()
                            .ok_or_else(|| {
                                Error::UnknownSymbol(fixup.target.clone())
                            })?;
                        encode::patch_load_imm(
                            &mut entry.bytes,
                            fixup.offset,
                            *rd,
                            target,
                        );
                        debug!(target = %fixup.target, address = target, "load fixup");
                    }
                }
            }
        }

        Ok(Linked {
            code_start,
            code_size,
            data_start,
            data_size,
            bss_start,
            bss_size,
            entry_address,
            functions: self.functions,
            objects: self.objects,
        })
    }
}

impl Linked {
    pub fn map(&self) -> LinkMap {
        let sections = vec![
            SectionMap {
                name: ".text",
                address: self.code_start,
                size: self.code_size,
            },
            SectionMap {
                name: ".data",
                address: self.data_start,
                size: self.data_size,
            },
            SectionMap {
                name: ".bss",
                address: self.bss_start,
                size: self.bss_size,
            },
        ];
        let mut symbols = Vec::new();
        for (name, entry) in &self.functions {
            symbols.push(SymbolMap {
                name: name.clone(),
                kind: "func",
                address: entry.address,
                size: entry.bytes.len() as u64,
            });
        }
        for (name, object) in &self.objects {
            symbols.push(SymbolMap {
                name: name.clone(),
                kind: "object",
                address: self.bss_start + object.offset,
                size: object.size,
            });
        }
        LinkMap { entry: self.entry_address, sections, symbols }
    }
}
