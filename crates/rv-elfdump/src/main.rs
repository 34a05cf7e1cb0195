use anyhow::{anyhow, ensure, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use rvasm_rs::elf::{EHDR_SIZE, SHDR_SIZE, SYM_SIZE};

#[derive(Parser, Debug)]
#[command(version, about = "Inspect ELF64 executables produced by rvasm", long_about = None)]
struct Cli {
    /// Input ELF file
    #[arg(value_name = "ELFFILE")]
    input: PathBuf,
    /// Subcommand
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List section headers
    Sections {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List symbol table entries
    Symbols {
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn u16_at(bytes: &[u8], off: usize) -> Result<u16> {
    ensure!(off + 2 <= bytes.len(), "truncated file at offset {off}");
    Ok(u16::from_le_bytes([bytes[off], bytes[off + 1]]))
}

fn u32_at(bytes: &[u8], off: usize) -> Result<u32> {
    ensure!(off + 4 <= bytes.len(), "truncated file at offset {off}");
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[off..off + 4]);
    Ok(u32::from_le_bytes(buf))
}

fn u64_at(bytes: &[u8], off: usize) -> Result<u64> {
    ensure!(off + 8 <= bytes.len(), "truncated file at offset {off}");
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[off..off + 8]);
    Ok(u64::from_le_bytes(buf))
}

fn str_at(table: &[u8], off: usize) -> String {
    if off >= table.len() {
        return String::new();
    }
    let end = table[off..]
        .iter()
        .position(|&b| b == 0)
        .map(|p| off + p)
        .unwrap_or(table.len());
    String::from_utf8_lossy(&table[off..end]).into_owned()
}

#[derive(Debug, Clone, serde::Serialize)]
struct SectionRow {
    index: u16,
    name: String,
    sh_type: u32,
    address: u64,
    offset: u64,
    size: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
struct SymbolRow {
    name: String,
    info: u8,
    shndx: u16,
    value: u64,
    size: u64,
}

struct Elf {
    bytes: Vec<u8>,
    entry: u64,
    sections: Vec<SectionRow>,
}

fn load(bytes: Vec<u8>) -> Result<Elf> {
    ensure!(bytes.len() >= EHDR_SIZE, "file too small for an ELF header");
    ensure!(&bytes[..4] == b"\x7FELF", "bad ELF magic");
    ensure!(bytes[4] == 2 && bytes[5] == 1, "not an ELF64 little-endian file");

    let entry = u64_at(&bytes, 24)?;
    let shoff = u64_at(&bytes, 40)? as usize;
    let shnum = u16_at(&bytes, 60)? as usize;
    let shstrndx = u16_at(&bytes, 62)? as usize;
    ensure!(shstrndx < shnum, "section name table index out of range");

    let shdr = |i: usize| shoff + i * SHDR_SIZE;
    let names_off = u64_at(&bytes, shdr(shstrndx) + 24)? as usize;
    let names_size = u64_at(&bytes, shdr(shstrndx) + 32)? as usize;
    ensure!(
        names_off + names_size <= bytes.len(),
        "section name table out of range"
    );
    let names = bytes[names_off..names_off + names_size].to_vec();

    let mut sections = Vec::with_capacity(shnum);
    for i in 0..shnum {
        let base = shdr(i);
        sections.push(SectionRow {
            index: i as u16,
            name: str_at(&names, u32_at(&bytes, base)? as usize),
            sh_type: u32_at(&bytes, base + 4)?,
            address: u64_at(&bytes, base + 16)?,
            offset: u64_at(&bytes, base + 24)?,
            size: u64_at(&bytes, base + 32)?,
        });
    }
    Ok(Elf { bytes, entry, sections })
}

fn symbols(elf: &Elf) -> Result<Vec<SymbolRow>> {
    let symtab = elf
        .sections
        .iter()
        .find(|s| s.name == ".symtab")
        .ok_or_else(|| anyhow!("no .symtab section"))?;
    let strtab = elf
        .sections
        .iter()
        .find(|s| s.name == ".strtab")
        .ok_or_else(|| anyhow!("no .strtab section"))?;
    let names_off = strtab.offset as usize;
    let names_size = strtab.size as usize;
    ensure!(
        names_off + names_size <= elf.bytes.len(),
        "string table out of range"
    );
    let names = &elf.bytes[names_off..names_off + names_size];

    let count = (symtab.size as usize) / SYM_SIZE;
    let mut rows = Vec::with_capacity(count);
    for i in 0..count {
        let base = symtab.offset as usize + i * SYM_SIZE;
        ensure!(base + SYM_SIZE <= elf.bytes.len(), "truncated symbol table");
        rows.push(SymbolRow {
            name: str_at(names, u32_at(&elf.bytes, base)? as usize),
            info: elf.bytes[base + 4],
            shndx: u16_at(&elf.bytes, base + 6)?,
            value: u64_at(&elf.bytes, base + 8)?,
            size: u64_at(&elf.bytes, base + 16)?,
        });
    }
    Ok(rows)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let bytes = std::fs::read(&cli.input)?;
    let elf = load(bytes)?;

    match cli.cmd {
        Command::Sections { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&elf.sections)?);
            } else {
                println!("entry {:#010x}", elf.entry);
                println!(
                    "{:<4} {:<12} {:<6} {:<12} {:<10} {:<10}",
                    "idx", "name", "type", "addr", "offset", "size"
                );
                for s in &elf.sections {
                    println!(
                        "{:<4} {:<12} {:<6} {:#012x} {:#010x} {:#010x}",
                        s.index, s.name, s.sh_type, s.address, s.offset, s.size
                    );
                }
            }
        }
        Command::Symbols { json } => {
            let rows = symbols(&elf)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!(
                    "{:<16} {:<6} {:<6} {:<12} {:<10}",
                    "name", "info", "shndx", "value", "size"
                );
                for r in &rows {
                    println!(
                        "{:<16} {:#04x}   {:<6} {:#012x} {:#010x}",
                        r.name, r.info, r.shndx, r.value, r.size
                    );
                }
            }
        }
    }
    Ok(())
}
