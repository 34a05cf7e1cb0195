//! ELF64 little-endian executable emission.
//!
//! The image layout is fixed: file header, two program headers, the text
//! region (each function copied at `address - code_start`), the symbol
//! table, the two string tables, then the section header table. `.data`
//! and `.bss` contribute no file bytes.

use bitflags::bitflags;

use crate::link::Linked;

pub const EHDR_SIZE: usize = 64;
pub const PHDR_SIZE: usize = 56;
pub const SHDR_SIZE: usize = 64;
pub const SYM_SIZE: usize = 24;

const ET_EXEC: u16 = 2;
const EM_RISCV: u16 = 243;
const EV_CURRENT: u32 = 1;

const PT_LOAD: u32 = 1;

const SHT_NULL: u32 = 0;
const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;

const STB_LOCAL: u8 = 0;
const STT_SECTION: u8 = 3;
const STT_FUNC: u8 = 2;
const STT_OBJECT: u8 = 1;
const STV_DEFAULT: u8 = 0;
const SHN_UNDEF: u16 = 0;

pub const TEXT_SECTION_INDEX: u16 = 1;
pub const DATA_SECTION_INDEX: u16 = 2;
pub const BSS_SECTION_INDEX: u16 = 3;
pub const SYMTAB_SECTION_INDEX: u16 = 4;
pub const STRTAB_SECTION_INDEX: u16 = 5;
pub const SHSTRTAB_SECTION_INDEX: u16 = 6;
pub const NUM_SECTIONS: u16 = 7;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const X = 0x1;
        const W = 0x2;
        const R = 0x4;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u64 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
    }
}

#[derive(Debug, Clone)]
struct FileHeader {
    entry: u64,
    phoff: u64,
    shoff: u64,
    phnum: u16,
    shnum: u16,
    shstrndx: u16,
}

impl FileHeader {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(EHDR_SIZE);
        bytes.extend_from_slice(&[0x7F, b'E', b'L', b'F']);
        bytes.push(2); // ELFCLASS64
        bytes.push(1); // little-endian
        bytes.push(EV_CURRENT as u8);
        bytes.push(0); // System V ABI
        bytes.push(0); // ABI version
        bytes.extend_from_slice(&[0u8; 7]);
        bytes.extend_from_slice(&ET_EXEC.to_le_bytes());
        bytes.extend_from_slice(&EM_RISCV.to_le_bytes());
        bytes.extend_from_slice(&EV_CURRENT.to_le_bytes());
        bytes.extend_from_slice(&self.entry.to_le_bytes());
        bytes.extend_from_slice(&self.phoff.to_le_bytes());
        bytes.extend_from_slice(&self.shoff.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes()); // flags
        bytes.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
        bytes.extend_from_slice(&(PHDR_SIZE as u16).to_le_bytes());
        bytes.extend_from_slice(&self.phnum.to_le_bytes());
        bytes.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
        bytes.extend_from_slice(&self.shnum.to_le_bytes());
        bytes.extend_from_slice(&self.shstrndx.to_le_bytes());
        bytes
    }
}

#[derive(Debug, Clone)]
struct ProgramHeader {
    p_type: u32,
    flags: SegmentFlags,
    offset: u64,
    vaddr: u64,
    filesz: u64,
    memsz: u64,
}

impl ProgramHeader {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(PHDR_SIZE);
        bytes.extend_from_slice(&self.p_type.to_le_bytes());
        bytes.extend_from_slice(&self.flags.bits().to_le_bytes());
        bytes.extend_from_slice(&self.offset.to_le_bytes());
        bytes.extend_from_slice(&self.vaddr.to_le_bytes());
        bytes.extend_from_slice(&self.vaddr.to_le_bytes()); // paddr
        bytes.extend_from_slice(&self.filesz.to_le_bytes());
        bytes.extend_from_slice(&self.memsz.to_le_bytes());
        bytes.extend_from_slice(&0x1000u64.to_le_bytes());
        bytes
    }
}

#[derive(Debug, Clone, Default)]
struct SectionHeader {
    name: u32,
    sh_type: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
}

impl SectionHeader {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SHDR_SIZE);
        bytes.extend_from_slice(&self.name.to_le_bytes());
        bytes.extend_from_slice(&self.sh_type.to_le_bytes());
        bytes.extend_from_slice(&self.flags.to_le_bytes());
        bytes.extend_from_slice(&self.addr.to_le_bytes());
        bytes.extend_from_slice(&self.offset.to_le_bytes());
        bytes.extend_from_slice(&self.size.to_le_bytes());
        bytes.extend_from_slice(&self.link.to_le_bytes());
        bytes.extend_from_slice(&self.info.to_le_bytes());
        bytes.extend_from_slice(&self.addralign.to_le_bytes());
        bytes.extend_from_slice(&self.entsize.to_le_bytes());
        bytes
    }
}

#[derive(Debug, Clone)]
struct Symbol {
    name: u32,
    info: u8,
    shndx: u16,
    value: u64,
    size: u64,
}

impl Symbol {
    fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SYM_SIZE);
        bytes.extend_from_slice(&self.name.to_le_bytes());
        bytes.push(self.info);
        bytes.push(STV_DEFAULT);
        bytes.extend_from_slice(&self.shndx.to_le_bytes());
        bytes.extend_from_slice(&self.value.to_le_bytes());
        bytes.extend_from_slice(&self.size.to_le_bytes());
        bytes
    }
}

fn st_info(bind: u8, typ: u8) -> u8 {
    (bind << 4) | (typ & 0xF)
}

/// String table with the conventional leading NUL. Not deduplicated; every
/// name this tool emits is distinct.
struct StrTab {
    bytes: Vec<u8>,
}

impl StrTab {
    fn new() -> Self {
        Self { bytes: vec![0] }
    }

    fn add(&mut self, s: &str) -> u32 {
        let offset = self.bytes.len() as u32;
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        offset
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }
}

/// Assemble the complete executable image in memory. All offsets are
/// computed in one pass; function bytes land at `address - code_start`
/// within the text region, with any padding between placements zeroed.
pub fn build_image(linked: &Linked) -> Vec<u8> {
    let mut strtab = StrTab::new();
    let mut shstrtab = StrTab::new();

    // Symbol order: null, the three section symbols, functions in
    // registration order, then objects. Every symbol is local, so the
    // symtab header's `info` (one past the last local) is the total count.
    let mut symbols = vec![
        Symbol {
            name: 0,
            info: st_info(STB_LOCAL, 0),
            shndx: SHN_UNDEF,
            value: 0,
            size: 0,
        },
        Symbol {
            name: strtab.add(".text"),
            info: st_info(STB_LOCAL, STT_SECTION),
            shndx: TEXT_SECTION_INDEX,
            value: linked.code_start,
            size: 0,
        },
        Symbol {
            name: strtab.add(".data"),
            info: st_info(STB_LOCAL, STT_SECTION),
            shndx: DATA_SECTION_INDEX,
            value: linked.data_start,
            size: 0,
        },
        Symbol {
            name: strtab.add(".bss"),
            info: st_info(STB_LOCAL, STT_SECTION),
            shndx: BSS_SECTION_INDEX,
            value: linked.bss_start,
            size: 0,
        },
    ];
    for (name, entry) in &linked.functions {
        symbols.push(Symbol {
            name: strtab.add(name),
            info: st_info(STB_LOCAL, STT_FUNC),
            shndx: TEXT_SECTION_INDEX,
            value: entry.address,
            size: entry.bytes.len() as u64,
        });
    }
    for (name, object) in &linked.objects {
        symbols.push(Symbol {
            name: strtab.add(name),
            info: st_info(STB_LOCAL, STT_OBJECT),
            shndx: BSS_SECTION_INDEX,
            value: linked.bss_start + object.offset,
            size: object.size,
        });
    }

    let text_name = shstrtab.add(".text");
    let data_name = shstrtab.add(".data");
    let bss_name = shstrtab.add(".bss");
    let symtab_name = shstrtab.add(".symtab");
    let strtab_name = shstrtab.add(".strtab");
    let shstrtab_name = shstrtab.add(".shstrtab");

    let phoff = EHDR_SIZE as u64;
    let text_offset = phoff + 2 * PHDR_SIZE as u64;
    let data_offset = text_offset + linked.code_size;
    let symtab_size = (symbols.len() * SYM_SIZE) as u64;
    let symtab_offset = data_offset; // the data region is empty
    let strtab_offset = symtab_offset + symtab_size;
    let shstrtab_offset = strtab_offset + strtab.len() as u64;
    let shoff = shstrtab_offset + shstrtab.len() as u64;

    let header = FileHeader {
        entry: linked.entry_address,
        phoff,
        shoff,
        phnum: 2,
        shnum: NUM_SECTIONS,
        shstrndx: SHSTRTAB_SECTION_INDEX,
    };

    let code_phdr = ProgramHeader {
        p_type: PT_LOAD,
        flags: SegmentFlags::R | SegmentFlags::X,
        offset: text_offset,
        vaddr: linked.code_start,
        filesz: linked.code_size,
        memsz: linked.code_size,
    };
    let data_phdr = ProgramHeader {
        p_type: PT_LOAD,
        flags: SegmentFlags::R | SegmentFlags::W,
        offset: data_offset,
        vaddr: linked.data_start,
        filesz: linked.data_size,
        memsz: linked.data_size + linked.bss_size,
    };

    let sections = [
        SectionHeader { sh_type: SHT_NULL, ..SectionHeader::default() },
        SectionHeader {
            name: text_name,
            sh_type: SHT_PROGBITS,
            flags: (SectionFlags::ALLOC | SectionFlags::EXECINSTR).bits(),
            addr: linked.code_start,
            offset: text_offset,
            size: linked.code_size,
            addralign: 2,
            ..SectionHeader::default()
        },
        SectionHeader {
            name: data_name,
            sh_type: SHT_PROGBITS,
            flags: (SectionFlags::ALLOC | SectionFlags::WRITE).bits(),
            addr: linked.data_start,
            offset: data_offset,
            size: linked.data_size,
            addralign: 8,
            ..SectionHeader::default()
        },
        SectionHeader {
            name: bss_name,
            sh_type: SHT_NOBITS,
            flags: (SectionFlags::ALLOC | SectionFlags::WRITE).bits(),
            addr: linked.bss_start,
            offset: data_offset,
            size: linked.bss_size,
            addralign: 8,
            ..SectionHeader::default()
        },
        SectionHeader {
            name: symtab_name,
            sh_type: SHT_SYMTAB,
            offset: symtab_offset,
            size: symtab_size,
            link: u32::from(STRTAB_SECTION_INDEX),
            info: symbols.len() as u32,
            addralign: 8,
            entsize: SYM_SIZE as u64,
            ..SectionHeader::default()
        },
        SectionHeader {
            name: strtab_name,
            sh_type: SHT_STRTAB,
            offset: strtab_offset,
            size: strtab.len() as u64,
            addralign: 1,
            ..SectionHeader::default()
        },
        SectionHeader {
            name: shstrtab_name,
            sh_type: SHT_STRTAB,
            offset: shstrtab_offset,
            size: shstrtab.len() as u64,
            addralign: 1,
            ..SectionHeader::default()
        },
    ];

    let total = shoff as usize + SHDR_SIZE * NUM_SECTIONS as usize;
    let mut image = Vec::with_capacity(total);
    image.extend_from_slice(&header.encode());
    image.extend_from_slice(&code_phdr.encode());
    image.extend_from_slice(&data_phdr.encode());

    image.resize(data_offset as usize, 0);
    for entry in linked.functions.values() {
        let start = text_offset as usize + (entry.address - linked.code_start) as usize;
        image[start..start + entry.bytes.len()].copy_from_slice(&entry.bytes);
    }

    for symbol in &symbols {
        image.extend_from_slice(&symbol.encode());
    }
    image.extend_from_slice(&strtab.bytes);
    image.extend_from_slice(&shstrtab.bytes);
    for section in &sections {
        image.extend_from_slice(&section.encode());
    }
    image
}
