use pretty_assertions::assert_eq;

use rvasm_rs::analyze;
use rvasm_rs::ast::{AddressPair, Item};
use rvasm_rs::compile::parse_items;
use rvasm_rs::encode::{self, FnCode};
use rvasm_rs::error::Error;
use rvasm_rs::link::{Linked, Linker};

fn encoded(body: &str) -> FnCode {
    let src = format!("func t {{\n{body}\n}}");
    let mut items = parse_items(&src).unwrap();
    let Item::Function(mut func) = items.remove(0) else {
        panic!("expected function item");
    };
    analyze::analyze_function(&mut func).unwrap();
    encode::encode_function(&func.insts).unwrap()
}

fn blob(len: usize) -> FnCode {
    FnCode { bytes: vec![0; len], fixups: Vec::new() }
}

fn pair(function: &str, address: u64) -> AddressPair {
    AddressPair {
        function: function.to_string(),
        imm_text: format!("0x{address:x}"),
        address,
    }
}

#[test]
fn auto_placement_packs_from_code_start() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f1");
    linker.add_function("f1", blob(8)).unwrap();
    linker.add_function("f2", blob(4)).unwrap();
    linker.add_function("f3", blob(2)).unwrap();
    let linked = linker.finalize().unwrap();

    assert_eq!(linked.functions["f1"].address, 0x1000);
    assert_eq!(linked.functions["f2"].address, 0x1008);
    assert_eq!(linked.functions["f3"].address, 0x100C);
    assert_eq!(linked.code_size, 14);
    assert_eq!(linked.entry_address, 0x1000);
}

#[test]
fn explicit_placements_come_first() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f2");
    linker.set_addresses(vec![pair("f1", 0x2000)]);
    linker.add_function("f1", blob(8)).unwrap();
    linker.add_function("f2", blob(4)).unwrap();
    linker.add_function("f3", blob(2)).unwrap();
    let linked = linker.finalize().unwrap();

    // The explicit placement grows the high-water mark; the remaining
    // functions pack after it in registration order.
    assert_eq!(linked.functions["f1"].address, 0x2000);
    assert_eq!(linked.functions["f2"].address, 0x2008);
    assert_eq!(linked.functions["f3"].address, 0x200C);
    assert_eq!(linked.code_size, 0x100E);
}

#[test]
fn placements_are_disjoint() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("a");
    linker.set_addresses(vec![pair("c", 0x1100)]);
    linker.add_function("a", blob(6)).unwrap();
    linker.add_function("b", blob(10)).unwrap();
    linker.add_function("c", blob(4)).unwrap();
    let linked = linker.finalize().unwrap();

    let mut ranges: Vec<(u64, u64)> = linked
        .functions
        .values()
        .map(|f| (f.address, f.address + f.bytes.len() as u64))
        .collect();
    ranges.sort();
    for window in ranges.windows(2) {
        assert!(window[0].1 <= window[1].0, "overlap: {window:?}");
    }
}

#[test]
fn data_region_starts_on_the_next_page() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.add_function("f", blob(8)).unwrap();
    linker.add_object("buf", 0x40).unwrap();
    linker.add_object("tail", 8).unwrap();
    let linked = linker.finalize().unwrap();

    assert_eq!(linked.data_start, 0x2000);
    assert_eq!(linked.data_size, 0);
    assert_eq!(linked.bss_start, 0x2000);
    assert_eq!(linked.bss_size, 0x48);
    assert_eq!(linked.objects["buf"].offset, 0);
    assert_eq!(linked.objects["tail"].offset, 0x40);
}

#[test]
fn page_aligned_code_end_is_not_padded() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.add_function("f", blob(0x1000)).unwrap();
    let linked = linker.finalize().unwrap();
    assert_eq!(linked.data_start, 0x2000);
}

#[test]
fn explicit_placement_before_code_start_is_fatal() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.set_addresses(vec![pair("f", 0x100)]);
    linker.add_function("f", blob(4)).unwrap();
    assert!(matches!(
        linker.finalize(),
        Err(Error::EndsBeforeCodeStart { address: 0x100, .. })
    ));
}

#[test]
fn address_for_unknown_function_is_fatal() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.set_addresses(vec![pair("ghost", 0x2000)]);
    linker.add_function("f", blob(4)).unwrap();
    assert!(matches!(
        linker.finalize(),
        Err(Error::UnknownFunction(name)) if name == "ghost"
    ));
}

#[test]
fn duplicate_names_are_fatal() {
    let mut linker = Linker::new();
    linker.add_function("f", blob(4)).unwrap();
    assert!(matches!(
        linker.add_function("f", blob(4)),
        Err(Error::DuplicateSymbol(_))
    ));
    linker.add_object("buf", 8).unwrap();
    assert!(matches!(
        linker.add_object("buf", 8),
        Err(Error::DuplicateSymbol(_))
    ));
}

#[test]
fn missing_entry_function_is_fatal() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("nope");
    linker.add_function("f", blob(4)).unwrap();
    assert!(matches!(
        linker.finalize(),
        Err(Error::EntryMissing(name)) if name == "nope"
    ));
}

#[test]
fn forward_jump_is_patched() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f1");
    linker.add_function("f1", encoded("jal ra, other")).unwrap();
    linker.add_function("other", encoded("lui a0, 0x5")).unwrap();
    let linked = linker.finalize().unwrap();

    // f1 at 0x1000, other at 0x1004: offset +4.
    assert_eq!(linked.functions["other"].address, 0x1004);
    assert_eq!(linked.functions["f1"].bytes, vec![0xEF, 0x00, 0x40, 0x00]);
}

#[test]
fn backward_jump_is_patched() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f1");
    linker.add_function("f1", encoded("lui a0, 0x40")).unwrap();
    linker.add_function("f2", encoded("jal zero, f1")).unwrap();
    let linked = linker.finalize().unwrap();

    // f2 at 0x1004 jumping back to 0x1000: offset -4.
    assert_eq!(linked.functions["f2"].bytes, vec![0x6F, 0xF0, 0xDF, 0xFF]);
}

#[test]
fn load_immediate_resolves_object_addresses() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.add_function("f", encoded("li a0, buf")).unwrap();
    linker.add_object("buf", 0x40).unwrap();
    let linked = linker.finalize().unwrap();

    // buf lives at bss_start = 0x2000.
    assert_eq!(
        linked.functions["f"].bytes,
        vec![
            0x37, 0x25, 0x00, 0x00, // lui a0, 0x2
            0x1B, 0x05, 0x05, 0x00, // addiw a0, a0, 0
        ]
    );
}

#[test]
fn jump_to_unknown_symbol_is_fatal() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.add_function("f", encoded("jal ra, ghost")).unwrap();
    assert!(matches!(
        linker.finalize(),
        Err(Error::UnknownJumpTarget(name)) if name == "ghost"
    ));
}

#[test]
fn jump_offset_overflow_is_fatal() {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("f");
    linker.set_addresses(vec![pair("f", 0x1000), pair("far", 0x200000)]);
    linker.add_function("f", encoded("jal ra, far")).unwrap();
    linker.add_function("far", encoded("lui a0, 0x5")).unwrap();
    assert!(matches!(linker.finalize(), Err(Error::OffsetRange(_))));
}

#[test]
fn patching_is_idempotent() {
    let mut bytes = vec![0xEF, 0x00, 0x00, 0x00];
    encode::patch_jump(&mut bytes, 0, 0x6F, 1, 0x20);
    let once = bytes.clone();
    encode::patch_jump(&mut bytes, 0, 0x6F, 1, 0x20);
    assert_eq!(bytes, once);

    let mut buf = vec![0u8; 8];
    encode::patch_load_imm(&mut buf, 0, 10, 0x2000);
    let once = buf.clone();
    encode::patch_load_imm(&mut buf, 0, 10, 0x2000);
    assert_eq!(buf, once);
}

fn demo_link() -> Linked {
    let mut linker = Linker::new();
    linker.set_code_start(0x1000);
    linker.set_entry("main");
    linker.add_function("main", encoded("jal ra, other")).unwrap();
    linker.add_function("other", encoded("lui a0, 0x5")).unwrap();
    linker.add_object("buf", 0x40).unwrap();
    linker.finalize().unwrap()
}

#[test]
fn identical_inputs_link_identically() {
    let first = demo_link();
    let second = demo_link();
    for (name, entry) in &first.functions {
        assert_eq!(entry.bytes, second.functions[name.as_str()].bytes);
        assert_eq!(entry.address, second.functions[name.as_str()].address);
    }
}

#[test]
fn link_map_reports_symbols() {
    let linked = demo_link();
    let map = linked.map();
    assert_eq!(map.entry, 0x1000);
    assert_eq!(map.sections[0].name, ".text");
    let main = map.symbols.iter().find(|s| s.name == "main").unwrap();
    assert_eq!(main.kind, "func");
    assert_eq!(main.address, 0x1000);
    let buf = map.symbols.iter().find(|s| s.name == "buf").unwrap();
    assert_eq!(buf.kind, "object");
    assert_eq!(buf.address, linked.bss_start);
}
