//! Symbol-aware disassembly: walks an executable section's bytes through the
//! x86 decoder, formatting each instruction `objdump -d -Mintel` style and
//! labeling known function symbols as it goes.

use crate::bytes::ByteReader;
use crate::elf::Elf;
use crate::error::Result;
use crate::x86::{decode, format_instruction};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Caller-controlled knobs for [`disassemble_section`], since the core has no
/// on-disk configuration of its own (see the crate's design notes on
/// ambient configuration).
#[derive(Debug, Clone, Copy)]
pub struct DisasOptions {
    /// Resolve branch targets against known symbols / print absolute hex
    /// addresses; when false, falls back to signed relative offsets.
    pub symbol_relative: bool,
    /// Maximum instruction bytes shown per line before a continuation line.
    pub bytes_per_line: usize,
}

impl Default for DisasOptions {
    fn default() -> DisasOptions {
        DisasOptions { symbol_relative: true, bytes_per_line: 7 }
    }
}

/// Disassembles `section_index` of `elf`, returning one line of text per
/// output line (matching §4.7's line format, including symbol-name headers
/// and continuation lines for instructions longer than `bytes_per_line`).
pub fn disassemble_section(elf: &Elf, section_index: usize, options: &DisasOptions) -> Result<Vec<String>> {
    let sh = elf
        .section_headers
        .get(section_index)
        .ok_or_else(|| crate::error::Error::InvalidArgument(format!("no section at index {section_index}")))?;
    let base = sh.addr;
    let bytes = elf.section_raw_bytes(section_index).unwrap_or(&[]);

    let mut symbols: BTreeMap<u64, String> = BTreeMap::new();
    if options.symbol_relative {
        for sym in elf.function_symbols_in_section(section_index) {
            symbols.insert(sym.value, sym.name.clone());
        }
    }

    log::trace!("disassembling section {:?} ({} bytes, base 0x{:x})", sh.name, bytes.len(), base);

    let mut lines = Vec::new();
    let mut reader = ByteReader::new(bytes);
    let mut at_start = true;

    while reader.remaining() > 0 {
        let addr = base + reader.cursor() as u64;

        if let Some(name) = symbols.get(&addr) {
            if !at_start {
                lines.push(String::new());
            }
            lines.push(format!("{:016x} <{}>:", addr, name));
        }
        at_start = false;

        let start_cursor = reader.cursor();
        let (inst, consumed) = decode(&mut reader)?;
        let next_addr = addr + consumed as u64;
        let text = format_instruction(&inst, options.symbol_relative.then_some(next_addr));

        let inst_bytes = &bytes[start_cursor..start_cursor + consumed];
        lines.push(format_instruction_line(addr, inst_bytes, &text, options.bytes_per_line));
    }

    Ok(lines)
}

fn format_instruction_line(addr: u64, inst_bytes: &[u8], text: &str, bytes_per_line: usize) -> String {
    let mut out = String::new();
    let (first, rest) = inst_bytes.split_at(inst_bytes.len().min(bytes_per_line));
    let _ = write!(out, "{:8x}:\t{}\t{}", addr, hex_bytes(first, bytes_per_line), text);

    for (i, chunk) in rest.chunks(bytes_per_line).enumerate() {
        out.push('\n');
        let line_addr = addr + bytes_per_line as u64 * (i + 1) as u64;
        let _ = write!(out, "{:8x}:\t{}", line_addr, hex_bytes(chunk, bytes_per_line));
    }
    out
}

fn hex_bytes(bytes: &[u8], width: usize) -> String {
    let mut parts: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    while parts.len() < width {
        parts.push("  ".to_string());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::header::{Class, Data, FileHeader, Isa, ObjType, OsAbi};
    use crate::elf::section::{self, Section};
    use crate::elf::section_header::{SectionFlags, SectionHeader, SectionType};
    use crate::elf::symbol::{SymbolBinding, SymbolEntry, SymbolType, SymbolVisibility};
    use crate::bytes::ByteWriter;

    fn build_image_with_function() -> (Vec<u8>, usize) {
        // `push rbp; ret` at vaddr 0x1000, with a FUNC symbol "start" at 0x1000.
        let text_bytes = vec![0x55, 0xC3];
        let symtab_entries = vec![SymbolEntry {
            name_offset: 1,
            name: String::new(),
            binding: SymbolBinding::Global,
            symbol_type: SymbolType::Func,
            visibility: SymbolVisibility::Default,
            shndx: 1,
            value: 0x1000,
            size: 2,
        }];
        let mut dynstr = vec![0u8];
        section::intern_string(&mut dynstr, "start");
        let symtab_bytes = {
            let mut w = ByteWriter::new();
            for e in &symtab_entries {
                e.write(&mut w, Class::Elf64);
            }
            w.into_bytes()
        };

        let mut shstrtab = vec![0u8];
        let text_name = section::intern_string(&mut shstrtab, ".text");
        let symtab_name = section::intern_string(&mut shstrtab, ".symtab");
        let strtab_name = section::intern_string(&mut shstrtab, ".strtab");
        let shstrtab_name = section::intern_string(&mut shstrtab, ".shstrtab");

        let ehsize = 64usize;
        let text_off = ehsize;
        let symtab_off = text_off + text_bytes.len();
        let strtab_off = symtab_off + symtab_bytes.len();
        let shstrtab_off = strtab_off + dynstr.len();
        let shoff = shstrtab_off + shstrtab.len();

        let header = FileHeader {
            class: Class::Elf64,
            data: Data::Little,
            version: 1,
            os_abi: OsAbi::SystemV,
            abi_version: 0,
            obj_type: ObjType::Relocatable,
            isa: Isa::X86_64,
            entry: 0,
            phoff: 0,
            shoff: shoff as u64,
            flags: 0,
            ehsize: 64,
            phentsize: 0,
            phnum: 0,
            shentsize: SectionHeader::entry_size(Class::Elf64) as u16,
            shnum: 5,
            shstrndx: 4,
        };

        let null_sh = SectionHeader {
            name_offset: 0,
            name: String::new(),
            section_type: SectionType::Null,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: 0,
            size: 0,
            link: 0,
            info: 0,
            addralign: 0,
            entsize: 0,
        };
        let text_sh = SectionHeader {
            name_offset: text_name,
            name: ".text".into(),
            section_type: SectionType::ProgBits,
            flags: SectionFlags::ALLOC | SectionFlags::EXECINSTR,
            addr: 0x1000,
            offset: text_off as u64,
            size: text_bytes.len() as u64,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        };
        let symtab_sh = SectionHeader {
            name_offset: symtab_name,
            name: ".symtab".into(),
            section_type: SectionType::SymTab,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: symtab_off as u64,
            size: symtab_bytes.len() as u64,
            link: 3,
            info: 0,
            addralign: 8,
            entsize: SymbolEntry::entry_size(Class::Elf64) as u64,
        };
        let strtab_sh = SectionHeader {
            name_offset: strtab_name,
            name: ".strtab".into(),
            section_type: SectionType::StrTab,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: strtab_off as u64,
            size: dynstr.len() as u64,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        };
        let shstrtab_sh = SectionHeader {
            name_offset: shstrtab_name,
            name: ".shstrtab".into(),
            section_type: SectionType::StrTab,
            flags: SectionFlags::empty(),
            addr: 0,
            offset: shstrtab_off as u64,
            size: shstrtab.len() as u64,
            link: 0,
            info: 0,
            addralign: 1,
            entsize: 0,
        };

        let mut writer = ByteWriter::new();
        header.write(&mut writer);
        writer.pad_to(text_off);
        writer.write_bytes(&text_bytes);
        writer.pad_to(symtab_off);
        writer.write_bytes(&symtab_bytes);
        writer.pad_to(strtab_off);
        writer.write_bytes(&dynstr);
        writer.pad_to(shstrtab_off);
        writer.write_bytes(&shstrtab);
        writer.pad_to(shoff);
        null_sh.write(&mut writer, Class::Elf64);
        text_sh.write(&mut writer, Class::Elf64);
        symtab_sh.write(&mut writer, Class::Elf64);
        strtab_sh.write(&mut writer, Class::Elf64);
        shstrtab_sh.write(&mut writer, Class::Elf64);

        (writer.into_bytes(), 1)
    }

    #[test]
    fn disassembles_function_with_symbol_header() {
        let (bytes, text_index) = build_image_with_function();
        let elf = Elf::parse(&bytes).unwrap();
        if let Some(Section::SymbolTable(entries)) = elf.section_payload(2) {
            assert_eq!(entries[0].name, "start");
        } else {
            panic!("expected symbol table section");
        }

        let lines = disassemble_section(&elf, text_index, &DisasOptions::default()).unwrap();
        assert_eq!(lines[0], "0000000000001000 <start>:");
        assert!(lines[1].contains("push"));
        assert!(lines[2].contains("ret"));
    }

    #[test]
    fn formats_instruction_line_with_address_and_bytes() {
        let line = format_instruction_line(0x1000, &[0x55], "push   rbp", 7);
        assert_eq!(line, "    1000:\t55                  \tpush   rbp");
    }
}
