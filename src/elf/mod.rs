//! ELF64/ELF32 container codec: `parse` reads a whole-file byte buffer into a
//! structured [`Elf`]; `write` is its strict byte-for-byte inverse for any
//! file the parser accepted.

pub mod dynamic;
pub mod gnu_hash;
pub mod gnu_version;
pub mod header;
pub mod note;
pub mod program_header;
pub mod relocation;
pub mod section;
pub mod section_header;
pub mod symbol;

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

pub use dynamic::DynamicEntry;
pub use gnu_hash::GnuHash;
pub use header::{Class, Data, FileHeader, Isa, ObjType, OsAbi};
pub use program_header::ProgramHeader;
pub use relocation::RelocationEntry;
pub use section::Section;
pub use section_header::{SectionHeader, SectionType};
pub use symbol::SymbolEntry;

/// A fully parsed ELF file: the header, every program/section header, and
/// each section's raw on-disk bytes plus its interpreted payload.
#[derive(Debug, Clone)]
pub struct Elf {
    pub header: FileHeader,
    pub program_headers: Vec<ProgramHeader>,
    pub section_headers: Vec<SectionHeader>,
    section_bytes: Vec<Vec<u8>>,
    sections: Vec<Section>,
}

impl Elf {
    pub fn parse(bytes: &[u8]) -> Result<Elf> {
        log::debug!("parsing ELF file ({} bytes)", bytes.len());
        let mut reader = ByteReader::new(bytes);
        let header = FileHeader::parse(&mut reader)?;
        let class = header.class;
        let endianness = header.data.endianness();

        let mut section_headers = Vec::with_capacity(header.shnum as usize);
        for i in 0..header.shnum as usize {
            let mut sh_reader = ByteReader::with_endianness(bytes, endianness);
            sh_reader.seek(header.shoff as usize + i * header.shentsize as usize)?;
            section_headers.push(SectionHeader::parse(&mut sh_reader, class)?);
        }

        if (header.shstrndx as usize) < section_headers.len() {
            let shstrtab = read_section_bytes(bytes, &section_headers[header.shstrndx as usize])?;
            for sh in &mut section_headers {
                sh.name = section::lookup_string(&shstrtab, sh.name_offset);
            }
        }

        let mut section_bytes = Vec::with_capacity(section_headers.len());
        for sh in &section_headers {
            section_bytes.push(read_section_bytes(bytes, sh)?);
        }

        for (sh, raw) in section_headers.iter().zip(section_bytes.iter()) {
            if sh.entsize != 0 && sh.section_type != SectionType::NoBits {
                let expected_multiple = raw.len() % sh.entsize as usize;
                if expected_multiple != 0 {
                    let err = Error::MalformedElf(format!(
                        "section {:?} size {} is not a multiple of entsize {}",
                        sh.name,
                        raw.len(),
                        sh.entsize
                    ));
                    log::warn!("{err}");
                    return Err(err);
                }
            }
        }

        let mut sections = Vec::with_capacity(section_headers.len());
        for (i, sh) in section_headers.iter().enumerate() {
            sections.push(interpret_section(sh, &section_bytes, i, class)?);
        }

        let ph_entry_size = ProgramHeader::entry_size(class);
        let mut program_headers = Vec::with_capacity(header.phnum as usize);
        for i in 0..header.phnum as usize {
            let mut ph_reader = ByteReader::with_endianness(bytes, endianness);
            ph_reader.seek(header.phoff as usize + i * header.phentsize.max(ph_entry_size as u16) as usize)?;
            program_headers.push(ProgramHeader::parse(&mut ph_reader, class)?);
        }

        Ok(Elf { header, program_headers, section_headers, section_bytes, sections })
    }

    /// Re-emits this ELF's bytes. Layout: file header, then each section's
    /// raw bytes at its original file offset, then the section header table
    /// at `shoff`, then program headers at `phoff`.
    pub fn write(&self) -> Vec<u8> {
        let class = self.header.class;
        let mut writer = ByteWriter::with_endianness(self.header.data.endianness());
        self.header.write(&mut writer);

        for (sh, raw) in self.section_headers.iter().zip(self.section_bytes.iter()) {
            if sh.section_type == SectionType::NoBits || raw.is_empty() {
                continue;
            }
            writer.pad_to(sh.offset as usize);
            writer.write_bytes(raw);
        }

        writer.pad_to(self.header.shoff as usize);
        for (i, sh) in self.section_headers.iter().enumerate() {
            writer.pad_to(self.header.shoff as usize + i * self.header.shentsize as usize);
            sh.write(&mut writer, class);
        }

        let ph_entry_size = ProgramHeader::entry_size(class);
        let ph_stride = self.header.phentsize.max(ph_entry_size as u16) as usize;
        writer.pad_to(self.header.phoff as usize);
        for (i, ph) in self.program_headers.iter().enumerate() {
            writer.pad_to(self.header.phoff as usize + i * ph_stride);
            ph.write(&mut writer, class);
        }

        writer.into_bytes()
    }

    pub fn section_by_name(&self, name: &str) -> Option<(usize, &SectionHeader)> {
        self.section_headers.iter().enumerate().find(|(_, sh)| sh.name == name)
    }

    pub fn section_payload(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn section_raw_bytes(&self, index: usize) -> Option<&[u8]> {
        self.section_bytes.get(index).map(|v| v.as_slice())
    }

    pub fn executable_sections(&self) -> impl Iterator<Item = usize> + '_ {
        self.section_headers.iter().enumerate().filter(|(_, sh)| sh.is_executable()).map(|(i, _)| i)
    }

    /// Symbols whose `shndx` points at `section_index`, restricted to `FUNC`
    /// type and `GLOBAL`-or-`HIDDEN` visibility, as used by symbol-aware
    /// disassembly.
    pub fn function_symbols_in_section(&self, section_index: usize) -> Vec<&SymbolEntry> {
        let mut out = Vec::new();
        for section in &self.sections {
            if let Section::SymbolTable(entries) = section {
                for sym in entries {
                    if sym.is_func() && sym.is_global_or_hidden() && sym.shndx as usize == section_index {
                        out.push(sym);
                    }
                }
            }
        }
        out
    }
}

fn read_section_bytes(bytes: &[u8], sh: &SectionHeader) -> Result<Vec<u8>> {
    if sh.section_type == SectionType::NoBits || sh.size == 0 {
        return Ok(Vec::new());
    }
    let start = sh.offset as usize;
    let end = start.checked_add(sh.size as usize).ok_or_else(|| {
        let err = Error::MalformedElf("section size overflow".into());
        log::warn!("{err}");
        err
    })?;
    if end > bytes.len() {
        let err = Error::OutOfBounds { offset: start, requested: sh.size as usize, len: bytes.len() };
        log::warn!("{err}");
        return Err(err);
    }
    Ok(bytes[start..end].to_vec())
}

fn interpret_section(
    sh: &SectionHeader,
    section_bytes: &[Vec<u8>],
    index: usize,
    class: Class,
) -> Result<Section> {
    let raw = &section_bytes[index];
    Ok(match sh.section_type {
        SectionType::Null => Section::Raw(Vec::new()),
        SectionType::NoBits => Section::NoBits,
        SectionType::StrTab => Section::StringTable(raw.clone()),
        SectionType::SymTab | SectionType::DynSym => {
            Section::SymbolTable(resolve_symbol_names(symbol::parse_symbol_table(raw, class)?, section_bytes, sh.link))
        }
        SectionType::Rel => Section::RelocationTable {
            entries: relocation::parse_relocation_table(raw, class, false)?,
            has_addend: false,
        },
        SectionType::Rela => Section::RelocationTable {
            entries: relocation::parse_relocation_table(raw, class, true)?,
            has_addend: true,
        },
        SectionType::GnuHash => Section::GnuHashTable(gnu_hash::GnuHash::parse(raw, class)?),
        SectionType::GnuVerdef => Section::GnuVersionDef(gnu_version::parse_verdef(raw)?),
        SectionType::GnuVerneed => Section::GnuVersionNeed(gnu_version::parse_verneed(raw)?),
        SectionType::GnuVersym => Section::GnuVersionSym(gnu_version::parse_versym(raw)?),
        SectionType::Dynamic => Section::DynamicTable(dynamic::parse_dynamic_table(raw, class)?),
        SectionType::Note => Section::NoteSection(note::parse_note_section(raw)?),
        SectionType::InitArray | SectionType::FiniArray => Section::ConstructorsArray(raw.clone()),
        SectionType::ProgBits => Section::ProgBits(raw.clone()),
        SectionType::Hash | SectionType::Shlib | SectionType::Other(_) => Section::Raw(raw.clone()),
    })
}

fn resolve_symbol_names(
    mut entries: Vec<SymbolEntry>,
    section_bytes: &[Vec<u8>],
    link: u32,
) -> Vec<SymbolEntry> {
    if let Some(strtab) = section_bytes.get(link as usize) {
        for entry in &mut entries {
            entry.name = section::lookup_string(strtab, entry.name_offset);
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::header::{Data, ObjType, OsAbi};
    use crate::elf::section_header::SectionFlags;

    /// Builds a small, self-consistent 64-bit ELF image in memory (file
    /// header + one `.text` PROGBITS section + a `.shstrtab` + the section
    /// header table) so round-trip tests don't depend on a real binary on
    /// disk.
    fn build_sample_image() -> Vec<u8> {
        let text_bytes = vec![0xC3u8]; // `ret`
        let mut shstrtab = vec![0u8];
        let text_name_off = section::intern_string(&mut shstrtab, ".text");
        let shstrtab_name_off = section::intern_string(&mut shstrtab, ".shstrtab");

        let ehsize = 64usize;
        let text_off = ehsize;
        let shstrtab_off = text_off + text_bytes.len();
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
            shnum: 3,
            shstrndx: 2,
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
            name_offset: text_name_off,
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
        let shstrtab_sh = SectionHeader {
            name_offset: shstrtab_name_off,
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
        writer.pad_to(shstrtab_off);
        writer.write_bytes(&shstrtab);
        writer.pad_to(shoff);
        null_sh.write(&mut writer, Class::Elf64);
        text_sh.write(&mut writer, Class::Elf64);
        shstrtab_sh.write(&mut writer, Class::Elf64);

        writer.into_bytes()
    }

    #[test]
    fn parses_sample_image() {
        let bytes = build_sample_image();
        let elf = Elf::parse(&bytes).unwrap();
        assert_eq!(elf.header.class, Class::Elf64);
        assert_eq!(elf.section_headers.len(), 3);
        assert_eq!(elf.section_headers[1].name, ".text");
        assert_eq!(elf.section_headers[2].name, ".shstrtab");
        let (idx, _) = elf.section_by_name(".text").unwrap();
        assert!(elf.executable_sections().any(|i| i == idx));
    }

    #[test]
    fn round_trips_sample_image_byte_for_byte() {
        let bytes = build_sample_image();
        let elf = Elf::parse(&bytes).unwrap();
        let rewritten = elf.write();
        assert_eq!(rewritten, bytes);
    }

    #[test]
    fn rejects_section_size_not_multiple_of_entsize() {
        let mut bytes = build_sample_image();
        // Corrupt .text's entsize to something its size isn't a multiple of.
        let elf = Elf::parse(&bytes).unwrap();
        let text_header_offset =
            elf.header.shoff as usize + 1 * elf.header.shentsize as usize + 56; // entsize is the last u64 field
        bytes[text_header_offset..text_header_offset + 8].copy_from_slice(&3u64.to_le_bytes());
        assert!(matches!(Elf::parse(&bytes), Err(Error::MalformedElf(_))));
    }
}
