//! Section headers (the `e_shoff`/`e_shnum` table). Resolving `name` into text
//! requires the `shstrtab` section, so it's left as a raw offset here and
//! resolved by [`crate::elf::Elf`] once every section header has been read.

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SectionFlags: u64 {
        const WRITE = 0x1;
        const ALLOC = 0x2;
        const EXECINSTR = 0x4;
        const MERGE = 0x10;
        const STRINGS = 0x20;
        const INFO_LINK = 0x40;
        const LINK_ORDER = 0x80;
        const GROUP = 0x200;
        const TLS = 0x400;
        const COMPRESSED = 0x800;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionType {
    Null,
    ProgBits,
    SymTab,
    StrTab,
    Rela,
    Hash,
    Dynamic,
    Note,
    NoBits,
    Rel,
    Shlib,
    DynSym,
    InitArray,
    FiniArray,
    GnuHash,
    GnuVersym,
    GnuVerneed,
    GnuVerdef,
    Other(u32),
}

impl SectionType {
    pub fn from_u32(v: u32) -> SectionType {
        match v {
            0 => SectionType::Null,
            1 => SectionType::ProgBits,
            2 => SectionType::SymTab,
            3 => SectionType::StrTab,
            4 => SectionType::Rela,
            5 => SectionType::Hash,
            6 => SectionType::Dynamic,
            7 => SectionType::Note,
            8 => SectionType::NoBits,
            9 => SectionType::Rel,
            10 => SectionType::Shlib,
            11 => SectionType::DynSym,
            14 => SectionType::InitArray,
            15 => SectionType::FiniArray,
            0x6fff_fff6 => SectionType::GnuHash,
            0x6fff_ffff => SectionType::GnuVersym,
            0x6fff_fffe => SectionType::GnuVerneed,
            0x6fff_fffd => SectionType::GnuVerdef,
            other => SectionType::Other(other),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            SectionType::Null => 0,
            SectionType::ProgBits => 1,
            SectionType::SymTab => 2,
            SectionType::StrTab => 3,
            SectionType::Rela => 4,
            SectionType::Hash => 5,
            SectionType::Dynamic => 6,
            SectionType::Note => 7,
            SectionType::NoBits => 8,
            SectionType::Rel => 9,
            SectionType::Shlib => 10,
            SectionType::DynSym => 11,
            SectionType::InitArray => 14,
            SectionType::FiniArray => 15,
            SectionType::GnuHash => 0x6fff_fff6,
            SectionType::GnuVersym => 0x6fff_ffff,
            SectionType::GnuVerneed => 0x6fff_fffe,
            SectionType::GnuVerdef => 0x6fff_fffd,
            SectionType::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub name_offset: u32,
    pub name: String,
    pub section_type: SectionType,
    pub flags: SectionFlags,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub info: u32,
    pub addralign: u64,
    pub entsize: u64,
}

impl SectionHeader {
    /// Parses the fixed-width fields; `name` is filled in afterward once
    /// `shstrtab`'s bytes are available (left empty here).
    pub fn parse(reader: &mut ByteReader, class: Class) -> Result<SectionHeader> {
        let name_offset = reader.read_u32()?;
        let section_type = SectionType::from_u32(reader.read_u32()?);
        match class {
            Class::Elf64 => {
                let flags = SectionFlags::from_bits_truncate(reader.read_u64()?);
                let addr = reader.read_u64()?;
                let offset = reader.read_u64()?;
                let size = reader.read_u64()?;
                let link = reader.read_u32()?;
                let info = reader.read_u32()?;
                let addralign = reader.read_u64()?;
                let entsize = reader.read_u64()?;
                Ok(SectionHeader {
                    name_offset,
                    name: String::new(),
                    section_type,
                    flags,
                    addr,
                    offset,
                    size,
                    link,
                    info,
                    addralign,
                    entsize,
                })
            }
            Class::Elf32 => {
                let flags = SectionFlags::from_bits_truncate(reader.read_u32()? as u64);
                let addr = reader.read_u32()? as u64;
                let offset = reader.read_u32()? as u64;
                let size = reader.read_u32()? as u64;
                let link = reader.read_u32()?;
                let info = reader.read_u32()?;
                let addralign = reader.read_u32()? as u64;
                let entsize = reader.read_u32()? as u64;
                Ok(SectionHeader {
                    name_offset,
                    name: String::new(),
                    section_type,
                    flags,
                    addr,
                    offset,
                    size,
                    link,
                    info,
                    addralign,
                    entsize,
                })
            }
        }
    }

    pub fn write(&self, writer: &mut ByteWriter, class: Class) {
        writer.write_u32(self.name_offset);
        writer.write_u32(self.section_type.to_u32());
        match class {
            Class::Elf64 => {
                writer.write_u64(self.flags.bits());
                writer.write_u64(self.addr);
                writer.write_u64(self.offset);
                writer.write_u64(self.size);
                writer.write_u32(self.link);
                writer.write_u32(self.info);
                writer.write_u64(self.addralign);
                writer.write_u64(self.entsize);
            }
            Class::Elf32 => {
                writer.write_u32(self.flags.bits() as u32);
                writer.write_u32(self.addr as u32);
                writer.write_u32(self.offset as u32);
                writer.write_u32(self.size as u32);
                writer.write_u32(self.link);
                writer.write_u32(self.info);
                writer.write_u32(self.addralign as u32);
                writer.write_u32(self.entsize as u32);
            }
        }
    }

    pub fn entry_size(class: Class) -> usize {
        match class {
            Class::Elf64 => 64,
            Class::Elf32 => 40,
        }
    }

    pub fn is_executable(&self) -> bool {
        self.flags.contains(SectionFlags::EXECINSTR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SectionHeader {
        SectionHeader {
            name_offset: 11,
            name: ".text".into(),
            section_type: SectionType::ProgBits,
            flags: SectionFlags::ALLOC | SectionFlags::EXECINSTR,
            addr: 0x401000,
            offset: 0x1000,
            size: 0x200,
            link: 0,
            info: 0,
            addralign: 16,
            entsize: 0,
        }
    }

    #[test]
    fn round_trips_64_bit_section_header() {
        let sh = sample();
        let mut writer = ByteWriter::new();
        sh.write(&mut writer, Class::Elf64);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), SectionHeader::entry_size(Class::Elf64));

        let mut reader = ByteReader::new(&bytes);
        let mut parsed = SectionHeader::parse(&mut reader, Class::Elf64).unwrap();
        parsed.name = sh.name.clone();
        assert_eq!(parsed, sh);
        assert!(parsed.is_executable());
    }

    #[test]
    fn unknown_type_round_trips_as_other() {
        assert_eq!(SectionType::from_u32(0x7000_0001), SectionType::Other(0x7000_0001));
    }
}
