//! Relocation entries: REL (no addend) and RELA (explicit addend) variants.
//! `info` packs the symbol index in the high bits and the relocation type in
//! the low 32 bits on 64-bit, or high/low 24/8 bits on 32-bit.

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEntry {
    pub offset: u64,
    pub symbol_index: u32,
    pub reloc_type: u32,
    pub addend: Option<i64>,
}

impl RelocationEntry {
    fn pack_info(&self, class: Class) -> u64 {
        match class {
            Class::Elf64 => ((self.symbol_index as u64) << 32) | (self.reloc_type as u64),
            Class::Elf32 => ((self.symbol_index as u64) << 8) | (self.reloc_type as u64 & 0xFF),
        }
    }

    fn unpack_info(info: u64, class: Class) -> (u32, u32) {
        match class {
            Class::Elf64 => ((info >> 32) as u32, (info & 0xFFFF_FFFF) as u32),
            Class::Elf32 => ((info >> 8) as u32, (info & 0xFF) as u32),
        }
    }

    pub fn parse(reader: &mut ByteReader, class: Class, has_addend: bool) -> Result<RelocationEntry> {
        let (offset, info) = match class {
            Class::Elf64 => (reader.read_u64()?, reader.read_u64()?),
            Class::Elf32 => (reader.read_u32()? as u64, reader.read_u32()? as u64),
        };
        let (symbol_index, reloc_type) = Self::unpack_info(info, class);
        let addend = if has_addend {
            Some(match class {
                Class::Elf64 => reader.read_i64()?,
                Class::Elf32 => reader.read_i32()? as i64,
            })
        } else {
            None
        };
        Ok(RelocationEntry { offset, symbol_index, reloc_type, addend })
    }

    pub fn write(&self, writer: &mut ByteWriter, class: Class) {
        let info = self.pack_info(class);
        match class {
            Class::Elf64 => {
                writer.write_u64(self.offset);
                writer.write_u64(info);
                if let Some(addend) = self.addend {
                    writer.write_i64(addend);
                }
            }
            Class::Elf32 => {
                writer.write_u32(self.offset as u32);
                writer.write_u32(info as u32);
                if let Some(addend) = self.addend {
                    writer.write_i32(addend as i32);
                }
            }
        }
    }

    pub fn entry_size(class: Class, has_addend: bool) -> usize {
        match (class, has_addend) {
            (Class::Elf64, false) => 16,
            (Class::Elf64, true) => 24,
            (Class::Elf32, false) => 8,
            (Class::Elf32, true) => 12,
        }
    }
}

pub fn parse_relocation_table(
    bytes: &[u8],
    class: Class,
    has_addend: bool,
) -> Result<Vec<RelocationEntry>> {
    let entry_size = RelocationEntry::entry_size(class, has_addend);
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::with_capacity(bytes.len() / entry_size.max(1));
    while reader.remaining() >= entry_size {
        entries.push(RelocationEntry::parse(&mut reader, class, has_addend)?);
    }
    Ok(entries)
}

pub fn write_relocation_table(entries: &[RelocationEntry], class: Class, has_addend: bool) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for entry in entries {
        entry.write(&mut writer, class);
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_rela_64_bit() {
        let rel = RelocationEntry { offset: 0x4010, symbol_index: 7, reloc_type: 1, addend: Some(-8) };
        let mut writer = ByteWriter::new();
        rel.write(&mut writer, Class::Elf64);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), RelocationEntry::entry_size(Class::Elf64, true));

        let mut reader = ByteReader::new(&bytes);
        let parsed = RelocationEntry::parse(&mut reader, Class::Elf64, true).unwrap();
        assert_eq!(parsed, rel);
    }

    #[test]
    fn round_trips_rel_without_addend() {
        let rel = RelocationEntry { offset: 0x2000, symbol_index: 3, reloc_type: 2, addend: None };
        let mut writer = ByteWriter::new();
        rel.write(&mut writer, Class::Elf32);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), RelocationEntry::entry_size(Class::Elf32, false));

        let mut reader = ByteReader::new(&bytes);
        let parsed = RelocationEntry::parse(&mut reader, Class::Elf32, false).unwrap();
        assert_eq!(parsed, rel);
    }
}
