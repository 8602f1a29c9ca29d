//! Symbol table entries (`.symtab`/`.dynsym`). The on-disk field order differs
//! between 32- and 64-bit classes: `{name, value, size, info, other, shndx}` on
//! 32-bit vs. `{name, info, other, shndx, value, size}` on 64-bit.

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding {
    Local,
    Global,
    Weak,
    Other(u8),
}

impl SymbolBinding {
    fn from_u8(v: u8) -> SymbolBinding {
        match v {
            0 => SymbolBinding::Local,
            1 => SymbolBinding::Global,
            2 => SymbolBinding::Weak,
            other => SymbolBinding::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SymbolBinding::Local => 0,
            SymbolBinding::Global => 1,
            SymbolBinding::Weak => 2,
            SymbolBinding::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    NoType,
    Object,
    Func,
    Section,
    File,
    Common,
    Tls,
    Other(u8),
}

impl SymbolType {
    fn from_u8(v: u8) -> SymbolType {
        match v {
            0 => SymbolType::NoType,
            1 => SymbolType::Object,
            2 => SymbolType::Func,
            3 => SymbolType::Section,
            4 => SymbolType::File,
            5 => SymbolType::Common,
            6 => SymbolType::Tls,
            other => SymbolType::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SymbolType::NoType => 0,
            SymbolType::Object => 1,
            SymbolType::Func => 2,
            SymbolType::Section => 3,
            SymbolType::File => 4,
            SymbolType::Common => 5,
            SymbolType::Tls => 6,
            SymbolType::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
    Other(u8),
}

impl SymbolVisibility {
    fn from_u8(v: u8) -> SymbolVisibility {
        match v & 0x3 {
            0 => SymbolVisibility::Default,
            1 => SymbolVisibility::Internal,
            2 => SymbolVisibility::Hidden,
            3 => SymbolVisibility::Protected,
            other => SymbolVisibility::Other(other),
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            SymbolVisibility::Default => 0,
            SymbolVisibility::Internal => 1,
            SymbolVisibility::Hidden => 2,
            SymbolVisibility::Protected => 3,
            SymbolVisibility::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name_offset: u32,
    pub name: String,
    pub binding: SymbolBinding,
    pub symbol_type: SymbolType,
    pub visibility: SymbolVisibility,
    pub shndx: u16,
    pub value: u64,
    pub size: u64,
}

impl SymbolEntry {
    pub fn parse(reader: &mut ByteReader, class: Class) -> Result<SymbolEntry> {
        match class {
            Class::Elf64 => {
                let name_offset = reader.read_u32()?;
                let info = reader.read_u8()?;
                let other = reader.read_u8()?;
                let shndx = reader.read_u16()?;
                let value = reader.read_u64()?;
                let size = reader.read_u64()?;
                Ok(SymbolEntry {
                    name_offset,
                    name: String::new(),
                    binding: SymbolBinding::from_u8(info >> 4),
                    symbol_type: SymbolType::from_u8(info & 0xF),
                    visibility: SymbolVisibility::from_u8(other),
                    shndx,
                    value,
                    size,
                })
            }
            Class::Elf32 => {
                let name_offset = reader.read_u32()?;
                let value = reader.read_u32()? as u64;
                let size = reader.read_u32()? as u64;
                let info = reader.read_u8()?;
                let other = reader.read_u8()?;
                let shndx = reader.read_u16()?;
                Ok(SymbolEntry {
                    name_offset,
                    name: String::new(),
                    binding: SymbolBinding::from_u8(info >> 4),
                    symbol_type: SymbolType::from_u8(info & 0xF),
                    visibility: SymbolVisibility::from_u8(other),
                    shndx,
                    value,
                    size,
                })
            }
        }
    }

    pub fn write(&self, writer: &mut ByteWriter, class: Class) {
        let info = (self.binding.to_u8() << 4) | (self.symbol_type.to_u8() & 0xF);
        match class {
            Class::Elf64 => {
                writer.write_u32(self.name_offset);
                writer.write_u8(info);
                writer.write_u8(self.visibility.to_u8());
                writer.write_u16(self.shndx);
                writer.write_u64(self.value);
                writer.write_u64(self.size);
            }
            Class::Elf32 => {
                writer.write_u32(self.name_offset);
                writer.write_u32(self.value as u32);
                writer.write_u32(self.size as u32);
                writer.write_u8(info);
                writer.write_u8(self.visibility.to_u8());
                writer.write_u16(self.shndx);
            }
        }
    }

    pub fn entry_size(class: Class) -> usize {
        match class {
            Class::Elf64 => 24,
            Class::Elf32 => 16,
        }
    }

    pub fn is_func(&self) -> bool {
        self.symbol_type == SymbolType::Func
    }

    pub fn is_global_or_hidden(&self) -> bool {
        self.binding == SymbolBinding::Global || self.visibility == SymbolVisibility::Hidden
    }
}

pub fn parse_symbol_table(bytes: &[u8], class: Class) -> Result<Vec<SymbolEntry>> {
    let entry_size = SymbolEntry::entry_size(class);
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::with_capacity(bytes.len() / entry_size.max(1));
    while reader.remaining() >= entry_size {
        entries.push(SymbolEntry::parse(&mut reader, class)?);
    }
    Ok(entries)
}

pub fn write_symbol_table(entries: &[SymbolEntry], class: Class) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for entry in entries {
        entry.write(&mut writer, class);
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SymbolEntry {
        SymbolEntry {
            name_offset: 1,
            name: "main".into(),
            binding: SymbolBinding::Global,
            symbol_type: SymbolType::Func,
            visibility: SymbolVisibility::Default,
            shndx: 12,
            value: 0x401136,
            size: 42,
        }
    }

    #[test]
    fn round_trips_64_bit_symbol() {
        let sym = sample();
        let mut writer = ByteWriter::new();
        sym.write(&mut writer, Class::Elf64);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), SymbolEntry::entry_size(Class::Elf64));

        let mut reader = ByteReader::new(&bytes);
        let mut parsed = SymbolEntry::parse(&mut reader, Class::Elf64).unwrap();
        parsed.name = sym.name.clone();
        assert_eq!(parsed, sym);
        assert!(parsed.is_func());
        assert!(parsed.is_global_or_hidden());
    }

    #[test]
    fn round_trips_32_bit_symbol_with_different_field_order() {
        let sym = sample();
        let mut writer = ByteWriter::new();
        sym.write(&mut writer, Class::Elf32);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), SymbolEntry::entry_size(Class::Elf32));

        let mut reader = ByteReader::new(&bytes);
        let mut parsed = SymbolEntry::parse(&mut reader, Class::Elf32).unwrap();
        parsed.name = sym.name.clone();
        assert_eq!(parsed, sym);
    }
}
