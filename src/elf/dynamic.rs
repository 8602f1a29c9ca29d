//! The `.dynamic` section: a sequence of tag/value pairs consumed by the
//! dynamic linker.

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynamicTag {
    Null,
    Needed,
    PltRelSz,
    PltGot,
    Hash,
    StrTab,
    SymTab,
    Rela,
    RelaSz,
    RelaEnt,
    StrSz,
    SymEnt,
    Init,
    Fini,
    SoName,
    RPath,
    Symbolic,
    Rel,
    RelSz,
    RelEnt,
    PltRel,
    Debug,
    TextRel,
    JmpRel,
    BindNow,
    InitArray,
    FiniArray,
    InitArraySz,
    FiniArraySz,
    RunPath,
    Flags,
    GnuHash,
    Other(i64),
}

impl DynamicTag {
    fn from_i64(v: i64) -> DynamicTag {
        match v {
            0 => DynamicTag::Null,
            1 => DynamicTag::Needed,
            2 => DynamicTag::PltRelSz,
            3 => DynamicTag::PltGot,
            4 => DynamicTag::Hash,
            5 => DynamicTag::StrTab,
            6 => DynamicTag::SymTab,
            7 => DynamicTag::Rela,
            8 => DynamicTag::RelaSz,
            9 => DynamicTag::RelaEnt,
            10 => DynamicTag::StrSz,
            11 => DynamicTag::SymEnt,
            12 => DynamicTag::Init,
            13 => DynamicTag::Fini,
            14 => DynamicTag::SoName,
            15 => DynamicTag::RPath,
            16 => DynamicTag::Symbolic,
            17 => DynamicTag::Rel,
            18 => DynamicTag::RelSz,
            19 => DynamicTag::RelEnt,
            20 => DynamicTag::PltRel,
            21 => DynamicTag::Debug,
            22 => DynamicTag::TextRel,
            23 => DynamicTag::JmpRel,
            24 => DynamicTag::BindNow,
            25 => DynamicTag::InitArray,
            26 => DynamicTag::FiniArray,
            27 => DynamicTag::InitArraySz,
            28 => DynamicTag::FiniArraySz,
            29 => DynamicTag::RunPath,
            30 => DynamicTag::Flags,
            0x6fff_fef5 => DynamicTag::GnuHash,
            other => DynamicTag::Other(other),
        }
    }

    fn to_i64(self) -> i64 {
        match self {
            DynamicTag::Null => 0,
            DynamicTag::Needed => 1,
            DynamicTag::PltRelSz => 2,
            DynamicTag::PltGot => 3,
            DynamicTag::Hash => 4,
            DynamicTag::StrTab => 5,
            DynamicTag::SymTab => 6,
            DynamicTag::Rela => 7,
            DynamicTag::RelaSz => 8,
            DynamicTag::RelaEnt => 9,
            DynamicTag::StrSz => 10,
            DynamicTag::SymEnt => 11,
            DynamicTag::Init => 12,
            DynamicTag::Fini => 13,
            DynamicTag::SoName => 14,
            DynamicTag::RPath => 15,
            DynamicTag::Symbolic => 16,
            DynamicTag::Rel => 17,
            DynamicTag::RelSz => 18,
            DynamicTag::RelEnt => 19,
            DynamicTag::PltRel => 20,
            DynamicTag::Debug => 21,
            DynamicTag::TextRel => 22,
            DynamicTag::JmpRel => 23,
            DynamicTag::BindNow => 24,
            DynamicTag::InitArray => 25,
            DynamicTag::FiniArray => 26,
            DynamicTag::InitArraySz => 27,
            DynamicTag::FiniArraySz => 28,
            DynamicTag::RunPath => 29,
            DynamicTag::Flags => 30,
            DynamicTag::GnuHash => 0x6fff_fef5,
            DynamicTag::Other(v) => v,
        }
    }

    pub fn is_terminator(self) -> bool {
        matches!(self, DynamicTag::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicEntry {
    pub tag: DynamicTag,
    pub value: u64,
}

impl DynamicEntry {
    pub fn parse(reader: &mut ByteReader, class: Class) -> Result<DynamicEntry> {
        let (tag, value) = match class {
            Class::Elf64 => (reader.read_i64()?, reader.read_u64()?),
            Class::Elf32 => (reader.read_i32()? as i64, reader.read_u32()? as u64),
        };
        Ok(DynamicEntry { tag: DynamicTag::from_i64(tag), value })
    }

    pub fn write(&self, writer: &mut ByteWriter, class: Class) {
        match class {
            Class::Elf64 => {
                writer.write_i64(self.tag.to_i64());
                writer.write_u64(self.value);
            }
            Class::Elf32 => {
                writer.write_i32(self.tag.to_i64() as i32);
                writer.write_u32(self.value as u32);
            }
        }
    }

    pub fn entry_size(class: Class) -> usize {
        match class {
            Class::Elf64 => 16,
            Class::Elf32 => 8,
        }
    }
}

/// Parses entries until (and including) the `DT_NULL` terminator, or until the
/// buffer is exhausted (some producers omit trailing padding).
pub fn parse_dynamic_table(bytes: &[u8], class: Class) -> Result<Vec<DynamicEntry>> {
    let entry_size = DynamicEntry::entry_size(class);
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::new();
    while reader.remaining() >= entry_size {
        let entry = DynamicEntry::parse(&mut reader, class)?;
        let terminator = entry.tag.is_terminator();
        entries.push(entry);
        if terminator {
            break;
        }
    }
    Ok(entries)
}

pub fn write_dynamic_table(entries: &[DynamicEntry], class: Class) -> Vec<u8> {
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
    fn round_trips_dynamic_table_with_terminator() {
        let entries = vec![
            DynamicEntry { tag: DynamicTag::Needed, value: 1 },
            DynamicEntry { tag: DynamicTag::SymTab, value: 0x1000 },
            DynamicEntry { tag: DynamicTag::Null, value: 0 },
        ];
        let bytes = write_dynamic_table(&entries, Class::Elf64);
        let parsed = parse_dynamic_table(&bytes, Class::Elf64).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn unknown_tag_round_trips_as_other() {
        assert_eq!(DynamicTag::from_i64(0x7000_0001), DynamicTag::Other(0x7000_0001));
    }
}
