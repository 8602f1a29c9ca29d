//! `.note.*` sections: a sequence of `(name, type, descriptor)` records, each
//! field 4-byte aligned regardless of ELF class.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteEntry {
    pub name: String,
    pub note_type: u32,
    pub desc: Vec<u8>,
}

fn padded_len(n: usize) -> usize {
    (n + 3) & !3
}

impl NoteEntry {
    fn parse_one(reader: &mut ByteReader) -> Result<NoteEntry> {
        let namesz = reader.read_u32()? as usize;
        let descsz = reader.read_u32()? as usize;
        let note_type = reader.read_u32()?;

        let name_bytes = reader.read_bytes(namesz)?;
        let name = std::str::from_utf8(name_bytes)
            .map_err(|e| Error::MalformedElf(format!("non-utf8 note name: {e}")))?
            .trim_end_matches('\0')
            .to_string();
        reader.skip(padded_len(namesz) - namesz)?;

        let desc = reader.read_bytes(descsz)?.to_vec();
        reader.skip(padded_len(descsz) - descsz)?;

        Ok(NoteEntry { name, note_type, desc })
    }

    fn write_one(&self, writer: &mut ByteWriter) {
        let mut name_bytes = self.name.clone().into_bytes();
        name_bytes.push(0);
        writer.write_u32(name_bytes.len() as u32);
        writer.write_u32(self.desc.len() as u32);
        writer.write_u32(self.note_type);

        writer.write_bytes(&name_bytes);
        writer.write_bytes(&vec![0u8; padded_len(name_bytes.len()) - name_bytes.len()]);

        writer.write_bytes(&self.desc);
        writer.write_bytes(&vec![0u8; padded_len(self.desc.len()) - self.desc.len()]);
    }
}

pub fn parse_note_section(bytes: &[u8]) -> Result<Vec<NoteEntry>> {
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::new();
    while reader.remaining() >= 12 {
        entries.push(NoteEntry::parse_one(&mut reader)?);
    }
    Ok(entries)
}

pub fn write_note_section(entries: &[NoteEntry]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for entry in entries {
        entry.write_one(&mut writer);
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_single_note() {
        let entries = vec![NoteEntry { name: "GNU".into(), note_type: 1, desc: vec![1, 2, 3] }];
        let bytes = write_note_section(&entries);
        assert_eq!(bytes.len() % 4, 0);
        let parsed = parse_note_section(&bytes).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn round_trips_multiple_notes_with_padding() {
        let entries = vec![
            NoteEntry { name: "GNU".into(), note_type: 3, desc: vec![0xAA; 5] },
            NoteEntry { name: "Go".into(), note_type: 4, desc: vec![] },
        ];
        let bytes = write_note_section(&entries);
        let parsed = parse_note_section(&bytes).unwrap();
        assert_eq!(parsed, entries);
    }
}
