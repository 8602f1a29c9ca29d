//! `.gnu.version` (Versym), `.gnu.version_d` (Verdef), and `.gnu.version_r`
//! (Verneed) sections: the symbol-versioning side tables that accompany
//! `.dynsym`.

use crate::bytes::{ByteReader, ByteWriter};
use crate::error::Result;

/// `.gnu.version`: one `u16` version index per `.dynsym` entry.
pub fn parse_versym(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut reader = ByteReader::new(bytes);
    let mut entries = Vec::with_capacity(bytes.len() / 2);
    while reader.remaining() >= 2 {
        entries.push(reader.read_u16()?);
    }
    Ok(entries)
}

pub fn write_versym(entries: &[u16]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for &v in entries {
        writer.write_u16(v);
    }
    writer.into_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdefAux {
    pub name_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerdefEntry {
    pub version: u16,
    pub flags: u16,
    pub index: u16,
    pub hash: u32,
    pub aux: Vec<VerdefAux>,
}

/// `.gnu.version_d`: a linked list of `Verdef` records, each followed by its
/// own `vd_cnt` `Verdaux` records. Assumes (as every producer in practice
/// lays it out) that each record and its aux entries are stored contiguously
/// and in list order, so re-emission reconstructs identical `vd_next`/
/// `vda_next` offsets.
pub fn parse_verdef(bytes: &[u8]) -> Result<Vec<VerdefEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    loop {
        let mut reader = ByteReader::new(bytes);
        reader.skip(offset)?;
        let version = reader.read_u16()?;
        let flags = reader.read_u16()?;
        let index = reader.read_u16()?;
        let cnt = reader.read_u16()?;
        let hash = reader.read_u32()?;
        let aux_offset = reader.read_u32()?;
        let next = reader.read_u32()?;

        let mut aux = Vec::with_capacity(cnt as usize);
        let mut aux_reader = ByteReader::new(bytes);
        aux_reader.skip(offset + aux_offset as usize)?;
        for _ in 0..cnt {
            let name_offset = aux_reader.read_u32()?;
            let _aux_next = aux_reader.read_u32()?;
            aux.push(VerdefAux { name_offset });
        }

        entries.push(VerdefEntry { version, flags, index, hash, aux });

        if next == 0 {
            break;
        }
        offset += next as usize;
    }
    Ok(entries)
}

pub fn write_verdef(entries: &[VerdefEntry]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for (i, entry) in entries.iter().enumerate() {
        let is_last = i + 1 == entries.len();
        writer.write_u16(entry.version);
        writer.write_u16(entry.flags);
        writer.write_u16(entry.index);
        writer.write_u16(entry.aux.len() as u16);
        writer.write_u32(entry.hash);
        writer.write_u32(20); // vd_aux: aux array immediately follows this 20-byte header
        writer.write_u32(if is_last { 0 } else { 20 + entry.aux.len() as u32 * 8 });

        for (j, aux) in entry.aux.iter().enumerate() {
            let aux_last = j + 1 == entry.aux.len();
            writer.write_u32(aux.name_offset);
            writer.write_u32(if aux_last { 0 } else { 8 });
        }
    }
    writer.into_bytes()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerneedAux {
    pub hash: u32,
    pub flags: u16,
    pub other: u16,
    pub name_offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerneedEntry {
    pub version: u16,
    pub file_offset: u32,
    pub aux: Vec<VerneedAux>,
}

/// `.gnu.version_r`: analogous linked-list layout to [`parse_verdef`].
pub fn parse_verneed(bytes: &[u8]) -> Result<Vec<VerneedEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    loop {
        let mut reader = ByteReader::new(bytes);
        reader.skip(offset)?;
        let version = reader.read_u16()?;
        let cnt = reader.read_u16()?;
        let file_offset = reader.read_u32()?;
        let aux_offset = reader.read_u32()?;
        let next = reader.read_u32()?;

        let mut aux = Vec::with_capacity(cnt as usize);
        let mut aux_reader = ByteReader::new(bytes);
        aux_reader.skip(offset + aux_offset as usize)?;
        for _ in 0..cnt {
            let hash = aux_reader.read_u32()?;
            let flags = aux_reader.read_u16()?;
            let other = aux_reader.read_u16()?;
            let name_offset = aux_reader.read_u32()?;
            let _aux_next = aux_reader.read_u32()?;
            aux.push(VerneedAux { hash, flags, other, name_offset });
        }

        entries.push(VerneedEntry { version, file_offset, aux });

        if next == 0 {
            break;
        }
        offset += next as usize;
    }
    Ok(entries)
}

pub fn write_verneed(entries: &[VerneedEntry]) -> Vec<u8> {
    let mut writer = ByteWriter::new();
    for (i, entry) in entries.iter().enumerate() {
        let is_last = i + 1 == entries.len();
        writer.write_u16(entry.version);
        writer.write_u16(entry.aux.len() as u16);
        writer.write_u32(entry.file_offset);
        writer.write_u32(16); // vn_aux: aux array immediately follows this 16-byte header
        writer.write_u32(if is_last { 0 } else { 16 + entry.aux.len() as u32 * 16 });

        for (j, aux) in entry.aux.iter().enumerate() {
            let aux_last = j + 1 == entry.aux.len();
            writer.write_u32(aux.hash);
            writer.write_u16(aux.flags);
            writer.write_u16(aux.other);
            writer.write_u32(aux.name_offset);
            writer.write_u32(if aux_last { 0 } else { 16 });
        }
    }
    writer.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_versym() {
        let entries = vec![0, 1, 2, 0x8002];
        let bytes = write_versym(&entries);
        assert_eq!(parse_versym(&bytes).unwrap(), entries);
    }

    #[test]
    fn round_trips_verdef_chain() {
        let entries = vec![
            VerdefEntry { version: 1, flags: 1, index: 1, hash: 0x1234, aux: vec![VerdefAux { name_offset: 10 }] },
            VerdefEntry {
                version: 1,
                flags: 0,
                index: 2,
                hash: 0x5678,
                aux: vec![VerdefAux { name_offset: 20 }, VerdefAux { name_offset: 30 }],
            },
        ];
        let bytes = write_verdef(&entries);
        let parsed = parse_verdef(&bytes).unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn round_trips_verneed_chain() {
        let entries = vec![VerneedEntry {
            version: 1,
            file_offset: 5,
            aux: vec![VerneedAux { hash: 0xAAAA, flags: 0, other: 2, name_offset: 15 }],
        }];
        let bytes = write_verneed(&entries);
        let parsed = parse_verneed(&bytes).unwrap();
        assert_eq!(parsed, entries);
    }
}
