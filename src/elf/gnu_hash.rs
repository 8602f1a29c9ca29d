//! The `.gnu.hash` section: a bloom filter plus a bucket/chain hash table
//! mapping symbol names to `.dynsym` indices, replacing the legacy `.hash`
//! section in modern Linux binaries.

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::{Error, Result};

/// The GNU hash function: seed 5381, `h = h*33 + c` per byte (`(h<<5)+h+c`).
/// For the empty string the loop body never runs and the result is the seed
/// itself, `0x1505`.
pub fn gnu_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &c in name {
        h = h.wrapping_shl(5).wrapping_add(h).wrapping_add(c as u32);
    }
    h
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GnuHash {
    pub sym_offset: u32,
    pub bloom_shift: u32,
    pub bloom: Vec<u64>,
    pub buckets: Vec<u32>,
    pub chains: Vec<u32>,
}

impl GnuHash {
    /// `bloom_word_bytes` is 8 on 64-bit ELF, 4 on 32-bit (the bloom filter
    /// words are native machine words).
    pub fn parse(bytes: &[u8], class: Class) -> Result<GnuHash> {
        if bytes.len() % 4 != 0 {
            return Err(Error::MalformedElf(
                "gnu hash section size must be a multiple of 4".into(),
            ));
        }
        let mut reader = ByteReader::new(bytes);
        let nbuckets = reader.read_u32()?;
        let sym_offset = reader.read_u32()?;
        let bloom_size = reader.read_u32()?;
        let bloom_shift = reader.read_u32()?;

        let mut bloom = Vec::with_capacity(bloom_size as usize);
        for _ in 0..bloom_size {
            let word = match class {
                Class::Elf64 => reader.read_u64()?,
                Class::Elf32 => reader.read_u32()? as u64,
            };
            bloom.push(word);
        }

        let mut buckets = Vec::with_capacity(nbuckets as usize);
        for _ in 0..nbuckets {
            buckets.push(reader.read_u32()?);
        }

        let mut chains = Vec::new();
        while reader.remaining() >= 4 {
            chains.push(reader.read_u32()?);
        }

        Ok(GnuHash { sym_offset, bloom_shift, bloom, buckets, chains })
    }

    pub fn write(&self, class: Class) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        writer.write_u32(self.buckets.len() as u32);
        writer.write_u32(self.sym_offset);
        writer.write_u32(self.bloom.len() as u32);
        writer.write_u32(self.bloom_shift);
        for &word in &self.bloom {
            match class {
                Class::Elf64 => writer.write_u64(word),
                Class::Elf32 => writer.write_u32(word as u32),
            }
        }
        for &bucket in &self.buckets {
            writer.write_u32(bucket);
        }
        for &chain in &self.chains {
            writer.write_u32(chain);
        }
        writer.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_hashes_to_seed() {
        assert_eq!(gnu_hash(b""), 0x0000_1505);
    }

    #[test]
    fn known_hash_values() {
        assert_eq!(gnu_hash(b"a"), 0x0002_b606);
        assert_eq!(gnu_hash(b"__libc_start_main"), 0xf63d_4e2e);
        assert_eq!(gnu_hash(b"pthread_mutex_lock"), 0x4f15_2227);
        assert_eq!(gnu_hash(b"strcasecmp"), 0xb385_0d3a);
    }

    #[test]
    fn round_trips_gnu_hash_section() {
        let table = GnuHash {
            sym_offset: 3,
            bloom_shift: 6,
            bloom: vec![0x1122_3344_5566_7788],
            buckets: vec![0, 4, 0],
            chains: vec![0x1505 | 1, 0x61 | 1],
        };
        let bytes = table.write(Class::Elf64);
        assert_eq!(bytes.len() % 4, 0);
        let parsed = GnuHash::parse(&bytes, Class::Elf64).unwrap();
        assert_eq!(parsed, table);
    }
}
