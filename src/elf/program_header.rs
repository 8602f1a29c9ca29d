//! Program headers (the segment table `e_phoff`/`e_phnum` points at).

use crate::bytes::{ByteReader, ByteWriter};
use crate::elf::header::Class;
use crate::error::Result;
use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SegmentFlags: u32 {
        const EXECUTABLE = 0x1;
        const WRITABLE = 0x2;
        const READABLE = 0x4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Shlib,
    Phdr,
    Tls,
    GnuEhFrame,
    GnuStack,
    GnuRelro,
    Other(u32),
}

impl SegmentType {
    fn from_u32(v: u32) -> SegmentType {
        match v {
            0 => SegmentType::Null,
            1 => SegmentType::Load,
            2 => SegmentType::Dynamic,
            3 => SegmentType::Interp,
            4 => SegmentType::Note,
            5 => SegmentType::Shlib,
            6 => SegmentType::Phdr,
            7 => SegmentType::Tls,
            0x6474e550 => SegmentType::GnuEhFrame,
            0x6474e551 => SegmentType::GnuStack,
            0x6474e552 => SegmentType::GnuRelro,
            other => SegmentType::Other(other),
        }
    }

    fn to_u32(self) -> u32 {
        match self {
            SegmentType::Null => 0,
            SegmentType::Load => 1,
            SegmentType::Dynamic => 2,
            SegmentType::Interp => 3,
            SegmentType::Note => 4,
            SegmentType::Shlib => 5,
            SegmentType::Phdr => 6,
            SegmentType::Tls => 7,
            SegmentType::GnuEhFrame => 0x6474e550,
            SegmentType::GnuStack => 0x6474e551,
            SegmentType::GnuRelro => 0x6474e552,
            SegmentType::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub segment_type: SegmentType,
    pub flags: SegmentFlags,
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl ProgramHeader {
    pub fn parse(reader: &mut ByteReader, class: Class) -> Result<ProgramHeader> {
        match class {
            Class::Elf64 => {
                let segment_type = SegmentType::from_u32(reader.read_u32()?);
                let flags = SegmentFlags::from_bits_truncate(reader.read_u32()?);
                let offset = reader.read_u64()?;
                let vaddr = reader.read_u64()?;
                let paddr = reader.read_u64()?;
                let filesz = reader.read_u64()?;
                let memsz = reader.read_u64()?;
                let align = reader.read_u64()?;
                Ok(ProgramHeader { segment_type, flags, offset, vaddr, paddr, filesz, memsz, align })
            }
            Class::Elf32 => {
                let segment_type = SegmentType::from_u32(reader.read_u32()?);
                let offset = reader.read_u32()? as u64;
                let vaddr = reader.read_u32()? as u64;
                let paddr = reader.read_u32()? as u64;
                let filesz = reader.read_u32()? as u64;
                let memsz = reader.read_u32()? as u64;
                let flags = SegmentFlags::from_bits_truncate(reader.read_u32()?);
                let align = reader.read_u32()? as u64;
                Ok(ProgramHeader { segment_type, flags, offset, vaddr, paddr, filesz, memsz, align })
            }
        }
    }

    pub fn write(&self, writer: &mut ByteWriter, class: Class) {
        match class {
            Class::Elf64 => {
                writer.write_u32(self.segment_type.to_u32());
                writer.write_u32(self.flags.bits());
                writer.write_u64(self.offset);
                writer.write_u64(self.vaddr);
                writer.write_u64(self.paddr);
                writer.write_u64(self.filesz);
                writer.write_u64(self.memsz);
                writer.write_u64(self.align);
            }
            Class::Elf32 => {
                writer.write_u32(self.segment_type.to_u32());
                writer.write_u32(self.offset as u32);
                writer.write_u32(self.vaddr as u32);
                writer.write_u32(self.paddr as u32);
                writer.write_u32(self.filesz as u32);
                writer.write_u32(self.memsz as u32);
                writer.write_u32(self.flags.bits());
                writer.write_u32(self.align as u32);
            }
        }
    }

    pub fn entry_size(class: Class) -> usize {
        match class {
            Class::Elf64 => 56,
            Class::Elf32 => 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ProgramHeader {
        ProgramHeader {
            segment_type: SegmentType::Load,
            flags: SegmentFlags::READABLE | SegmentFlags::EXECUTABLE,
            offset: 0,
            vaddr: 0x400000,
            paddr: 0x400000,
            filesz: 0x1000,
            memsz: 0x1000,
            align: 0x1000,
        }
    }

    #[test]
    fn round_trips_64_bit_program_header() {
        let ph = sample();
        let mut writer = ByteWriter::new();
        ph.write(&mut writer, Class::Elf64);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), ProgramHeader::entry_size(Class::Elf64));

        let mut reader = ByteReader::new(&bytes);
        let parsed = ProgramHeader::parse(&mut reader, Class::Elf64).unwrap();
        assert_eq!(parsed, ph);
    }

    #[test]
    fn round_trips_32_bit_program_header() {
        let ph = sample();
        let mut writer = ByteWriter::new();
        ph.write(&mut writer, Class::Elf32);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), ProgramHeader::entry_size(Class::Elf32));

        let mut reader = ByteReader::new(&bytes);
        let parsed = ProgramHeader::parse(&mut reader, Class::Elf32).unwrap();
        assert_eq!(parsed, ph);
    }

    #[test]
    fn unknown_segment_type_round_trips_as_other() {
        assert_eq!(SegmentType::from_u32(0x12345678), SegmentType::Other(0x12345678));
    }
}
