//! The 16-byte identifier plus the rest of the ELF file header, which together
//! fix the byte width and endianness every other reader in [`crate::elf`] uses.

use crate::bytes::{ByteReader, ByteWriter, Endianness};
use crate::error::{Error, Result};

pub const MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    fn from_byte(b: u8) -> Result<Class> {
        match b {
            1 => Ok(Class::Elf32),
            2 => Ok(Class::Elf64),
            other => Err(Error::MalformedElf(format!("unknown ELF class byte 0x{other:02x}"))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Class::Elf32 => 1,
            Class::Elf64 => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Data {
    Little,
    Big,
}

impl Data {
    fn from_byte(b: u8) -> Result<Data> {
        match b {
            1 => Ok(Data::Little),
            2 => Ok(Data::Big),
            other => Err(Error::MalformedElf(format!("unknown ELF data byte 0x{other:02x}"))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            Data::Little => 1,
            Data::Big => 2,
        }
    }

    pub fn endianness(self) -> Endianness {
        match self {
            Data::Little => Endianness::Little,
            Data::Big => Endianness::Big,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsAbi {
    SystemV,
    Linux,
    Other(u8),
}

impl OsAbi {
    fn from_byte(b: u8) -> OsAbi {
        match b {
            0 => OsAbi::SystemV,
            3 => OsAbi::Linux,
            other => OsAbi::Other(other),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            OsAbi::SystemV => 0,
            OsAbi::Linux => 3,
            OsAbi::Other(b) => b,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjType {
    None,
    Relocatable,
    Executable,
    SharedObject,
    Core,
    Other(u16),
}

impl ObjType {
    fn from_u16(v: u16) -> ObjType {
        match v {
            0 => ObjType::None,
            1 => ObjType::Relocatable,
            2 => ObjType::Executable,
            3 => ObjType::SharedObject,
            4 => ObjType::Core,
            other => ObjType::Other(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            ObjType::None => 0,
            ObjType::Relocatable => 1,
            ObjType::Executable => 2,
            ObjType::SharedObject => 3,
            ObjType::Core => 4,
            ObjType::Other(v) => v,
        }
    }
}

/// The instruction set architecture (`e_machine`). Only the handful of values
/// the corpus cares about are named; everything else round-trips as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isa {
    X86_64,
    I386,
    Aarch64,
    Other(u16),
}

impl Isa {
    fn from_u16(v: u16) -> Isa {
        match v {
            0x3E => Isa::X86_64,
            0x03 => Isa::I386,
            0xB7 => Isa::Aarch64,
            other => Isa::Other(other),
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Isa::X86_64 => 0x3E,
            Isa::I386 => 0x03,
            Isa::Aarch64 => 0xB7,
            Isa::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub class: Class,
    pub data: Data,
    pub version: u8,
    pub os_abi: OsAbi,
    pub abi_version: u8,
    pub obj_type: ObjType,
    pub isa: Isa,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl FileHeader {
    pub fn parse(reader: &mut ByteReader) -> Result<FileHeader> {
        let ident = reader.read_bytes(16)?;
        if ident[0..4] != MAGIC {
            return Err(Error::MalformedElf(format!("bad magic: {:02x?}", &ident[0..4])));
        }
        let class = Class::from_byte(ident[4])?;
        let data = Data::from_byte(ident[5])?;
        let version = ident[6];
        let os_abi = OsAbi::from_byte(ident[7]);
        let abi_version = ident[8];
        reader.set_endianness(data.endianness());

        let obj_type = ObjType::from_u16(reader.read_u16()?);
        let isa = Isa::from_u16(reader.read_u16()?);
        let e_version = reader.read_u32()?;
        let _ = e_version;

        let (entry, phoff, shoff) = match class {
            Class::Elf64 => (reader.read_u64()?, reader.read_u64()?, reader.read_u64()?),
            Class::Elf32 => (
                reader.read_u32()? as u64,
                reader.read_u32()? as u64,
                reader.read_u32()? as u64,
            ),
        };

        let flags = reader.read_u32()?;
        let ehsize = reader.read_u16()?;
        let phentsize = reader.read_u16()?;
        let phnum = reader.read_u16()?;
        let shentsize = reader.read_u16()?;
        let shnum = reader.read_u16()?;
        let shstrndx = reader.read_u16()?;

        Ok(FileHeader {
            class,
            data,
            version,
            os_abi,
            abi_version,
            obj_type,
            isa,
            entry,
            phoff,
            shoff,
            flags,
            ehsize,
            phentsize,
            phnum,
            shentsize,
            shnum,
            shstrndx,
        })
    }

    pub fn write(&self, writer: &mut ByteWriter) {
        writer.set_endianness(self.data.endianness());
        writer.write_bytes(&MAGIC);
        writer.write_u8(self.class.to_byte());
        writer.write_u8(self.data.to_byte());
        writer.write_u8(self.version);
        writer.write_u8(self.os_abi.to_byte());
        writer.write_u8(self.abi_version);
        writer.write_bytes(&[0u8; 7]); // e_ident padding

        writer.write_u16(self.obj_type.to_u16());
        writer.write_u16(self.isa.to_u16());
        writer.write_u32(1); // e_version

        match self.class {
            Class::Elf64 => {
                writer.write_u64(self.entry);
                writer.write_u64(self.phoff);
                writer.write_u64(self.shoff);
            }
            Class::Elf32 => {
                writer.write_u32(self.entry as u32);
                writer.write_u32(self.phoff as u32);
                writer.write_u32(self.shoff as u32);
            }
        }

        writer.write_u32(self.flags);
        writer.write_u16(self.ehsize);
        writer.write_u16(self.phentsize);
        writer.write_u16(self.phnum);
        writer.write_u16(self.shentsize);
        writer.write_u16(self.shnum);
        writer.write_u16(self.shstrndx);
    }

    pub fn is_64(&self) -> bool {
        self.class == Class::Elf64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> FileHeader {
        FileHeader {
            class: Class::Elf64,
            data: Data::Little,
            version: 1,
            os_abi: OsAbi::SystemV,
            abi_version: 0,
            obj_type: ObjType::Executable,
            isa: Isa::X86_64,
            entry: 0x401000,
            phoff: 64,
            shoff: 0x2000,
            flags: 0,
            ehsize: 64,
            phentsize: 56,
            phnum: 2,
            shentsize: 64,
            shnum: 10,
            shstrndx: 9,
        }
    }

    #[test]
    fn round_trips_64_bit_header() {
        let header = sample_header();
        let mut writer = ByteWriter::new();
        header.write(&mut writer);
        let bytes = writer.into_bytes();
        assert_eq!(bytes.len(), 64);

        let mut reader = ByteReader::new(&bytes);
        let parsed = FileHeader::parse(&mut reader).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(b"\x7fBAD");
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(FileHeader::parse(&mut reader), Err(Error::MalformedElf(_))));
    }
}
