//! ELF64 (and ELF32-header-compatible) parsing plus an x86-64 Intel-syntax
//! disassembler/assembler, producing output compatible with the GNU
//! `objdump -d -Mintel` reference.
//!
//! The library never installs a logger; callers (the `objdump-rs` binary, or
//! a host application) do that once via `env_logger::init()` or similar.

pub mod bytes;
pub mod disas;
pub mod elf;
pub mod error;
pub mod x86;

pub use disas::{disassemble_section, DisasOptions};
pub use elf::Elf;
pub use error::{Error, Result};
