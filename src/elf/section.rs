//! The parsed payload carried by each section, dispatched on
//! [`SectionType`](crate::elf::section_header::SectionType).

use crate::elf::dynamic::DynamicEntry;
use crate::elf::gnu_hash::GnuHash;
use crate::elf::gnu_version::{VerdefEntry, VerneedEntry};
use crate::elf::note::NoteEntry;
use crate::elf::relocation::RelocationEntry;
use crate::elf::symbol::SymbolEntry;

/// One section's interpreted contents. Every variant still carries enough to
/// reconstruct its original bytes exactly (`Section::raw_bytes` of
/// [`crate::elf::Elf`] is the authority the writer actually uses; this is the
/// structured view callers read).
#[derive(Debug, Clone, PartialEq)]
pub enum Section {
    StringTable(Vec<u8>),
    SymbolTable(Vec<SymbolEntry>),
    RelocationTable { entries: Vec<RelocationEntry>, has_addend: bool },
    GnuHashTable(GnuHash),
    GnuVersionDef(Vec<VerdefEntry>),
    GnuVersionNeed(Vec<VerneedEntry>),
    GnuVersionSym(Vec<u16>),
    DynamicTable(Vec<DynamicEntry>),
    NoteSection(Vec<NoteEntry>),
    /// `.init_array`/`.fini_array`: structurally uninterpreted, same as any
    /// other unrecognized section (see the resolved open question in
    /// `DESIGN.md`).
    ConstructorsArray(Vec<u8>),
    ProgBits(Vec<u8>),
    NoBits,
    Raw(Vec<u8>),
}

/// Looks up a NUL-terminated string at `offset` within a string-table
/// section's raw bytes.
pub fn lookup_string(strtab: &[u8], offset: u32) -> String {
    let offset = offset as usize;
    if offset >= strtab.len() {
        return String::new();
    }
    let end = strtab[offset..].iter().position(|&b| b == 0).map(|p| offset + p).unwrap_or(strtab.len());
    String::from_utf8_lossy(&strtab[offset..end]).into_owned()
}

/// Finds the byte offset of `name` within a string table, appending it (with
/// its NUL terminator) if absent. Used by the writer when it needs to intern
/// a freshly-constructed name rather than reuse an offset from a parsed file.
pub fn intern_string(strtab: &mut Vec<u8>, name: &str) -> u32 {
    if name.is_empty() {
        return 0;
    }
    let needle = name.as_bytes();
    let mut i = 0;
    while i + needle.len() <= strtab.len() {
        if &strtab[i..i + needle.len()] == needle
            && (i + needle.len() == strtab.len() || strtab[i + needle.len()] == 0)
            && (i == 0 || strtab[i - 1] == 0)
        {
            return i as u32;
        }
        i += 1;
    }
    let offset = strtab.len() as u32;
    strtab.extend_from_slice(needle);
    strtab.push(0);
    offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_up_string_at_offset() {
        let strtab = b"\0.text\0.data\0";
        assert_eq!(lookup_string(strtab, 1), ".text");
        assert_eq!(lookup_string(strtab, 7), ".data");
        assert_eq!(lookup_string(strtab, 0), "");
    }

    #[test]
    fn interns_new_and_reuses_existing_strings() {
        let mut strtab = vec![0u8];
        let off1 = intern_string(&mut strtab, ".text");
        let off2 = intern_string(&mut strtab, ".data");
        let off1_again = intern_string(&mut strtab, ".text");
        assert_eq!(off1, off1_again);
        assert_ne!(off1, off2);
        assert_eq!(lookup_string(&strtab, off1), ".text");
        assert_eq!(lookup_string(&strtab, off2), ".data");
    }
}
