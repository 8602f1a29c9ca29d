//! `Instruction` -> Intel-syntax text, formatted to match `objdump -d -Mintel`.

use crate::x86::instruction::Instruction;
use crate::x86::operand::{Operand, IndirectOperand};
use crate::x86::register::Register;
use std::fmt::Write as _;

/// Renders one instruction. `next_addr`, when given, is the address
/// immediately after this instruction's last byte, used to turn a `Relative`
/// operand into the absolute branch target objdump prints; without it the
/// raw signed displacement is shown instead.
pub fn format_instruction(inst: &Instruction, next_addr: Option<u64>) -> String {
    let mnemonic = inst.mnemonic.as_str();
    let operands: Vec<String> = inst.operands().map(|op| format_operand(&op, next_addr)).collect();
    if operands.is_empty() {
        mnemonic
    } else {
        format!("{:<7}{}", mnemonic, operands.join(","))
    }
}

fn format_operand(operand: &Operand, next_addr: Option<u64>) -> String {
    match operand {
        Operand::Register(r) => r.to_string(),
        Operand::Memory(mem) => format_memory(mem),
        Operand::Immediate(imm) => imm.to_string(),
        Operand::Relative(rel) => match next_addr {
            Some(addr) => format!("0x{:x}", addr.wrapping_add(rel.0 as i64 as u64)),
            None => {
                if rel.0 < 0 {
                    format!("-0x{:x}", -(rel.0 as i64))
                } else {
                    format!("0x{:x}", rel.0)
                }
            }
        },
    }
}

fn format_memory(mem: &IndirectOperand) -> String {
    let mut out = String::new();
    if let Some(size) = mem.pointer_size {
        let _ = write!(out, "{} ", size.keyword());
    }
    if let Some(seg) = mem.segment_override {
        let _ = write!(out, "{}:", seg);
    }
    out.push('[');

    let mut wrote_term = false;
    if let Some(Register::Rip) = mem.base {
        out.push_str("rip");
        wrote_term = true;
    } else if let Some(base) = mem.base {
        let _ = write!(out, "{base}");
        wrote_term = true;
    }
    if let Some(index) = mem.index {
        if wrote_term {
            out.push('+');
        }
        let _ = write!(out, "{index}*{}", mem.scale);
        wrote_term = true;
    }
    if mem.has_displacement || !wrote_term {
        if mem.displacement < 0 {
            let _ = write!(out, "-0x{:x}", -(mem.displacement as i64));
        } else if wrote_term {
            let _ = write!(out, "+0x{:x}", mem.displacement);
        } else {
            let _ = write!(out, "0x{:x}", mem.displacement);
        }
    }
    out.push(']');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::ByteReader;
    use crate::x86::decoder::decode;

    #[test]
    fn formats_cmp_word_ptr_example() {
        let bytes = [0x66, 0x41, 0x81, 0xBC, 0x89, 0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE];
        let mut reader = ByteReader::new(&bytes);
        let (inst, _) = decode(&mut reader).unwrap();
        let text = format_instruction(&inst, None);
        assert_eq!(text, "cmp    WORD PTR [r9+rcx*4+0x12345678],0xbeef");
    }

    #[test]
    fn formats_ret_with_no_operands() {
        let bytes = [0xC3];
        let mut reader = ByteReader::new(&bytes);
        let (inst, _) = decode(&mut reader).unwrap();
        assert_eq!(format_instruction(&inst, None), "ret");
    }

    #[test]
    fn formats_relative_jump_as_absolute_target() {
        let bytes = [0x74, 0x05];
        let mut reader = ByteReader::new(&bytes);
        let (inst, consumed) = decode(&mut reader).unwrap();
        let text = format_instruction(&inst, Some(0x1000 + consumed as u64));
        assert_eq!(text, "je     0x1007");
    }

    #[test]
    fn formats_register_to_register_mov() {
        let bytes = [0x48, 0x89, 0xD8]; // mov rax, rbx
        let mut reader = ByteReader::new(&bytes);
        let (inst, _) = decode(&mut reader).unwrap();
        assert_eq!(format_instruction(&inst, None), "mov    rax,rbx");
    }
}
