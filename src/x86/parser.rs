//! Intel-syntax text -> `Instruction`. Accepts exactly the grammar
//! [`crate::x86::printer`] emits; it is not a general-purpose assembler syntax.

use crate::error::{Error, Result};
use crate::x86::instruction::{ConditionCode, Instruction, Mnemonic};
use crate::x86::operand::{Immediate, IndirectOperand, Operand, PointerSize, RelativeOffset};
use crate::x86::register::parse_register;

/// Parses one instruction line, e.g. `"mov rax,rbx"` or
/// `"cmp WORD PTR [r9+rcx*4+0x12345678],0xbeef"`.
pub fn parse_instruction(text: &str) -> Result<Instruction> {
    log::trace!("parsing instruction text {text:?}");
    parse_instruction_inner(text).inspect_err(|err| log::warn!("{err}"))
}

fn parse_instruction_inner(text: &str) -> Result<Instruction> {
    let text = text.trim();
    let (mnemonic_str, rest) = match text.find(char::is_whitespace) {
        Some(idx) => (&text[..idx], text[idx..].trim_start()),
        None => (text, ""),
    };
    let mnemonic = parse_mnemonic(mnemonic_str)?;
    let is_branch = matches!(mnemonic, Mnemonic::Jmp | Mnemonic::Call | Mnemonic::Jcc(_));
    let operand_strs = split_operands(rest);
    let mut operands = Vec::new();
    for s in &operand_strs {
        let trimmed = s.trim();
        // A bare branch target (not `[...]`/a register) is the instruction's
        // relative offset, not a general-purpose immediate.
        if is_branch && !trimmed.contains('[') && parse_register(trimmed).is_none() {
            let v = parse_integer(trimmed)
                .ok_or_else(|| Error::ParseError(format!("unrecognized branch target {trimmed:?}")))?;
            operands.push(Operand::Relative(RelativeOffset(v as i32)));
        } else {
            operands.push(parse_operand(trimmed)?);
        }
    }
    if operands.len() > 4 {
        return Err(Error::ParseError("at most 4 operands are supported".into()));
    }
    Ok(Instruction::with_operands(mnemonic, &operands))
}

fn parse_mnemonic(s: &str) -> Result<Mnemonic> {
    let lower = s.to_ascii_lowercase();
    Ok(match lower.as_str() {
        "add" => Mnemonic::Add,
        "or" => Mnemonic::Or,
        "adc" => Mnemonic::Adc,
        "sbb" => Mnemonic::Sbb,
        "and" => Mnemonic::And,
        "sub" => Mnemonic::Sub,
        "xor" => Mnemonic::Xor,
        "cmp" => Mnemonic::Cmp,
        "push" => Mnemonic::Push,
        "pop" => Mnemonic::Pop,
        "mov" => Mnemonic::Mov,
        "lea" => Mnemonic::Lea,
        "test" => Mnemonic::Test,
        "xchg" => Mnemonic::Xchg,
        "nop" => Mnemonic::Nop,
        "call" => Mnemonic::Call,
        "jmp" => Mnemonic::Jmp,
        "ret" => Mnemonic::Ret,
        "leave" => Mnemonic::Leave,
        "int3" => Mnemonic::Int3,
        "cdqe" => Mnemonic::Cdqe,
        "cwde" => Mnemonic::Cwde,
        "cdq" => Mnemonic::Cdq,
        "cqo" => Mnemonic::Cqo,
        "inc" => Mnemonic::Inc,
        "dec" => Mnemonic::Dec,
        "not" => Mnemonic::Not,
        "neg" => Mnemonic::Neg,
        "mul" => Mnemonic::Mul,
        "imul" => Mnemonic::Imul,
        "div" => Mnemonic::Div,
        "idiv" => Mnemonic::Idiv,
        "shl" => Mnemonic::Shl,
        "shr" => Mnemonic::Shr,
        "sar" => Mnemonic::Sar,
        "rol" => Mnemonic::Rol,
        "ror" => Mnemonic::Ror,
        "rcl" => Mnemonic::Rcl,
        "rcr" => Mnemonic::Rcr,
        "movzx" => Mnemonic::Movzx,
        "movsx" => Mnemonic::Movsx,
        "movsxd" => Mnemonic::Movsxd,
        other => {
            if let Some(suffix) = other.strip_prefix('j') {
                return parse_condition(suffix).map(Mnemonic::Jcc);
            }
            if let Some(suffix) = other.strip_prefix("set") {
                return parse_condition(suffix).map(Mnemonic::Setcc);
            }
            return Err(Error::ParseError(format!("unrecognized mnemonic {s:?}")));
        }
    })
}

fn parse_condition(suffix: &str) -> Result<ConditionCode> {
    ConditionCode::ALL
        .iter()
        .find(|cc| cc.suffix() == suffix)
        .copied()
        .ok_or_else(|| Error::ParseError(format!("unrecognized condition code suffix {suffix:?}")))
}

/// Splits on top-level commas only, so `[rax+rbx]` doesn't get split even
/// though its contents never contain a comma in this grammar (kept general in
/// case a future operand form does).
fn split_operands(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth -= 1;
                current.push(c);
            }
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

fn parse_operand(s: &str) -> Result<Operand> {
    let mut s = s.trim();

    let mut pointer_size = None;
    for (keyword, size) in [
        ("BYTE PTR", PointerSize::Byte),
        ("WORD PTR", PointerSize::Word),
        ("DWORD PTR", PointerSize::Dword),
        ("QWORD PTR", PointerSize::Qword),
        ("TBYTE PTR", PointerSize::Tbyte),
        ("XMMWORD PTR", PointerSize::XmmWord),
        ("YMMWORD PTR", PointerSize::YmmWord),
        ("ZMMWORD PTR", PointerSize::ZmmWord),
    ] {
        if let Some(stripped) = s.strip_prefix(keyword) {
            pointer_size = Some(size);
            s = stripped.trim_start();
            break;
        }
    }

    if let Some(bracket_start) = s.find('[') {
        return parse_memory(s, bracket_start, pointer_size);
    }

    if pointer_size.is_some() {
        return Err(Error::ParseError("pointer-size qualifier without a memory operand".into()));
    }

    if let Some(reg) = parse_register(s) {
        return Ok(Operand::Register(reg));
    }

    if let Some(v) = parse_integer(s) {
        return Ok(Operand::Immediate(classify_immediate(v)));
    }

    Err(Error::ParseError(format!("unrecognized operand {s:?}")))
}

fn parse_memory(s: &str, bracket_start: usize, pointer_size: Option<PointerSize>) -> Result<Operand> {
    let before = &s[..bracket_start];
    let seg = if let Some(idx) = before.find(':') {
        Some(
            parse_register(before[..idx].trim())
                .ok_or_else(|| Error::ParseError(format!("unrecognized segment register {:?}", &before[..idx])))?,
        )
    } else {
        None
    };

    if !s.ends_with(']') {
        return Err(Error::ParseError("unterminated memory operand".into()));
    }
    let inner = &s[bracket_start + 1..s.len() - 1];

    let mut builder = IndirectOperand::builder();
    if let Some(p) = pointer_size {
        builder = builder.pointer_size(p).map_err(to_parse_err)?;
    }
    if let Some(seg) = seg {
        builder = builder.segment_override(seg).map_err(to_parse_err)?;
    }

    for term in split_additive_terms(inner) {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        if let Some((reg_part, scale_part)) = term.split_once('*') {
            let reg = parse_register(reg_part.trim())
                .ok_or_else(|| Error::ParseError(format!("unrecognized index register {:?}", reg_part)))?;
            let scale: u8 = scale_part
                .trim()
                .parse()
                .map_err(|_| Error::ParseError(format!("invalid scale {:?}", scale_part)))?;
            builder = builder.index(reg).map_err(to_parse_err)?;
            builder = builder.scale(scale).map_err(to_parse_err)?;
            continue;
        }
        if let Some(reg) = parse_register(term) {
            builder = builder.base(reg).map_err(to_parse_err)?;
            continue;
        }
        if let Some(v) = parse_integer(term) {
            builder = builder.displacement(v as i32).map_err(to_parse_err)?;
            continue;
        }
        return Err(Error::ParseError(format!("unrecognized memory term {:?}", term)));
    }

    Ok(Operand::Memory(builder.finalize().map_err(to_parse_err)?))
}

fn to_parse_err(e: Error) -> Error {
    Error::ParseError(e.to_string())
}

/// Splits `base+index*scale+disp` / `base-disp` style content on top-level `+`
/// and `-`, keeping a leading sign attached to the term that follows it.
fn split_additive_terms(s: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    for (i, c) in s.char_indices() {
        if (c == '+' || c == '-') && i != 0 {
            terms.push(std::mem::take(&mut current));
            if c == '-' {
                current.push('-');
            }
        } else {
            current.push(c);
        }
    }
    terms.push(current);
    terms
}

fn parse_integer(s: &str) -> Option<i64> {
    let s = s.trim();
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let v = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()?
    } else {
        s.parse::<i64>().ok()?
    };
    Some(if neg { -v } else { v })
}

fn classify_immediate(v: i64) -> Immediate {
    if let Ok(v8) = i8::try_from(v) {
        Immediate::Imm8(v8)
    } else if let Ok(v16) = i16::try_from(v) {
        Immediate::Imm16(v16)
    } else if let Ok(v32) = i32::try_from(v) {
        Immediate::Imm32(v32)
    } else {
        Immediate::Imm64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::register::Register;

    #[test]
    fn parses_register_to_register_mov() {
        let inst = parse_instruction("mov rax,rbx").unwrap();
        assert_eq!(inst.mnemonic, Mnemonic::Mov);
        assert_eq!(inst.op1.unwrap().as_register(), Some(Register::Gpr64(0)));
        assert_eq!(inst.op2.unwrap().as_register(), Some(Register::Gpr64(3)));
    }

    #[test]
    fn parses_memory_operand_with_sib_and_displacement() {
        let inst = parse_instruction("cmp WORD PTR [r9+rcx*4+0x12345678],0xbeef").unwrap();
        assert_eq!(inst.mnemonic, Mnemonic::Cmp);
        let mem = inst.op1.unwrap().as_memory().unwrap().clone();
        assert_eq!(mem.base, Some(Register::Gpr64(9)));
        assert_eq!(mem.index, Some(Register::Gpr64(1)));
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.displacement, 0x12345678);
        assert_eq!(mem.pointer_size, Some(PointerSize::Word));
    }

    #[test]
    fn parses_mnemonic_only_instruction() {
        let inst = parse_instruction("ret").unwrap();
        assert_eq!(inst.mnemonic, Mnemonic::Ret);
        assert_eq!(inst.operand_count(), 0);
    }

    #[test]
    fn parses_condition_code_mnemonics() {
        assert_eq!(parse_instruction("jne 0x10").unwrap().mnemonic, Mnemonic::Jcc(ConditionCode::Ne));
        assert_eq!(parse_instruction("seta al").unwrap().mnemonic, Mnemonic::Setcc(ConditionCode::A));
    }

    #[test]
    fn rejects_unknown_mnemonic() {
        assert!(parse_instruction("frobnicate rax").is_err());
    }

    #[test]
    fn round_trips_through_printer() {
        use crate::x86::printer::format_instruction;
        let inst = parse_instruction("mov rax,rbx").unwrap();
        assert_eq!(format_instruction(&inst, None), "mov    rax,rbx");
    }
}
