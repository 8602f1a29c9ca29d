//! Bytes -> `Instruction`. A state machine following the grammar order of the
//! design: legacy prefixes, REX, opcode, ModR/M, SIB, displacement, immediate.

use crate::bytes::ByteReader;
use crate::error::{Error, Result};
use crate::x86::instruction::{ConditionCode, Instruction, Mnemonic, PrefixFlags, Prefixes};
use crate::x86::modrm::{ModRm, Rex, Sib};
use crate::x86::operand::{Immediate, IndirectOperand, Operand, PointerSize};
use crate::x86::register::Register;
use crate::x86::tables::{grp1_mnemonic, grp2_mnemonic, grp3_mnemonic, grp5, Grp5};

/// The effective width of a general-purpose-register operand, chosen from the
/// REX.W bit and the 66 (operand-size override) prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
    Dword,
    Qword,
}

impl Width {
    pub fn pointer_size(&self) -> PointerSize {
        match self {
            Width::Byte => PointerSize::Byte,
            Width::Word => PointerSize::Word,
            Width::Dword => PointerSize::Dword,
            Width::Qword => PointerSize::Qword,
        }
    }
}

fn operand_width(prefixes: &Prefixes, rex: Rex) -> Width {
    if rex.w {
        Width::Qword
    } else if prefixes.operand_size_override() {
        Width::Word
    } else {
        Width::Dword
    }
}

fn gpr(width: Width, index: u8, rex_present: bool) -> Register {
    match width {
        Width::Byte => Register::gpr8(index, rex_present),
        Width::Word => Register::Gpr16(index),
        Width::Dword => Register::Gpr32(index),
        Width::Qword => Register::Gpr64(index),
    }
}

/// One legacy prefix byte's effect. `Segment` carries which override register.
enum LegacyPrefix {
    Lock,
    Repne,
    Repe,
    Segment(Register),
    OperandSize,
    AddressSize,
}

fn classify_legacy_prefix(byte: u8) -> Option<LegacyPrefix> {
    Some(match byte {
        0xF0 => LegacyPrefix::Lock,
        0xF2 => LegacyPrefix::Repne,
        0xF3 => LegacyPrefix::Repe,
        0x26 => LegacyPrefix::Segment(Register::Segment(0)), // ES
        0x2E => LegacyPrefix::Segment(Register::Segment(1)), // CS
        0x36 => LegacyPrefix::Segment(Register::Segment(2)), // SS
        0x3E => LegacyPrefix::Segment(Register::Segment(3)), // DS
        0x64 => LegacyPrefix::Segment(Register::Segment(4)), // FS
        0x65 => LegacyPrefix::Segment(Register::Segment(5)), // GS
        0x66 => LegacyPrefix::OperandSize,
        0x67 => LegacyPrefix::AddressSize,
        _ => return None,
    })
}

fn decode_prefixes(reader: &mut ByteReader) -> Result<Prefixes> {
    let mut prefixes = Prefixes::default();
    loop {
        let byte = *reader.peek(1)?.first().unwrap();
        match classify_legacy_prefix(byte) {
            Some(LegacyPrefix::Lock) => {
                prefixes.flags.insert(PrefixFlags::LOCK);
            }
            Some(LegacyPrefix::Repne) => {
                prefixes.flags.insert(PrefixFlags::REPNE);
            }
            Some(LegacyPrefix::Repe) => {
                prefixes.flags.insert(PrefixFlags::REPE);
            }
            Some(LegacyPrefix::Segment(reg)) => {
                prefixes.segment = Some(reg);
            }
            Some(LegacyPrefix::OperandSize) => {
                prefixes.flags.insert(PrefixFlags::OPERAND_SIZE_OVERRIDE);
            }
            Some(LegacyPrefix::AddressSize) => {
                prefixes.flags.insert(PrefixFlags::ADDRESS_SIZE_OVERRIDE);
            }
            None => break,
        }
        reader.read_u8()?;
    }
    Ok(prefixes)
}

fn decode_rex(reader: &mut ByteReader) -> Result<(Rex, bool)> {
    let byte = *reader.peek(1)?.first().unwrap();
    if Rex::is_rex_byte(byte) {
        reader.read_u8()?;
        Ok((Rex::decode(byte), true))
    } else {
        Ok((Rex::default(), false))
    }
}

/// Reads a ModR/M byte and, if present, its SIB byte and displacement,
/// producing the `rm` operand at the given operand width. `reg_field` is
/// returned separately since callers need it both to pick the other operand
/// (when it names a register) and, for group opcodes, to select the mnemonic.
struct DecodedModRm {
    modrm: ModRm,
    reg_extended: u8,
    rm_operand: Operand,
}

fn decode_modrm(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
) -> Result<DecodedModRm> {
    let byte = reader.read_u8()?;
    let modrm = ModRm::decode(byte);
    let reg_extended = modrm.reg | ((rex.r as u8) << 3);

    if modrm.is_register_direct() {
        let idx = modrm.rm | ((rex.b as u8) << 3);
        return Ok(DecodedModRm {
            modrm,
            reg_extended,
            rm_operand: Operand::Register(gpr(width, idx, rex_present)),
        });
    }

    let mut builder = IndirectOperand::builder();
    let mut sib_has_base = true;

    if modrm.has_sib() {
        let sib_byte = reader.read_u8()?;
        let sib = Sib::decode(sib_byte);
        if sib.has_index(rex.x as u8) {
            let idx = sib.index | ((rex.x as u8) << 3);
            builder = builder
                .index(Register::Gpr64(idx))
                .map_err(|e| Error::InvalidInstruction(e.to_string()))?
                .scale(sib.scale())
                .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
        }
        sib_has_base = sib.has_base(modrm.md, rex.b as u8);
        if sib_has_base {
            let base = sib.base | ((rex.b as u8) << 3);
            builder = builder
                .base(Register::Gpr64(base))
                .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
        }
    } else if modrm.is_rip_relative() {
        builder = builder
            .base(Register::Rip)
            .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
    } else {
        let idx = modrm.rm | ((rex.b as u8) << 3);
        builder = builder
            .base(Register::Gpr64(idx))
            .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
    }

    let needs_disp32_no_base = modrm.has_sib() && !sib_has_base;
    match modrm.md {
        0b00 => {
            if needs_disp32_no_base || modrm.is_rip_relative() {
                let disp = reader.read_i32()?;
                builder = builder
                    .displacement(disp)
                    .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
            }
        }
        0b01 => {
            let disp = reader.read_i8()? as i32;
            builder = builder
                .displacement(disp)
                .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
        }
        0b10 => {
            let disp = reader.read_i32()?;
            builder = builder
                .displacement(disp)
                .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
        }
        _ => unreachable!("mod==11 handled as register-direct above"),
    }

    if let Some(seg) = prefixes.segment {
        builder = builder
            .segment_override(seg)
            .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
    }
    builder = builder
        .pointer_size(width.pointer_size())
        .map_err(|e| Error::InvalidInstruction(e.to_string()))?;

    let mem = builder
        .finalize()
        .map_err(|e| Error::InvalidInstruction(e.to_string()))?;
    Ok(DecodedModRm {
        modrm,
        reg_extended,
        rm_operand: Operand::Memory(mem),
    })
}

fn read_immediate(reader: &mut ByteReader, width: Width) -> Result<Immediate> {
    Ok(match width {
        Width::Byte => Immediate::Imm8(reader.read_i8()?),
        Width::Word => Immediate::Imm16(reader.read_u16()? as i16),
        Width::Dword => Immediate::Imm32(reader.read_i32()?),
        Width::Qword => Immediate::Imm64(reader.read_i64()?),
    })
}

/// Immediate width used by "Iz" operands: 16-bit if the operand-size override
/// is active, otherwise always 32-bit (even with REX.W — the immediate is
/// sign-extended to 64 by the CPU, not widened in the encoding).
fn iz_width(prefixes: &Prefixes) -> Width {
    if prefixes.operand_size_override() {
        Width::Word
    } else {
        Width::Dword
    }
}

fn jcc_from_byte(low_nibble: u8) -> Mnemonic {
    Mnemonic::Jcc(ConditionCode::from_index(low_nibble).expect("low nibble is always 0..=15"))
}

fn setcc_from_byte(low_nibble: u8) -> Mnemonic {
    Mnemonic::Setcc(ConditionCode::from_index(low_nibble).expect("low nibble is always 0..=15"))
}

/// Decodes exactly one instruction starting at the reader's current cursor.
/// Returns the instruction and the number of bytes consumed.
pub fn decode(reader: &mut ByteReader) -> Result<(Instruction, usize)> {
    let start = reader.cursor();
    log::trace!("decoding instruction at cursor {start}");
    let prefixes = decode_prefixes(reader)?;
    let (rex, rex_present) = decode_rex(reader)?;
    let width = operand_width(&prefixes, rex);

    let opcode = reader.read_u8()?;
    let mut inst = match opcode {
        // ALU r/m,r and r,r/m and accumulator forms, 6 groups of 8 opcodes each.
        0x00..=0x3D if is_alu_opcode(opcode) => {
            decode_alu(reader, opcode, &prefixes, rex, rex_present, width)?
        }

        0x50..=0x57 => {
            let idx = (opcode - 0x50) | ((rex.b as u8) << 3);
            Instruction::with_operands(
                Mnemonic::Push,
                &[Operand::Register(Register::Gpr64(idx))],
            )
        }
        0x58..=0x5F => {
            let idx = (opcode - 0x58) | ((rex.b as u8) << 3);
            Instruction::with_operands(Mnemonic::Pop, &[Operand::Register(Register::Gpr64(idx))])
        }

        0x63 => {
            // MOVSXD Gv, Ed: destination is always REX.W-sized, source is Ed (32-bit).
            let dm = decode_modrm(reader, rex, rex_present, &prefixes, Width::Dword)?;
            let dst_width = if rex.w { Width::Qword } else { Width::Dword };
            let dst = Operand::Register(gpr(dst_width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Movsxd, &[dst, dm.rm_operand])
        }

        0x68 => {
            let imm = read_immediate(reader, iz_width(&prefixes))?;
            Instruction::with_operands(Mnemonic::Push, &[Operand::Immediate(imm)])
        }
        0x69 => {
            let dm = decode_modrm(reader, rex, rex_present, &prefixes, width)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            let imm = read_immediate(reader, iz_width(&prefixes))?;
            Instruction::with_operands(Mnemonic::Imul, &[reg, dm.rm_operand, Operand::Immediate(imm)])
        }
        0x6A => {
            let imm = read_immediate(reader, Width::Byte)?;
            Instruction::with_operands(Mnemonic::Push, &[Operand::Immediate(imm)])
        }
        0x6B => {
            let dm = decode_modrm(reader, rex, rex_present, &prefixes, width)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            let imm = read_immediate(reader, Width::Byte)?;
            Instruction::with_operands(Mnemonic::Imul, &[reg, dm.rm_operand, Operand::Immediate(imm)])
        }

        0x70..=0x7F => {
            let rel = reader.read_i8()? as i32;
            Instruction::with_operands(
                jcc_from_byte(opcode - 0x70),
                &[Operand::Relative(crate::x86::operand::RelativeOffset(rel))],
            )
        }

        0x80 => decode_grp1(reader, rex, rex_present, &prefixes, Width::Byte, Width::Byte)?,
        0x81 => decode_grp1(reader, rex, rex_present, &prefixes, width, iz_width(&prefixes))?,
        0x83 => decode_grp1(reader, rex, rex_present, &prefixes, width, Width::Byte)?,

        0x84 => decode_rm_reg(reader, rex, rex_present, &prefixes, Width::Byte, Mnemonic::Test, true)?,
        0x85 => decode_rm_reg(reader, rex, rex_present, &prefixes, width, Mnemonic::Test, true)?,
        0x86 => decode_rm_reg(reader, rex, rex_present, &prefixes, Width::Byte, Mnemonic::Xchg, true)?,
        0x87 => decode_rm_reg(reader, rex, rex_present, &prefixes, width, Mnemonic::Xchg, true)?,
        0x88 => decode_rm_reg(reader, rex, rex_present, &prefixes, Width::Byte, Mnemonic::Mov, true)?,
        0x89 => decode_rm_reg(reader, rex, rex_present, &prefixes, width, Mnemonic::Mov, true)?,
        0x8A => decode_rm_reg(reader, rex, rex_present, &prefixes, Width::Byte, Mnemonic::Mov, false)?,
        0x8B => decode_rm_reg(reader, rex, rex_present, &prefixes, width, Mnemonic::Mov, false)?,

        0x8D => {
            let dm = decode_modrm(reader, rex, rex_present, &prefixes, width)?;
            if dm.rm_operand.as_memory().is_none() {
                return Err(Error::InvalidInstruction("LEA requires a memory operand".into()));
            }
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Lea, &[reg, dm.rm_operand])
        }

        // 0x90 is NOP; with REX.B it is XCHG r8,rax, but that form has no
        // ModR/M byte either way (the register is implied by the opcode), so
        // both cases consume nothing further.
        0x90 => {
            if rex.b {
                Instruction::with_operands(
                    Mnemonic::Xchg,
                    &[
                        Operand::Register(Register::Gpr64(8)),
                        Operand::Register(Register::Gpr64(0)),
                    ],
                )
            } else {
                Instruction::new(Mnemonic::Nop)
            }
        }

        0x98 => {
            if rex.w {
                Instruction::new(Mnemonic::Cdqe)
            } else {
                Instruction::new(Mnemonic::Cwde)
            }
        }
        0x99 => {
            if rex.w {
                Instruction::new(Mnemonic::Cqo)
            } else {
                Instruction::new(Mnemonic::Cdq)
            }
        }

        0xA8 => {
            let imm = read_immediate(reader, Width::Byte)?;
            Instruction::with_operands(
                Mnemonic::Test,
                &[Operand::Register(Register::gpr8(0, rex_present)), Operand::Immediate(imm)],
            )
        }
        0xA9 => {
            let imm = read_immediate(reader, iz_width(&prefixes))?;
            Instruction::with_operands(
                Mnemonic::Test,
                &[Operand::Register(gpr(width, 0, rex_present)), Operand::Immediate(imm)],
            )
        }

        0xB0..=0xB7 => {
            let idx = (opcode - 0xB0) | ((rex.b as u8) << 3);
            let imm = read_immediate(reader, Width::Byte)?;
            Instruction::with_operands(
                Mnemonic::Mov,
                &[Operand::Register(Register::gpr8(idx, rex_present)), Operand::Immediate(imm)],
            )
        }
        0xB8..=0xBF => {
            let idx = (opcode - 0xB8) | ((rex.b as u8) << 3);
            let imm = if rex.w {
                Immediate::Imm64(reader.read_i64()?)
            } else {
                read_immediate(reader, width)?
            };
            Instruction::with_operands(
                Mnemonic::Mov,
                &[Operand::Register(gpr(width, idx, rex_present)), Operand::Immediate(imm)],
            )
        }

        0xC0 => decode_grp2(reader, rex, rex_present, &prefixes, Width::Byte, ShiftCount::Imm8)?,
        0xC1 => decode_grp2(reader, rex, rex_present, &prefixes, width, ShiftCount::Imm8)?,
        0xC3 => Instruction::new(Mnemonic::Ret),
        0xC6 => decode_grp11(reader, rex, rex_present, &prefixes, Width::Byte)?,
        0xC7 => decode_grp11(reader, rex, rex_present, &prefixes, width)?,
        0xC9 => Instruction::new(Mnemonic::Leave),
        0xCC => Instruction::new(Mnemonic::Int3),

        0xD0 => decode_grp2(reader, rex, rex_present, &prefixes, Width::Byte, ShiftCount::One)?,
        0xD1 => decode_grp2(reader, rex, rex_present, &prefixes, width, ShiftCount::One)?,
        0xD2 => decode_grp2(reader, rex, rex_present, &prefixes, Width::Byte, ShiftCount::Cl)?,
        0xD3 => decode_grp2(reader, rex, rex_present, &prefixes, width, ShiftCount::Cl)?,

        0xE8 => {
            let rel = reader.read_i32()?;
            Instruction::with_operands(
                Mnemonic::Call,
                &[Operand::Relative(crate::x86::operand::RelativeOffset(rel))],
            )
        }
        0xE9 => {
            let rel = reader.read_i32()?;
            Instruction::with_operands(
                Mnemonic::Jmp,
                &[Operand::Relative(crate::x86::operand::RelativeOffset(rel))],
            )
        }
        0xEB => {
            let rel = reader.read_i8()? as i32;
            Instruction::with_operands(
                Mnemonic::Jmp,
                &[Operand::Relative(crate::x86::operand::RelativeOffset(rel))],
            )
        }

        0xF6 => decode_grp3(reader, rex, rex_present, &prefixes, Width::Byte)?,
        0xF7 => decode_grp3(reader, rex, rex_present, &prefixes, width)?,

        0xFE => {
            let dm = decode_modrm(reader, rex, rex_present, &prefixes, Width::Byte)?;
            let mnemonic = match dm.reg_extended & 0b111 {
                0 => Mnemonic::Inc,
                1 => Mnemonic::Dec,
                other => {
                    let err = Error::ReservedOpcode(format!("Grp4 /{other}"));
                    log::warn!("{err}");
                    return Err(err);
                }
            };
            Instruction::with_operands(mnemonic, &[dm.rm_operand])
        }
        0xFF => decode_grp5(reader, rex, rex_present, &prefixes, width)?,

        0x0F => decode_two_byte(reader, rex, rex_present, &prefixes, width)?,

        other => {
            let err = Error::UnknownOpcode(format!("0x{other:02x}"));
            log::warn!("{err}");
            return Err(err);
        }
    };

    inst.prefixes = prefixes;
    let consumed = reader.cursor() - start;
    crate::x86::validate::validate(&inst)?;
    Ok((inst, consumed))
}

fn is_alu_opcode(opcode: u8) -> bool {
    // Exclude the bytes in 0x00..=0x3D that are actually segment-prefix or
    // BCD-adjust bytes removed in 64-bit mode; those never reach this match
    // arm because segment prefixes are consumed by decode_prefixes, and the
    // BCD opcodes (0x27,0x2F,0x37,0x3F) and segment push/pop (0x06,0x07,0x0E,
    // 0x16,0x17,0x1E,0x1F) are simply not valid in long mode.
    let group = opcode / 8;
    let slot = opcode % 8;
    group <= 7 && slot <= 5
}

fn decode_alu(
    reader: &mut ByteReader,
    opcode: u8,
    prefixes: &Prefixes,
    rex: Rex,
    rex_present: bool,
    width: Width,
) -> Result<Instruction> {
    let group = opcode / 8;
    let slot = opcode % 8;
    let mnemonic = grp1_mnemonic(group);
    match slot {
        0 => decode_rm_reg(reader, rex, rex_present, prefixes, Width::Byte, mnemonic, true),
        1 => decode_rm_reg(reader, rex, rex_present, prefixes, width, mnemonic, true),
        2 => decode_rm_reg(reader, rex, rex_present, prefixes, Width::Byte, mnemonic, false),
        3 => decode_rm_reg(reader, rex, rex_present, prefixes, width, mnemonic, false),
        4 => {
            let imm = read_immediate(reader, Width::Byte)?;
            Ok(Instruction::with_operands(
                mnemonic,
                &[Operand::Register(Register::gpr8(0, rex_present)), Operand::Immediate(imm)],
            ))
        }
        5 => {
            let imm = read_immediate(reader, iz_width(prefixes))?;
            Ok(Instruction::with_operands(
                mnemonic,
                &[Operand::Register(gpr(width, 0, rex_present)), Operand::Immediate(imm)],
            ))
        }
        _ => unreachable!("is_alu_opcode filters slot <= 5"),
    }
}

/// Shared shape for `mnemonic r/m, reg` (`to_rm = true`) and
/// `mnemonic reg, r/m` (`to_rm = false`) encodings.
fn decode_rm_reg(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
    mnemonic: Mnemonic,
    to_rm: bool,
) -> Result<Instruction> {
    let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
    let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
    Ok(if to_rm {
        Instruction::with_operands(mnemonic, &[dm.rm_operand, reg])
    } else {
        Instruction::with_operands(mnemonic, &[reg, dm.rm_operand])
    })
}

fn decode_grp1(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    rm_width: Width,
    imm_width: Width,
) -> Result<Instruction> {
    let dm = decode_modrm(reader, rex, rex_present, prefixes, rm_width)?;
    let mnemonic = grp1_mnemonic(dm.reg_extended);
    let imm = read_immediate(reader, imm_width)?;
    Ok(Instruction::with_operands(
        mnemonic,
        &[dm.rm_operand, Operand::Immediate(imm)],
    ))
}

enum ShiftCount {
    One,
    Cl,
    Imm8,
}

fn decode_grp2(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
    count: ShiftCount,
) -> Result<Instruction> {
    let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
    let mnemonic = grp2_mnemonic(dm.reg_extended);
    let count_operand = match count {
        ShiftCount::One => Operand::Immediate(Immediate::Imm8(1)),
        ShiftCount::Cl => Operand::Register(Register::gpr8(1, rex_present)),
        ShiftCount::Imm8 => Operand::Immediate(read_immediate(reader, Width::Byte)?),
    };
    Ok(Instruction::with_operands(mnemonic, &[dm.rm_operand, count_operand]))
}

fn decode_grp11(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
) -> Result<Instruction> {
    let imm_width = if width == Width::Byte { Width::Byte } else { iz_width(prefixes) };
    let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
    if dm.reg_extended & 0b111 != 0 {
        let err = Error::ReservedOpcode(format!(
            "Grp11 /{} (only /0 = MOV is defined)",
            dm.reg_extended & 0b111
        ));
        log::warn!("{err}");
        return Err(err);
    }
    let imm = read_immediate(reader, imm_width)?;
    Ok(Instruction::with_operands(
        Mnemonic::Mov,
        &[dm.rm_operand, Operand::Immediate(imm)],
    ))
}

fn decode_grp3(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
) -> Result<Instruction> {
    let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
    let reg = dm.reg_extended & 0b111;
    if reg <= 1 {
        let imm_width = if width == Width::Byte { Width::Byte } else { iz_width(prefixes) };
        let imm = read_immediate(reader, imm_width)?;
        return Ok(Instruction::with_operands(
            Mnemonic::Test,
            &[dm.rm_operand, Operand::Immediate(imm)],
        ));
    }
    let mnemonic = grp3_mnemonic(reg)?;
    Ok(Instruction::with_operands(mnemonic, &[dm.rm_operand]))
}

fn decode_grp5(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
) -> Result<Instruction> {
    let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
    let reg = dm.reg_extended & 0b111;
    Ok(match grp5(reg)? {
        Grp5::Inc => Instruction::with_operands(Mnemonic::Inc, &[dm.rm_operand]),
        Grp5::Dec => Instruction::with_operands(Mnemonic::Dec, &[dm.rm_operand]),
        Grp5::Call => Instruction::with_operands(Mnemonic::Call, &[dm.rm_operand]),
        Grp5::Jmp => Instruction::with_operands(Mnemonic::Jmp, &[dm.rm_operand]),
        Grp5::Push => Instruction::with_operands(Mnemonic::Push, &[dm.rm_operand]),
    })
}

fn decode_two_byte(
    reader: &mut ByteReader,
    rex: Rex,
    rex_present: bool,
    prefixes: &Prefixes,
    width: Width,
) -> Result<Instruction> {
    let second = reader.read_u8()?;
    if second == 0x38 || second == 0x3A {
        let third = reader.read_u8()?;
        let err = Error::UnknownOpcode(format!(
            "three-byte opcode map 0F {second:02x} {third:02x} is not in the supported subset"
        ));
        log::warn!("{err}");
        return Err(err);
    }

    Ok(match second {
        0x1F => {
            // multi-byte NOP Ev; decode and discard the operand, the mnemonic takes none.
            let _ = decode_modrm(reader, rex, rex_present, prefixes, width)?;
            Instruction::new(Mnemonic::Nop)
        }
        0x80..=0x8F => {
            let rel = reader.read_i32()?;
            Instruction::with_operands(
                jcc_from_byte(second - 0x80),
                &[Operand::Relative(crate::x86::operand::RelativeOffset(rel))],
            )
        }
        0x90..=0x9F => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, Width::Byte)?;
            Instruction::with_operands(setcc_from_byte(second - 0x90), &[dm.rm_operand])
        }
        0xAF => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, width)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Imul, &[reg, dm.rm_operand])
        }
        0xB6 => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, Width::Byte)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Movzx, &[reg, dm.rm_operand])
        }
        0xB7 => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, Width::Word)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Movzx, &[reg, dm.rm_operand])
        }
        0xBE => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, Width::Byte)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Movsx, &[reg, dm.rm_operand])
        }
        0xBF => {
            let dm = decode_modrm(reader, rex, rex_present, prefixes, Width::Word)?;
            let reg = Operand::Register(gpr(width, dm.reg_extended, rex_present));
            Instruction::with_operands(Mnemonic::Movsx, &[reg, dm.rm_operand])
        }
        other => {
            let err = Error::UnknownOpcode(format!("0F {other:02x}"));
            log::warn!("{err}");
            return Err(err);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::operand::PointerSize;

    #[test]
    fn decodes_cmp_word_ptr_example_from_design() {
        // cmp WORD PTR [r9+rcx*4+0x12345678],0xbeef
        let bytes = [
            0x66, 0x41, 0x81, 0xBC, 0x89, 0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE,
        ];
        let mut reader = ByteReader::new(&bytes);
        let (inst, consumed) = decode(&mut reader).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(inst.mnemonic, Mnemonic::Cmp);
        let mem = inst.op1.unwrap().as_memory().unwrap().clone();
        assert_eq!(mem.base, Some(Register::Gpr64(9)));
        assert_eq!(mem.index, Some(Register::Gpr64(1)));
        assert_eq!(mem.scale, 4);
        assert_eq!(mem.displacement, 0x12345678);
        assert_eq!(mem.pointer_size, Some(PointerSize::Word));
        let imm = inst.op2.unwrap().as_immediate().unwrap();
        assert_eq!(imm.as_i64(), 0xbeef);
    }

    #[test]
    fn decodes_ret() {
        let bytes = [0xC3];
        let mut reader = ByteReader::new(&bytes);
        let (inst, consumed) = decode(&mut reader).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(inst.mnemonic, Mnemonic::Ret);
    }

    #[test]
    fn decodes_push_reg_with_rex_extension() {
        let bytes = [0x41, 0x57]; // push r15
        let mut reader = ByteReader::new(&bytes);
        let (inst, _) = decode(&mut reader).unwrap();
        assert_eq!(inst.mnemonic, Mnemonic::Push);
        assert_eq!(inst.op1.unwrap().as_register(), Some(Register::Gpr64(15)));
    }

    #[test]
    fn decodes_mov_reg_imm64() {
        let bytes = [0x48, 0xB8, 1, 0, 0, 0, 0, 0, 0, 0]; // mov rax, 1
        let mut reader = ByteReader::new(&bytes);
        let (inst, consumed) = decode(&mut reader).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(inst.mnemonic, Mnemonic::Mov);
        assert_eq!(inst.op1.unwrap().as_register(), Some(Register::Gpr64(0)));
    }

    #[test]
    fn unknown_opcode_errors() {
        let bytes = [0x0F, 0xFF];
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(decode(&mut reader), Err(Error::UnknownOpcode(_))));
    }

    #[test]
    fn truncated_input_is_out_of_bounds() {
        let bytes = [0x48, 0xB8, 1, 2];
        let mut reader = ByteReader::new(&bytes);
        assert!(matches!(decode(&mut reader), Err(Error::OutOfBounds { .. })));
    }
}
