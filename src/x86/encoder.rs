//! `Instruction` -> bytes. The inverse of [`crate::x86::decoder`]; produces the
//! canonical encoding described in design §4.5 (fixed prefix order, shortest
//! displacement, REX only when needed, compact immediates).

use crate::error::{Error, Result};
use crate::x86::instruction::{ConditionCode, Instruction, Mnemonic};
use crate::x86::modrm::{ModRm, Rex, Sib};
use crate::x86::operand::{Immediate, IndirectOperand, Operand, RelativeOffset};
use crate::x86::register::Register;

#[derive(Debug, Clone, Copy, Default)]
struct RexNeeds {
    w: bool,
    r: bool,
    x: bool,
    b: bool,
    /// Set when an 8-bit register in SPL/BPL/SIL/DIL position is used, which
    /// forces a REX prefix to be emitted even if W/R/X/B are all zero.
    force: bool,
}

impl RexNeeds {
    fn merge(self, other: RexNeeds) -> RexNeeds {
        RexNeeds {
            w: self.w || other.w,
            r: self.r || other.r,
            x: self.x || other.x,
            b: self.b || other.b,
            force: self.force || other.force,
        }
    }

    fn is_needed(&self) -> bool {
        self.w || self.r || self.x || self.b || self.force
    }

    fn to_rex(self) -> Rex {
        Rex {
            w: self.w,
            r: self.r,
            x: self.x,
            b: self.b,
        }
    }
}

fn reg_rex(reg: Register) -> RexNeeds {
    let mut needs = RexNeeds::default();
    if let Register::Gpr8RexExtended(i) = reg {
        if (4..8).contains(&i) {
            needs.force = true;
        }
    }
    if let Some(enc) = reg.encoding() {
        if enc >= 8 {
            needs.r = true;
        }
    }
    if matches!(reg, Register::Gpr64(_)) {
        needs.w = true;
    }
    needs
}

/// Encodes a `reg`-position register into its REX.R-bearing encoding and
/// whether REX.W/force is implied by its width/identity.
fn reg_field_and_rex(reg: Register) -> Result<(u8, RexNeeds)> {
    let enc = reg
        .encoding()
        .ok_or_else(|| Error::InvalidEncoding(format!("{reg:?} cannot appear in a reg field")))?;
    let mut needs = reg_rex(reg);
    needs.r = enc >= 8;
    Ok((enc & 0b111, needs))
}

struct EncodedRm {
    bytes: Vec<u8>,
    rex: RexNeeds,
}

fn log2_scale(scale: u8) -> Result<u8> {
    match scale {
        1 => Ok(0),
        2 => Ok(1),
        4 => Ok(2),
        8 => Ok(3),
        other => {
            let err = Error::InvalidEncoding(format!("illegal SIB scale {other} (must be 1, 2, 4, or 8)"));
            log::warn!("{err}");
            Err(err)
        }
    }
}

fn encode_memory(mem: &IndirectOperand, reg_field: u8) -> Result<EncodedRm> {
    let mut bytes = Vec::new();
    let mut rex = RexNeeds::default();

    if let Some(Register::Rip) = mem.base {
        if mem.index.is_some() {
            return Err(Error::InvalidEncoding("RIP-relative addressing cannot have an index".into()));
        }
        bytes.push(ModRm { md: 0b00, reg: reg_field, rm: 0b101 }.encode());
        bytes.extend_from_slice(&mem.displacement.to_le_bytes());
        return Ok(EncodedRm { bytes, rex });
    }

    let base_enc = mem.base.map(|r| r.encoding().unwrap());
    let index_enc = mem.index.map(|r| r.encoding().unwrap());

    let needs_sib = mem.index.is_some()
        || base_enc.map(|e| e & 0b111 == 0b100).unwrap_or(false)
        || base_enc.is_none();

    if needs_sib {
        if let Some(idx) = mem.index {
            if matches!(idx, Register::Gpr64(4)) {
                return Err(Error::InvalidEncoding("RSP cannot be used as a SIB index".into()));
            }
        }
        let base_field = base_enc.map(|e| e & 0b111).unwrap_or(0b101);
        let index_field = index_enc.map(|e| e & 0b111).unwrap_or(0b100);
        if let Some(e) = base_enc {
            rex.b = e >= 8;
        }
        if let Some(e) = index_enc {
            rex.x = e >= 8;
        }

        let rbp_like = base_enc.map(|e| e & 0b111 == 0b101).unwrap_or(false);
        let md = if base_enc.is_none() {
            0b00
        } else if mem.displacement == 0 && !rbp_like {
            0b00
        } else if (-128..=127).contains(&mem.displacement) {
            0b01
        } else {
            0b10
        };

        bytes.push(ModRm { md, reg: reg_field, rm: 0b100 }.encode());
        bytes.push(
            Sib {
                scale_bits: log2_scale(mem.scale)?,
                index: index_field,
                base: base_field,
            }
            .encode(),
        );
        match md {
            0b00 => {
                if base_enc.is_none() {
                    bytes.extend_from_slice(&mem.displacement.to_le_bytes());
                }
            }
            0b01 => bytes.push(mem.displacement as i8 as u8),
            0b10 => bytes.extend_from_slice(&mem.displacement.to_le_bytes()),
            _ => unreachable!(),
        }
    } else {
        let base = mem.base.expect("needs_sib is false only when base is present");
        let enc = base_enc.unwrap();
        rex.b = enc >= 8;
        let rm_field = enc & 0b111;
        let rbp_like = rm_field == 0b101;

        let md = if mem.displacement == 0 && !rbp_like {
            0b00
        } else if (-128..=127).contains(&mem.displacement) {
            0b01
        } else {
            0b10
        };

        bytes.push(ModRm { md, reg: reg_field, rm: rm_field }.encode());
        match md {
            0b00 => {}
            0b01 => bytes.push(mem.displacement as i8 as u8),
            0b10 => bytes.extend_from_slice(&mem.displacement.to_le_bytes()),
            _ => unreachable!(),
        }
        let _ = base;
    }

    Ok(EncodedRm { bytes, rex })
}

fn encode_rm_operand(op: &Operand, reg_field: u8) -> Result<EncodedRm> {
    match op {
        Operand::Register(reg) => {
            let enc = reg
                .encoding()
                .ok_or_else(|| Error::InvalidEncoding(format!("{reg:?} cannot be an r/m operand")))?;
            let mut rex = reg_rex(*reg);
            rex.b = enc >= 8;
            rex.r = false; // r/m-position register never sets REX.R
            Ok(EncodedRm {
                bytes: vec![ModRm { md: 0b11, reg: reg_field, rm: enc & 0b111 }.encode()],
                rex,
            })
        }
        Operand::Memory(mem) => encode_memory(mem, reg_field),
        other => Err(Error::InvalidEncoding(format!("{other:?} is not a valid r/m operand"))),
    }
}

fn encode_immediate(buf: &mut Vec<u8>, imm: Immediate) {
    match imm {
        Immediate::Imm8(v) => buf.push(v as u8),
        Immediate::Imm16(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Immediate::Imm32(v) => buf.extend_from_slice(&v.to_le_bytes()),
        Immediate::Imm64(v) => buf.extend_from_slice(&v.to_le_bytes()),
    }
}

fn grp1_reg_field(mnemonic: Mnemonic) -> Option<u8> {
    Some(match mnemonic {
        Mnemonic::Add => 0,
        Mnemonic::Or => 1,
        Mnemonic::Adc => 2,
        Mnemonic::Sbb => 3,
        Mnemonic::And => 4,
        Mnemonic::Sub => 5,
        Mnemonic::Xor => 6,
        Mnemonic::Cmp => 7,
        _ => return None,
    })
}

fn grp2_reg_field(mnemonic: Mnemonic) -> Option<u8> {
    Some(match mnemonic {
        Mnemonic::Rol => 0,
        Mnemonic::Ror => 1,
        Mnemonic::Rcl => 2,
        Mnemonic::Rcr => 3,
        Mnemonic::Shl => 4,
        Mnemonic::Shr => 5,
        Mnemonic::Sar => 7,
        _ => return None,
    })
}

/// Encodes one instruction into its canonical byte sequence.
pub fn encode(inst: &Instruction) -> Result<Vec<u8>> {
    log::trace!("encoding {:?}", inst.mnemonic);
    crate::x86::validate::validate(inst)?;
    let mut prefix_bytes = Vec::new();
    if inst.prefixes.lock() {
        prefix_bytes.push(0xF0);
    }
    if inst.prefixes.repne() {
        prefix_bytes.push(0xF2);
    }
    if inst.prefixes.repe() {
        prefix_bytes.push(0xF3);
    }
    if let Some(seg) = inst.prefixes.segment {
        prefix_bytes.push(segment_prefix_byte(seg)?);
    }
    if inst.prefixes.operand_size_override() {
        prefix_bytes.push(0x66);
    }
    if inst.prefixes.address_size_override() {
        prefix_bytes.push(0x67);
    }

    let (opcode_bytes, rex) = encode_body(inst)?;

    let mut out = prefix_bytes;
    if rex.is_needed() {
        out.push(rex.to_rex().encode());
    }
    out.extend(opcode_bytes);
    Ok(out)
}

fn segment_prefix_byte(seg: Register) -> Result<u8> {
    let idx = seg
        .encoding()
        .ok_or_else(|| Error::InvalidEncoding("segment override is not a segment register".into()))?;
    Ok(match idx {
        0 => 0x26,
        1 => 0x2E,
        2 => 0x36,
        3 => 0x3E,
        4 => 0x64,
        5 => 0x65,
        other => return Err(Error::InvalidEncoding(format!("invalid segment index {other}"))),
    })
}

/// Encodes everything from the opcode byte onward, plus the REX requirements
/// implied by the operands (W/R/X/B bits; the caller decides whether a REX
/// byte is actually emitted based on `RexNeeds::is_needed`).
fn encode_body(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let m = inst.mnemonic;

    if let Some(reg_field) = grp1_reg_field(m) {
        return encode_alu(reg_field, inst);
    }
    if let Some(reg_field) = grp2_reg_field(m) {
        return encode_grp2(reg_field, inst);
    }

    match m {
        Mnemonic::Mov => encode_mov(inst),
        Mnemonic::Lea => encode_reg_rm(0x8D, inst, false),
        Mnemonic::Test => encode_test(inst),
        Mnemonic::Xchg => encode_rm_reg(0x87, 0x87, inst, true),
        Mnemonic::Push => encode_push(inst),
        Mnemonic::Pop => encode_pop(inst),
        Mnemonic::Nop => Ok((vec![0x90], RexNeeds::default())),
        Mnemonic::Ret => Ok((vec![0xC3], RexNeeds::default())),
        Mnemonic::Leave => Ok((vec![0xC9], RexNeeds::default())),
        Mnemonic::Int3 => Ok((vec![0xCC], RexNeeds::default())),
        Mnemonic::Cdqe => Ok((vec![0x98], RexNeeds { w: true, ..Default::default() })),
        Mnemonic::Cwde => Ok((vec![0x98], RexNeeds::default())),
        Mnemonic::Cqo => Ok((vec![0x99], RexNeeds { w: true, ..Default::default() })),
        Mnemonic::Cdq => Ok((vec![0x99], RexNeeds::default())),
        Mnemonic::Call => encode_call_jmp(0xE8, 0xFF, 2, inst),
        Mnemonic::Jmp => encode_jmp(inst),
        Mnemonic::Jcc(cc) => encode_jcc(cc, inst),
        Mnemonic::Setcc(cc) => encode_setcc(cc, inst),
        Mnemonic::Inc => encode_grp45(0, inst),
        Mnemonic::Dec => encode_grp45(1, inst),
        Mnemonic::Not => encode_grp3_unary(2, inst),
        Mnemonic::Neg => encode_grp3_unary(3, inst),
        Mnemonic::Mul => encode_grp3_unary(4, inst),
        Mnemonic::Div => encode_grp3_unary(6, inst),
        Mnemonic::Idiv => encode_grp3_unary(7, inst),
        Mnemonic::Imul => encode_imul(inst),
        Mnemonic::Movzx => encode_movx(0xB6, 0xB7, inst),
        Mnemonic::Movsx => encode_movx(0xBE, 0xBF, inst),
        Mnemonic::Movsxd => encode_movsxd(inst),
        Mnemonic::Add
        | Mnemonic::Or
        | Mnemonic::Adc
        | Mnemonic::Sbb
        | Mnemonic::And
        | Mnemonic::Sub
        | Mnemonic::Xor
        | Mnemonic::Cmp
        | Mnemonic::Shl
        | Mnemonic::Shr
        | Mnemonic::Sar
        | Mnemonic::Rol
        | Mnemonic::Ror
        | Mnemonic::Rcl
        | Mnemonic::Rcr => unreachable!("handled via grp1/grp2_reg_field above"),
    }
}

fn operand_width_of(op: &Operand) -> Option<u32> {
    match op {
        Operand::Register(r) => r.width(),
        Operand::Memory(m) => m.pointer_size.map(|p| p.bytes() * 8),
        _ => None,
    }
}

fn needs_operand_size_prefix(width: Option<u32>) -> bool {
    width == Some(16)
}

fn needs_rex_w(width: Option<u32>) -> bool {
    width == Some(64)
}

/// `mnemonic r/m, reg` (direction bit 0) / `mnemonic reg, r/m` (direction bit 1).
fn encode_rm_reg(opcode_to_rm: u8, opcode_to_reg: u8, inst: &Instruction, to_rm_first: bool) -> Result<(Vec<u8>, RexNeeds)> {
    let (rm_op, reg_op) = if to_rm_first {
        (inst.op1.ok_or_else(missing_operand)?, inst.op2.ok_or_else(missing_operand)?)
    } else {
        (inst.op2.ok_or_else(missing_operand)?, inst.op1.ok_or_else(missing_operand)?)
    };
    let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("expected register operand".into()))?;
    let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
    let is_byte = reg.width() == Some(8);
    let opcode = if is_byte {
        if to_rm_first { opcode_to_rm } else { opcode_to_reg }.wrapping_sub(1)
    } else if to_rm_first {
        opcode_to_rm
    } else {
        opcode_to_reg
    };
    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    reg_rex_needs.w = needs_rex_w(reg.width());
    let rex = encoded_rm.rex.merge(reg_rex_needs);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

fn missing_operand() -> Error {
    let err = Error::InvalidEncoding("missing required operand".into());
    log::warn!("{err}");
    err
}

fn encode_reg_rm(opcode: u8, inst: &Instruction, _unused: bool) -> Result<(Vec<u8>, RexNeeds)> {
    let reg_op = inst.op1.ok_or_else(missing_operand)?;
    let rm_op = inst.op2.ok_or_else(missing_operand)?;
    let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("expected register operand".into()))?;
    let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    reg_rex_needs.w = needs_rex_w(reg.width());
    let rex = encoded_rm.rex.merge(reg_rex_needs);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

/// ALU mnemonics (add/or/.../cmp) have two distinct encoding families sharing
/// one mnemonic: `r/m, imm` (Grp1, opcodes 80/81/83) when the second operand is
/// an immediate, or `r/m, reg` / `reg, r/m` (opcodes `reg_field*8 + 0..=3`)
/// otherwise.
fn encode_alu(reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op1 = inst.op1.ok_or_else(missing_operand)?;
    let op2 = inst.op2.ok_or_else(missing_operand)?;
    if op2.as_immediate().is_some() {
        return encode_grp1(reg_field, inst);
    }
    let base = reg_field * 8;
    let to_rm_first = match (op1, op2) {
        (Operand::Memory(_), _) => true,
        (_, Operand::Memory(_)) => false,
        _ => true,
    };
    encode_rm_reg(base + 1, base + 3, inst, to_rm_first)
}

fn encode_grp1(reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let rm_op = inst.op1.ok_or_else(missing_operand)?;
    let imm = inst.op2.and_then(|o| o.as_immediate()).ok_or_else(missing_operand)?;
    let width = operand_width_of(&rm_op);
    let is_byte = width == Some(8);

    let (opcode, imm_is_8): (u8, bool) = if is_byte {
        (0x80, true)
    } else if imm.fits_i8() && imm.width() != 8 {
        (0x83, true)
    } else {
        (0x81, false)
    };
    // AL/eAX, imm short forms (opcode group base + 4/5) only apply to
    // register operand 0 without a ModR/M byte.
    if let Operand::Register(r) = rm_op {
        if r.encoding() == Some(0) && !is_byte && !imm_is_8 {
            let group = reg_field * 8;
            let mut bytes = vec![group + 5];
            encode_immediate(&mut bytes, imm);
            let rex = RexNeeds { w: needs_rex_w(width), ..Default::default() };
            return Ok((bytes, rex));
        }
        if r.encoding() == Some(0) && is_byte {
            let group = reg_field * 8;
            let mut bytes = vec![group + 4];
            encode_immediate(&mut bytes, imm);
            return Ok((bytes, RexNeeds::default()));
        }
    }

    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    let mut rex = encoded_rm.rex;
    rex.w = needs_rex_w(width);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    if imm_is_8 {
        bytes.push(match imm {
            Immediate::Imm8(v) => v as u8,
            other => other.as_i64() as i8 as u8,
        });
    } else {
        let imm32 = Immediate::Imm32(imm.as_i64() as i32);
        encode_immediate(&mut bytes, if width == Some(16) { Immediate::Imm16(imm.as_i64() as i16) } else { imm32 });
    }
    Ok((bytes, rex))
}

fn encode_grp2(reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let rm_op = inst.op1.ok_or_else(missing_operand)?;
    let count_op = inst.op2.ok_or_else(missing_operand)?;
    let width = operand_width_of(&rm_op);
    let is_byte = width == Some(8);

    let (opcode, imm): (u8, Option<u8>) = match count_op {
        Operand::Immediate(Immediate::Imm8(1)) => (if is_byte { 0xD0 } else { 0xD1 }, None),
        Operand::Immediate(imm) => (if is_byte { 0xC0 } else { 0xC1 }, Some(imm.as_i64() as u8)),
        Operand::Register(r) if r.encoding() == Some(1) && r.width() == Some(8) => {
            (if is_byte { 0xD2 } else { 0xD3 }, None)
        }
        _ => return Err(Error::InvalidEncoding("invalid shift count operand".into())),
    };

    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    let mut rex = encoded_rm.rex;
    rex.w = needs_rex_w(width);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    if let Some(b) = imm {
        bytes.push(b);
    }
    Ok((bytes, rex))
}

fn encode_mov(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op1 = inst.op1.ok_or_else(missing_operand)?;
    let op2 = inst.op2.ok_or_else(missing_operand)?;

    if let (Operand::Register(dst), Operand::Immediate(imm)) = (op1, op2) {
        let enc = dst.encoding().ok_or_else(|| Error::InvalidEncoding("bad mov destination".into()))?;
        let width = dst.width();
        let mut rex = reg_rex(dst);
        rex.b = enc >= 8;
        return if width == Some(8) {
            let mut bytes = vec![0xB0 + (enc & 7)];
            encode_immediate(&mut bytes, imm);
            Ok((bytes, rex))
        } else if width == Some(64) {
            let mut bytes = vec![0xB8 + (enc & 7)];
            encode_immediate(&mut bytes, Immediate::Imm64(imm.as_i64()));
            rex.w = true;
            Ok((bytes, rex))
        } else {
            let mut bytes = vec![0xB8 + (enc & 7)];
            let imm = if width == Some(16) { Immediate::Imm16(imm.as_i64() as i16) } else { Immediate::Imm32(imm.as_i64() as i32) };
            encode_immediate(&mut bytes, imm);
            Ok((bytes, rex))
        };
    }

    if let Operand::Immediate(imm) = op2 {
        let width = operand_width_of(&op1);
        let is_byte = width == Some(8);
        let opcode = if is_byte { 0xC6 } else { 0xC7 };
        let encoded_rm = encode_rm_operand(&op1, 0)?;
        let mut rex = encoded_rm.rex;
        rex.w = needs_rex_w(width);
        let mut bytes = vec![opcode];
        bytes.extend(encoded_rm.bytes);
        let imm = if is_byte {
            Immediate::Imm8(imm.as_i64() as i8)
        } else if width == Some(16) {
            Immediate::Imm16(imm.as_i64() as i16)
        } else {
            Immediate::Imm32(imm.as_i64() as i32)
        };
        encode_immediate(&mut bytes, imm);
        return Ok((bytes, rex));
    }

    // reg<->rm forms: prefer op1=reg (0x8B/0x8A, "to_rm_first=false") when op1
    // is a register and op2 is memory; otherwise op1 is rm and op2 is reg.
    if op1.as_register().is_some() && op2.as_memory().is_some() {
        encode_rm_reg(0x89, 0x8B, inst, false)
    } else {
        encode_rm_reg(0x89, 0x8B, inst, true)
    }
}

fn encode_test(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op1 = inst.op1.ok_or_else(missing_operand)?;
    let op2 = inst.op2.ok_or_else(missing_operand)?;
    if let Operand::Immediate(imm) = op2 {
        let width = operand_width_of(&op1);
        let is_byte = width == Some(8);
        if let Operand::Register(r) = op1 {
            if r.encoding() == Some(0) {
                let opcode = if is_byte { 0xA8 } else { 0xA9 };
                let mut bytes = vec![opcode];
                encode_immediate(&mut bytes, imm);
                return Ok((bytes, RexNeeds { w: needs_rex_w(width), ..Default::default() }));
            }
        }
        let opcode = if is_byte { 0xF6 } else { 0xF7 };
        let encoded_rm = encode_rm_operand(&op1, 0)?;
        let mut rex = encoded_rm.rex;
        rex.w = needs_rex_w(width);
        let mut bytes = vec![opcode];
        bytes.extend(encoded_rm.bytes);
        let imm = if is_byte { Immediate::Imm8(imm.as_i64() as i8) } else if width == Some(16) { Immediate::Imm16(imm.as_i64() as i16) } else { Immediate::Imm32(imm.as_i64() as i32) };
        encode_immediate(&mut bytes, imm);
        Ok((bytes, rex))
    } else {
        encode_rm_reg(0x85, 0x85, inst, true)
    }
}

fn encode_push(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    match op {
        Operand::Register(r) => {
            let enc = r.encoding().ok_or_else(|| Error::InvalidEncoding("bad push operand".into()))?;
            Ok((vec![0x50 + (enc & 7)], RexNeeds { b: enc >= 8, ..Default::default() }))
        }
        Operand::Immediate(Immediate::Imm8(v)) => Ok((vec![0x6A, v as u8], RexNeeds::default())),
        Operand::Immediate(imm) => {
            let mut bytes = vec![0x68];
            encode_immediate(&mut bytes, Immediate::Imm32(imm.as_i64() as i32));
            Ok((bytes, RexNeeds::default()))
        }
        Operand::Memory(_) => {
            let encoded_rm = encode_rm_operand(&op, 6)?;
            let mut bytes = vec![0xFF];
            bytes.extend(encoded_rm.bytes);
            Ok((bytes, encoded_rm.rex))
        }
        Operand::Relative(_) => Err(Error::InvalidEncoding("push does not take a relative operand".into())),
    }
}

fn encode_pop(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    match op {
        Operand::Register(r) => {
            let enc = r.encoding().ok_or_else(|| Error::InvalidEncoding("bad pop operand".into()))?;
            Ok((vec![0x58 + (enc & 7)], RexNeeds { b: enc >= 8, ..Default::default() }))
        }
        _ => Err(Error::InvalidEncoding("pop only supports register operands in this subset".into())),
    }
}

fn encode_call_jmp(rel_opcode: u8, indirect_opcode: u8, reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    match op {
        Operand::Relative(RelativeOffset(rel)) => {
            let mut bytes = vec![rel_opcode];
            bytes.extend_from_slice(&rel.to_le_bytes());
            Ok((bytes, RexNeeds::default()))
        }
        _ => {
            let encoded_rm = encode_rm_operand(&op, reg_field)?;
            let mut bytes = vec![indirect_opcode];
            bytes.extend(encoded_rm.bytes);
            Ok((bytes, encoded_rm.rex))
        }
    }
}

fn encode_jmp(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    if let Some(Operand::Relative(RelativeOffset(rel))) = inst.op1 {
        if (-128..=127).contains(&rel) {
            return Ok((vec![0xEB, rel as i8 as u8], RexNeeds::default()));
        }
        let mut bytes = vec![0xE9];
        bytes.extend_from_slice(&rel.to_le_bytes());
        return Ok((bytes, RexNeeds::default()));
    }
    encode_call_jmp(0xE9, 0xFF, 4, inst)
}

fn encode_jcc(cc: ConditionCode, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let rel = match inst.op1 {
        Some(Operand::Relative(RelativeOffset(r))) => r,
        _ => return Err(Error::InvalidEncoding("Jcc requires a relative operand".into())),
    };
    if (-128..=127).contains(&rel) {
        Ok((vec![0x70 + cc.index(), rel as i8 as u8], RexNeeds::default()))
    } else {
        let mut bytes = vec![0x0F, 0x80 + cc.index()];
        bytes.extend_from_slice(&rel.to_le_bytes());
        Ok((bytes, RexNeeds::default()))
    }
}

fn encode_setcc(cc: ConditionCode, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    let encoded_rm = encode_rm_operand(&op, 0)?;
    let mut bytes = vec![0x0F, 0x90 + cc.index()];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, encoded_rm.rex))
}

fn encode_grp45(reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    let width = operand_width_of(&op);
    let opcode = if width == Some(8) { 0xFE } else { 0xFF };
    let encoded_rm = encode_rm_operand(&op, reg_field)?;
    let mut rex = encoded_rm.rex;
    rex.w = needs_rex_w(width);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

fn encode_grp3_unary(reg_field: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let op = inst.op1.ok_or_else(missing_operand)?;
    let width = operand_width_of(&op);
    let opcode = if width == Some(8) { 0xF6 } else { 0xF7 };
    let encoded_rm = encode_rm_operand(&op, reg_field)?;
    let mut rex = encoded_rm.rex;
    rex.w = needs_rex_w(width);
    let mut bytes = vec![opcode];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

fn encode_imul(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    match inst.operand_count() {
        1 => encode_grp3_unary(5, inst),
        2 => {
            let reg_op = inst.op1.ok_or_else(missing_operand)?;
            let rm_op = inst.op2.ok_or_else(missing_operand)?;
            let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("imul dst must be a register".into()))?;
            let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
            let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
            reg_rex_needs.w = needs_rex_w(reg.width());
            let rex = encoded_rm.rex.merge(reg_rex_needs);
            let mut bytes = vec![0x0F, 0xAF];
            bytes.extend(encoded_rm.bytes);
            Ok((bytes, rex))
        }
        3 => {
            let reg_op = inst.op1.ok_or_else(missing_operand)?;
            let rm_op = inst.op2.ok_or_else(missing_operand)?;
            let imm = inst.op3.and_then(|o| o.as_immediate()).ok_or_else(missing_operand)?;
            let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("imul dst must be a register".into()))?;
            let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
            let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
            reg_rex_needs.w = needs_rex_w(reg.width());
            let rex = encoded_rm.rex.merge(reg_rex_needs);
            let (opcode, use_imm8) = if imm.fits_i8() { (0x6B, true) } else { (0x69, false) };
            let mut bytes = vec![opcode];
            bytes.extend(encoded_rm.bytes);
            if use_imm8 {
                bytes.push(imm.as_i64() as i8 as u8);
            } else {
                encode_immediate(&mut bytes, Immediate::Imm32(imm.as_i64() as i32));
            }
            Ok((bytes, rex))
        }
        _ => Err(Error::InvalidEncoding("imul takes 1 to 3 operands".into())),
    }
}

fn encode_movx(opcode_b: u8, opcode_w: u8, inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let reg_op = inst.op1.ok_or_else(missing_operand)?;
    let rm_op = inst.op2.ok_or_else(missing_operand)?;
    let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("movzx/movsx dst must be a register".into()))?;
    let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
    let src_width = operand_width_of(&rm_op);
    let opcode = if src_width == Some(8) { opcode_b } else { opcode_w };
    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    reg_rex_needs.w = needs_rex_w(reg.width());
    let rex = encoded_rm.rex.merge(reg_rex_needs);
    let mut bytes = vec![0x0F, opcode];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

fn encode_movsxd(inst: &Instruction) -> Result<(Vec<u8>, RexNeeds)> {
    let reg_op = inst.op1.ok_or_else(missing_operand)?;
    let rm_op = inst.op2.ok_or_else(missing_operand)?;
    let reg = reg_op.as_register().ok_or_else(|| Error::InvalidEncoding("movsxd dst must be a register".into()))?;
    let (reg_field, mut reg_rex_needs) = reg_field_and_rex(reg)?;
    let encoded_rm = encode_rm_operand(&rm_op, reg_field)?;
    reg_rex_needs.w = needs_rex_w(reg.width());
    let rex = encoded_rm.rex.merge(reg_rex_needs);
    let mut bytes = vec![0x63];
    bytes.extend(encoded_rm.bytes);
    Ok((bytes, rex))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::decoder::decode;
    use crate::bytes::ByteReader;

    fn round_trip(bytes: &[u8]) {
        let mut reader = ByteReader::new(bytes);
        let (inst, consumed) = decode(&mut reader).unwrap();
        assert_eq!(consumed, bytes.len(), "decoder did not consume all bytes for {bytes:02x?}");
        let reencoded = encode(&inst).unwrap();
        assert_eq!(reencoded, bytes, "round-trip mismatch for {bytes:02x?}: got {reencoded:02x?}");
    }

    #[test]
    fn round_trips_cmp_word_ptr_design_example() {
        round_trip(&[0x66, 0x41, 0x81, 0xBC, 0x89, 0x78, 0x56, 0x34, 0x12, 0xEF, 0xBE]);
    }

    #[test]
    fn round_trips_ret() {
        round_trip(&[0xC3]);
    }

    #[test]
    fn round_trips_push_pop_extended() {
        round_trip(&[0x41, 0x57]); // push r15
        round_trip(&[0x41, 0x5F]); // pop r15
    }

    #[test]
    fn round_trips_mov_reg_imm64() {
        round_trip(&[0x48, 0xB8, 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn round_trips_lea_with_sib() {
        // lea rax, [rbx+rcx*2+0x10]
        round_trip(&[0x48, 0x8D, 0x44, 0x4B, 0x10]);
    }

    #[test]
    fn round_trips_jcc_rel8() {
        round_trip(&[0x74, 0x05]); // je +5
    }

    #[test]
    fn round_trips_call_rel32() {
        round_trip(&[0xE8, 0x00, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn round_trips_nop_and_leave() {
        round_trip(&[0x90]);
        round_trip(&[0xC9]);
        round_trip(&[0xCC]);
    }
}
