//! The `Instruction` model: a mnemonic, up to four operands, and the prefix set
//! that modifies them.

use crate::x86::operand::Operand;
use crate::x86::register::Register;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Legacy prefix bytes that apply to the whole instruction rather than to
    /// any one operand. Segment override carries its own register below rather
    /// than living in this bitset, since it is one-of-six rather than boolean.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrefixFlags: u8 {
        const LOCK                  = 0b0000_0001;
        const REPNE                 = 0b0000_0010;
        const REPE                  = 0b0000_0100;
        const OPERAND_SIZE_OVERRIDE = 0b0000_1000;
        const ADDRESS_SIZE_OVERRIDE = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prefixes {
    pub flags: PrefixFlags,
    pub segment: Option<Register>,
}

impl Prefixes {
    pub fn lock(&self) -> bool {
        self.flags.contains(PrefixFlags::LOCK)
    }
    pub fn repne(&self) -> bool {
        self.flags.contains(PrefixFlags::REPNE)
    }
    pub fn repe(&self) -> bool {
        self.flags.contains(PrefixFlags::REPE)
    }
    pub fn operand_size_override(&self) -> bool {
        self.flags.contains(PrefixFlags::OPERAND_SIZE_OVERRIDE)
    }
    pub fn address_size_override(&self) -> bool {
        self.flags.contains(PrefixFlags::ADDRESS_SIZE_OVERRIDE)
    }
}

/// The decoded mnemonic. Only the subset of the x86-64 ISA this crate's tables
/// (see [`crate::x86::tables`]) actually recognize is represented; anything
/// else surfaces as `Error::UnknownOpcode` well before an `Opcode` value would
/// need to exist for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Push,
    Pop,
    Mov,
    Lea,
    Test,
    Xchg,
    Nop,
    Call,
    Jmp,
    Ret,
    Leave,
    Int3,
    Cdqe,
    Cwde,
    Cdq,
    Cqo,
    Inc,
    Dec,
    Not,
    Neg,
    Mul,
    Imul,
    Div,
    Idiv,
    Shl,
    Shr,
    Sar,
    Rol,
    Ror,
    Rcl,
    Rcr,
    Jcc(ConditionCode),
    Setcc(ConditionCode),
    Movzx,
    Movsx,
    Movsxd,
}

/// The 16 condition-code suffixes shared by `Jcc`/`SETcc`/`CMOVcc`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionCode {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

impl ConditionCode {
    pub const ALL: [ConditionCode; 16] = [
        ConditionCode::O,
        ConditionCode::No,
        ConditionCode::B,
        ConditionCode::Ae,
        ConditionCode::E,
        ConditionCode::Ne,
        ConditionCode::Be,
        ConditionCode::A,
        ConditionCode::S,
        ConditionCode::Ns,
        ConditionCode::P,
        ConditionCode::Np,
        ConditionCode::L,
        ConditionCode::Ge,
        ConditionCode::Le,
        ConditionCode::G,
    ];

    pub fn from_index(i: u8) -> Option<ConditionCode> {
        Self::ALL.get(i as usize & 0xF).copied()
    }

    pub fn index(&self) -> u8 {
        Self::ALL.iter().position(|c| c == self).unwrap() as u8
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ConditionCode::O => "o",
            ConditionCode::No => "no",
            ConditionCode::B => "b",
            ConditionCode::Ae => "ae",
            ConditionCode::E => "e",
            ConditionCode::Ne => "ne",
            ConditionCode::Be => "be",
            ConditionCode::A => "a",
            ConditionCode::S => "s",
            ConditionCode::Ns => "ns",
            ConditionCode::P => "p",
            ConditionCode::Np => "np",
            ConditionCode::L => "l",
            ConditionCode::Ge => "ge",
            ConditionCode::Le => "le",
            ConditionCode::G => "g",
        }
    }
}

impl Mnemonic {
    pub fn as_str(&self) -> String {
        match self {
            Mnemonic::Jcc(cc) => format!("j{}", cc.suffix()),
            Mnemonic::Setcc(cc) => format!("set{}", cc.suffix()),
            other => other.base_str().to_string(),
        }
    }

    fn base_str(&self) -> &'static str {
        match self {
            Mnemonic::Add => "add",
            Mnemonic::Or => "or",
            Mnemonic::Adc => "adc",
            Mnemonic::Sbb => "sbb",
            Mnemonic::And => "and",
            Mnemonic::Sub => "sub",
            Mnemonic::Xor => "xor",
            Mnemonic::Cmp => "cmp",
            Mnemonic::Push => "push",
            Mnemonic::Pop => "pop",
            Mnemonic::Mov => "mov",
            Mnemonic::Lea => "lea",
            Mnemonic::Test => "test",
            Mnemonic::Xchg => "xchg",
            Mnemonic::Nop => "nop",
            Mnemonic::Call => "call",
            Mnemonic::Jmp => "jmp",
            Mnemonic::Ret => "ret",
            Mnemonic::Leave => "leave",
            Mnemonic::Int3 => "int3",
            Mnemonic::Cdqe => "cdqe",
            Mnemonic::Cwde => "cwde",
            Mnemonic::Cdq => "cdq",
            Mnemonic::Cqo => "cqo",
            Mnemonic::Inc => "inc",
            Mnemonic::Dec => "dec",
            Mnemonic::Not => "not",
            Mnemonic::Neg => "neg",
            Mnemonic::Mul => "mul",
            Mnemonic::Imul => "imul",
            Mnemonic::Div => "div",
            Mnemonic::Idiv => "idiv",
            Mnemonic::Shl => "shl",
            Mnemonic::Shr => "shr",
            Mnemonic::Sar => "sar",
            Mnemonic::Rol => "rol",
            Mnemonic::Ror => "ror",
            Mnemonic::Rcl => "rcl",
            Mnemonic::Rcr => "rcr",
            Mnemonic::Movzx => "movzx",
            Mnemonic::Movsx => "movsx",
            Mnemonic::Movsxd => "movsxd",
            Mnemonic::Jcc(_) | Mnemonic::Setcc(_) => unreachable!("formatted in as_str"),
        }
    }

    /// Number of operand slots this mnemonic's canonical encodings fill. Used
    /// by the validator to reject instructions with a mismatched arity.
    pub fn arity(&self) -> std::ops::RangeInclusive<u8> {
        match self {
            Mnemonic::Nop | Mnemonic::Ret | Mnemonic::Leave | Mnemonic::Int3 | Mnemonic::Cdqe
            | Mnemonic::Cwde | Mnemonic::Cdq | Mnemonic::Cqo => 0..=0,
            Mnemonic::Push | Mnemonic::Pop | Mnemonic::Inc | Mnemonic::Dec | Mnemonic::Not
            | Mnemonic::Neg | Mnemonic::Mul | Mnemonic::Call | Mnemonic::Jmp
            | Mnemonic::Jcc(_) | Mnemonic::Setcc(_) | Mnemonic::Idiv => 1..=1,
            Mnemonic::Imul => 1..=3,
            Mnemonic::Div => 1..=1,
            Mnemonic::Add
            | Mnemonic::Or
            | Mnemonic::Adc
            | Mnemonic::Sbb
            | Mnemonic::And
            | Mnemonic::Sub
            | Mnemonic::Xor
            | Mnemonic::Cmp
            | Mnemonic::Mov
            | Mnemonic::Lea
            | Mnemonic::Test
            | Mnemonic::Xchg
            | Mnemonic::Shl
            | Mnemonic::Shr
            | Mnemonic::Sar
            | Mnemonic::Rol
            | Mnemonic::Ror
            | Mnemonic::Rcl
            | Mnemonic::Rcr
            | Mnemonic::Movzx
            | Mnemonic::Movsx
            | Mnemonic::Movsxd => 2..=2,
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully decoded (or to-be-encoded) instruction: prefixes, mnemonic, and up
/// to four operand slots. Arity is validated separately (see
/// [`crate::x86::validate`]) rather than baked into the type, since the same
/// struct is the encoder's input as well as the decoder's output and both need
/// to be able to represent a not-yet-validated in-progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub prefixes: Prefixes,
    pub mnemonic: Mnemonic,
    pub op1: Option<Operand>,
    pub op2: Option<Operand>,
    pub op3: Option<Operand>,
    pub op4: Option<Operand>,
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic) -> Self {
        Instruction {
            prefixes: Prefixes::default(),
            mnemonic,
            op1: None,
            op2: None,
            op3: None,
            op4: None,
        }
    }

    pub fn with_operands(mnemonic: Mnemonic, ops: &[Operand]) -> Self {
        let mut inst = Instruction::new(mnemonic);
        let slots = [
            &mut inst.op1,
            &mut inst.op2,
            &mut inst.op3,
            &mut inst.op4,
        ];
        for (slot, op) in slots.into_iter().zip(ops.iter()) {
            *slot = Some(*op);
        }
        inst
    }

    pub fn operand_count(&self) -> u8 {
        [self.op1, self.op2, self.op3, self.op4]
            .iter()
            .filter(|o| o.is_some())
            .count() as u8
    }

    pub fn operands(&self) -> impl Iterator<Item = Operand> + '_ {
        [self.op1, self.op2, self.op3, self.op4]
            .into_iter()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jcc_mnemonic_renders_suffix() {
        assert_eq!(Mnemonic::Jcc(ConditionCode::Ne).as_str(), "jne");
        assert_eq!(Mnemonic::Setcc(ConditionCode::A).as_str(), "seta");
    }

    #[test]
    fn condition_code_round_trips_through_index() {
        for i in 0..16u8 {
            let cc = ConditionCode::from_index(i).unwrap();
            assert_eq!(cc.index(), i);
        }
    }

    #[test]
    fn operand_count_counts_set_slots() {
        let inst = Instruction::with_operands(
            Mnemonic::Mov,
            &[
                Operand::Register(Register::Gpr64(0)),
                Operand::Register(Register::Gpr64(1)),
            ],
        );
        assert_eq!(inst.operand_count(), 2);
    }
}
