//! Lookup tables for the opcode groups whose mnemonic is selected by the
//! ModR/M `reg` field rather than by the opcode byte alone (Grp1, Grp2, Grp3,
//! Grp5 in the Intel manual's terminology).

use crate::error::{Error, Result};
use crate::x86::instruction::Mnemonic;

/// Grp1: 80/81/83 /r — arithmetic/logic immediate forms.
pub fn grp1_mnemonic(reg: u8) -> Mnemonic {
    match reg & 0b111 {
        0 => Mnemonic::Add,
        1 => Mnemonic::Or,
        2 => Mnemonic::Adc,
        3 => Mnemonic::Sbb,
        4 => Mnemonic::And,
        5 => Mnemonic::Sub,
        6 => Mnemonic::Xor,
        7 => Mnemonic::Cmp,
        _ => unreachable!(),
    }
}

/// Grp2: C0/C1/D0-D3 /r — shift/rotate. Reg 6 (`SAL`) is encoding-distinct
/// from but semantically identical to `SHL`; this crate (like the GNU
/// disassembler it targets) renders both as `shl`.
pub fn grp2_mnemonic(reg: u8) -> Mnemonic {
    match reg & 0b111 {
        0 => Mnemonic::Rol,
        1 => Mnemonic::Ror,
        2 => Mnemonic::Rcl,
        3 => Mnemonic::Rcr,
        4 => Mnemonic::Shl,
        5 => Mnemonic::Shr,
        6 => Mnemonic::Shl,
        7 => Mnemonic::Sar,
        _ => unreachable!(),
    }
}

/// Grp3: F6/F7 /r. Reg 0 and 1 both mean `TEST` (with an immediate); this
/// function only covers reg values 2..=7, since TEST's extra immediate operand
/// needs special-casing by the decoder.
pub fn grp3_mnemonic(reg: u8) -> Result<Mnemonic> {
    Ok(match reg & 0b111 {
        0 | 1 => Mnemonic::Test,
        2 => Mnemonic::Not,
        3 => Mnemonic::Neg,
        4 => Mnemonic::Mul,
        5 => Mnemonic::Imul,
        6 => Mnemonic::Div,
        7 => Mnemonic::Idiv,
        _ => unreachable!(),
    })
}

/// Grp4/Grp5 selector outcomes for FE/FF /r. Call-far/jmp-far (reg 3 and 5)
/// and reserved reg 7 are not part of this crate's supported subset.
pub enum Grp5 {
    Inc,
    Dec,
    Call,
    Jmp,
    Push,
}

pub fn grp5(reg: u8) -> Result<Grp5> {
    Ok(match reg & 0b111 {
        0 => Grp5::Inc,
        1 => Grp5::Dec,
        2 => Grp5::Call,
        4 => Grp5::Jmp,
        6 => Grp5::Push,
        other => {
            return Err(Error::ReservedOpcode(format!(
                "Grp5 /{other} (far call/jmp or reserved) is not supported"
            )))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grp1_covers_all_eight_alu_ops() {
        let names: Vec<_> = (0..8).map(|r| grp1_mnemonic(r).as_str()).collect();
        assert_eq!(
            names,
            vec!["add", "or", "adc", "sbb", "and", "sub", "xor", "cmp"]
        );
    }

    #[test]
    fn grp5_rejects_far_forms() {
        assert!(grp5(3).is_err());
        assert!(grp5(5).is_err());
        assert!(grp5(7).is_err());
        assert!(grp5(0).is_ok());
    }
}
