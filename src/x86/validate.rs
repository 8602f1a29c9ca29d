//! Post-decode sanity checks that are cheap to state as invariants but awkward
//! to enforce mid-decode: operand count, scale legality, missing pointer
//! sizes, and illegal register combinations.

use crate::error::{Error, Result};
use crate::x86::instruction::Instruction;
use crate::x86::operand::Operand;
use crate::x86::register::Register;

/// Runs every check against one instruction, returning the first violation.
pub fn validate(inst: &Instruction) -> Result<()> {
    check_arity(inst)?;
    for operand in inst.operands() {
        check_operand(&operand)?;
    }
    Ok(())
}

fn check_arity(inst: &Instruction) -> Result<()> {
    let arity = inst.mnemonic.arity();
    let count = inst.operand_count();
    if !arity.contains(&count) {
        let err = Error::InvalidInstruction(format!(
            "{} expects {}..={} operands, found {count}",
            inst.mnemonic,
            arity.start(),
            arity.end()
        ));
        log::warn!("{err}");
        return Err(err);
    }
    Ok(())
}

fn check_operand(operand: &Operand) -> Result<()> {
    let mem = match operand.as_memory() {
        Some(mem) => mem,
        None => return Ok(()),
    };

    if mem.index.is_some() && ![1, 2, 4, 8].contains(&mem.scale) {
        let err = Error::InvalidInstruction(format!(
            "scale must be 1, 2, 4, or 8 when an index register is present, got {}",
            mem.scale
        ));
        log::warn!("{err}");
        return Err(err);
    }

    if let Some(index) = mem.index {
        if matches!(index, Register::Gpr64(4)) {
            let err = Error::InvalidInstruction("RSP cannot be encoded as a SIB index register".into());
            log::warn!("{err}");
            return Err(err);
        }
    }

    if mem.base.is_none() && mem.index.is_none() && !mem.has_displacement {
        let err = Error::InvalidInstruction(
            "memory operand has neither a base, an index, nor a displacement".into(),
        );
        log::warn!("{err}");
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x86::instruction::Mnemonic;
    use crate::x86::operand::{IndirectOperand, Operand};

    #[test]
    fn rejects_wrong_arity() {
        let inst = Instruction::with_operands(Mnemonic::Ret, &[Operand::Register(Register::Gpr64(0))]);
        assert!(validate(&inst).is_err());
    }

    #[test]
    fn accepts_well_formed_instruction() {
        let inst = Instruction::with_operands(
            Mnemonic::Mov,
            &[
                Operand::Register(Register::Gpr64(0)),
                Operand::Register(Register::Gpr64(1)),
            ],
        );
        assert!(validate(&inst).is_ok());
    }

    #[test]
    fn rejects_illegal_scale() {
        let mem = IndirectOperand {
            base: Some(Register::Gpr64(0)),
            index: Some(Register::Gpr64(1)),
            scale: 3,
            displacement: 0,
            has_displacement: false,
            segment_override: None,
            pointer_size: None,
        };
        let inst = Instruction::with_operands(
            Mnemonic::Mov,
            &[Operand::Memory(mem), Operand::Register(Register::Gpr64(1))],
        );
        assert!(validate(&inst).is_err());
    }

    #[test]
    fn rejects_rsp_as_sib_index() {
        let mem = IndirectOperand {
            base: Some(Register::Gpr64(0)),
            index: Some(Register::Gpr64(4)),
            scale: 2,
            displacement: 0,
            has_displacement: false,
            segment_override: None,
            pointer_size: None,
        };
        let inst = Instruction::with_operands(
            Mnemonic::Mov,
            &[Operand::Memory(mem), Operand::Register(Register::Gpr64(1))],
        );
        assert!(validate(&inst).is_err());
    }
}
