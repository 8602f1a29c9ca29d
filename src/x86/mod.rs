//! x86-64 instruction model: decode, validate, encode, and Intel-syntax
//! printing/parsing, all built on the shared [`register`]/[`operand`]/
//! [`instruction`] types.

pub mod decoder;
pub mod encoder;
pub mod instruction;
pub mod modrm;
pub mod operand;
pub mod parser;
pub mod printer;
pub mod register;
pub mod tables;
pub mod validate;

pub use decoder::decode;
pub use encoder::encode;
pub use instruction::{ConditionCode, Instruction, Mnemonic, PrefixFlags, Prefixes};
pub use operand::{Immediate, IndirectOperand, IndirectOperandBuilder, Operand, PointerSize, RelativeOffset};
pub use parser::parse_instruction;
pub use printer::format_instruction;
pub use register::Register;
pub use validate::validate;
