//! Bytecode data model: the closed opcode set and the code-object container
//! the dominator engine and dispatcher both consume.

pub mod code_object;
pub mod opcode;

pub use code_object::{
    CodeObject, CodeObjectId, CodeObjectTable, ConstantValue, ExceptionHandler, Instruction,
    JumpTables, Operand,
};
pub use opcode::{Opcode, OpcodeClass};
