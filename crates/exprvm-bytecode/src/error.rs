//! Bytecode errors

use thiserror::Error;

/// Errors that can occur while decoding or assembling bytecode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// Byte does not name an opcode
    #[error("unknown bytecode {0:#x}")]
    UnknownOpcode(u8),

    /// Operand runs past the end of the bytecode
    #[error("unexpected end of bytecode at offset {0}")]
    UnexpectedEnd(usize),

    /// Jump target lies outside the bytecode
    #[error("jump from offset {from} by {offset} leaves the program")]
    JumpOutOfRange {
        /// Offset the jump starts from
        from: usize,
        /// Jump distance
        offset: u16,
    },

    /// Jump distance or constant index does not fit an operand
    #[error("operand {0} does not fit in 16 bits")]
    OperandOverflow(usize),
}

/// Result type for bytecode operations
pub type Result<T> = std::result::Result<T, BytecodeError>;
