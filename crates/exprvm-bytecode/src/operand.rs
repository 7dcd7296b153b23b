//! Bytecode operands
//!
//! Operands are 2 bytes, little-endian, and immediately follow their opcode.

use serde::{Deserialize, Serialize};

use crate::error::{BytecodeError, Result};

/// Width of an encoded operand in bytes
pub const OPERAND_WIDTH: usize = 2;

/// Index into the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ConstantIndex(pub u16);

impl ConstantIndex {
    /// Create a new constant index
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    /// Get index value
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<usize> for ConstantIndex {
    type Error = BytecodeError;

    fn try_from(index: usize) -> Result<Self> {
        u16::try_from(index)
            .map(Self)
            .map_err(|_| BytecodeError::OperandOverflow(index))
    }
}

/// Decode the operand starting at `at`
#[inline]
pub fn read_operand(bytecode: &[u8], at: usize) -> Result<u16> {
    match bytecode.get(at..at + OPERAND_WIDTH) {
        Some(&[lo, hi]) => Ok(u16::from_le_bytes([lo, hi])),
        _ => Err(BytecodeError::UnexpectedEnd(at)),
    }
}

/// Encode an operand onto the end of `bytecode`
#[inline]
pub fn write_operand(bytecode: &mut Vec<u8>, value: u16) {
    bytecode.extend_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operand_is_little_endian() {
        let mut bytes = Vec::new();
        write_operand(&mut bytes, 0x1234);
        assert_eq!(bytes, vec![0x34, 0x12]);
        assert_eq!(read_operand(&bytes, 0).unwrap(), 0x1234);
    }

    #[test]
    fn test_truncated_operand() {
        let bytes = [0x00, 0x01];
        assert_eq!(read_operand(&bytes, 1), Err(BytecodeError::UnexpectedEnd(1)));
        assert_eq!(read_operand(&bytes, 5), Err(BytecodeError::UnexpectedEnd(5)));
    }

    #[test]
    fn test_constant_index_overflow() {
        assert_eq!(ConstantIndex::try_from(7).unwrap().index(), 7);
        assert_eq!(
            ConstantIndex::try_from(70_000),
            Err(BytecodeError::OperandOverflow(70_000))
        );
    }
}
