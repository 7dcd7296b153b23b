//! Bytecode assembler
//!
//! Emits opcodes and operands together with the source location of every
//! emitted byte, and resolves jump distances.

use crate::error::{BytecodeError, Result};
use crate::location::Location;
use crate::opcode::Opcode;
use crate::operand::{OPERAND_WIDTH, write_operand};

/// Builder for a bytecode stream and its location table
#[derive(Debug, Clone, Default)]
pub struct BytecodeBuilder {
    bytecode: Vec<u8>,
    locations: Vec<Location>,
}

impl BytecodeBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Current length in bytes; the offset of the next emitted byte
    #[inline]
    pub fn len(&self) -> usize {
        self.bytecode.len()
    }

    /// Whether nothing was emitted yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytecode.is_empty()
    }

    /// Emit an opcode without operand, returns its offset
    pub fn emit(&mut self, op: Opcode, location: Location) -> usize {
        let at = self.len();
        self.bytecode.push(op.to_byte());
        self.locations.push(location);
        at
    }

    /// Emit an opcode followed by its operand, returns the opcode offset
    pub fn emit_with(&mut self, op: Opcode, operand: u16, location: Location) -> usize {
        let at = self.emit(op, location);
        write_operand(&mut self.bytecode, operand);
        self.locations
            .extend(std::iter::repeat_n(location, OPERAND_WIDTH));
        at
    }

    /// Emit a forward jump with a placeholder distance.
    ///
    /// Returns the operand offset to pass to [`patch_jump`](Self::patch_jump).
    pub fn emit_jump(&mut self, op: Opcode, location: Location) -> usize {
        self.emit_with(op, 0, location) + 1
    }

    /// Point a forward jump at the current end of the bytecode
    pub fn patch_jump(&mut self, operand_at: usize) -> Result<()> {
        let from = operand_at + OPERAND_WIDTH;
        let distance = self
            .len()
            .checked_sub(from)
            .ok_or(BytecodeError::UnexpectedEnd(operand_at))?;
        let offset = u16::try_from(distance).map_err(|_| BytecodeError::OperandOverflow(distance))?;
        let slot = self
            .bytecode
            .get_mut(operand_at..from)
            .ok_or(BytecodeError::UnexpectedEnd(operand_at))?;
        slot.copy_from_slice(&offset.to_le_bytes());
        Ok(())
    }

    /// Emit a backward jump to `target`
    pub fn emit_loop(&mut self, target: usize, location: Location) -> Result<usize> {
        let after = self.len() + Opcode::JumpBackward.size();
        let distance = after
            .checked_sub(target)
            .ok_or(BytecodeError::UnexpectedEnd(target))?;
        let offset = u16::try_from(distance).map_err(|_| BytecodeError::OperandOverflow(distance))?;
        Ok(self.emit_with(Opcode::JumpBackward, offset, location))
    }

    /// Append a raw byte, for hand-written or deliberately malformed streams
    pub fn raw(&mut self, byte: u8, location: Location) {
        self.bytecode.push(byte);
        self.locations.push(location);
    }

    /// Finish, returning the bytecode and its location table
    pub fn finish(self) -> (Vec<u8>, Vec<Location>) {
        (self.bytecode, self.locations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::read_operand;

    #[test]
    fn test_locations_cover_every_byte() {
        let mut builder = BytecodeBuilder::new();
        builder.emit_with(Opcode::Push, 0, Location::new(1, 0));
        builder.emit(Opcode::Negate, Location::new(1, 4));
        let (bytecode, locations) = builder.finish();
        assert_eq!(bytecode.len(), 4);
        assert_eq!(locations.len(), 4);
        assert_eq!(locations[3], Location::new(1, 4));
    }

    #[test]
    fn test_patch_forward_jump() {
        let mut builder = BytecodeBuilder::new();
        let jump = builder.emit_jump(Opcode::JumpIfFalse, Location::default());
        builder.emit(Opcode::Pop, Location::default());
        builder.emit(Opcode::True, Location::default());
        builder.patch_jump(jump).unwrap();
        let (bytecode, _) = builder.finish();
        // ip after the operand is 3; the target is the end (5)
        assert_eq!(read_operand(&bytecode, jump).unwrap(), 2);
    }

    #[test]
    fn test_backward_jump_lands_on_target() {
        let mut builder = BytecodeBuilder::new();
        builder.emit(Opcode::Nil, Location::default());
        let start = builder.len();
        builder.emit(Opcode::Pop, Location::default());
        let at = builder.emit_loop(start, Location::default()).unwrap();
        let (bytecode, _) = builder.finish();
        let offset = read_operand(&bytecode, at + 1).unwrap() as usize;
        assert_eq!(at + 3 - offset, start);
    }
}
