//! Bytecode opcodes
//!
//! Stack-based instruction set. Every instruction is a single opcode byte,
//! optionally followed by one 2-byte little-endian operand.

use serde::{Deserialize, Serialize};

/// Bytecode opcodes
///
/// Stack effects are written with the stack top on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Opcode {
    // ==================== Literals & Stack ====================
    /// Push constant: `-- constants[idx]`
    Push = 0x00,
    /// Discard the top value: `a --`
    Pop = 0x01,
    /// Swap the two top values: `a b -- b a`
    Rot = 0x02,
    /// Push `true`
    True = 0x03,
    /// Push `false`
    False = 0x04,
    /// Push nil
    Nil = 0x05,

    // ==================== Access ====================
    /// Fetch from the environment: `-- env[constants[idx]]`
    Fetch = 0x10,
    /// Fetch from a string-keyed map environment without generic dispatch
    FetchMap = 0x11,
    /// Property access: `obj -- obj[constants[idx]]`
    Property = 0x12,
    /// Index access: `obj key -- obj[key]`
    Index = 0x13,
    /// Slice: `obj to from -- obj[from:to]`
    Slice = 0x14,

    // ==================== Unary ====================
    /// Arithmetic negation: `a -- -a`
    Negate = 0x20,
    /// Boolean not, operand must be a boolean: `a -- !a`
    Not = 0x21,

    // ==================== Comparison ====================
    /// Generic equality: `a b -- a == b`
    Equal = 0x30,
    /// Equality of two native integers (unchecked by the compiler)
    EqualInt = 0x31,
    /// Equality of two strings (unchecked by the compiler)
    EqualString = 0x32,
    /// Less than: `a b -- a < b`
    Less = 0x33,
    /// Greater than: `a b -- a > b`
    More = 0x34,
    /// Less than or equal: `a b -- a <= b`
    LessOrEqual = 0x35,
    /// Greater than or equal: `a b -- a >= b`
    MoreOrEqual = 0x36,

    // ==================== Arithmetic ====================
    /// Addition: `a b -- a + b`
    Add = 0x40,
    /// Subtraction: `a b -- a - b`
    Subtract = 0x41,
    /// Multiplication: `a b -- a * b`
    Multiply = 0x42,
    /// Division: `a b -- a / b`
    Divide = 0x43,
    /// Modulo: `a b -- a % b`
    Modulo = 0x44,
    /// Exponentiation: `a b -- a ** b`
    Exponent = 0x45,
    /// Inclusive integer range: `a b -- [a..=b]`
    Range = 0x46,

    // ==================== Control Flow ====================
    /// Unconditional forward jump: `ip += offset`
    Jump = 0x50,
    /// Forward jump if the top boolean is true (does not pop)
    JumpIfTrue = 0x51,
    /// Forward jump if the top boolean is false (does not pop)
    JumpIfFalse = 0x52,
    /// Unconditional backward jump: `ip -= offset`
    JumpBackward = 0x53,

    // ==================== Strings & Membership ====================
    /// Dynamic regex match: `text pattern -- bool`
    Matches = 0x60,
    /// Match against a precompiled pattern constant: `text -- bool`
    MatchesConst = 0x61,
    /// Substring test: `a b -- a contains b`
    Contains = 0x62,
    /// Prefix test: `a b -- a starts with b`
    StartsWith = 0x63,
    /// Suffix test: `a b -- a ends with b`
    EndsWith = 0x64,
    /// Membership test: `needle haystack -- bool`
    In = 0x65,

    // ==================== Construction ====================
    /// Build an array: `e1 .. en n -- [e1, .., en]`
    Array = 0x70,
    /// Build a map: `k1 v1 .. kn vn n -- {k1: v1, ..}`
    Map = 0x71,
    /// Length of the top value (does not pop): `a -- a len(a)`
    Len = 0x72,
    /// Numeric cast; operand 0 = int64, 1 = float64
    Cast = 0x73,

    // ==================== Calls ====================
    /// Call a function resolved on the environment
    Call = 0x80,
    /// Call a method resolved on a popped receiver
    Method = 0x81,

    // ==================== Scopes ====================
    /// Bind the popped value in the innermost scope
    Store = 0x90,
    /// Push a binding of the innermost scope
    Load = 0x91,
    /// Increment an integer binding of the innermost scope
    Inc = 0x92,
    /// Push a new scope
    Begin = 0x93,
    /// Pop the innermost scope
    End = 0x94,
}

impl Opcode {
    /// Every opcode, in byte order
    pub const ALL: [Opcode; 48] = [
        Self::Push,
        Self::Pop,
        Self::Rot,
        Self::True,
        Self::False,
        Self::Nil,
        Self::Fetch,
        Self::FetchMap,
        Self::Property,
        Self::Index,
        Self::Slice,
        Self::Negate,
        Self::Not,
        Self::Equal,
        Self::EqualInt,
        Self::EqualString,
        Self::Less,
        Self::More,
        Self::LessOrEqual,
        Self::MoreOrEqual,
        Self::Add,
        Self::Subtract,
        Self::Multiply,
        Self::Divide,
        Self::Modulo,
        Self::Exponent,
        Self::Range,
        Self::Jump,
        Self::JumpIfTrue,
        Self::JumpIfFalse,
        Self::JumpBackward,
        Self::Matches,
        Self::MatchesConst,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
        Self::Array,
        Self::Map,
        Self::Len,
        Self::Cast,
        Self::Call,
        Self::Method,
        Self::Store,
        Self::Load,
        Self::Inc,
        Self::Begin,
        Self::End,
    ];

    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Push),
            0x01 => Some(Self::Pop),
            0x02 => Some(Self::Rot),
            0x03 => Some(Self::True),
            0x04 => Some(Self::False),
            0x05 => Some(Self::Nil),

            0x10 => Some(Self::Fetch),
            0x11 => Some(Self::FetchMap),
            0x12 => Some(Self::Property),
            0x13 => Some(Self::Index),
            0x14 => Some(Self::Slice),

            0x20 => Some(Self::Negate),
            0x21 => Some(Self::Not),

            0x30 => Some(Self::Equal),
            0x31 => Some(Self::EqualInt),
            0x32 => Some(Self::EqualString),
            0x33 => Some(Self::Less),
            0x34 => Some(Self::More),
            0x35 => Some(Self::LessOrEqual),
            0x36 => Some(Self::MoreOrEqual),

            0x40 => Some(Self::Add),
            0x41 => Some(Self::Subtract),
            0x42 => Some(Self::Multiply),
            0x43 => Some(Self::Divide),
            0x44 => Some(Self::Modulo),
            0x45 => Some(Self::Exponent),
            0x46 => Some(Self::Range),

            0x50 => Some(Self::Jump),
            0x51 => Some(Self::JumpIfTrue),
            0x52 => Some(Self::JumpIfFalse),
            0x53 => Some(Self::JumpBackward),

            0x60 => Some(Self::Matches),
            0x61 => Some(Self::MatchesConst),
            0x62 => Some(Self::Contains),
            0x63 => Some(Self::StartsWith),
            0x64 => Some(Self::EndsWith),
            0x65 => Some(Self::In),

            0x70 => Some(Self::Array),
            0x71 => Some(Self::Map),
            0x72 => Some(Self::Len),
            0x73 => Some(Self::Cast),

            0x80 => Some(Self::Call),
            0x81 => Some(Self::Method),

            0x90 => Some(Self::Store),
            0x91 => Some(Self::Load),
            0x92 => Some(Self::Inc),
            0x93 => Some(Self::Begin),
            0x94 => Some(Self::End),

            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Whether a 2-byte operand follows this opcode
    pub const fn has_operand(self) -> bool {
        matches!(
            self,
            Self::Push
                | Self::Fetch
                | Self::FetchMap
                | Self::Property
                | Self::Jump
                | Self::JumpIfTrue
                | Self::JumpIfFalse
                | Self::JumpBackward
                | Self::MatchesConst
                | Self::Call
                | Self::Method
                | Self::Cast
                | Self::Store
                | Self::Load
                | Self::Inc
        )
    }

    /// Whether the operand is a constant pool index
    pub const fn operand_is_constant(self) -> bool {
        self.has_operand() && !self.is_jump() && !matches!(self, Self::Cast)
    }

    /// Whether this opcode moves the instruction pointer
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            Self::Jump | Self::JumpIfTrue | Self::JumpIfFalse | Self::JumpBackward
        )
    }

    /// Encoded size in bytes, including the operand
    #[inline]
    pub const fn size(self) -> usize {
        if self.has_operand() { 3 } else { 1 }
    }

    /// Get the name of this opcode
    pub const fn name(self) -> &'static str {
        match self {
            Self::Push => "Push",
            Self::Pop => "Pop",
            Self::Rot => "Rot",
            Self::True => "True",
            Self::False => "False",
            Self::Nil => "Nil",
            Self::Fetch => "Fetch",
            Self::FetchMap => "FetchMap",
            Self::Property => "Property",
            Self::Index => "Index",
            Self::Slice => "Slice",
            Self::Negate => "Negate",
            Self::Not => "Not",
            Self::Equal => "Equal",
            Self::EqualInt => "EqualInt",
            Self::EqualString => "EqualString",
            Self::Less => "Less",
            Self::More => "More",
            Self::LessOrEqual => "LessOrEqual",
            Self::MoreOrEqual => "MoreOrEqual",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Modulo => "Modulo",
            Self::Exponent => "Exponent",
            Self::Range => "Range",
            Self::Jump => "Jump",
            Self::JumpIfTrue => "JumpIfTrue",
            Self::JumpIfFalse => "JumpIfFalse",
            Self::JumpBackward => "JumpBackward",
            Self::Matches => "Matches",
            Self::MatchesConst => "MatchesConst",
            Self::Contains => "Contains",
            Self::StartsWith => "StartsWith",
            Self::EndsWith => "EndsWith",
            Self::In => "In",
            Self::Array => "Array",
            Self::Map => "Map",
            Self::Len => "Len",
            Self::Cast => "Cast",
            Self::Call => "Call",
            Self::Method => "Method",
            Self::Store => "Store",
            Self::Load => "Load",
            Self::Inc => "Inc",
            Self::Begin => "Begin",
            Self::End => "End",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Opcode {
    type Error = crate::BytecodeError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Self::from_byte(byte).ok_or(crate::BytecodeError::UnknownOpcode(byte))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in Opcode::ALL {
            let byte = op.to_byte();
            assert_eq!(Opcode::from_byte(byte), Some(op), "{op}");
        }
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert!(matches!(
            Opcode::try_from(0x06),
            Err(crate::BytecodeError::UnknownOpcode(0x06))
        ));
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::Push.name(), "Push");
        assert_eq!(Opcode::JumpIfFalse.name(), "JumpIfFalse");
        assert_eq!(Opcode::End.to_string(), "End");
    }

    #[test]
    fn test_operand_layout() {
        assert_eq!(Opcode::Push.size(), 3);
        assert_eq!(Opcode::Add.size(), 1);
        assert!(Opcode::Cast.has_operand());
        assert!(!Opcode::Cast.operand_is_constant());
        assert!(!Opcode::JumpBackward.operand_is_constant());
        assert!(Opcode::Call.operand_is_constant());
        assert!(!Opcode::Range.has_operand());
    }
}
