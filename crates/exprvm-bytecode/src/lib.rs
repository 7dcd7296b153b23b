//! # exprvm bytecode
//!
//! This crate defines the instruction set consumed by the exprvm engine.
//!
//! ## Design Principles
//!
//! - **Stack-based**: Instructions pop operands from and push results to one stack
//! - **Compact**: One opcode byte, at most one 2-byte little-endian operand
//! - **Traceable**: Every emitted byte maps to a source [`Location`]

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod error;
pub mod location;
pub mod opcode;
pub mod operand;

pub use builder::BytecodeBuilder;
pub use error::BytecodeError;
pub use location::{Location, Source};
pub use opcode::Opcode;
pub use operand::{ConstantIndex, OPERAND_WIDTH, read_operand, write_operand};

/// Cast selector: convert to a 64-bit integer
pub const CAST_INT64: u16 = 0;

/// Cast selector: convert to a 64-bit float
pub const CAST_FLOAT64: u16 = 1;
