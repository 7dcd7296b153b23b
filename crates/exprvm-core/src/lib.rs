//! # exprvm core
//!
//! Execution engine for compiled expression programs: a stack-based bytecode
//! interpreter evaluating a [`Program`] against a caller-supplied environment
//! [`Value`].
//!
//! ## Design Principles
//!
//! - **Closed value domain**: [`Value`] is one enum; every operation matches
//!   on it and faults on shapes it does not support
//! - **Shareable programs**: a [`Program`] is immutable and `Send + Sync`;
//!   every evaluation gets its own [`Vm`] frame
//! - **Positioned faults**: [`run`] attributes faults to the source location
//!   of the failing instruction
//! - **Steppable**: a debug-mode frame is paced by a [`Debugger`]
//!
//! ```
//! use exprvm_core::{Opcode, ProgramBuilder, Value, run};
//!
//! let mut b = ProgramBuilder::new("1 + 2");
//! b.push(1i64).push(2i64).op(Opcode::Add);
//! let program = b.build().unwrap();
//! assert_eq!(run(&program, &Value::Nil).unwrap(), Value::Int(3));
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod debug;
pub mod error;
pub mod function;
pub mod operators;
pub mod program;
pub mod record;
pub mod runtime;
pub mod value;
pub mod vm;

pub use config::VmConfig;
pub use debug::Debugger;
pub use error::{RunError, VmError, VmResult};
pub use exprvm_bytecode::{CAST_FLOAT64, CAST_INT64, Location, Opcode, Source};
pub use function::Function;
pub use program::{Call, Constant, Program, ProgramBuilder};
pub use record::{MethodTable, Record, RecordBuilder};
pub use value::{Map, Value, ValueCell};
pub use vm::{Scope, Step, Vm};

use tracing::debug;

/// Evaluate `program` against `env`
///
/// Runs a fresh [`Vm`] to completion. A fault is attributed to the source
/// location of the instruction that raised it and formatted against the
/// program's source text.
pub fn run(program: &Program, env: &Value) -> Result<Value, RunError> {
    debug!(
        bytecode = program.bytecode().len(),
        constants = program.constants().len(),
        "running program"
    );
    let mut vm = Vm::new();
    vm.run(program, env).map_err(|err| {
        let location = program.location(vm.pp());
        debug!(pp = vm.pp(), %location, error = %err, "program faulted");
        RunError::new(location, err.to_string(), program.source())
    })
}
