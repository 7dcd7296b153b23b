//! VM error types

use exprvm_bytecode::{BytecodeError, Location, Source};
use thiserror::Error;

/// Faults raised while executing bytecode
///
/// These abort the dispatch loop immediately. The low-level [`Vm`](crate::Vm)
/// API hands them to the caller unchanged; [`run`](crate::run) converts them
/// into a positioned [`RunError`].
#[derive(Debug, Error)]
pub enum VmError {
    /// Value shape does not support the attempted operation
    #[error("{0}")]
    TypeError(String),

    /// Index or bound outside the container
    #[error("{0}")]
    RangeError(String),

    /// A specialized instruction received a value of the wrong variant
    #[error("interface conversion: interface {{}} is {found}, not {expected}")]
    TypeAssertion {
        /// Variant the instruction requires
        expected: &'static str,
        /// Type name of the value actually found
        found: String,
    },

    /// Named function or method does not exist on the receiver
    #[error("cannot get \"{name}\" from {receiver}")]
    Unresolved {
        /// Callable name
        name: String,
        /// Type name of the receiver
        receiver: String,
    },

    /// Dynamic pattern failed to compile
    #[error(transparent)]
    Pattern(#[from] regex::Error),

    /// Malformed bytecode
    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    /// Pop or peek on an empty operand stack
    #[error("operand stack underflow")]
    StackUnderflow,

    /// Scope instruction with no scope open
    #[error("no scope is open")]
    NoScope,

    /// Error reported by a host function
    #[error("{0}")]
    Host(String),

    /// Internal error
    #[error("InternalError: {0}")]
    Internal(String),
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create a type assertion error
    pub fn assertion(expected: &'static str, found: &crate::Value) -> Self {
        Self::TypeAssertion {
            expected,
            found: found.type_name(),
        }
    }

    /// Create an error for a host function to return
    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

/// A fault attributed to a source position
///
/// Displays as the message, the position, the offending source line and a
/// marker under the column:
///
/// ```text
/// cannot get "foo" from User (1:5)
///  | user.foo()
///  | ....^
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{formatted}")]
pub struct RunError {
    location: Location,
    message: String,
    formatted: String,
}

impl RunError {
    /// Attribute `message` to `location` and format it against `source`
    pub fn new(location: Location, message: impl Into<String>, source: &Source) -> Self {
        let message = message.into();
        let formatted = format_message(&message, location, source);
        Self {
            location,
            message,
            formatted,
        }
    }

    /// Position the fault was attributed to
    pub fn location(&self) -> Location {
        self.location
    }

    /// Message without position or snippet
    pub fn message(&self) -> &str {
        &self.message
    }
}

fn format_message(message: &str, location: Location, source: &Source) -> String {
    if location.is_empty() {
        return message.to_string();
    }
    let mut out = format!("{message} ({location})");
    if let Some(snippet) = source.snippet(location.line) {
        out.push_str("\n | ");
        out.push_str(snippet);
        out.push_str("\n | ");
        out.push_str(&".".repeat(location.column));
        out.push('^');
    }
    out
}
