//! Compiled programs
//!
//! A [`Program`] is the immutable artifact a compiler hands to the VM:
//! bytecode, constant pool, one source location per bytecode byte, and the
//! source text for diagnostics. [`ProgramBuilder`] assembles programs for
//! embedders, tests and benchmarks.

use std::fmt::Write as _;

use exprvm_bytecode::{
    BytecodeBuilder, BytecodeError, CAST_FLOAT64, CAST_INT64, ConstantIndex, Location, Opcode,
    Source, read_operand,
};
use regex::Regex;

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// A call site descriptor: callable name and argument count
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Call {
    /// Function or method name
    pub name: String,
    /// Number of arguments on the stack
    pub arity: usize,
}

impl Call {
    /// Create a call descriptor
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        Self {
            name: name.into(),
            arity,
        }
    }
}

/// A constant pool entry
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// A literal value, including names and compiled patterns
    Value(Value),
    /// A call descriptor
    Call(Call),
}

impl Constant {
    /// Whether two constants may share a pool slot
    fn shares_slot(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Value(Value::String(a)), Self::Value(Value::String(b))) => a == b,
            (Self::Call(a), Self::Call(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for Constant {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Call> for Constant {
    fn from(call: Call) -> Self {
        Self::Call(call)
    }
}

/// An immutable compiled program
#[derive(Debug, Clone)]
pub struct Program {
    bytecode: Vec<u8>,
    constants: Vec<Constant>,
    locations: Vec<Location>,
    source: Source,
}

impl Program {
    /// Assemble a program from compiler output
    pub fn new(
        bytecode: Vec<u8>,
        constants: Vec<Constant>,
        locations: Vec<Location>,
        source: Source,
    ) -> Self {
        Self {
            bytecode,
            constants,
            locations,
            source,
        }
    }

    /// Instruction stream
    #[inline]
    pub fn bytecode(&self) -> &[u8] {
        &self.bytecode
    }

    /// Constant pool
    #[inline]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Location table, indexed by byte offset
    #[inline]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Source text
    #[inline]
    pub fn source(&self) -> &Source {
        &self.source
    }

    /// Source location of the instruction at `pp`
    ///
    /// Empty when the table does not cover `pp`.
    pub fn location(&self, pp: usize) -> Location {
        self.locations.get(pp).copied().unwrap_or_default()
    }

    /// Constant at `index`
    pub fn constant(&self, index: ConstantIndex) -> VmResult<&Constant> {
        self.constants.get(index.index()).ok_or_else(|| {
            VmError::internal(format!(
                "constant {} out of range ({} constants)",
                index.index(),
                self.constants.len()
            ))
        })
    }

    /// Value constant at `index`
    pub fn value(&self, index: ConstantIndex) -> VmResult<&Value> {
        match self.constant(index)? {
            Constant::Value(value) => Ok(value),
            Constant::Call(call) => Err(VmError::TypeAssertion {
                expected: "value",
                found: format!("call {}", call.name),
            }),
        }
    }

    /// String constant at `index`
    pub fn name(&self, index: ConstantIndex) -> VmResult<&str> {
        match self.value(index)? {
            Value::String(s) => Ok(&**s),
            other => Err(VmError::assertion("string", other)),
        }
    }

    /// Call descriptor at `index`
    pub fn call(&self, index: ConstantIndex) -> VmResult<&Call> {
        match self.constant(index)? {
            Constant::Call(call) => Ok(call),
            Constant::Value(value) => Err(VmError::assertion("Call", value)),
        }
    }

    /// Compiled pattern at `index`
    pub fn pattern(&self, index: ConstantIndex) -> VmResult<&Regex> {
        match self.value(index)? {
            Value::Regex(re) => Ok(re),
            other => Err(VmError::assertion("regexp", other)),
        }
    }

    /// Render the instruction stream, one instruction per line
    ///
    /// ```text
    /// 0000  Push           0     1
    /// 0003  JumpIfFalse    4     (0010)
    /// ```
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        let mut ip = 0;
        while ip < self.bytecode.len() {
            let pp = ip;
            let byte = self.bytecode[ip];
            ip += 1;

            let Some(op) = Opcode::from_byte(byte) else {
                let _ = writeln!(out, "{pp:04}  <unknown {byte:#04x}>");
                continue;
            };
            if !op.has_operand() {
                let _ = writeln!(out, "{pp:04}  {}", op.name());
                continue;
            }

            let operand = match read_operand(&self.bytecode, ip) {
                Ok(operand) => operand,
                Err(_) => {
                    let _ = writeln!(out, "{pp:04}  {:<14} <truncated>", op.name());
                    break;
                }
            };
            ip += exprvm_bytecode::OPERAND_WIDTH;

            let detail = match op {
                Opcode::JumpBackward => match ip.checked_sub(usize::from(operand)) {
                    Some(target) => format!("({target:04})"),
                    None => "(out of range)".to_string(),
                },
                Opcode::Jump | Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                    format!("({:04})", ip + usize::from(operand))
                }
                Opcode::Cast => match operand {
                    CAST_INT64 => "int64".to_string(),
                    CAST_FLOAT64 => "float64".to_string(),
                    _ => "?".to_string(),
                },
                _ => match self.constants.get(usize::from(operand)) {
                    Some(Constant::Value(Value::String(s))) => format!("{s:?}"),
                    Some(Constant::Value(value)) => value.to_string(),
                    Some(Constant::Call(call)) => format!("{}/{}", call.name, call.arity),
                    None => "<missing>".to_string(),
                },
            };
            let _ = writeln!(out, "{pp:04}  {:<14} {operand:<5} {detail}", op.name());
        }
        out
    }
}

/// Assembler for [`Program`]s
///
/// Emission methods chain; a constant pool overflow or an unpatchable jump
/// is remembered and reported by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ProgramBuilder {
    code: BytecodeBuilder,
    constants: Vec<Constant>,
    source: Source,
    location: Location,
    error: Option<BytecodeError>,
}

impl ProgramBuilder {
    /// Create a builder for a program compiled from `source`
    pub fn new(source: impl Into<Source>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Attribute subsequently emitted instructions to `line:column`
    pub fn at(&mut self, line: usize, column: usize) -> &mut Self {
        self.location = Location::new(line, column);
        self
    }

    /// Offset of the next emitted instruction
    #[inline]
    pub fn offset(&self) -> usize {
        self.code.len()
    }

    /// Add a constant, reusing the slot of an equal string or call
    pub fn constant(&mut self, constant: impl Into<Constant>) -> Result<u16, BytecodeError> {
        let constant = constant.into();
        if let Some(index) = self.constants.iter().position(|c| c.shares_slot(&constant)) {
            return ConstantIndex::try_from(index).map(|i| i.0);
        }
        let index = ConstantIndex::try_from(self.constants.len())?;
        self.constants.push(constant);
        Ok(index.0)
    }

    fn fail(&mut self, error: BytecodeError) {
        self.error.get_or_insert(error);
    }

    /// Emit an instruction without operand
    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.emit(op, self.location);
        self
    }

    /// Emit an instruction with a raw operand
    pub fn op_with(&mut self, op: Opcode, operand: u16) -> &mut Self {
        self.code.emit_with(op, operand, self.location);
        self
    }

    fn op_const(&mut self, op: Opcode, constant: Constant) -> &mut Self {
        match self.constant(constant) {
            Ok(index) => self.op_with(op, index),
            Err(err) => {
                self.fail(err);
                self
            }
        }
    }

    /// Push a constant value
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        self.op_const(Opcode::Push, Constant::Value(value.into()))
    }

    /// Read `name` from the environment
    pub fn fetch(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::Fetch, Constant::Value(Value::from(name)))
    }

    /// Read `name` from a map environment
    pub fn fetch_map(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::FetchMap, Constant::Value(Value::from(name)))
    }

    /// Read `name` from the popped container
    pub fn property(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::Property, Constant::Value(Value::from(name)))
    }

    /// Call the environment function `name` with `arity` stacked arguments
    pub fn call(&mut self, name: &str, arity: usize) -> &mut Self {
        self.op_const(Opcode::Call, Constant::Call(Call::new(name, arity)))
    }

    /// Call method `name` on the receiver beneath `arity` stacked arguments
    pub fn method(&mut self, name: &str, arity: usize) -> &mut Self {
        self.op_const(Opcode::Method, Constant::Call(Call::new(name, arity)))
    }

    /// Match the top of the stack against a pre-compiled pattern
    pub fn matches_const(&mut self, pattern: Regex) -> &mut Self {
        self.op_const(Opcode::MatchesConst, Constant::Value(Value::Regex(pattern)))
    }

    /// Bind the popped value to `name` in the innermost scope
    pub fn store(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::Store, Constant::Value(Value::from(name)))
    }

    /// Push the innermost binding of `name`
    pub fn load(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::Load, Constant::Value(Value::from(name)))
    }

    /// Increment the integer bound to `name`
    pub fn inc(&mut self, name: &str) -> &mut Self {
        self.op_const(Opcode::Inc, Constant::Value(Value::from(name)))
    }

    /// Convert the top of the stack; see [`CAST_INT64`] and [`CAST_FLOAT64`]
    pub fn cast(&mut self, selector: u16) -> &mut Self {
        self.op_with(Opcode::Cast, selector)
    }

    /// Emit a forward jump, returns a label for [`patch`](Self::patch)
    pub fn jump(&mut self, op: Opcode) -> usize {
        self.code.emit_jump(op, self.location)
    }

    /// Point the jump at `label` to the current offset
    pub fn patch(&mut self, label: usize) -> &mut Self {
        if let Err(err) = self.code.patch_jump(label) {
            self.fail(err);
        }
        self
    }

    /// Jump backward to `target`
    pub fn loop_to(&mut self, target: usize) -> &mut Self {
        if let Err(err) = self.code.emit_loop(target, self.location) {
            self.fail(err);
        }
        self
    }

    /// Append a raw byte
    pub fn raw(&mut self, byte: u8) -> &mut Self {
        self.code.raw(byte, self.location);
        self
    }

    /// Finish the program
    pub fn build(self) -> Result<Program, BytecodeError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        let (bytecode, locations) = self.code.finish();
        Ok(Program::new(bytecode, self.constants, locations, self.source))
    }
}
