//! Execution frame and dispatch loop
//!
//! A [`Vm`] holds the mutable state of one evaluation: operand stack, scope
//! stack, instruction and program pointers, and the frame side of the debug
//! step protocol. Each cycle records the program pointer, decodes one opcode
//! and executes it. Faults abort the loop and are returned unchanged.

use std::sync::Arc;

use exprvm_bytecode::{
    BytecodeError, CAST_FLOAT64, CAST_INT64, ConstantIndex, OPERAND_WIDTH, Opcode, read_operand,
};
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::config::VmConfig;
use crate::debug::{self as step, Debugger, StepChannels};
use crate::error::{VmError, VmResult};
use crate::operators;
use crate::program::Program;
use crate::runtime;
use crate::value::Value;

/// Variable bindings of one block
pub type Scope = FxHashMap<String, Value>;

/// Outcome of [`Vm::step`]
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// More instructions remain
    Continue,
    /// The instruction stream is exhausted
    Done(Value),
}

/// A VM execution frame
///
/// A frame is driven by one thread at a time. Independent frames can run
/// concurrently over the same [`Program`].
#[derive(Debug)]
pub struct Vm {
    config: VmConfig,
    stack: Vec<Value>,
    scopes: Vec<Scope>,
    ip: usize,
    pp: usize,
    channels: Option<StepChannels>,
    debugger: Option<Debugger>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a frame with default configuration
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Create a frame with custom configuration
    ///
    /// With [`VmConfig::debug`] set, execution is paced by the handle
    /// returned from [`debugger`](Self::debugger).
    pub fn with_config(config: VmConfig) -> Self {
        let (debugger, channels) = if config.debug {
            let (debugger, channels) = step::channels();
            (Some(debugger), Some(channels))
        } else {
            (None, None)
        };
        Self {
            stack: Vec::with_capacity(config.stack_capacity),
            scopes: Vec::new(),
            ip: 0,
            pp: 0,
            channels,
            debugger,
            config,
        }
    }

    /// Take the driver handle of a debug-mode frame
    ///
    /// `None` if the frame is not in debug mode, the handle was taken, or
    /// the frame has already run. Take it before calling [`Vm::run`].
    pub fn debugger(&mut self) -> Option<Debugger> {
        self.debugger.take()
    }

    /// Operand stack, bottom first
    #[inline]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// Innermost scope, if a block is open
    #[inline]
    pub fn scope(&self) -> Option<&Scope> {
        self.scopes.last()
    }

    /// Offset of the next byte to decode
    #[inline]
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Offset of the instruction executing, or last executed
    #[inline]
    pub fn pp(&self) -> usize {
        self.pp
    }

    /// Clear stacks and pointers for a fresh evaluation
    pub fn reset(&mut self) {
        self.stack.clear();
        self.scopes.clear();
        self.ip = 0;
        self.pp = 0;
    }

    /// Evaluate `program` against `env` to completion
    ///
    /// Returns the top of the operand stack, or nil if it is empty. In debug
    /// mode the step channels are closed when this returns, on faults too.
    /// A driver handle still held by the frame is dropped first, so a debug
    /// frame nobody drives runs unpaced.
    pub fn run(&mut self, program: &Program, env: &Value) -> VmResult<Value> {
        self.reset();
        if self.debugger.take().is_some() {
            debug!("debugger never taken, running unpaced");
        }
        let result = self.run_loop(program, env);
        if self.channels.take().is_some() {
            debug!(ip = self.ip, "debug session closed");
        }
        result
    }

    fn run_loop(&mut self, program: &Program, env: &Value) -> VmResult<Value> {
        while self.ip < program.bytecode().len() {
            self.await_step();
            self.execute(program, env)?;
            self.report_position();
        }
        Ok(self.result())
    }

    /// Execute exactly one instruction on the calling thread
    ///
    /// Does not reset the frame and ignores the step channels; call
    /// [`reset`](Self::reset) before stepping a new evaluation.
    pub fn step(&mut self, program: &Program, env: &Value) -> VmResult<Step> {
        if self.ip < program.bytecode().len() {
            self.execute(program, env)?;
        }
        if self.ip < program.bytecode().len() {
            Ok(Step::Continue)
        } else {
            Ok(Step::Done(self.result()))
        }
    }

    fn result(&self) -> Value {
        self.stack.last().cloned().unwrap_or_default()
    }

    fn await_step(&mut self) {
        let detached = self.channels.as_ref().is_some_and(|c| !c.wait());
        if detached {
            debug!(ip = self.ip, "debugger detached, running unpaced");
            self.channels = None;
        }
    }

    fn report_position(&mut self) {
        let detached = self.channels.as_ref().is_some_and(|c| !c.report(self.ip));
        if detached {
            debug!(ip = self.ip, "debugger detached, running unpaced");
            self.channels = None;
        }
    }

    #[inline]
    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    #[inline]
    fn pop(&mut self) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    #[inline]
    fn peek(&self) -> VmResult<&Value> {
        self.stack.last().ok_or(VmError::StackUnderflow)
    }

    /// Pop the top `count` values, oldest first
    fn pop_n(&mut self, count: usize) -> VmResult<Vec<Value>> {
        let at = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or(VmError::StackUnderflow)?;
        Ok(self.stack.split_off(at))
    }

    fn pop_count(&mut self) -> VmResult<usize> {
        let value = self.pop()?;
        match value {
            Value::Int(n) => usize::try_from(n)
                .map_err(|_| VmError::range_error(format!("negative element count {n}"))),
            other => Err(VmError::assertion("int", &other)),
        }
    }

    fn operand(&mut self, program: &Program) -> VmResult<u16> {
        let operand = read_operand(program.bytecode(), self.ip)?;
        self.ip += OPERAND_WIDTH;
        Ok(operand)
    }

    #[inline]
    fn constant_index(&mut self, program: &Program) -> VmResult<ConstantIndex> {
        self.operand(program).map(ConstantIndex::new)
    }

    fn binary(&mut self, op: fn(&Value, &Value) -> VmResult<Value>) -> VmResult<()> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = op(&a, &b)?;
        self.push(result);
        Ok(())
    }

    fn strings(&mut self) -> VmResult<(Arc<str>, Arc<str>)> {
        let b = self.pop()?;
        let a = self.pop()?;
        match (a, b) {
            (Value::String(a), Value::String(b)) => Ok((a, b)),
            (Value::String(_), other) | (other, _) => Err(VmError::assertion("string", &other)),
        }
    }

    fn jump_forward(&mut self, program: &Program, offset: u16) -> VmResult<()> {
        let target = self.ip + usize::from(offset);
        if target > program.bytecode().len() {
            return Err(BytecodeError::JumpOutOfRange {
                from: self.pp,
                offset,
            }
            .into());
        }
        self.ip = target;
        Ok(())
    }

    fn execute(&mut self, program: &Program, env: &Value) -> VmResult<()> {
        self.pp = self.ip;
        let byte = *program
            .bytecode()
            .get(self.ip)
            .ok_or(BytecodeError::UnexpectedEnd(self.ip))?;
        let op = Opcode::try_from(byte)?;
        self.ip += 1;

        if self.config.trace_instructions {
            trace!(pp = self.pp, op = op.name(), depth = self.stack.len(), "execute");
        }

        match op {
            Opcode::Push => {
                let index = self.constant_index(program)?;
                let value = program.value(index)?.clone();
                self.push(value);
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Rot => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
            }
            Opcode::True => self.push(Value::Bool(true)),
            Opcode::False => self.push(Value::Bool(false)),
            Opcode::Nil => self.push(Value::Nil),

            Opcode::Fetch => {
                let index = self.constant_index(program)?;
                let value = runtime::fetch(env, program.value(index)?)?;
                self.push(value);
            }
            Opcode::FetchMap => {
                let index = self.constant_index(program)?;
                let name = program.name(index)?;
                let Value::Map(map) = env else {
                    return Err(VmError::assertion("map[string]interface {}", env));
                };
                let value = map.get(name).cloned().unwrap_or_default();
                self.push(value);
            }
            Opcode::Property => {
                let index = self.constant_index(program)?;
                let container = self.pop()?;
                let value = runtime::fetch(&container, program.value(index)?)?;
                self.push(value);
            }
            Opcode::Index => {
                let key = self.pop()?;
                let container = self.pop()?;
                let value = runtime::fetch(&container, &key)?;
                self.push(value);
            }
            Opcode::Slice => {
                let from = self.pop()?;
                let to = self.pop()?;
                let container = self.pop()?;
                let value = runtime::slice(&container, &from, &to)?;
                self.push(value);
            }

            Opcode::Negate => {
                let value = self.pop()?;
                self.push(runtime::negate(&value)?);
            }
            Opcode::Not => {
                let value = self.pop()?;
                match value {
                    Value::Bool(b) => self.push(Value::Bool(!b)),
                    other => return Err(VmError::assertion("bool", &other)),
                }
            }

            Opcode::Equal => self.binary(operators::equal)?,
            Opcode::EqualInt => {
                let b = self.pop()?;
                let a = self.pop()?;
                match (&a, &b) {
                    (Value::Int(x), Value::Int(y)) => self.push(Value::Bool(x == y)),
                    (Value::Int(_), other) | (other, _) => {
                        return Err(VmError::assertion("int", other));
                    }
                }
            }
            Opcode::EqualString => {
                let (a, b) = self.strings()?;
                self.push(Value::Bool(a == b));
            }
            Opcode::Less => self.binary(operators::less)?,
            Opcode::More => self.binary(operators::more)?,
            Opcode::LessOrEqual => self.binary(operators::less_or_equal)?,
            Opcode::MoreOrEqual => self.binary(operators::more_or_equal)?,

            Opcode::Add => self.binary(operators::add)?,
            Opcode::Subtract => self.binary(operators::subtract)?,
            Opcode::Multiply => self.binary(operators::multiply)?,
            Opcode::Divide => self.binary(operators::divide)?,
            Opcode::Modulo => self.binary(operators::modulo)?,
            Opcode::Exponent => self.binary(runtime::exponent)?,
            Opcode::Range => self.binary(runtime::make_range)?,

            Opcode::Jump => {
                let offset = self.operand(program)?;
                self.jump_forward(program, offset)?;
            }
            Opcode::JumpIfTrue | Opcode::JumpIfFalse => {
                let offset = self.operand(program)?;
                let condition = match self.peek()? {
                    Value::Bool(b) => *b,
                    other => return Err(VmError::assertion("bool", other)),
                };
                if condition == (op == Opcode::JumpIfTrue) {
                    self.jump_forward(program, offset)?;
                }
            }
            Opcode::JumpBackward => {
                let offset = self.operand(program)?;
                self.ip = self.ip.checked_sub(usize::from(offset)).ok_or(
                    BytecodeError::JumpOutOfRange {
                        from: self.pp,
                        offset,
                    },
                )?;
            }

            Opcode::Matches => {
                let (text, pattern) = self.strings()?;
                let re = Regex::new(&pattern)?;
                self.push(Value::Bool(re.is_match(&text)));
            }
            Opcode::MatchesConst => {
                let index = self.constant_index(program)?;
                let text = self.pop()?;
                let Value::String(text) = text else {
                    return Err(VmError::assertion("string", &text));
                };
                let matched = program.pattern(index)?.is_match(&text);
                self.push(Value::Bool(matched));
            }
            Opcode::Contains | Opcode::StartsWith | Opcode::EndsWith => {
                let (a, b) = self.strings()?;
                let result = match op {
                    Opcode::Contains => a.contains(&*b),
                    Opcode::StartsWith => a.starts_with(&*b),
                    _ => a.ends_with(&*b),
                };
                self.push(Value::Bool(result));
            }
            Opcode::In => {
                let haystack = self.pop()?;
                let needle = self.pop()?;
                let found = runtime::membership(&needle, &haystack)?;
                self.push(Value::Bool(found));
            }

            Opcode::Array => {
                let count = self.pop_count()?;
                let items = self.pop_n(count)?;
                self.push(Value::array(items));
            }
            Opcode::Map => {
                let count = self.pop_count()?;
                let pairs = self.pop_n(count.saturating_mul(2))?;
                let mut map = crate::value::Map::with_capacity(pairs.len() / 2);
                let mut pairs = pairs.into_iter();
                while let (Some(key), Some(value)) = (pairs.next(), pairs.next()) {
                    let Value::String(key) = key else {
                        return Err(VmError::assertion("string", &key));
                    };
                    map.insert(key.to_string(), value);
                }
                self.push(Value::map(map));
            }
            Opcode::Len => {
                let len = runtime::length(self.peek()?)?;
                self.push(len);
            }
            Opcode::Cast => {
                let selector = self.operand(program)?;
                let value = self.pop()?;
                let cast = match selector {
                    CAST_INT64 => Value::Int64(runtime::to_int64(&value)?),
                    CAST_FLOAT64 => Value::Float64(runtime::to_float64(&value)?),
                    other => {
                        return Err(VmError::internal(format!("unknown cast selector {other}")));
                    }
                };
                self.push(cast);
            }

            Opcode::Call => {
                let index = self.constant_index(program)?;
                let call = program.call(index)?;
                let args = self.pop_n(call.arity)?;
                let function = runtime::fetch_callable(env, &call.name)?;
                self.push(function.call(&args)?);
            }
            Opcode::Method => {
                let index = self.constant_index(program)?;
                let call = program.call(index)?;
                let args = self.pop_n(call.arity)?;
                let receiver = self.pop()?;
                let function = runtime::fetch_callable(&receiver, &call.name)?;
                self.push(function.call(&args)?);
            }

            Opcode::Store => {
                let index = self.constant_index(program)?;
                let name = program.name(index)?;
                let value = self.pop()?;
                let scope = self.scopes.last_mut().ok_or(VmError::NoScope)?;
                scope.insert(name.to_string(), value);
            }
            Opcode::Load => {
                let index = self.constant_index(program)?;
                let name = program.name(index)?;
                let value = self
                    .scopes
                    .last()
                    .and_then(|scope| scope.get(name))
                    .cloned()
                    .unwrap_or_default();
                self.push(value);
            }
            Opcode::Inc => {
                let index = self.constant_index(program)?;
                let name = program.name(index)?;
                let scope = self.scopes.last_mut().ok_or(VmError::NoScope)?;
                match scope.get_mut(name) {
                    Some(Value::Int(i)) => *i = i.wrapping_add(1),
                    Some(other) => return Err(VmError::assertion("int", other)),
                    None => return Err(VmError::assertion("int", &Value::Nil)),
                }
            }
            Opcode::Begin => self.scopes.push(Scope::default()),
            Opcode::End => {
                self.scopes.pop().ok_or(VmError::NoScope)?;
            }
        }
        Ok(())
    }
}
