//! Host functions callable from bytecode

use std::fmt;
use std::sync::Arc;

use crate::error::{VmError, VmResult};
use crate::value::Value;

/// Native function handler type
pub type NativeFn = Arc<dyn Fn(&[Value]) -> VmResult<Value> + Send + Sync>;

/// A callable value
///
/// Free functions live in the environment; methods resolved on a receiver
/// come back as a `Function` with the receiver already bound.
#[derive(Clone)]
pub struct Function {
    name: Arc<str>,
    arity: Option<usize>,
    handler: NativeFn,
}

impl Function {
    /// Create a variadic function
    pub fn new<F>(name: impl Into<Arc<str>>, handler: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity: None,
            handler: Arc::new(handler),
        }
    }

    /// Create a function that requires exactly `arity` arguments
    pub fn with_arity<F>(name: impl Into<Arc<str>>, arity: usize, handler: F) -> Self
    where
        F: Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        Self {
            arity: Some(arity),
            ..Self::new(name, handler)
        }
    }

    /// Function name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared arity, if fixed
    #[inline]
    pub fn arity(&self) -> Option<usize> {
        self.arity
    }

    /// Invoke with `args`
    pub fn call(&self, args: &[Value]) -> VmResult<Value> {
        if let Some(arity) = self.arity
            && arity != args.len()
        {
            let amount = if args.len() > arity { "many" } else { "few" };
            return Err(VmError::type_error(format!(
                "too {amount} arguments in call to {}: want {arity}, got {}",
                self.name,
                args.len()
            )));
        }
        (self.handler)(args)
    }

    /// Whether both values are the same function object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.handler, &other.handler)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}
