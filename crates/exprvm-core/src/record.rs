//! Struct-like values
//!
//! A record has a type name, ordered named fields, and a method table shared
//! by every record of the same type.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::error::VmResult;
use crate::value::Value;

/// Native method handler: receives the receiver and the call arguments
pub type NativeMethod = Arc<dyn Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync>;

/// Methods exposed by a record type
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: FxHashMap<String, NativeMethod>,
}

impl MethodTable {
    /// Create an empty method table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Look up a method by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<&NativeMethod> {
        self.methods.get(name)
    }

    /// Number of methods
    #[inline]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether there are no methods
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.methods.keys().collect();
        names.sort();
        f.debug_set().entries(names).finish()
    }
}

/// A struct-like value
#[derive(Debug, Clone)]
pub struct Record {
    type_name: Arc<str>,
    fields: IndexMap<String, Value>,
    methods: Arc<MethodTable>,
}

impl Record {
    /// Start building a record of type `type_name`
    pub fn builder(type_name: impl Into<Arc<str>>) -> RecordBuilder {
        RecordBuilder::new(type_name)
    }

    /// Type name
    #[inline]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Field by name
    #[inline]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Whether a field named `name` exists
    #[inline]
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Method by name
    #[inline]
    pub fn method(&self, name: &str) -> Option<&NativeMethod> {
        self.methods.get(name)
    }

    /// Shared method table of this record's type
    #[inline]
    pub fn methods(&self) -> &Arc<MethodTable> {
        &self.methods
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.fields == other.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name)?;
        for (i, (k, v)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
    }
}

/// Builder for creating records
#[derive(Debug)]
pub struct RecordBuilder {
    type_name: Arc<str>,
    fields: IndexMap<String, Value>,
    methods: Arc<MethodTable>,
}

impl RecordBuilder {
    /// Create a new record builder
    pub fn new(type_name: impl Into<Arc<str>>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: IndexMap::new(),
            methods: Arc::default(),
        }
    }

    /// Add a field
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Share an existing method table
    pub fn methods(mut self, methods: Arc<MethodTable>) -> Self {
        self.methods = methods;
        self
    }

    /// Add a method to this record's own table
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
    {
        let table = Arc::make_mut(&mut self.methods);
        table.methods.insert(name.into(), Arc::new(handler));
        self
    }

    /// Build the record
    pub fn build(self) -> Record {
        Record {
            type_name: self.type_name,
            fields: self.fields,
            methods: self.methods,
        }
    }
}
