//! Runtime values
//!
//! `Value` is a closed sum over every shape an expression can observe. Heap
//! data sits behind `Arc`, so cloning a value is cheap and values are
//! `Send + Sync`; one immutable [`Program`](crate::Program) can feed many
//! concurrent runs.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;

use crate::error::{VmError, VmResult};
use crate::function::Function;
use crate::record::Record;

/// String-keyed mapping
pub type Map = IndexMap<String, Value>;

/// Shared mutable cell behind a [`Value::Ref`]
///
/// Every shape-inspecting operation reads through the cell, so the host can
/// swap the referent between runs without rebuilding the environment.
#[derive(Clone)]
pub struct ValueCell(Arc<RwLock<Value>>);

impl ValueCell {
    /// Create a new cell holding `value`
    pub fn new(value: Value) -> Self {
        Self(Arc::new(RwLock::new(value)))
    }

    /// Get the current referent
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    /// Replace the referent
    pub fn set(&self, value: Value) {
        *self.0.write() = value;
    }

    /// Whether both cells are the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValueCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueCell({:?})", *self.0.read())
    }
}

/// A dynamically-typed runtime value
///
/// `Int` is the native integer the instruction set works with (array counts,
/// ranges, scope counters); the sized variants come from the environment.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Native integer
    Int(i64),
    /// 8-bit signed integer
    Int8(i8),
    /// 16-bit signed integer
    Int16(i16),
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// Native unsigned integer
    Uint(u64),
    /// 8-bit unsigned integer
    Uint8(u8),
    /// 16-bit unsigned integer
    Uint16(u16),
    /// 32-bit unsigned integer
    Uint32(u32),
    /// 64-bit unsigned integer
    Uint64(u64),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// UTF-8 string
    String(Arc<str>),
    /// Ordered sequence
    Array(Arc<Vec<Value>>),
    /// String-keyed mapping
    Map(Arc<Map>),
    /// Struct-like value with named fields and methods
    Record(Arc<Record>),
    /// Callable
    Function(Function),
    /// Compiled regular expression
    Regex(Regex),
    /// Indirection to another value
    Ref(ValueCell),
}

impl Value {
    /// Create a string value
    #[inline]
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Self::String(s.into())
    }

    /// Create an array value
    #[inline]
    pub fn array(items: impl Into<Vec<Value>>) -> Self {
        Self::Array(Arc::new(items.into()))
    }

    /// Create a map value
    #[inline]
    pub fn map(entries: Map) -> Self {
        Self::Map(Arc::new(entries))
    }

    /// Create a map value from key/value pairs
    pub fn map_from<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Create a record value
    #[inline]
    pub fn record(record: Record) -> Self {
        Self::Record(Arc::new(record))
    }

    /// Create a reference to a fresh cell holding `value`
    #[inline]
    pub fn reference(value: Value) -> Self {
        Self::Ref(ValueCell::new(value))
    }

    /// Check if nil
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Get as boolean
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as native integer
    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as 64-bit float
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float64(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as string slice
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_ref()),
            _ => None,
        }
    }

    /// Get as array elements
    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Get as map
    #[inline]
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map.as_ref()),
            _ => None,
        }
    }

    /// Get as record
    #[inline]
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record.as_ref()),
            _ => None,
        }
    }

    /// Whether this is an integer of any width
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::Int(_)
                | Self::Int8(_)
                | Self::Int16(_)
                | Self::Int32(_)
                | Self::Int64(_)
                | Self::Uint(_)
                | Self::Uint8(_)
                | Self::Uint16(_)
                | Self::Uint32(_)
                | Self::Uint64(_)
        )
    }

    /// Whether this is a float of any width
    pub fn is_float(&self) -> bool {
        matches!(self, Self::Float32(_) | Self::Float64(_))
    }

    /// Whether this is numeric
    pub fn is_number(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Type name used in fault messages
    pub fn type_name(&self) -> String {
        match self {
            Self::Nil => "nil".into(),
            Self::Bool(_) => "bool".into(),
            Self::Int(_) => "int".into(),
            Self::Int8(_) => "int8".into(),
            Self::Int16(_) => "int16".into(),
            Self::Int32(_) => "int32".into(),
            Self::Int64(_) => "int64".into(),
            Self::Uint(_) => "uint".into(),
            Self::Uint8(_) => "uint8".into(),
            Self::Uint16(_) => "uint16".into(),
            Self::Uint32(_) => "uint32".into(),
            Self::Uint64(_) => "uint64".into(),
            Self::Float32(_) => "float32".into(),
            Self::Float64(_) => "float64".into(),
            Self::String(_) => "string".into(),
            Self::Array(_) => "array".into(),
            Self::Map(_) => "map".into(),
            Self::Record(record) => record.type_name().to_string(),
            Self::Function(_) => "func".into(),
            Self::Regex(_) => "regexp".into(),
            Self::Ref(cell) => format!("*{}", cell.get().type_name()),
        }
    }

    /// Build a value from a JSON document
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::Uint(u)
                } else {
                    Self::Float64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::string(s),
            serde_json::Value::Array(items) => {
                Self::array(items.into_iter().map(Self::from_json).collect::<Vec<_>>())
            }
            serde_json::Value::Object(entries) => Self::map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Render as a JSON document
    ///
    /// Patterns become their source, records their fields and references
    /// their referent. Functions have no JSON form.
    pub fn to_json(&self) -> VmResult<serde_json::Value> {
        use serde_json::Value as Json;

        let float = |f: f64| {
            serde_json::Number::from_f64(f)
                .map(Json::Number)
                .unwrap_or(Json::Null)
        };

        Ok(match self {
            Self::Nil => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) | Self::Int64(i) => Json::from(*i),
            Self::Int8(i) => Json::from(*i),
            Self::Int16(i) => Json::from(*i),
            Self::Int32(i) => Json::from(*i),
            Self::Uint(u) | Self::Uint64(u) => Json::from(*u),
            Self::Uint8(u) => Json::from(*u),
            Self::Uint16(u) => Json::from(*u),
            Self::Uint32(u) => Json::from(*u),
            Self::Float32(f) => float(f64::from(*f)),
            Self::Float64(f) => float(*f),
            Self::String(s) => Json::String(s.to_string()),
            Self::Array(items) => Json::Array(
                items
                    .iter()
                    .map(Self::to_json)
                    .collect::<VmResult<Vec<_>>>()?,
            ),
            Self::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<VmResult<_>>()?,
            ),
            Self::Record(record) => Json::Object(
                record
                    .fields()
                    .map(|(k, v)| Ok((k.to_string(), v.to_json()?)))
                    .collect::<VmResult<_>>()?,
            ),
            Self::Regex(re) => Json::String(re.as_str().to_string()),
            Self::Ref(cell) => cell.get().to_json()?,
            Self::Function(func) => {
                return Err(VmError::type_error(format!(
                    "cannot convert func {} to json",
                    func.name()
                )));
            }
        })
    }
}

/// Structural, variant-exact equality
///
/// `Int(1)` and `Int64(1)` are different values here. Cross-width numeric
/// comparison is the job of [`operators::equal`](crate::operators::equal).
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) | (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Int8(a), Self::Int8(b)) => a == b,
            (Self::Int16(a), Self::Int16(b)) => a == b,
            (Self::Int32(a), Self::Int32(b)) => a == b,
            (Self::Uint(a), Self::Uint(b)) | (Self::Uint64(a), Self::Uint64(b)) => a == b,
            (Self::Uint8(a), Self::Uint8(b)) => a == b,
            (Self::Uint16(a), Self::Uint16(b)) => a == b,
            (Self::Uint32(a), Self::Uint32(b)) => a == b,
            (Self::Float32(a), Self::Float32(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            (Self::Regex(a), Self::Regex(b)) => a.as_str() == b.as_str(),
            (Self::Ref(a), Self::Ref(b)) => a.ptr_eq(b) || a.get() == b.get(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) | Self::Int64(i) => write!(f, "{i}"),
            Self::Int8(i) => write!(f, "{i}"),
            Self::Int16(i) => write!(f, "{i}"),
            Self::Int32(i) => write!(f, "{i}"),
            Self::Uint(u) | Self::Uint64(u) => write!(f, "{u}"),
            Self::Uint8(u) => write!(f, "{u}"),
            Self::Uint16(u) => write!(f, "{u}"),
            Self::Uint32(u) => write!(f, "{u}"),
            Self::Float32(x) => write!(f, "{x}"),
            Self::Float64(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Record(record) => write!(f, "{record}"),
            Self::Function(func) => write!(f, "func {}", func.name()),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
            Self::Ref(cell) => write!(f, "&{}", cell.get()),
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    u8 => Uint8,
    u16 => Uint16,
    u32 => Uint32,
    u64 => Uint64,
    f32 => Float32,
    f64 => Float64,
    Function => Function,
    Regex => Regex,
    ValueCell => Ref,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::string(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::map(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::record(record)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}
