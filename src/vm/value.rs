//! Runtime values for the Plasma VM.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use indexmap::{IndexMap, IndexSet};

use crate::error::RuntimeError;

use super::chunk::{Chunk, Constant};
use super::env::CapturedEnv;
use super::vm::Vm;

/// Set storage: insertion-ordered, ahash-hashed.
pub type ValueSet = IndexSet<HashKey, RandomState>;
/// Mapping storage: insertion-ordered, ahash-hashed.
pub type ValueMap = IndexMap<HashKey, Value, RandomState>;

/// A hashable key type for sets and mappings.
///
/// Integral floats are stored as the equal int so that `1` and `1.0` name
/// the same key, matching `==` on values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Int(i64),
    /// Raw bits of a non-integral float.
    Float(u64),
    Text(String),
    Bool(bool),
    Absent,
    Tuple(Vec<HashKey>),
}

impl HashKey {
    /// Convert a Value to a HashKey if possible.
    pub fn from_value(value: &Value) -> Option<HashKey> {
        match value {
            Value::Int(n) => Some(HashKey::Int(*n)),
            Value::Float(x) => Some(float_key(*x)),
            Value::Text(s) => Some(HashKey::Text(s.clone())),
            Value::Bool(b) => Some(HashKey::Bool(*b)),
            Value::Absent => Some(HashKey::Absent),
            Value::Tuple(items) => items
                .iter()
                .map(HashKey::from_value)
                .collect::<Option<Vec<_>>>()
                .map(HashKey::Tuple),
            _ => None,
        }
    }

    /// Convert back to a Value.
    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Int(n) => Value::Int(*n),
            HashKey::Float(bits) => Value::Float(f64::from_bits(*bits)),
            HashKey::Text(s) => Value::Text(s.clone()),
            HashKey::Bool(b) => Value::Bool(*b),
            HashKey::Absent => Value::Absent,
            HashKey::Tuple(items) => {
                Value::Tuple(Rc::new(items.iter().map(HashKey::to_value).collect()))
            }
        }
    }
}

fn float_key(x: f64) -> HashKey {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if x.fract() == 0.0 && x >= -LIMIT && x < LIMIT {
        HashKey::Int(x as i64)
    } else {
        HashKey::Float(x.to_bits())
    }
}

/// Shortest round-trip float text, always in positional notation, with `.0`
/// on integral values. Non-finite values print as `inf`, `-inf` and `nan`.
pub(crate) fn format_float(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buffer = ryu::Buffer::new();
    let shortest = buffer.format_finite(x);
    if !shortest.contains('e') {
        return shortest.to_string();
    }
    // std's Display is also shortest round-trip but never uses an exponent.
    let positional = x.to_string();
    if positional.contains('.') {
        positional
    } else {
        positional + ".0"
    }
}

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    /// Ordered, mutable, duplicates allowed.
    List(Rc<RefCell<Vec<Value>>>),
    Set(Rc<ValueSet>),
    Mapping(Rc<ValueMap>),
    /// Fixed-size and immutable.
    Tuple(Rc<Vec<Value>>),
    /// User function or lambda with its captured environment.
    Function(Rc<Function>),
    /// Host function.
    NativeFunction(NativeFunction),
    /// Eagerly materialized, restartable sequence.
    Generator(Rc<Vec<Value>>),
    /// Result of a call that never executed a return.
    Absent,
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn text(s: impl Into<String>) -> Value {
        Value::Text(s.into())
    }

    /// Build a set, failing on the first unhashable element.
    pub fn set_from(items: impl IntoIterator<Item = Value>) -> Result<Value, RuntimeError> {
        let mut set = ValueSet::default();
        for item in items {
            set.insert(item.to_hash_key()?);
        }
        Ok(Value::Set(Rc::new(set)))
    }

    /// Build a mapping; later pairs overwrite earlier ones with an equal key.
    pub fn mapping_from(
        pairs: impl IntoIterator<Item = (Value, Value)>,
    ) -> Result<Value, RuntimeError> {
        let mut map = ValueMap::default();
        for (key, value) in pairs {
            map.insert(key.to_hash_key()?, value);
        }
        Ok(Value::Mapping(Rc::new(map)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Mapping(_) => "mapping",
            Value::Tuple(_) => "tuple",
            Value::Function(_) => "function",
            Value::NativeFunction(_) => "native function",
            Value::Generator(_) => "generator",
            Value::Absent => "none",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Absent => false,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Set(set) => !set.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Generator(items) => !items.is_empty(),
            Value::Function(_) | Value::NativeFunction(_) => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::NativeFunction(_))
    }

    /// Convert this value to a HashKey, or fault if it is unhashable.
    pub fn to_hash_key(&self) -> Result<HashKey, RuntimeError> {
        HashKey::from_value(self).ok_or(RuntimeError::Unhashable(self.type_name()))
    }

    /// Materialize the elements this value iterates over.
    ///
    /// Mappings yield their keys and text yields one-character texts.
    pub fn iter_values(&self) -> Result<Vec<Value>, RuntimeError> {
        match self {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) | Value::Generator(items) => Ok(items.as_ref().clone()),
            Value::Set(set) => Ok(set.iter().map(HashKey::to_value).collect()),
            Value::Mapping(map) => Ok(map.keys().map(HashKey::to_value).collect()),
            Value::Text(s) => Ok(s.chars().map(|c| Value::Text(c.to_string())).collect()),
            other => Err(RuntimeError::NotIterable(other.type_name())),
        }
    }

    /// Nested rendering: text is quoted inside collections.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(x) => Value::Float(*x),
            Constant::Text(s) => Value::Text(s.clone()),
            Constant::Bool(b) => Value::Bool(*b),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) => (*a as f64) == *b,
            (Value::Float(a), Value::Int(b)) => *a == (*b as f64),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Absent, Value::Absent) => true,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Generator(a), Value::Generator(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a.len() == b.len() && a.iter().all(|k| b.contains(k)),
            (Value::Mapping(a), Value::Mapping(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::NativeFunction(a), Value::NativeFunction(b)) => Rc::ptr_eq(&a.func, &b.func),
            _ => false,
        }
    }
}

fn write_separated<'a, I>(f: &mut fmt::Formatter<'_>, items: I) -> fmt::Result
where
    I: IntoIterator<Item = &'a Value>,
{
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        item.fmt_nested(f)?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => f.write_str(itoa::Buffer::new().format(*n)),
            Value::Float(x) => f.write_str(&format_float(*x)),
            Value::Text(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Absent => write!(f, "none"),
            Value::List(items) => {
                write!(f, "[")?;
                write_separated(f, items.borrow().iter())?;
                write!(f, "]")
            }
            Value::Tuple(items) => {
                write!(f, "(")?;
                write_separated(f, items.iter())?;
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Value::Set(set) => {
                if set.is_empty() {
                    return write!(f, "set()");
                }
                let items: Vec<Value> = set.iter().map(HashKey::to_value).collect();
                write!(f, "{{")?;
                write_separated(f, items.iter())?;
                write!(f, "}}")
            }
            Value::Mapping(map) => {
                write!(f, "{{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    key.to_value().fmt_nested(f)?;
                    write!(f, ": ")?;
                    value.fmt_nested(f)?;
                }
                write!(f, "}}")
            }
            Value::Function(func) => write!(f, "{}", func),
            Value::NativeFunction(native) => write!(f, "<native fn {}>", native.name),
            Value::Generator(items) => write!(f, "<generator of {}>", items.len()),
        }
    }
}

/// A function value: a code region plus the environment captured when the
/// `FUNC_DEF` instruction ran.
#[derive(Debug)]
pub struct Function {
    /// `None` for lambdas.
    pub name: Option<String>,
    pub params: Vec<String>,
    /// Chunk holding the body.
    pub chunk: Rc<Chunk>,
    /// First body instruction.
    pub start: usize,
    pub env: Rc<CapturedEnv>,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "<func {}({})>", name, self.params.join(", ")),
            None => write!(f, "<lambda>"),
        }
    }
}

/// Host-side implementation of a native function. It receives the engine so
/// it can call back into user functions.
pub type NativeFn = dyn Fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError>;

/// A host function with a fixed arity.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub arity: usize,
    pub func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new<F>(name: impl Into<String>, arity: usize, func: F) -> Self
    where
        F: Fn(&mut Vm, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
    {
        Self {
            name: name.into(),
            arity,
            func: Rc::new(func),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({}/{})", self.name, self.arity)
    }
}
