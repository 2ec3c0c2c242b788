//! Dynamic values as the runtime sees them.
//!
//! Scalars are stored inline. Tables, functions and userdata are reference
//! types: cloning a [`Value`] clones the handle, never the object, and raw
//! equality compares them by identity.

use std::fmt;
use std::rc::Rc;

use crate::error::RuntimeResult;
use crate::state::State;
use crate::table::{Table, TableRef};
use crate::userdata::Userdata;

// ---------------------------------------------------------------------------
// Native functions
// ---------------------------------------------------------------------------

type NativeFn = dyn Fn(&mut State) -> RuntimeResult<usize>;

/// A host function callable from the runtime.
///
/// The function sees its arguments as stack indices `1..=top()` of its own
/// frame and returns how many values it left on top of the stack as results.
#[derive(Clone)]
pub struct Function {
    inner: Rc<NativeFn>,
}

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut State) -> RuntimeResult<usize> + 'static,
    {
        Self { inner: Rc::new(f) }
    }

    pub(crate) fn invoke(&self, state: &mut State) -> RuntimeResult<usize> {
        (self.inner)(state)
    }

    /// Identity of the underlying closure, used for raw equality and ordering.
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function: {:#x}", self.addr())
    }
}

// ---------------------------------------------------------------------------
// Value kinds
// ---------------------------------------------------------------------------

/// Type tag of a [`Value`], as reported by `type_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nil,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Userdata,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Nil => "nil",
            ValueKind::Boolean => "boolean",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Table => "table",
            ValueKind::Function => "function",
            ValueKind::Userdata => "userdata",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamic runtime value.
///
/// Integers and floats share the `number` kind; they are kept apart so that
/// integer codecs can refuse fractional input without rounding.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Nil,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(Function),
    Userdata(Rc<Userdata>),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Nil => ValueKind::Nil,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Integer(_) | Value::Number(_) => ValueKind::Number,
            Value::String(_) => ValueKind::String,
            Value::Table(_) => ValueKind::Table,
            Value::Function(_) => ValueKind::Function,
            Value::Userdata(_) => ValueKind::Userdata,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Allocates a fresh, empty table value.
    pub fn new_table() -> Self {
        Value::Table(Table::new_ref())
    }

    /// Equality without metamethods: numbers by value (so `1 == 1.0`),
    /// strings by content, everything else by identity.
    pub fn raw_equal(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Integer(a), Value::Number(b)) | (Value::Number(b), Value::Integer(a)) => {
                (*a as f64) == *b && b.fract() == 0.0
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.addr() == b.addr(),
            (Value::Userdata(a), Value::Userdata(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of either number representation.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_userdata(&self) -> Option<&Rc<Userdata>> {
        match self {
            Value::Userdata(u) => Some(u),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n:?}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Table(t) => write!(f, "table: {:p}", Rc::as_ptr(t)),
            Value::Function(func) => func.fmt(f),
            Value::Userdata(u) => write!(f, "userdata: {:p}", Rc::as_ptr(u)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Rc::from(s))
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_and_floats_share_number_kind() {
        assert_eq!(Value::Integer(3).kind(), ValueKind::Number);
        assert_eq!(Value::Number(3.5).type_name(), "number");
    }

    #[test]
    fn raw_equality_mixes_number_representations() {
        assert!(Value::Integer(1).raw_equal(&Value::Number(1.0)));
        assert!(!Value::Integer(1).raw_equal(&Value::Number(1.5)));
        assert!(Value::from("a").raw_equal(&Value::from("a")));
    }

    #[test]
    fn tables_compare_by_identity() {
        let a = Value::new_table();
        let b = Value::new_table();
        assert!(a.raw_equal(&a.clone()));
        assert!(!a.raw_equal(&b));
    }
}
