//! Associative tables with deterministic traversal.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::rc::Rc;

use crate::error::{RuntimeError, RuntimeResult};
use crate::userdata::Userdata;
use crate::value::{Function, Value};

pub type TableRef = Rc<RefCell<Table>>;

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// A normalized, totally ordered table key.
///
/// Floats with an exact integer value are stored as integers so `t[1]` and
/// `t[1.0]` address the same slot. Reference keys order by address; the key
/// holds the reference so the address stays valid while it is stored.
#[derive(Clone)]
pub enum Key {
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(Rc<str>),
    Table(TableRef),
    Function(Function),
    Userdata(Rc<Userdata>),
}

impl Key {
    pub fn from_value(value: &Value) -> RuntimeResult<Key> {
        Ok(match value {
            Value::Nil => return Err(RuntimeError::InvalidKey("nil")),
            Value::Boolean(b) => Key::Boolean(*b),
            Value::Integer(i) => Key::Integer(*i),
            Value::Number(n) if n.is_nan() => return Err(RuntimeError::InvalidKey("NaN")),
            Value::Number(n) => match float_to_int(*n) {
                Some(i) => Key::Integer(i),
                None => Key::Number(*n),
            },
            Value::String(s) => Key::String(s.clone()),
            Value::Table(t) => Key::Table(t.clone()),
            Value::Function(f) => Key::Function(f.clone()),
            Value::Userdata(u) => Key::Userdata(u.clone()),
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Boolean(b) => Value::Boolean(*b),
            Key::Integer(i) => Value::Integer(*i),
            Key::Number(n) => Value::Number(*n),
            Key::String(s) => Value::String(s.clone()),
            Key::Table(t) => Value::Table(t.clone()),
            Key::Function(f) => Value::Function(f.clone()),
            Key::Userdata(u) => Value::Userdata(u.clone()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Key::Boolean(_) => 0,
            Key::Integer(_) => 1,
            Key::Number(_) => 2,
            Key::String(_) => 3,
            Key::Table(_) => 4,
            Key::Function(_) => 5,
            Key::Userdata(_) => 6,
        }
    }
}

fn float_to_int(n: f64) -> Option<i64> {
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Boolean(a), Key::Boolean(b)) => a.cmp(b),
            (Key::Integer(a), Key::Integer(b)) => a.cmp(b),
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Table(a), Key::Table(b)) => Rc::as_ptr(a).cmp(&Rc::as_ptr(b)),
            (Key::Function(a), Key::Function(b)) => a.addr().cmp(&b.addr()),
            (Key::Userdata(a), Key::Userdata(b)) => Rc::as_ptr(a).cmp(&Rc::as_ptr(b)),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_value().fmt(f)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Key/value storage plus an optional metatable.
///
/// Storing nil removes the entry. Traversal with [`Table::next`] follows key
/// order, so it tolerates entries being cleared mid-traversal.
#[derive(Default)]
pub struct Table {
    entries: BTreeMap<Key, Value>,
    metatable: Option<TableRef>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_ref() -> TableRef {
        Rc::new(RefCell::new(Table::new()))
    }

    /// Raw lookup; invalid keys (nil, NaN) simply miss.
    pub fn get(&self, key: &Value) -> Value {
        match Key::from_value(key) {
            Ok(key) => self.entries.get(&key).cloned().unwrap_or_default(),
            Err(_) => Value::Nil,
        }
    }

    pub fn get_int(&self, index: i64) -> Value {
        self.entries
            .get(&Key::Integer(index))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_str(&self, name: &str) -> Value {
        self.entries
            .get(&Key::String(Rc::from(name)))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw store. Returns the previous value so callers can drop it outside
    /// any borrow of this table.
    pub fn set(&mut self, key: &Value, value: Value) -> RuntimeResult<Value> {
        let key = Key::from_value(key)?;
        Ok(self.set_key(key, value))
    }

    pub fn set_int(&mut self, index: i64, value: Value) -> Value {
        self.set_key(Key::Integer(index), value)
    }

    pub fn set_str(&mut self, name: &str, value: Value) -> Value {
        self.set_key(Key::String(Rc::from(name)), value)
    }

    fn set_key(&mut self, key: Key, value: Value) -> Value {
        if value.is_nil() {
            self.entries.remove(&key).unwrap_or_default()
        } else {
            self.entries.insert(key, value).unwrap_or_default()
        }
    }

    /// Border length: the largest `n` such that `t[1..=n]` are all non-nil.
    pub fn len(&self) -> usize {
        let mut n = 0usize;
        for (key, _) in self.entries.range(Key::Integer(1)..) {
            match key {
                Key::Integer(i) if *i == n as i64 + 1 => n += 1,
                _ => break,
            }
        }
        n
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry following `after` in traversal order; nil starts the traversal.
    pub fn next(&self, after: &Value) -> RuntimeResult<Option<(Value, Value)>> {
        let entry = if after.is_nil() {
            self.entries.iter().next()
        } else {
            let key = Key::from_value(after)?;
            self.entries
                .range((Bound::Excluded(key), Bound::Unbounded))
                .next()
        };
        Ok(entry.map(|(k, v)| (k.to_value(), v.clone())))
    }

    /// Removes every entry, handing them back for the caller to drop.
    pub fn take_entries(&mut self) -> Vec<(Key, Value)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }

    pub fn metatable(&self) -> Option<TableRef> {
        self.metatable.clone()
    }

    pub fn set_metatable(&mut self, metatable: Option<TableRef>) -> Option<TableRef> {
        std::mem::replace(&mut self.metatable, metatable)
    }
}
