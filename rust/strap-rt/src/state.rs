//! The runtime instance: operand stack, call frames, registry and globals.
//!
//! Indices follow the usual embedded-runtime convention. Positive indices are
//! 1-based and relative to the current frame's base, negative indices count
//! back from the top (`-1` is the top value). Reading an index past the top
//! yields nil; writing through one is an API misuse and panics.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};
use crate::registry::{Registry, RegistryKey, RegistryRef};
use crate::table::{Table, TableRef};
use crate::userdata::Userdata;
use crate::value::{Function, Value, ValueKind};

/// Pass as `nresults` to keep every value a function returns.
pub const MULTRET: i32 = -1;

/// Upper bound on `__index` chains followed by a single lookup.
const MAX_INDEX_CHAIN: usize = 100;

struct Frame {
    base: usize,
}

pub struct State {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    registry: Rc<RefCell<Registry>>,
    globals: TableRef,
    type_metatables: HashMap<TypeId, TableRef>,
    config: RuntimeConfig,
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            stack: Vec::new(),
            frames: vec![Frame { base: 0 }],
            registry: Rc::new(RefCell::new(Registry::new())),
            globals: Table::new_ref(),
            type_metatables: HashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Index arithmetic
    // -----------------------------------------------------------------------

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    /// Absolute stack position of `idx`, if it names an existing slot.
    fn slot(&self, idx: i32) -> Option<usize> {
        let base = self.base();
        let pos = if idx > 0 {
            base + idx as usize - 1
        } else if idx < 0 {
            let back = idx.unsigned_abs() as usize;
            if back > self.stack.len() - base {
                return None;
            }
            self.stack.len() - back
        } else {
            return None;
        };
        (pos < self.stack.len()).then_some(pos)
    }

    fn expect_slot(&self, idx: i32) -> usize {
        match self.slot(idx) {
            Some(pos) => pos,
            None => panic!("invalid stack index {idx} (top is {})", self.top()),
        }
    }

    /// Converts a relative index into the equivalent positive one.
    pub fn abs_index(&self, idx: i32) -> i32 {
        if idx < 0 {
            self.top() + idx + 1
        } else {
            idx
        }
    }

    /// Number of values in the current frame.
    pub fn top(&self) -> i32 {
        (self.stack.len() - self.base()) as i32
    }

    /// Grows (with nils) or shrinks the current frame. Negative values are
    /// relative to the current top, as with any other index.
    pub fn set_top(&mut self, idx: i32) {
        let base = self.base();
        let new_len = if idx >= 0 {
            base + idx as usize
        } else {
            let len = self.stack.len() as i64 + idx as i64 + 1;
            assert!(len >= base as i64, "set_top({idx}) below frame base");
            len as usize
        };
        self.stack.resize(new_len, Value::Nil);
    }

    /// Fails if `extra` more slots would exceed the configured stack size.
    pub fn check_stack(&self, extra: usize) -> RuntimeResult<()> {
        if self.stack.len() + extra > self.config.max_stack_size {
            return Err(RuntimeError::StackOverflow {
                limit: self.config.max_stack_size,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stack manipulation
    // -----------------------------------------------------------------------

    pub fn push(&mut self, value: impl Into<Value>) {
        self.stack.push(value.into());
    }

    pub fn push_nil(&mut self) {
        self.stack.push(Value::Nil);
    }

    /// Pushes a copy of the value at `idx`.
    pub fn push_value(&mut self, idx: i32) {
        let v = self.value(idx);
        self.stack.push(v);
    }

    /// Pops `n` values, never below the current frame.
    pub fn pop(&mut self, n: usize) {
        let floor = self.base().max(self.stack.len().saturating_sub(n));
        self.stack.truncate(floor);
    }

    /// Pops and returns the top value.
    pub fn pop_value(&mut self) -> Value {
        if self.stack.len() > self.base() {
            self.stack.pop().unwrap_or_default()
        } else {
            Value::Nil
        }
    }

    /// Moves the top value into `idx`, shifting the values above it up.
    pub fn insert(&mut self, idx: i32) {
        let pos = self.expect_slot(idx);
        let v = self.pop_value();
        self.stack.insert(pos, v);
    }

    /// Removes the value at `idx`, shifting the values above it down.
    pub fn remove(&mut self, idx: i32) {
        let pos = self.expect_slot(idx);
        self.stack.remove(pos);
    }

    /// Pops the top value and stores it at `idx`.
    pub fn replace(&mut self, idx: i32) {
        let pos = self.expect_slot(idx);
        let v = self.pop_value();
        if pos < self.stack.len() {
            self.stack[pos] = v;
        }
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    /// A clone of the value at `idx`; nil past the top.
    pub fn value(&self, idx: i32) -> Value {
        self.slot(idx)
            .map(|pos| self.stack[pos].clone())
            .unwrap_or_default()
    }

    pub fn kind(&self, idx: i32) -> ValueKind {
        self.slot(idx)
            .map_or(ValueKind::Nil, |pos| self.stack[pos].kind())
    }

    pub fn type_name(&self, idx: i32) -> &'static str {
        self.kind(idx).name()
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Nil
    }

    pub fn is_table(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Table
    }

    pub fn is_userdata(&self, idx: i32) -> bool {
        self.kind(idx) == ValueKind::Userdata
    }

    pub fn is_integer(&self, idx: i32) -> bool {
        matches!(self.slot(idx).map(|p| &self.stack[p]), Some(Value::Integer(_)))
    }

    pub fn to_integer(&self, idx: i32) -> Option<i64> {
        self.slot(idx).and_then(|p| self.stack[p].as_integer())
    }

    pub fn to_number(&self, idx: i32) -> Option<f64> {
        self.slot(idx).and_then(|p| self.stack[p].as_number())
    }

    pub fn to_boolean(&self, idx: i32) -> Option<bool> {
        match self.slot(idx).map(|p| &self.stack[p]) {
            Some(Value::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn to_str(&self, idx: i32) -> Option<Rc<str>> {
        match self.slot(idx).map(|p| &self.stack[p]) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        }
    }

    pub fn to_table(&self, idx: i32) -> Option<TableRef> {
        self.slot(idx).and_then(|p| self.stack[p].as_table().cloned())
    }

    pub fn to_userdata(&self, idx: i32) -> Option<Rc<Userdata>> {
        self.slot(idx)
            .and_then(|p| self.stack[p].as_userdata().cloned())
    }

    pub fn raw_equal(&self, a: i32, b: i32) -> bool {
        match (self.slot(a), self.slot(b)) {
            (Some(a), Some(b)) => self.stack[a].raw_equal(&self.stack[b]),
            _ => false,
        }
    }

    /// Raw length: border of a table, byte length of a string, else 0.
    pub fn raw_len(&self, idx: i32) -> usize {
        match self.slot(idx).map(|p| &self.stack[p]) {
            Some(Value::Table(t)) => t.borrow().len(),
            Some(Value::String(s)) => s.len(),
            _ => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Tables
    // -----------------------------------------------------------------------

    fn table_at(&self, idx: i32) -> RuntimeResult<TableRef> {
        match self.value(idx) {
            Value::Table(t) => Ok(t),
            other => Err(RuntimeError::NotIndexable(other.type_name())),
        }
    }

    /// Pushes a fresh empty table.
    pub fn new_table(&mut self) {
        self.stack.push(Value::new_table());
    }

    /// Looks `key` up in `target`, following `__index` tables of tables and
    /// userdata. Function-valued `__index` handlers are not consulted.
    pub fn index_value(&self, target: &Value, key: &Value) -> RuntimeResult<Value> {
        let mut current = target.clone();
        for _ in 0..MAX_INDEX_CHAIN {
            let metatable = match &current {
                Value::Table(t) => {
                    let t = t.borrow();
                    let raw = t.get(key);
                    if !raw.is_nil() {
                        return Ok(raw);
                    }
                    t.metatable()
                }
                Value::Userdata(u) => u.metatable(),
                other => return Err(RuntimeError::NotIndexable(other.type_name())),
            };
            let Some(metatable) = metatable else {
                return Ok(Value::Nil);
            };
            let handler = metatable.borrow().get_str("__index");
            match handler {
                Value::Table(_) | Value::Userdata(_) => current = handler,
                _ => return Ok(Value::Nil),
            }
        }
        Ok(Value::Nil)
    }

    /// Pushes `t[key]` where `t` is at `idx` and the key is popped from the top.
    pub fn get_table(&mut self, idx: i32) -> RuntimeResult<ValueKind> {
        let target = self.value(idx);
        let key = self.pop_value();
        let v = self.index_value(&target, &key)?;
        let kind = v.kind();
        self.stack.push(v);
        Ok(kind)
    }

    /// Pushes `t.name`, honoring `__index`.
    pub fn get_field(&mut self, idx: i32, name: &str) -> RuntimeResult<ValueKind> {
        let target = self.value(idx);
        let v = self.index_value(&target, &Value::from(name))?;
        let kind = v.kind();
        self.stack.push(v);
        Ok(kind)
    }

    /// `t[k] = v` with the key at `-2` and the value at `-1`; pops both.
    pub fn set_table(&mut self, idx: i32) -> RuntimeResult<()> {
        let table = self.table_at(idx)?;
        let value = self.pop_value();
        let key = self.pop_value();
        let old = table.borrow_mut().set(&key, value)?;
        drop(old);
        Ok(())
    }

    /// `t.name = v` with the value popped from the top. Raw, no metamethods.
    pub fn set_field(&mut self, idx: i32, name: &str) -> RuntimeResult<()> {
        let table = self.table_at(idx)?;
        let value = self.pop_value();
        let old = table.borrow_mut().set_str(name, value);
        drop(old);
        Ok(())
    }

    /// Pushes `t[n]` without metamethods.
    pub fn raw_get_i(&mut self, idx: i32, n: i64) -> RuntimeResult<ValueKind> {
        let table = self.table_at(idx)?;
        let v = table.borrow().get_int(n);
        let kind = v.kind();
        self.stack.push(v);
        Ok(kind)
    }

    /// `t[n] = v` with the value popped from the top.
    pub fn raw_set_i(&mut self, idx: i32, n: i64) -> RuntimeResult<()> {
        let table = self.table_at(idx)?;
        let value = self.pop_value();
        let old = table.borrow_mut().set_int(n, value);
        drop(old);
        Ok(())
    }

    /// Traversal step: pops a key and pushes the next key/value pair.
    /// Returns `false` (pushing nothing) when the traversal is over.
    pub fn next(&mut self, idx: i32) -> RuntimeResult<bool> {
        let table = self.table_at(idx)?;
        let key = self.pop_value();
        let entry = table.borrow().next(&key)?;
        match entry {
            Some((k, v)) => {
                self.stack.push(k);
                self.stack.push(v);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -----------------------------------------------------------------------
    // Metatables and userdata
    // -----------------------------------------------------------------------

    pub fn metatable_of(value: &Value) -> Option<TableRef> {
        match value {
            Value::Table(t) => t.borrow().metatable(),
            Value::Userdata(u) => u.metatable(),
            _ => None,
        }
    }

    /// Pushes the metatable of the value at `idx`, if it has one.
    pub fn get_metatable(&mut self, idx: i32) -> bool {
        match Self::metatable_of(&self.value(idx)) {
            Some(mt) => {
                self.stack.push(Value::Table(mt));
                true
            }
            None => false,
        }
    }

    /// Pops a table (or nil) and installs it as the metatable of `idx`.
    pub fn set_metatable(&mut self, idx: i32) -> RuntimeResult<()> {
        let target = self.value(idx);
        let metatable = match self.pop_value() {
            Value::Table(t) => Some(t),
            Value::Nil => None,
            other => return Err(RuntimeError::NotIndexable(other.type_name())),
        };
        let old = match &target {
            Value::Table(t) => t.borrow_mut().set_metatable(metatable),
            Value::Userdata(u) => u.set_metatable(metatable),
            other => return Err(RuntimeError::NotIndexable(other.type_name())),
        };
        drop(old);
        Ok(())
    }

    /// Pushes a new userdata owning `payload`.
    pub fn push_userdata<T: Any>(&mut self, payload: T, metatable: Option<TableRef>) {
        self.stack
            .push(Value::Userdata(Rc::new(Userdata::with_metatable(payload, metatable))));
    }

    /// Metatable cached for a host type, shared by every object of that type.
    pub fn type_metatable(&self, type_id: TypeId) -> Option<TableRef> {
        self.type_metatables.get(&type_id).cloned()
    }

    pub fn set_type_metatable(&mut self, type_id: TypeId, metatable: TableRef) {
        self.type_metatables.insert(type_id, metatable);
    }

    // -----------------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------------

    pub fn push_function<F>(&mut self, f: F)
    where
        F: Fn(&mut State) -> RuntimeResult<usize> + 'static,
    {
        self.stack.push(Value::Function(Function::new(f)));
    }

    /// Calls the function sitting below the top `nargs` values.
    ///
    /// Function and arguments are replaced by the results, adjusted to
    /// `nresults` unless it is [`MULTRET`]. On error the stack is cut back to
    /// where the function was, and the error is returned to the caller.
    pub fn call(&mut self, nargs: usize, nresults: i32) -> RuntimeResult<()> {
        let available = self.top() as usize;
        if nargs + 1 > available {
            return Err(RuntimeError::StackUnderflow {
                needed: nargs + 1,
                available,
            });
        }
        let func_pos = self.stack.len() - nargs - 1;
        let func = match &self.stack[func_pos] {
            Value::Function(f) => f.clone(),
            other => {
                let name = other.type_name();
                self.stack.truncate(func_pos);
                return Err(RuntimeError::NotCallable(name));
            }
        };
        let depth = self.frames.len() - 1;
        if depth >= self.config.max_call_depth {
            self.stack.truncate(func_pos);
            return Err(RuntimeError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }
        if let Err(e) = self.check_stack(0) {
            self.stack.truncate(func_pos);
            return Err(e);
        }

        trace!(depth, nargs, "native call");
        self.frames.push(Frame { base: func_pos + 1 });
        let result = func.invoke(self);
        self.frames.pop();

        match result {
            Ok(returned) => {
                let produced = returned.min(self.stack.len() - (func_pos + 1));
                let results_start = self.stack.len() - produced;
                self.stack.drain(func_pos..results_start);
                if nresults >= 0 {
                    self.stack.resize(func_pos + nresults as usize, Value::Nil);
                }
                Ok(())
            }
            Err(e) => {
                self.stack.truncate(func_pos);
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Globals
    // -----------------------------------------------------------------------

    pub fn get_global(&mut self, name: &str) -> ValueKind {
        let v = self.globals.borrow().get_str(name);
        let kind = v.kind();
        self.stack.push(v);
        kind
    }

    /// Pops the top value into the global `name`.
    pub fn set_global(&mut self, name: &str) {
        let value = self.pop_value();
        let old = self.globals.borrow_mut().set_str(name, value);
        drop(old);
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Pops the top value into a fresh registry slot.
    pub fn registry_ref(&mut self) -> RegistryKey {
        let value = self.pop_value();
        self.registry.borrow_mut().insert(value)
    }

    /// Pushes the value stored under `key` (nil if the key is stale).
    pub fn registry_get(&mut self, key: RegistryKey) -> ValueKind {
        let v = self.registry.borrow().get(key);
        let kind = v.kind();
        self.stack.push(v);
        kind
    }

    /// Pops the top value and overwrites the slot `key` in place.
    pub fn registry_set(&mut self, key: RegistryKey) -> RuntimeResult<()> {
        let value = self.pop_value();
        let old = self.registry.borrow_mut().replace(key, value)?;
        drop(old);
        Ok(())
    }

    pub fn registry_unref(&mut self, key: RegistryKey) {
        let old = self.registry.borrow_mut().remove(key);
        drop(old);
    }

    /// Wraps `key` in a guard that releases the slot when dropped.
    pub fn registry_guard(&self, key: RegistryKey) -> RegistryRef {
        RegistryRef::new(&self.registry, key)
    }

    pub fn registry_len(&self) -> usize {
        self.registry.borrow().len()
    }
}

impl Drop for State {
    fn drop(&mut self) {
        // Type metatables usually point `__index` at themselves; empty them
        // so the reference cycles do not outlive the state.
        for metatable in self.type_metatables.values() {
            let entries = metatable.borrow_mut().take_entries();
            drop(entries);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
