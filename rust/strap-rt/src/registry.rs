//! Generation-checked slot storage for values that outlive the stack.
//!
//! A [`RegistryKey`] names a slot together with the generation it was issued
//! for. Once the slot is released and reused, old keys stop resolving: they
//! read as nil instead of aliasing the new occupant.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::{RuntimeError, RuntimeResult};
use crate::value::Value;

/// Handle to a registry slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistryKey {
    index: u32,
    generation: u32,
}

impl RegistryKey {
    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct Slot {
    generation: u32,
    value: Option<Value>,
}

/// The slot arena itself.
///
/// Every mutating method hands displaced values back to the caller. Dropping
/// a value can run userdata destructors that touch the registry again, so
/// callers must release their borrow before letting those values go.
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: Value) -> RegistryKey {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return RegistryKey {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        RegistryKey {
            index,
            generation: 0,
        }
    }

    fn slot(&self, key: RegistryKey) -> Option<&Slot> {
        self.slots
            .get(key.index as usize)
            .filter(|s| s.generation == key.generation && s.value.is_some())
    }

    pub fn contains(&self, key: RegistryKey) -> bool {
        self.slot(key).is_some()
    }

    /// Value stored under `key`; stale keys read as nil.
    pub fn get(&self, key: RegistryKey) -> Value {
        self.slot(key)
            .and_then(|s| s.value.clone())
            .unwrap_or_default()
    }

    /// Overwrites a live slot in place. The key stays valid.
    pub fn replace(&mut self, key: RegistryKey, value: Value) -> RuntimeResult<Value> {
        if !self.contains(key) {
            return Err(RuntimeError::StaleRegistryKey);
        }
        let slot = &mut self.slots[key.index as usize];
        Ok(slot.value.replace(value).unwrap_or_default())
    }

    /// Releases a slot. Its generation is bumped so outstanding keys go stale.
    pub fn remove(&mut self, key: RegistryKey) -> Option<Value> {
        if !self.contains(key) {
            return None;
        }
        let slot = &mut self.slots[key.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.live -= 1;
        slot.value.take()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

// ---------------------------------------------------------------------------
// Owning guard
// ---------------------------------------------------------------------------

/// Owns one registry slot and releases it on drop.
///
/// Marker objects store one of these as their payload, which ties the
/// lifetime of the referenced value to the marker's finalization.
pub struct RegistryRef {
    registry: Weak<RefCell<Registry>>,
    key: RegistryKey,
}

impl RegistryRef {
    pub(crate) fn new(registry: &Rc<RefCell<Registry>>, key: RegistryKey) -> Self {
        Self {
            registry: Rc::downgrade(registry),
            key,
        }
    }

    pub fn key(&self) -> RegistryKey {
        self.key
    }
}

impl fmt::Debug for RegistryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RegistryRef({})", self.key)
    }
}

impl Drop for RegistryRef {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        // A failed borrow means the registry is being torn down around us;
        // the slot goes with it.
        let released = match registry.try_borrow_mut() {
            Ok(mut reg) => reg.remove(self.key),
            Err(_) => None,
        };
        drop(released);
    }
}
