//! Lifecycle of values crossing the boundary.
//!
//! A value handed to native code is in one of five states:
//!
//! - **Dynamic**: an ordinary runtime value, decoded on every read.
//! - **PendingBake**: a marker userdata whose registry slot holds the
//!   original dynamic value. The first typed read converts it.
//! - **Indirect**: a former pending marker whose slot now holds the baked
//!   object. Every marker that referred to the value sees the same object.
//! - **Baked**: a userdata owning a host object (`Rc<RefCell<T>>`) whose
//!   metatable is the per-type baked metatable.
//! - **Fail**: a userdata without any metatable. Nothing created through
//!   this crate looks like that, so reaching it is a contract violation.
//!
//! Markers are told apart by metatable identity, so turning a pending marker
//! into an indirect one only swaps its metatable.

use std::any::TypeId;
use std::cell::RefCell;
use std::rc::Rc;

use strap_rt::{Function, RegistryKey, RegistryRef, State, Table, TableRef, Value};
use tracing::{debug, trace, warn};

use crate::errors::CallError;
use crate::record::Methods;
use crate::traits::{self, Marshal};

/// Metatable entry converting a baked object back into dynamic data.
pub const TO_DYNAMIC_HOOK: &str = "__to_dynamic";
/// Metatable entry converting dynamic data straight into a baked object.
pub const TO_NATIVE_HOOK: &str = "__to_native";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    Dynamic,
    PendingBake,
    Indirect,
    Baked,
    Fail,
}

/// A successfully read value: either freshly decoded, or the shared baked
/// object itself.
pub enum Potential<T> {
    Owned(T),
    Shared(Rc<RefCell<T>>),
}

impl<T> Potential<T> {
    /// The value as a shared cell, wrapping owned values in a new one.
    pub fn into_cell(self) -> Rc<RefCell<T>> {
        match self {
            Potential::Owned(v) => Rc::new(RefCell::new(v)),
            Potential::Shared(cell) => cell,
        }
    }

    pub fn is_owned(&self) -> bool {
        matches!(self, Potential::Owned(_))
    }
}

/// Return type for functions that hand their result back as a baked object.
pub struct Baked<T>(pub T);

// ---------------------------------------------------------------------------
// Markers
// ---------------------------------------------------------------------------

/// Payload of pending and indirect markers. Dropping the marker releases
/// the registry slot.
struct Marker(RegistryRef);

struct PendingTag;
struct IndirectTag;

fn marker_metatable<Tag: 'static>(state: &mut State, name: &str) -> TableRef {
    let id = TypeId::of::<Tag>();
    if let Some(mt) = state.type_metatable(id) {
        return mt;
    }
    let mt = Table::new_ref();
    mt.borrow_mut().set_str("__name", Value::from(name));
    state.set_type_metatable(id, mt.clone());
    mt
}

fn is_marker_metatable<Tag: 'static>(state: &State, mt: &TableRef) -> bool {
    state
        .type_metatable(TypeId::of::<Tag>())
        .is_some_and(|known| Rc::ptr_eq(&known, mt))
}

fn marker_key(state: &State, idx: i32) -> Option<RegistryKey> {
    let ud = state.to_userdata(idx)?;
    ud.downcast_ref::<Marker>().map(|m| m.0.key())
}

// ---------------------------------------------------------------------------
// Baked objects
// ---------------------------------------------------------------------------

/// The metatable shared by all baked objects of type `T`, built on first use.
///
/// It indexes itself, carries the conversion hooks the type supports and
/// the methods registered through [`Marshal::methods`].
pub fn baked_metatable<T: Marshal>(state: &mut State) -> TableRef {
    let id = TypeId::of::<T>();
    if let Some(mt) = state.type_metatable(id) {
        return mt;
    }

    let mt = Table::new_ref();
    {
        let mut t = mt.borrow_mut();
        t.set_str("__index", Value::Table(mt.clone()));
        t.set_str("__name", Value::from(T::type_name()));

        if T::CAPS.is_writable() {
            t.set_str(
                TO_DYNAMIC_HOOK,
                Value::Function(Function::new(|s: &mut State| {
                    let cell = baked_cell::<T>(&s.value(1))
                        .ok_or(CallError::Unreadable(T::type_name()))?;
                    let value = cell
                        .try_borrow()
                        .map_err(|_| CallError::msg("The baked object is in use."))?;
                    value.write(s)?;
                    Ok(1)
                })),
            );
        }

        if T::CAPS.read && T::CAPS.is_writable() {
            t.set_str(
                TO_NATIVE_HOOK,
                Value::Function(Function::new(|s: &mut State| {
                    let value = traits::read::<T>(s, 1)
                        .ok_or(CallError::Unreadable(T::type_name()))?;
                    push_baked(s, value);
                    Ok(1)
                })),
            );
        }

        let mut methods = Methods::new();
        T::methods(&mut methods);
        for (name, function) in methods.into_entries() {
            t.set_str(name, Value::Function(function));
        }
    }
    state.set_type_metatable(id, mt.clone());
    trace!(type_name = T::type_name(), "baked metatable created");
    mt
}

/// Pushes `value` as a new baked object.
pub fn push_baked<T: Marshal>(state: &mut State, value: T) {
    push_baked_cell(state, Rc::new(RefCell::new(value)));
}

pub fn push_baked_cell<T: Marshal>(state: &mut State, cell: Rc<RefCell<T>>) {
    let mt = baked_metatable::<T>(state);
    state.push_userdata(cell, Some(mt));
}

/// The host object inside a baked userdata, if it holds a `T`.
pub fn baked_cell<T: 'static>(value: &Value) -> Option<Rc<RefCell<T>>> {
    value
        .as_userdata()?
        .downcast_ref::<Rc<RefCell<T>>>()
        .cloned()
}

// ---------------------------------------------------------------------------
// Classification and reads
// ---------------------------------------------------------------------------

pub fn classify(state: &State, idx: i32) -> DataState {
    let Some(ud) = state.to_userdata(idx) else {
        return DataState::Dynamic;
    };
    let Some(mt) = ud.metatable() else {
        return DataState::Fail;
    };
    if is_marker_metatable::<IndirectTag>(state, &mt) {
        DataState::Indirect
    } else if is_marker_metatable::<PendingTag>(state, &mt) {
        DataState::PendingBake
    } else {
        DataState::Baked
    }
}

fn contract_violation(idx: i32) -> ! {
    panic!("value at index {idx} is foreign userdata with no recognizable data state")
}

/// Reads the value at `idx` as `T`, whatever its state.
///
/// Baked objects are shared, not copied. A baked object of a different
/// type reads as `None`, like any other shape mismatch, where a stricter
/// binding would assert. Overload resolution and bulk dispatch rely on
/// this to move on to the next candidate instead of aborting the call.
pub fn read_as<T: Marshal>(state: &mut State, idx: i32) -> Option<Potential<T>> {
    let idx = state.abs_index(idx);
    match classify(state, idx) {
        DataState::Dynamic => traits::read::<T>(state, idx).map(Potential::Owned),
        DataState::PendingBake => realize_pending::<T>(state, idx).map(Potential::Shared),
        DataState::Indirect => {
            let key = marker_key(state, idx)?;
            state.registry_get(key);
            let target = state.pop_value();
            baked_cell::<T>(&target).map(Potential::Shared)
        }
        DataState::Baked => baked_cell::<T>(&state.value(idx)).map(Potential::Shared),
        DataState::Fail => contract_violation(idx),
    }
}

/// Turns the pending marker at `idx` into an indirect one by baking the
/// value it refers to as `T`.
///
/// The baked object replaces the dynamic value in the marker's registry
/// slot, so other markers sharing the slot see it too. If the value does not
/// read as `T`, nothing changes and `None` is returned.
pub fn realize_pending<T: Marshal>(state: &mut State, idx: i32) -> Option<Rc<RefCell<T>>> {
    let idx = state.abs_index(idx);
    let marker = state.to_userdata(idx)?;
    let key = marker.downcast_ref::<Marker>()?.0.key();

    state.registry_get(key);
    let read = read_as::<T>(state, -1);
    state.pop(1);
    let cell = read?.into_cell();

    push_baked_cell(state, cell.clone());
    if state.registry_set(key).is_err() {
        return None;
    }
    let indirect = marker_metatable::<IndirectTag>(state, "indirect");
    let previous = marker.set_metatable(Some(indirect));
    drop(previous);
    debug!(type_name = T::type_name(), slot = %key, "pending data baked");
    Some(cell)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

/// Pushes the baked counterpart of the value at `idx`.
///
/// Dynamic values whose metatable carries the native hook are converted
/// right away; anything else is parked in the registry behind a pending
/// marker and converted by the first typed read.
pub fn to_native(state: &mut State, idx: i32) -> Result<(), CallError> {
    let idx = state.abs_index(idx);
    match classify(state, idx) {
        DataState::Dynamic => {
            let value = state.value(idx);
            let hook = State::metatable_of(&value)
                .map(|mt| mt.borrow().get_str(TO_NATIVE_HOOK))
                .unwrap_or_default();
            if let Value::Function(hook) = hook {
                trace!("baking through the native hook");
                state.push(hook);
                state.push(value);
                state.call(1, 1)?;
                return Ok(());
            }

            state.push(value);
            let key = state.registry_ref();
            let guard = state.registry_guard(key);
            let mt = marker_metatable::<PendingTag>(state, "pending");
            state.push_userdata(Marker(guard), Some(mt));
            debug!(slot = %key, "data marked for baking");
            Ok(())
        }
        DataState::PendingBake => {
            warn!("data marked for baking twice");
            Err(CallError::AlreadyPending)
        }
        DataState::Baked | DataState::Indirect => {
            warn!("baked data marked for baking");
            Err(CallError::AlreadyBaked)
        }
        DataState::Fail => contract_violation(idx),
    }
}

/// Pushes the dynamic counterpart of the value at `idx`.
pub fn to_dynamic(state: &mut State, idx: i32) -> Result<(), CallError> {
    let idx = state.abs_index(idx);
    match classify(state, idx) {
        DataState::Dynamic => Err(CallError::AlreadyDynamic),
        DataState::PendingBake => {
            let key = marker_key(state, idx).ok_or(CallError::AlreadyDynamic)?;
            state.registry_get(key);
            debug!(slot = %key, "pending data unbaked");
            Ok(())
        }
        DataState::Baked => unbake_object(state, idx),
        DataState::Indirect => {
            let key = marker_key(state, idx).ok_or(CallError::AlreadyDynamic)?;
            state.registry_get(key);
            let target = state.top();
            let result = unbake_object(state, target);
            if result.is_ok() {
                state.remove(target);
            } else {
                state.pop(1);
            }
            result
        }
        DataState::Fail => contract_violation(idx),
    }
}

fn unbake_object(state: &mut State, idx: i32) -> Result<(), CallError> {
    let object = state.value(idx);
    let metatable = State::metatable_of(&object);
    let hook = metatable
        .as_ref()
        .map(|mt| mt.borrow().get_str(TO_DYNAMIC_HOOK))
        .unwrap_or_default();
    let Value::Function(hook) = hook else {
        let name = metatable
            .map(|mt| mt.borrow().get_str("__name"))
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| "unknown".to_owned());
        warn!(type_name = %name, "baked data without a dynamic form");
        return Err(CallError::NotUnbakeable(name));
    };
    state.push(hook);
    state.push(object);
    state.call(1, 1)?;
    debug!("baked data unbaked");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_table(state: &mut State, values: &[i64]) {
        state.new_table();
        for (i, v) in values.iter().enumerate() {
            state.push(*v);
            state.raw_set_i(-2, i as i64 + 1).unwrap();
        }
    }

    #[test]
    fn plain_values_are_dynamic() {
        let mut state = State::new();
        state.push(1);
        state.new_table();
        assert_eq!(classify(&state, 1), DataState::Dynamic);
        assert_eq!(classify(&state, 2), DataState::Dynamic);
    }

    #[test]
    fn userdata_without_metatable_fails_classification() {
        let mut state = State::new();
        state.push_userdata(7u8, None);
        assert_eq!(classify(&state, 1), DataState::Fail);
    }

    #[test]
    #[should_panic(expected = "no recognizable data state")]
    fn reading_foreign_userdata_is_a_contract_violation() {
        let mut state = State::new();
        state.push_userdata(7u8, None);
        let _ = read_as::<i64>(&mut state, 1);
    }

    #[test]
    fn baked_objects_are_shared_not_copied() {
        let mut state = State::new();
        push_baked(&mut state, vec![1i64, 2]);
        assert_eq!(classify(&state, 1), DataState::Baked);
        let Some(Potential::Shared(a)) = read_as::<Vec<i64>>(&mut state, 1) else {
            panic!("baked data must read as shared");
        };
        let Some(Potential::Shared(b)) = read_as::<Vec<i64>>(&mut state, 1) else {
            panic!("baked data must read as shared");
        };
        assert!(Rc::ptr_eq(&a, &b));
        assert!(read_as::<Vec<String>>(&mut state, 1).is_none());
    }

    #[test]
    fn pending_data_is_realized_once() {
        let mut state = State::new();
        int_table(&mut state, &[4, 5]);
        to_native(&mut state, 1).unwrap();
        assert_eq!(classify(&state, 2), DataState::PendingBake);
        let slots = state.registry_len();

        let first = realize_pending::<Vec<i64>>(&mut state, 2).unwrap();
        assert_eq!(*first.borrow(), vec![4, 5]);
        assert_eq!(classify(&state, 2), DataState::Indirect);
        assert_eq!(state.registry_len(), slots, "the slot is reused");

        let Some(Potential::Shared(again)) = read_as::<Vec<i64>>(&mut state, 2) else {
            panic!("indirect data must read as shared");
        };
        assert!(Rc::ptr_eq(&first, &again));
    }

    #[test]
    fn failed_realization_leaves_the_marker_pending() {
        let mut state = State::new();
        int_table(&mut state, &[4, 5]);
        to_native(&mut state, 1).unwrap();
        assert!(realize_pending::<Vec<String>>(&mut state, 2).is_none());
        assert_eq!(classify(&state, 2), DataState::PendingBake);
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn baking_twice_is_rejected() {
        let mut state = State::new();
        int_table(&mut state, &[1]);
        to_native(&mut state, 1).unwrap();
        assert_eq!(to_native(&mut state, 2), Err(CallError::AlreadyPending));
        push_baked(&mut state, 3i64);
        assert_eq!(to_native(&mut state, -1), Err(CallError::AlreadyBaked));
    }

    #[test]
    fn unbaking_pending_data_returns_the_original_value() {
        let mut state = State::new();
        int_table(&mut state, &[1, 2, 3]);
        to_native(&mut state, 1).unwrap();
        to_dynamic(&mut state, 2).unwrap();
        assert!(state.raw_equal(1, 3));
        assert_eq!(to_dynamic(&mut state, 3), Err(CallError::AlreadyDynamic));
    }

    #[test]
    fn unbaking_writes_a_fresh_dynamic_value() {
        let mut state = State::new();
        push_baked(&mut state, vec![7i64, 8]);
        to_dynamic(&mut state, 1).unwrap();
        assert!(state.is_table(2));
        assert_eq!(traits::read::<Vec<i64>>(&mut state, 2), Some(vec![7, 8]));
    }

    #[test]
    fn unbaking_indirect_data_goes_through_the_slot() {
        let mut state = State::new();
        int_table(&mut state, &[1, 2]);
        to_native(&mut state, 1).unwrap();
        let cell = realize_pending::<Vec<i64>>(&mut state, 2).unwrap();
        cell.borrow_mut().push(3);
        to_dynamic(&mut state, 2).unwrap();
        assert_eq!(state.top(), 3);
        assert_eq!(traits::read::<Vec<i64>>(&mut state, 3), Some(vec![1, 2, 3]));
    }

    struct Opaque;

    impl Marshal for Opaque {
        const CAPS: traits::Caps = traits::Caps::OPAQUE;
    }

    #[test]
    fn opaque_objects_cannot_be_unbaked() {
        let mut state = State::new();
        push_baked(&mut state, Opaque);
        let err = to_dynamic(&mut state, 1).unwrap_err();
        assert!(matches!(err, CallError::NotUnbakeable(ref name) if name.ends_with("Opaque")));
    }
}
