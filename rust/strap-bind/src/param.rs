//! How native function parameters and results cross the boundary.
//!
//! A parameter is taken by value (`T`), through a shared view ([`Ref<T>`])
//! or through a mutable view ([`Mut<T>`]). Views borrow the baked object
//! itself when the argument is baked and a private copy otherwise; a mutable
//! view over a copy is emplaced back into the argument after the call.

use std::cell::{self, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use strap_rt::{RuntimeError, RuntimeResult, State};

use crate::data::{self, Baked, Potential};
use crate::errors::CallError;
use crate::traits::Marshal;

/// Deferred update of a dynamic argument, run once the call has returned.
pub type WriteBack = Box<dyn FnOnce(&mut State) -> RuntimeResult<()>>;

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

/// Shared view of an argument.
pub struct Ref<T: 'static> {
    // Declared before `cell` so the borrow ends before the cell can go.
    guard: cell::Ref<'static, T>,
    cell: Rc<RefCell<T>>,
}

impl<T: 'static> Ref<T> {
    /// Borrows `cell`; fails if it is currently mutably borrowed.
    pub fn new(cell: Rc<RefCell<T>>) -> Option<Self> {
        let guard = cell.try_borrow().ok()?;
        // SAFETY: the guard points into the heap allocation owned by `cell`.
        // That allocation does not move when the `Rc` does, and the struct
        // keeps `cell` alive until after `guard` is dropped.
        let guard = unsafe { std::mem::transmute::<cell::Ref<'_, T>, cell::Ref<'static, T>>(guard) };
        Some(Self { guard, cell })
    }

    /// Whether this view and `other` look at the same object.
    pub fn ptr_eq(&self, other: &Rc<RefCell<T>>) -> bool {
        Rc::ptr_eq(&self.cell, other)
    }
}

impl<T> Deref for Ref<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Ref").field(&*self.guard).finish()
    }
}

/// Mutable view of an argument.
pub struct Mut<T: 'static> {
    // Declared before `cell` so the borrow ends before the cell can go.
    guard: cell::RefMut<'static, T>,
    cell: Rc<RefCell<T>>,
}

impl<T: 'static> Mut<T> {
    /// Borrows `cell` mutably; fails if it is already borrowed.
    pub fn new(cell: Rc<RefCell<T>>) -> Option<Self> {
        let guard = cell.try_borrow_mut().ok()?;
        // SAFETY: same reasoning as `Ref::new`; the exclusive borrow flag is
        // held for as long as the view exists.
        let guard =
            unsafe { std::mem::transmute::<cell::RefMut<'_, T>, cell::RefMut<'static, T>>(guard) };
        Some(Self { guard, cell })
    }

    pub fn ptr_eq(&self, other: &Rc<RefCell<T>>) -> bool {
        Rc::ptr_eq(&self.cell, other)
    }
}

impl<T> Deref for Mut<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Mut<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for Mut<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Mut").field(&*self.guard).finish()
    }
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

pub trait Param: Sized + 'static {
    /// May be omitted from the end of an argument list.
    const DEFAULTABLE: bool;

    fn type_name() -> &'static str;

    /// Registration-time validation; panics on a binding defect.
    fn check_binding() {}

    /// Reads the argument at the absolute index `idx`, queueing any update
    /// that has to be written back once the call returns.
    fn read(state: &mut State, idx: i32, write_backs: &mut Vec<WriteBack>) -> Option<Self>;

    fn default_value() -> Option<Self>;
}

impl<T: Marshal + Clone> Param for T {
    const DEFAULTABLE: bool = T::CAPS.is_defaultable_readable();

    fn type_name() -> &'static str {
        T::type_name()
    }

    fn read(state: &mut State, idx: i32, _write_backs: &mut Vec<WriteBack>) -> Option<Self> {
        match data::read_as::<T>(state, idx)? {
            Potential::Owned(v) => Some(v),
            Potential::Shared(cell) => cell.try_borrow().ok().map(|v| v.clone()),
        }
    }

    fn default_value() -> Option<Self> {
        T::default_value()
    }
}

impl<T: Marshal> Param for Ref<T> {
    const DEFAULTABLE: bool = T::CAPS.is_defaultable_readable();

    fn type_name() -> &'static str {
        T::type_name()
    }

    fn read(state: &mut State, idx: i32, _write_backs: &mut Vec<WriteBack>) -> Option<Self> {
        Ref::new(data::read_as::<T>(state, idx)?.into_cell())
    }

    fn default_value() -> Option<Self> {
        Ref::new(Rc::new(RefCell::new(T::default_value()?)))
    }
}

impl<T: Marshal> Param for Mut<T> {
    const DEFAULTABLE: bool = T::CAPS.is_defaultable_readable();

    fn type_name() -> &'static str {
        T::type_name()
    }

    /// Types readable from dynamic data must be able to write changes back
    /// into it. Types that only exist baked are always mutated in place.
    fn check_binding() {
        assert!(
            T::CAPS.emplace || !T::CAPS.read,
            "An argument which is taken by mutable reference must support emplace.\n\
             Argument type: {}\n\
             Alternatively, pass the argument as baked data, not as dynamic data.",
            T::type_name()
        );
    }

    fn read(state: &mut State, idx: i32, write_backs: &mut Vec<WriteBack>) -> Option<Self> {
        let potential = data::read_as::<T>(state, idx)?;
        let owned = potential.is_owned();
        let cell = potential.into_cell();
        if owned {
            let target = cell.clone();
            write_backs.push(Box::new(move |s: &mut State| {
                let value = target.try_borrow().map_err(|_| {
                    RuntimeError::call(format!(
                        "Argument #{idx} is still borrowed after the call; \
                         its changes cannot be written back."
                    ))
                })?;
                value.emplace(s, idx)
            }));
        }
        Mut::new(cell)
    }

    fn default_value() -> Option<Self> {
        Mut::new(Rc::new(RefCell::new(T::default_value()?)))
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

pub trait Return: 'static {
    fn check_binding() {}

    /// Pushes the results and returns how many were pushed.
    fn push_results(self, state: &mut State) -> Result<usize, CallError>;
}

impl Return for () {
    fn push_results(self, _state: &mut State) -> Result<usize, CallError> {
        Ok(0)
    }
}

impl<T: Marshal> Return for T {
    fn check_binding() {
        assert!(
            T::CAPS.is_writable(),
            "Resulting type {} is not writable to the runtime.",
            T::type_name()
        );
    }

    fn push_results(self, state: &mut State) -> Result<usize, CallError> {
        self.write(state)?;
        Ok(1)
    }
}

impl<T: Marshal> Return for Baked<T> {
    fn push_results(self, state: &mut State) -> Result<usize, CallError> {
        data::push_baked(state, self.0);
        Ok(1)
    }
}

impl<R: Return> Return for Result<R, CallError> {
    fn check_binding() {
        R::check_binding();
    }

    fn push_results(self, state: &mut State) -> Result<usize, CallError> {
        self?.push_results(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn views_share_the_cell() {
        let cell = Rc::new(RefCell::new(5));
        let view = Ref::new(cell.clone()).unwrap();
        assert_eq!(*view, 5);
        assert!(view.ptr_eq(&cell));
        assert!(Mut::new(cell.clone()).is_none(), "shared borrow is held");
        drop(view);

        let mut m = Mut::new(cell.clone()).unwrap();
        *m += 1;
        assert!(Ref::new(cell.clone()).is_none(), "exclusive borrow is held");
        drop(m);
        assert_eq!(*cell.borrow(), 6);
    }

    #[test]
    fn view_outlives_other_handles() {
        let cell = Rc::new(RefCell::new(String::from("kept")));
        let view = Ref::new(cell).unwrap();
        assert_eq!(view.as_str(), "kept");
    }

    #[test]
    fn defaults_follow_the_marshal_contract() {
        assert!(<Option<i32> as Param>::DEFAULTABLE);
        assert!(!<i32 as Param>::DEFAULTABLE);
        assert!(<Ref<Option<i32>> as Param>::DEFAULTABLE);
        assert!(<i32 as Param>::default_value().is_none());
        assert_eq!(<Option<i32> as Param>::default_value(), Some(None));
    }

    #[test]
    fn owned_mutable_arguments_are_written_back() {
        let mut state = State::new();
        crate::traits::write(&mut state, &vec![1i32, 2]).unwrap();
        let mut write_backs = Vec::new();
        let mut v = <Mut<Vec<i32>> as Param>::read(&mut state, 1, &mut write_backs).unwrap();
        v.push(3);
        drop(v);
        assert_eq!(write_backs.len(), 1);
        for wb in write_backs {
            wb(&mut state).unwrap();
        }
        assert_eq!(state.raw_len(1), 3);
    }

    #[test]
    #[should_panic(expected = "must support emplace")]
    fn mutable_scalars_are_rejected_at_binding() {
        <Mut<i32> as Param>::check_binding();
    }

    #[test]
    #[should_panic(expected = "must support emplace")]
    fn mutable_optionals_are_rejected_at_binding() {
        <Mut<Option<Vec<i64>>> as Param>::check_binding();
    }

    #[test]
    fn optional_views_stay_shared() {
        <Ref<Option<Vec<i64>>> as Param>::check_binding();
        <Option<Vec<i64>> as Param>::check_binding();
    }

    #[test]
    fn held_mutable_argument_fails_the_write_back() {
        let mut state = State::new();
        crate::traits::write(&mut state, &vec![1i32]).unwrap();
        let mut write_backs = Vec::new();
        let mut kept = <Mut<Vec<i32>> as Param>::read(&mut state, 1, &mut write_backs).unwrap();
        kept.push(2);
        let write_back = write_backs.pop().unwrap();
        let err = write_back(&mut state).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Argument #1 is still borrowed after the call; its changes cannot be written back."
        );
        drop(kept);
        assert_eq!(state.raw_len(1), 1);
    }

    #[test]
    fn results_do_not_shadow_inherent_push() {
        let mut items: Vec<usize> = Vec::new();
        items.push(1);
        let mut text = String::from("a");
        text.push('b');
        assert_eq!(items, [1]);
        assert_eq!(text, "ab");
        let mut state = State::new();
        assert_eq!(Return::push_results(vec![1i64, 2], &mut state).unwrap(), 1);
        assert_eq!(state.raw_len(1), 2);
    }
}
