//! Records: host structs exchanged as tables keyed by field name.
//!
//! ```ignore
//! struct Person { name: String, age: u32 }
//! impl_record!(Person { name, age }, methods = person_methods);
//!
//! fn person_methods(m: &mut Methods<Person>) {
//!     m.add("is_mature", |p: Ref<Person>| p.age >= 18);
//! }
//! ```
//!
//! Emplacing a record attaches the baked metatable of its type, so methods
//! are callable on the table too and baking it goes through the native hook.

use std::marker::PhantomData;

use strap_rt::{Function, RuntimeResult, State};

use crate::data;
use crate::func::{native_function, NativeFn};
use crate::traits::{self, Marshal};

/// Methods registered for objects of type `T`.
///
/// The receiver is the first parameter, usually `Ref<T>` or `Mut<T>`.
pub struct Methods<T> {
    entries: Vec<(&'static str, Function)>,
    _owner: PhantomData<fn(T)>,
}

impl<T: Marshal> Methods<T> {
    pub(crate) fn new() -> Self {
        Methods {
            entries: Vec::new(),
            _owner: PhantomData,
        }
    }

    pub fn add<M, F: NativeFn<M>>(&mut self, name: &'static str, f: F) -> &mut Self {
        self.entries.push((name, native_function(f)));
        self
    }

    pub(crate) fn into_entries(self) -> Vec<(&'static str, Function)> {
        self.entries
    }
}

/// Reads field `name` of the table at `idx` without consulting `__index`.
pub fn read_field<F: Marshal>(state: &mut State, idx: i32, name: &str) -> Option<F> {
    let table = state.to_table(idx)?;
    let value = table.borrow().get_str(name);
    state.push(value);
    let field = traits::read::<F>(state, -1);
    state.pop(1);
    field
}

/// Writes `value` into field `name` of the table at `idx`.
pub fn emplace_field<F: Marshal>(
    state: &mut State,
    idx: i32,
    name: &str,
    value: &F,
) -> RuntimeResult<()> {
    let idx = state.abs_index(idx);
    value.write(state)?;
    state.set_field(idx, name)
}

/// Gives the table at `idx` the baked metatable of `T`.
pub fn attach_metatable<T: Marshal>(state: &mut State, idx: i32) -> RuntimeResult<()> {
    let idx = state.abs_index(idx);
    let mt = data::baked_metatable::<T>(state);
    if let Some(table) = state.to_table(idx) {
        let previous = table.borrow_mut().set_metatable(Some(mt));
        drop(previous);
    }
    Ok(())
}

/// Implements [`Marshal`](crate::Marshal) for a struct as a record.
///
/// Every field type must itself implement `Marshal` with read and write
/// support. Fields not listed are not allowed; the struct literal in the
/// generated `read` must be complete.
#[macro_export]
macro_rules! impl_record {
    ($ty:ident { $($field:ident),* $(,)? } $(, methods = $methods:path)? $(,)?) => {
        impl $crate::Marshal for $ty {
            const CAPS: $crate::Caps = $crate::Caps::CONTAINER;

            fn type_name() -> &'static str {
                stringify!($ty)
            }

            fn read(state: &mut $crate::strap_rt::State, idx: i32) -> Option<Self> {
                if !state.is_table(idx) {
                    return None;
                }
                Some($ty {
                    $($field: $crate::record::read_field(state, idx, stringify!($field))?,)*
                })
            }

            fn emplace(
                &self,
                state: &mut $crate::strap_rt::State,
                idx: i32,
            ) -> $crate::strap_rt::RuntimeResult<()> {
                $($crate::record::emplace_field(state, idx, stringify!($field), &self.$field)?;)*
                $crate::record::attach_metatable::<Self>(state, idx)
            }

            $(
                fn methods(methods: &mut $crate::Methods<Self>) {
                    $methods(methods)
                }
            )?
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{Mut, Ref};

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: f64,
        y: f64,
    }

    fn point_methods(m: &mut Methods<Point>) {
        m.add("norm", |p: Ref<Point>| (p.x * p.x + p.y * p.y).sqrt());
        m.add("scale", |mut p: Mut<Point>, k: f64| {
            p.x *= k;
            p.y *= k;
        });
    }

    crate::impl_record!(Point { x, y }, methods = point_methods);

    #[test]
    fn records_round_trip_through_tables() {
        let mut state = State::new();
        traits::write(&mut state, &Point { x: 3.0, y: 4.0 }).unwrap();
        assert!(state.is_table(1));
        let back = traits::read::<Point>(&mut state, 1).unwrap();
        assert_eq!(back, Point { x: 3.0, y: 4.0 });
    }

    #[test]
    fn missing_fields_fail_the_read() {
        let mut state = State::new();
        state.new_table();
        state.push(1.0);
        state.set_field(1, "x").unwrap();
        assert!(traits::read::<Point>(&mut state, 1).is_none());
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn methods_are_reachable_from_the_dynamic_form() {
        let mut state = State::new();
        traits::write(&mut state, &Point { x: 3.0, y: 4.0 }).unwrap();

        state.get_field(1, "norm").unwrap();
        state.push_value(1);
        state.call(1, 1).unwrap();
        assert_eq!(state.to_number(-1), Some(5.0));
        state.pop(1);

        state.get_field(1, "scale").unwrap();
        state.push_value(1);
        state.push(2.0);
        state.call(2, 0).unwrap();
        let scaled = traits::read::<Point>(&mut state, 1).unwrap();
        assert_eq!(scaled, Point { x: 6.0, y: 8.0 });
    }
}
