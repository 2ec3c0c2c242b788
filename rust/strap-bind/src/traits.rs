//! The per-type conversion contract between host values and runtime values.
//!
//! Every host type that crosses the boundary implements [`Marshal`]. What a
//! type can do is declared up front in [`Marshal::CAPS`]; binding code checks
//! those flags when a function is registered instead of failing per call.

use strap_rt::{RuntimeResult, State, Value};

use crate::record::Methods;

/// Capabilities of a [`Marshal`] implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caps {
    pub read: bool,
    pub write: bool,
    pub emplace: bool,
    pub default: bool,
}

impl Caps {
    /// Only usable as a baked object.
    pub const OPAQUE: Caps = Caps {
        read: false,
        write: false,
        emplace: false,
        default: false,
    };
    /// Scalars: read and written whole, nothing to update in place.
    pub const SCALAR: Caps = Caps {
        read: true,
        write: true,
        emplace: false,
        default: false,
    };
    /// Containers: their tables can be refilled in place.
    pub const CONTAINER: Caps = Caps {
        read: true,
        write: false,
        emplace: true,
        default: false,
    };

    pub const fn with_default(self) -> Caps {
        Caps {
            default: true,
            ..self
        }
    }

    pub const fn is_writable(self) -> bool {
        self.write || self.emplace
    }

    pub const fn is_readable(self) -> bool {
        self.read
    }

    pub const fn is_defaultable_readable(self) -> bool {
        self.read && self.default
    }
}

/// Conversion between a host type and its dynamic representation.
///
/// Implementations override the methods matching the flags in `CAPS`; the
/// remaining defaults are never reached from checked binding code.
pub trait Marshal: Sized + 'static {
    const CAPS: Caps;

    /// Name used in diagnostics.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Decodes the value at the absolute index `idx`. Returns `None` on a
    /// shape mismatch and leaves the stack as it found it either way.
    fn read(_state: &mut State, _idx: i32) -> Option<Self> {
        None
    }

    /// Pushes a fresh dynamic representation of `self`.
    ///
    /// Types without a direct encoding get a new table filled by `emplace`.
    fn write(&self, state: &mut State) -> RuntimeResult<()> {
        assert!(
            Self::CAPS.emplace,
            "{} defines neither write nor emplace",
            Self::type_name()
        );
        state.new_table();
        let idx = state.top();
        self.emplace(state, idx)
    }

    /// Overwrites the container at the absolute index `idx` with `self`.
    fn emplace(&self, _state: &mut State, _idx: i32) -> RuntimeResult<()> {
        panic!("{} does not support emplace", Self::type_name())
    }

    /// Value used for an omitted trailing argument.
    fn default_value() -> Option<Self> {
        None
    }

    /// Registers methods callable on objects of this type.
    fn methods(_methods: &mut Methods<Self>) {}
}

// ---------------------------------------------------------------------------
// Free helpers
// ---------------------------------------------------------------------------

/// Reads the value at `idx` (any index form) as `T`.
pub fn read<T: Marshal>(state: &mut State, idx: i32) -> Option<T> {
    if !T::CAPS.read {
        return None;
    }
    let idx = state.abs_index(idx);
    let top = state.top();
    let value = T::read(state, idx);
    debug_assert_eq!(
        state.top(),
        top,
        "reading {} left the stack unbalanced",
        T::type_name()
    );
    value
}

/// Pushes the dynamic representation of `value`.
pub fn write<T: Marshal>(state: &mut State, value: &T) -> RuntimeResult<()> {
    value.write(state)
}

/// Overwrites the container at `idx` (any index form) with `value`.
pub fn emplace<T: Marshal>(state: &mut State, value: &T, idx: i32) -> RuntimeResult<()> {
    let idx = state.abs_index(idx);
    value.emplace(state, idx)
}

/// Reads the sequence `t[1]`, `t[2]`, ... up to the first nil, handing each
/// element (pushed on top of the stack) to `element` together with its
/// 0-based position. Returns the number of elements, or `None` if `idx` is
/// not a table or `element` rejects one.
pub fn read_array_unlimited<F>(state: &mut State, idx: i32, element: F) -> Option<usize>
where
    F: FnMut(&mut State, usize) -> bool,
{
    read_array_up_to(state, idx, usize::MAX, element)
}

/// Like [`read_array_unlimited`] but stops after `max` elements.
pub fn read_array_up_to<F>(state: &mut State, idx: i32, max: usize, mut element: F) -> Option<usize>
where
    F: FnMut(&mut State, usize) -> bool,
{
    let idx = state.abs_index(idx);
    if !state.is_table(idx) {
        return None;
    }
    for i in 0..max {
        state.raw_get_i(idx, i as i64 + 1).ok()?;
        if state.is_nil(-1) {
            state.pop(1);
            return Some(i);
        }
        let accepted = element(state, i);
        state.pop(1);
        if !accepted {
            return None;
        }
    }
    Some(max)
}

/// Removes every entry of the table at `idx`. Non-tables are left alone.
pub fn clear_table(state: &mut State, idx: i32) {
    if let Value::Table(t) = state.value(idx) {
        let entries = t.borrow_mut().take_entries();
        drop(entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caps_predicates() {
        assert!(Caps::SCALAR.is_writable());
        assert!(Caps::CONTAINER.is_writable());
        assert!(!Caps::OPAQUE.is_writable());
        assert!(!Caps::SCALAR.is_defaultable_readable());
        assert!(Caps::SCALAR.with_default().is_defaultable_readable());
        assert!(!Caps::OPAQUE.with_default().is_defaultable_readable());
    }

    fn int_sequence(state: &mut State, values: &[i64]) {
        state.new_table();
        for (i, v) in values.iter().enumerate() {
            state.push(*v);
            state.raw_set_i(-2, i as i64 + 1).unwrap();
        }
    }

    #[test]
    fn array_readers_stop_at_first_nil() {
        let mut state = State::new();
        int_sequence(&mut state, &[1, 2, 3]);
        let mut sum = 0;
        let count = read_array_unlimited(&mut state, -1, |s, _| {
            sum += s.to_integer(-1).unwrap_or(0);
            true
        });
        assert_eq!(count, Some(3));
        assert_eq!(sum, 6);
        assert_eq!(state.top(), 1);
        assert_eq!(read_array_up_to(&mut state, 1, 2, |_, _| true), Some(2));
    }

    #[test]
    fn array_readers_reject_non_tables_and_bad_elements() {
        let mut state = State::new();
        state.push(5);
        assert_eq!(read_array_unlimited(&mut state, 1, |_, _| true), None);
        int_sequence(&mut state, &[1, 2]);
        assert_eq!(read_array_unlimited(&mut state, 2, |_, i| i == 0), None);
        assert_eq!(state.top(), 2);
    }

    #[test]
    fn clear_table_empties_in_place() {
        let mut state = State::new();
        int_sequence(&mut state, &[4, 5]);
        state.push_value(1);
        clear_table(&mut state, 2);
        assert_eq!(state.raw_len(1), 0);
    }
}
