//! Conversions for the standard vocabulary types.
//!
//! Encodings, which scripts rely on:
//! - numbers and strings map to the runtime's own scalars,
//! - `[T; N]`, `Vec<T>` and tuples are 1-indexed sequences,
//! - maps are key/value tables whose keys must decode to distinct host keys,
//! - `Option<T>` is nil or the encoding of `T`,
//! - [`Complex`] is the pair `{re, im}`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::{Add, Mul, Sub};

use num_traits::NumCast;
use strap_rt::{RuntimeError, RuntimeResult, State, Value};

use crate::traits::{self, clear_table, read_array_up_to, read_array_unlimited, Caps, Marshal};

// ---------------------------------------------------------------------------
// Scalars
// ---------------------------------------------------------------------------

macro_rules! impl_integer {
    ($($t:ty),*) => {$(
        impl Marshal for $t {
            const CAPS: Caps = Caps::SCALAR;

            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn read(state: &mut State, idx: i32) -> Option<Self> {
                state.to_integer(idx).and_then(<$t as NumCast>::from)
            }

            /// Values outside the `i64` range are refused rather than
            /// rounded, so whatever is written reads back unchanged.
            fn write(&self, state: &mut State) -> RuntimeResult<()> {
                let i = <i64 as NumCast>::from(*self).ok_or_else(|| {
                    RuntimeError::IntegerOutOfRange {
                        value: self.to_string(),
                        ty: stringify!($t),
                    }
                })?;
                state.push(Value::Integer(i));
                Ok(())
            }
        }
    )*};
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($t:ty),*) => {$(
        impl Marshal for $t {
            const CAPS: Caps = Caps::SCALAR;

            fn type_name() -> &'static str {
                stringify!($t)
            }

            fn read(state: &mut State, idx: i32) -> Option<Self> {
                state.to_number(idx).and_then(<$t as NumCast>::from)
            }

            fn write(&self, state: &mut State) -> RuntimeResult<()> {
                state.push(Value::Number(*self as f64));
                Ok(())
            }
        }
    )*};
}

impl_float!(f32, f64);

impl Marshal for bool {
    const CAPS: Caps = Caps::SCALAR;

    fn type_name() -> &'static str {
        "bool"
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        state.to_boolean(idx)
    }

    fn write(&self, state: &mut State) -> RuntimeResult<()> {
        state.push(*self);
        Ok(())
    }
}

impl Marshal for String {
    const CAPS: Caps = Caps::SCALAR;

    fn type_name() -> &'static str {
        "String"
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        state.to_str(idx).map(|s| s.to_string())
    }

    fn write(&self, state: &mut State) -> RuntimeResult<()> {
        state.push(self.as_str());
        Ok(())
    }
}

/// Raw passthrough: any value, including nil.
impl Marshal for Value {
    const CAPS: Caps = Caps::SCALAR;

    fn type_name() -> &'static str {
        "Value"
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        Some(state.value(idx))
    }

    fn write(&self, state: &mut State) -> RuntimeResult<()> {
        state.push(self.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

/// Stores `value` at `t[index]` for the table at the absolute index `idx`.
fn set_element<T: Marshal>(state: &mut State, idx: i32, index: i64, value: &T) -> RuntimeResult<()> {
    value.write(state)?;
    state.raw_set_i(idx, index)
}

/// Clears `t[from]`, `t[from + 1]`, ... up to the first nil.
fn clear_tail(state: &mut State, idx: i32, from: i64) -> RuntimeResult<()> {
    let mut i = from;
    loop {
        state.raw_get_i(idx, i)?;
        let present = !state.is_nil(-1);
        state.pop(1);
        if !present {
            return Ok(());
        }
        state.push_nil();
        state.raw_set_i(idx, i)?;
        i += 1;
    }
}

impl<T: Marshal, const N: usize> Marshal for [T; N] {
    const CAPS: Caps = Caps {
        read: T::CAPS.read,
        write: false,
        emplace: T::CAPS.is_writable(),
        default: false,
    };

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let mut items = Vec::with_capacity(N);
        let count = read_array_up_to(state, idx, N, |s, _| match traits::read::<T>(s, -1) {
            Some(v) => {
                items.push(v);
                true
            }
            None => false,
        })?;
        if count != N {
            return None;
        }
        state.raw_get_i(idx, N as i64 + 1).ok()?;
        let exact = state.is_nil(-1);
        state.pop(1);
        if !exact {
            return None;
        }
        items.try_into().ok()
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        for (i, item) in self.iter().enumerate() {
            set_element(state, idx, i as i64 + 1, item)?;
        }
        Ok(())
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    const CAPS: Caps = Caps {
        read: T::CAPS.read,
        write: false,
        emplace: T::CAPS.is_writable(),
        default: false,
    };

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let mut items = Vec::new();
        read_array_unlimited(state, idx, |s, _| match traits::read::<T>(s, -1) {
            Some(v) => {
                items.push(v);
                true
            }
            None => false,
        })?;
        Some(items)
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        for (i, item) in self.iter().enumerate() {
            set_element(state, idx, i as i64 + 1, item)?;
        }
        clear_tail(state, idx, self.len() as i64 + 1)
    }
}

// ---------------------------------------------------------------------------
// Maps
// ---------------------------------------------------------------------------

/// Walks every entry of the table at `idx`, decoding keys and values.
/// `insert` returns `false` when a decoded key was already present.
fn read_entries<K, V, F>(state: &mut State, idx: i32, mut insert: F) -> Option<()>
where
    K: Marshal,
    V: Marshal,
    F: FnMut(K, V) -> bool,
{
    if !state.is_table(idx) {
        return None;
    }
    state.push_nil();
    loop {
        match state.next(idx) {
            Ok(true) => {}
            Ok(false) => return Some(()),
            Err(_) => return None,
        }
        let entry = traits::read::<K>(state, -2).zip(traits::read::<V>(state, -1));
        state.pop(1);
        let accepted = match entry {
            Some((k, v)) => insert(k, v),
            None => false,
        };
        if !accepted {
            state.pop(1);
            return None;
        }
    }
}

fn emplace_entries<'a, K, V, I>(state: &mut State, idx: i32, entries: I) -> RuntimeResult<()>
where
    K: Marshal + 'a,
    V: Marshal + 'a,
    I: Iterator<Item = (&'a K, &'a V)>,
{
    clear_table(state, idx);
    for (k, v) in entries {
        k.write(state)?;
        v.write(state)?;
        state.set_table(idx)?;
    }
    Ok(())
}

impl<K: Marshal + Ord, V: Marshal> Marshal for BTreeMap<K, V> {
    const CAPS: Caps = Caps {
        read: K::CAPS.read && V::CAPS.read,
        write: false,
        emplace: K::CAPS.is_writable() && V::CAPS.is_writable(),
        default: false,
    };

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let mut map = BTreeMap::new();
        read_entries(state, idx, |k, v| map.insert(k, v).is_none())?;
        Some(map)
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        emplace_entries(state, idx, self.iter())
    }
}

impl<K: Marshal + Eq + Hash, V: Marshal> Marshal for HashMap<K, V> {
    const CAPS: Caps = Caps {
        read: K::CAPS.read && V::CAPS.read,
        write: false,
        emplace: K::CAPS.is_writable() && V::CAPS.is_writable(),
        default: false,
    };

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let mut map = HashMap::new();
        read_entries(state, idx, |k, v| map.insert(k, v).is_none())?;
        Some(map)
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        emplace_entries(state, idx, self.iter())
    }
}

// ---------------------------------------------------------------------------
// Option
// ---------------------------------------------------------------------------

/// Written whole, never emplaced: nil has no table to refill, so a mutable
/// view over an optional argument is refused when the function is bound.
impl<T: Marshal> Marshal for Option<T> {
    const CAPS: Caps = Caps {
        read: T::CAPS.read,
        write: T::CAPS.is_writable(),
        emplace: false,
        default: true,
    };

    fn type_name() -> &'static str {
        T::type_name()
    }

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        if state.is_nil(idx) {
            Some(None)
        } else {
            traits::read::<T>(state, idx).map(Some)
        }
    }

    fn write(&self, state: &mut State) -> RuntimeResult<()> {
        match self {
            Some(v) => v.write(state),
            None => {
                state.push_nil();
                Ok(())
            }
        }
    }

    fn default_value() -> Option<Self> {
        Some(None)
    }
}

// ---------------------------------------------------------------------------
// Tuples
// ---------------------------------------------------------------------------

macro_rules! impl_tuple {
    ($($t:ident $i:tt),+) => {
        impl<$($t: Marshal),+> Marshal for ($($t,)+) {
            const CAPS: Caps = Caps {
                read: true $(&& $t::CAPS.read)+,
                write: false,
                emplace: true $(&& $t::CAPS.is_writable())+,
                default: false,
            };

            fn read(state: &mut State, idx: i32) -> Option<Self> {
                if !state.is_table(idx) {
                    return None;
                }
                Some(($(
                    {
                        state.raw_get_i(idx, $i + 1).ok()?;
                        let item = traits::read::<$t>(state, -1);
                        state.pop(1);
                        item?
                    },
                )+))
            }

            fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
                $(set_element(state, idx, $i + 1, &self.$i)?;)+
                Ok(())
            }
        }
    };
}

impl_tuple!(A 0, B 1);
impl_tuple!(A 0, B 1, C 2);
impl_tuple!(A 0, B 1, C 2, D 3);

// ---------------------------------------------------------------------------
// Complex numbers
// ---------------------------------------------------------------------------

/// A complex number, encoded as `{re, im}`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex<T> {
    pub re: T,
    pub im: T,
}

impl<T> Complex<T> {
    pub fn new(re: T, im: T) -> Self {
        Self { re, im }
    }
}

impl<T: Add<Output = T>> Add for Complex<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Complex::new(self.re + rhs.re, self.im + rhs.im)
    }
}

impl<T: Sub<Output = T>> Sub for Complex<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Complex::new(self.re - rhs.re, self.im - rhs.im)
    }
}

impl<T: Copy + Add<Output = T> + Sub<Output = T> + Mul<Output = T>> Mul for Complex<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Complex::new(
            self.re * rhs.re - self.im * rhs.im,
            self.re * rhs.im + self.im * rhs.re,
        )
    }
}

impl<T: Marshal> Marshal for Complex<T> {
    const CAPS: Caps = Caps {
        read: T::CAPS.read,
        write: false,
        emplace: T::CAPS.is_writable(),
        default: false,
    };

    fn read(state: &mut State, idx: i32) -> Option<Self> {
        let (re, im) = <(T, T)>::read(state, idx)?;
        state.raw_get_i(idx, 3).ok()?;
        let exact = state.is_nil(-1);
        state.pop(1);
        exact.then_some(Complex { re, im })
    }

    fn emplace(&self, state: &mut State, idx: i32) -> RuntimeResult<()> {
        set_element(state, idx, 1, &self.re)?;
        set_element(state, idx, 2, &self.im)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
