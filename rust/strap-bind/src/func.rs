//! Binding fixed-signature native functions.
//!
//! Any closure whose parameters implement [`Param`] and whose result
//! implements [`Return`] can be pushed as a runtime function. A call checks
//! the argument count, reads the arguments left to right, fills omitted
//! trailing arguments with their defaults, invokes the closure, pushes the
//! result and finally writes mutable arguments back into dynamic data.

use strap_rt::{Function, RuntimeError, State};
use tracing::trace;

use crate::errors::CallError;
use crate::param::{Param, Return, WriteBack};

/// Accepted argument counts of a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: usize,
}

impl Arity {
    /// Only a suffix of defaultable parameters may be omitted.
    pub fn from_defaultable(defaultable: &[bool]) -> Self {
        let max = defaultable.len();
        let optional = defaultable.iter().rev().take_while(|d| **d).count();
        Arity {
            min: max - optional,
            max,
        }
    }

    pub fn check(self, got: usize) -> Result<(), CallError> {
        if got < self.min || got > self.max {
            return Err(CallError::Arity {
                min: self.min,
                max: self.max,
                got,
            });
        }
        Ok(())
    }
}

/// A host closure callable through the runtime. `Marker` only serves to
/// tell the per-arity implementations apart.
pub trait NativeFn<Marker>: 'static {
    fn arity() -> Arity;

    /// Panics if the signature can never be called correctly.
    fn check_binding();

    /// Runs one call against the arguments of the current frame.
    fn call(&self, state: &mut State) -> Result<usize, CallError>;
}

fn read_arg<P: Param>(
    state: &mut State,
    position: usize,
    given: usize,
    write_backs: &mut Vec<WriteBack>,
) -> Result<P, CallError> {
    let arg = if position <= given {
        P::read(state, position as i32, write_backs)
    } else {
        P::default_value()
    };
    arg.ok_or(CallError::ArgRead { position })
}

macro_rules! impl_native_fn {
    ($($p:ident),*) => {
        impl<Func, Ret, $($p,)*> NativeFn<($($p,)* Ret,)> for Func
        where
            Func: Fn($($p),*) -> Ret + 'static,
            Ret: Return,
            $($p: Param,)*
        {
            fn arity() -> Arity {
                Arity::from_defaultable(&[$($p::DEFAULTABLE),*])
            }

            fn check_binding() {
                $($p::check_binding();)*
                Ret::check_binding();
            }

            #[allow(non_snake_case, unused_mut, unused_variables)]
            fn call(&self, state: &mut State) -> Result<usize, CallError> {
                let given = state.top() as usize;
                Self::arity().check(given)?;
                let mut write_backs: Vec<WriteBack> = Vec::new();
                let mut position = 0usize;
                $(
                    position += 1;
                    let $p = read_arg::<$p>(state, position, given, &mut write_backs)?;
                )*
                let pushed = (self)($($p),*).push_results(state)?;
                for write_back in write_backs {
                    write_back(state)?;
                }
                Ok(pushed)
            }
        }
    };
}

impl_native_fn!();
impl_native_fn!(A1);
impl_native_fn!(A1, A2);
impl_native_fn!(A1, A2, A3);
impl_native_fn!(A1, A2, A3, A4);
impl_native_fn!(A1, A2, A3, A4, A5);
impl_native_fn!(A1, A2, A3, A4, A5, A6);
impl_native_fn!(A1, A2, A3, A4, A5, A6, A7);
impl_native_fn!(A1, A2, A3, A4, A5, A6, A7, A8);

/// Runs `f`, cutting the frame back to its original height on failure.
fn attempt<M, F: NativeFn<M>>(f: &F, state: &mut State) -> Result<usize, CallError> {
    let top = state.top();
    let result = f.call(state);
    if result.is_err() {
        state.set_top(top);
    }
    result
}

/// Wraps `f` as a runtime function value.
///
/// # Panics
/// Panics if the signature is a binding defect, e.g. a mutable view over a
/// type that can be read from dynamic data but not emplaced back.
pub fn native_function<M, F: NativeFn<M>>(f: F) -> Function {
    F::check_binding();
    Function::new(move |s: &mut State| attempt(&f, s).map_err(RuntimeError::from))
}

/// Pushes `f` as a runtime function.
pub fn push_func<M, F: NativeFn<M>>(state: &mut State, f: F) {
    state.push(native_function(f));
}

type Candidate = Box<dyn Fn(&mut State) -> Result<usize, CallError>>;

/// Candidate signatures for one overloaded function, tried in order.
#[derive(Default)]
pub struct Overloads {
    candidates: Vec<Candidate>,
}

impl Overloads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<M, F: NativeFn<M>>(mut self, f: F) -> Self {
        F::check_binding();
        self.candidates.push(Box::new(move |s: &mut State| attempt(&f, s)));
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Pushes a function that calls the first candidate accepting its arguments.
///
/// A candidate is skipped when its argument count or an argument read does
/// not fit. Once a candidate has been invoked its outcome is final. When no
/// candidate fits, the error carries the last rejection.
pub fn push_overloaded_func(state: &mut State, overloads: Overloads) {
    assert!(!overloads.is_empty(), "an overloaded function needs at least one candidate");
    let candidates = overloads.candidates;
    state.push_function(move |s: &mut State| {
        let mut last = None;
        for (index, candidate) in candidates.iter().enumerate() {
            match candidate(s) {
                Ok(pushed) => {
                    trace!(overload = index, "overload selected");
                    return Ok(pushed);
                }
                Err(e) if e.is_mismatch() => {
                    trace!(overload = index, error = %e, "overload rejected");
                    last = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        let last = last.unwrap_or(CallError::Arity {
            min: 0,
            max: 0,
            got: s.top() as usize,
        });
        Err(CallError::NoMatchingOverload {
            last: Box::new(last),
        }
        .into())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_from_defaultable_suffix() {
        assert_eq!(
            Arity::from_defaultable(&[false, false]),
            Arity { min: 2, max: 2 }
        );
        assert_eq!(
            Arity::from_defaultable(&[false, true, true]),
            Arity { min: 1, max: 3 }
        );
        // A defaultable parameter followed by a required one is required too.
        assert_eq!(
            Arity::from_defaultable(&[true, false, true]),
            Arity { min: 2, max: 3 }
        );
        assert_eq!(Arity::from_defaultable(&[]), Arity { min: 0, max: 0 });
    }

    fn call_with(state: &mut State, args: &[i64]) -> Result<(), RuntimeError> {
        for a in args {
            state.push(*a);
        }
        state.call(args.len(), 1)
    }

    #[test]
    fn exact_arity_rejects_other_counts() {
        let mut state = State::new();
        for (count, ok) in [(0, false), (1, false), (2, true), (3, false)] {
            push_func(&mut state, |a: i64, b: i64| a + b);
            let args = vec![1; count];
            assert_eq!(call_with(&mut state, &args).is_ok(), ok, "{count} args");
            state.set_top(0);
        }
    }

    #[test]
    fn omitted_optional_arguments_use_defaults() {
        let mut state = State::new();
        push_func(&mut state, |a: i64, b: Option<i64>| a + b.unwrap_or(100));
        call_with(&mut state, &[1]).unwrap();
        assert_eq!(state.to_integer(-1), Some(101));

        push_func(&mut state, |a: i64, b: Option<i64>| a + b.unwrap_or(100));
        call_with(&mut state, &[1, 2]).unwrap();
        assert_eq!(state.to_integer(-1), Some(3));
    }

    #[test]
    fn failed_read_names_the_position() {
        let mut state = State::new();
        push_func(&mut state, |a: i64, b: String| format!("{a}{b}"));
        state.push(1);
        state.push(2);
        let err = state.call(2, 1).unwrap_err();
        assert_eq!(err.to_string(), "Failed reading argument #2.");
        assert_eq!(state.top(), 0);
    }

    #[test]
    fn baked_argument_of_another_type_moves_to_the_next_overload() {
        use crate::data::push_baked;
        use crate::param::Ref;

        let mut state = State::new();
        let overloads = Overloads::new()
            .with(|words: Ref<Vec<String>>| words.len() as i64 * 100)
            .with(|numbers: Ref<Vec<i64>>| numbers.iter().sum::<i64>());
        push_overloaded_func(&mut state, overloads);
        push_baked(&mut state, vec![2i64, 3]);
        state.call(1, 1).unwrap();
        assert_eq!(state.to_integer(-1), Some(5));
    }

    #[test]
    fn custom_errors_are_not_overload_mismatches() {
        let mut state = State::new();
        let overloads = Overloads::new()
            .with(|_: i64| -> Result<i64, CallError> { Err(CallError::msg("negative input")) })
            .with(|a: i64| a);
        push_overloaded_func(&mut state, overloads);
        state.push(-1);
        let err = state.call(1, 1).unwrap_err();
        assert_eq!(err.to_string(), "negative input");
    }
}
