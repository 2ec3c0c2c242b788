//! Shared fixtures for the strap benchmarks.
//!
//! Each fixture returns a state with the function under test bound to a
//! global, so the measured loop only pays for argument traffic and dispatch.

use strap_bind::strap_rt::{RuntimeResult, State, Value};
use strap_bind::{push_bulk_func, push_func, push_overloaded_func, traits};
use strap_demo::{bindings, linalg};

pub const TARGET: &str = "target";

fn bound(push: impl FnOnce(&mut State)) -> State {
    let mut state = State::new();
    push(&mut state);
    state.set_global(TARGET);
    state
}

pub fn average_state() -> State {
    bound(|s| push_func(s, bindings::average))
}

pub fn plus_state() -> State {
    bound(|s| push_overloaded_func(s, bindings::plus()))
}

pub fn mul_state() -> State {
    bound(|s| push_bulk_func(s, linalg::mul()))
}

pub fn sum_state() -> State {
    bound(|s| push_func(s, |v: strap_bind::Ref<Vec<i64>>| v.iter().sum::<i64>()))
}

/// Encodes `value` as fresh dynamic data.
pub fn dynamic<T: strap_bind::Marshal>(state: &mut State, value: &T) -> RuntimeResult<Value> {
    traits::write(state, value)?;
    Ok(state.pop_value())
}

/// Calls the bound target with `args` for one result.
pub fn call_target(state: &mut State, args: &[Value]) -> RuntimeResult<Value> {
    state.get_global(TARGET);
    for arg in args {
        state.push(arg.clone());
    }
    state.call(args.len(), 1)?;
    Ok(state.pop_value())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixtures_answer() {
        let mut state = average_state();
        let r = call_target(&mut state, &[2.into(), 4.into()]).unwrap();
        assert_eq!(r.as_number(), Some(3.0));

        let mut state = sum_state();
        let list = dynamic(&mut state, &vec![1i64, 2, 3]).unwrap();
        assert_eq!(call_target(&mut state, &[list]).unwrap().as_integer(), Some(6));
    }
}
