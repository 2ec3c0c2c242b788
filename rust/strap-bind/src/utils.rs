//! Script-facing lifecycle utilities.
//!
//! `markedForBaking(v)` returns the baked (or pending) counterpart of `v`;
//! `unbaked(v)` returns its dynamic counterpart. Both only look at their
//! first argument.

use strap_rt::{Function, RuntimeResult, State, UtilsConfig, Value};

use crate::data;
use crate::errors::CallError;

fn first_argument(state: &State) -> Result<(), CallError> {
    if state.top() == 0 {
        return Err(CallError::NoArguments);
    }
    Ok(())
}

pub fn unbake_function() -> Function {
    Function::new(|s: &mut State| {
        first_argument(s)?;
        data::to_dynamic(s, 1)?;
        Ok(1)
    })
}

pub fn mark_for_baking_function() -> Function {
    Function::new(|s: &mut State| {
        first_argument(s)?;
        data::to_native(s, 1)?;
        Ok(1)
    })
}

/// Stores both utilities in the table at `idx` under the configured names.
pub fn publish_utils(state: &mut State, idx: i32, config: &UtilsConfig) -> RuntimeResult<()> {
    let idx = state.abs_index(idx);
    state.push(Value::Function(unbake_function()));
    state.set_field(idx, &config.unbake)?;
    state.push(Value::Function(mark_for_baking_function()));
    state.set_field(idx, &config.mark_for_baking)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn published() -> State {
        let mut state = State::new();
        state.new_table();
        publish_utils(&mut state, 1, &UtilsConfig::default()).unwrap();
        state
    }

    #[test]
    fn both_utilities_are_published() {
        let mut state = published();
        for name in ["unbaked", "markedForBaking"] {
            state.get_field(1, name).unwrap();
            assert_eq!(state.type_name(-1), "function", "{name}");
            state.pop(1);
        }
    }

    #[test]
    fn calls_without_arguments_are_rejected() {
        let mut state = published();
        for name in ["unbaked", "markedForBaking"] {
            state.get_field(1, name).unwrap();
            let err = state.call(0, 1).unwrap_err();
            assert_eq!(err.to_string(), "No arguments provided.");
        }
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn unbaking_dynamic_data_fails() {
        let mut state = published();
        state.get_field(1, "unbaked").unwrap();
        state.push(5);
        let err = state.call(1, 1).unwrap_err();
        assert_eq!(err.to_string(), "The data is already dynamic.");
    }

    #[test]
    fn custom_names_are_honored() {
        let mut state = State::new();
        state.new_table();
        let config = UtilsConfig {
            unbake: "thaw".into(),
            mark_for_baking: "freeze".into(),
        };
        publish_utils(&mut state, 1, &config).unwrap();
        state.get_field(1, "freeze").unwrap();
        state.push(Value::new_table());
        state.call(1, 1).unwrap();
        assert_eq!(state.type_name(-1), "userdata");
    }
}
