//! A runtime state with the demo bindings loaded, driven from Rust the way a
//! script would drive it.

use strap_bind::strap_rt::{RuntimeResult, State, StrapConfig, UtilsConfig, Value};
use strap_bind::{publish_utils, traits, Marshal};
use tracing::debug;

use crate::bindings;

/// Global holding the baking utilities.
pub const UTILS_GLOBAL: &str = "strap";

pub struct Session {
    state: State,
    utils: UtilsConfig,
}

impl Session {
    pub fn new(config: &StrapConfig) -> RuntimeResult<Self> {
        let mut state = State::with_config(config.runtime.clone());
        state.new_table();
        publish_utils(&mut state, -1, &config.utils)?;
        state.set_global(UTILS_GLOBAL);
        bindings::register(&mut state);
        debug!(
            unbake = %config.utils.unbake,
            mark_for_baking = %config.utils.mark_for_baking,
            "session ready"
        );
        Ok(Session {
            state,
            utils: config.utils.clone(),
        })
    }

    pub fn state(&mut self) -> &mut State {
        &mut self.state
    }

    /// Calls the global function `name` for one result.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        self.state.get_global(name);
        self.finish_call(args)
    }

    /// Calls `object:name(args...)`.
    pub fn call_method(
        &mut self,
        object: &Value,
        name: &str,
        args: Vec<Value>,
    ) -> RuntimeResult<Value> {
        self.state.push(object.clone());
        if let Err(e) = self.state.get_field(-1, name) {
            self.state.pop(1);
            return Err(e);
        }
        self.state.remove(-2);
        let mut full = Vec::with_capacity(args.len() + 1);
        full.push(object.clone());
        full.extend(args);
        self.finish_call(full)
    }

    pub fn mark_for_baking(&mut self, value: Value) -> RuntimeResult<Value> {
        let name = self.utils.mark_for_baking.clone();
        self.call_util(&name, value)
    }

    pub fn unbake(&mut self, value: Value) -> RuntimeResult<Value> {
        let name = self.utils.unbake.clone();
        self.call_util(&name, value)
    }

    /// Writes a host value as fresh dynamic data.
    pub fn encode<T: Marshal>(&mut self, value: &T) -> RuntimeResult<Value> {
        traits::write(&mut self.state, value)?;
        Ok(self.state.pop_value())
    }

    pub fn decode<T: Marshal>(&mut self, value: &Value) -> Option<T> {
        self.state.push(value.clone());
        let decoded = traits::read::<T>(&mut self.state, -1);
        self.state.pop(1);
        decoded
    }

    fn call_util(&mut self, name: &str, value: Value) -> RuntimeResult<Value> {
        self.state.get_global(UTILS_GLOBAL);
        if let Err(e) = self.state.get_field(-1, name) {
            self.state.pop(1);
            return Err(e);
        }
        self.state.remove(-2);
        self.finish_call(vec![value])
    }

    /// The function is already on top of the stack.
    fn finish_call(&mut self, args: Vec<Value>) -> RuntimeResult<Value> {
        let n = args.len();
        for arg in args {
            self.state.push(arg);
        }
        self.state.call(n, 1)?;
        Ok(self.state.pop_value())
    }
}

/// Renders a value the way a script author would write it.
///
/// Sequences print as `{a, b}`, other tables as `{k = v}` in key order.
pub fn render(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_owned(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("{:?}", &**s),
        Value::Table(t) => {
            let t = t.borrow();
            let mut entries = Vec::new();
            let mut key = Value::Nil;
            while let Ok(Some((k, v))) = t.next(&key) {
                entries.push((k.clone(), v));
                key = k;
            }
            let is_sequence = entries
                .iter()
                .enumerate()
                .all(|(i, (k, _))| k.as_integer() == Some(i as i64 + 1));
            let parts: Vec<String> = if is_sequence {
                entries.iter().map(|(_, v)| render(v)).collect()
            } else {
                entries
                    .iter()
                    .map(|(k, v)| match k {
                        Value::String(s) => format!("{s} = {}", render(v)),
                        other => format!("[{}] = {}", render(other), render(v)),
                    })
                    .collect()
            };
            format!("{{{}}}", parts.join(", "))
        }
        Value::Function(_) => "function".to_owned(),
        Value::Userdata(_) => "userdata".to_owned(),
    }
}
