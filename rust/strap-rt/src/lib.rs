//! A minimal embeddable dynamic runtime.
//!
//! This crate provides the boundary the strap binding engine talks to: a
//! stack of dynamically typed values with call frames, tables with
//! metatables, opaque userdata, a generation-checked registry and protected
//! native calls. There is no parser and no bytecode; values are reference
//! counted and host functions are the only code that runs.

pub mod config;
pub mod error;
pub mod registry;
pub mod state;
pub mod table;
pub mod userdata;
pub mod value;

pub use config::{ConfigError, RuntimeConfig, StrapConfig, UtilsConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use registry::{Registry, RegistryKey, RegistryRef};
pub use state::{State, MULTRET};
pub use table::{Key, Table, TableRef};
pub use userdata::Userdata;
pub use value::{Function, Value, ValueKind};
