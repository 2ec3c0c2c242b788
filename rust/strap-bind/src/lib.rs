//! Value marshalling and call dispatch between host types and the strap
//! runtime.
//!
//! - [`Marshal`] describes how a host type maps to dynamic values;
//!   [`impl_record!`] and [`impl_variant!`] derive it for structs and enums.
//! - [`data`] tracks whether a value is dynamic, pending, baked or an
//!   indirect reference to a baked object, and performs the transitions.
//! - [`push_func`] and [`push_overloaded_func`] bind fixed signatures.
//! - [`push_bulk_func`] dispatches over per-position families of types,
//!   building arguments into a bounded [`Pool`].

pub mod builder;
pub mod bulk;
pub mod data;
pub mod errors;
pub mod func;
pub mod param;
pub mod pool;
pub mod record;
pub mod traits;
pub mod utils;
pub mod variant;
pub mod vocab;

pub use strap_rt;

pub use builder::{BuildContext, BuildOutcome, Builder, SimpleBuilder, TypeKey};
pub use bulk::{push_bulk_func, BulkFunc, BulkInstance, MAX_BULK_ARGS};
pub use data::{Baked, DataState};
pub use errors::CallError;
pub use func::{native_function, push_func, push_overloaded_func, Arity, NativeFn, Overloads};
pub use param::{Mut, Param, Ref, Return};
pub use pool::{Pool, PoolLayout};
pub use record::Methods;
pub use traits::{Caps, Marshal};
pub use utils::publish_utils;
pub use vocab::Complex;
