//! Demonstration bindings for the strap engine.
//!
//! [`bindings`] exposes a handful of host functions and types, [`linalg`]
//! shows bulk dispatch over shapes that share a dynamic form, and
//! [`scenarios`] drives both through a [`session::Session`].

pub mod bindings;
pub mod linalg;
pub mod scenarios;
pub mod session;

pub use scenarios::{Scenario, ScenarioError};
pub use session::{render, Session};
