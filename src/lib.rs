//! Wheelhouse - layered wheel cache and build decision engine
//!
//! Decides, per package, whether a prebuilt wheel can be reused from a
//! cache layer, promoted between layers, or must be rebuilt for the target
//! interpreter; builds missing wheels in parallel and tracks whether every
//! required wheel was produced this session.

pub mod builder;
pub mod config;
pub mod error;
pub mod exec;
pub mod package;
pub mod python;
pub mod wheel;

pub use error::{WheelhouseError, WheelhouseResult};
