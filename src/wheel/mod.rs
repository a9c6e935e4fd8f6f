//! Wheel naming, compatibility, and layered caching
//!
//! A wheel file name encodes which interpreters can use it. This module
//! parses those names, records which (python tag, abi tag, platform tag)
//! triples each target interpreter accepts, and caches wheels across an
//! ordered list of directories so one good build can serve many projects.

pub mod abi;
pub mod cache;
pub mod details;

pub use abi::{AbiContainer, AbiDetails};
pub use cache::{CacheLayer, LayeredWheelCache, ReadinessLatch, StoreOutcome};
pub use details::WheelDetails;
