#![forbid(unsafe_code)]
//! rt11fs public API facade.
//!
//! Re-exports the filesystem aggregate from `rt11-core` through a stable
//! external interface; downstream consumers depend on this crate.

pub use rt11_core::*;
