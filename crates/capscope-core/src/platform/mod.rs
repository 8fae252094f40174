//! # Platform Implementations
//!
//! Implementations of the capability traits in [`crate::capability`].
//!
//! Stable Rust has no CHERI target, so the only backend here is a simulated
//! capability machine: tagged values kept in ordinary memory. It drives the
//! walker on conventional hosts and in tests. A hardware backend belongs in
//! its own module behind `#[cfg(...)]` once a purecap target is available.

pub mod simulated;
