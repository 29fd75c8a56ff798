// src/replay/mod.rs
//! Deterministic replay of captured traffic
//!
//! - **Index**: request description → recorded response groups
//! - **Matcher**: token-overlap scoring when no exact match exists

pub mod index;
pub mod matcher;

pub use index::ReplayIndex;
