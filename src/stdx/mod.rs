//! Small, self-contained data structures used across the crate.
//!
//! # Scope
//! `stdx` hosts narrow utilities that back the scan pipeline. They are tuned
//! for predictable memory use and deterministic behavior rather than
//! general-purpose ergonomics.

pub mod bitset;

pub use bitset::VisitedSet;
