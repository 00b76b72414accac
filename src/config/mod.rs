//! Configuration constants for radixstore.
//!
//! All tunables live in [`constants`]; import them from here rather than
//! redefining values locally.

pub mod constants;

pub use constants::*;
