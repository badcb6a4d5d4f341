//! Command implementations for the `micromod` host.
//!
//! Each module exports an `*Args` struct for `clap` and a `run` function.

pub mod inspect;
pub mod run;
