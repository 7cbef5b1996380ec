//! Operator command line for the receipt registry
//!
//! The binary in `main.rs` parses arguments and prints JSON; everything it
//! runs lives here so it can be driven from tests against an in-memory
//! database.

#![forbid(unsafe_code)]

pub mod commands;
pub mod context;

pub use context::Registry;
