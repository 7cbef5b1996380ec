//! CLI command implementations
//!
//! Each command returns a JSON value; `main` prints it.

pub mod account;
pub mod check;
pub mod member;
pub mod receipt;
pub mod roles;
pub mod seed;
pub mod stats;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

pub(crate) fn json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}
