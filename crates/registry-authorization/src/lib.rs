//! # Registry Authorization
//!
//! Role-based capability decisions for the receipt registry.
//!
//! - [`RoleTable`]: immutable role name to grant bundle mapping
//! - [`PermissionEngine`]: pure `(principal, capability) -> decision`
//! - [`ScopedDecision`]: allow, allow-own-only or deny
//! - [`AccessGate`]: engine decisions as errors plus ownership checks
//!
//! Nothing here performs I/O. Role assignments are resolved by the caller
//! per request, so a revoked role takes effect on the next call.

#![forbid(unsafe_code)]

pub mod decision;
pub mod engine;
pub mod ownership;
pub mod roles;

pub use decision::ScopedDecision;
pub use engine::PermissionEngine;
pub use ownership::AccessGate;
pub use roles::{RoleBundle, RoleTable};
