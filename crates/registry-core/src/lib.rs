//! # Registry Core - Foundation
//!
//! Identifiers, domain types, effect interfaces and the unified error type for
//! the donation-receipt registry. No handler implementations live here; those
//! are in `registry-store`.
//!
//! ## Contents
//!
//! - [`capability`]: the closed capability set and grant scopes
//! - [`principal`]: accounts, role names and the per-request principal
//! - [`receipt`]: receipts, drafts, changes, filters and pages
//! - [`member`]: member records with soft deletion
//! - [`effects`]: clock, principal directory, receipt and member store traits
//! - [`config`]: TOML configuration with environment overrides
//! - [`errors`]: [`RegistryError`] and the [`ErrorCode`] trait

#![forbid(unsafe_code)]

pub mod capability;
pub mod config;
pub mod effects;
pub mod errors;
pub mod identifiers;
pub mod member;
pub mod principal;
pub mod receipt;

pub use capability::{Capability, Grant, GrantScope};
pub use config::{RegistryConfig, RoleDefinition, SequencerConfig, StorageConfig};
pub use errors::{ErrorCode, RegistryError, Result};
pub use identifiers::{MemberId, Owned, PrincipalId, ReceiptId, RecordRef};
pub use member::{
    Member, MemberChanges, MemberDraft, MemberFilter, MemberPage, MemberStats, MemberStatus,
    MemberType,
};
pub use principal::{Account, NewAccount, Principal, RoleName};
pub use receipt::{
    PageRequest, PaymentMode, Receipt, ReceiptChanges, ReceiptCode, ReceiptDraft, ReceiptFilter,
    ReceiptPage, ReceiptStats, ReceiptStatus, ReceiptTotals, fold_case,
};
