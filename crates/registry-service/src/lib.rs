//! # Registry Service
//!
//! Receipt creation with code sequencing, and the gated receipt, member,
//! account and overview operations built on the permission engine and the
//! storage effects.
//!
//! Services are generic over the effect traits from `registry-core`; wire
//! them to `registry-store` handlers in production and to the in-memory
//! handler in tests.

#![forbid(unsafe_code)]

pub mod accounts;
pub mod members;
pub mod overview;
pub mod principals;
pub mod receipts;
pub mod sequencer;

pub use accounts::{AccountService, AccountSummary};
pub use members::MemberService;
pub use overview::{OverviewService, SystemStats};
pub use principals::resolve_principal;
pub use receipts::ReceiptService;
pub use sequencer::Sequencer;
