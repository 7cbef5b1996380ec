//! # Registry Store - Storage Handlers
//!
//! Implementations of the storage effects declared in `registry-core`:
//!
//! - [`MemoryStore`]: in-process state with fault injection, for tests
//! - [`SqliteStore`]: the persistent handler
//!
//! Both implement [`ReceiptStore`](registry_core::effects::ReceiptStore) and
//! [`PrincipalDirectory`](registry_core::effects::PrincipalDirectory).

#![forbid(unsafe_code)]

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use registry_core::effects::{FixedClock, SystemClock};
pub use sqlite::SqliteStore;
