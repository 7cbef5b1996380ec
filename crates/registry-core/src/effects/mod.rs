//! Effect interfaces consumed by the registry core
//!
//! Pure trait signatures only. Production and in-memory handlers live in
//! `registry-store`; the service layer is generic over these traits so tests
//! can substitute deterministic implementations.

pub mod clock;
pub mod directory;
pub mod members;
pub mod store;

pub use clock::{ClockEffects, FixedClock, SystemClock};
pub use directory::PrincipalDirectory;
pub use members::MemberStore;
pub use store::{ReceiptStore, ReceiptTransaction, StoreError};
