//! Store-assigned identifiers
//!
//! Every identity is a positive integer handed out by the store. They are
//! wrapped so a principal id can never be passed where a receipt id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of an authenticated actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(pub i64);

impl PrincipalId {
    /// Get the raw store identity
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for PrincipalId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for PrincipalId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Identity of a receipt row
///
/// Monotonically increasing in assignment order and never reused for a
/// committed row. The receipt sequence number is derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub i64);

impl ReceiptId {
    /// Get the raw store identity
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReceiptId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for ReceiptId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Identity of a member record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub i64);

impl MemberId {
    /// Get the raw store identity
    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MemberId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for MemberId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// A record that ownership checks can point at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum RecordRef {
    /// A donation receipt
    Receipt(ReceiptId),
    /// A member record
    Member(MemberId),
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Receipt(id) => write!(f, "receipt {id}"),
            RecordRef::Member(id) => write!(f, "member {id}"),
        }
    }
}

impl From<ReceiptId> for RecordRef {
    fn from(id: ReceiptId) -> Self {
        Self::Receipt(id)
    }
}

impl From<MemberId> for RecordRef {
    fn from(id: MemberId) -> Self {
        Self::Member(id)
    }
}

/// Records created by, and optionally restricted to, one principal
pub trait Owned {
    /// Principal that created the record
    fn owner(&self) -> PrincipalId;

    /// Reference used in ownership errors and logs
    fn record(&self) -> RecordRef;
}
