//! Unified error system for the registry
//!
//! One error type shared by every crate in the workspace. Each variant maps to a
//! distinguishable kind so the routing layer can choose a response without
//! string matching, and authorization failures are never folded into a
//! generic error.

use crate::capability::Capability;
use crate::identifiers::{PrincipalId, RecordRef};
use crate::receipt::ReceiptStatus;
use serde::{Deserialize, Serialize};

/// Unified error type for all registry operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RegistryError {
    /// No held role grants the capability
    #[error("Permission denied: {capability} is not granted")]
    PermissionDenied {
        /// Capability that was required
        capability: Capability,
    },

    /// Capability is granted for own records only and the target belongs to someone else
    #[error("Ownership violation: {capability} on {record} is limited to its creator")]
    OwnershipViolation {
        /// Capability that was exercised
        capability: Capability,
        /// Record the principal tried to reach
        record: RecordRef,
    },

    /// Referenced record is absent
    #[error("Not found: {message}")]
    NotFound {
        /// What was not found
        message: String,
    },

    /// Placeholder or final receipt code collided with an existing one
    #[error("Conflict on create: {message}")]
    ConflictOnCreate {
        /// Description of the collision
        message: String,
    },

    /// A unique value other than a receipt code already exists
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// Transactional store failure, transient from the caller's point of view
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Error message from the store
        message: String,
    },

    /// Requested receipt status change is not part of the lifecycle
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: ReceiptStatus,
        /// Requested status
        to: ReceiptStatus,
    },

    /// Invalid input
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Principal account is deactivated
    #[error("Principal {principal} is inactive")]
    InactivePrincipal {
        /// The deactivated principal
        principal: PrincipalId,
    },

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {message}")]
    Config {
        /// Error message describing the configuration problem
        message: String,
    },
}

impl RegistryError {
    /// Create a permission denied error
    pub fn permission_denied(capability: Capability) -> Self {
        Self::PermissionDenied { capability }
    }

    /// Create an ownership violation error
    pub fn ownership_violation(capability: Capability, record: impl Into<RecordRef>) -> Self {
        Self::OwnershipViolation {
            capability,
            record: record.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a receipt-code collision error
    pub fn conflict_on_create(message: impl Into<String>) -> Self {
        Self::ConflictOnCreate {
            message: message.into(),
        }
    }

    /// Create a generic uniqueness conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether the operation may succeed if attempted again unchanged
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Whether this error is an authorization decision rather than a failure
    pub fn is_authorization_failure(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. }
                | Self::OwnershipViolation { .. }
                | Self::InactivePrincipal { .. }
        )
    }
}

/// Stable machine-readable code for an error kind
pub trait ErrorCode {
    /// Snake-case code, stable across releases
    fn code(&self) -> &'static str;
}

impl ErrorCode for RegistryError {
    fn code(&self) -> &'static str {
        match self {
            RegistryError::PermissionDenied { .. } => "permission_denied",
            RegistryError::OwnershipViolation { .. } => "ownership_violation",
            RegistryError::NotFound { .. } => "not_found",
            RegistryError::ConflictOnCreate { .. } => "conflict_on_create",
            RegistryError::Conflict { .. } => "conflict",
            RegistryError::StoreUnavailable { .. } => "store_unavailable",
            RegistryError::InvalidTransition { .. } => "invalid_transition",
            RegistryError::Invalid { .. } => "invalid",
            RegistryError::InactivePrincipal { .. } => "inactive_principal",
            RegistryError::Config { .. } => "config",
        }
    }
}

/// Standard Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            _ => Self::store_unavailable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::ReceiptId;

    #[test]
    fn only_store_failures_are_transient() {
        assert!(RegistryError::store_unavailable("down").is_transient());
        assert!(!RegistryError::permission_denied(Capability::ReadReceipts).is_transient());
        assert!(!RegistryError::conflict_on_create("dup").is_transient());
    }

    #[test]
    fn authorization_failures_keep_their_own_codes() {
        let denied = RegistryError::permission_denied(Capability::UpdateReceipts);
        let foreign = RegistryError::ownership_violation(Capability::UpdateReceipts, ReceiptId(9));

        assert_eq!(denied.code(), "permission_denied");
        assert_eq!(foreign.code(), "ownership_violation");
        assert!(denied.is_authorization_failure());
        assert!(foreign.is_authorization_failure());
        assert!(!RegistryError::not_found("receipt 9").is_authorization_failure());
        assert_eq!(
            foreign.to_string(),
            "Ownership violation: update_receipts on receipt 9 is limited to its creator"
        );
    }

    #[test]
    fn display_names_the_capability() {
        let err = RegistryError::permission_denied(Capability::ExportReceipts);
        assert_eq!(
            err.to_string(),
            "Permission denied: export_receipts is not granted"
        );
    }
}
