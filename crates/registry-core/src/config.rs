//! Registry configuration
//!
//! Loaded once at process start from TOML, optionally overlaid with
//! environment variables, validated, and then passed by value into the
//! components that need it. Nothing reads configuration ambiently.

use crate::capability::Grant;
use crate::errors::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment override for [`SequencerConfig::offset`]
pub const ENV_SEQUENCE_OFFSET: &str = "REGISTRY_SEQUENCE_OFFSET";
/// Environment override for [`StorageConfig::database`]
pub const ENV_DATABASE: &str = "REGISTRY_DATABASE";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Receipt numbering
    pub sequencer: SequencerConfig,
    /// Persistent storage
    pub storage: StorageConfig,
    /// Role definitions replacing the built-in table when present
    pub roles: Option<BTreeMap<String, RoleDefinition>>,
}

/// Receipt numbering parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Subtracted from the store identity to align with the prior numbering
    pub offset: i64,
    /// Creator code used for superusers and admins
    pub admin_code: String,
    /// Prefix of every other creator code
    pub code_prefix: String,
    /// Username prefix that tags receipt-creator accounts, e.g. `receipt_creator7`
    pub creator_username_prefix: String,
    /// Role whose holders receive the admin creator code
    pub admin_role: String,
    /// Total attempts for the provisional insert
    pub placeholder_attempts: u32,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            offset: 630,
            admin_code: "RCA".to_string(),
            code_prefix: "RC".to_string(),
            creator_username_prefix: "receipt_creator".to_string(),
            admin_role: "admin".to_string(),
            placeholder_attempts: 3,
        }
    }
}

/// Storage location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("registry.db"),
        }
    }
}

/// One role as written in the config file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleDefinition {
    /// Free-text description
    pub description: Option<String>,
    /// Grant tokens, `capability` or `capability:own`
    pub grants: Vec<String>,
}

impl RoleDefinition {
    /// Parse the grant tokens
    pub fn parsed_grants(&self) -> Result<Vec<Grant>> {
        self.grants
            .iter()
            .map(|token| {
                token
                    .parse::<Grant>()
                    .map_err(|e| RegistryError::config(e.to_string()))
            })
            .collect()
    }
}

impl RegistryConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| RegistryError::config(format!("invalid TOML: {e}")))
    }

    /// Load from `path` when it exists, otherwise start from defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            debug!(path = %path.display(), "config file absent, using defaults");
            Ok(Self::default())
        }
    }

    /// Overlay environment variables
    pub fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Overlay `REGISTRY_*` entries from an explicit variable list
    pub fn merge_with_vars(
        &mut self,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<()> {
        for (key, value) in vars {
            match key.as_str() {
                ENV_SEQUENCE_OFFSET => {
                    self.sequencer.offset = value.trim().parse().map_err(|e| {
                        RegistryError::config(format!("{ENV_SEQUENCE_OFFSET}: {e}"))
                    })?;
                }
                ENV_DATABASE => self.storage.database = PathBuf::from(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let seq = &self.sequencer;
        if seq.placeholder_attempts == 0 {
            return Err(RegistryError::config(
                "sequencer.placeholder_attempts must be at least 1",
            ));
        }
        if seq.admin_code.is_empty() || seq.code_prefix.is_empty() {
            return Err(RegistryError::config(
                "sequencer.admin_code and sequencer.code_prefix must not be empty",
            ));
        }
        if seq.offset < 0 {
            return Err(RegistryError::config("sequencer.offset must not be negative"));
        }
        if let Some(roles) = &self.roles {
            for (name, definition) in roles {
                if name.trim().is_empty() {
                    return Err(RegistryError::config("role names must not be empty"));
                }
                definition
                    .parsed_grants()
                    .map_err(|e| RegistryError::config(format!("role {name}: {e}")))?;
            }
        }
        Ok(())
    }
}
