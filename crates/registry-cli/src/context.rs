//! Wiring of configuration, storage and services for one CLI invocation

use anyhow::{Context, Result};
use registry_authorization::{AccessGate, PermissionEngine, RoleTable};
use registry_core::effects::{PrincipalDirectory, SystemClock};
use registry_core::{PrincipalId, RegistryConfig};
use registry_service::{AccountService, MemberService, OverviewService, ReceiptService, Sequencer};
use registry_store::SqliteStore;
use std::sync::Arc;
use tracing::debug;

/// Services bound to one SQLite database
pub struct Registry {
    /// Effective configuration
    pub config: RegistryConfig,
    /// Shared store and directory
    pub store: Arc<SqliteStore>,
    /// Engine over the configured role table
    pub engine: PermissionEngine,
    /// Receipt operations
    pub receipts: ReceiptService<SqliteStore, SqliteStore, SystemClock>,
    /// Member operations
    pub members: MemberService<SqliteStore, SqliteStore, SystemClock>,
    /// Account operations
    pub accounts: AccountService<SqliteStore>,
    /// Registry-wide counts
    pub overview: OverviewService<SqliteStore, SqliteStore>,
}

impl Registry {
    /// Open the database named in the configuration
    pub fn open(config: RegistryConfig) -> Result<Self> {
        let path = config.storage.database.clone();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("opening database {}", path.display()))?;
        Self::assemble(config, store)
    }

    /// Throwaway in-memory database
    pub fn in_memory(config: RegistryConfig) -> Result<Self> {
        Self::assemble(config, SqliteStore::open_in_memory()?)
    }

    fn assemble(config: RegistryConfig, store: SqliteStore) -> Result<Self> {
        let roles = RoleTable::from_config(&config)?;
        debug!(roles = roles.role_names().count(), "role table loaded");

        let store = Arc::new(store);
        let engine = PermissionEngine::new(Arc::new(roles));
        let gate = AccessGate::new(engine.clone());
        let receipts = ReceiptService::new(
            Arc::clone(&store),
            Arc::clone(&store),
            SystemClock,
            gate.clone(),
            Sequencer::new(config.sequencer.clone()),
        );
        let members = MemberService::new(
            Arc::clone(&store),
            Arc::clone(&store),
            SystemClock,
            gate.clone(),
        );
        let overview = OverviewService::new(Arc::clone(&store), Arc::clone(&store), gate.clone());
        let accounts = AccountService::new(Arc::clone(&store), gate);

        Ok(Self {
            config,
            store,
            engine,
            receipts,
            members,
            accounts,
            overview,
        })
    }

    /// Identity of the account named `username`
    pub async fn principal_id(&self, username: &str) -> Result<PrincipalId> {
        let account = self
            .store
            .account_by_username(username)
            .await?
            .with_context(|| format!("no account named {username}"))?;
        Ok(account.id)
    }
}
