//! `registry account ...`

use crate::commands::json;
use crate::context::Registry;
use anyhow::Result;
use clap::Subcommand;
use registry_core::{NewAccount, RoleName};
use serde_json::Value;

/// Account administration
#[derive(Subcommand, Debug)]
pub enum AccountCommand {
    /// Create an account
    Create {
        /// Acting administrator
        #[arg(long = "as")]
        actor: String,

        /// Login name of the new account
        name: String,

        /// Role to assign; repeat for several
        #[arg(long = "role")]
        roles: Vec<String>,

        /// Make the account a superuser
        #[arg(long)]
        superuser: bool,
    },

    /// Deactivate an account; its receipts are kept
    Deactivate {
        /// Acting administrator
        #[arg(long = "as")]
        actor: String,

        /// Account to deactivate
        name: String,
    },

    /// Reactivate an account
    Activate {
        /// Acting administrator
        #[arg(long = "as")]
        actor: String,

        /// Account to reactivate
        name: String,
    },

    /// Replace the roles of an account
    Roles {
        /// Acting administrator
        #[arg(long = "as")]
        actor: String,

        /// Target account
        name: String,

        /// Role to assign; repeat for several, omit to clear
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// List accounts with their roles
    List {
        /// Acting administrator
        #[arg(long = "as")]
        actor: String,
    },
}

/// Run an account command as the named administrator
pub async fn run(registry: &Registry, command: AccountCommand) -> Result<Value> {
    match command {
        AccountCommand::Create {
            actor,
            name,
            roles,
            superuser,
        } => {
            let actor = registry.principal_id(&actor).await?;
            let mut new = NewAccount::new(name, roles.into_iter().map(RoleName::from));
            new.superuser = superuser;
            json(&registry.accounts.create_account(actor, new).await?)
        }
        AccountCommand::Deactivate { actor, name } => set_active(registry, &actor, &name, false).await,
        AccountCommand::Activate { actor, name } => set_active(registry, &actor, &name, true).await,
        AccountCommand::Roles { actor, name, roles } => {
            let actor = registry.principal_id(&actor).await?;
            let target = registry.principal_id(&name).await?;
            let roles = roles.into_iter().map(RoleName::from).collect();
            json(&registry.accounts.assign_roles(actor, target, roles).await?)
        }
        AccountCommand::List { actor } => {
            let actor = registry.principal_id(&actor).await?;
            json(&registry.accounts.list_accounts(actor).await?)
        }
    }
}

async fn set_active(registry: &Registry, actor: &str, name: &str, active: bool) -> Result<Value> {
    let actor = registry.principal_id(actor).await?;
    let target = registry.principal_id(name).await?;
    json(&registry.accounts.set_active(actor, target, active).await?)
}
