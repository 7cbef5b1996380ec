//! `registry seed`

use crate::commands::json;
use crate::context::Registry;
use anyhow::Result;
use registry_core::{NewAccount, RoleName};
use serde_json::Value;

/// One account per built-in role, plus a superuser
pub fn demo_accounts() -> Vec<NewAccount> {
    vec![
        NewAccount::new("admin", [RoleName::from("admin")]).superuser(),
        NewAccount::new("editor1", [RoleName::from("user_data_editor")]),
        NewAccount::new("viewer1", [RoleName::from("user_data_viewer")]),
        NewAccount::new("receipt_viewer1", [RoleName::from("receipt_report_viewer")]),
        NewAccount::new("receipt_creator1", [RoleName::from("receipt_creator")]),
    ]
}

/// Create the demo accounts that are missing
pub async fn run(registry: &Registry) -> Result<Value> {
    let created = registry.accounts.bootstrap(demo_accounts()).await?;
    json(&created)
}
