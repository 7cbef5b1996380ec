//! `registry stats`

use crate::commands::json;
use crate::context::Registry;
use anyhow::Result;
use serde_json::Value;

/// Registry-wide record counts for `actor`
pub async fn run(registry: &Registry, actor: &str) -> Result<Value> {
    let actor = registry.principal_id(actor).await?;
    json(&registry.overview.system_stats(actor).await?)
}
