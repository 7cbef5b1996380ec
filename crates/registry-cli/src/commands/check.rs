//! `registry check`

use crate::context::Registry;
use anyhow::Result;
use registry_core::Capability;
use registry_service::resolve_principal;
use serde_json::{json, Value};

/// Scoped decision for one user and capability
pub async fn run(registry: &Registry, user: &str, capability: Capability) -> Result<Value> {
    let id = registry.principal_id(user).await?;
    let principal = resolve_principal(registry.store.as_ref(), id).await?;
    let decision = registry.engine.authorize_scoped(&principal, capability);
    Ok(json!({
        "user": principal.username(),
        "superuser": principal.is_superuser(),
        "roles": principal.roles,
        "capability": capability,
        "decision": decision,
    }))
}
