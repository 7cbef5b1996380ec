//! `registry roles`

use registry_authorization::RoleTable;
use serde_json::{Map, Value};

/// Role names with their grant tokens
pub fn describe(table: &RoleTable) -> Value {
    let mut roles = Map::new();
    for (name, bundle) in table.iter() {
        let grants = bundle
            .grants()
            .map(|grant| Value::String(grant.to_string()))
            .collect();
        roles.insert(name.to_string(), Value::Array(grants));
    }
    Value::Object(roles)
}
