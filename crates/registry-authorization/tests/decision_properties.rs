//! Property Tests: Permission Decisions
//!
//! Superuser totality, unknown-role emptiness, determinism and the union
//! rule, checked over arbitrary role sets drawn from the built-in table plus
//! names the table does not define.

use chrono::Utc;
use proptest::prelude::*;
use registry_authorization::{PermissionEngine, ScopedDecision};
use registry_core::{Account, Capability, Principal, PrincipalId, RoleName};

const KNOWN_ROLES: [&str; 5] = [
    "admin",
    "user_data_editor",
    "user_data_viewer",
    "receipt_report_viewer",
    "receipt_creator",
];

fn principal(superuser: bool, roles: Vec<String>) -> Principal {
    Principal::new(
        Account {
            id: PrincipalId(42),
            username: "prop".to_string(),
            active: true,
            superuser,
            created_at: Utc::now(),
        },
        roles.into_iter().map(RoleName::from),
    )
}

fn capability() -> impl Strategy<Value = Capability> {
    (0..Capability::ALL.len()).prop_map(|i| Capability::ALL[i])
}

fn role_name() -> impl Strategy<Value = String> {
    prop_oneof![
        (0..KNOWN_ROLES.len()).prop_map(|i| KNOWN_ROLES[i].to_string()),
        "[a-z]{3,12}_x",
    ]
}

fn unknown_role() -> impl Strategy<Value = String> {
    "[a-z]{3,12}_unknown"
}

proptest! {
    #[test]
    fn superuser_is_allowed_everything(roles in prop::collection::vec(role_name(), 0..6), cap in capability()) {
        let engine = PermissionEngine::builtin();
        let root = principal(true, roles);
        prop_assert_eq!(engine.authorize_scoped(&root, cap), ScopedDecision::Allow);
        prop_assert!(engine.authorize(&root, cap));
    }

    #[test]
    fn unknown_roles_grant_nothing(roles in prop::collection::vec(unknown_role(), 0..6), cap in capability()) {
        let engine = PermissionEngine::builtin();
        let nobody = principal(false, roles);
        prop_assert_eq!(engine.authorize_scoped(&nobody, cap), ScopedDecision::Deny);
    }

    #[test]
    fn decisions_are_deterministic(roles in prop::collection::vec(role_name(), 0..6), cap in capability()) {
        let engine = PermissionEngine::builtin();
        let p = principal(false, roles);
        let first = engine.authorize_scoped(&p, cap);
        prop_assert_eq!(first, engine.authorize_scoped(&p, cap));
        prop_assert_eq!(first.is_permitted(), engine.authorize(&p, cap));
    }

    #[test]
    fn role_set_decision_is_union_of_single_roles(roles in prop::collection::vec(role_name(), 1..6), cap in capability()) {
        let engine = PermissionEngine::builtin();
        let combined = engine.authorize_scoped(&principal(false, roles.clone()), cap);
        let unioned = roles
            .iter()
            .map(|r| engine.authorize_scoped(&principal(false, vec![r.clone()]), cap))
            .fold(ScopedDecision::Deny, ScopedDecision::union);
        prop_assert_eq!(combined, unioned);
    }

    #[test]
    fn adding_a_role_never_narrows_access(roles in prop::collection::vec(role_name(), 0..5), extra in role_name(), cap in capability()) {
        let engine = PermissionEngine::builtin();
        let before = engine.authorize_scoped(&principal(false, roles.clone()), cap);
        let mut wider = roles;
        wider.push(extra);
        let after = engine.authorize_scoped(&principal(false, wider), cap);
        prop_assert_eq!(before.union(after), after);
    }
}
