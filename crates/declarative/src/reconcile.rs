//! Single-resource reconciliation: normalize, fetch, diff, apply, report

use crate::apply::{ApplyRun, apply, apply_delete};
use crate::context::{ApplyContext, Remote};
use crate::diff::{creation_diff, diff};
use crate::error::Error;
use crate::fetch::fetch;
use crate::normalize::normalize_for;
use crate::report::{ReconciliationResult, summarize};
use crate::resource::ResourceKind;
use crate::types::{DeclaredSpec, Presence};
use serde::{Deserialize, Deserializer, Serialize};

/// One reconciliation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub kind: ResourceKind,
    /// Resource name, stored trimmed
    #[serde(deserialize_with = "trimmed")]
    pub identity: String,
    #[serde(default)]
    pub state: Presence,
    /// Report planned operations without writing
    #[serde(default)]
    pub check_mode: bool,
    #[serde(default)]
    pub spec: DeclaredSpec,
}

impl Invocation {
    pub fn new(kind: ResourceKind, identity: impl Into<String>, spec: DeclaredSpec) -> Self {
        Self {
            kind,
            identity: identity.into().trim().to_string(),
            state: Presence::Present,
            check_mode: false,
            spec,
        }
    }

    /// `kind.identity` label used for targeting and display.
    pub fn label(&self) -> String {
        format!("{}.{}", self.kind, self.identity)
    }
}

fn trimmed<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let identity = String::deserialize(deserializer)?;
    Ok(identity.trim().to_string())
}

/// Reconcile one resource.
///
/// The declared spec is validated before any remote call. A transport error
/// while fetching ends the invocation with nothing applied.
pub fn reconcile(
    remote: &dyn Remote,
    invocation: &Invocation,
    ctx: &ApplyContext,
) -> ReconciliationResult {
    let kind = invocation.kind;
    let identity = invocation.identity.as_str();
    let ctx = if invocation.check_mode && !ctx.dry_run {
        ApplyContext::with_cancel(true, ctx.cancel.clone())
    } else {
        ctx.clone()
    };

    let desired = match normalize_for(kind, identity, &invocation.spec) {
        Ok(desired) => desired,
        Err(error) => return summarize(kind, identity, Err(error), ApplyRun::default()),
    };

    if ctx.is_cancelled() {
        return summarize(kind, identity, Err(Error::Cancelled), ApplyRun::default());
    }

    let current = match fetch(remote, kind, identity) {
        Ok(state) => Some(state),
        Err(error) if error.is_not_found() => None,
        Err(error) => return summarize(kind, identity, Err(error), ApplyRun::default()),
    };

    let run = match (invocation.state, current) {
        (Presence::Present, Some(current)) => {
            let diffs = diff(&current, &desired);
            log::debug!("{kind} '{identity}': {} diff(s)", diffs.len());
            apply(remote, kind, identity, true, &diffs, &ctx)
        }
        (Presence::Present, None) => {
            let diffs = creation_diff(identity, &desired);
            log::debug!("{kind} '{identity}' not found, creating with {} diff(s)", diffs.len());
            apply(remote, kind, identity, false, &diffs, &ctx)
        }
        (Presence::Absent, Some(_)) => apply_delete(remote, kind, identity, &ctx),
        (Presence::Absent, None) => ApplyRun::default(),
    };

    summarize(kind, identity, Ok(()), run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CancelToken;
    use crate::error::ErrorCategory;
    use crate::memory::MemoryRemote;
    use crate::types::{FieldValue, ResourceState};
    use serde_json::{Value, json};

    fn invocation(kind: ResourceKind, identity: &str, spec: Value) -> Invocation {
        let Value::Object(spec) = spec else {
            panic!("spec must be an object");
        };
        Invocation::new(kind, identity, spec)
    }

    fn testers(members: &[&str]) -> ResourceState {
        let mut state = ResourceState::empty(ResourceKind::Group, "Testers");
        state.set("members", FieldValue::set(members.iter().copied()));
        state.set("visible_to_all", FieldValue::Bool(true));
        state
    }

    #[test]
    fn test_group_member_addition() {
        let remote = MemoryRemote::new().with_resource(testers(&["alice"]));
        let inv = invocation(
            ResourceKind::Group,
            "Testers",
            json!({ "members": ["alice", "bob"] }),
        );

        let result = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(result.changed);
        assert!(!result.failed());

        let output = result.output();
        assert_eq!(output.diff.len(), 1);
        assert_eq!(output.diff[0]["field"], "members");
        assert_eq!(output.diff[0]["action"], "add");
        assert_eq!(output.diff[0]["to"], "bob");
        assert_eq!(remote.write_count(), 1);

        // visible_to_all was not declared and keeps its value
        let state = remote.state(ResourceKind::Group, "Testers").unwrap();
        assert_eq!(state.get("visible_to_all"), Some(&FieldValue::Bool(true)));
    }

    #[test]
    fn test_second_run_is_unchanged() {
        let remote = MemoryRemote::new().with_resource(testers(&["alice"]));
        let inv = invocation(
            ResourceKind::Group,
            "Testers",
            json!({
                "description": "QA",
                "members": ["bob"],
                "included_groups": ["Administrators"],
                "visible_to_all": "no"
            }),
        );

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(first.changed);
        let writes = remote.write_count();

        let second = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(!second.changed);
        assert!(second.outcomes.is_empty());
        assert_eq!(remote.write_count(), writes);
    }

    #[test]
    fn test_account_create_then_idempotent() {
        let remote = MemoryRemote::new().create_accepts(&["full_name", "email"]);
        let inv = invocation(
            ResourceKind::Account,
            "jdoe",
            json!({
                "full_name": "John Doe",
                "email": "john.doe@example.com",
                "active": true,
                "ssh_keys": "ssh-ed25519 AAAA jdoe@laptop"
            }),
        );

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(first.changed);
        assert!(!first.failed());
        let output = first.output();
        assert_eq!(output.diff[0]["action"], "create");
        let fields: Vec<&str> = output
            .diff
            .iter()
            .filter_map(|d| d["field"].as_str())
            .collect();
        assert_eq!(fields, vec!["state", "email", "full_name", "active", "ssh_keys"]);

        let second = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(!second.changed);
    }

    #[test]
    fn test_unknown_field_makes_no_remote_call() {
        let remote = MemoryRemote::new().with_group("Testers");
        let inv = invocation(ResourceKind::Group, "Testers", json!({ "memebers": ["bob"] }));

        let result = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(result.failed());
        assert_eq!(
            result.terminal.as_ref().map(Error::category),
            Some(ErrorCategory::Validation)
        );
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_fetch_transport_error_applies_nothing() {
        let remote = MemoryRemote::new().with_group("Testers").disconnect_after(0);
        let inv = invocation(ResourceKind::Group, "Testers", json!({ "members": ["bob"] }));

        let result = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(result.failed());
        assert!(!result.changed);
        assert!(result.outcomes.is_empty());
        assert_eq!(remote.calls(), vec!["get group/Testers".to_string()]);
    }

    #[test]
    fn test_check_mode_plans_without_writing() {
        let remote = MemoryRemote::new().with_resource(testers(&["alice"]));
        let mut inv = invocation(
            ResourceKind::Group,
            "Testers",
            json!({ "members": ["bob"], "description": "QA" }),
        );
        inv.check_mode = true;

        let result = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(result.changed);
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.message(), "3 change(s) planned");
        assert_eq!(remote.write_count(), 0);
    }

    #[test]
    fn test_absent() {
        let remote = MemoryRemote::new().with_project("tools");
        let mut inv = invocation(ResourceKind::Project, "tools", json!({}));
        inv.state = Presence::Absent;

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(first.changed);
        assert_eq!(first.output().diff[0]["action"], "delete");

        let second = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(!second.changed);
        assert!(!second.failed());
    }

    #[test]
    fn test_cancelled_before_start() {
        let remote = MemoryRemote::new().with_group("Testers");
        let token = CancelToken::new();
        token.cancel();
        let inv = invocation(ResourceKind::Group, "Testers", json!({ "members": ["bob"] }));

        let result = reconcile(&remote, &inv, &ApplyContext::with_cancel(false, token));
        assert_eq!(result.terminal, Some(Error::Cancelled));
        assert!(remote.calls().is_empty());
    }

    #[test]
    fn test_project_access_rules_replace() {
        let mut state = ResourceState::empty(ResourceKind::Project, "tools");
        state.set(
            "access_rules",
            FieldValue::list(["refs/heads/* read ALLOW g1", "refs/heads/* push ALLOW g2"]),
        );
        let remote = MemoryRemote::new().with_resource(state);
        let inv = invocation(
            ResourceKind::Project,
            "tools",
            json!({
                "state": "hidden",
                "access_rules": ["refs/heads/* read allow g1", "refs/heads/* push allow g3"]
            }),
        );

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        let output = first.output();
        assert_eq!(output.diff.len(), 2);
        assert_eq!(output.diff[0]["field"], "state");
        assert_eq!(output.diff[1]["action"], "replace");
        assert_eq!(
            output.diff[1]["to"],
            json!(["refs/heads/* push ALLOW g3", "refs/heads/* read ALLOW g1"])
        );

        assert!(!reconcile(&remote, &inv, &ApplyContext::default()).changed);
    }

    #[test]
    fn test_access_rules_in_any_order_are_stable() {
        let remote = MemoryRemote::new().with_project("tools");
        let inv = invocation(
            ResourceKind::Project,
            "tools",
            json!({
                "access_rules": [
                    "refs/heads/* read ALLOW g1",
                    "refs/tags/* read ALLOW g1",
                    "refs/heads/* push ALLOW g1"
                ]
            }),
        );

        assert!(reconcile(&remote, &inv, &ApplyContext::default()).changed);
        for _ in 0..2 {
            let again = reconcile(&remote, &inv, &ApplyContext::default());
            assert!(!again.changed);
            assert!(again.outcomes.is_empty());
        }
        assert_eq!(remote.write_count(), 1);

        // the same rules declared in another order are already in place
        let reordered = invocation(
            ResourceKind::Project,
            "tools",
            json!({
                "access_rules": [
                    "refs/tags/* read ALLOW g1",
                    "refs/heads/* push ALLOW g1",
                    "refs/heads/* read ALLOW g1"
                ]
            }),
        );
        assert!(!reconcile(&remote, &reordered, &ApplyContext::default()).changed);
    }

    #[test]
    fn test_create_writes_scalars_matching_empty_values() {
        // accounts come up active and the create call only takes name and email
        let remote = MemoryRemote::new()
            .create_default("active", FieldValue::Bool(true))
            .create_accepts(&["full_name", "email"]);
        let inv = invocation(
            ResourceKind::Account,
            "jdoe",
            json!({ "full_name": "John", "active": false }),
        );

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(first.changed);
        let ops: Vec<String> = first
            .outcomes
            .iter()
            .map(|o| o.operation.to_string())
            .collect();
        assert_eq!(ops, vec!["create (with full_name)", "active: false -> false"]);
        let state = remote.state(ResourceKind::Account, "jdoe").unwrap();
        assert_eq!(state.get("active"), Some(&FieldValue::Bool(false)));

        let second = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(!second.changed);
        assert!(second.outcomes.is_empty());
    }

    #[test]
    fn test_create_seeds_declared_empty_values() {
        let remote = MemoryRemote::new().create_default("visible_to_all", FieldValue::Bool(true));
        let inv = invocation(
            ResourceKind::Group,
            "Testers",
            json!({ "visible_to_all": false, "description": "" }),
        );

        let first = reconcile(&remote, &inv, &ApplyContext::default());
        assert_eq!(first.outcomes.len(), 1);
        assert_eq!(
            first.outcomes[0].operation.to_string(),
            "create (with description, visible_to_all)"
        );
        assert!(!reconcile(&remote, &inv, &ApplyContext::default()).changed);
    }

    #[test]
    fn test_identity_is_trimmed_when_parsed() {
        let remote = MemoryRemote::new().with_account("jdoe");
        let inv: Invocation = serde_json::from_value(json!({
            "kind": "account",
            "identity": " jdoe ",
            "spec": { "username": "jdoe" }
        }))
        .unwrap();
        assert_eq!(inv.identity, "jdoe");

        let result = reconcile(&remote, &inv, &ApplyContext::default());
        assert!(!result.failed());
        assert!(!result.changed);
    }
}
