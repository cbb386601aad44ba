//! Diff engine
//!
//! [`diff`] is a pure function of the current and desired state. Fields are
//! visited in the kind's canonical order and unmanaged fields are skipped, so
//! identical inputs always give the same diffs in the same order.

use crate::resource::FieldType;
use crate::types::{DesiredState, FieldValue, ResourceState};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::fmt;

/// How one field changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Overwrite a scalar
    Set { from: FieldValue, to: FieldValue },
    /// Add one member to a set
    Add(String),
    /// Remove one member from a set
    Remove(String),
    /// Replace an ordered list as a whole
    Replace { from: Vec<String>, to: Vec<String> },
}

impl Change {
    /// Action name used in reports.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Add(_) => "add",
            Self::Remove(_) => "remove",
            Self::Replace { .. } => "replace",
        }
    }

    /// The `(from, to)` pair shown to the caller.
    pub fn values(&self) -> (Value, Value) {
        match self {
            Self::Set { from, to } => (to_json(from), to_json(to)),
            Self::Add(member) => (Value::Null, Value::String(member.clone())),
            Self::Remove(member) => (Value::String(member.clone()), Value::Null),
            Self::Replace { from, to } => (
                Value::from(from.clone()),
                Value::from(to.clone()),
            ),
        }
    }
}

/// One field-level change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub field: &'static str,
    pub change: Change,
}

impl FieldDiff {
    pub fn new(field: &'static str, change: Change) -> Self {
        Self { field, change }
    }

    /// Whether this diff writes a scalar and may seed a create.
    pub fn is_scalar(&self) -> bool {
        matches!(self.change, Change::Set { .. })
    }
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.change {
            Change::Set { from, to } => write!(f, "{}: {from} -> {to}", self.field),
            Change::Add(member) => write!(f, "{}: + {member}", self.field),
            Change::Remove(member) => write!(f, "{}: - {member}", self.field),
            Change::Replace { from, to } => write!(
                f,
                "{}: {} -> {}",
                self.field,
                FieldValue::List(from.clone()),
                FieldValue::List(to.clone())
            ),
        }
    }
}

impl Serialize for FieldDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (from, to) = self.change.values();
        let mut s = serializer.serialize_struct("FieldDiff", 4)?;
        s.serialize_field("field", self.field)?;
        s.serialize_field("action", self.change.action())?;
        s.serialize_field("from", &from)?;
        s.serialize_field("to", &to)?;
        s.end()
    }
}

fn to_json(value: &FieldValue) -> Value {
    match value {
        FieldValue::Bool(b) => Value::Bool(*b),
        FieldValue::Text(s) => Value::String(s.clone()),
        FieldValue::Set(items) => Value::from(items.iter().cloned().collect::<Vec<_>>()),
        FieldValue::List(items) => Value::from(items.clone()),
    }
}

/// Compute the ordered field diffs that take `current` to `desired`.
///
/// Returns an empty list when every managed field already matches.
pub fn diff(current: &ResourceState, desired: &DesiredState) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();

    for spec in current.kind().schema() {
        let Some(target) = desired.get(spec.name).target(&spec.ty) else {
            continue;
        };
        let empty = spec.ty.empty();
        let actual = current.get(spec.name).unwrap_or(&empty);

        match spec.ty {
            FieldType::Text | FieldType::Bool | FieldType::Choice(_) => {
                if *actual != target {
                    diffs.push(FieldDiff::new(
                        spec.name,
                        Change::Set {
                            from: actual.clone(),
                            to: target,
                        },
                    ));
                }
            }
            FieldType::Set => {
                let (Some(have), Some(want)) = (actual.as_set(), target.as_set()) else {
                    continue;
                };
                diffs.extend(
                    want.difference(have)
                        .map(|m| FieldDiff::new(spec.name, Change::Add(m.clone()))),
                );
                diffs.extend(
                    have.difference(want)
                        .map(|m| FieldDiff::new(spec.name, Change::Remove(m.clone()))),
                );
            }
            FieldType::List => {
                let (Some(have), Some(want)) = (actual.as_list(), target.as_list()) else {
                    continue;
                };
                if have != want {
                    diffs.push(FieldDiff::new(
                        spec.name,
                        Change::Replace {
                            from: have.to_vec(),
                            to: want.to_vec(),
                        },
                    ));
                }
            }
        }
    }

    diffs
}

/// Compute the diffs that build `desired` on a resource being created.
///
/// Every managed scalar is set, even to its empty value, since the server may
/// create the resource with a different default. Collection diffs are taken
/// against an empty resource. Canonical order is kept.
pub fn creation_diff(identity: &str, desired: &DesiredState) -> Vec<FieldDiff> {
    let kind = desired.kind();
    let empty = ResourceState::empty(kind, identity);
    let collections = diff(&empty, desired);
    let mut diffs = Vec::new();

    for spec in kind.schema() {
        if spec.name == kind.identity_field() {
            continue;
        }
        if spec.ty.is_scalar() {
            if let Some(target) = desired.get(spec.name).target(&spec.ty) {
                diffs.push(FieldDiff::new(
                    spec.name,
                    Change::Set {
                        from: spec.ty.empty(),
                        to: target,
                    },
                ));
            }
        } else {
            diffs.extend(collections.iter().filter(|d| d.field == spec.name).cloned());
        }
    }

    diffs
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Scalar writes
    pub sets: usize,
    /// Set members to add
    pub additions: usize,
    /// Set members to remove
    pub removals: usize,
    /// Whole-list replacements
    pub replacements: usize,
}

impl DiffSummary {
    /// Create a summary from a list of diffs
    pub fn from_diffs<'a>(diffs: impl IntoIterator<Item = &'a FieldDiff>) -> Self {
        let mut summary = Self::default();
        for diff in diffs {
            match diff.change {
                Change::Set { .. } => summary.sets += 1,
                Change::Add(_) => summary.additions += 1,
                Change::Remove(_) => summary.removals += 1,
                Change::Replace { .. } => summary.replacements += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.sets + self.additions + self.removals + self.replacements
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceKind;
    use crate::types::Desired;

    fn group(members: &[&str]) -> ResourceState {
        let mut state = ResourceState::empty(ResourceKind::Group, "Testers");
        state.set("members", FieldValue::set(members.iter().copied()));
        state.set("visible_to_all", FieldValue::Bool(true));
        state
    }

    #[test]
    fn test_set_symmetry() {
        let current = group(&["a", "b"]);
        let mut desired = DesiredState::unmanaged(ResourceKind::Group);
        desired.set("members", Desired::Value(FieldValue::set(["b", "c"])));

        let diffs = diff(&current, &desired);
        assert_eq!(
            diffs,
            vec![
                FieldDiff::new("members", Change::Add("c".into())),
                FieldDiff::new("members", Change::Remove("a".into())),
            ]
        );
    }

    #[test]
    fn test_list_reorder_is_replace() {
        let mut current = ResourceState::empty(ResourceKind::Project, "tools");
        current.set("access_rules", FieldValue::list(["x", "y"]));
        let mut desired = DesiredState::unmanaged(ResourceKind::Project);
        desired.set("access_rules", Desired::Value(FieldValue::list(["y", "x"])));

        let diffs = diff(&current, &desired);
        assert_eq!(diffs.len(), 1);
        assert_eq!(
            diffs[0].change,
            Change::Replace {
                from: vec!["x".into(), "y".into()],
                to: vec!["y".into(), "x".into()],
            }
        );
    }

    #[test]
    fn test_unmanaged_fields_never_diff() {
        let current = group(&["alice"]);
        let desired = DesiredState::unmanaged(ResourceKind::Group);
        assert!(diff(&current, &desired).is_empty());
    }

    #[test]
    fn test_cleared_field_targets_empty() {
        let current = group(&["alice", "bob"]);
        let mut desired = DesiredState::unmanaged(ResourceKind::Group);
        desired.set("members", Desired::Cleared);
        desired.set("visible_to_all", Desired::Cleared);

        let diffs = diff(&current, &desired);
        let rendered: Vec<String> = diffs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "visible_to_all: true -> false",
                "members: - alice",
                "members: - bob"
            ]
        );
    }

    #[test]
    fn test_diff_is_deterministic_and_canonical() {
        let current = group(&["alice"]);
        let mut desired = DesiredState::unmanaged(ResourceKind::Group);
        desired.set("included_groups", Desired::Value(FieldValue::set(["Admins"])));
        desired.set("members", Desired::Value(FieldValue::set(["zed", "bob"])));
        desired.set("description", Desired::Value(FieldValue::text("QA")));

        let first = diff(&current, &desired);
        let second = diff(&current, &desired);
        assert_eq!(first, second);

        let fields: Vec<&str> = first.iter().map(|d| d.field).collect();
        assert_eq!(
            fields,
            vec!["description", "members", "members", "members", "included_groups"]
        );
        assert_eq!(first[1].change, Change::Add("bob".into()));
        assert_eq!(first[2].change, Change::Add("zed".into()));
        assert_eq!(first[3].change, Change::Remove("alice".into()));
    }

    #[test]
    fn test_equal_state_has_no_diffs() {
        let current = group(&["alice"]);
        let mut desired = DesiredState::unmanaged(ResourceKind::Group);
        desired.set("members", Desired::Value(FieldValue::set(["alice"])));
        desired.set("visible_to_all", Desired::Value(FieldValue::Bool(true)));
        assert!(diff(&current, &desired).is_empty());
    }

    #[test]
    fn test_serialized_shape() {
        let add = FieldDiff::new("members", Change::Add("bob".into()));
        let json = serde_json::to_value(&add).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "field": "members", "action": "add", "from": null, "to": "bob" })
        );

        let set = FieldDiff::new(
            "active",
            Change::Set {
                from: FieldValue::Bool(true),
                to: FieldValue::Bool(false),
            },
        );
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["from"], true);
        assert_eq!(json["action"], "set");
    }

    #[test]
    fn test_creation_diff_sets_every_declared_scalar() {
        let mut desired = DesiredState::unmanaged(ResourceKind::Account);
        desired.set("username", Desired::Value(FieldValue::text("jdoe")));
        desired.set("active", Desired::Value(FieldValue::Bool(false)));
        desired.set("full_name", Desired::Value(FieldValue::text("John")));
        desired.set("email", Desired::Cleared);
        desired.set("groups", Desired::Value(FieldValue::set(["Developers"])));

        let diffs = creation_diff("jdoe", &desired);
        let rendered: Vec<String> = diffs.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                r#"email: "" -> """#,
                r#"full_name: "" -> John"#,
                "active: false -> false",
                "groups: + Developers"
            ]
        );
        // email and active match an empty resource, so a plain diff skips them
        assert_eq!(diff(&ResourceState::empty(ResourceKind::Account, "jdoe"), &desired).len(), 2);
    }

    #[test]
    fn test_diff_summary() {
        let diffs = vec![
            FieldDiff::new("members", Change::Add("a".into())),
            FieldDiff::new("members", Change::Add("b".into())),
            FieldDiff::new("members", Change::Remove("c".into())),
        ];
        let summary = DiffSummary::from_diffs(&diffs);
        assert_eq!(summary.additions, 2);
        assert_eq!(summary.removals, 1);
        assert_eq!(summary.total(), 3);
        assert!(summary.has_changes());
        assert!(!DiffSummary::default().has_changes());
    }
}
