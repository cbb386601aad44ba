//! Core types for reconciliation

use crate::resource::{FieldType, ResourceKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Caller-supplied desired state: field name to free-form value.
pub type DeclaredSpec = serde_json::Map<String, serde_json::Value>;

/// A typed field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Text(String),
    Set(BTreeSet<String>),
    List(Vec<String>),
}

impl FieldValue {
    /// Build a set value from anything yielding strings.
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    /// Build a list value from anything yielding strings.
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) if s.is_empty() => write!(f, "\"\""),
            Self::Text(s) => write!(f, "{s}"),
            Self::Set(items) => {
                let joined: Vec<&str> = items.iter().map(String::as_str).collect();
                write!(f, "{{{}}}", joined.join(", "))
            }
            Self::List(items) => write!(f, "[{}]", items.join(", ")),
        }
    }
}

/// Desired value of one field after normalization
///
/// Absence and explicit emptiness are different requests: an unmanaged
/// field is never diffed, a cleared field is driven to its empty value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Desired {
    /// Not mentioned by the caller
    #[default]
    Unmanaged,
    /// Explicitly set to a value
    Value(FieldValue),
    /// Explicitly emptied (`null`, `""` or `[]`)
    Cleared,
}

impl Desired {
    /// The value the field should end up with, or `None` if unmanaged.
    pub fn target(&self, ty: &FieldType) -> Option<FieldValue> {
        match self {
            Self::Unmanaged => None,
            Self::Value(v) => Some(v.clone()),
            Self::Cleared => Some(ty.empty()),
        }
    }

    pub fn is_managed(&self) -> bool {
        !matches!(self, Self::Unmanaged)
    }
}

/// Complete current state of one resource, as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceState {
    kind: ResourceKind,
    fields: BTreeMap<&'static str, FieldValue>,
}

impl ResourceState {
    /// State of a resource that does not exist yet: every field empty except
    /// the identity field.
    pub fn empty(kind: ResourceKind, identity: &str) -> Self {
        let mut fields: BTreeMap<&'static str, FieldValue> = kind
            .schema()
            .iter()
            .map(|f| (f.name, f.ty.empty()))
            .collect();
        fields.insert(kind.identity_field(), FieldValue::text(identity));
        Self { kind, fields }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Value of a field. Always `Some` for names in the kind's schema.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Replace a field value. Names outside the schema are ignored.
    pub fn set(&mut self, name: &str, value: FieldValue) {
        if let Some(spec) = self.kind.field(name) {
            self.fields.insert(spec.name, value);
        }
    }

    /// Fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> + '_ {
        self.kind
            .schema()
            .iter()
            .filter_map(|f| self.fields.get(f.name).map(|v| (f.name, v)))
    }

    /// Whether every schema field carries a value.
    pub fn is_complete(&self) -> bool {
        self.kind
            .schema()
            .iter()
            .all(|f| self.fields.contains_key(f.name))
    }

    /// JSON object in canonical field order.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    serde_json::to_value(value).unwrap_or(serde_json::Value::Null),
                )
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Normalized desired state of one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    kind: ResourceKind,
    fields: BTreeMap<&'static str, Desired>,
}

impl DesiredState {
    /// Desired state with every field unmanaged.
    pub fn unmanaged(kind: ResourceKind) -> Self {
        Self {
            kind,
            fields: kind
                .schema()
                .iter()
                .map(|f| (f.name, Desired::Unmanaged))
                .collect(),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Desired value of a field; unknown names read as unmanaged.
    pub fn get(&self, name: &str) -> &Desired {
        static UNMANAGED: Desired = Desired::Unmanaged;
        self.fields.get(name).unwrap_or(&UNMANAGED)
    }

    pub fn set(&mut self, name: &str, desired: Desired) {
        if let Some(spec) = self.kind.field(name) {
            self.fields.insert(spec.name, desired);
        }
    }

    /// Names of managed fields, in canonical order.
    pub fn managed_fields(&self) -> Vec<&'static str> {
        self.kind
            .schema()
            .iter()
            .filter(|f| self.get(f.name).is_managed())
            .map(|f| f.name)
            .collect()
    }
}

/// Whether the resource should exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    #[default]
    Present,
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_state_is_complete() {
        for kind in ResourceKind::ALL {
            let state = ResourceState::empty(kind, "x");
            assert!(state.is_complete());
            assert_eq!(
                state.get(kind.identity_field()),
                Some(&FieldValue::text("x"))
            );
        }
    }

    #[test]
    fn test_state_iterates_in_canonical_order() {
        let state = ResourceState::empty(ResourceKind::Group, "Testers");
        let names: Vec<_> = state.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec![
                "name",
                "description",
                "owner",
                "visible_to_all",
                "members",
                "included_groups"
            ]
        );
    }

    #[test]
    fn test_set_ignores_unknown_field() {
        let mut state = ResourceState::empty(ResourceKind::Project, "tools");
        state.set("owner", FieldValue::text("admins"));
        assert!(state.get("owner").is_none());
    }

    #[test]
    fn test_cleared_targets_empty_value() {
        assert_eq!(
            Desired::Cleared.target(&FieldType::Set),
            Some(FieldValue::Set(BTreeSet::new()))
        );
        assert_eq!(Desired::Unmanaged.target(&FieldType::Text), None);
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::set(["b", "a"]).to_string(), "{a, b}");
        assert_eq!(FieldValue::list(["y", "x"]).to_string(), "[y, x]");
        assert_eq!(FieldValue::text("").to_string(), "\"\"");
    }

    #[test]
    fn test_presence_defaults_to_present() {
        assert_eq!(Presence::default(), Presence::Present);
        let p: Presence = serde_json::from_str("\"absent\"").unwrap();
        assert_eq!(p, Presence::Absent);
    }
}
