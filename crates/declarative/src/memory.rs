//! In-memory [`Remote`] for tests
//!
//! Stores typed states and serves them back in the server's raw record shape,
//! so the fetcher runs against it unchanged. Failures can be injected per
//! field or after a number of writes.

use crate::access::{AccessRule, build_sections};
use crate::context::Remote;
use crate::error::{Error, Result};
use crate::resource::{FieldType, ResourceKind, Source};
use crate::types::{FieldValue, ResourceState};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Store {
    resources: BTreeMap<(ResourceKind, String), ResourceState>,
    calls: Vec<String>,
    writes: usize,
}

/// Fake review server backed by a map
#[derive(Debug, Default)]
pub struct MemoryRemote {
    store: Mutex<Store>,
    rejected_field: Option<String>,
    disconnect_after: Option<usize>,
    create_accepts: Option<Vec<&'static str>>,
    create_defaults: Vec<(&'static str, FieldValue)>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource in the given state.
    pub fn with_resource(self, state: ResourceState) -> Self {
        let identity = state
            .get(state.kind().identity_field())
            .and_then(FieldValue::as_str)
            .unwrap_or_default()
            .to_string();
        self.lock().resources.insert((state.kind(), identity), state);
        self
    }

    pub fn with_account(self, username: &str) -> Self {
        self.with_resource(ResourceState::empty(ResourceKind::Account, username))
    }

    pub fn with_group(self, name: &str) -> Self {
        self.with_resource(ResourceState::empty(ResourceKind::Group, name))
    }

    pub fn with_project(self, name: &str) -> Self {
        self.with_resource(ResourceState::empty(ResourceKind::Project, name))
    }

    /// Reject every write to `field`.
    pub fn reject_field(mut self, field: &str) -> Self {
        self.rejected_field = Some(field.to_string());
        self
    }

    /// Fail every call with a transport error once `writes` writes have
    /// succeeded.
    pub fn disconnect_after(mut self, writes: usize) -> Self {
        self.disconnect_after = Some(writes);
        self
    }

    /// Only seed these fields on create; by default every seed is taken.
    pub fn create_accepts(mut self, fields: &[&'static str]) -> Self {
        self.create_accepts = Some(fields.to_vec());
        self
    }

    /// Give newly created resources `value` for `field` unless the create
    /// seeds it.
    pub fn create_default(mut self, field: &'static str, value: FieldValue) -> Self {
        self.create_defaults.push((field, value));
        self
    }

    /// Current stored state of a resource.
    pub fn state(&self, kind: ResourceKind, identity: &str) -> Option<ResourceState> {
        self.lock()
            .resources
            .get(&(kind, identity.to_string()))
            .cloned()
    }

    /// Every call made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of successful writes.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and check the connection is still up.
    fn enter(&self, store: &mut Store, call: String) -> Result<()> {
        store.calls.push(call);
        match self.disconnect_after {
            Some(limit) if store.writes >= limit => {
                Err(Error::transport("connection reset by peer"))
            }
            _ => Ok(()),
        }
    }

    fn check_field(&self, kind: ResourceKind, field: &str) -> Result<()> {
        if self.rejected_field.as_deref() == Some(field) {
            return Err(Error::rejected(format!("{kind} field '{field}' refused")));
        }
        if field == kind.identity_field() {
            return Err(Error::rejected(format!("{kind} {field} cannot be changed")));
        }
        Ok(())
    }

    fn read(&self, kind: ResourceKind, identity: &str) -> Result<Value> {
        let mut store = self.lock();
        self.enter(&mut store, format!("get {kind}/{identity}"))?;
        store
            .resources
            .get(&(kind, identity.to_string()))
            .map(render)
            .ok_or_else(|| Error::NotFound {
                kind,
                identity: identity.to_string(),
            })
    }

    fn modify(
        &self,
        call: String,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        update: impl FnOnce(&mut FieldValue) -> Result<()>,
    ) -> Result<()> {
        let mut store = self.lock();
        self.enter(&mut store, call)?;
        self.check_field(kind, field)?;

        let state = store
            .resources
            .get_mut(&(kind, identity.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind,
                identity: identity.to_string(),
            })?;
        let mut value = state
            .get(field)
            .cloned()
            .ok_or_else(|| Error::rejected(format!("{kind} has no field '{field}'")))?;
        update(&mut value)?;
        state.set(field, value);
        store.writes += 1;
        Ok(())
    }
}

/// Render a typed state in the raw record shape the fetcher reads.
fn render(state: &ResourceState) -> Value {
    let mut raw = Value::Object(Map::new());

    for spec in state.kind().schema() {
        let Some(value) = state.get(spec.name) else {
            continue;
        };
        let (pointer, rendered) = match (spec.source, value) {
            (Source::Pointer(p), FieldValue::Bool(b)) => (p, Value::Bool(*b)),
            (Source::Pointer(p), FieldValue::Text(s)) => (p, Value::String(s.clone())),
            (Source::Each { pointer, keys }, FieldValue::Set(items)) => {
                let key = keys.first().copied().unwrap_or("name");
                let members: Value = items
                    .iter()
                    .map(|item| {
                        let mut member = Map::new();
                        member.insert(key.to_string(), Value::String(item.clone()));
                        Value::Object(member)
                    })
                    .collect();
                (pointer, members)
            }
            (Source::AccessSections(p), FieldValue::List(items)) => {
                let rules: Vec<AccessRule> =
                    items.iter().filter_map(|r| r.parse().ok()).collect();
                (p, build_sections(&rules))
            }
            _ => continue,
        };
        insert_at(&mut raw, pointer, rendered);
    }

    raw
}

fn insert_at(root: &mut Value, pointer: &str, value: Value) {
    let mut segments: Vec<&str> = pointer.split('/').skip(1).collect();
    let Some(last) = segments.pop() else {
        return;
    };

    let mut node = root;
    for segment in segments {
        let Some(map) = node.as_object_mut() else {
            return;
        };
        node = map
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if let Some(map) = node.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

impl Remote for MemoryRemote {
    fn get_account(&self, username: &str) -> Result<Value> {
        self.read(ResourceKind::Account, username)
    }

    fn get_group(&self, name: &str) -> Result<Value> {
        self.read(ResourceKind::Group, name)
    }

    fn get_project(&self, name: &str) -> Result<Value> {
        self.read(ResourceKind::Project, name)
    }

    fn create(
        &self,
        kind: ResourceKind,
        identity: &str,
        seed: &[(&'static str, FieldValue)],
    ) -> Result<Vec<&'static str>> {
        let mut store = self.lock();
        self.enter(&mut store, format!("create {kind}/{identity}"))?;

        let key = (kind, identity.to_string());
        if store.resources.contains_key(&key) {
            return Err(Error::rejected(format!("{kind} '{identity}' already exists")));
        }

        let mut state = ResourceState::empty(kind, identity);
        for (field, value) in &self.create_defaults {
            state.set(field, value.clone());
        }
        let mut accepted = Vec::new();
        for (field, value) in seed {
            let taken = self
                .create_accepts
                .as_ref()
                .is_none_or(|fields| fields.contains(field));
            if taken && *field != kind.identity_field() {
                state.set(field, value.clone());
                accepted.push(*field);
            }
        }

        store.resources.insert(key, state);
        store.writes += 1;
        Ok(accepted)
    }

    fn delete(&self, kind: ResourceKind, identity: &str) -> Result<()> {
        let mut store = self.lock();
        self.enter(&mut store, format!("delete {kind}/{identity}"))?;
        store
            .resources
            .remove(&(kind, identity.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind,
                identity: identity.to_string(),
            })?;
        store.writes += 1;
        Ok(())
    }

    fn set_field(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        let ty = kind.field(field).map(|f| f.ty);
        self.modify(
            format!("set {kind}/{identity} {field}"),
            kind,
            identity,
            field,
            |current| {
                if !ty.is_some_and(|t| t.is_scalar()) {
                    return Err(Error::rejected(format!("{field} is not a scalar")));
                }
                *current = value.clone();
                Ok(())
            },
        )
    }

    fn add_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<()> {
        self.modify(
            format!("add {kind}/{identity} {field} {member}"),
            kind,
            identity,
            field,
            |current| match current {
                FieldValue::Set(items) => {
                    items.insert(member.to_string());
                    Ok(())
                }
                _ => Err(Error::rejected(format!("{field} is not a set"))),
            },
        )
    }

    fn remove_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<()> {
        self.modify(
            format!("remove {kind}/{identity} {field} {member}"),
            kind,
            identity,
            field,
            |current| match current {
                FieldValue::Set(items) => {
                    items.remove(member);
                    Ok(())
                }
                _ => Err(Error::rejected(format!("{field} is not a set"))),
            },
        )
    }

    fn replace_sequence(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        values: &[String],
    ) -> Result<()> {
        let is_list = kind.field(field).is_some_and(|f| f.ty == FieldType::List);
        self.modify(
            format!("replace {kind}/{identity} {field}"),
            kind,
            identity,
            field,
            |current| {
                if !is_list {
                    return Err(Error::rejected(format!("{field} is not a list")));
                }
                *current = FieldValue::List(values.to_vec());
                Ok(())
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fetch;

    #[test]
    fn test_round_trips_through_fetcher() {
        let mut state = ResourceState::empty(ResourceKind::Group, "Testers");
        state.set("members", FieldValue::set(["alice", "bob"]));
        state.set("visible_to_all", FieldValue::Bool(true));
        state.set("description", FieldValue::text("QA team"));
        let remote = MemoryRemote::new().with_resource(state.clone());

        let fetched = fetch(&remote, ResourceKind::Group, "Testers").unwrap();
        assert_eq!(fetched, state);
    }

    #[test]
    fn test_project_access_round_trip() {
        let mut state = ResourceState::empty(ResourceKind::Project, "tools");
        state.set(
            "access_rules",
            FieldValue::list([
                "refs/tags/* push DENY g2",
                "refs/heads/* label-Verified ALLOW -1..+1 g1",
            ]),
        );
        let remote = MemoryRemote::new().with_resource(state);

        let fetched = fetch(&remote, ResourceKind::Project, "tools").unwrap();
        assert_eq!(
            fetched.get("access_rules"),
            Some(&FieldValue::list([
                "refs/heads/* label-Verified ALLOW -1..+1 g1",
                "refs/tags/* push DENY g2",
            ]))
        );
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let remote = MemoryRemote::new();
        let err = remote.get(ResourceKind::Account, "ghost").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_writes_are_counted_and_logged() {
        let remote = MemoryRemote::new().with_group("Testers");
        remote
            .add_set_member(ResourceKind::Group, "Testers", "members", "bob")
            .unwrap();
        assert!(
            remote
                .set_field(
                    ResourceKind::Group,
                    "Testers",
                    "members",
                    &FieldValue::text("x")
                )
                .is_err()
        );
        assert_eq!(remote.write_count(), 1);
        assert_eq!(
            remote.calls(),
            vec![
                "add group/Testers members bob".to_string(),
                "set group/Testers members".to_string()
            ]
        );
    }

    #[test]
    fn test_disconnect_fails_reads_too() {
        let remote = MemoryRemote::new().with_group("Testers").disconnect_after(0);
        let err = remote.get(ResourceKind::Group, "Testers").unwrap_err();
        assert!(err.is_terminal());
    }

    #[test]
    fn test_create_defaults_yield_to_seed() {
        let remote = MemoryRemote::new()
            .create_default("active", FieldValue::Bool(true))
            .create_default("full_name", FieldValue::text("Unnamed"));
        remote
            .create(
                ResourceKind::Account,
                "jdoe",
                &[("full_name", FieldValue::text("John"))],
            )
            .unwrap();

        let state = remote.state(ResourceKind::Account, "jdoe").unwrap();
        assert_eq!(state.get("active"), Some(&FieldValue::Bool(true)));
        assert_eq!(state.get("full_name"), Some(&FieldValue::text("John")));
    }

    #[test]
    fn test_create_rejects_existing() {
        let remote = MemoryRemote::new().with_group("Testers");
        assert!(remote.create(ResourceKind::Group, "Testers", &[]).is_err());
    }
}
