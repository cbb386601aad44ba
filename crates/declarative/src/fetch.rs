//! State fetcher - reads a resource from the remote and maps the raw record
//! into a complete [`ResourceState`]

use crate::access::flatten_sections;
use crate::context::Remote;
use crate::error::Result;
use crate::resource::{FieldSpec, FieldType, ResourceKind, Source};
use crate::types::{FieldValue, ResourceState};
use serde_json::Value;
use std::collections::BTreeSet;

/// Fetch the current state of a resource.
///
/// Fails with [`Error::NotFound`](crate::Error::NotFound) when the resource
/// does not exist, so the caller can take the create path. Performs reads
/// only.
pub fn fetch(remote: &dyn Remote, kind: ResourceKind, identity: &str) -> Result<ResourceState> {
    let raw = remote.get(kind, identity)?;
    log::debug!("Raw {kind} record for {identity}: {raw}");
    Ok(from_raw(kind, identity, &raw))
}

/// Map a raw record into a complete state.
///
/// Fields the record does not carry, or carries in an unexpected shape, take
/// the field type's empty value. The identity field always holds `identity`.
pub fn from_raw(kind: ResourceKind, identity: &str, raw: &Value) -> ResourceState {
    let mut state = ResourceState::empty(kind, identity);

    for spec in kind.schema() {
        if spec.name == kind.identity_field() {
            continue;
        }
        if let Some(value) = read_field(spec, raw) {
            state.set(spec.name, value);
        }
    }

    state
}

fn read_field(spec: &FieldSpec, raw: &Value) -> Option<FieldValue> {
    match spec.source {
        Source::Pointer(pointer) => {
            let value = raw.pointer(pointer)?;
            match spec.ty {
                FieldType::Text => scalar_text(value).map(FieldValue::Text),
                FieldType::Bool => scalar_bool(value).map(FieldValue::Bool),
                FieldType::Choice(_) => scalar_text(value)
                    .filter(|s| !s.is_empty())
                    .map(|s| FieldValue::Text(s.to_uppercase())),
                FieldType::Set | FieldType::List => None,
            }
        }
        Source::Each { pointer, keys } => {
            let items = raw.pointer(pointer)?.as_array()?;
            let members = items.iter().filter_map(|item| member_of(item, keys));
            match spec.ty {
                FieldType::Set => Some(FieldValue::Set(members.collect::<BTreeSet<_>>())),
                FieldType::List => Some(FieldValue::List(members.collect())),
                _ => None,
            }
        }
        Source::AccessSections(pointer) => {
            let rules = flatten_sections(raw.pointer(pointer)?);
            Some(FieldValue::List(
                rules.iter().map(ToString::to_string).collect(),
            ))
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        // The server answers flag endpoints with "ok" or an empty body
        Value::String(s) => Some(matches!(s.trim(), "ok" | "true")),
        Value::Number(n) => Some(n.as_i64() == Some(1)),
        _ => None,
    }
}

fn member_of(item: &Value, keys: &[&str]) -> Option<String> {
    let member = match item {
        Value::String(s) => Some(s.as_str()),
        Value::Object(_) => keys.iter().find_map(|k| item.get(*k).and_then(Value::as_str)),
        _ => None,
    }?;
    let member = member.trim();
    (!member.is_empty()).then(|| member.to_string())
}
