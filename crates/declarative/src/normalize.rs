//! Spec normalizer - validates and coerces a declared spec into a
//! [`DesiredState`]
//!
//! Keys missing from the declared spec stay [`Desired::Unmanaged`]; explicit
//! `null`, `""` and `[]` become [`Desired::Cleared`]. The caller's map is only
//! read, never modified.

use crate::access::{AccessRule, canonical_order};
use crate::error::{Error, Result};
use crate::resource::{FieldSpec, FieldType, ResourceKind, Source};
use crate::types::{DeclaredSpec, Desired, DesiredState, FieldValue};
use serde_json::Value;
use std::collections::HashSet;

const TRUTHY: &[&str] = &["yes", "on", "1", "true", "y", "t"];
const FALSY: &[&str] = &["no", "off", "0", "false", "n", "f"];

/// Normalize a declared spec for `kind`.
///
/// Every key must name a field of the kind's schema; the first unknown key
/// fails with [`Error::UnknownField`].
pub fn normalize(kind: ResourceKind, spec: &DeclaredSpec) -> Result<DesiredState> {
    let mut desired = DesiredState::unmanaged(kind);

    for (key, raw) in spec {
        let field = kind.field(key).ok_or_else(|| Error::UnknownField {
            kind,
            key: key.clone(),
        })?;
        desired.set(field.name, coerce(kind, field, raw)?);
    }

    log::debug!(
        "Normalized {kind} spec, managed fields: {}",
        desired.managed_fields().join(", ")
    );
    Ok(desired)
}

/// Normalize a declared spec and check it against the invocation identity.
///
/// A declared identity field must equal `identity`; resources cannot be
/// renamed.
pub fn normalize_for(
    kind: ResourceKind,
    identity: &str,
    spec: &DeclaredSpec,
) -> Result<DesiredState> {
    if identity.trim().is_empty() {
        return Err(Error::invalid(
            kind,
            kind.identity_field(),
            "identity must not be empty",
        ));
    }

    let desired = normalize(kind, spec)?;
    match desired.get(kind.identity_field()) {
        Desired::Value(FieldValue::Text(declared)) if declared != identity => Err(Error::invalid(
            kind,
            kind.identity_field(),
            format!("'{declared}' does not match the identity '{identity}' (renames are not supported)"),
        )),
        Desired::Cleared => Err(Error::invalid(
            kind,
            kind.identity_field(),
            "identity cannot be cleared",
        )),
        _ => Ok(desired),
    }
}

fn coerce(kind: ResourceKind, field: &FieldSpec, raw: &Value) -> Result<Desired> {
    if raw.is_null() {
        return Ok(Desired::Cleared);
    }

    let invalid = |message: String| Error::invalid(kind, field.name, message);

    match field.ty {
        FieldType::Text => {
            let text = scalar(raw).ok_or_else(|| {
                invalid(format!("expected text, got {}", type_name(raw)))
            })?;
            Ok(if text.is_empty() {
                Desired::Cleared
            } else {
                Desired::Value(FieldValue::Text(text))
            })
        }
        FieldType::Bool => parse_bool(raw)
            .map(|b| Desired::Value(FieldValue::Bool(b)))
            .ok_or_else(|| invalid(format!("expected a boolean, got {raw}"))),
        FieldType::Choice(tokens) => {
            let text = scalar(raw).ok_or_else(|| {
                invalid(format!("expected one of {}, got {}", tokens.join(", "), type_name(raw)))
            })?;
            if text.is_empty() {
                return Ok(Desired::Cleared);
            }
            let upper = text.to_uppercase();
            if tokens.contains(&upper.as_str()) {
                Ok(Desired::Value(FieldValue::Text(upper)))
            } else {
                Err(invalid(format!(
                    "'{text}' is not one of {}",
                    tokens.join(", ")
                )))
            }
        }
        FieldType::Set => {
            let items = elements(raw).map_err(invalid)?;
            Ok(if items.is_empty() {
                Desired::Cleared
            } else {
                Desired::Value(FieldValue::set(items))
            })
        }
        FieldType::List => {
            let mut items = elements(raw).map_err(invalid)?;
            if matches!(field.source, Source::AccessSections(_)) {
                items = access_rules(&items).map_err(invalid)?;
            }
            Ok(if items.is_empty() {
                Desired::Cleared
            } else {
                Desired::Value(FieldValue::List(items))
            })
        }
    }
}

fn scalar(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_bool(raw: &Value) -> Option<bool> {
    match raw {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => {
            let token = s.trim().to_lowercase();
            if TRUTHY.contains(&token.as_str()) {
                Some(true)
            } else if FALSY.contains(&token.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Collection elements, trimmed, with empty entries dropped. A bare string
/// counts as a one-element collection.
fn elements(raw: &Value) -> std::result::Result<Vec<String>, String> {
    let items = match raw {
        Value::Array(items) => items.as_slice(),
        Value::String(_) | Value::Number(_) => std::slice::from_ref(raw),
        other => return Err(format!("expected a list, got {}", type_name(other))),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(_) | Value::Number(_) => {
                if let Some(text) = scalar(item).filter(|s| !s.is_empty()) {
                    out.push(text);
                }
            }
            Value::Null => {}
            other => {
                return Err(format!(
                    "list elements must be strings, got {}",
                    type_name(other)
                ));
            }
        }
    }
    Ok(out)
}

/// Parse access rules into canonical text and order. Two rules for the same
/// ref, permission and group cannot both be stored by the server.
fn access_rules(items: &[String]) -> std::result::Result<Vec<String>, String> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(items.len());

    for item in items {
        let rule: AccessRule = item.parse()?;
        let key = (
            rule.reference.clone(),
            rule.permission.clone(),
            rule.group.clone(),
        );
        if !seen.insert(key) {
            return Err(format!(
                "duplicate rule for {} {} {}",
                rule.reference, rule.permission, rule.group
            ));
        }
        rules.push(rule);
    }

    canonical_order(&mut rules);
    Ok(rules.iter().map(ToString::to_string).collect())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
