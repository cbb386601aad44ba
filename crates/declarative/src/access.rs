//! Project access rules
//!
//! The server stores access as nested maps (ref -> permission -> group ->
//! rule). The engine works with a flat, ordered text form instead:
//!
//! ```text
//! refs/heads/* read ALLOW global:Registered-Users
//! refs/heads/* label-Code-Review ALLOW -2..+2 abc123
//! refs/heads/* push ALLOW force abc123
//! ```
//!
//! The server keeps sections, permissions and rules in maps, so the order it
//! answers with carries no meaning. Rules are always compared in
//! [`canonical_order`].

use serde_json::{Map, Value, json};
use std::fmt;
use std::str::FromStr;

/// Actions a rule may carry.
pub const ACTIONS: &[&str] = &["ALLOW", "DENY", "BLOCK"];

/// One access rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    /// Ref pattern, e.g. `refs/heads/*`
    pub reference: String,
    /// Permission name, e.g. `read`, `label-Code-Review`
    pub permission: String,
    /// ALLOW, DENY or BLOCK
    pub action: String,
    /// Label vote range `min..max`
    pub range: Option<(i64, i64)>,
    /// Force flag, e.g. for force push
    pub force: bool,
    /// Group UUID the rule applies to
    pub group: String,
}

impl AccessRule {
    fn key(&self) -> (&str, &str, &str) {
        (&self.reference, &self.permission, &self.group)
    }
}

impl FromStr for AccessRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            format!("expected '<ref> <permission> <action> [<min>..<max>] [force] <group>', got '{s}'")
        };

        let mut rest = s.trim();
        let mut tokens = Vec::with_capacity(3);
        for _ in 0..3 {
            let end = rest.find(char::is_whitespace).ok_or_else(malformed)?;
            tokens.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }

        let mut range = None;
        let mut force = false;
        while let Some(end) = rest.find(char::is_whitespace) {
            let token = &rest[..end];
            match parse_range(token) {
                Some(parsed) if range.is_none() => range = Some(parsed),
                _ if !force && token.eq_ignore_ascii_case("force") => force = true,
                _ => break,
            }
            rest = rest[end..].trim_start();
        }
        if rest.is_empty() {
            return Err(malformed());
        }
        if let Some((min, max)) = range.filter(|(min, max)| min > max) {
            return Err(format!("range {min}..{max} is empty in '{s}'"));
        }

        let action = tokens[2].to_uppercase();
        if !ACTIONS.contains(&action.as_str()) {
            return Err(format!(
                "unknown action '{}' (expected one of {})",
                tokens[2],
                ACTIONS.join(", ")
            ));
        }

        Ok(Self {
            reference: tokens[0].to_string(),
            permission: tokens[1].to_string(),
            action,
            range,
            force,
            group: rest.to_string(),
        })
    }
}

fn parse_range(token: &str) -> Option<(i64, i64)> {
    let (min, max) = token.split_once("..")?;
    Some((min.parse().ok()?, max.parse().ok()?))
}

impl fmt::Display for AccessRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.reference, self.permission, self.action)?;
        if let Some((min, max)) = self.range {
            write!(f, " {min:+}..{max:+}")?;
        }
        if self.force {
            write!(f, " force")?;
        }
        write!(f, " {}", self.group)
    }
}

/// Sort rules by ref, permission and group.
pub fn canonical_order(rules: &mut [AccessRule]) {
    rules.sort_by(|a, b| a.key().cmp(&b.key()));
}

/// Flatten a `local` access map into rules in [`canonical_order`].
///
/// Entries that are not objects are skipped; a rule without an action is
/// read as ALLOW, which is the server's default.
pub fn flatten_sections(local: &Value) -> Vec<AccessRule> {
    let mut rules = Vec::new();
    let Some(sections) = local.as_object() else {
        return rules;
    };

    for (reference, section) in sections {
        let Some(permissions) = section.get("permissions").and_then(Value::as_object) else {
            continue;
        };
        for (permission, info) in permissions {
            let Some(groups) = info.get("rules").and_then(Value::as_object) else {
                continue;
            };
            for (group, rule) in groups {
                let action = rule
                    .get("action")
                    .and_then(Value::as_str)
                    .unwrap_or("ALLOW")
                    .to_uppercase();
                let min = rule.get("min").and_then(Value::as_i64);
                let max = rule.get("max").and_then(Value::as_i64);
                let range = match (min, max) {
                    (None, None) => None,
                    (min, max) => Some((min.unwrap_or(0), max.unwrap_or(0))),
                };
                rules.push(AccessRule {
                    reference: reference.clone(),
                    permission: permission.clone(),
                    action,
                    range,
                    force: rule.get("force").and_then(Value::as_bool).unwrap_or(false),
                    group: group.clone(),
                });
            }
        }
    }

    canonical_order(&mut rules);
    rules
}

/// Build a `local` access map from rules, grouping by ref then permission in
/// first-seen order.
pub fn build_sections(rules: &[AccessRule]) -> Value {
    let mut sections = Map::new();

    for rule in rules {
        let section = sections
            .entry(rule.reference.clone())
            .or_insert_with(|| json!({ "permissions": {} }));
        let Some(permissions) = section
            .get_mut("permissions")
            .and_then(Value::as_object_mut)
        else {
            continue;
        };
        let permission = permissions
            .entry(rule.permission.clone())
            .or_insert_with(|| json!({ "rules": {} }));
        if let Some(groups) = permission.get_mut("rules").and_then(Value::as_object_mut) {
            groups.insert(rule.group.clone(), rule_info(rule));
        }
    }

    Value::Object(sections)
}

fn rule_info(rule: &AccessRule) -> Value {
    let mut info = Map::new();
    info.insert("action".to_string(), Value::String(rule.action.clone()));
    if let Some((min, max)) = rule.range {
        info.insert("min".to_string(), Value::from(min));
        info.insert("max".to_string(), Value::from(max));
    }
    if rule.force {
        info.insert("force".to_string(), Value::Bool(true));
    }
    Value::Object(info)
}
