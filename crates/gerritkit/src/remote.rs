//! [`Remote`] implementation over the Gerrit REST API.

use crate::client::{Body, Client, segment};
use crate::error::{Error, Result};
use crate::types::{ClientConfig, SshKeyInfo};
use declarative::{AccessRule, FieldValue, Remote, ResourceKind, build_sections};
use serde_json::{Map, Value, json};

/// Gerrit server reached over REST.
pub struct GerritRemote {
    client: Client,
}

impl GerritRemote {
    /// Connect settings are validated here; no request is sent.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: Client::new(config)?,
        })
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn read_account(&self, username: &str) -> Result<Value> {
        let base = resource_path(ResourceKind::Account, username);
        let mut account = self.client.get(&base)?;

        let ssh_keys = self.client.get(&format!("{base}/sshkeys"))?;
        // 200 "ok" when active, 204 when inactive
        let active = matches!(self.client.get(&format!("{base}/active"))?, Value::String(s) if s == "ok");
        let groups = self.client.get(&format!("{base}/groups"))?;

        if let Some(map) = account.as_object_mut() {
            map.insert("ssh_keys".to_string(), ssh_keys);
            map.insert("active".to_string(), Value::Bool(active));
            map.insert("groups".to_string(), groups);
        }
        Ok(account)
    }

    fn read_project(&self, name: &str) -> Result<Value> {
        let base = resource_path(ResourceKind::Project, name);
        let mut project = self.client.get(&base)?;
        let access = self.client.get(&format!("{base}/access"))?;

        if let Some(map) = project.as_object_mut() {
            let local = access.get("local").cloned().unwrap_or(Value::Null);
            map.insert("access".to_string(), local);
        }
        Ok(project)
    }

    fn write_field(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()> {
        let base = resource_path(kind, identity);
        let text = value.as_str().unwrap_or_default();

        match (kind, field) {
            (ResourceKind::Account, "full_name") => {
                self.put_or_delete(&format!("{base}/name"), "name", text)
            }
            (ResourceKind::Account, "email") => self.set_preferred_email(&base, text),
            (ResourceKind::Account, "active") => {
                let path = format!("{base}/active");
                if value.as_bool().unwrap_or(false) {
                    self.client.put(&path, Body::Empty)?;
                } else {
                    self.client.delete(&path)?;
                }
                Ok(())
            }
            (ResourceKind::Group | ResourceKind::Project, "description") => {
                self.put_or_delete(&format!("{base}/description"), "description", text)
            }
            (ResourceKind::Group, "owner") => {
                self.client
                    .put(&format!("{base}/owner"), Body::Json(&json!({ "owner": text })))?;
                Ok(())
            }
            (ResourceKind::Group, "visible_to_all") => {
                let body = json!({ "visible_to_all": value.as_bool().unwrap_or(false) });
                self.client.put(&format!("{base}/options"), Body::Json(&body))?;
                Ok(())
            }
            (ResourceKind::Project, "parent") => {
                self.client
                    .put(&format!("{base}/parent"), Body::Json(&json!({ "parent": text })))?;
                Ok(())
            }
            (ResourceKind::Project, "state") => {
                self.client
                    .put(&format!("{base}/config"), Body::Json(&json!({ "state": text })))?;
                Ok(())
            }
            _ => Err(unsupported(kind, field)),
        }
    }

    /// PUT a text field, or DELETE it to clear.
    fn put_or_delete(&self, path: &str, key: &str, text: &str) -> Result<()> {
        if text.is_empty() {
            self.client.delete(path)?;
        } else {
            let mut body = Map::new();
            body.insert(key.to_string(), Value::String(text.to_string()));
            self.client.put(path, Body::Json(&Value::Object(body)))?;
        }
        Ok(())
    }

    /// Register `email` on the account and make it preferred.
    ///
    /// Older addresses are left registered.
    fn set_preferred_email(&self, account: &str, email: &str) -> Result<()> {
        if email.is_empty() {
            return Err(Error::Unsupported(
                "the preferred email cannot be cleared".to_string(),
            ));
        }

        let path = format!("{account}/emails/{}", segment(email));
        let body = json!({ "email": email, "preferred": true, "no_confirmation": true });
        match self.client.put(&path, Body::Json(&body)) {
            Ok(_) => Ok(()),
            // Already registered
            Err(Error::Http { status: 409, .. }) => {
                self.client.put(&format!("{path}/preferred"), Body::Empty)?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn member_path(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<String> {
        match (kind, field) {
            (ResourceKind::Account, "groups") => Ok(format!(
                "groups/{}/members/{}",
                segment(member),
                segment(identity)
            )),
            (ResourceKind::Group, "members") => Ok(format!(
                "{}/members/{}",
                resource_path(kind, identity),
                segment(member)
            )),
            (ResourceKind::Group, "included_groups") => Ok(format!(
                "{}/groups/{}",
                resource_path(kind, identity),
                segment(member)
            )),
            _ => Err(unsupported(kind, field)),
        }
    }

    fn add_member(&self, kind: ResourceKind, identity: &str, field: &str, member: &str) -> Result<()> {
        if (kind, field) == (ResourceKind::Account, "ssh_keys") {
            let path = format!("{}/sshkeys", resource_path(kind, identity));
            self.client.post(&path, Body::Text(member))?;
            return Ok(());
        }
        let path = self.member_path(kind, identity, field, member)?;
        self.client.put(&path, Body::Empty)?;
        Ok(())
    }

    fn remove_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<()> {
        if (kind, field) == (ResourceKind::Account, "ssh_keys") {
            let base = format!("{}/sshkeys", resource_path(kind, identity));
            let keys: Vec<SshKeyInfo> = serde_json::from_value(self.client.get(&base)?)?;
            // Already gone
            let Some(seq) = find_key_seq(&keys, member) else {
                return Ok(());
            };
            self.client.delete(&format!("{base}/{seq}"))?;
            return Ok(());
        }
        let path = self.member_path(kind, identity, field, member)?;
        self.client.delete(&path)?;
        Ok(())
    }

    fn replace_access(&self, project: &str, rules: &[String]) -> Result<()> {
        let path = format!("{}/access", resource_path(ResourceKind::Project, project));
        let current = self.client.get(&path)?;
        let payload = access_payload(current.get("local").unwrap_or(&Value::Null), rules)?;
        self.client.post(&path, Body::Json(&payload))?;
        Ok(())
    }
}

impl Remote for GerritRemote {
    fn get_account(&self, username: &str) -> declarative::Result<Value> {
        self.read_account(username)
            .map_err(|e| e.into_read_error(ResourceKind::Account, username))
    }

    fn get_group(&self, name: &str) -> declarative::Result<Value> {
        let path = format!("{}/detail", resource_path(ResourceKind::Group, name));
        self.client
            .get(&path)
            .map_err(|e| e.into_read_error(ResourceKind::Group, name))
    }

    fn get_project(&self, name: &str) -> declarative::Result<Value> {
        self.read_project(name)
            .map_err(|e| e.into_read_error(ResourceKind::Project, name))
    }

    fn create(
        &self,
        kind: ResourceKind,
        identity: &str,
        seed: &[(&'static str, FieldValue)],
    ) -> declarative::Result<Vec<&'static str>> {
        let (input, seeded) = create_input(kind, identity, seed);
        log::debug!("Create input for {kind} '{identity}': {input}");
        self.client
            .put(&resource_path(kind, identity), Body::Json(&input))
            .map_err(Error::into_write_error)?;
        Ok(seeded)
    }

    fn delete(&self, kind: ResourceKind, identity: &str) -> declarative::Result<()> {
        log::debug!("Refusing to delete {kind} '{identity}'");
        Err(Error::Unsupported(format!("deleting {kind}s is not supported by Gerrit")).into())
    }

    fn set_field(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        value: &FieldValue,
    ) -> declarative::Result<()> {
        self.write_field(kind, identity, field, value)
            .map_err(Error::into_write_error)
    }

    fn add_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> declarative::Result<()> {
        self.add_member(kind, identity, field, member)
            .map_err(Error::into_write_error)
    }

    fn remove_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> declarative::Result<()> {
        self.remove_member(kind, identity, field, member)
            .map_err(Error::into_write_error)
    }

    fn replace_sequence(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        values: &[String],
    ) -> declarative::Result<()> {
        let result = match (kind, field) {
            (ResourceKind::Project, "access_rules") => self.replace_access(identity, values),
            _ => Err(unsupported(kind, field)),
        };
        result.map_err(Error::into_write_error)
    }
}

/// REST collection path for one resource, e.g. `groups/Release%20Managers`.
pub fn resource_path(kind: ResourceKind, identity: &str) -> String {
    let collection = match kind {
        ResourceKind::Account => "accounts",
        ResourceKind::Group => "groups",
        ResourceKind::Project => "projects",
    };
    format!("{collection}/{}", segment(identity))
}

// Seed field -> create input key
const ACCOUNT_INPUT: &[(&str, &str)] = &[("full_name", "name"), ("email", "email")];
const GROUP_INPUT: &[(&str, &str)] = &[
    ("description", "description"),
    ("visible_to_all", "visible_to_all"),
    ("owner", "owner_id"),
];
const PROJECT_INPUT: &[(&str, &str)] = &[("parent", "parent"), ("description", "description")];

/// Build the create input for a kind from the seed values.
///
/// Returns the request body and the seed fields it carries. Empty text seeds
/// are left out; the server default already matches.
pub fn create_input(
    kind: ResourceKind,
    identity: &str,
    seed: &[(&'static str, FieldValue)],
) -> (Value, Vec<&'static str>) {
    let mut input = Map::new();
    let mut seeded = Vec::new();

    let accepted = match kind {
        ResourceKind::Account => ACCOUNT_INPUT,
        ResourceKind::Group => GROUP_INPUT,
        ResourceKind::Project => PROJECT_INPUT,
    };
    let identity_key = kind.identity_field();
    input.insert(identity_key.to_string(), Value::String(identity.to_string()));

    for (field, value) in seed {
        let Some((_, key)) = accepted.iter().find(|(name, _)| name == field) else {
            continue;
        };
        let rendered = match value {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Text(s) if s.is_empty() => continue,
            FieldValue::Text(s) => Value::String(s.clone()),
            FieldValue::Set(_) | FieldValue::List(_) => continue,
        };
        input.insert((*key).to_string(), rendered);
        seeded.push(*field);
    }

    (Value::Object(input), seeded)
}

/// Access update body: drop every current local section and add the rules.
pub fn access_payload(current_local: &Value, rules: &[String]) -> Result<Value> {
    let parsed = rules
        .iter()
        .map(|r| r.parse::<AccessRule>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::Unsupported)?;

    let remove: Map<String, Value> = current_local
        .as_object()
        .map(|sections| {
            sections
                .keys()
                .map(|reference| (reference.clone(), json!({})))
                .collect()
        })
        .unwrap_or_default();

    Ok(json!({
        "remove": remove,
        "add": build_sections(&parsed),
    }))
}

fn find_key_seq(keys: &[SshKeyInfo], key: &str) -> Option<u64> {
    keys.iter()
        .find(|k| k.ssh_public_key.trim() == key.trim())
        .map(|k| k.seq)
}

fn unsupported(kind: ResourceKind, field: &str) -> Error {
    Error::Unsupported(format!("field '{field}' of {kind} cannot be changed"))
}
