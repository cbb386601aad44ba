//! Resource kinds and their field schemas
//!
//! The set of kinds is closed: each kind carries a static schema table that
//! fixes its field names, their types, where each field is found in the raw
//! record returned by a [`Remote`](crate::context::Remote), and the canonical
//! order used for diffing and applying.

use crate::types::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of resource managed on the review server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum ResourceKind {
    Account,
    Group,
    Project,
}

impl ResourceKind {
    /// All kinds, in a stable order.
    pub const ALL: [ResourceKind; 3] = [Self::Account, Self::Group, Self::Project];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Account => "account",
            Self::Group => "group",
            Self::Project => "project",
        }
    }

    /// Parse a kind name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "account" | "accounts" => Some(Self::Account),
            "group" | "groups" => Some(Self::Group),
            "project" | "projects" => Some(Self::Project),
            _ => None,
        }
    }

    /// Field schema in canonical order.
    pub fn schema(&self) -> &'static [FieldSpec] {
        match self {
            Self::Account => &ACCOUNT_FIELDS,
            Self::Group => &GROUP_FIELDS,
            Self::Project => &PROJECT_FIELDS,
        }
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.schema().iter().find(|f| f.name == name)
    }

    /// Name of the field that holds the resource identity.
    pub fn identity_field(&self) -> &'static str {
        match self {
            Self::Account => "username",
            Self::Group | Self::Project => "name",
        }
    }

    /// Comma-separated list of valid field names, for error messages.
    pub fn field_names(&self) -> String {
        self.schema()
            .iter()
            .map(|f| f.name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            format!("unknown resource kind '{s}' (expected account, group or project)")
        })
    }
}

impl TryFrom<String> for ResourceKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Type of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Free text scalar
    Text,
    /// Boolean scalar
    Bool,
    /// Scalar restricted to a token list; the first token is the default
    Choice(&'static [&'static str]),
    /// Unordered membership
    Set,
    /// Ordered sequence where order is meaningful
    List,
}

impl FieldType {
    /// The value a field holds when the server reports nothing for it.
    pub fn empty(&self) -> FieldValue {
        match self {
            Self::Text => FieldValue::Text(String::new()),
            Self::Bool => FieldValue::Bool(false),
            Self::Choice(tokens) => {
                FieldValue::Text(tokens.first().map(|t| (*t).to_string()).unwrap_or_default())
            }
            Self::Set => FieldValue::Set(Default::default()),
            Self::List => FieldValue::List(Vec::new()),
        }
    }

    /// Scalars are written with a single set operation and can seed a create.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Text | Self::Bool | Self::Choice(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Bool => "boolean",
            Self::Choice(_) => "choice",
            Self::Set => "set",
            Self::List => "list",
        }
    }
}

/// Where a field lives in the raw record returned by a remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Scalar at a JSON pointer
    Pointer(&'static str),
    /// Array of objects at a JSON pointer; each element contributes the first
    /// of `keys` that it carries
    Each {
        pointer: &'static str,
        keys: &'static [&'static str],
    },
    /// Map of access sections (ref -> permissions -> rules) at a JSON pointer
    AccessSections(&'static str),
}

/// Schema entry for one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub ty: FieldType,
    pub source: Source,
}

/// Allowed project states.
pub const PROJECT_STATES: &[&str] = &["ACTIVE", "HIDDEN", "READ_ONLY"];

static ACCOUNT_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        name: "username",
        ty: FieldType::Text,
        source: Source::Pointer("/username"),
    },
    FieldSpec {
        name: "email",
        ty: FieldType::Text,
        source: Source::Pointer("/email"),
    },
    // Called `name` by the server; `full_name` avoids reading as an identifier.
    FieldSpec {
        name: "full_name",
        ty: FieldType::Text,
        source: Source::Pointer("/name"),
    },
    FieldSpec {
        name: "active",
        ty: FieldType::Bool,
        source: Source::Pointer("/active"),
    },
    FieldSpec {
        name: "ssh_keys",
        ty: FieldType::Set,
        source: Source::Each {
            pointer: "/ssh_keys",
            keys: &["ssh_public_key"],
        },
    },
    FieldSpec {
        name: "groups",
        ty: FieldType::Set,
        source: Source::Each {
            pointer: "/groups",
            keys: &["name"],
        },
    },
];

static GROUP_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        name: "name",
        ty: FieldType::Text,
        source: Source::Pointer("/name"),
    },
    FieldSpec {
        name: "description",
        ty: FieldType::Text,
        source: Source::Pointer("/description"),
    },
    FieldSpec {
        name: "owner",
        ty: FieldType::Text,
        source: Source::Pointer("/owner"),
    },
    FieldSpec {
        name: "visible_to_all",
        ty: FieldType::Bool,
        source: Source::Pointer("/options/visible_to_all"),
    },
    FieldSpec {
        name: "members",
        ty: FieldType::Set,
        source: Source::Each {
            pointer: "/members",
            keys: &["username", "email"],
        },
    },
    FieldSpec {
        name: "included_groups",
        ty: FieldType::Set,
        source: Source::Each {
            pointer: "/includes",
            keys: &["name"],
        },
    },
];

static PROJECT_FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        name: "name",
        ty: FieldType::Text,
        source: Source::Pointer("/name"),
    },
    FieldSpec {
        name: "description",
        ty: FieldType::Text,
        source: Source::Pointer("/description"),
    },
    FieldSpec {
        name: "parent",
        ty: FieldType::Text,
        source: Source::Pointer("/parent"),
    },
    FieldSpec {
        name: "state",
        ty: FieldType::Choice(PROJECT_STATES),
        source: Source::Pointer("/state"),
    },
    FieldSpec {
        name: "access_rules",
        ty: FieldType::List,
        source: Source::AccessSections("/access"),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(ResourceKind::from_name("Group"), Some(ResourceKind::Group));
        assert_eq!(ResourceKind::from_name(" projects "), Some(ResourceKind::Project));
        assert_eq!(ResourceKind::from_name("repo"), None);
        assert!("user".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_deserializes_case_insensitively() {
        let kind: ResourceKind = serde_json::from_str("\"ACCOUNT\"").unwrap();
        assert_eq!(kind, ResourceKind::Account);
        assert!(serde_json::from_str::<ResourceKind>("\"team\"").is_err());
    }

    #[test]
    fn test_identity_field_is_in_schema() {
        for kind in ResourceKind::ALL {
            let field = kind.field(kind.identity_field()).unwrap();
            assert_eq!(field.ty, FieldType::Text);
            // Identity is first so it is never preceded by a write
            assert_eq!(kind.schema()[0].name, kind.identity_field());
        }
    }

    #[test]
    fn test_schema_names_are_unique() {
        for kind in ResourceKind::ALL {
            let mut names: Vec<_> = kind.schema().iter().map(|f| f.name).collect();
            names.sort_unstable();
            names.dedup();
            assert_eq!(names.len(), kind.schema().len());
        }
    }

    #[test]
    fn test_choice_empty_is_first_token() {
        let ty = FieldType::Choice(PROJECT_STATES);
        assert_eq!(ty.empty(), FieldValue::Text("ACTIVE".into()));
        assert!(ty.is_scalar());
        assert!(!FieldType::Set.is_scalar());
    }
}
