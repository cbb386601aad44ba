//! Result reporter - folds apply outcomes into a [`ReconciliationResult`]

use crate::apply::{ApplyOutcome, ApplyRun, Operation, OutcomeStatus};
use crate::diff::FieldDiff;
use crate::error::{Error, Result};
use crate::resource::ResourceKind;
use serde::Serialize;
use serde_json::Value;

/// Outcome of reconciling one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub kind: ResourceKind,
    pub identity: String,
    /// At least one operation succeeded (or, in check mode, is planned)
    pub changed: bool,
    pub outcomes: Vec<ApplyOutcome>,
    /// Error that stopped the invocation, if any
    pub terminal: Option<Error>,
}

impl ReconciliationResult {
    pub fn failed(&self) -> bool {
        self.terminal.is_some()
    }

    /// Outcomes the server refused.
    pub fn rejected(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes.iter().filter(|o| o.is_rejected())
    }

    pub fn has_rejections(&self) -> bool {
        self.rejected().next().is_some()
    }

    /// Field diffs that were applied or planned, including the ones a create
    /// seeded.
    pub fn field_diffs(&self) -> impl Iterator<Item = &FieldDiff> {
        self.outcomes
            .iter()
            .filter(|o| o.is_applied() || o.is_planned())
            .flat_map(|o| match &o.operation {
                Operation::Create { seeded } => seeded.as_slice(),
                Operation::Field(diff) => std::slice::from_ref(diff),
                Operation::Delete => &[],
            })
    }

    /// Whether operations were planned rather than applied.
    pub fn is_check(&self) -> bool {
        self.outcomes.iter().any(ApplyOutcome::is_planned)
    }

    /// Human-readable summary: the terminal error if there is one,
    /// otherwise counts.
    pub fn message(&self) -> String {
        if let Some(error) = &self.terminal {
            return error.to_string();
        }

        let count = |f: fn(&ApplyOutcome) -> bool| self.outcomes.iter().filter(|o| f(o)).count();
        let applied = count(ApplyOutcome::is_applied);
        let planned = count(ApplyOutcome::is_planned);
        let rejected = count(ApplyOutcome::is_rejected);

        let mut parts = Vec::new();
        if planned > 0 {
            parts.push(format!("{planned} change(s) planned"));
        }
        if applied > 0 {
            parts.push(format!("{applied} change(s) applied"));
        }
        if rejected > 0 {
            parts.push(format!("{rejected} field(s) rejected"));
        }
        if parts.is_empty() {
            "no changes".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Serializable view for the caller.
    pub fn output(&self) -> ResultOutput {
        let diff = self
            .outcomes
            .iter()
            .filter(|o| o.is_applied() || o.is_planned())
            .flat_map(|o| o.operation.entries())
            .collect();

        let rejected = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.status {
                OutcomeStatus::Rejected { message } => Some((o, message)),
                _ => None,
            })
            .flat_map(|(o, message)| {
                o.operation.entries().into_iter().map(move |mut entry| {
                    if let Value::Object(map) = &mut entry {
                        map.insert("error".to_string(), Value::String(message.clone()));
                    }
                    entry
                })
            })
            .collect();

        ResultOutput {
            kind: None,
            identity: None,
            changed: self.changed,
            failed: self.failed(),
            msg: self.message(),
            diff,
            rejected,
        }
    }

    /// Serializable view carrying the kind and identity, for batch output.
    pub fn output_with_identity(&self) -> ResultOutput {
        ResultOutput {
            kind: Some(self.kind),
            identity: Some(self.identity.clone()),
            ..self.output()
        }
    }
}

/// Wire form of a [`ReconciliationResult`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ResourceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    pub changed: bool,
    pub failed: bool,
    pub msg: String,
    pub diff: Vec<Value>,
    pub rejected: Vec<Value>,
}

/// Build the result of one invocation.
///
/// `preflight` carries a validation or fetch failure; when it is an error no
/// operation was attempted and `run` is expected to be empty.
pub fn summarize(
    kind: ResourceKind,
    identity: &str,
    preflight: Result<()>,
    run: ApplyRun,
) -> ReconciliationResult {
    let terminal = preflight.err().or(run.terminal);
    let changed = run
        .outcomes
        .iter()
        .any(|o| o.is_applied() || o.is_planned());

    if let Some(error) = &terminal {
        log::error!("{kind} '{identity}': {error}");
    }

    ReconciliationResult {
        kind,
        identity: identity.to_string(),
        changed,
        outcomes: run.outcomes,
        terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::Change;
    use crate::types::FieldValue;

    fn outcome(member: &str, status: OutcomeStatus) -> ApplyOutcome {
        ApplyOutcome {
            operation: Operation::Field(FieldDiff::new("members", Change::Add(member.into()))),
            status,
        }
    }

    #[test]
    fn test_unchanged() {
        let result = summarize(ResourceKind::Group, "Testers", Ok(()), ApplyRun::default());
        assert!(!result.changed);
        assert!(!result.failed());
        assert_eq!(result.message(), "no changes");
    }

    #[test]
    fn test_partial_rejection() {
        let run = ApplyRun {
            outcomes: vec![
                outcome("alice", OutcomeStatus::Applied),
                outcome(
                    "ghost",
                    OutcomeStatus::Rejected {
                        message: "rejected: account not found".into(),
                    },
                ),
            ],
            terminal: None,
        };
        let result = summarize(ResourceKind::Group, "Testers", Ok(()), run);
        assert!(result.changed);
        assert!(!result.failed());
        assert!(result.has_rejections());
        assert_eq!(result.message(), "1 change(s) applied, 1 field(s) rejected");

        let output = result.output();
        assert_eq!(output.diff.len(), 1);
        assert_eq!(output.rejected.len(), 1);
        assert_eq!(output.rejected[0]["to"], "ghost");
        assert_eq!(output.rejected[0]["error"], "rejected: account not found");
        assert_eq!(result.field_diffs().count(), 1);
    }

    #[test]
    fn test_field_diffs_include_create_seed() {
        let seeded = FieldDiff::new(
            "description",
            Change::Set {
                from: FieldValue::text(""),
                to: FieldValue::text("QA"),
            },
        );
        let run = ApplyRun {
            outcomes: vec![
                ApplyOutcome {
                    operation: Operation::Create {
                        seeded: vec![seeded.clone()],
                    },
                    status: OutcomeStatus::Applied,
                },
                outcome("alice", OutcomeStatus::Applied),
                outcome(
                    "bob",
                    OutcomeStatus::Skipped {
                        reason: "cancelled".into(),
                    },
                ),
            ],
            terminal: Some(Error::Cancelled),
        };
        let result = summarize(ResourceKind::Group, "Testers", Ok(()), run);

        let diffs: Vec<&FieldDiff> = result.field_diffs().collect();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0], &seeded);
        assert_eq!(diffs[1].change, Change::Add("alice".into()));
    }

    #[test]
    fn test_terminal_error_wins_message() {
        let run = ApplyRun {
            outcomes: vec![
                outcome("alice", OutcomeStatus::Applied),
                outcome(
                    "bob",
                    OutcomeStatus::Failed {
                        error: Error::transport("connection reset"),
                    },
                ),
            ],
            terminal: Some(Error::transport("connection reset")),
        };
        let result = summarize(ResourceKind::Group, "Testers", Ok(()), run);
        assert!(result.changed);
        assert!(result.failed());
        assert_eq!(result.message(), "transport error: connection reset");
    }

    #[test]
    fn test_preflight_failure() {
        let result = summarize(
            ResourceKind::Project,
            "tools",
            Err(Error::transport("timed out")),
            ApplyRun::default(),
        );
        assert!(!result.changed);
        assert!(result.failed());
    }

    #[test]
    fn test_output_json_shape() {
        let run = ApplyRun {
            outcomes: vec![outcome("bob", OutcomeStatus::Planned)],
            terminal: None,
        };
        let result = summarize(ResourceKind::Group, "Testers", Ok(()), run);
        assert!(result.is_check());

        let json = serde_json::to_value(result.output()).unwrap();
        assert_eq!(json["changed"], true);
        assert_eq!(json["msg"], "1 change(s) planned");
        assert!(json.get("kind").is_none());

        let json = serde_json::to_value(result.output_with_identity()).unwrap();
        assert_eq!(json["kind"], "group");
        assert_eq!(json["identity"], "Testers");
    }
}
