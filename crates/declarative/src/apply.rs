//! Change applier - turns diffs into remote writes
//!
//! One remote write per operation, in the order given. A rejected write is
//! recorded and the loop moves on; any other failure ends the run.

use crate::context::{ApplyContext, Remote};
use crate::diff::{Change, FieldDiff};
use crate::error::{Error, ErrorCategory};
use crate::resource::ResourceKind;
use crate::types::FieldValue;
use serde_json::{Value, json};
use std::fmt;

/// A unit of remote work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Create the resource; `seeded` are the scalar diffs applied by the
    /// create call itself
    Create { seeded: Vec<FieldDiff> },
    /// Delete the resource
    Delete,
    /// Write one field change
    Field(FieldDiff),
}

impl Operation {
    /// Report entries `{field, action, from, to}` for this operation.
    pub fn entries(&self) -> Vec<Value> {
        match self {
            Self::Create { seeded } => {
                let mut entries = vec![json!({
                    "field": "state",
                    "action": "create",
                    "from": "absent",
                    "to": "present",
                })];
                entries.extend(seeded.iter().map(diff_entry));
                entries
            }
            Self::Delete => vec![json!({
                "field": "state",
                "action": "delete",
                "from": "present",
                "to": "absent",
            })],
            Self::Field(diff) => vec![diff_entry(diff)],
        }
    }
}

fn diff_entry(diff: &FieldDiff) -> Value {
    serde_json::to_value(diff).unwrap_or(Value::Null)
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { seeded } if seeded.is_empty() => write!(f, "create"),
            Self::Create { seeded } => {
                let fields: Vec<&str> = seeded.iter().map(|d| d.field).collect();
                write!(f, "create (with {})", fields.join(", "))
            }
            Self::Delete => write!(f, "delete"),
            Self::Field(diff) => write!(f, "{diff}"),
        }
    }
}

/// What happened to one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// The remote write succeeded
    Applied,
    /// Check mode: the write would have been made
    Planned,
    /// The server refused this write; later operations still ran
    Rejected { message: String },
    /// The write failed and ended the run
    Failed { error: Error },
    /// Not attempted
    Skipped { reason: String },
}

/// Result of one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub operation: Operation,
    pub status: OutcomeStatus,
}

impl ApplyOutcome {
    fn new(operation: Operation, status: OutcomeStatus) -> Self {
        Self { operation, status }
    }

    /// Check if the operation changed the server
    pub fn is_applied(&self) -> bool {
        matches!(self.status, OutcomeStatus::Applied)
    }

    pub fn is_planned(&self) -> bool {
        matches!(self.status, OutcomeStatus::Planned)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.status, OutcomeStatus::Rejected { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }
}

/// Outcomes of one apply run plus the error that ended it early, if any
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyRun {
    pub outcomes: Vec<ApplyOutcome>,
    pub terminal: Option<Error>,
}

impl ApplyRun {
    fn push(&mut self, operation: Operation, status: OutcomeStatus) {
        self.outcomes.push(ApplyOutcome::new(operation, status));
    }

    fn skip_rest<'a>(&mut self, rest: impl Iterator<Item = &'a FieldDiff>) {
        for diff in rest {
            self.push(
                Operation::Field(diff.clone()),
                OutcomeStatus::Skipped {
                    reason: "cancelled".to_string(),
                },
            );
        }
        self.terminal = Some(Error::Cancelled);
    }
}

/// Apply `diffs` to a resource.
///
/// When the resource does not exist it is created first, seeded with every
/// scalar diff; scalar diffs the create call did not take are written
/// afterwards in their original order along with the collection diffs. A
/// resource that does not exist is created even when `diffs` is empty.
pub fn apply(
    remote: &dyn Remote,
    kind: ResourceKind,
    identity: &str,
    exists: bool,
    diffs: &[FieldDiff],
    ctx: &ApplyContext,
) -> ApplyRun {
    let mut run = ApplyRun::default();
    let mut pending: Vec<&FieldDiff> = diffs.iter().collect();

    if !exists {
        if ctx.is_cancelled() {
            run.push(
                Operation::Create { seeded: Vec::new() },
                OutcomeStatus::Skipped {
                    reason: "cancelled".to_string(),
                },
            );
            run.skip_rest(pending.into_iter());
            return run;
        }

        let scalars: Vec<FieldDiff> = diffs.iter().filter(|d| d.is_scalar()).cloned().collect();

        if ctx.dry_run {
            pending.retain(|d| !d.is_scalar());
            run.push(Operation::Create { seeded: scalars }, OutcomeStatus::Planned);
        } else {
            let seed: Vec<(&'static str, FieldValue)> = scalars
                .iter()
                .filter_map(|d| match &d.change {
                    Change::Set { to, .. } => Some((d.field, to.clone())),
                    _ => None,
                })
                .collect();

            log::info!("Creating {kind} '{identity}'");
            match remote.create(kind, identity, &seed) {
                Ok(accepted) => {
                    let (seeded, _): (Vec<FieldDiff>, Vec<FieldDiff>) =
                        scalars.into_iter().partition(|d| accepted.contains(&d.field));
                    pending.retain(|d| !(d.is_scalar() && accepted.contains(&d.field)));
                    run.push(Operation::Create { seeded }, OutcomeStatus::Applied);
                }
                Err(error) => {
                    log::error!("Failed to create {kind} '{identity}': {error}");
                    run.push(
                        Operation::Create { seeded: Vec::new() },
                        OutcomeStatus::Failed {
                            error: error.clone(),
                        },
                    );
                    run.terminal = Some(error);
                    return run;
                }
            }
        }
    }

    let mut iter = pending.into_iter();
    while let Some(diff) = iter.next() {
        if ctx.is_cancelled() {
            log::warn!("Cancelled before {kind} '{identity}' {}", diff.field);
            run.skip_rest(std::iter::once(diff).chain(iter));
            break;
        }

        if ctx.dry_run {
            run.push(Operation::Field(diff.clone()), OutcomeStatus::Planned);
            continue;
        }

        log::info!("Changing {kind} '{identity}' {diff}");
        match write(remote, kind, identity, diff) {
            Ok(()) => run.push(Operation::Field(diff.clone()), OutcomeStatus::Applied),
            Err(error) if error.category() == ErrorCategory::Rejected => {
                log::warn!("{kind} '{identity}' {}: {error}", diff.field);
                run.push(
                    Operation::Field(diff.clone()),
                    OutcomeStatus::Rejected {
                        message: error.to_string(),
                    },
                );
            }
            Err(error) => {
                log::error!("Aborting {kind} '{identity}' at {}: {error}", diff.field);
                run.push(
                    Operation::Field(diff.clone()),
                    OutcomeStatus::Failed {
                        error: error.clone(),
                    },
                );
                run.terminal = Some(error);
                break;
            }
        }
    }

    run
}

/// Delete a resource. Any failure, including a rejection, ends the run.
pub fn apply_delete(
    remote: &dyn Remote,
    kind: ResourceKind,
    identity: &str,
    ctx: &ApplyContext,
) -> ApplyRun {
    let mut run = ApplyRun::default();

    if ctx.is_cancelled() {
        run.push(
            Operation::Delete,
            OutcomeStatus::Skipped {
                reason: "cancelled".to_string(),
            },
        );
        run.terminal = Some(Error::Cancelled);
        return run;
    }

    if ctx.dry_run {
        run.push(Operation::Delete, OutcomeStatus::Planned);
        return run;
    }

    log::info!("Deleting {kind} '{identity}'");
    match remote.delete(kind, identity) {
        Ok(()) => run.push(Operation::Delete, OutcomeStatus::Applied),
        Err(error) => {
            log::error!("Failed to delete {kind} '{identity}': {error}");
            run.push(
                Operation::Delete,
                OutcomeStatus::Failed {
                    error: error.clone(),
                },
            );
            run.terminal = Some(error);
        }
    }
    run
}

fn write(
    remote: &dyn Remote,
    kind: ResourceKind,
    identity: &str,
    diff: &FieldDiff,
) -> crate::error::Result<()> {
    match &diff.change {
        Change::Set { to, .. } => remote.set_field(kind, identity, diff.field, to),
        Change::Add(member) => remote.add_set_member(kind, identity, diff.field, member),
        Change::Remove(member) => remote.remove_set_member(kind, identity, diff.field, member),
        Change::Replace { to, .. } => remote.replace_sequence(kind, identity, diff.field, to),
    }
}
