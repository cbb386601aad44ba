//! Remote adapter trait and apply context
//!
//! The engine talks to the review server only through [`Remote`], so it can be
//! driven by a real network client or by the in-memory fake in
//! [`memory`](crate::memory).

use crate::error::Result;
use crate::report::ReconciliationResult;
use crate::resource::ResourceKind;
use crate::types::FieldValue;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Narrow interface to the review server
///
/// Every call returns success, [`Error::NotFound`](crate::Error::NotFound),
/// [`Error::Transport`](crate::Error::Transport) or
/// [`Error::Rejected`](crate::Error::Rejected). Reads return the raw record
/// for a resource; mapping it into a [`ResourceState`](crate::ResourceState)
/// is the fetcher's job.
pub trait Remote: Send + Sync {
    /// Raw account record (`AccountInfo` plus `ssh_keys`, `active`, `groups`).
    fn get_account(&self, username: &str) -> Result<Value>;

    /// Raw group record (`GroupInfo` with `members` and `includes`).
    fn get_group(&self, name: &str) -> Result<Value>;

    /// Raw project record (`ProjectInfo` plus `access` sections).
    fn get_project(&self, name: &str) -> Result<Value>;

    /// Create a resource seeded with initial scalar values.
    ///
    /// Returns the names of the seed fields that were applied by the create
    /// call; the engine writes the others afterwards.
    fn create(
        &self,
        kind: ResourceKind,
        identity: &str,
        seed: &[(&'static str, FieldValue)],
    ) -> Result<Vec<&'static str>>;

    /// Delete a resource.
    fn delete(&self, kind: ResourceKind, identity: &str) -> Result<()>;

    /// Write one scalar field.
    fn set_field(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        value: &FieldValue,
    ) -> Result<()>;

    /// Add one member to a set field.
    fn add_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<()>;

    /// Remove one member from a set field.
    fn remove_set_member(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        member: &str,
    ) -> Result<()>;

    /// Replace an ordered list field as a whole.
    fn replace_sequence(
        &self,
        kind: ResourceKind,
        identity: &str,
        field: &str,
        values: &[String],
    ) -> Result<()>;

    /// Raw record for any kind.
    fn get(&self, kind: ResourceKind, identity: &str) -> Result<Value> {
        match kind {
            ResourceKind::Account => self.get_account(identity),
            ResourceKind::Group => self.get_group(identity),
            ResourceKind::Project => self.get_project(identity),
        }
    }
}

/// Progress callback for batch execution
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called before a batch of invocations starts
    fn on_batch_start(&mut self, count: usize, check_mode: bool);

    /// Called once per invocation, in plan order
    fn on_resource_complete(&mut self, label: &str, result: &ReconciliationResult);

    /// Called when a batch completes
    fn on_batch_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize, _check_mode: bool) {}
    fn on_resource_complete(&mut self, _label: &str, _result: &ReconciliationResult) {}
    fn on_batch_complete(&mut self) {}
}

/// Shared cancellation flag
///
/// Clones share the flag. Once cancelled, the applier stops before the next
/// remote write; writes already made stay in place.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Context passed to apply operations
#[derive(Debug, Clone, Default)]
pub struct ApplyContext {
    /// Plan only: report operations without writing
    pub dry_run: bool,
    /// Cancellation flag checked before each write
    pub cancel: CancelToken,
}

impl ApplyContext {
    /// Create a new apply context
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            cancel: CancelToken::new(),
        }
    }

    /// Create a context sharing an existing cancellation flag
    pub fn with_cancel(dry_run: bool, cancel: CancelToken) -> Self {
        Self { dry_run, cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
