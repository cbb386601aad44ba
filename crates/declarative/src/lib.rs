//! # Declarative
//!
//! Reconciliation engine for review-server resources (accounts, groups and
//! projects).
//!
//! Each invocation declares the fields it manages. The engine validates the
//! declaration, fetches the current state, diffs the two and applies only
//! the differing fields, one remote write per change.
//!
//! ## Pipeline
//!
//! - [`normalize`](normalize::normalize): declared spec into a typed
//!   [`DesiredState`]; unknown keys fail before any remote call
//! - [`fetch`](fetch::fetch): raw server record into a complete
//!   [`ResourceState`]
//! - [`diff`](diff::diff): ordered [`FieldDiff`]s, skipping unmanaged fields
//! - [`apply`](apply::apply): remote writes, tolerating per-field rejections
//! - [`summarize`](report::summarize): the [`ReconciliationResult`]
//!
//! [`reconcile`] runs the whole pipeline for one [`Invocation`];
//! [`execute`] runs a [`ReconcilePlan`] of many.
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ApplyContext, Invocation, ResourceKind, memory::MemoryRemote, reconcile};
//!
//! let remote = MemoryRemote::new().with_group("Testers");
//! let spec = serde_json::json!({ "members": ["alice", "bob"] });
//! let invocation = Invocation::new(
//!     ResourceKind::Group,
//!     "Testers",
//!     spec.as_object().cloned().unwrap_or_default(),
//! );
//!
//! let result = reconcile(&remote, &invocation, &ApplyContext::default());
//! assert!(result.changed);
//! ```
//!
//! ## Remote adapter
//!
//! The engine reaches the server only through the [`Remote`] trait. A REST
//! implementation lives in a separate crate; [`memory::MemoryRemote`] is an
//! in-memory fake for tests.

pub mod access;
pub mod apply;
pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod fetch;
pub mod memory;
pub mod normalize;
pub mod planner;
pub mod reconcile;
pub mod report;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use access::{AccessRule, build_sections, canonical_order, flatten_sections};
pub use apply::{ApplyOutcome, ApplyRun, Operation, OutcomeStatus};
pub use context::{ApplyContext, CancelToken, NoProgress, ProgressCallback, Remote};
pub use diff::{Change, DiffSummary, FieldDiff};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{ExecuteOptions, ExecuteReport, ExecuteSummary, execute, execute_simple};
pub use planner::ReconcilePlan;
pub use reconcile::{Invocation, reconcile};
pub use report::{ReconciliationResult, ResultOutput};
pub use resource::{FieldSpec, FieldType, ResourceKind};
pub use types::{DeclaredSpec, Desired, DesiredState, FieldValue, Presence, ResourceState};
