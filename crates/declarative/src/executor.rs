//! Execution engine - reconciles a plan with bounded parallelism

use crate::context::{ApplyContext, CancelToken, NoProgress, ProgressCallback, Remote};
use crate::planner::ReconcilePlan;
use crate::reconcile::{Invocation, reconcile};
use crate::report::ReconciliationResult;
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Plan only: run every invocation in check mode
    pub dry_run: bool,
    /// Number of invocations reconciled at once
    pub jobs: usize,
    /// Cancel outstanding work once any invocation fails
    pub fail_fast: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            jobs: 4,
            fail_fast: false,
        }
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecuteSummary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
    /// Invocations that completed with at least one rejected field
    pub partially_rejected: usize,
}

impl ExecuteSummary {
    /// Build a summary from results
    pub fn from_results(results: &[ReconciliationResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.add_result(result);
        }
        summary
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ReconciliationResult) {
        if result.failed() {
            self.failed += 1;
        } else if result.changed {
            self.changed += 1;
        } else {
            self.unchanged += 1;
        }
        if result.has_rejections() {
            self.partially_rejected += 1;
        }
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of invocations processed
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed
    }
}

/// Results in plan order plus their summary
#[derive(Debug, Clone, Default)]
pub struct ExecuteReport {
    pub results: Vec<ReconciliationResult>,
    pub summary: ExecuteSummary,
}

/// Execute a plan with the given options and progress callback
///
/// Invocations are independent and may run concurrently; the plan already
/// guarantees no two of them address the same resource.
pub fn execute<P: ProgressCallback>(
    plan: &ReconcilePlan,
    remote: &dyn Remote,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ExecuteReport> {
    if plan.is_empty() {
        return Ok(ExecuteReport::default());
    }

    let ctx = ApplyContext::with_cancel(opts.dry_run, CancelToken::new());
    progress.on_batch_start(plan.len(), opts.dry_run);

    let results = if opts.jobs <= 1 || plan.len() == 1 {
        plan.invocations()
            .iter()
            .map(|inv| run_one(remote, inv, &ctx, opts.fail_fast))
            .collect::<Vec<_>>()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(opts.jobs)
            .build()
            .context("Failed to create reconcile thread pool")?;

        pool.install(|| {
            plan.invocations()
                .par_iter()
                .map(|inv| run_one(remote, inv, &ctx, opts.fail_fast))
                .collect::<Vec<_>>()
        })
    };

    // Reported after the fact: callbacks are not shared across workers
    for (inv, result) in plan.invocations().iter().zip(&results) {
        progress.on_resource_complete(&inv.label(), result);
    }
    progress.on_batch_complete();

    let summary = ExecuteSummary::from_results(&results);
    log::info!(
        "Reconciled {} resource(s): {} changed, {} unchanged, {} failed",
        summary.total(),
        summary.changed,
        summary.unchanged,
        summary.failed
    );

    Ok(ExecuteReport { results, summary })
}

/// Simple execution without callbacks
pub fn execute_simple(
    plan: &ReconcilePlan,
    remote: &dyn Remote,
    opts: &ExecuteOptions,
) -> Result<ExecuteReport> {
    execute(plan, remote, opts, &mut NoProgress)
}

fn run_one(
    remote: &dyn Remote,
    invocation: &Invocation,
    ctx: &ApplyContext,
    fail_fast: bool,
) -> ReconciliationResult {
    let result = reconcile(remote, invocation, ctx);
    if fail_fast && result.failed() && !ctx.is_cancelled() {
        log::warn!("{} failed, cancelling remaining work", invocation.label());
        ctx.cancel.cancel();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::memory::MemoryRemote;
    use crate::resource::ResourceKind;
    use serde_json::{Value, json};

    fn inv(kind: ResourceKind, identity: &str, spec: Value) -> Invocation {
        let Value::Object(spec) = spec else {
            panic!("spec must be an object");
        };
        Invocation::new(kind, identity, spec)
    }

    fn plan() -> ReconcilePlan {
        ReconcilePlan::from_invocations([
            inv(ResourceKind::Group, "Testers", json!({ "members": ["alice"] })),
            inv(ResourceKind::Group, "Admins", json!({})),
            inv(ResourceKind::Project, "tools", json!({ "description": "Build tools" })),
            inv(ResourceKind::Account, "jdoe", json!({ "bogus": 1 })),
        ])
        .unwrap()
    }

    fn remote() -> MemoryRemote {
        MemoryRemote::new()
            .with_group("Testers")
            .with_group("Admins")
            .with_project("tools")
            .with_account("jdoe")
    }

    #[test]
    fn test_execute_empty_plan() {
        let report = execute_simple(&ReconcilePlan::new(), &remote(), &ExecuteOptions::default())
            .unwrap();
        assert_eq!(report.summary.total(), 0);
    }

    #[test]
    fn test_execute_keeps_plan_order() {
        let remote = remote();
        let report = execute_simple(&plan(), &remote, &ExecuteOptions::default()).unwrap();

        let identities: Vec<&str> = report.results.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(identities, vec!["Testers", "Admins", "tools", "jdoe"]);
        assert_eq!(
            report.summary,
            ExecuteSummary {
                changed: 2,
                unchanged: 1,
                failed: 1,
                partially_rejected: 0,
            }
        );
        assert_eq!(remote.write_count(), 2);
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let remote = remote();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = execute_simple(&plan(), &remote, &opts).unwrap();
        assert_eq!(report.summary.changed, 2);
        assert_eq!(remote.write_count(), 0);
    }

    #[test]
    fn test_fail_fast_cancels_the_rest() {
        let remote = remote();
        let plan = ReconcilePlan::from_invocations([
            inv(ResourceKind::Account, "jdoe", json!({ "bogus": 1 })),
            inv(ResourceKind::Group, "Testers", json!({ "members": ["alice"] })),
        ])
        .unwrap();
        let opts = ExecuteOptions {
            jobs: 1,
            fail_fast: true,
            ..Default::default()
        };

        let report = execute_simple(&plan, &remote, &opts).unwrap();
        assert_eq!(report.summary.failed, 2);
        assert_eq!(report.results[1].terminal, Some(Error::Cancelled));
        assert_eq!(remote.write_count(), 0);
    }

    #[test]
    fn test_rejections_are_counted() {
        let remote = remote().reject_field("description");
        let report = execute_simple(&plan(), &remote, &ExecuteOptions::default()).unwrap();
        assert_eq!(report.summary.partially_rejected, 1);
        // A rejection alone does not fail the invocation
        assert_eq!(report.summary.failed, 1);
    }
}
