//! Command implementations and their shared rendering

pub mod apply;
pub mod diff;
pub mod show;

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use declarative::{DiffSummary, ExecuteReport, ProgressCallback, ReconciliationResult};
use gerritkit::GerritRemote;
use indicatif::{ProgressBar, ProgressStyle};
use std::process::ExitCode;
use std::time::Duration;

use crate::Context;
use crate::config;
use crate::ui;

/// Resolve settings and build the REST adapter.
pub fn connect(ctx: &Context) -> Result<GerritRemote> {
    let file = config::load_file(ctx.config.as_deref())?;
    let settings = config::resolve(&ctx.connection, file)?;
    log::info!(
        "Connecting to {} as {}",
        settings.url,
        settings.username.as_deref().unwrap_or("anonymous")
    );
    GerritRemote::new(&settings.client_config()).context("Invalid Gerrit connection settings")
}

/// Spinner while the batch runs, then one line per resource.
pub struct CliProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
    show_unchanged: bool,
}

impl CliProgress {
    pub fn new(ctx: &Context) -> Self {
        Self {
            bar: None,
            quiet: ctx.quiet,
            show_unchanged: ctx.verbose > 0,
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_batch_start(&mut self, count: usize, check_mode: bool) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        let verb = if check_mode { "Checking" } else { "Reconciling" };
        pb.set_message(format!("{verb} {count} resource(s)..."));
        pb.enable_steady_tick(Duration::from_millis(100));
        self.bar = Some(pb);
    }

    fn on_resource_complete(&mut self, label: &str, result: &ReconciliationResult) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
        let interesting = result.changed || result.failed() || result.has_rejections();
        if self.quiet && !result.failed() {
            return;
        }
        if !interesting && !self.show_unchanged {
            return;
        }
        ui::result_line(label, result);
        ui::operations(result);
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

/// Print results as JSON: a bare object for a single invocation, an array
/// tagged with kind and identity otherwise.
pub fn print_json(results: &[ReconciliationResult], single: bool) -> Result<()> {
    let rendered = match results {
        [only] if single => serde_json::to_string_pretty(&only.output())?,
        _ => {
            let outputs: Vec<_> = results
                .iter()
                .map(ReconciliationResult::output_with_identity)
                .collect();
            serde_json::to_string_pretty(&outputs)?
        }
    };
    println!("{rendered}");
    Ok(())
}

/// Field changes applied or planned across the batch.
pub fn field_changes(report: &ExecuteReport) -> DiffSummary {
    DiffSummary::from_diffs(report.results.iter().flat_map(|r| r.field_diffs()))
}

/// Print the batch summary
pub fn print_summary(report: &ExecuteReport, check_mode: bool) {
    let summary = &report.summary;
    println!();
    let changed_label = if check_mode { "would change" } else { "changed" };
    println!(
        "  {} {}, {} unchanged, {} failed",
        summary.changed.to_string().green(),
        changed_label,
        summary.unchanged,
        if summary.failed > 0 {
            summary.failed.to_string().red()
        } else {
            summary.failed.to_string().normal()
        }
    );

    let fields = field_changes(report);
    if fields.has_changes() {
        ui::dim(&format!(
            "{} field change(s): {} set, {} added, {} removed, {} replaced",
            fields.total(),
            fields.sets,
            fields.additions,
            fields.removals,
            fields.replacements
        ));
    }

    if summary.partially_rejected > 0 {
        ui::warn(&format!(
            "{} resource(s) had rejected fields",
            summary.partially_rejected
        ));
    }
}

/// Failure when any invocation failed; with `strict`, also on rejections.
pub fn exit_code(report: &ExecuteReport, strict: bool) -> ExitCode {
    let summary = &report.summary;
    if !summary.is_success() || (strict && summary.partially_rejected > 0) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
