//! `gerritctl apply`

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use declarative::{ExecuteOptions, NoProgress, ResourceKind, execute};
use std::collections::HashSet;
use std::path::Path;
use std::process::ExitCode;

use super::{CliProgress, connect, exit_code, print_json, print_summary};
use crate::Context;
use crate::cli::ApplyArgs;
use crate::invocation;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<ExitCode> {
    let loaded = invocation::load(&args.file)?;
    let plan = loaded.plan.filter_by_target(args.target.as_deref());
    if plan.is_empty() {
        ui::warn("No resources match the target");
        return Ok(ExitCode::SUCCESS);
    }

    let interactive = !args.json && !args.check && !args.yes;
    if interactive && args.file == Path::new("-") {
        bail!("Reading from stdin needs --yes (or --json) since the confirmation prompt cannot be shown");
    }

    let remote = connect(ctx)?;
    let opts = ExecuteOptions {
        dry_run: args.check,
        jobs: usize::from(args.jobs.max(1)),
        fail_fast: args.fail_fast,
    };

    if args.json {
        let report = execute(&plan, &remote, &opts, &mut NoProgress)?;
        print_json(&report.results, loaded.single)?;
        return Ok(exit_code(&report, args.strict));
    }

    let plan = if interactive {
        ui::header("Plan");
        let preview_opts = ExecuteOptions {
            dry_run: true,
            ..opts.clone()
        };
        let preview = execute(
            &plan.clone().into_check_mode(),
            &remote,
            &preview_opts,
            &mut CliProgress::new(ctx),
        )?;

        let pending: HashSet<(ResourceKind, String)> = preview
            .results
            .iter()
            .filter(|r| r.changed || r.failed())
            .map(|r| (r.kind, r.identity.clone()))
            .collect();
        if pending.is_empty() {
            println!();
            ui::success("No changes needed");
            return Ok(exit_code(&preview, args.strict));
        }

        print_summary(&preview, true);
        println!();
        if !confirm_proceed()? {
            println!();
            println!("  {} Aborted", "✗".red());
            return Ok(ExitCode::SUCCESS);
        }
        plan.filter(|inv| pending.contains(&(inv.kind, inv.identity.clone())))
    } else {
        plan
    };

    ui::header(if args.check { "Check" } else { "Apply" });
    let report = execute(&plan, &remote, &opts, &mut CliProgress::new(ctx))?;
    print_summary(&report, args.check);

    if report.summary.is_success() && !args.check {
        println!();
        ui::success("Apply complete!");
    }
    Ok(exit_code(&report, args.strict))
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}
