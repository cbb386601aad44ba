//! `gerritctl diff`

use anyhow::Result;
use declarative::{ExecuteOptions, NoProgress, execute};
use std::process::ExitCode;

use super::{CliProgress, connect, exit_code, print_json, print_summary};
use crate::Context;
use crate::cli::DiffArgs;
use crate::invocation;
use crate::ui;

pub fn run(ctx: &Context, args: DiffArgs) -> Result<ExitCode> {
    let loaded = invocation::load(&args.file)?;
    let plan = loaded
        .plan
        .filter_by_target(args.target.as_deref())
        .into_check_mode();
    if plan.is_empty() {
        ui::warn("No resources match the target");
        return Ok(ExitCode::SUCCESS);
    }

    let remote = connect(ctx)?;
    let opts = ExecuteOptions {
        dry_run: true,
        jobs: usize::from(args.jobs.max(1)),
        fail_fast: false,
    };

    if args.json {
        let report = execute(&plan, &remote, &opts, &mut NoProgress)?;
        print_json(&report.results, loaded.single)?;
        return Ok(exit_code(&report, false));
    }

    ui::header("Diff");
    let report = execute(&plan, &remote, &opts, &mut CliProgress::new(ctx))?;
    if report.summary.changed == 0 && report.summary.is_success() {
        println!();
        ui::success("No changes needed");
    } else {
        print_summary(&report, true);
    }
    Ok(exit_code(&report, false))
}
