//! `gerritctl show`

use anyhow::Result;
use declarative::{Error, ResourceState, fetch::fetch};
use std::process::ExitCode;

use super::connect;
use crate::Context;
use crate::cli::ShowArgs;
use crate::ui;

pub fn run(ctx: &Context, args: ShowArgs) -> Result<ExitCode> {
    let remote = connect(ctx)?;

    let state = match fetch(&remote, args.kind, &args.identity) {
        Ok(state) => state,
        Err(e @ Error::NotFound { .. }) => {
            ui::error(&e.to_string());
            return Ok(ExitCode::FAILURE);
        }
        Err(e) => {
            ui::error(&e.to_string());
            ui::dim(e.category().advice());
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state.to_json())?);
    } else {
        print_state(&state, &args.identity);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_state(state: &ResourceState, identity: &str) {
    ui::header(&format!("{} {}", state.kind(), identity));
    for (field, value) in state.iter() {
        ui::kv(field, &value.to_string());
    }
}
