//! `dockyard select` command
//!
//! Lists the targets on stderr and reads the choice from stdin. The chosen
//! target is built right away unless `select-triggers` is off.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;

use dockyard::builder::BuildState;
use dockyard::util::{Shell, Status};

use crate::cli::SelectArgs;
use crate::session::Session;

pub async fn execute(args: SelectArgs, shell: Arc<Shell>) -> Result<ExitCode> {
    let session = Session::open(&args.project, shell.clone())?;

    let Some(chosen) = session.controller.select_active_target().await else {
        shell.warn("no target selected");
        return Ok(ExitCode::FAILURE);
    };
    shell.status(Status::Selected, &chosen);

    if session.controller.state() == BuildState::Idle {
        return Ok(ExitCode::SUCCESS);
    }
    Ok(session.finish().await)
}
