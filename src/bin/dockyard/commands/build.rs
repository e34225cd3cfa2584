//! `dockyard build` command

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;

use dockyard::util::Shell;

use crate::cli::BuildArgs;
use crate::session::Session;

pub async fn execute(args: BuildArgs, shell: Arc<Shell>) -> Result<ExitCode> {
    let session = Session::open(&args.project, shell)?;

    if let Some(name) = &args.target {
        session.activate(name).await?;
    }

    Ok(session.build().await)
}
