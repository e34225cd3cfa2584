//! `dockyard targets` command

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;

use dockyard::util::Shell;

use crate::cli::TargetsArgs;
use crate::session::Session;

pub async fn execute(args: TargetsArgs, shell: Arc<Shell>) -> Result<ExitCode> {
    let session = Session::open(&args.project, shell.clone())?;

    // Refresh explicitly so provider failures show up as notices.
    session.targets().refresh_targets(None).await;
    let targets = session.targets().get_targets(&session.root).await;
    let active = session
        .targets()
        .get_active_target(&session.root)
        .await
        .map(|t| t.name);

    if shell.is_json() {
        for target in &targets {
            let line = serde_json::json!({
                "reason": "target",
                "name": target.name,
                "active": active.as_deref() == Some(target.name.as_str()),
                "command": target.command_name(),
                "keymap": target.keymap,
            });
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    if targets.is_empty() {
        shell.warn(format!("no build targets found in {}", session.root.display()));
        return Ok(ExitCode::SUCCESS);
    }

    for target in &targets {
        let marker = if active.as_deref() == Some(target.name.as_str()) {
            "*"
        } else {
            " "
        };
        let mut line = format!("{} {}", marker, target.name);
        if let Some(keymap) = &target.keymap {
            line.push_str(&format!(" [{}]", keymap));
        }
        println!("{}", line);
    }

    Ok(ExitCode::SUCCESS)
}
