//! `run`: execute a background script.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use snow::{ScriptOutput, actions};
use tracing::debug;

use crate::config::Config;
use crate::error::{Result, SnowError};

/// Reads the script from `path`, or from `stdin` when `path` is absent or `-`.
pub fn read_script(path: Option<&Path>, mut stdin: impl Read) -> Result<String> {
	match path {
		Some(path) if path != Path::new("-") => fs::read_to_string(path).map_err(|err| match err.kind() {
			io::ErrorKind::NotFound => SnowError::ScriptNotFound(path.to_path_buf()),
			_ => SnowError::Io(err),
		}),
		_ => {
			let mut script = String::new();
			stdin.read_to_string(&mut script)?;
			Ok(script)
		}
	}
}

/// Runs `script` on the resolved instance.
///
/// The raw response page is kept in `last_run_output.txt` next to the cookie
/// file for inspection.
pub async fn execute(config: &Config, script: &str) -> Result<ScriptOutput> {
	let mut session = config.session()?;
	let run = actions::run_script(&mut session, script).await?;
	if !run.is_success() {
		return Err(SnowError::ActionFailed {
			action: "Script execution",
			status: run.status.as_u16(),
			body: None,
		});
	}

	let raw = config.last_run_output()?;
	fs::write(&raw, &run.html)?;
	debug!(target = "snow", path = %raw.display(), stdout = run.output.stdout.len(), stderr = run.output.stderr.len(), "script finished");
	Ok(run.output)
}

/// CLI entry point: stdout lines go to stdout, stderr lines to stderr.
pub async fn command(config: &Config, path: Option<&Path>) -> Result<()> {
	config.instance()?;
	let script = read_script(path, io::stdin().lock())?;
	let output = execute(config, &script).await?;
	for line in &output.stdout {
		println!("{line}");
	}
	for line in &output.stderr {
		eprintln!("{line}");
	}
	Ok(())
}
