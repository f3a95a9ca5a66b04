//! File storage for the instance registry and per-instance session state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::types::{RegistryConfig, Secrets};
use crate::error::Result;

/// Environment variable overriding the state root.
pub const HOME_ENV: &str = "SNOW_RUN_HOME";

/// File paths under the state root (`~/.snow-run` by default).
///
/// ```text
/// ~/.snow-run/
///   config.json
///   secrets.json
///   audit.log
///   tmp/{instance}/cookies.txt
///   tmp/{instance}/last_run_output.txt
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
	pub root: PathBuf,
	pub config: PathBuf,
	pub secrets: PathBuf,
	pub audit_log: PathBuf,
}

impl StatePaths {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		let root = root.into();
		Self {
			config: root.join("config.json"),
			secrets: root.join("secrets.json"),
			audit_log: root.join("audit.log"),
			root,
		}
	}

	/// `$SNOW_RUN_HOME`, else `~/.snow-run`.
	pub fn from_env() -> Self {
		let root = std::env::var_os(HOME_ENV)
			.filter(|v| !v.is_empty())
			.map(PathBuf::from)
			.or_else(|| dirs::home_dir().map(|h| h.join(".snow-run")))
			.unwrap_or_else(|| PathBuf::from(".snow-run"));
		Self::new(root)
	}

	/// Per-instance scratch directory. Not created.
	pub fn instance_dir(&self, instance: &str) -> PathBuf {
		self.root.join("tmp").join(dir_name(instance))
	}

	pub fn cookie_file(&self, instance: &str) -> PathBuf {
		self.instance_dir(instance).join("cookies.txt")
	}

	pub fn last_run_output(&self, instance: &str) -> PathBuf {
		self.instance_dir(instance).join("last_run_output.txt")
	}
}

/// Directory name for an instance. Host names pass through; anything else
/// (scheme, port separator) is flattened to `_`. Names made only of dots
/// become `_` so they cannot address `tmp` or its parent.
fn dir_name(instance: &str) -> String {
	if instance.chars().all(|c| c == '.') {
		return "_".to_string();
	}
	instance
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
		.collect()
}

/// Registry state loaded from disk.
#[derive(Debug)]
pub struct LoadedState {
	pub config: RegistryConfig,
	pub secrets: Secrets,
	pub paths: StatePaths,
}

impl LoadedState {
	/// Missing or unreadable files load as empty.
	pub fn load(paths: StatePaths) -> Self {
		let config = load_json::<RegistryConfig>(&paths.config).unwrap_or_else(RegistryConfig::new);
		let secrets = load_json::<Secrets>(&paths.secrets).unwrap_or_else(Secrets::new);
		Self { config, secrets, paths }
	}

	pub fn save(&self) -> Result<()> {
		save_json(&self.paths.config, &self.config)?;
		save_secrets(&self.paths.secrets, &self.secrets)?;
		Ok(())
	}
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
	fs::read_to_string(path).ok().and_then(|content| serde_json::from_str(&content).ok())
}

fn save_json<T: serde::Serialize>(path: &Path, data: &T) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	fs::write(path, serde_json::to_string_pretty(data)?)?;
	Ok(())
}

/// Secrets are created with mode 0600 and never pass through a wider mode.
fn save_secrets(path: &Path, secrets: &Secrets) -> Result<()> {
	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent)?;
	}
	let mut options = OpenOptions::new();
	options.write(true).create(true).truncate(true);
	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;
		options.mode(0o600);
	}
	let mut file = options.open(path)?;
	#[cfg(unix)]
	{
		use std::os::unix::fs::PermissionsExt;
		file.set_permissions(fs::Permissions::from_mode(0o600))?;
	}
	file.write_all(serde_json::to_string_pretty(secrets)?.as_bytes())?;
	Ok(())
}
