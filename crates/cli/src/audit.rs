//! Append-only audit trail of MCP tool calls.
//!
//! One JSON object per line in `audit.log` under the state root:
//!
//! ```json
//! {"ts":"2026-03-01T10:00:00+00:00","tool":"snow_run_script","params":{"script":"gs.print(1)"},"outcome":"success","duration_ms":412}
//! ```
//!
//! Writing the trail is best effort; a failure is logged and the tool call
//! proceeds.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

pub const REDACTED: &str = "***REDACTED***";

/// Parameter names whose values never reach the log (case-insensitive).
const SENSITIVE_KEYS: [&str; 4] = ["password", "pwd", "secret", "token"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
	Success,
	Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
	pub ts: String,
	pub tool: String,
	pub params: Value,
	pub outcome: Outcome,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_ms: Option<u64>,
}

impl AuditEntry {
	/// Stamps the entry with the current UTC time and redacts `params`.
	pub fn new(tool: impl Into<String>, params: &Value, outcome: Outcome) -> Self {
		Self {
			ts: chrono::Utc::now().to_rfc3339(),
			tool: tool.into(),
			params: redact(params),
			outcome,
			error: None,
			duration_ms: None,
		}
	}

	pub fn error(mut self, error: impl Into<String>) -> Self {
		let error = error.into();
		if !error.is_empty() {
			self.error = Some(error);
		}
		self
	}

	pub fn duration(mut self, duration: Duration) -> Self {
		self.duration_ms = Some(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX));
		self
	}
}

/// Shallow copy of `params` with sensitive top-level values replaced.
pub fn redact(params: &Value) -> Value {
	match params {
		Value::Object(map) => {
			let redacted: Map<String, Value> = map
				.iter()
				.map(|(key, value)| {
					let sensitive = SENSITIVE_KEYS.iter().any(|k| key.eq_ignore_ascii_case(k));
					let value = if sensitive { Value::String(REDACTED.to_string()) } else { value.clone() };
					(key.clone(), value)
				})
				.collect();
			Value::Object(redacted)
		}
		other => other.clone(),
	}
}

#[derive(Debug, Clone)]
pub struct AuditLog {
	path: PathBuf,
}

impl AuditLog {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Appends `entry` as one line. The file is created owner-only.
	pub fn append(&self, entry: &AuditEntry) -> io::Result<()> {
		if let Some(parent) = self.path.parent() {
			fs::create_dir_all(parent)?;
		}
		let mut options = OpenOptions::new();
		options.create(true).append(true);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			options.mode(0o600);
		}
		let mut file = options.open(&self.path)?;

		let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
		line.push('\n');
		file.write_all(line.as_bytes())
	}

	/// Appends `entry`, logging instead of failing.
	pub fn record(&self, entry: &AuditEntry) {
		if let Err(err) = self.append(entry) {
			warn!(target = "snow", path = %self.path.display(), error = %err, tool = %entry.tool, "failed to write audit entry");
		}
	}
}
