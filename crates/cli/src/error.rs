use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnowError>;

#[derive(Debug, Error)]
pub enum SnowError {
	#[error("snow_instance not set. Set it via environment variable (snow_instance=your-instance.service-now.com), --instance, or `snow add`")]
	InstanceNotSet,

	#[error("Credentials not set. Set snow_user and snow_pwd environment variables, or store them with `snow add`")]
	CredentialsNotSet,

	#[error("Instance {0} not found")]
	UnknownInstance(String),

	#[error("{0}")]
	InvalidInput(String),

	#[error("Script file not found: {}", .0.display())]
	ScriptNotFound(PathBuf),

	/// The instance answered, but not with the status the action expects.
	#[error("{action} failed with status code: {status}{}", response_suffix(.body))]
	ActionFailed {
		action: &'static str,
		status: u16,
		body: Option<String>,
	},

	#[error(transparent)]
	Snow(#[from] snow::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Csv(#[from] csv::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

fn response_suffix(body: &Option<String>) -> String {
	match body.as_deref().map(str::trim) {
		Some(body) if !body.is_empty() => format!("\nResponse: {body}"),
		_ => String::new(),
	}
}

impl SnowError {
	/// Follow-up advice printed under the error message.
	pub fn hint(&self) -> Option<&'static str> {
		match self {
			SnowError::InstanceNotSet | SnowError::UnknownInstance(_) => Some("run `snow list` to see configured instances"),
			SnowError::Snow(err @ snow::Error::Http { .. }) if err.suggests_login() => Some("check the user name and password, then run `snow login`"),
			SnowError::ActionFailed { status: 401 | 403, .. } => Some("the session may have expired; run `snow login`"),
			_ => None,
		}
	}
}
