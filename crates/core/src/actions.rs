//! Token-then-action flows: login, role elevation and background scripts.
//!
//! Each flow fetches the page carrying the relevant security token, then posts
//! the state-changing request with that token attached. Status interpretation
//! is left to the caller.

use std::fmt;

use reqwest::StatusCode;
use serde_json::json;
use tracing::info;

use crate::demux::{ScriptOutput, demultiplex};
use crate::error::Result;
use crate::session::{RequestBody, RequestOptions, Response, Session};

/// Role requested by [`elevate`] when none is given.
pub const SECURITY_ADMIN_ROLE: &str = "security_admin";

const ELEVATE_PATH: &str = "/api/now/ui/impersonate/role";

/// User name and password for an instance.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	pub user: String,
	pub password: String,
}

impl Credentials {
	pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
		Self {
			user: user.into(),
			password: password.into(),
		}
	}
}

impl fmt::Debug for Credentials {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Credentials").field("user", &self.user).field("password", &"<redacted>").finish()
	}
}

/// Result of posting a background script.
#[derive(Debug, Clone)]
pub struct ScriptRun {
	pub status: StatusCode,
	/// Raw HTML page returned by the endpoint.
	pub html: String,
	/// Output streams recovered from `html`.
	pub output: ScriptOutput,
}

impl ScriptRun {
	pub fn is_success(&self) -> bool {
		self.status == StatusCode::OK
	}
}

/// Submits the login form. Returns the final status after redirects.
pub async fn login(session: &mut Session, credentials: &Credentials) -> Result<StatusCode> {
	let token = session.login_token().await?;
	info!(target = "snow", instance = %session.instance(), user = %credentials.user, "submitting login form");

	let body = RequestBody::form([
		("sysparm_ck", token.as_str()),
		("user_name", credentials.user.as_str()),
		("user_password", credentials.password.as_str()),
		("ni.nolog.user_password", "true"),
		("ni.noecho.user_name", "true"),
		("ni.noecho.user_password", "true"),
		("screensize", "1920x1080"),
		("sys_action", "sysverb_login"),
	]);
	let response = session.post("/login.do", body, RequestOptions::new()).await?;
	Ok(response.status)
}

/// Requests `role` for the current session via the impersonation API.
pub async fn elevate(session: &mut Session, role: &str) -> Result<Response> {
	let token = session.elevate_token().await?;
	info!(target = "snow", instance = %session.instance(), %role, "requesting role elevation");

	let options = RequestOptions::new()
		.header("Accept", "application/json, text/plain, */*")
		.header("Accept-Language", "en-US,en;q=0.9")
		.header("X-WantSessionNotificationMessages", "true")
		.header("X-UserToken", token.as_str());
	session.post(ELEVATE_PATH, RequestBody::Json(json!({ "roles": role })), options).await
}

/// Runs `script` through `/sys.scripts.do` and demultiplexes the answer.
pub async fn run_script(session: &mut Session, script: &str) -> Result<ScriptRun> {
	let token = session.script_token().await?;
	info!(target = "snow", instance = %session.instance(), bytes = script.len(), "running background script");

	let body = RequestBody::form([
		("sysparm_ck", token.as_str()),
		("runscript", "Run script"),
		("record_for_rollback", "on"),
		("quota_managed_transaction", "on"),
		("script", script),
	]);
	let options = RequestOptions::new()
		.header("Pragma", "no-cache")
		.header("Cache-Control", "no-cache")
		.header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8");
	let response = session.post("/sys.scripts.do", body, options).await?;

	let output = if response.status == StatusCode::OK {
		demultiplex(&response.body)
	} else {
		ScriptOutput::default()
	};
	Ok(ScriptRun {
		status: response.status,
		html: response.body,
		output,
	})
}
