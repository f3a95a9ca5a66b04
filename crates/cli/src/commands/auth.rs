//! `login` and `elevate`.

use snow::{StatusCode, actions};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, SnowError};

/// Logs in with the resolved credentials and persists the session cookies.
///
/// Returns the confirmation line shown to the user.
pub async fn login(config: &Config) -> Result<String> {
	let credentials = config.credentials()?;
	let instance = config.instance()?;
	let mut session = config.session()?;

	let status = actions::login(&mut session, &credentials).await?;
	if status != StatusCode::OK {
		return Err(SnowError::ActionFailed {
			action: "Login",
			status: status.as_u16(),
			body: None,
		});
	}
	info!(target = "snow", %instance, "logged in");
	Ok(format!("Successfully logged in to {instance}"))
}

/// Requests `role` for the saved session. Needs a prior [`login`].
pub async fn elevate(config: &Config, role: &str) -> Result<String> {
	let instance = config.instance()?;
	let mut session = config.session()?;

	let response = actions::elevate(&mut session, role).await?;
	if !matches!(response.status, StatusCode::OK | StatusCode::CREATED) {
		return Err(SnowError::ActionFailed {
			action: "Elevation",
			status: response.status.as_u16(),
			body: Some(response.body),
		});
	}
	info!(target = "snow", %instance, %role, "session elevated");
	Ok(format!("Successfully elevated privileges on {instance}"))
}
