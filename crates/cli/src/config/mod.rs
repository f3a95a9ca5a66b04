//! Instance registry and per-invocation configuration.
//!
//! State categories:
//! * [`RegistryConfig`]: configured instances, their users and the default
//! * [`Secrets`]: stored passwords, owner-only file
//!
//! [`Config`] resolves which instance and credentials one command runs with:
//! explicit value (flag or environment) first, then the registry.

use std::fs;
use std::path::PathBuf;

use snow::{Credentials, Session, TableClient};
use tracing::debug;

use crate::error::{Result, SnowError};

pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;

pub use storage::{LoadedState, StatePaths};
pub use types::{InstanceEntry, RegistryConfig, Secrets};

/// Values given explicitly for one invocation, by flag or environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Overrides {
	pub instance: Option<String>,
	pub user: Option<String>,
	pub password: Option<String>,
}

impl Overrides {
	/// Replaces the instance when `instance` is given.
	pub fn with_instance(mut self, instance: Option<String>) -> Self {
		if let Some(instance) = instance.filter(|i| !i.is_empty()) {
			self.instance = Some(instance);
		}
		self
	}
}

impl std::fmt::Debug for Overrides {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Overrides")
			.field("instance", &self.instance)
			.field("user", &self.user)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.finish()
	}
}

/// Instance registry backed by `config.json` and `secrets.json`.
#[derive(Debug)]
pub struct Registry {
	state: LoadedState,
}

impl Registry {
	pub fn load(paths: StatePaths) -> Self {
		Self {
			state: LoadedState::load(paths),
		}
	}

	pub fn paths(&self) -> &StatePaths {
		&self.state.paths
	}

	pub fn default_instance(&self) -> Option<&str> {
		self.state.config.default_instance.as_deref()
	}

	pub fn instances(&self) -> impl Iterator<Item = (&str, &InstanceEntry)> {
		self.state.config.instances.iter().map(|(name, entry)| (name.as_str(), entry))
	}

	pub fn len(&self) -> usize {
		self.state.config.instances.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state.config.instances.is_empty()
	}

	pub fn get(&self, instance: &str) -> Option<&InstanceEntry> {
		self.state.config.instances.get(instance)
	}

	pub fn password(&self, instance: &str) -> Option<&str> {
		self.state.secrets.passwords.get(instance).map(String::as_str)
	}

	/// Adds or replaces an instance. The first instance added becomes the
	/// default. Returns whether the instance is now the default.
	pub fn add(&mut self, instance: &str, user: &str, password: &str, set_default: bool) -> Result<bool> {
		self.state.config.instances.insert(instance.to_string(), InstanceEntry { user: user.to_string() });
		self.state.secrets.passwords.insert(instance.to_string(), password.to_string());
		if set_default || self.state.config.default_instance.is_none() {
			self.state.config.default_instance = Some(instance.to_string());
		}
		self.state.save()?;
		debug!(target = "snow", %instance, %user, "instance saved");
		Ok(self.default_instance() == Some(instance))
	}

	pub fn set_default(&mut self, instance: &str) -> Result<()> {
		if !self.state.config.instances.contains_key(instance) {
			return Err(SnowError::UnknownInstance(instance.to_string()));
		}
		self.state.config.default_instance = Some(instance.to_string());
		self.state.save()
	}

	/// Removes an instance and its password. A removed default falls back to
	/// the first remaining instance.
	pub fn remove(&mut self, instance: &str) -> Result<()> {
		if self.state.config.instances.remove(instance).is_none() {
			return Err(SnowError::UnknownInstance(instance.to_string()));
		}
		self.state.secrets.passwords.remove(instance);
		if self.default_instance() == Some(instance) {
			self.state.config.default_instance = self.state.config.instances.keys().next().cloned();
		}
		self.state.save()
	}
}

/// Resolved configuration for one command or tool call.
#[derive(Clone)]
pub struct Config {
	pub instance: Option<String>,
	pub user: Option<String>,
	pub password: Option<String>,
	pub paths: StatePaths,
}

impl std::fmt::Debug for Config {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Config")
			.field("instance", &self.instance)
			.field("user", &self.user)
			.field("password", &self.password.as_ref().map(|_| "<redacted>"))
			.field("root", &self.paths.root)
			.finish()
	}
}

impl Config {
	/// Layers `overrides` over the registry: instance falls back to the
	/// default, user and password to what is stored for that instance.
	pub fn resolve(overrides: Overrides, registry: &Registry) -> Self {
		let instance = overrides.instance.or_else(|| registry.default_instance().map(str::to_string));
		let stored_user = instance.as_deref().and_then(|i| registry.get(i)).map(|e| e.user.clone());
		let stored_password = instance.as_deref().and_then(|i| registry.password(i)).map(str::to_string);

		Self {
			user: overrides.user.or(stored_user),
			password: overrides.password.or(stored_password),
			instance,
			paths: registry.paths().clone(),
		}
	}

	/// Loads the registry at `paths` and resolves against it.
	pub fn load(overrides: Overrides, paths: StatePaths) -> Self {
		Self::resolve(overrides, &Registry::load(paths))
	}

	pub fn instance(&self) -> Result<&str> {
		self.instance.as_deref().filter(|i| !i.is_empty()).ok_or(SnowError::InstanceNotSet)
	}

	pub fn credentials(&self) -> Result<Credentials> {
		self.instance()?;
		match (self.user.as_deref(), self.password.as_deref()) {
			(Some(user), Some(password)) if !user.is_empty() && !password.is_empty() => Ok(Credentials::new(user, password)),
			_ => Err(SnowError::CredentialsNotSet),
		}
	}

	/// Per-instance scratch directory, created on demand.
	pub fn tmp_dir(&self) -> Result<PathBuf> {
		let dir = self.paths.instance_dir(self.instance()?);
		fs::create_dir_all(&dir)?;
		Ok(dir)
	}

	pub fn cookie_file(&self) -> Result<PathBuf> {
		Ok(self.tmp_dir()?.join("cookies.txt"))
	}

	pub fn last_run_output(&self) -> Result<PathBuf> {
		Ok(self.tmp_dir()?.join("last_run_output.txt"))
	}

	/// Cookie-backed UI session for the resolved instance.
	pub fn session(&self) -> Result<Session> {
		let instance = self.instance()?;
		Ok(Session::new(instance, self.cookie_file()?)?)
	}

	/// Basic-auth Table API client for the resolved instance.
	pub fn table_client(&self) -> Result<TableClient> {
		let credentials = self.credentials()?;
		Ok(TableClient::new(self.instance()?, credentials)?)
	}
}
