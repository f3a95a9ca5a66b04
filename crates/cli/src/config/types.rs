//! Registry file types: [`RegistryConfig`] and [`Secrets`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Schema version for `config.json` and `secrets.json`.
pub const SCHEMA_VERSION: u32 = 1;

/// A configured instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstanceEntry {
	pub user: String,
}

/// Durable instance registry (`config.json`).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryConfig {
	#[serde(default)]
	pub schema: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default_instance: Option<String>,
	#[serde(default)]
	pub instances: BTreeMap<String, InstanceEntry>,
}

impl RegistryConfig {
	/// Creates a registry with current [`SCHEMA_VERSION`].
	pub fn new() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			..Default::default()
		}
	}
}

/// Stored passwords keyed by instance (`secrets.json`, owner-only).
#[derive(Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Secrets {
	#[serde(default)]
	pub schema: u32,
	#[serde(default)]
	pub passwords: BTreeMap<String, String>,
}

impl Secrets {
	pub fn new() -> Self {
		Self {
			schema: SCHEMA_VERSION,
			..Default::default()
		}
	}
}

impl fmt::Debug for Secrets {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Secrets")
			.field("schema", &self.schema)
			.field("passwords", &self.passwords.keys().collect::<Vec<_>>())
			.finish()
	}
}
