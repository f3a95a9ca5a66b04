//! Instance registry commands: `add`, `list`, `use`, `remove` and `info`.
//!
//! Prompts read from `input` and messages go to `out`, so the flows run the
//! same against a terminal or a test buffer.

use std::io::{BufRead, Write};

use crate::config::{Config, Registry};
use crate::error::{Result, SnowError};

fn prompt(input: &mut impl BufRead, out: &mut impl Write, question: &str) -> Result<String> {
	write!(out, "{question}")?;
	out.flush()?;
	let mut line = String::new();
	input.read_line(&mut line)?;
	Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn required(value: String, what: &str) -> Result<String> {
	let value = value.trim().to_string();
	if value.is_empty() {
		return Err(SnowError::InvalidInput(format!("{what} is required")));
	}
	Ok(value)
}

pub fn add(registry: &mut Registry, instance: Option<String>, set_default: bool, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
	let instance = match instance.filter(|i| !i.trim().is_empty()) {
		Some(instance) => instance.trim().to_string(),
		None => required(prompt(input, out, "ServiceNow instance (e.g. dev1234.service-now.com): ")?, "Instance")?,
	};
	let user = required(prompt(input, out, &format!("Username for {instance}: "))?, "Username")?;
	let password = prompt(input, out, &format!("Password for {user}@{instance}: "))?;
	if password.is_empty() {
		return Err(SnowError::InvalidInput("Password is required".into()));
	}

	let is_default = registry.add(&instance, &user, &password, set_default)?;

	writeln!(out)?;
	writeln!(out, "Added instance: {instance}")?;
	writeln!(out, "  User: {user}")?;
	writeln!(out, "  Password: stored in {}", registry.paths().secrets.display())?;
	if is_default {
		writeln!(out, "  Set as default instance")?;
	}
	Ok(())
}

pub fn list(registry: &Registry, out: &mut impl Write) -> Result<()> {
	if registry.is_empty() {
		writeln!(out, "No instances configured.")?;
		writeln!(out)?;
		writeln!(out, "Run 'snow add' to add an instance.")?;
		return Ok(());
	}

	writeln!(out, "Configured instances:")?;
	writeln!(out)?;
	let default = registry.default_instance();
	for (name, entry) in registry.instances() {
		let marker = if Some(name) == default { " (default)" } else { "" };
		writeln!(out, "  {name}{marker}")?;
		writeln!(out, "    User: {}", entry.user)?;
		writeln!(out)?;
	}
	Ok(())
}

pub fn use_instance(registry: &mut Registry, instance: &str, out: &mut impl Write) -> Result<()> {
	registry.set_default(instance)?;
	writeln!(out, "Set default instance to: {instance}")?;
	Ok(())
}

pub fn remove(registry: &mut Registry, instance: &str, yes: bool, input: &mut impl BufRead, out: &mut impl Write) -> Result<()> {
	if registry.get(instance).is_none() {
		return Err(SnowError::UnknownInstance(instance.to_string()));
	}
	if !yes {
		let answer = prompt(input, out, &format!("Remove instance {instance}? [y/N]: "))?;
		if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
			writeln!(out, "Cancelled.")?;
			return Ok(());
		}
	}
	registry.remove(instance)?;
	writeln!(out, "Removed instance: {instance}")?;
	Ok(())
}

pub fn info(config: &Config, registry: &Registry, out: &mut impl Write) -> Result<()> {
	match config.instance.as_deref() {
		Some(instance) => {
			writeln!(out, "Current instance: {instance}")?;
			writeln!(out, "  User: {}", config.user.as_deref().unwrap_or("(not set)"))?;
			writeln!(out, "  Password: {}", if config.password.is_some() { "(set)" } else { "(not set)" })?;
			writeln!(out, "  Cookie file: {}", config.paths.cookie_file(instance).display())?;
		}
		None => writeln!(out, "No instance configured.")?,
	}
	writeln!(out)?;

	if registry.is_empty() {
		writeln!(out, "No instances configured.")?;
		writeln!(out, "Run 'snow add' to add an instance.")?;
	} else {
		writeln!(out, "Total instances configured: {}", registry.len())?;
		writeln!(out)?;
		writeln!(out, "Run 'snow list' to see all instances.")?;
	}
	Ok(())
}
