use tempfile::TempDir;

use super::*;

fn registry(tmp: &TempDir) -> Registry {
	Registry::load(StatePaths::new(tmp.path()))
}

fn overrides(instance: Option<&str>, user: Option<&str>, password: Option<&str>) -> Overrides {
	Overrides {
		instance: instance.map(str::to_string),
		user: user.map(str::to_string),
		password: password.map(str::to_string),
	}
}

#[test]
fn first_instance_becomes_default() {
	let tmp = TempDir::new().unwrap();
	let mut registry = registry(&tmp);

	assert!(registry.add("dev1.service-now.com", "admin", "pw1", false).unwrap());
	assert!(!registry.add("dev2.service-now.com", "ops", "pw2", false).unwrap());
	assert_eq!(registry.default_instance(), Some("dev1.service-now.com"));

	assert!(registry.add("dev2.service-now.com", "ops", "pw2", true).unwrap());
	assert_eq!(registry.default_instance(), Some("dev2.service-now.com"));
	assert_eq!(registry.len(), 2);
}

#[test]
fn registry_survives_reload() {
	let tmp = TempDir::new().unwrap();
	registry(&tmp).add("dev1.service-now.com", "admin", "pw1", false).unwrap();

	let reloaded = registry(&tmp);
	assert_eq!(reloaded.get("dev1.service-now.com").unwrap().user, "admin");
	assert_eq!(reloaded.password("dev1.service-now.com"), Some("pw1"));

	// Passwords never land in config.json.
	let config = std::fs::read_to_string(&reloaded.paths().config).unwrap();
	assert!(!config.contains("pw1"));
}

#[test]
fn use_unknown_instance_fails() {
	let tmp = TempDir::new().unwrap();
	let mut registry = registry(&tmp);
	let err = registry.set_default("nope.service-now.com").unwrap_err();
	assert_eq!(err.to_string(), "Instance nope.service-now.com not found");
}

#[test]
fn removing_default_promotes_remaining_instance() {
	let tmp = TempDir::new().unwrap();
	let mut registry = registry(&tmp);
	registry.add("a.service-now.com", "u", "p", false).unwrap();
	registry.add("b.service-now.com", "u", "p", false).unwrap();

	registry.remove("a.service-now.com").unwrap();
	assert_eq!(registry.default_instance(), Some("b.service-now.com"));
	assert!(registry.password("a.service-now.com").is_none());

	registry.remove("b.service-now.com").unwrap();
	assert_eq!(registry.default_instance(), None);
	assert!(matches!(registry.remove("b.service-now.com"), Err(SnowError::UnknownInstance(_))));
}

#[test]
fn resolve_falls_back_to_registry() {
	let tmp = TempDir::new().unwrap();
	let mut registry = registry(&tmp);
	registry.add("dev1.service-now.com", "admin", "pw1", false).unwrap();
	registry.add("dev2.service-now.com", "ops", "pw2", false).unwrap();

	let config = Config::resolve(Overrides::default(), &registry);
	assert_eq!(config.instance().unwrap(), "dev1.service-now.com");
	let credentials = config.credentials().unwrap();
	assert_eq!(credentials.user, "admin");
	assert_eq!(credentials.password, "pw1");

	// Explicit instance picks up that instance's stored credentials.
	let config = Config::resolve(overrides(Some("dev2.service-now.com"), None, None), &registry);
	assert_eq!(config.credentials().unwrap().user, "ops");
}

#[test]
fn explicit_values_beat_registry() {
	let tmp = TempDir::new().unwrap();
	let mut registry = registry(&tmp);
	registry.add("dev1.service-now.com", "admin", "pw1", false).unwrap();

	let config = Config::resolve(overrides(None, Some("other"), Some("env-pw")), &registry);
	assert_eq!(config.instance().unwrap(), "dev1.service-now.com");
	let credentials = config.credentials().unwrap();
	assert_eq!(credentials.user, "other");
	assert_eq!(credentials.password, "env-pw");
}

#[test]
fn missing_instance_and_credentials() {
	let tmp = TempDir::new().unwrap();
	let registry = registry(&tmp);

	let config = Config::resolve(Overrides::default(), &registry);
	assert!(matches!(config.instance(), Err(SnowError::InstanceNotSet)));
	assert!(matches!(config.credentials(), Err(SnowError::InstanceNotSet)));

	let config = Config::resolve(overrides(Some("unregistered.service-now.com"), Some("u"), None), &registry);
	assert!(matches!(config.credentials(), Err(SnowError::CredentialsNotSet)));
}

#[test]
fn tmp_dir_is_created_per_instance() {
	let tmp = TempDir::new().unwrap();
	let config = Config::resolve(overrides(Some("dev1.service-now.com"), None, None), &registry(&tmp));

	let cookie_file = config.cookie_file().unwrap();
	assert!(cookie_file.parent().unwrap().is_dir());
	assert!(cookie_file.ends_with("tmp/dev1.service-now.com/cookies.txt"));
}

#[test]
fn with_instance_ignores_empty_values() {
	let base = overrides(Some("env.service-now.com"), None, None);
	assert_eq!(base.clone().with_instance(None).instance.as_deref(), Some("env.service-now.com"));
	assert_eq!(base.clone().with_instance(Some(String::new())).instance.as_deref(), Some("env.service-now.com"));
	assert_eq!(base.with_instance(Some("tool.service-now.com".into())).instance.as_deref(), Some("tool.service-now.com"));
}

#[test]
fn debug_output_redacts_password() {
	let config = Config::resolve(overrides(Some("dev1"), Some("u"), Some("hunter2")), &registry(&TempDir::new().unwrap()));
	assert!(!format!("{config:?}").contains("hunter2"));
}
