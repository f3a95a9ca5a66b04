//! Command implementations.
//!
//! The async operations in [`auth`], [`run`] and [`records`] return data or a
//! message and are shared with the MCP tools. The `*_command` wrappers print.

pub mod auth;
pub mod instance;
pub mod records;
pub mod run;

use std::io;

use crate::cli::{Cli, Commands};
use crate::config::{Config, Overrides, Registry, StatePaths};
use crate::error::Result;
use crate::mcp;

pub async fn dispatch(cli: Cli) -> Result<()> {
	let overrides = Overrides {
		instance: cli.instance,
		user: cli.user,
		password: cli.password,
	};
	let paths = StatePaths::from_env();

	match cli.command {
		Commands::Mcp => return mcp::serve(paths, overrides).await,
		Commands::Add { instance, default } => {
			let mut registry = Registry::load(paths);
			return instance::add(&mut registry, instance, default, &mut io::stdin().lock(), &mut io::stdout().lock());
		}
		Commands::List => return instance::list(&Registry::load(paths), &mut io::stdout().lock()),
		Commands::Use { instance } => {
			let mut registry = Registry::load(paths);
			return instance::use_instance(&mut registry, &instance, &mut io::stdout().lock());
		}
		Commands::Remove { instance, yes } => {
			let mut registry = Registry::load(paths);
			return instance::remove(&mut registry, &instance, yes, &mut io::stdin().lock(), &mut io::stdout().lock());
		}
		_ => {}
	}

	let registry = Registry::load(paths);
	let config = Config::resolve(overrides, &registry);
	match cli.command {
		Commands::Login => println!("{}", auth::login(&config).await?),
		Commands::Elevate { role } => println!("{}", auth::elevate(&config, &role).await?),
		Commands::Run { script } => run::command(&config, script.as_deref()).await?,
		Commands::Search(args) => records::search_command(&config, &args).await?,
		Commands::Fields { table, format, output } => records::fields_command(&config, &table, format, output.as_deref()).await?,
		Commands::Count { table, query } => records::count_command(&config, &table, query.as_deref()).await?,
		Commands::Info => instance::info(&config, &registry, &mut io::stdout().lock())?,
		Commands::Mcp | Commands::Add { .. } | Commands::List | Commands::Use { .. } | Commands::Remove { .. } => unreachable!("handled above"),
	}
	Ok(())
}
