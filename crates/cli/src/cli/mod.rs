#[cfg(test)]
mod tests;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use snow::{DisplayValues, SECURITY_ADMIN_ROLE};

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// ServiceNow CLI: background scripts, role elevation and Table API queries.
///
/// Credentials come from flags, the `snow_instance`, `snow_user` and
/// `snow_pwd` environment variables, or instances stored with `snow add`.
#[derive(Parser, Debug)]
#[command(name = "snow")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// ServiceNow instance (e.g. dev1234.service-now.com)
	#[arg(long, global = true, env = "snow_instance", value_name = "HOST")]
	pub instance: Option<String>,

	/// ServiceNow user name
	#[arg(long, global = true, env = "snow_user")]
	pub user: Option<String>,

	/// ServiceNow password
	#[arg(long, global = true, env = "snow_pwd", hide_env_values = true)]
	pub password: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Log in and save the session cookies
	Login,

	/// Elevate the session to a privileged role
	Elevate {
		/// Role to request
		#[arg(long, default_value = SECURITY_ADMIN_ROLE)]
		role: String,
	},

	/// Run a background script
	///
	/// Reads the script from FILE, or from stdin when FILE is `-` or omitted.
	///
	/// Examples:
	///   snow run example.js
	///   echo "gs.print('Hello');" | snow run
	#[command(verbatim_doc_comment)]
	Run {
		/// JavaScript file to execute
		#[arg(value_name = "FILE")]
		script: Option<PathBuf>,
	},

	/// Search records through the Table API
	Search(SearchArgs),

	/// List the fields of a table, inherited ones included
	Fields {
		/// Table name (e.g. incident)
		table: String,

		/// Output format
		#[arg(long, value_enum, default_value_t = OutputFormat::Table)]
		format: OutputFormat,

		/// Write output to FILE instead of stdout
		#[arg(short, long, value_name = "FILE")]
		output: Option<PathBuf>,
	},

	/// Count records matching a query
	Count {
		/// Table name (e.g. incident)
		table: String,

		/// Encoded query (e.g. active=true^priority=1)
		#[arg(short, long)]
		query: Option<String>,
	},

	/// Add an instance, prompting for missing details
	Add {
		/// Instance host name
		instance: Option<String>,

		/// Make this the default instance
		#[arg(long)]
		default: bool,
	},

	/// List configured instances
	List,

	/// Set the default instance
	Use {
		/// Instance host name
		instance: String,
	},

	/// Remove an instance and its stored password
	Remove {
		/// Instance host name
		instance: String,

		/// Skip the confirmation prompt
		#[arg(short, long)]
		yes: bool,
	},

	/// Show the resolved configuration
	Info,

	/// Serve the tools over MCP on stdio
	Mcp,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
	/// Table name (e.g. incident)
	pub table: String,

	/// Encoded query (e.g. active=true^priority=1)
	#[arg(short, long)]
	pub query: Option<String>,

	/// Sort ascending by FIELD (repeatable)
	#[arg(long, value_name = "FIELD")]
	pub order_by: Vec<String>,

	/// Sort descending by FIELD (repeatable)
	#[arg(long, value_name = "FIELD")]
	pub order_by_desc: Vec<String>,

	/// Comma-separated list of fields to return
	#[arg(short, long)]
	pub fields: Option<String>,

	/// Maximum number of records
	#[arg(short, long)]
	pub limit: Option<usize>,

	/// Omit the header row
	#[arg(long)]
	pub no_header: bool,

	/// Print only sys_id values, one per line
	#[arg(long)]
	pub sys_id: bool,

	/// How reference and choice fields are shown
	#[arg(long, value_enum, default_value_t = DisplayMode::Both)]
	pub display_values: DisplayMode,

	/// Output format
	#[arg(long, value_enum, default_value_t = OutputFormat::Table)]
	pub format: OutputFormat,

	/// Write output to FILE instead of stdout
	#[arg(short, long, value_name = "FILE")]
	pub output: Option<PathBuf>,
}

/// CLI-facing display mode. Converted into [`DisplayValues`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum DisplayMode {
	/// Raw values (sys_ids for references)
	Values,
	/// Display values only
	Display,
	/// Display value with the raw value in parentheses
	#[default]
	Both,
}

impl From<DisplayMode> for DisplayValues {
	fn from(mode: DisplayMode) -> Self {
		match mode {
			DisplayMode::Values => DisplayValues::Values,
			DisplayMode::Display => DisplayValues::Display,
			DisplayMode::Both => DisplayValues::Both,
		}
	}
}
