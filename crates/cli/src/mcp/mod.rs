//! MCP tool server over stdio.
//!
//! Exposes the CLI operations as tools for an agent. Every call resolves its
//! own [`Config`] (so the optional `instance` argument can pick any configured
//! instance) and appends one line to the audit log.


use std::future::Future;
use std::time::Instant;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt, schemars, schemars::JsonSchema, tool, tool_handler, tool_router, transport::stdio};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use snow::{RecordQuery, SECURITY_ADMIN_ROLE};
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditLog, Outcome};
use crate::commands::{auth, records, run};
use crate::config::{Config, Overrides, StatePaths};
use crate::error::SnowError;

const INSTRUCTIONS: &str = "Tools for executing JavaScript background scripts on a ServiceNow instance, \
logging in, elevating privileges and querying records through the Table API. \
Instances are pre-configured via 'snow add'. Omit 'instance' to use the default configured instance. \
Run snow_login first; snow_run_script and snow_elevate reuse the saved session.";

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct InstanceArgs {
	#[schemars(description = "ServiceNow instance host name (e.g. dev1234.service-now.com). Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ElevateArgs {
	#[schemars(description = "Role to request. Defaults to security_admin.")]
	pub role: Option<String>,
	#[schemars(description = "ServiceNow instance host name. Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunScriptArgs {
	#[schemars(description = "JavaScript source code to run (e.g. \"gs.print('hello');\")")]
	pub script: String,
	#[schemars(description = "ServiceNow instance host name. Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SearchRecordsArgs {
	#[schemars(description = "Table name (e.g. incident, sys_user)")]
	pub table: String,
	#[schemars(description = "Encoded query (e.g. active=true^priority=1)")]
	pub query: Option<String>,
	#[schemars(description = "Fields to sort ascending by")]
	pub order_by: Option<Vec<String>>,
	#[schemars(description = "Fields to sort descending by")]
	pub order_by_desc: Option<Vec<String>>,
	#[schemars(description = "Comma-separated list of fields to return")]
	pub fields: Option<String>,
	#[schemars(description = "Maximum number of records to return")]
	pub limit: Option<usize>,
	#[schemars(description = "One of: values, display, both (default both)")]
	pub display_values: Option<String>,
	#[schemars(description = "ServiceNow instance host name. Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct TableFieldsArgs {
	#[schemars(description = "Table name (e.g. incident)")]
	pub table: String,
	#[schemars(description = "ServiceNow instance host name. Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct CountRecordsArgs {
	#[schemars(description = "Table name (e.g. incident)")]
	pub table: String,
	#[schemars(description = "Encoded query (e.g. active=true)")]
	pub query: Option<String>,
	#[schemars(description = "ServiceNow instance host name. Omit to use the default configured instance.")]
	pub instance: Option<String>,
}

#[derive(Clone)]
pub struct SnowTools {
	paths: StatePaths,
	overrides: Overrides,
	audit: AuditLog,
	tool_router: ToolRouter<Self>,
}

impl std::fmt::Debug for SnowTools {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SnowTools").field("paths", &self.paths).field("overrides", &self.overrides).finish()
	}
}

#[tool_router]
impl SnowTools {
	/// Tools resolving configuration under `paths`, with `overrides` as the
	/// base for every call.
	pub fn new(paths: StatePaths, overrides: Overrides) -> Self {
		Self {
			audit: AuditLog::new(paths.audit_log.clone()),
			paths,
			overrides,
			tool_router: Self::tool_router(),
		}
	}

	pub fn audit_log(&self) -> &AuditLog {
		&self.audit
	}

	fn config(&self, instance: Option<String>) -> Config {
		Config::load(self.overrides.clone().with_instance(instance), self.paths.clone())
	}

	/// Runs `op`, records the outcome and converts it into a tool result.
	///
	/// Operation failures become error results for the agent to read; they
	/// are never protocol errors.
	async fn audited<Fut>(&self, tool: &'static str, params: Value, op: Fut) -> std::result::Result<CallToolResult, McpError>
	where
		Fut: Future<Output = crate::error::Result<String>>,
	{
		let started = Instant::now();
		let result = op.await;
		let elapsed = started.elapsed();

		let entry = match &result {
			Ok(_) => AuditEntry::new(tool, &params, Outcome::Success),
			Err(err) => AuditEntry::new(tool, &params, Outcome::Error).error(err.to_string()),
		};
		self.audit.record(&entry.duration(elapsed));

		match result {
			Ok(text) => {
				info!(target = "snow", %tool, ms = elapsed.as_millis() as u64, "tool call succeeded");
				Ok(CallToolResult::success(vec![Content::text(text)]))
			}
			Err(err) => {
				warn!(target = "snow", %tool, error = %err, "tool call failed");
				Ok(CallToolResult::error(vec![Content::text(error_text(&err))]))
			}
		}
	}

	#[tool(description = "Log in to a ServiceNow instance and persist the session cookie.")]
	pub async fn snow_login(&self, Parameters(args): Parameters<InstanceArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let config = self.config(args.instance);
		self.audited("snow_login", params, async move { auth::login(&config).await }).await
	}

	#[tool(description = "Elevate privileges to the security_admin role (or another role) on a ServiceNow instance. Requires a prior snow_login.")]
	pub async fn snow_elevate(&self, Parameters(args): Parameters<ElevateArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let ElevateArgs { role, instance } = args;
		let config = self.config(instance);
		let role = role.filter(|r| !r.is_empty()).unwrap_or_else(|| SECURITY_ADMIN_ROLE.to_string());
		self.audited("snow_elevate", params, async move { auth::elevate(&config, &role).await }).await
	}

	#[tool(description = "Execute a JavaScript background script on a ServiceNow instance. Returns the script's printed output; lines the instance reported as errors follow a [stderr] heading.")]
	pub async fn snow_run_script(&self, Parameters(args): Parameters<RunScriptArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let RunScriptArgs { script, instance } = args;
		let config = self.config(instance);
		self.audited("snow_run_script", params, run_script(config, script)).await
	}

	#[tool(description = "Search records in a ServiceNow table through the Table API. Returns the records as a JSON array.")]
	pub async fn snow_search_records(&self, Parameters(args): Parameters<SearchRecordsArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let config = self.config(args.instance.clone());
		self.audited("snow_search_records", params, search_records(config, args)).await
	}

	#[tool(description = "List all fields of a ServiceNow table, including inherited ones. Returns a JSON array of {field, label, type, references}.")]
	pub async fn snow_table_fields(&self, Parameters(args): Parameters<TableFieldsArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let TableFieldsArgs { table, instance } = args;
		let config = self.config(instance);
		self.audited("snow_table_fields", params, table_fields(config, table)).await
	}

	#[tool(description = "Count records in a ServiceNow table matching an optional encoded query.")]
	pub async fn snow_count_records(&self, Parameters(args): Parameters<CountRecordsArgs>) -> std::result::Result<CallToolResult, McpError> {
		let params = params_of(&args);
		let CountRecordsArgs { table, query, instance } = args;
		let config = self.config(instance);
		self.audited("snow_count_records", params, count_records(config, table, query)).await
	}
}

#[tool_handler]
impl ServerHandler for SnowTools {
	fn get_info(&self) -> ServerInfo {
		ServerInfo {
			protocol_version: ProtocolVersion::LATEST,
			capabilities: ServerCapabilities::builder().enable_tools().build(),
			server_info: Implementation::from_build_env(),
			instructions: Some(INSTRUCTIONS.to_string()),
		}
	}
}

async fn run_script(config: Config, script: String) -> crate::error::Result<String> {
	let output = run::execute(&config, &script).await?;
	Ok(if output.is_empty() { "Done.".to_string() } else { output.to_text() })
}

async fn search_records(config: Config, args: SearchRecordsArgs) -> crate::error::Result<String> {
	let query = RecordQuery {
		display_values: records::parse_display_values(args.display_values.as_deref())?,
		order_by: args.order_by.unwrap_or_default(),
		order_by_desc: args.order_by_desc.unwrap_or_default(),
		fields: args.fields,
		limit: args.limit,
		query: args.query,
		page_size: None,
		table: args.table,
	};
	let found = records::search(&config, &query).await?;
	Ok(serde_json::to_string_pretty(&found)?)
}

async fn table_fields(config: Config, table: String) -> crate::error::Result<String> {
	let fields = records::fields(&config, &table).await?;
	Ok(serde_json::to_string_pretty(&fields)?)
}

async fn count_records(config: Config, table: String, query: Option<String>) -> crate::error::Result<String> {
	let count = records::count(&config, &table, query.as_deref()).await?;
	Ok(count.to_string())
}

fn params_of<T: Serialize>(args: &T) -> Value {
	serde_json::to_value(args).unwrap_or(Value::Null)
}

fn error_text(err: &SnowError) -> String {
	match err.hint() {
		Some(hint) => format!("{err}\nHint: {hint}"),
		None => err.to_string(),
	}
}

/// Serves the tools on stdin/stdout until the client disconnects.
pub async fn serve(paths: StatePaths, overrides: Overrides) -> crate::error::Result<()> {
	let tools = SnowTools::new(paths, overrides);
	info!(target = "snow", audit_log = %tools.audit_log().path().display(), "starting MCP server on stdio");

	let service = tools
		.serve(stdio())
		.await
		.map_err(|e| anyhow::anyhow!("failed to start MCP server: {e}"))?;
	service.waiting().await.map_err(|e| anyhow::anyhow!("MCP server stopped: {e}"))?;
	Ok(())
}
