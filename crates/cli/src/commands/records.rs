//! Table API commands: `search`, `fields` and `count`.

use std::path::Path;

use snow::{DisplayValues, FieldInfo, Record, RecordQuery};
use tracing::debug;

use crate::cli::SearchArgs;
use crate::config::Config;
use crate::error::{Result, SnowError};
use crate::output::{self, OutputFormat, RenderOptions};

/// Fetches every record matching `query`.
pub async fn search(config: &Config, query: &RecordQuery) -> Result<Vec<Record>> {
	let client = config.table_client()?;
	let records = client.search(query).await?;
	debug!(target = "snow", table = %query.table, count = records.len(), "search finished");
	Ok(records)
}

/// Fields of `table`, inherited ones included.
pub async fn fields(config: &Config, table: &str) -> Result<Vec<FieldInfo>> {
	Ok(config.table_client()?.table_fields(table).await?)
}

pub async fn count(config: &Config, table: &str, query: Option<&str>) -> Result<u64> {
	Ok(config.table_client()?.count(table, query).await?)
}

impl SearchArgs {
	/// `--sys-id` narrows the query to `sys_id` without a header.
	pub fn to_query(&self) -> RecordQuery {
		RecordQuery {
			table: self.table.clone(),
			query: self.query.clone(),
			order_by: self.order_by.clone(),
			order_by_desc: self.order_by_desc.clone(),
			fields: if self.sys_id { Some("sys_id".to_string()) } else { self.fields.clone() },
			limit: self.limit,
			display_values: self.display_values.into(),
			page_size: None,
		}
	}

	pub fn render_options(&self) -> RenderOptions {
		RenderOptions {
			format: self.format,
			display_values: self.display_values.into(),
			no_header: self.no_header || self.sys_id,
			table: self.table.clone(),
		}
	}
}

pub async fn search_command(config: &Config, args: &SearchArgs) -> Result<()> {
	let query = args.to_query();
	let records = search(config, &query).await?;
	let options = args.render_options();

	if records.is_empty() && is_tabular(options.format) {
		println!("No records found.");
		return Ok(());
	}
	let columns = output::selected_fields(query.fields.as_deref(), records.first());
	let text = output::render_records(&records, &columns, &options)?;
	output::write_or_print(&text, args.output.as_deref())
}

pub async fn fields_command(config: &Config, table: &str, format: OutputFormat, path: Option<&Path>) -> Result<()> {
	let fields = fields(config, table).await?;
	if fields.is_empty() {
		println!("No fields found for table '{table}'.");
		return Ok(());
	}
	let text = output::render_fields(&fields, format)?;
	output::write_or_print(&text, path)
}

pub async fn count_command(config: &Config, table: &str, query: Option<&str>) -> Result<()> {
	println!("{}", count(config, table, query).await?);
	Ok(())
}

fn is_tabular(format: OutputFormat) -> bool {
	!matches!(format, OutputFormat::Json | OutputFormat::Xml)
}

/// Display mode named by a tool argument; absent means `both`.
pub fn parse_display_values(value: Option<&str>) -> Result<DisplayValues> {
	match value {
		None | Some("") => Ok(DisplayValues::Both),
		Some(value) => value.parse().map_err(SnowError::InvalidInput),
	}
}
