//! Record rendering for `search` and `fields`.
//!
//! Every format renders the same selected columns. Reference and choice
//! fields arrive as `{ value, display_value }` pairs and are flattened
//! according to the [`DisplayValues`] mode first.


use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::Value;
use snow::{DisplayValues, FieldInfo, Record};

use crate::error::Result;

static XML_NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());

/// Output format for record listings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
	/// Aligned columns (default)
	#[default]
	Table,
	/// Tab-separated values
	Tsv,
	/// Comma-separated values
	Csv,
	/// Pretty-printed JSON
	Json,
	/// ServiceNow unload document
	Xml,
}

impl std::str::FromStr for OutputFormat {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"table" => Ok(OutputFormat::Table),
			"tsv" => Ok(OutputFormat::Tsv),
			"csv" => Ok(OutputFormat::Csv),
			"json" => Ok(OutputFormat::Json),
			"xml" => Ok(OutputFormat::Xml),
			_ => Err(format!("Invalid format. Use one of: table, tsv, csv, json, xml (got {s})")),
		}
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			OutputFormat::Table => write!(f, "table"),
			OutputFormat::Tsv => write!(f, "tsv"),
			OutputFormat::Csv => write!(f, "csv"),
			OutputFormat::Json => write!(f, "json"),
			OutputFormat::Xml => write!(f, "xml"),
		}
	}
}

/// How a set of records is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
	pub format: OutputFormat,
	pub display_values: DisplayValues,
	pub no_header: bool,
	/// Element name of each record in XML output.
	pub table: String,
}

/// Flattens one cell to text.
pub fn format_field_value(value: Option<&Value>, mode: DisplayValues) -> String {
	match value {
		None | Some(Value::Null) => String::new(),
		Some(Value::Object(pair)) => {
			let display = pair.get("display_value").map(scalar_text).unwrap_or_default();
			let raw = pair.get("value").map(scalar_text).unwrap_or_default();
			match mode {
				DisplayValues::Both if display == raw => display,
				DisplayValues::Both => format!("{display} ({raw})"),
				DisplayValues::Display => display,
				DisplayValues::Values => raw,
			}
		}
		Some(other) => scalar_text(other),
	}
}

fn scalar_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

/// Columns to show: the requested field list, else every key of `sample`.
pub fn selected_fields(fields: Option<&str>, sample: Option<&Record>) -> Vec<String> {
	match fields {
		Some(list) if !list.trim().is_empty() => list.split(',').map(str::trim).filter(|f| !f.is_empty()).map(str::to_string).collect(),
		_ => sample.map(|r| r.keys().cloned().collect()).unwrap_or_default(),
	}
}

/// Renders `records` in the requested format. Empty tabular output is the
/// "No records found." notice.
pub fn render_records(records: &[Record], fields: &[String], options: &RenderOptions) -> Result<String> {
	let text = match options.format {
		OutputFormat::Json => serde_json::to_string_pretty(records)?,
		OutputFormat::Xml => build_xml(records, &options.table, options.display_values, &unload_timestamp()),
		_ if records.is_empty() => "No records found.".to_string(),
		OutputFormat::Table => {
			let rows = cells(records, fields, options.display_values);
			let headers: &[String] = if options.no_header { &[] } else { fields };
			render_table(headers, &rows)
		}
		OutputFormat::Tsv => render_tsv(records, fields, options),
		OutputFormat::Csv => render_csv(records, fields, options)?,
	};
	Ok(text)
}

/// Renders table metadata. Tabular formats use fixed columns.
pub fn render_fields(fields: &[FieldInfo], format: OutputFormat) -> Result<String> {
	if matches!(format, OutputFormat::Json) {
		return Ok(serde_json::to_string_pretty(fields)?);
	}
	let records: Vec<Record> = fields
		.iter()
		.map(|f| match serde_json::to_value(f) {
			Ok(Value::Object(map)) => map,
			_ => Record::new(),
		})
		.collect();
	let columns: Vec<String> = ["field", "label", "type", "references"].iter().map(|c| c.to_string()).collect();
	let options = RenderOptions {
		format,
		display_values: DisplayValues::Values,
		no_header: false,
		table: "sys_dictionary".to_string(),
	};
	render_records(&records, &columns, &options)
}

fn cells(records: &[Record], fields: &[String], mode: DisplayValues) -> Vec<Vec<String>> {
	records.iter().map(|r| fields.iter().map(|f| format_field_value(r.get(f), mode)).collect()).collect()
}

/// Left-aligned columns separated by two spaces, dashed rule under the header.
fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
	let columns = headers.len().max(rows.iter().map(Vec::len).max().unwrap_or(0));
	let mut widths = vec![0usize; columns];
	for row in std::iter::once(headers).chain(rows.iter().map(Vec::as_slice)) {
		for (i, cell) in row.iter().enumerate() {
			widths[i] = widths[i].max(cell.chars().count());
		}
	}

	let line = |row: &[String]| {
		let padded: Vec<String> = widths
			.iter()
			.enumerate()
			.map(|(i, &w)| {
				let cell = row.get(i).map(String::as_str).unwrap_or_default();
				format!("{cell:<w$}")
			})
			.collect();
		padded.join("  ").trim_end().to_string()
	};

	let mut lines = Vec::with_capacity(rows.len() + 2);
	if !headers.is_empty() {
		lines.push(line(headers));
		lines.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("  "));
	}
	lines.extend(rows.iter().map(|row| line(row)));
	lines.join("\n")
}

fn render_tsv(records: &[Record], fields: &[String], options: &RenderOptions) -> String {
	let mut lines = Vec::with_capacity(records.len() + 1);
	if !options.no_header {
		lines.push(fields.join("\t"));
	}
	for row in cells(records, fields, options.display_values) {
		lines.push(row.join("\t"));
	}
	lines.join("\n")
}

/// Minimal quoting and CRLF row endings. The trailing terminator is dropped.
fn render_csv(records: &[Record], fields: &[String], options: &RenderOptions) -> Result<String> {
	let mut writer = csv::WriterBuilder::new()
		.terminator(csv::Terminator::CRLF)
		.quote_style(csv::QuoteStyle::Necessary)
		.from_writer(Vec::new());
	if !options.no_header {
		writer.write_record(fields)?;
	}
	for row in cells(records, fields, options.display_values) {
		writer.write_record(&row)?;
	}
	let bytes = writer.into_inner().map_err(|e| e.into_error())?;
	Ok(String::from_utf8_lossy(&bytes).trim_end_matches(['\r', '\n']).to_string())
}

fn unload_timestamp() -> String {
	chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Builds an unload document importable through the instance's XML import.
///
/// In `both` mode a differing display value is kept as a `display_value`
/// attribute next to the raw value.
pub fn build_xml(records: &[Record], table: &str, mode: DisplayValues, unload_date: &str) -> String {
	let mut parts = vec![
		r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
		format!(r#"<unload unload_date="{unload_date}">"#),
	];
	for record in records {
		parts.push(format!(r#"<{table} action="INSERT_OR_UPDATE">"#));
		for (name, value) in record {
			let name = XML_NAME_RE.replace_all(name, "_");
			let element = match value {
				Value::Object(pair) => {
					let raw = pair.get("value").map(scalar_text).unwrap_or_default();
					let display = pair.get("display_value").map(scalar_text).unwrap_or_default();
					match mode {
						DisplayValues::Display => format!("  <{name}>{}</{name}>", xml_escape(&display)),
						DisplayValues::Both if !display.is_empty() && display != raw => {
							format!(r#"  <{name} display_value="{}">{}</{name}>"#, xml_escape(&display), xml_escape(&raw))
						}
						_ => format!("  <{name}>{}</{name}>", xml_escape(&raw)),
					}
				}
				other => format!("  <{name}>{}</{name}>", xml_escape(&scalar_text(other))),
			};
			parts.push(element);
		}
		parts.push(format!("</{table}>"));
	}
	parts.push("</unload>".to_string());
	parts.join("\n")
}

fn xml_escape(s: &str) -> String {
	let mut out = String::with_capacity(s.len());
	for c in s.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			'\'' => out.push_str("&#x27;"),
			_ => out.push(c),
		}
	}
	out
}

/// Writes `text` to `path` and reports it, or prints it to stdout.
pub fn write_or_print(text: &str, path: Option<&Path>) -> Result<()> {
	match path {
		Some(path) => {
			fs::write(path, text)?;
			println!("Written to {}", path.display());
		}
		None => println!("{text}"),
	}
	Ok(())
}
