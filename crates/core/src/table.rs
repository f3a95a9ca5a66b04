//! REST Table API client: record search, field discovery and counts.
//!
//! Table API calls authenticate with basic auth on every request and never
//! touch the UI session's cookie jar.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::actions::Credentials;
use crate::error::{Error, Result};
use crate::session::{DEFAULT_TIMEOUT, instance_url};

/// One Table API row.
pub type Record = serde_json::Map<String, Value>;

/// Rows requested per page when no explicit page size is set.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Which representation of reference and choice fields to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayValues {
	/// Raw stored values.
	Values,
	/// Human-readable display values.
	Display,
	/// `{ value, display_value }` pairs.
	#[default]
	Both,
}

impl DisplayValues {
	/// Value of the `sysparm_display_value` parameter.
	pub fn sysparm(self) -> &'static str {
		match self {
			DisplayValues::Values => "false",
			DisplayValues::Display => "true",
			DisplayValues::Both => "all",
		}
	}
}

impl FromStr for DisplayValues {
	type Err = String;

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"values" => Ok(DisplayValues::Values),
			"display" => Ok(DisplayValues::Display),
			"both" => Ok(DisplayValues::Both),
			_ => Err(format!("Invalid display values mode '{s}'. Use one of: values, display, both.")),
		}
	}
}

impl fmt::Display for DisplayValues {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DisplayValues::Values => write!(f, "values"),
			DisplayValues::Display => write!(f, "display"),
			DisplayValues::Both => write!(f, "both"),
		}
	}
}

/// Parameters of a record search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
	pub table: String,
	/// Encoded query, e.g. `active=true^priority=1`.
	pub query: Option<String>,
	pub order_by: Vec<String>,
	pub order_by_desc: Vec<String>,
	/// Comma separated field list.
	pub fields: Option<String>,
	pub limit: Option<usize>,
	pub display_values: DisplayValues,
	/// Rows per request; [`DEFAULT_PAGE_SIZE`] when unset.
	pub page_size: Option<usize>,
}

impl RecordQuery {
	pub fn new(table: impl Into<String>) -> Self {
		Self {
			table: table.into(),
			..Default::default()
		}
	}

	/// Query string with `ORDERBY`/`ORDERBYDESC` clauses appended.
	pub fn encoded_query(&self) -> String {
		let mut parts: Vec<String> = Vec::new();
		if let Some(query) = self.query.as_deref().filter(|q| !q.is_empty()) {
			parts.push(query.to_string());
		}
		parts.extend(self.order_by.iter().filter(|f| !f.is_empty()).map(|f| format!("ORDERBY{f}")));
		parts.extend(self.order_by_desc.iter().filter(|f| !f.is_empty()).map(|f| format!("ORDERBYDESC{f}")));
		parts.join("^")
	}

	fn page_size(&self) -> usize {
		self.page_size.filter(|n| *n > 0).unwrap_or(DEFAULT_PAGE_SIZE)
	}
}

/// A column of a table, inherited columns included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
	pub field: String,
	pub label: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub references: String,
}

/// Stateless Table API client.
#[derive(Debug, Clone)]
pub struct TableClient {
	base_url: Url,
	credentials: Credentials,
	client: reqwest::Client,
}

impl TableClient {
	pub fn new(instance: &str, credentials: Credentials) -> Result<Self> {
		Self::with_base_url(instance_url(instance)?, credentials)
	}

	pub fn with_base_url(base_url: Url, credentials: Credentials) -> Result<Self> {
		let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build().map_err(Error::Client)?;
		Ok(Self {
			base_url,
			credentials,
			client,
		})
	}

	/// Overrides the request timeout.
	pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
		self.client = reqwest::Client::builder().timeout(timeout).build().map_err(Error::Client)?;
		Ok(self)
	}

	/// Fetches matching records, paging until `limit` or the last page.
	pub async fn search(&self, query: &RecordQuery) -> Result<Vec<Record>> {
		let path = format!("/api/now/table/{}", query.table);
		let encoded = query.encoded_query();
		let page_size = query.page_size();
		let mut records: Vec<Record> = Vec::new();
		if query.limit == Some(0) {
			return Ok(records);
		}

		loop {
			let want = match query.limit {
				Some(limit) => page_size.min(limit - records.len()),
				None => page_size,
			};
			let offset = records.len().to_string();
			let want_param = want.to_string();
			let mut params = vec![
				("sysparm_display_value", query.display_values.sysparm()),
				("sysparm_query", encoded.as_str()),
				("sysparm_limit", want_param.as_str()),
			];
			if let Some(fields) = query.fields.as_deref() {
				params.push(("sysparm_fields", fields));
			}
			if !records.is_empty() {
				params.push(("sysparm_offset", offset.as_str()));
			}

			let payload = self.get_json(&path, &params).await?;
			let page = result_rows(payload);
			let fetched = page.len();
			records.extend(page);
			debug!(target = "snow", table = %query.table, fetched, total = records.len(), "fetched record page");

			let reached_limit = query.limit.is_some_and(|limit| records.len() >= limit);
			if fetched < want || reached_limit {
				break;
			}
		}

		info!(target = "snow", table = %query.table, count = records.len(), "record search complete");
		Ok(records)
	}

	/// Table names from `table` up to the root, most specific first.
	///
	/// Always starts with `table` itself, even when its `sys_db_object` row is
	/// missing or unreadable. Empty only for a blank name.
	pub async fn table_hierarchy(&self, table: &str) -> Result<Vec<String>> {
		let mut hierarchy = Vec::new();
		let mut visited = HashSet::new();
		let mut current = table.trim().to_string();

		while !current.is_empty() && visited.insert(current.clone()) {
			hierarchy.push(current.clone());
			let query = format!("name={current}");
			let params = [
				("sysparm_query", query.as_str()),
				("sysparm_fields", "super_class.name"),
				("sysparm_limit", "1"),
				("sysparm_display_value", "false"),
			];
			let payload = match self.get_json("/api/now/table/sys_db_object", &params).await {
				Ok(payload) => payload,
				Err(Error::Http { .. }) => break,
				Err(err) => return Err(err),
			};
			let Some(row) = result_rows(payload).into_iter().next() else {
				break;
			};
			current = row.get("super_class.name").map(cell_value).unwrap_or_default().trim().to_string();
		}

		Ok(hierarchy)
	}

	/// All fields of `table`, inherited ones included. Definitions on a child
	/// table win over the parent's. Sorted by field name.
	pub async fn table_fields(&self, table: &str) -> Result<Vec<FieldInfo>> {
		let hierarchy = self.table_hierarchy(table).await?;
		if hierarchy.is_empty() {
			return Err(Error::TableNotFound(table.to_string()));
		}

		let query = format!("nameIN{}^elementISNOTEMPTY", hierarchy.join(","));
		let params = [
			("sysparm_query", query.as_str()),
			("sysparm_fields", "element,column_label,internal_type,reference,name"),
			("sysparm_limit", "10000"),
			("sysparm_display_value", "all"),
			("sysparm_no_count", "true"),
		];
		let rows = result_rows(self.get_json("/api/now/table/sys_dictionary", &params).await?);
		Ok(merge_dictionary_rows(&hierarchy, &rows))
	}

	/// Number of rows matching `query`.
	pub async fn count(&self, table: &str, query: Option<&str>) -> Result<u64> {
		let path = format!("/api/now/stats/{table}");
		let params = [("sysparm_count", "true"), ("sysparm_query", query.unwrap_or_default())];
		let payload = self.get_json(&path, &params).await?;
		let count = &payload["result"]["stats"]["count"];
		let parsed = match count {
			Value::String(s) => s.parse::<u64>().ok(),
			Value::Number(n) => n.as_u64(),
			_ => None,
		};
		parsed.ok_or_else(|| Error::http(200, path, &format!("unexpected stats payload: {payload}")))
	}

	async fn get_json(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
		let url = self.base_url.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))?;
		debug!(target = "snow", url = %url, "table api request");
		let response = self
			.client
			.get(url.clone())
			.query(params)
			.header("Accept", "application/json")
			.basic_auth(&self.credentials.user, Some(&self.credentials.password))
			.send()
			.await
			.map_err(|source| Error::Transport {
				url: url.to_string(),
				source,
			})?;
		let status = response.status();
		let body = response.text().await.map_err(|source| Error::Transport {
			url: url.to_string(),
			source,
		})?;
		if !status.is_success() {
			return Err(Error::http(status.as_u16(), url.as_str(), &body));
		}
		Ok(serde_json::from_str(&body)?)
	}
}

/// `result` as a list of rows; a single object becomes a one-row list.
fn result_rows(payload: Value) -> Vec<Record> {
	match payload {
		Value::Object(mut map) => match map.remove("result") {
			Some(Value::Array(items)) => items
				.into_iter()
				.filter_map(|item| match item {
					Value::Object(record) => Some(record),
					_ => None,
				})
				.collect(),
			Some(Value::Object(record)) => vec![record],
			_ => Vec::new(),
		},
		_ => Vec::new(),
	}
}

/// Raw value of a cell that may be a scalar or a `{value, display_value}` pair.
fn cell_value(cell: &Value) -> String {
	match cell {
		Value::Object(map) => map.get("value").and_then(Value::as_str).unwrap_or_default().to_string(),
		Value::String(s) => s.clone(),
		Value::Null => String::new(),
		other => other.to_string(),
	}
}

fn merge_dictionary_rows(hierarchy: &[String], rows: &[Record]) -> Vec<FieldInfo> {
	let priority: HashMap<&str, usize> = hierarchy.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();
	let mut best: HashMap<String, (usize, FieldInfo)> = HashMap::new();

	for row in rows {
		let cell = |key: &str| row.get(key).map(cell_value).unwrap_or_default();
		let field = cell("element");
		if field.is_empty() {
			continue;
		}
		let rank = priority.get(cell("name").as_str()).copied().unwrap_or(hierarchy.len());
		let info = FieldInfo {
			field: field.clone(),
			label: cell("column_label"),
			kind: cell("internal_type"),
			references: cell("reference"),
		};
		match best.get(&field) {
			Some((existing, _)) if *existing <= rank => {}
			_ => {
				best.insert(field, (rank, info));
			}
		}
	}

	let mut fields: Vec<FieldInfo> = best.into_values().map(|(_, info)| info).collect();
	fields.sort_by(|a, b| a.field.cmp(&b.field));
	fields
}
