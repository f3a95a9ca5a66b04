//! Persistent cookie jar in the Netscape `cookies.txt` format.
//!
//! The jar is the only authentication state kept between invocations. It is
//! treated as an opaque blob: expired and session cookies are written back
//! verbatim, because the instance rather than the client decides when a
//! session is over.
//!
//! File layout, one cookie per line, tab separated:
//!
//! ```text
//! # Netscape HTTP Cookie File
//! .dev1234.service-now.com	TRUE	/	TRUE	1767225600	glide_user_route	glide.abc
//! #HttpOnly_dev1234.service-now.com	FALSE	/	TRUE		JSESSIONID	8F2C...
//! ```


use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime};
use reqwest::Url;
use tracing::warn;

use crate::error::{Error, Result};

const MAGIC_HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// A single stored cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
	/// Host the cookie belongs to. A leading dot marks a domain cookie.
	pub domain: String,
	/// Whether sub-domains of `domain` receive the cookie.
	pub include_subdomains: bool,
	pub path: String,
	pub secure: bool,
	pub http_only: bool,
	/// Unix timestamp in seconds. `None` for session cookies.
	pub expires: Option<i64>,
	pub name: String,
	pub value: String,
}

impl Cookie {
	/// Host-only cookie scoped to `/`.
	pub fn new(domain: impl Into<String>, name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			domain: domain.into(),
			include_subdomains: false,
			path: "/".to_string(),
			secure: false,
			http_only: false,
			expires: None,
			name: name.into(),
			value: value.into(),
		}
	}

	/// Parses one `Set-Cookie` header received from `url`.
	///
	/// Returns `None` for malformed headers and for cookies whose `Domain`
	/// attribute does not cover the responding host.
	pub fn parse_set_cookie(header: &str, url: &Url, now: i64) -> Option<Cookie> {
		let host = url.host_str()?.to_ascii_lowercase();
		let mut parts = header.split(';');
		let (name, value) = parts.next()?.split_once('=')?;
		let name = name.trim();
		if name.is_empty() {
			return None;
		}

		let mut cookie = Cookie {
			domain: host.clone(),
			include_subdomains: false,
			path: default_path(url.path()),
			secure: false,
			http_only: false,
			expires: None,
			name: name.to_string(),
			value: value.trim().to_string(),
		};
		let mut max_age = None;
		let mut expires = None;

		for attr in parts {
			let (key, val) = match attr.split_once('=') {
				Some((k, v)) => (k.trim(), v.trim()),
				None => (attr.trim(), ""),
			};
			match key.to_ascii_lowercase().as_str() {
				"domain" if !val.is_empty() => {
					let domain = val.trim_start_matches('.').to_ascii_lowercase();
					if host != domain && !host.ends_with(&format!(".{domain}")) {
						return None;
					}
					cookie.domain = format!(".{domain}");
					cookie.include_subdomains = true;
				}
				"path" if val.starts_with('/') => cookie.path = val.to_string(),
				"secure" => cookie.secure = true,
				"httponly" => cookie.http_only = true,
				"max-age" => max_age = val.parse::<i64>().ok(),
				"expires" => expires = parse_http_date(val),
				_ => {}
			}
		}

		cookie.expires = match max_age {
			Some(secs) if secs <= 0 => Some(now - 1),
			Some(secs) => Some(now.saturating_add(secs)),
			None => expires,
		};
		Some(cookie)
	}

	pub fn is_expired(&self, now: i64) -> bool {
		self.expires.is_some_and(|ts| ts <= now)
	}

	pub fn domain_matches(&self, host: &str) -> bool {
		let domain = self.domain.trim_start_matches('.');
		if host.eq_ignore_ascii_case(domain) {
			return true;
		}
		self.include_subdomains && host.len() > domain.len() && host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase()))
	}

	pub fn path_matches(&self, request_path: &str) -> bool {
		if request_path == self.path {
			return true;
		}
		request_path.starts_with(&self.path) && (self.path.ends_with('/') || request_path[self.path.len()..].starts_with('/'))
	}

	/// True when this cookie should be sent with a request to `url`.
	pub fn matches(&self, url: &Url, now: i64) -> bool {
		let Some(host) = url.host_str() else {
			return false;
		};
		if self.secure && url.scheme() != "https" {
			return false;
		}
		!self.is_expired(now) && self.domain_matches(host) && self.path_matches(url.path())
	}

	fn same_key(&self, other: &Cookie) -> bool {
		self.domain == other.domain && self.path == other.path && self.name == other.name
	}

	fn to_line(&self) -> String {
		let prefix = if self.http_only { HTTP_ONLY_PREFIX } else { "" };
		let expires = self.expires.map(|ts| ts.to_string()).unwrap_or_default();
		format!(
			"{prefix}{}\t{}\t{}\t{}\t{expires}\t{}\t{}",
			self.domain,
			bool_field(self.include_subdomains),
			self.path,
			bool_field(self.secure),
			self.name,
			self.value,
		)
	}

	fn from_line(line: &str) -> std::result::Result<Cookie, String> {
		let (line, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
			Some(rest) => (rest, true),
			None => (line, false),
		};
		let fields: Vec<&str> = line.split('\t').collect();
		let [domain, include_subdomains, path, secure, expires, name, value] = fields[..] else {
			return Err(format!("expected 7 tab-separated fields, found {}", fields.len()));
		};
		let expires = match expires.trim() {
			"" => None,
			ts => Some(ts.parse::<i64>().map_err(|_| format!("invalid expiry {ts:?}"))?),
		};
		Ok(Cookie {
			domain: domain.to_string(),
			include_subdomains: include_subdomains == "TRUE",
			path: path.to_string(),
			secure: secure == "TRUE",
			http_only,
			expires,
			name: name.to_string(),
			value: value.to_string(),
		})
	}
}

/// Ordered cookie set keyed by (domain, path, name).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieJar {
	cookies: Vec<Cookie>,
}

impl CookieJar {
	pub fn new() -> Self {
		Self::default()
	}

	/// Loads a jar from disk. A missing file yields an empty jar.
	pub fn load(path: &Path) -> Result<Self> {
		let content = match fs::read_to_string(path) {
			Ok(content) => content,
			Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
			Err(err) => {
				return Err(Error::CookieStoreCorrupt {
					path: path.to_path_buf(),
					reason: err.to_string(),
				});
			}
		};
		Self::parse(&content).map_err(|reason| Error::CookieStoreCorrupt {
			path: path.to_path_buf(),
			reason,
		})
	}

	/// Loads a jar, treating any unreadable or corrupt file as "no session".
	pub fn load_or_empty(path: &Path) -> Self {
		Self::load(path).unwrap_or_else(|err| {
			warn!(target = "snow", error = %err, "ignoring cookie file, starting a fresh session");
			Self::new()
		})
	}

	/// Parses the Netscape text format.
	pub fn parse(content: &str) -> std::result::Result<Self, String> {
		let mut lines = content.lines();
		let header = lines.next().unwrap_or_default();
		if !is_magic_header(header) {
			return Err("missing Netscape cookie file header".to_string());
		}

		let mut jar = Self::new();
		for (idx, raw) in lines.enumerate() {
			let line = raw.trim_end_matches('\r');
			let is_comment = line.starts_with('#') && !line.starts_with(HTTP_ONLY_PREFIX);
			if line.trim().is_empty() || is_comment || line.starts_with('$') {
				continue;
			}
			let cookie = Cookie::from_line(line).map_err(|reason| format!("line {}: {reason}", idx + 2))?;
			jar.insert(cookie);
		}
		Ok(jar)
	}

	/// Writes the jar. The file is owner-only from creation on, and an
	/// existing file is narrowed to 0600.
	pub fn save(&self, path: &Path) -> Result<()> {
		if let Some(parent) = path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}
		let mut options = OpenOptions::new();
		options.write(true).create(true).truncate(true);
		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;
			options.mode(0o600);
		}
		let mut file = options.open(path)?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			file.set_permissions(fs::Permissions::from_mode(0o600))?;
		}
		file.write_all(self.to_netscape_string().as_bytes())?;
		Ok(())
	}

	pub fn to_netscape_string(&self) -> String {
		let mut out = String::from(MAGIC_HEADER);
		out.push_str("\n# This file was generated by snow. Edit at your own risk.\n\n");
		for cookie in &self.cookies {
			out.push_str(&cookie.to_line());
			out.push('\n');
		}
		out
	}

	/// Inserts `cookie`, replacing any cookie with the same key in place.
	pub fn insert(&mut self, cookie: Cookie) {
		match self.cookies.iter_mut().find(|c| c.same_key(&cookie)) {
			Some(existing) => *existing = cookie,
			None => self.cookies.push(cookie),
		}
	}

	pub fn remove(&mut self, domain: &str, path: &str, name: &str) -> Option<Cookie> {
		let idx = self.cookies.iter().position(|c| c.domain == domain && c.path == path && c.name == name)?;
		Some(self.cookies.remove(idx))
	}

	/// Applies a `Set-Cookie` header. A cookie that arrives already expired
	/// deletes the stored cookie with the same key.
	pub fn merge_set_cookie(&mut self, header: &str, url: &Url, now: i64) -> bool {
		let Some(cookie) = Cookie::parse_set_cookie(header, url, now) else {
			return false;
		};
		if cookie.is_expired(now) {
			self.remove(&cookie.domain, &cookie.path, &cookie.name);
		} else {
			self.insert(cookie);
		}
		true
	}

	/// `Cookie` request header value for `url`, longest paths first.
	pub fn header_for(&self, url: &Url, now: i64) -> Option<String> {
		let mut matching: Vec<&Cookie> = self.cookies.iter().filter(|c| c.matches(url, now)).collect();
		if matching.is_empty() {
			return None;
		}
		matching.sort_by(|a, b| b.path.len().cmp(&a.path.len()));
		Some(matching.iter().map(|c| format!("{}={}", c.name, c.value)).collect::<Vec<_>>().join("; "))
	}

	pub fn get(&self, name: &str) -> Option<&Cookie> {
		self.cookies.iter().find(|c| c.name == name)
	}

	pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
		self.cookies.iter()
	}

	pub fn len(&self) -> usize {
		self.cookies.len()
	}

	pub fn is_empty(&self) -> bool {
		self.cookies.is_empty()
	}
}

fn is_magic_header(line: &str) -> bool {
	let line = line.trim();
	line == MAGIC_HEADER || line == "# HTTP Cookie File"
}

fn bool_field(value: bool) -> &'static str {
	if value { "TRUE" } else { "FALSE" }
}

/// Directory of the request path, used when `Set-Cookie` has no `Path`.
fn default_path(request_path: &str) -> String {
	match request_path.rfind('/') {
		Some(0) | None => "/".to_string(),
		Some(idx) => request_path[..idx].to_string(),
	}
}

fn parse_http_date(value: &str) -> Option<i64> {
	if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
		return Some(dt.timestamp());
	}
	["%a, %d-%b-%Y %H:%M:%S GMT", "%a, %d %b %Y %H:%M:%S GMT", "%A, %d-%b-%y %H:%M:%S GMT"]
		.iter()
		.find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
		.map(|dt| dt.and_utc().timestamp())
}
