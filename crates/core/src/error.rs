//! Error types for the ServiceNow session client.

use std::path::PathBuf;

use thiserror::Error;

use crate::token::TokenKind;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest response body excerpt carried inside [`Error::Http`].
const HTTP_BODY_EXCERPT: usize = 500;

/// Errors that can occur while talking to a ServiceNow instance.
#[derive(Debug, Error)]
pub enum Error {
	/// Network or connection failure. The request never produced a response.
	#[error("request to {url} failed: {source}")]
	Transport {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	/// The HTTP client could not be constructed.
	#[error("failed to build HTTP client: {0}")]
	Client(#[source] reqwest::Error),

	/// The expected security token was absent from the scraped page.
	#[error("{}", kind.failure_message(instance))]
	TokenNotFound { kind: TokenKind, instance: String },

	/// A cookie file exists but could not be parsed.
	///
	/// [`Session`](crate::Session) recovers from this by starting with an empty store.
	#[error("cookie file {} is unreadable: {reason}", path.display())]
	CookieStoreCorrupt { path: PathBuf, reason: String },

	/// The instance answered with an unexpected status code.
	#[error("request to {url} failed with status code {status}\n{body}")]
	Http { status: u16, url: String, body: String },

	/// Table lookup found no `sys_db_object` row.
	#[error("Table '{0}' not found or not accessible.")]
	TableNotFound(String),

	/// The instance name or a redirect target did not form a valid URL.
	#[error("invalid URL: {0}")]
	InvalidUrl(String),

	/// Redirect chain exceeded the hop limit.
	#[error("too many redirects starting at {0}")]
	TooManyRedirects(String),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Builds an [`Error::Http`], keeping only the head of large bodies.
	pub fn http(status: u16, url: impl Into<String>, body: &str) -> Self {
		let body = match body.char_indices().nth(HTTP_BODY_EXCERPT) {
			Some((idx, _)) => format!("{}...", &body[..idx]),
			None => body.to_string(),
		};
		Error::Http {
			status,
			url: url.into(),
			body,
		}
	}

	/// Returns true when re-running `snow login` is the likely fix.
	pub fn suggests_login(&self) -> bool {
		matches!(
			self,
			Error::TokenNotFound {
				kind: TokenKind::Script | TokenKind::Elevate,
				..
			} | Error::Http { status: 401, .. }
		)
	}
}
