//! Security token scraping.
//!
//! ServiceNow embeds short-lived anti-CSRF tokens in the pages it serves: a
//! hidden `sysparm_ck` form field on `/login.do` and `/sys.scripts.do`, and an
//! inline `g_ck` script variable on `/navpage.do`. The state-changing request
//! that follows must echo the token back.
//!
//! Extraction lives behind [`TokenScraper`] so a change in page markup only
//! touches one implementation.

use std::fmt;
use std::sync::LazyLock;

use regex_lite::Regex;

/// `sysparm_ck` hidden form field on the login and script pages.
static FORM_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"sysparm_ck[^>]*value="([a-zA-Z0-9_]+)""#).unwrap());
/// `g_ck` variable assigned in an inline script on the navigation page.
static INLINE_VAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"g_ck = '([a-zA-Z0-9_]+)'").unwrap());

/// The action a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
	/// Credential submission on `/login.do`.
	Login,
	/// Background script execution on `/sys.scripts.do`.
	Script,
	/// Role elevation through the impersonation API.
	Elevate,
}

impl TokenKind {
	/// Page the token is scraped from.
	pub fn page(self) -> &'static str {
		match self {
			TokenKind::Login => "/login.do",
			TokenKind::Script => "/sys.scripts.do",
			TokenKind::Elevate => "/navpage.do",
		}
	}

	/// User-facing message for a page that did not carry the token.
	pub fn failure_message(self, instance: &str) -> String {
		match self {
			TokenKind::Login => format!("Could not obtain login token from {instance}"),
			TokenKind::Script => format!("Cannot get security token for {instance}. Try logging in again (snow login)"),
			TokenKind::Elevate => "Could not obtain authentication token to elevate privileges".to_string(),
		}
	}
}

impl fmt::Display for TokenKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TokenKind::Login => write!(f, "login"),
			TokenKind::Script => write!(f, "script"),
			TokenKind::Elevate => write!(f, "elevate"),
		}
	}
}

/// A scraped security token, valid for a single pending action.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	kind: TokenKind,
	value: String,
}

impl Token {
	pub fn new(kind: TokenKind, value: impl Into<String>) -> Self {
		Self { kind, value: value.into() }
	}

	pub fn kind(&self) -> TokenKind {
		self.kind
	}

	pub fn as_str(&self) -> &str {
		&self.value
	}
}

impl fmt::Debug for Token {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Token").field("kind", &self.kind).field("value", &"<redacted>").finish()
	}
}

/// Strategy for pulling tokens out of page content.
///
/// Each method receives the full response body and returns the token value,
/// or `None` when the page does not carry one.
pub trait TokenScraper: Send + Sync {
	fn login_token(&self, html: &str) -> Option<String>;

	fn script_token(&self, html: &str) -> Option<String>;

	fn elevate_token(&self, html: &str) -> Option<String>;

	/// Dispatches to the method for `kind`.
	fn extract(&self, kind: TokenKind, html: &str) -> Option<String> {
		match kind {
			TokenKind::Login => self.login_token(html),
			TokenKind::Script => self.script_token(html),
			TokenKind::Elevate => self.elevate_token(html),
		}
	}
}

/// Matches the markup ServiceNow currently serves.
///
/// Single-pass search returning the first capture; there is no fallback when
/// the page layout changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkupScraper;

impl MarkupScraper {
	fn first_capture(re: &Regex, html: &str) -> Option<String> {
		re.captures(html).and_then(|c| c.get(1)).map(|m| m.as_str().to_string())
	}
}

impl TokenScraper for MarkupScraper {
	fn login_token(&self, html: &str) -> Option<String> {
		Self::first_capture(&FORM_FIELD_RE, html)
	}

	fn script_token(&self, html: &str) -> Option<String> {
		Self::first_capture(&FORM_FIELD_RE, html)
	}

	fn elevate_token(&self, html: &str) -> Option<String> {
		Self::first_capture(&INLINE_VAR_RE, html)
	}
}
