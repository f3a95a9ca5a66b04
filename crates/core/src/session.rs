//! Cookie-persisting HTTP session against one ServiceNow instance.
//!
//! A [`Session`] owns the cookie jar for its instance. Every request that
//! reaches the server, successful or not, merges the returned `Set-Cookie`
//! headers and rewrites the jar on disk before the response is handed back,
//! so a killed process still leaves the latest cookies behind.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{COOKIE, HeaderMap, LOCATION, SET_COOKIE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::token::{MarkupScraper, Token, TokenKind, TokenScraper};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

const USER_AGENT: &str = concat!("snow/", env!("CARGO_PKG_VERSION"));

/// Body of an outgoing request.
#[derive(Clone, Default)]
pub enum RequestBody {
	#[default]
	Empty,
	/// `application/x-www-form-urlencoded` pairs, in order.
	Form(Vec<(String, String)>),
	Json(serde_json::Value),
}

impl RequestBody {
	/// Form body from borrowed pairs.
	pub fn form<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
		RequestBody::Form(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
	}

	fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
		match self {
			RequestBody::Empty => request,
			RequestBody::Form(pairs) => request.form(pairs),
			RequestBody::Json(value) => request.json(value),
		}
	}
}

/// Per-request additions: headers, query parameters, basic auth.
#[derive(Clone, Default)]
pub struct RequestOptions {
	headers: Vec<(String, String)>,
	query: Vec<(String, String)>,
	basic_auth: Option<(String, String)>,
}

impl RequestOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));
		self
	}

	pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
		self.basic_auth = Some((user.into(), password.into()));
		self
	}
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct Response {
	pub status: StatusCode,
	/// Final URL after redirects.
	pub url: Url,
	pub headers: HeaderMap,
	pub body: String,
}

impl Response {
	pub fn is_success(&self) -> bool {
		self.status.is_success()
	}

	pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
		Ok(serde_json::from_str(&self.body)?)
	}

	/// Converts a non-2xx response into [`Error::Http`].
	pub fn error_for_status(self) -> Result<Self> {
		if self.is_success() {
			Ok(self)
		} else {
			Err(Error::http(self.status.as_u16(), self.url.as_str(), &self.body))
		}
	}
}

/// Base URL for an instance name.
///
/// Bare host names get `https://`; names that already carry a scheme are used
/// as given.
pub fn instance_url(instance: &str) -> Result<Url> {
	let raw = if instance.contains("://") {
		instance.to_string()
	} else {
		format!("https://{instance}")
	};
	Url::parse(&raw).map_err(|e| Error::InvalidUrl(format!("{instance}: {e}")))
}

/// Builder for [`Session`].
pub struct SessionBuilder {
	instance: String,
	cookie_path: PathBuf,
	base_url: Option<String>,
	timeout: Duration,
	scraper: Box<dyn TokenScraper>,
}

impl SessionBuilder {
	/// Targets `base_url` instead of `https://{instance}`.
	pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = Some(base_url.into());
		self
	}

	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;
		self
	}

	/// Replaces the token extraction strategy.
	pub fn scraper(mut self, scraper: impl TokenScraper + 'static) -> Self {
		self.scraper = Box::new(scraper);
		self
	}

	pub fn build(self) -> Result<Session> {
		let base_url = match &self.base_url {
			Some(url) => Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?,
			None => instance_url(&self.instance)?,
		};
		// Redirects are followed by hand so intermediate cookies are captured.
		let client = reqwest::Client::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(self.timeout)
			.user_agent(USER_AGENT)
			.build()
			.map_err(Error::Client)?;
		let jar = CookieJar::load_or_empty(&self.cookie_path);
		debug!(target = "snow", instance = %self.instance, cookies = jar.len(), path = %self.cookie_path.display(), "loaded cookie jar");

		Ok(Session {
			instance: self.instance,
			base_url,
			cookie_path: self.cookie_path,
			jar,
			client,
			scraper: self.scraper,
		})
	}
}

/// Authenticated HTTP session for one instance.
pub struct Session {
	instance: String,
	base_url: Url,
	cookie_path: PathBuf,
	jar: CookieJar,
	client: reqwest::Client,
	scraper: Box<dyn TokenScraper>,
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("instance", &self.instance)
			.field("base_url", &self.base_url.as_str())
			.field("cookie_path", &self.cookie_path)
			.field("cookies", &self.jar.len())
			.finish()
	}
}

impl Session {
	/// Session against `https://{instance}` with cookies kept in `cookie_path`.
	pub fn new(instance: impl Into<String>, cookie_path: impl Into<PathBuf>) -> Result<Self> {
		Self::builder(instance, cookie_path).build()
	}

	pub fn builder(instance: impl Into<String>, cookie_path: impl Into<PathBuf>) -> SessionBuilder {
		SessionBuilder {
			instance: instance.into(),
			cookie_path: cookie_path.into(),
			base_url: None,
			timeout: DEFAULT_TIMEOUT,
			scraper: Box::new(MarkupScraper),
		}
	}

	pub fn instance(&self) -> &str {
		&self.instance
	}

	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	pub fn cookie_path(&self) -> &Path {
		&self.cookie_path
	}

	pub fn cookies(&self) -> &CookieJar {
		&self.jar
	}

	pub fn url_for(&self, path: &str) -> Result<Url> {
		self.base_url.join(path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
	}

	pub async fn get(&mut self, path: &str, options: RequestOptions) -> Result<Response> {
		self.send(Method::GET, path, RequestBody::Empty, &options).await
	}

	pub async fn post(&mut self, path: &str, body: RequestBody, options: RequestOptions) -> Result<Response> {
		self.send(Method::POST, path, body, &options).await
	}

	/// `sysparm_ck` from `/login.do`.
	pub async fn login_token(&mut self) -> Result<Token> {
		self.fetch_token(TokenKind::Login).await
	}

	/// `sysparm_ck` from `/sys.scripts.do`.
	pub async fn script_token(&mut self) -> Result<Token> {
		self.fetch_token(TokenKind::Script).await
	}

	/// `g_ck` from `/navpage.do`.
	pub async fn elevate_token(&mut self) -> Result<Token> {
		self.fetch_token(TokenKind::Elevate).await
	}

	async fn fetch_token(&mut self, kind: TokenKind) -> Result<Token> {
		let response = self.get(kind.page(), RequestOptions::new()).await?;
		match self.scraper.extract(kind, &response.body) {
			Some(value) => {
				debug!(target = "snow", %kind, "extracted security token");
				Ok(Token::new(kind, value))
			}
			None => {
				info!(target = "snow", %kind, status = response.status.as_u16(), url = %response.url, "security token not found in page");
				Err(Error::TokenNotFound {
					kind,
					instance: self.instance.clone(),
				})
			}
		}
	}

	async fn send(&mut self, method: Method, path: &str, body: RequestBody, options: &RequestOptions) -> Result<Response> {
		let mut url = self.url_for(path)?;
		if !options.query.is_empty() {
			url.query_pairs_mut().extend_pairs(&options.query);
		}
		let start = url.to_string();
		let mut method = method;
		let mut body = body;

		for _ in 0..=MAX_REDIRECTS {
			let mut request = self.client.request(method.clone(), url.clone());
			for (name, value) in &options.headers {
				request = request.header(name.as_str(), value.as_str());
			}
			// Credentials never follow a redirect to another host.
			if let Some((user, password)) = &options.basic_auth {
				if url.host_str() == self.base_url.host_str() {
					request = request.basic_auth(user, Some(password));
				}
			}
			if let Some(cookie) = self.jar.header_for(&url, chrono::Utc::now().timestamp()) {
				request = request.header(COOKIE, cookie);
			}
			request = body.apply(request);

			debug!(target = "snow", %method, url = %url, "sending request");
			let response = request.send().await.map_err(|source| Error::Transport {
				url: url.to_string(),
				source,
			})?;
			let status = response.status();

			let now = chrono::Utc::now().timestamp();
			for value in response.headers().get_all(SET_COOKIE) {
				if let Ok(header) = value.to_str() {
					self.jar.merge_set_cookie(header, &url, now);
				}
			}
			self.jar.save(&self.cookie_path)?;
			debug!(target = "snow", status = status.as_u16(), cookies = self.jar.len(), "response received, cookie jar saved");

			if status.is_redirection() {
				if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
					url = url.join(location).map_err(|e| Error::InvalidUrl(format!("{location}: {e}")))?;
					if matches!(status, StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER) && method != Method::HEAD {
						method = Method::GET;
						body = RequestBody::Empty;
					}
					continue;
				}
			}

			let headers = response.headers().clone();
			let text = response.text().await.map_err(|source| Error::Transport {
				url: url.to_string(),
				source,
			})?;
			return Ok(Response {
				status,
				url,
				headers,
				body: text,
			});
		}

		Err(Error::TooManyRedirects(start))
	}
}
