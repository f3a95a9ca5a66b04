//! Mock ServiceNow instance and state-directory helpers for CLI tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Form, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{AppendHeaders, Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const USER: &str = "admin";
pub const PASSWORD: &str = "secret";
/// `admin:secret`, base64.
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";
const SESSION_COOKIE: &str = "glide_session_store=sess42";
const LOGIN_TOKEN: &str = "login_tok";
const SCRIPT_TOKEN: &str = "script_tok";
const NAV_TOKEN: &str = "nav_tok";

#[derive(Debug, Default, Clone)]
pub struct Recorded {
	pub scripts: Vec<String>,
	pub elevations: Vec<Value>,
}

type Shared = Arc<Mutex<Recorded>>;

pub struct MockInstance {
	addr: SocketAddr,
	recorded: Shared,
	handle: JoinHandle<()>,
}

impl MockInstance {
	pub async fn start() -> Self {
		let recorded = Shared::default();
		let app = Router::new()
			.route("/login.do", get(login_page).post(login_submit))
			.route("/navpage.do", get(nav_page))
			.route("/sys.scripts.do", get(scripts_page).post(scripts_submit))
			.route("/api/now/ui/impersonate/role", post(impersonate))
			.route("/api/now/table/{table}", get(table))
			.route("/api/now/stats/{table}", get(stats))
			.with_state(recorded.clone());

		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		Self { addr, recorded, handle }
	}

	/// Instance name the client resolves to this server.
	pub fn instance(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn recorded(&self) -> Recorded {
		self.recorded.lock().unwrap().clone()
	}
}

impl Drop for MockInstance {
	fn drop(&mut self) {
		self.handle.abort();
	}
}

fn logged_in(headers: &HeaderMap) -> bool {
	let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).unwrap_or_default();
	cookies.split("; ").any(|c| c == SESSION_COOKIE)
}

fn has_basic_auth(headers: &HeaderMap) -> bool {
	headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(BASIC_AUTH)
}

async fn login_page() -> Html<String> {
	Html(format!(r#"<form><input name="sysparm_ck" type="hidden" value="{LOGIN_TOKEN}"></form>"#))
}

async fn login_submit(Form(form): Form<HashMap<String, String>>) -> Response {
	let accepted = form.get("sysparm_ck").map(String::as_str) == Some(LOGIN_TOKEN)
		&& form.get("user_name").map(String::as_str) == Some(USER)
		&& form.get("user_password").map(String::as_str) == Some(PASSWORD);
	if !accepted {
		return (StatusCode::UNAUTHORIZED, Html("User name or password invalid")).into_response();
	}
	(
		StatusCode::FOUND,
		AppendHeaders([(header::LOCATION, "/navpage.do"), (header::SET_COOKIE, "glide_session_store=sess42; Path=/; HttpOnly")]),
	)
		.into_response()
}

async fn nav_page(headers: HeaderMap) -> Html<String> {
	if logged_in(&headers) {
		Html(format!("<script>var g_ck = '{NAV_TOKEN}';</script>"))
	} else {
		Html("Please log in".to_string())
	}
}

async fn scripts_page(headers: HeaderMap) -> Html<String> {
	if logged_in(&headers) {
		Html(format!(r#"<input name="sysparm_ck" type="hidden" value="{SCRIPT_TOKEN}">"#))
	} else {
		Html("Please log in".to_string())
	}
}

async fn scripts_submit(State(state): State<Shared>, headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
	if !logged_in(&headers) || form.get("sysparm_ck").map(String::as_str) != Some(SCRIPT_TOKEN) {
		return (StatusCode::FORBIDDEN, Html("Security token mismatch")).into_response();
	}
	let script = form.get("script").cloned().unwrap_or_default();
	let body = if script.contains("silent") {
		"<HTML><BODY>Script completed</BODY></HTML>".to_string()
	} else {
		"<HTML><BODY><PRE>*** Script: hello<BR/>Slow evaluation</PRE></BODY></HTML>".to_string()
	};
	state.lock().unwrap().scripts.push(script);
	Html(body).into_response()
}

async fn impersonate(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	let token = headers.get("X-UserToken").and_then(|v| v.to_str().ok());
	if !logged_in(&headers) || token != Some(NAV_TOKEN) {
		return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "User Not Authenticated" }))).into_response();
	}
	state.lock().unwrap().elevations.push(body);
	Json(json!({ "result": {} })).into_response()
}

async fn table(headers: HeaderMap, Path(table): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
	if !has_basic_auth(&headers) {
		return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "User Not Authenticated" }))).into_response();
	}
	let query = params.get("sysparm_query").cloned().unwrap_or_default();
	let result = match table.as_str() {
		"sys_db_object" if query == "name=incident" => json!([{ "super_class.name": "" }]),
		"sys_db_object" => json!([]),
		"sys_dictionary" => json!([{
			"name": { "value": "incident", "display_value": "incident" },
			"element": { "value": "caller_id", "display_value": "caller_id" },
			"column_label": { "value": "Caller", "display_value": "Caller" },
			"internal_type": { "value": "reference", "display_value": "reference" },
			"reference": { "value": "sys_user", "display_value": "sys_user" },
		}]),
		"incident" if query.contains("number=NONE") => json!([]),
		"incident" => json!([
			{
				"sys_id": { "value": "a1", "display_value": "a1" },
				"number": { "value": "INC0000001", "display_value": "INC0000001" },
				"caller_id": { "value": "u1", "display_value": "Abel Tuter" },
			},
			{
				"sys_id": { "value": "b2", "display_value": "b2" },
				"number": { "value": "INC0000002", "display_value": "INC0000002" },
				"caller_id": { "value": "", "display_value": "" },
			}
		]),
		_ => return (StatusCode::NOT_FOUND, Json(json!({ "error": "Invalid table" }))).into_response(),
	};
	Json(json!({ "result": result })).into_response()
}

async fn stats(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> Response {
	if !has_basic_auth(&headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}
	let count = if params.get("sysparm_query").map(String::as_str) == Some("active=true") { 3 } else { 42 };
	Json(json!({ "result": { "stats": { "count": count.to_string() } } })).into_response()
}
