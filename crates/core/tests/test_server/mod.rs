//! In-process stand-in for a ServiceNow instance.
//!
//! Serves the handful of UI pages and REST endpoints the client talks to, and
//! records what it received so tests can assert on the wire traffic.

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
pub const LOGIN_TOKEN: &str = "login_tok_1";
pub const SCRIPT_TOKEN: &str = "script_tok_2";
pub const NAV_TOKEN: &str = "nav_tok_9";
/// `admin:secret`, base64.
const BASIC_AUTH: &str = "Basic YWRtaW46c2VjcmV0";
const SESSION_COOKIE: &str = "glide_session_store=sess42";
pub const INCIDENT_ROWS: usize = 5;

/// Traffic observed by the server.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
	pub login_forms: Vec<HashMap<String, String>>,
	pub scripts: Vec<String>,
	pub elevations: Vec<Value>,
	pub table_queries: Vec<(String, HashMap<String, String>)>,
	pub cookie_headers: Vec<String>,
}

type Shared = Arc<Mutex<Recorded>>;

pub struct TestServer {
	addr: SocketAddr,
	recorded: Shared,
	handle: JoinHandle<()>,
}

impl TestServer {
	pub async fn start() -> Self {
		let recorded = Shared::default();
		let app = Router::new()
			.route("/login.do", get(login_page).post(login_submit))
			.route("/navpage.do", get(nav_page))
			.route("/sys.scripts.do", get(scripts_page).post(scripts_submit))
			.route("/api/now/ui/impersonate/role", post(impersonate))
			.route("/api/now/table/{table}", get(table))
			.route("/api/now/stats/{table}", get(stats))
			.route("/denied", get(denied))
			.route("/hop", get(hop))
			.route("/landing", get(landing))
			.route("/loop", get(redirect_loop))
			.with_state(recorded.clone());

		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let addr = listener.local_addr().unwrap();
		let handle = tokio::spawn(async move {
			axum::serve(listener, app).await.unwrap();
		});
		Self { addr, recorded, handle }
	}

	pub fn url(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn recorded(&self) -> Recorded {
		self.recorded.lock().unwrap().clone()
	}

	pub fn shutdown(self) {
		self.handle.abort();
	}
}

fn record_cookies(state: &Shared, headers: &HeaderMap) -> String {
	let cookies = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
	state.lock().unwrap().cookie_headers.push(cookies.clone());
	cookies
}

fn is_logged_in(cookies: &str) -> bool {
	cookies.split("; ").any(|c| c == SESSION_COOKIE)
}

fn has_basic_auth(headers: &HeaderMap) -> bool {
	headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) == Some(BASIC_AUTH)
}

async fn login_page(State(state): State<Shared>, headers: HeaderMap) -> Response {
	record_cookies(&state, &headers);
	let body = format!(
		r#"<html><body><form action="/login.do" method="post">
<input name="sysparm_ck" id="sysparm_ck" type="hidden" value="{LOGIN_TOKEN}">
<input name="user_name"><input name="user_password" type="password">
</form></body></html>"#
	);
	(AppendHeaders([(header::SET_COOKIE, "JSESSIONID=pre_login; Path=/; HttpOnly")]), Html(body)).into_response()
}

async fn login_submit(State(state): State<Shared>, headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
	record_cookies(&state, &headers);
	let accepted = form.get("sysparm_ck").map(String::as_str) == Some(LOGIN_TOKEN)
		&& form.get("user_name").map(String::as_str) == Some(USER)
		&& form.get("user_password").map(String::as_str) == Some(PASSWORD);
	state.lock().unwrap().login_forms.push(form);

	if !accepted {
		return (StatusCode::UNAUTHORIZED, Html("<html>User name or password invalid</html>")).into_response();
	}
	(
		StatusCode::FOUND,
		AppendHeaders([
			(header::LOCATION, "/navpage.do"),
			(header::SET_COOKIE, "glide_session_store=sess42; Path=/; HttpOnly"),
			(header::SET_COOKIE, "JSESSIONID=post_login; Path=/; HttpOnly"),
		]),
	)
		.into_response()
}

async fn nav_page(State(state): State<Shared>, headers: HeaderMap) -> Html<String> {
	let cookies = record_cookies(&state, &headers);
	if is_logged_in(&cookies) {
		Html(format!("<html><script>var g_ck = '{NAV_TOKEN}';</script><body>Home</body></html>"))
	} else {
		Html("<html><body>Please log in</body></html>".to_string())
	}
}

async fn scripts_page(State(state): State<Shared>, headers: HeaderMap) -> Html<String> {
	let cookies = record_cookies(&state, &headers);
	if is_logged_in(&cookies) {
		Html(format!(
			r#"<html><form method="post"><input name="sysparm_ck" type="hidden" value="{SCRIPT_TOKEN}"><textarea name="script"></textarea></form></html>"#
		))
	} else {
		Html("<html><body>Please log in</body></html>".to_string())
	}
}

async fn scripts_submit(State(state): State<Shared>, headers: HeaderMap, Form(form): Form<HashMap<String, String>>) -> Response {
	let cookies = record_cookies(&state, &headers);
	if !is_logged_in(&cookies) || form.get("sysparm_ck").map(String::as_str) != Some(SCRIPT_TOKEN) {
		return (StatusCode::FORBIDDEN, Html("<html>Security token mismatch</html>")).into_response();
	}
	let script = form.get("script").cloned().unwrap_or_default();
	state.lock().unwrap().scripts.push(script);
	Html(
		"<HTML><BODY>[0:00:00.004] Script completed in scope global: script<HR/>\
		<PRE>*** Script: hello &amp; welcome<BR/>Slow evaluation warning</PRE>\
		<HR/><PRE>*** Script: second<BR/></PRE></BODY></HTML>",
	)
	.into_response()
}

async fn impersonate(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
	let cookies = record_cookies(&state, &headers);
	let token = headers.get("X-UserToken").and_then(|v| v.to_str().ok());
	if !is_logged_in(&cookies) || token != Some(NAV_TOKEN) {
		return (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "message": "User Not Authenticated" } }))).into_response();
	}
	state.lock().unwrap().elevations.push(body);
	Json(json!({ "result": { "roles": ["security_admin"] } })).into_response()
}

async fn table(State(state): State<Shared>, headers: HeaderMap, Path(table): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
	if !has_basic_auth(&headers) {
		return (StatusCode::UNAUTHORIZED, Json(json!({ "error": { "message": "User Not Authenticated" } }))).into_response();
	}
	state.lock().unwrap().table_queries.push((table.clone(), params.clone()));

	let query = params.get("sysparm_query").cloned().unwrap_or_default();
	let result = match table.as_str() {
		"sys_db_object" => match query.as_str() {
			"name=incident" => json!([{ "super_class.name": "task" }]),
			"name=task" => json!([{ "super_class.name": "" }]),
			// Cyclic parents must not loop forever.
			"name=cyc_a" => json!([{ "super_class.name": "cyc_b" }]),
			"name=cyc_b" => json!([{ "super_class.name": "cyc_a" }]),
			_ => json!([]),
		},
		"sys_dictionary" => dictionary_rows(),
		"incident" => incident_page(&params),
		"sys_properties" => json!({ "sys_id": "p1", "name": "glide.single" }),
		_ => {
			return (StatusCode::NOT_FOUND, Json(json!({ "error": { "message": "Invalid table" } }))).into_response();
		}
	};
	Json(json!({ "result": result })).into_response()
}

fn incident_page(params: &HashMap<String, String>) -> Value {
	let offset: usize = params.get("sysparm_offset").and_then(|v| v.parse().ok()).unwrap_or(0);
	let limit: usize = params.get("sysparm_limit").and_then(|v| v.parse().ok()).unwrap_or(INCIDENT_ROWS);
	let rows: Vec<Value> = (offset..INCIDENT_ROWS.min(offset + limit))
		.map(|i| {
			json!({
				"number": { "value": format!("INC{:07}", i + 1), "display_value": format!("INC{:07}", i + 1) },
				"caller_id": { "value": format!("u{i}"), "display_value": format!("User {i}") },
			})
		})
		.collect();
	Value::Array(rows)
}

fn dictionary_rows() -> Value {
	let row = |table: &str, element: &str, label: &str, kind: &str, reference: &str| {
		json!({
			"name": { "value": table, "display_value": table },
			"element": { "value": element, "display_value": element },
			"column_label": { "value": label, "display_value": label },
			"internal_type": { "value": kind, "display_value": kind },
			"reference": { "value": reference, "display_value": reference },
		})
	};
	json!([
		row("task", "number", "Number", "string", ""),
		row("task", "state", "State", "integer", ""),
		row("incident", "state", "Incident state", "integer", ""),
		row("incident", "caller_id", "Caller", "reference", "sys_user"),
	])
}

async fn stats(headers: HeaderMap, Path(table): Path<String>, Query(params): Query<HashMap<String, String>>) -> Response {
	if !has_basic_auth(&headers) {
		return StatusCode::UNAUTHORIZED.into_response();
	}
	let count = match (table.as_str(), params.get("sysparm_query").map(String::as_str)) {
		("incident", Some("active=true")) => "3",
		("incident", _) => "42",
		_ => "0",
	};
	Json(json!({ "result": { "stats": { "count": count } } })).into_response()
}

async fn denied() -> Response {
	(StatusCode::FORBIDDEN, AppendHeaders([(header::SET_COOKIE, "denied_marker=1; Path=/")]), "forbidden").into_response()
}

async fn hop() -> Response {
	(StatusCode::FOUND, AppendHeaders([(header::LOCATION, "/landing"), (header::SET_COOKIE, "hop_cookie=from_redirect; Path=/")])).into_response()
}

async fn landing(State(state): State<Shared>, headers: HeaderMap) -> Response {
	let cookies = record_cookies(&state, &headers);
	(AppendHeaders([(header::SET_COOKIE, "landing_cookie=1; Path=/")]), format!("landed with [{cookies}]")).into_response()
}

async fn redirect_loop() -> Response {
	(StatusCode::FOUND, AppendHeaders([(header::LOCATION, "/loop")])).into_response()
}
