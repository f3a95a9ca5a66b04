//! snow: ServiceNow session client.
//!
//! Talks to a ServiceNow instance through its web UI: cookie-persisting
//! sessions, security token scraping, background script execution with
//! stdout/stderr recovery, role elevation, and a small REST Table API client.
//!
//! ```ignore
//! use snow::{Credentials, Session, actions};
//!
//! let mut session = Session::new("dev1234.service-now.com", "/tmp/cookies.txt")?;
//! actions::login(&mut session, &Credentials::new("admin", "secret")).await?;
//! let run = actions::run_script(&mut session, "gs.print('hello');").await?;
//! println!("{}", run.output.to_text());
//! ```

pub mod actions;
pub mod cookies;
pub mod demux;
mod error;
pub mod session;
pub mod table;
pub mod token;

pub use actions::{Credentials, SECURITY_ADMIN_ROLE, ScriptRun};
pub use cookies::{Cookie, CookieJar};
pub use demux::{ScriptOutput, demultiplex};
pub use error::{Error, Result};
pub use reqwest::{StatusCode, Url};
pub use session::{RequestBody, RequestOptions, Response, Session, SessionBuilder, instance_url};
pub use table::{DisplayValues, FieldInfo, Record, RecordQuery, TableClient};
pub use token::{MarkupScraper, Token, TokenKind, TokenScraper};
