//! Script output demultiplexing.
//!
//! `/sys.scripts.do` answers with an HTML debug page rather than a machine
//! readable payload. The script's output sits in one or more `<PRE>` blocks
//! where `*** Script: ` opens a stdout segment and `<BR/>` separates the
//! diagnostic lines in between. This module rebuilds the two streams from that
//! page. It is a best-effort reconstruction: ordering within each stream
//! follows the document, interleaving between the streams is not recovered.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::Serialize;

static PRE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<PRE>(.*?)</PRE>").unwrap());
static SEGMENT_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\*\*\* Script: |<BR/>|<br/>").unwrap());

const STDOUT_MARKER: &str = "*** Script:";

/// Output streams recovered from one script run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptOutput {
	pub stdout: Vec<String>,
	pub stderr: Vec<String>,
}

impl ScriptOutput {
	pub fn is_empty(&self) -> bool {
		self.stdout.is_empty() && self.stderr.is_empty()
	}

	/// Both streams as one text block, stderr under a `[stderr]` heading.
	pub fn to_text(&self) -> String {
		let mut parts = Vec::new();
		if !self.stdout.is_empty() {
			parts.push(self.stdout.join("\n"));
		}
		if !self.stderr.is_empty() {
			parts.push(format!("[stderr]\n{}", self.stderr.join("\n")));
		}
		parts.join("\n")
	}
}

/// Splits the HTML returned by the script endpoint into stdout and stderr.
///
/// Never fails: input without `<PRE>` blocks gives empty output, blocks
/// without a `*** Script:` marker are treated as pure stderr.
pub fn demultiplex(html: &str) -> ScriptOutput {
	let mut output = ScriptOutput::default();

	for block in PRE_BLOCK_RE.captures_iter(html).filter_map(|c| c.get(1)) {
		let block = decode_html_entities(block.as_str());
		let has_stdout = block.contains(STDOUT_MARKER);

		for (idx, segment) in SEGMENT_SPLIT_RE.split(&block).enumerate() {
			let segment = segment.trim();
			if segment.is_empty() {
				continue;
			}
			// Positional rule: the segment right after each split is stdout
			// when the block carries script markers.
			if has_stdout && idx % 2 == 1 {
				output.stdout.push(segment.to_string());
			} else {
				output.stderr.push(segment.to_string());
			}
		}
	}

	output
}

/// Decodes character references with the full HTML5 entity table.
///
/// Legacy names without a trailing `;` are expanded and `&#128;`..`&#159;`
/// map through Windows-1252. Unknown names are left untouched.
pub fn decode_html_entities(s: &str) -> String {
	htmlize::unescape(s).into_owned()
}
