//! Adapts the model's markdown dialect to Slack's `mrkdwn`.

use std::sync::OnceLock;

use regex::Regex;

static LIST_MARKER: OnceLock<Regex> = OnceLock::new();

/// Get the regex for `* ` list markers that follow one or more newlines.
fn list_marker() -> &'static Regex {
    LIST_MARKER.get_or_init(|| Regex::new(r"(\n+\s*)\* ").unwrap())
}

/// Convert one model text part into Slack markdown.
///
/// List markers become `- ` and `**bold**` collapses to Slack's `*bold*`.
pub fn to_slack_markdown(text: &str) -> String {
    list_marker().replace_all(text, "${1}- ").replace("**", "*")
}

// Tests.
