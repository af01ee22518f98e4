//! Code extraction from free-form assistant replies

use once_cell::sync::Lazy;
use regex::Regex;

static TAGGED_FENCE: Lazy<Regex> = Lazy::new(|| fence(r"(?is)```(?:tsx|jsx|typescript|javascript|ts|js)\n(.*?)```"));
static LABELED_FENCE: Lazy<Regex> = Lazy::new(|| fence(r"(?s)```[a-zA-Z]+\n(.*?)```"));
static OPEN_TAGGED_FENCE: Lazy<Regex> = Lazy::new(|| fence(r"(?is)```(?:tsx|jsx|typescript|javascript|ts|js)\n(.*)"));
static LEADING_MARKER: Lazy<Regex> = Lazy::new(|| fence(r"^```[a-zA-Z]*\n?"));
static TRAILING_MARKER: Lazy<Regex> = Lazy::new(|| fence(r"\n?```$"));

#[allow(clippy::expect_used)]
fn fence(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static fence pattern")
}

/// Code and prose split out of a reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    /// Component source, if the reply contained any
    pub code: Option<String>,
    /// Everything that is not code
    pub explanation: String,
}

/// Split a reply into code and explanation
///
/// Prefers a fenced block tagged as TS/JS, then any labeled fence, then a
/// tagged fence that was cut off before its closing marker.
#[must_use]
pub fn extract_code(content: &str) -> Extracted {
    let complete = TAGGED_FENCE
        .captures(content)
        .or_else(|| LABELED_FENCE.captures(content));
    let (code, explanation) = if let Some(caps) = complete {
        let whole = caps.get(0).map_or("", |m| m.as_str());
        let code = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
        (Some(code), content.replacen(whole, "", 1).trim().to_string())
    } else if let Some(caps) = OPEN_TAGGED_FENCE.captures(content) {
        let start = caps.get(0).map_or(0, |m| m.start());
        let code = caps.get(1).map_or("", |m| m.as_str()).trim().to_string();
        (Some(code), content[..start].trim().to_string())
    } else {
        (None, content.trim().to_string())
    };
    Extracted {
        code: code.map(|c| strip_markers(&c)).filter(|c| !c.is_empty()),
        explanation,
    }
}

/// Remove fence markers left at either end of `code`
#[must_use]
pub fn strip_markers(code: &str) -> String {
    let code = LEADING_MARKER.replace(code, "");
    TRAILING_MARKER.replace(&code, "").into_owned()
}
