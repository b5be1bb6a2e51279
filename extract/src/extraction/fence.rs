//! Decoding assistant output into candidate objects.

use serde_json::Value;

/// Sentinel the model writes for attributes it could not resolve yet.
pub const MISSING_MARKER: &str = "%missing%";

const FENCE: &str = "```";

/// One decoded block of assistant output.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateObject {
    /// Block text as written by the model.
    pub raw: String,
    /// Parsed form; `None` when the block is not valid JSON.
    pub parsed: Option<Value>,
    /// Whether the block carries [`MISSING_MARKER`].
    pub partial: bool,
}

impl CandidateObject {
    /// Wraps one block.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            parsed: serde_json::from_str(&raw).ok(),
            partial: raw.contains(MISSING_MARKER),
            raw,
        }
    }

    /// Re-fences the raw text for carrying into the next segment's prompt.
    #[must_use]
    pub fn fenced(&self) -> String {
        format!("{FENCE}\n{}\n{FENCE}\n", self.raw)
    }
}

/// Returns the bodies of all fenced blocks in `text`.
///
/// An info string on the opening fence (```` ```json ````) is dropped and
/// empty blocks are skipped. An unterminated last fence still yields its
/// body. Text without any fence that is itself a JSON object or array is
/// returned as one block.
#[must_use]
pub fn parse_code_fences(text: &str) -> Vec<String> {
    if !text.contains(FENCE) {
        let trimmed = text.trim();
        let looks_json = trimmed.starts_with('{') || trimmed.starts_with('[');
        if looks_json && serde_json::from_str::<Value>(trimmed).is_ok() {
            return vec![trimmed.to_string()];
        }
        return Vec::new();
    }

    text.split(FENCE)
        .skip(1)
        .step_by(2)
        .map(strip_info_string)
        .filter(|body| !body.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn strip_info_string(block: &str) -> &str {
    let (first_line, rest) = block.split_once('\n').unwrap_or((block, ""));
    let info = first_line.trim();
    let is_info = !info.is_empty()
        && info
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.'));
    if is_info { rest.trim() } else { block.trim() }
}

/// Decodes assistant content into candidate objects.
#[must_use]
pub fn decode_candidates(text: &str) -> Vec<CandidateObject> {
    parse_code_fences(text)
        .into_iter()
        .map(CandidateObject::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiple_fences_with_info_strings() {
        let text = "Here you go:\n```json\n{\"id\": 1}\n```\nand\n```\n{\"id\": 2}\n```\nDone.";
        assert_eq!(parse_code_fences(text), vec![r#"{"id": 1}"#, r#"{"id": 2}"#]);
    }

    #[test]
    fn test_empty_fence_means_nothing_found() {
        assert!(parse_code_fences("```\n```").is_empty());
        assert!(parse_code_fences("```json\n\n```").is_empty());
    }

    #[test]
    fn test_unterminated_fence_is_kept() {
        assert_eq!(parse_code_fences("```json\n{\"id\": 1"), vec![r#"{"id": 1"#]);
    }

    #[test]
    fn test_inline_fence_without_newline() {
        assert_eq!(parse_code_fences("```{\"a\": 1}```"), vec![r#"{"a": 1}"#]);
    }

    #[test]
    fn test_bare_json_without_fences() {
        assert_eq!(parse_code_fences("  {\"a\": 1}\n"), vec![r#"{"a": 1}"#]);
        assert!(parse_code_fences("No records found.").is_empty());
        assert!(parse_code_fences("{not json").is_empty());
    }

    #[test]
    fn test_candidate_flags() {
        let partial = CandidateObject::new(r#"{"id": 5, "name": "%missing%"}"#);
        assert!(partial.partial);
        assert!(partial.parsed.is_some());
        assert_eq!(partial.fenced(), "```\n{\"id\": 5, \"name\": \"%missing%\"}\n```\n");

        let broken = CandidateObject::new("{\"id\": ");
        assert!(!broken.partial);
        assert!(broken.parsed.is_none());
    }
}
