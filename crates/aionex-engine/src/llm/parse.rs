//! Validation of model output
//!
//! Generation output is held to the schema exactly. Suggestion output is
//! advisory, so anything usable is kept and the rest dropped.

use aionex_core::error::{Error, Result};
use aionex_core::protocol::{AiResponse, SuggestionResult};
use aionex_core::util::truncate;
use serde_json::Value;

pub fn parse_ai_response(text: &str) -> Result<AiResponse> {
    let value: Value = serde_json::from_str(text.trim())
        .map_err(|e| Error::Schema(format!("response is not valid JSON ({})", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| Error::Schema("response is not a JSON object".to_string()))?;

    let field = |name: &str| -> Result<String> {
        match object.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Err(Error::Schema(format!(
                "`{}` must be a string, got {}",
                name,
                truncate(&other.to_string(), 40)
            ))),
            None => Err(Error::Schema(format!("missing `{}`", name))),
        }
    };

    Ok(AiResponse {
        preview_content: field("previewContent")?,
        code_content: field("codeContent")?,
    })
}

pub fn parse_suggestions(text: &str) -> SuggestionResult {
    let value: Value = match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(err) => {
            tracing::debug!("Ignoring unparseable suggestion output: {}", err);
            return SuggestionResult::default();
        }
    };
    let Some(items) = value.get("suggestions").and_then(Value::as_array) else {
        tracing::debug!("Suggestion output has no `suggestions` array");
        return SuggestionResult::default();
    };

    let suggestions = items
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(SuggestionResult::MAX_SUGGESTIONS)
        .map(str::to_string)
        .collect();
    let hint = value
        .get("hint")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    SuggestionResult { suggestions, hint }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_response() {
        let response =
            parse_ai_response(r##"{"previewContent":"# Hi","codeContent":"fn main() {}"}"##).unwrap();
        assert_eq!(response, AiResponse::new("# Hi", "fn main() {}"));
    }

    #[test]
    fn test_missing_field_is_schema_error() {
        assert!(matches!(
            parse_ai_response(r#"{"previewContent":"x"}"#),
            Err(Error::Schema(msg)) if msg.contains("codeContent")
        ));
    }

    #[test]
    fn test_non_string_and_non_json_are_schema_errors() {
        for text in [
            r#"{"previewContent":"x","codeContent":42}"#,
            r#"["previewContent","codeContent"]"#,
            "Sure! Here is your code",
            "```json\n{\"previewContent\":\"x\",\"codeContent\":\"y\"}\n```",
        ] {
            assert!(
                matches!(parse_ai_response(text), Err(Error::Schema(_))),
                "accepted {:?}",
                text
            );
        }
    }

    #[test]
    fn test_suggestions_keep_only_usable_strings() {
        let result = parse_suggestions(
            r#"{"suggestions":["Add tests", 7, "  ", " Add docs ", "Refactor", "Extra"],"hint":""}"#,
        );
        assert_eq!(result.suggestions, vec!["Add tests", "Add docs", "Refactor"]);
        assert_eq!(result.hint, None);
    }

    #[test]
    fn test_suggestions_degrade_to_empty() {
        assert!(parse_suggestions("not json").is_empty());
        assert!(parse_suggestions(r#"{"hint":"x"}"#).is_empty());
        assert_eq!(
            parse_suggestions(r#"{"suggestions":[],"hint":"Try kara"}"#).hint.as_deref(),
            Some("Try kara")
        );
    }
}
