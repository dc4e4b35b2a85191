//! Structured step logging with truncated previews.

use serde::Serialize;
use serde_json::Value;

const PREVIEW_CHARS: usize = 200;
const TRUNCATION_MARKER: &str = "... [truncated]";

/// Emit one pipeline event.
///
/// With `verbose` unset, every string inside `output` longer than 200
/// characters is cut down, however deeply it is nested.
pub fn log_event(event: &str, input: impl Serialize, output: impl Serialize, verbose: bool) {
    let input = serde_json::to_value(input).unwrap_or(Value::Null);
    let output = serde_json::to_value(output).unwrap_or(Value::Null);
    let output = if verbose {
        output
    } else {
        preview(output, PREVIEW_CHARS)
    };

    tracing::info!(event = %event, input = %input, output = %output, "pipeline event");
}

fn preview(value: Value, max_chars: usize) -> Value {
    match value {
        Value::String(s) => match s.char_indices().nth(max_chars) {
            Some((idx, _)) => Value::String(format!("{}{}", &s[..idx], TRUNCATION_MARKER)),
            None => Value::String(s),
        },
        Value::Array(items) => {
            Value::Array(items.into_iter().map(|v| preview(v, max_chars)).collect())
        }
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, preview(v, max_chars)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_preview_truncates_nested_strings() {
        let long = "x".repeat(250);
        let value = json!({"read_webpage_content": [{"content": long, "success": true}], "note": "short"});

        let previewed = preview(value, 200);
        let content = previewed["read_webpage_content"][0]["content"].as_str().unwrap();
        assert_eq!(content.len(), 200 + TRUNCATION_MARKER.len());
        assert!(content.ends_with(TRUNCATION_MARKER));
        assert_eq!(previewed["note"], "short");
        assert_eq!(previewed["read_webpage_content"][0]["success"], true);
    }
}
