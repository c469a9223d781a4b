//! User-facing reply formats.

use serde_json::Value;

use crate::registry::DispatchError;

pub const INPUT_NOT_TEXT: &str = "Error: Input must be a string";
pub const EMPTY_INPUT: &str = "Error: Empty input provided";
pub const OFFLINE_UNKNOWN_FUNCTION: &str =
    "I understood the request but could not find a matching function to handle it.";

pub fn blocked(explanation: &str) -> String {
    format!("Operation blocked: {explanation}")
}

pub fn confirmation(explanation: &str) -> String {
    format!("Confirmation required: {explanation} Please confirm if you want to proceed.")
}

pub fn success(function: &str, result: &Value) -> String {
    format!("Function '{function}' executed successfully. Result: {}", render(result))
}

pub fn failure(function: &str, error: &DispatchError) -> String {
    format!("Function '{function}' execution failed. Error: {error}")
}

pub fn chat_failed(error: &dyn std::fmt::Display) -> String {
    format!("Error: LLM processing failed: {error}")
}

pub fn unknown_function(intent: &str, reply: &str) -> String {
    format!("No registered function handles intent '{intent}'. {reply}")
}

/// Strings verbatim, everything else as compact JSON.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_renders_values() {
        assert_eq!(
            success("media_module.adjust_volume", &json!({"level": 5})),
            r#"Function 'media_module.adjust_volume' executed successfully. Result: {"level":5}"#
        );
        assert_eq!(success("f", &json!("done")), "Function 'f' executed successfully. Result: done");
    }

    #[test]
    fn failure_includes_error() {
        let err = DispatchError::FunctionNotFound("x.y".into());
        assert_eq!(failure("x.y", &err), "Function 'x.y' execution failed. Error: Function 'x.y' not found in registry");
    }

    #[test]
    fn confirmation_wording() {
        assert_eq!(
            confirmation("Needs a second look."),
            "Confirmation required: Needs a second look. Please confirm if you want to proceed."
        );
    }
}
