//! # Text Processing Utilities
//!
//! Formatting of `{name}` templates against context variables, Python-like
//! truthiness for JSON values, human-readable list joining, and masking of
//! values whose keys look sensitive.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Replacement used for masked values.
pub const MASK: &str = "****";

/// Error raised when a template placeholder cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The first path segment is not a known variable.
    #[error("unresolved placeholder '{0}'")]
    Unresolved(String),
    /// The variable exists but the nested path does not.
    #[error("placeholder '{0}' has no value at path '{1}'")]
    MissingPath(String, String),
}

fn placeholder_pattern() -> &'static Regex {
    static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\{\{|\}\}|\{([A-Za-z_][A-Za-z0-9_]*)((?:\.[A-Za-z0-9_]+)*)\}").expect("placeholder pattern compiles")
    });
    &PLACEHOLDER
}

/// Substitutes `{name}` placeholders using `lookup`.
///
/// Supported forms:
/// - `{name}`: the variable's display value (strings unquoted, everything else as JSON)
/// - `{name.field}` / `{name.0}`: nested object keys or array indices
/// - `{{` and `}}`: literal braces
///
/// # Example
/// ```rust
/// use scopeflow_util::format_template;
/// use serde_json::json;
///
/// let rendered = format_template("Hello {user.name}!", |name| (name == "user").then(|| json!({"name": "Ada"})));
/// assert_eq!(rendered.unwrap(), "Hello Ada!");
/// ```
pub fn format_template<F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<Value>,
{
    let mut rendered = String::with_capacity(template.len());
    let mut last_end = 0;

    for captures in placeholder_pattern().captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        rendered.push_str(&template[last_end..whole.start()]);
        last_end = whole.end();

        match whole.as_str() {
            "{{" => rendered.push('{'),
            "}}" => rendered.push('}'),
            _ => {
                let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
                let path = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
                let root = lookup(name).ok_or_else(|| TemplateError::Unresolved(name.to_string()))?;
                let value = select_path(&root, path).ok_or_else(|| TemplateError::MissingPath(name.to_string(), path.trim_start_matches('.').to_string()))?;
                rendered.push_str(&display_value(value));
            }
        }
    }

    rendered.push_str(&template[last_end..]);
    Ok(rendered)
}

fn select_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').filter(|segment| !segment.is_empty()).try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}

/// Renders a value for human-readable output: strings without quotes,
/// everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Coerces a JSON value to a boolean.
///
/// `null`, `false`, zero, and empty strings/arrays/objects are false; every
/// other value is true.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|n| n != 0.0).unwrap_or(true),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Joins items as `a, b and c`.
pub fn human_join<S: AsRef<str>>(items: &[S], conjunction: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.as_ref().to_string(),
        [head @ .., last] => {
            let head: Vec<&str> = head.iter().map(AsRef::as_ref).collect();
            format!("{} {} {}", head.join(", "), conjunction, last.as_ref())
        }
    }
}

/// Returns the masked replacement when `key` contains one of `sensitive_words`
/// (case-insensitive), otherwise the original value.
pub fn mask_sensitive(key: &str, value: &Value, sensitive_words: &[String]) -> Value {
    let lowered = key.to_ascii_lowercase();
    if sensitive_words.iter().any(|word| lowered.contains(word.to_ascii_lowercase().as_str())) {
        Value::String(MASK.to_string())
    } else {
        value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(name: &str) -> Option<Value> {
        match name {
            "title" => Some(json!("Hyperion")),
            "count" => Some(json!(3)),
            "book" => Some(json!({"author": {"name": "Simmons"}, "tags": ["scifi", "classic"]})),
            _ => None,
        }
    }

    #[test]
    fn formats_plain_placeholders() {
        let rendered = format_template("{title} x{count}", vars).expect("rendered");
        assert_eq!(rendered, "Hyperion x3");
    }

    #[test]
    fn formats_nested_paths_and_escapes() {
        let rendered = format_template("{{{book.author.name}}} {book.tags.1}", vars).expect("rendered");
        assert_eq!(rendered, "{Simmons} classic");
    }

    #[test]
    fn reports_unresolved_placeholder() {
        let error = format_template("Missing {nope}", vars).unwrap_err();
        assert_eq!(error, TemplateError::Unresolved("nope".into()));
    }

    #[test]
    fn reports_missing_path() {
        let error = format_template("{book.isbn}", vars).unwrap_err();
        assert_eq!(error, TemplateError::MissingPath("book".into(), "isbn".into()));
    }

    #[test]
    fn leaves_non_placeholder_braces_alone() {
        let rendered = format_template("{ not a var } {1}", vars).expect("rendered");
        assert_eq!(rendered, "{ not a var } {1}");
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!("no")));
        assert!(is_truthy(&json!(0.5)));
        assert!(is_truthy(&json!({"a": 1})));
    }

    #[test]
    fn human_join_handles_lengths() {
        assert_eq!(human_join::<&str>(&[], "and"), "");
        assert_eq!(human_join(&["path"], "and"), "path");
        assert_eq!(human_join(&["a", "b", "c"], "and"), "a, b and c");
    }

    #[test]
    fn masks_sensitive_keys() {
        let words = vec!["token".to_string(), "password".to_string()];
        assert_eq!(mask_sensitive("API_TOKEN", &json!("abc"), &words), json!(MASK));
        assert_eq!(mask_sensitive("user", &json!("ada"), &words), json!("ada"));
    }
}
