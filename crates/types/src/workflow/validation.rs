//! Type checks applied to required workflow variables.

use serde_json::Value;

use super::ValueType;

/// Validate a resolved value against the declared type.
///
/// The checks mirror JSON's own type system:
/// - `Any` accepts everything, including `null`.
/// - `Integer` accepts numbers that are representable as `i64` or `u64`.
/// - `Number` accepts integers and floats alike.
pub fn check_value_type(value: &Value, expected: ValueType) -> Result<(), String> {
    let matches = match expected {
        ValueType::Any => true,
        ValueType::Null => value.is_null(),
        ValueType::Bool => value.is_boolean(),
        ValueType::Number => value.is_number(),
        ValueType::Integer => value.is_i64() || value.is_u64(),
        ValueType::String => value.is_string(),
        ValueType::Array => value.is_array(),
        ValueType::Object => value.is_object(),
    };

    if matches {
        Ok(())
    } else {
        Err(format!("expected {}, found {}", expected, describe_value(value)))
    }
}

fn describe_value(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(number) if number.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_accepts_null() {
        assert!(check_value_type(&Value::Null, ValueType::Any).is_ok());
    }

    #[test]
    fn integer_rejects_fractional_numbers() {
        assert!(check_value_type(&json!(3), ValueType::Integer).is_ok());
        let error = check_value_type(&json!(3.5), ValueType::Integer).unwrap_err();
        assert_eq!(error, "expected integer, found number");
    }

    #[test]
    fn number_accepts_integers() {
        assert!(check_value_type(&json!(3), ValueType::Number).is_ok());
    }

    #[test]
    fn string_rejects_arrays() {
        let error = check_value_type(&json!(["a"]), ValueType::String).unwrap_err();
        assert_eq!(error, "expected string, found array");
    }
}
