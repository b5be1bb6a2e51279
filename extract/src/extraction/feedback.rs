//! Schema validation of candidate objects and the feedback sent back to the
//! model when they fail.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use jsonschema::error::ValidationErrorKind;

use super::error::ExtractionError;

/// Path reported for text that is not JSON at all.
pub const PARSING_PATH: &str = "(parsing)";

/// Path reported for errors on the top-level value.
pub const ROOT_PATH: &str = "(root)";

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Dotted instance path, `(root)`, or `(parsing)`.
    pub path: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Outcome of validating one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// True iff `errors` is empty.
    pub valid: bool,
    /// Every failure found, in validator order.
    pub errors: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationIssue>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// A compiled draft-07 validator for the run's target schema.
pub struct SchemaValidator {
    schema: Value,
    validator: jsonschema::Validator,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl SchemaValidator {
    /// Compiles `schema` with draft-07 semantics.
    ///
    /// # Errors
    /// Returns `ExtractionError::SchemaError` if the schema does not compile.
    pub fn new(schema: Value) -> Result<Self, ExtractionError> {
        let validator = jsonschema::draft7::new(&schema)
            .map_err(|e| ExtractionError::SchemaError(e.to_string()))?;
        Ok(Self { schema, validator })
    }

    /// The uncompiled schema.
    #[must_use]
    pub const fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validates raw candidate text. Text that is not JSON yields a single
    /// `(parsing)` error instead of structural errors.
    #[must_use]
    pub fn validate(&self, raw: &str) -> ValidationResult {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.validate_value(&value),
            Err(e) => ValidationResult::from_errors(vec![ValidationIssue {
                path: PARSING_PATH.to_string(),
                message: format!("Invalid JSON: {e}"),
            }]),
        }
    }

    /// Validates an already-parsed value, collecting every error.
    #[must_use]
    pub fn validate_value(&self, instance: &Value) -> ValidationResult {
        let errors = self
            .validator
            .iter_errors(instance)
            .map(|error| {
                let mut segments = pointer_segments(&error.instance_path.to_string());
                if let ValidationErrorKind::Required { property } = &error.kind {
                    segments.push(property.as_str().map_or_else(|| property.to_string(), ToString::to_string));
                }
                ValidationIssue {
                    path: dotted(&segments),
                    message: error.to_string(),
                }
            })
            .collect();
        ValidationResult::from_errors(errors)
    }
}

/// Compiles `schema` and validates `raw` against it in one step.
///
/// # Errors
/// Returns `ExtractionError::SchemaError` if the schema does not compile.
pub fn validate(schema: &Value, raw: &str) -> Result<ValidationResult, ExtractionError> {
    Ok(SchemaValidator::new(schema.clone())?.validate(raw))
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn dotted(segments: &[String]) -> String {
    if segments.is_empty() {
        ROOT_PATH.to_string()
    } else {
        segments.join(".")
    }
}

/// Builds the user message that asks the model to repair one candidate.
///
/// # Examples
///
/// ```
/// use segex_extract::extraction::feedback::{build_correction_message, SchemaValidator};
/// use serde_json::json;
///
/// let validator = SchemaValidator::new(json!({
///     "type": "object",
///     "properties": {"id": {"type": "integer"}},
///     "required": ["id"]
/// })).unwrap();
/// let result = validator.validate(r#"{"id": "abc"}"#);
///
/// let message = build_correction_message(r#"{"id": "abc"}"#, &result);
/// assert!(message.contains("id: "));
/// assert!(message.contains("Schema check failed"));
/// ```
#[must_use]
pub fn build_correction_message(raw: &str, result: &ValidationResult) -> String {
    let mut feedback = format!("Schema check failed for object:\n```\n{raw}\n```\n\n");

    feedback.push_str("Fix exactly the following errors and keep every other field unchanged:\n");
    for issue in &result.errors {
        feedback.push_str("- ");
        feedback.push_str(&issue.to_string());
        feedback.push('\n');
    }

    feedback.push_str(
        "\nAnswer again in full: the corrected object plus every other object from your \
         previous answer, each as valid JSON in its own code fence.",
    );
    feedback
}

/// Renders a result for the `schema_validation` tool.
#[must_use]
pub fn format_tool_report(result: &ValidationResult) -> String {
    if result.valid {
        return "Validation succeeded! The data conforms to the schema.".to_string();
    }
    let mut report = format!("Validation failed with {} error(s):\n", result.errors.len());
    for (i, issue) in result.errors.iter().enumerate() {
        report.push_str(&format!("{}. At path '{}': {}\n", i + 1, issue.path, issue.message));
    }
    report.trim_end().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "integer", "minimum": 0},
                "address": {
                    "type": "object",
                    "properties": {"city": {"type": "string"}},
                    "required": ["city"]
                },
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["name", "age"]
        })
    }

    #[test]
    fn test_conforming_payload_is_valid() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate(r#"{"name": "Ada", "age": 36}"#);
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_missing_required_field_names_the_field() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate(r#"{"age": 3}"#);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].path.contains("name"));
    }

    #[test]
    fn test_nested_required_and_index_paths() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate(r#"{"name": "A", "age": 1, "address": {}, "tags": ["x", 7]}"#);
        let paths: Vec<&str> = result.errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"address.city"), "{paths:?}");
        assert!(paths.contains(&"tags.1"), "{paths:?}");
    }

    #[test]
    fn test_all_errors_are_enumerated() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate(r#"{"age": -5, "tags": [1]}"#);
        // missing name, minimum violation, wrong item type
        assert_eq!(result.errors.len(), 3, "{:?}", result.errors);
    }

    #[test]
    fn test_root_type_error_path() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate("[1, 2]");
        assert_eq!(result.errors[0].path, ROOT_PATH);
    }

    #[test]
    fn test_malformed_json_is_single_parsing_error() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let result = v.validate(r#"{"name": "A", "age": "#);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].path, PARSING_PATH);
        assert!(result.errors[0].message.starts_with("Invalid JSON"));
    }

    #[test]
    fn test_invalid_schema_is_rejected() {
        let err = SchemaValidator::new(json!({"type": "not-a-type"})).unwrap_err();
        assert!(matches!(err, ExtractionError::SchemaError(_)));
    }

    #[test]
    fn test_correction_message_lists_every_error() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        let raw = r#"{"age": "x"}"#;
        let message = build_correction_message(raw, &v.validate(raw));
        assert!(message.contains(raw));
        assert!(message.contains("- name: "));
        assert!(message.contains("- age: "));
    }

    #[test]
    fn test_tool_report() {
        let v = SchemaValidator::new(person_schema()).unwrap();
        assert!(format_tool_report(&v.validate(r#"{"name":"a","age":1}"#)).starts_with("Validation succeeded"));
        let report = format_tool_report(&v.validate("{}"));
        assert!(report.starts_with("Validation failed with 2 error(s):"));
        assert!(report.contains("1. At path 'name'"));
    }

    #[test]
    fn test_pointer_unescaping() {
        assert_eq!(pointer_segments("/a~1b/0/c~0d"), vec!["a/b", "0", "c~d"]);
        assert!(pointer_segments("").is_empty());
    }
}
