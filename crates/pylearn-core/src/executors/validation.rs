//! Request validation run before any network or interpreter work.

use crate::core_types::{ExecutionRequest, NormalizedRequest, DEFAULT_LANGUAGE, DEFAULT_LANGUAGE_VERSION};
use crate::errors::ExecutionFailure;

/// Rejects blank submissions and fills in the default language pair.
pub fn validate(request: &ExecutionRequest) -> Result<NormalizedRequest, ExecutionFailure> {
    if request.source_text.trim().is_empty() {
        return Err(ExecutionFailure::no_code());
    }

    Ok(NormalizedRequest {
        source_text: request.source_text.clone(),
        standard_input: request.standard_input.clone(),
        language_id: non_blank_or(request.language_id.as_deref(), DEFAULT_LANGUAGE),
        language_version: non_blank_or(request.language_version.as_deref(), DEFAULT_LANGUAGE_VERSION),
    })
}

fn non_blank_or(value: Option<&str>, default: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_sources_are_rejected() {
        for source in ["", " ", "\n\t  \r\n", "\u{3000}"] {
            let result = validate(&ExecutionRequest::new(source));
            assert_eq!(result, Err(ExecutionFailure::no_code()), "source {:?}", source);
        }
    }

    #[test]
    fn test_defaults_language_pair() {
        let normalized = validate(&ExecutionRequest::new("print(1)")).unwrap();
        assert_eq!(normalized.language_id, "python");
        assert_eq!(normalized.language_version, "3.10.0");
        assert_eq!(normalized.standard_input, "");
    }

    #[test]
    fn test_keeps_explicit_language_and_source_verbatim() {
        let request = ExecutionRequest::new("  print(input())\n")
            .with_stdin("42\n")
            .with_language("python", "3.12.0");
        let normalized = validate(&request).unwrap();
        assert_eq!(normalized.source_text, "  print(input())\n");
        assert_eq!(normalized.standard_input, "42\n");
        assert_eq!(normalized.language_version, "3.12.0");
    }

    #[test]
    fn test_blank_language_fields_fall_back() {
        let request = ExecutionRequest::new("print(1)").with_language("", "  ");
        let normalized = validate(&request).unwrap();
        assert_eq!(normalized.language_id, "python");
        assert_eq!(normalized.language_version, "3.10.0");
    }
}
