//! Flattens the execution service's response into an `ExecutionResult`.
//!
//! The service's JSON is read field by field. Nothing is assumed present and a
//! field of the wrong type counts as missing, so `normalize` is total.

use serde_json::Value;

use super::remote::RawBackendResponse;
use crate::core_types::ExecutionResult;

const ERROR_LABEL: &str = "Error:\n";

pub fn normalize(raw: &RawBackendResponse) -> ExecutionResult {
    // indexing yields Null for a missing or non-object `run`
    let run = &raw.body["run"];

    let standard_output = string_field(run, "stdout");
    let standard_error = string_field(run, "stderr");
    let exit_code = run.get("code").and_then(Value::as_i64).unwrap_or(0);
    let exit_signal = run
        .get("signal")
        .and_then(Value::as_str)
        .map(str::to_string);

    let language_version_used = raw
        .body
        .get("version")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(raw.requested_version.as_str())
        .to_string();

    ExecutionResult {
        combined_output: combine_output(&standard_output, &standard_error),
        standard_output,
        standard_error,
        exit_code,
        exit_signal,
        language_id: raw.language_id.clone(),
        language_version_used,
    }
}

/// Output followed by a labeled error block when stderr is non-empty.
pub fn combine_output(stdout: &str, stderr: &str) -> String {
    if stderr.is_empty() {
        return stdout.to_string();
    }

    let mut combined = String::with_capacity(stdout.len() + stderr.len() + ERROR_LABEL.len() + 1);
    combined.push_str(stdout);
    if !stdout.is_empty() && !stdout.ends_with('\n') {
        combined.push('\n');
    }
    combined.push_str(ERROR_LABEL);
    combined.push_str(stderr);
    combined
}

fn string_field(object: &Value, key: &str) -> String {
    object
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(body: Value) -> RawBackendResponse {
        RawBackendResponse {
            body,
            language_id: "python".to_string(),
            requested_version: "3.10.0".to_string(),
        }
    }

    #[test]
    fn test_hello_world() {
        let result = normalize(&raw(json!({
            "run": { "stdout": "Hello, World!\n", "stderr": "", "code": 0 }
        })));
        assert_eq!(result.standard_output, "Hello, World!\n");
        assert_eq!(result.combined_output, "Hello, World!\n");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.exit_signal, None);
        assert_eq!(result.language_version_used, "3.10.0");
    }

    #[test]
    fn test_stderr_is_appended_as_error_block() {
        let result = normalize(&raw(json!({
            "run": { "stdout": "5\n", "stderr": "NameError: x\n", "code": 1 }
        })));
        assert_eq!(result.combined_output, "5\nError:\nNameError: x\n");
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn test_separator_rules() {
        assert_eq!(combine_output("", "boom"), "Error:\nboom");
        assert_eq!(combine_output("partial", "boom"), "partial\nError:\nboom");
        assert_eq!(combine_output("out", ""), "out");
    }

    #[test]
    fn test_missing_and_mistyped_fields_default() {
        for body in [
            json!({}),
            json!(null),
            json!({ "run": null }),
            json!({ "run": { "stdout": 5, "stderr": ["x"], "code": "1", "signal": 9 } }),
            json!("just a string"),
        ] {
            let result = normalize(&raw(body.clone()));
            assert_eq!(result.standard_output, "", "body {}", body);
            assert_eq!(result.standard_error, "");
            assert_eq!(result.combined_output, "");
            assert_eq!(result.exit_code, 0);
            assert_eq!(result.exit_signal, None);
            assert_eq!(result.language_version_used, "3.10.0");
        }
    }

    #[test]
    fn test_backend_version_and_signal_win() {
        let result = normalize(&raw(json!({
            "language": "python",
            "version": "3.10.0-piston",
            "run": { "stdout": "", "stderr": "", "code": null, "signal": "SIGKILL" }
        })));
        assert_eq!(result.language_version_used, "3.10.0-piston");
        assert_eq!(result.exit_signal.as_deref(), Some("SIGKILL"));
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let input = raw(json!({
            "version": "3.10.0",
            "run": { "stdout": "a\n", "stderr": "b\n", "code": 2, "signal": null }
        }));
        assert_eq!(normalize(&input), normalize(&input));
    }
}
