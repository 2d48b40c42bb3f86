// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use crate::types::{BackendError, BackendResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Pulls the `response` text out of a `/query` body. The returned text is
/// trimmed; an all-whitespace response counts as empty.
pub fn parse_query_envelope(body: &str) -> BackendResult<QueryResponse> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| BackendError::MalformedEnvelope(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(BackendError::MalformedEnvelope(format!(
            "expected a JSON object, found {}",
            json_kind(&value)
        )));
    };
    match object.get("response") {
        None | Some(Value::Null) => Err(BackendError::MissingResponse),
        Some(Value::String(text)) if text.trim().is_empty() => Err(BackendError::EmptyResponse),
        Some(Value::String(text)) => Ok(QueryResponse {
            response: text.trim().to_string(),
        }),
        Some(other) => Err(BackendError::NonTextResponse {
            found: json_kind(other).to_string(),
        }),
    }
}

/// An empty body or any object without an `error` string is a success.
pub fn parse_upload_envelope(body: &str) -> BackendResult<UploadResponse> {
    if body.trim().is_empty() {
        return Ok(UploadResponse::default());
    }
    let response: UploadResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::MalformedEnvelope(e.to_string()))?;
    match response.error {
        Some(message) => Err(BackendError::Upload(message)),
        None => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_envelope_ok() {
        let parsed = parse_query_envelope(r#"{"response": "  hello  "}"#).unwrap();
        assert_eq!(parsed.response, "hello");
    }

    #[test]
    fn test_query_envelope_missing() {
        assert_eq!(
            parse_query_envelope(r#"{"answer": "x"}"#),
            Err(BackendError::MissingResponse)
        );
    }

    #[test]
    fn test_query_envelope_empty() {
        assert_eq!(
            parse_query_envelope(r#"{"response": "   "}"#),
            Err(BackendError::EmptyResponse)
        );
    }

    #[test]
    fn test_query_envelope_non_text() {
        let err = parse_query_envelope(r#"{"response": {"mark": "bar"}}"#).unwrap_err();
        assert_eq!(
            err,
            BackendError::NonTextResponse {
                found: "object".to_string()
            }
        );
    }

    #[test]
    fn test_query_envelope_malformed() {
        let err = parse_query_envelope("<html>502</html>").unwrap_err();
        assert_eq!(err.label(), "malformed-envelope");
        let err = parse_query_envelope("[1, 2]").unwrap_err();
        assert_eq!(err.label(), "malformed-envelope");
    }

    #[test]
    fn test_upload_envelope() {
        assert!(parse_upload_envelope("").is_ok());
        let ok = parse_upload_envelope(r#"{"filename": "cars.csv"}"#).unwrap();
        assert_eq!(ok.filename.as_deref(), Some("cars.csv"));
        assert_eq!(
            parse_upload_envelope(r#"{"error": "Only CSV files are supported."}"#),
            Err(BackendError::Upload("Only CSV files are supported.".to_string()))
        );
    }
}
