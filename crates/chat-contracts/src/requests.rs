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

use serde::{Deserialize, Serialize};

pub const QUERY_PATH: &str = "/query";
pub const UPLOAD_PATH: &str = "/upload-dataset";
pub const UPLOAD_FIELD: &str = "file";

/// Body of `POST /query`. Serialises to either `{"question": ...}` or
/// `{"prompt": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryRequest {
    Question { question: String },
    Prompt { prompt: String },
}

impl QueryRequest {
    pub fn question(question: impl Into<String>) -> Self {
        Self::Question {
            question: question.into(),
        }
    }

    pub fn prompt(prompt: impl Into<String>) -> Self {
        Self::Prompt {
            prompt: prompt.into(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Question { question } => question,
            Self::Prompt { prompt } => prompt,
        }
    }

    pub fn is_templated(&self) -> bool {
        matches!(self, Self::Prompt { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_question_shape() {
        let value = serde_json::to_value(QueryRequest::question("average price?")).unwrap();
        assert_eq!(value, json!({"question": "average price?"}));
    }

    #[test]
    fn test_prompt_shape() {
        let request = QueryRequest::prompt("Columns: a, b");
        assert!(request.is_templated());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, json!({"prompt": "Columns: a, b"}));
    }

    #[test]
    fn test_untagged_deserialise() {
        let request: QueryRequest = serde_json::from_str(r#"{"question":"hi"}"#).unwrap();
        assert_eq!(request.text(), "hi");
        assert!(!request.is_templated());
    }
}
