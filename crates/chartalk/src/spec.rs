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

use crate::dataset::Dataset;
use crate::error::{SpecError, SpecResult};
use crate::extract::repair_json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

pub const DEFAULT_SCHEMA: &str = "https://vega.github.io/schema/vega-lite/v5.json";
pub const NAMED_DATASET: &str = "dataset";
const REQUIRED_KEYS: [&str; 3] = ["mark", "encoding", "data"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    pub require_description: bool,
}

/// How the live dataset is attached to a parsed specification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBinding {
    #[default]
    Inline,
    Named,
}

/// A validated, not yet bound, chart specification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    body: Map<String, Value>,
}

impl ChartSpec {
    pub fn parse(candidate: &str, policy: &ValidationPolicy) -> SpecResult<Self> {
        let repaired = repair_json(candidate);
        let value: Value = serde_json::from_str(&repaired).map_err(|e| {
            warn!("Chart specification failed to parse: {}", e);
            SpecError::Malformed(e.to_string())
        })?;
        let Value::Object(body) = value else {
            return Err(SpecError::Malformed(
                "specification is not a JSON object".to_string(),
            ));
        };

        let missing: Vec<String> = REQUIRED_KEYS
            .iter()
            .filter(|key| body.get(**key).map_or(true, Value::is_null))
            .map(|key| (*key).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SpecError::Incomplete { missing });
        }

        let spec = Self { body };
        if policy.require_description && spec.description().is_none() {
            return Err(SpecError::MissingDescription);
        }
        debug!(mark = ?spec.mark_type(), "Validated chart specification");
        Ok(spec)
    }

    pub fn description(&self) -> Option<&str> {
        self.body
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    pub fn mark_type(&self) -> Option<&str> {
        mark_type_of(&self.body)
    }

    pub fn as_json(&self) -> &Map<String, Value> {
        &self.body
    }

    pub fn bind(self, dataset: &Dataset, binding: DataBinding) -> BoundSpec {
        let mut body = self.body;
        let rows = Value::Array(dataset.to_json_rows());
        match binding {
            DataBinding::Inline => {
                body.insert("data".to_string(), json!({ "values": rows }));
            }
            DataBinding::Named => {
                body.insert("data".to_string(), json!({ "name": NAMED_DATASET }));
                let datasets = body
                    .entry("datasets")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !datasets.is_object() {
                    *datasets = Value::Object(Map::new());
                }
                if let Value::Object(map) = datasets {
                    map.insert(NAMED_DATASET.to_string(), rows);
                }
            }
        }
        body.entry("$schema")
            .or_insert_with(|| Value::String(DEFAULT_SCHEMA.to_string()));
        debug!(rows = dataset.len(), ?binding, "Bound dataset into specification");
        BoundSpec { body }
    }
}

fn mark_type_of(body: &Map<String, Value>) -> Option<&str> {
    match body.get("mark")? {
        Value::String(s) => Some(s.as_str()),
        Value::Object(m) => m.get("type").and_then(Value::as_str),
        _ => None,
    }
}

/// A specification whose data slot holds the live dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundSpec {
    body: Map<String, Value>,
}

impl BoundSpec {
    pub fn mark_type(&self) -> Option<&str> {
        mark_type_of(&self.body)
    }

    pub fn description(&self) -> Option<&str> {
        self.body
            .get("description")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// Resolves the bound rows whichever binding was used.
    pub fn values(&self) -> Option<&[Value]> {
        let data = self.body.get("data")?;
        if let Some(values) = data.get("values").and_then(Value::as_array) {
            return Some(values);
        }
        let name = data.get("name").and_then(Value::as_str)?;
        self.body
            .get("datasets")?
            .get(name)?
            .as_array()
            .map(Vec::as_slice)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::from_csv_str("cat,val\na,1\nb,2\n", None).unwrap()
    }

    const VALID: &str = r#"{"mark":"bar","encoding":{"x":{"field":"cat"}},"data":{"values":[]}}"#;

    #[test]
    fn test_parse_valid() {
        let spec = ChartSpec::parse(VALID, &ValidationPolicy::default()).unwrap();
        assert_eq!(spec.mark_type(), Some("bar"));
        assert!(spec.description().is_none());
    }

    #[test]
    fn test_malformed_and_non_object() {
        let policy = ValidationPolicy::default();
        assert!(matches!(
            ChartSpec::parse("{mark: bar", &policy),
            Err(SpecError::Malformed(_))
        ));
        assert!(matches!(
            ChartSpec::parse("[1, 2]", &policy),
            Err(SpecError::Malformed(_))
        ));
    }

    #[test]
    fn test_incomplete_lists_every_missing_key() {
        let err = ChartSpec::parse(r#"{"mark":"bar",}"#, &ValidationPolicy::default()).unwrap_err();
        assert_eq!(
            err,
            SpecError::Incomplete {
                missing: vec!["encoding".to_string(), "data".to_string()]
            }
        );
    }

    #[test]
    fn test_description_policy() {
        let strict = ValidationPolicy {
            require_description: true,
        };
        assert_eq!(
            ChartSpec::parse(VALID, &strict).unwrap_err(),
            SpecError::MissingDescription
        );
        let described = r#"{"mark":{"type":"line"},"encoding":{},"data":{},"description":"Trend"}"#;
        let spec = ChartSpec::parse(described, &strict).unwrap();
        assert_eq!(spec.description(), Some("Trend"));
        assert_eq!(spec.mark_type(), Some("line"));
    }

    #[test]
    fn test_inline_binding() {
        let spec = ChartSpec::parse(VALID, &ValidationPolicy::default()).unwrap();
        let bound = spec.bind(&dataset(), DataBinding::Inline);
        assert_eq!(bound.values().unwrap().len(), 2);
        assert_eq!(bound.get("$schema").unwrap(), DEFAULT_SCHEMA);
        assert_eq!(bound.to_json()["data"]["values"][1]["cat"], "b");
    }

    #[test]
    fn test_named_binding_keeps_schema() {
        let text = r#"{"$schema":"custom","mark":"bar","encoding":{},"data":{"url":"x.csv"}}"#;
        let spec = ChartSpec::parse(text, &ValidationPolicy::default()).unwrap();
        let bound = spec.bind(&dataset(), DataBinding::Named);
        let json = bound.to_json();
        assert_eq!(json["data"], json!({ "name": "dataset" }));
        assert_eq!(json["datasets"]["dataset"].as_array().unwrap().len(), 2);
        assert_eq!(json["$schema"], "custom");
        assert_eq!(bound.values().unwrap().len(), 2);
    }
}
