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

use crate::dataset::{Dataset, SampleStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt::Write;
use tracing::debug;

const PREAMBLE: &str = "You are a data visualization assistant. Given a dataset and a user's question, \
generate a valid Vega-Lite JSON specification for a chart that answers the question.";

/// A worked example pairing a small schema with the specification that
/// answers its query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FewShotExample {
    pub schema: String,
    pub query: String,
    pub spec: Value,
}

impl FewShotExample {
    pub fn new(schema: impl Into<String>, query: impl Into<String>, spec: Value) -> Self {
        Self {
            schema: schema.into(),
            query: query.into(),
            spec,
        }
    }
}

pub fn default_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample::new(
            "Columns: cylinders (number), horsepower (number), weight (number)",
            "Create a bar chart showing the average horsepower for each number of cylinders.",
            json!({
                "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
                "description": "A bar chart showing the average horsepower for each number of cylinders.",
                "data": {"name": "dataset"},
                "mark": "bar",
                "encoding": {
                    "x": {"field": "cylinders", "type": "ordinal", "axis": {"title": "Number of Cylinders"}},
                    "y": {
                        "field": "horsepower",
                        "aggregate": "mean",
                        "type": "quantitative",
                        "axis": {"title": "Average Horsepower"}
                    }
                }
            }),
        ),
        FewShotExample::new(
            "Columns: horsepower (number), weight (number)",
            "Plot a scatter chart of horsepower versus weight.",
            json!({
                "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
                "description": "A scatter plot showing horsepower versus weight.",
                "data": {"name": "dataset"},
                "mark": "point",
                "encoding": {
                    "x": {"field": "weight", "type": "quantitative", "axis": {"title": "Weight"}},
                    "y": {"field": "horsepower", "type": "quantitative", "axis": {"title": "Horsepower"}}
                }
            }),
        ),
        FewShotExample::new(
            "Columns: category (string), group (string), value (number)",
            "Create a grouped bar chart to compare values across categories and groups.",
            json!({
                "$schema": "https://vega.github.io/schema/vega-lite/v5.json",
                "description": "Values per category, grouped side by side.",
                "data": {"name": "dataset"},
                "mark": "bar",
                "encoding": {
                    "x": {"field": "category"},
                    "y": {"field": "value", "type": "quantitative"},
                    "xOffset": {"field": "group"},
                    "color": {"field": "group"}
                }
            }),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    sample: SampleStrategy,
    require_description: bool,
    fenced_output: bool,
    examples: Vec<FewShotExample>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            sample: SampleStrategy::default(),
            require_description: false,
            fenced_output: false,
            examples: Vec::new(),
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sample(mut self, sample: SampleStrategy) -> Self {
        self.sample = sample;
        self
    }

    pub fn require_description(mut self, required: bool) -> Self {
        self.require_description = required;
        self
    }

    /// Asks for the specification inside a ```` ```json ```` fence instead
    /// of as bare JSON.
    pub fn fenced_output(mut self, fenced: bool) -> Self {
        self.fenced_output = fenced;
        self
    }

    pub fn with_examples(mut self, examples: Vec<FewShotExample>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_default_examples(self) -> Self {
        self.with_examples(default_examples())
    }

    pub fn build(&self, question: &str, dataset: &Dataset) -> String {
        let mut prompt = String::from(PREAMBLE);
        prompt.push_str("\n\n");

        for example in &self.examples {
            let spec = serde_json::to_string_pretty(&example.spec).unwrap_or_default();
            let _ = write!(
                prompt,
                "Schema: {}\nUser Query:\n{}\n\nVega-Lite Spec:\n{spec}\n\n",
                example.schema, example.query
            );
        }

        let columns = dataset.columns().join(", ");
        let types = dataset
            .column_types()
            .iter()
            .map(|(name, kind)| format!("{name}: {}", kind.label()))
            .collect::<Vec<_>>()
            .join(", ");
        let sample: Vec<Value> = dataset
            .sample(self.sample)
            .iter()
            .map(Dataset::row_to_json)
            .collect();
        let sample = serde_json::to_string(&sample).unwrap_or_else(|_| "[]".to_string());

        let _ = write!(
            prompt,
            "The dataset has the following columns: {columns}.\n\
             Column types: {types}.\n\
             Data sample ({} of {} rows): {sample}\n\n\
             User Query:\n{question}\n\n",
            dataset.sample(self.sample).len(),
            dataset.len()
        );

        prompt.push_str(
            "Respond with a single Vega-Lite v5 JSON object. It must contain \"mark\", \
             \"encoding\" and \"data\"; use {\"name\": \"dataset\"} as the data reference and \
             only field names from the column list.",
        );
        if self.require_description {
            prompt.push_str(
                " Include a \"description\" field with one sentence explaining the chart.",
            );
        }
        if self.fenced_output {
            prompt.push_str(" Enclose the JSON in a ```json code block.");
        } else {
            prompt.push_str(" Do not wrap the JSON in code fences.");
        }
        prompt.push_str("\n\nVega-Lite Spec:\n");

        debug!(
            chars = prompt.len(),
            examples = self.examples.len(),
            "Built templated prompt"
        );
        prompt
    }
}
