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

use crate::backend::ChartBackend;
use crate::dataset::Dataset;
use crate::prompt::PromptBuilder;
use chat_contracts::{BackendResult, QueryRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// `Minimal` sends the bare question; `Templated` sends a prompt that
/// describes the dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    #[default]
    Minimal,
    Templated,
}

#[derive(Clone)]
pub struct QueryDispatcher {
    backend: Arc<dyn ChartBackend>,
    mode: PayloadMode,
    prompt: PromptBuilder,
}

impl QueryDispatcher {
    pub fn new(backend: Arc<dyn ChartBackend>, mode: PayloadMode, prompt: PromptBuilder) -> Self {
        Self {
            backend,
            mode,
            prompt,
        }
    }

    pub fn mode(&self) -> PayloadMode {
        self.mode
    }

    pub fn backend(&self) -> &Arc<dyn ChartBackend> {
        &self.backend
    }

    pub fn build_request(&self, question: &str, dataset: &Dataset) -> QueryRequest {
        match self.mode {
            PayloadMode::Minimal => QueryRequest::question(question),
            PayloadMode::Templated => QueryRequest::prompt(self.prompt.build(question, dataset)),
        }
    }

    pub async fn dispatch(&self, question: &str, dataset: &Dataset) -> BackendResult<String> {
        let request = self.build_request(question, dataset);
        debug!(mode = ?self.mode, backend = self.backend.name(), "Dispatching query");
        let text = self.backend.query(&request).await?;
        info!("Backend answered with {} characters", text.len());
        Ok(text)
    }
}

impl std::fmt::Debug for QueryDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryDispatcher")
            .field("backend", &self.backend.name())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
