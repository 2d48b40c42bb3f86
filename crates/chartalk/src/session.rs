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

//! The chat controller. A [`ChatSession`] owns the dataset, the transcript,
//! the preview and every rendered artifact; all of them change only through
//! its methods.
//!
//! Queries are handled one at a time (`&mut self`), so transcript appends
//! always follow submission order.

use crate::artifact::ArtifactStore;
use crate::backend::ChartBackend;
use crate::config::{ChatConfig, FilePickerGuard};
use crate::dataset::{Dataset, FileSource};
use crate::dispatcher::QueryDispatcher;
use crate::error::{ChartalkError, ErrorKind, IngestError, PreconditionError, Result};
use crate::extract::extract_segments;
use crate::preview::PreviewPanel;
use crate::prompt::PromptBuilder;
use crate::render::{ChartEngine, ChartRenderer, PlottersEngine};
use crate::transcript::{Role, Transcript, Turn};
use htmlescape::encode_minimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Best-effort pre-filter: passes when any column name occurs in the
/// question, ignoring case. Short names such as `id` pass almost anything;
/// paraphrases ("cost" for a `price` column) are rejected.
pub fn mentions_column(question: &str, dataset: &Dataset) -> bool {
    let question = question.to_lowercase();
    dataset
        .columns()
        .iter()
        .any(|column| !column.is_empty() && question.contains(&column.to_lowercase()))
}

/// Called with `true` when a query is dispatched and `false` once it
/// settles, including when the query future is dropped.
pub type BusyListener = Box<dyn Fn(bool) + Send + Sync>;

struct BusyGuard<'a> {
    flag: &'a mut bool,
    listener: Option<&'a BusyListener>,
}

impl<'a> BusyGuard<'a> {
    fn raise(flag: &'a mut bool, listener: Option<&'a BusyListener>) -> Self {
        *flag = true;
        if let Some(notify) = listener {
            notify(true);
        }
        Self { flag, listener }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *self.flag = false;
        if let Some(notify) = self.listener {
            notify(false);
        }
    }
}

pub struct ChatSession {
    config: ChatConfig,
    dataset: Option<Dataset>,
    transcript: Transcript,
    preview: PreviewPanel,
    artifacts: ArtifactStore,
    dispatcher: QueryDispatcher,
    renderer: ChartRenderer,
    picker: FilePickerGuard,
    busy: bool,
    busy_listener: Option<BusyListener>,
    file_error: Option<String>,
    query_error: Option<String>,
    alerts: Vec<String>,
}

impl ChatSession {
    pub fn new(config: ChatConfig, backend: Arc<dyn ChartBackend>) -> Self {
        let engine = Arc::new(PlottersEngine::new(config.render.width, config.render.height));
        Self::with_engine(config, backend, engine)
    }

    pub fn with_engine(
        config: ChatConfig,
        backend: Arc<dyn ChartBackend>,
        engine: Arc<dyn ChartEngine>,
    ) -> Self {
        let mut prompt = PromptBuilder::new()
            .with_sample(config.query.sample)
            .require_description(config.render.require_description)
            .fenced_output(config.query.fenced_output);
        if config.query.few_shot {
            prompt = prompt.with_default_examples();
        }
        let dispatcher = QueryDispatcher::new(backend, config.query.payload, prompt);
        let renderer = ChartRenderer::new(engine, config.render.policy(), config.render.binding);
        let picker = FilePickerGuard::new(Duration::from_millis(config.ingestion.picker_guard_ms));
        debug!(
            backend = dispatcher.backend().name(),
            engine = renderer.engine_name(),
            "Created chat session"
        );
        Self {
            config,
            dataset: None,
            transcript: Transcript::new(),
            preview: PreviewPanel::new(),
            artifacts: ArtifactStore::new(),
            dispatcher,
            renderer,
            picker,
            busy: false,
            busy_listener: None,
            file_error: None,
            query_error: None,
            alerts: Vec::new(),
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn preview(&self) -> &PreviewPanel {
        &self.preview
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn on_busy_change(&mut self, listener: impl Fn(bool) + Send + Sync + 'static) {
        self.busy_listener = Some(Box::new(listener));
    }

    pub fn file_error(&self) -> Option<&str> {
        self.file_error.as_deref()
    }

    pub fn query_error(&self) -> Option<&str> {
        self.query_error.as_deref()
    }

    pub fn take_alerts(&mut self) -> Vec<String> {
        std::mem::take(&mut self.alerts)
    }

    /// False when a picker was opened within the guard window.
    pub fn request_file_picker(&mut self) -> bool {
        self.picker.try_open()
    }

    pub fn toggle_preview(&mut self) -> bool {
        self.preview.toggle()
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        let revoked = self.artifacts.revoke_all();
        debug!(revoked, "Cleared transcript");
    }

    /// Validates, optionally uploads, then parses `file`. On any failure the
    /// current dataset is left untouched and the message is kept in
    /// [`Self::file_error`].
    pub async fn load_file(&mut self, file: Option<FileSource>) -> Result<&Dataset> {
        self.file_error = None;
        match self.ingest(file).await {
            Ok(dataset) => {
                self.preview.refresh(&dataset);
                self.transcript.clear();
                let revoked = self.artifacts.revoke_all();
                info!(
                    "Loaded dataset with {} rows and {} columns",
                    dataset.len(),
                    dataset.columns().len()
                );
                debug!(revoked, "Reset transcript for new dataset");
                Ok(self.dataset.insert(dataset))
            }
            Err(e) => {
                warn!("File rejected: {}", e);
                self.file_error = Some(e.user_message());
                Err(e)
            }
        }
    }

    async fn ingest(&self, file: Option<FileSource>) -> Result<Dataset> {
        let file = file.ok_or(IngestError::NoFile)?;
        if self.config.ingestion.check_media_type && !file.is_csv_like() {
            return Err(IngestError::UnsupportedMediaType {
                media_type: file
                    .media_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            }
            .into());
        }
        if self.config.backend.upload_before_preview {
            self.dispatcher.backend().upload_dataset(&file).await?;
        }
        Ok(Dataset::from_file(&file)?)
    }

    /// Runs one question through the backend and returns the turns it
    /// appended.
    pub async fn submit_query(&mut self, text: &str) -> &[Turn] {
        let start = self.transcript.len();
        self.query_error = None;
        let question = text.trim();
        if question.is_empty() && self.config.query.require_non_empty {
            self.query_error = Some(PreconditionError::EmptyQuery.to_string());
            return self.transcript.since(start);
        }

        self.transcript.push_user(question);
        let gate = match &self.dataset {
            None => Err(PreconditionError::NoDataset),
            Some(dataset)
                if self.config.query.relevance_gate && !mentions_column(question, dataset) =>
            {
                Err(PreconditionError::IrrelevantQuery)
            }
            Some(_) => Ok(()),
        };
        if let Err(e) = gate {
            self.fail(Role::System, &ChartalkError::from(e));
            return self.transcript.since(start);
        }
        let Some(dataset) = self.dataset.as_ref() else {
            return self.transcript.since(start);
        };

        let reply = {
            let _busy = BusyGuard::raise(&mut self.busy, self.busy_listener.as_ref());
            self.dispatcher.dispatch(question, dataset).await
        };

        let reply = match reply {
            Ok(reply) => reply,
            Err(e) => {
                self.fail(Role::System, &ChartalkError::from(e));
                return self.transcript.since(start);
            }
        };

        let extraction = extract_segments(&reply);
        debug!(
            strategy = ?extraction.strategy,
            segments = extraction.segments.len(),
            "Extracted reply"
        );
        if !extraction.prose.is_empty() {
            self.transcript.push_assistant_text(extraction.prose.clone());
        }
        for segment in &extraction.segments {
            let outcome = self.dataset.as_ref().map(|dataset| {
                self.renderer.render(segment, dataset, &mut self.artifacts)
            });
            match outcome {
                Some(Ok(chart)) => {
                    self.transcript.push_chart(chart.artifact, chart.description);
                }
                Some(Err(e)) => self.fail(Role::Assistant, &e),
                None => {}
            }
        }
        self.transcript.since(start)
    }

    fn fail(&mut self, role: Role, error: &ChartalkError) {
        let kind = error.kind();
        let message = error.user_message();
        warn!(kind = kind.as_str(), "{}", error);
        let alert = match kind {
            ErrorKind::Specification => self.config.render.alert_on_spec_error,
            ErrorKind::Input => false,
            ErrorKind::Precondition | ErrorKind::Transport | ErrorKind::Render => true,
        };
        if alert {
            self.alerts.push(message.clone());
        }
        self.transcript.push_error(role, kind, message);
    }

    /// Whole-page projection: upload status, optional preview, transcript.
    pub fn render_page(&self) -> String {
        let mut html = String::from(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\"/>\n<title>chartalk</title>\n\
             <style>body{font-family:sans-serif;max-width:960px;margin:auto}\
             .turn{margin:.5em 0}.error{color:#b00020}img{max-width:100%}\
             table{border-collapse:collapse}td,th{border:1px solid #ccc;padding:2px 6px}</style>\n\
             </head>\n<body>\n",
        );
        match &self.dataset {
            Some(dataset) => html.push_str(&format!(
                "<p id=\"dataset\">Dataset: {} ({} rows)</p>\n",
                encode_minimal(dataset.source_name().unwrap_or("unnamed")),
                dataset.len()
            )),
            None => html.push_str("<p id=\"dataset\">No dataset loaded.</p>\n"),
        }
        if let Some(error) = &self.file_error {
            html.push_str(&format!("<p class=\"error\" id=\"file-error\">{}</p>\n", encode_minimal(error)));
        }
        if self.preview.is_visible() {
            html.push_str("<div id=\"preview\">\n");
            html.push_str(self.preview.html());
            html.push_str("\n</div>\n");
        }
        html.push_str(&self.transcript.to_html(&self.artifacts));
        html.push('\n');
        if let Some(error) = &self.query_error {
            html.push_str(&format!("<p class=\"error\" id=\"query-error\">{}</p>\n", encode_minimal(error)));
        }
        if self.busy {
            html.push_str("<p id=\"busy\">Working...</p>\n");
        }
        html.push_str("</body>\n</html>\n");
        html
    }
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("dataset_rows", &self.dataset.as_ref().map(Dataset::len))
            .field("turns", &self.transcript.len())
            .field("artifacts", &self.artifacts.len())
            .field("busy", &self.busy)
            .finish_non_exhaustive()
    }
}
