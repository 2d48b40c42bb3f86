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

//! Chat with a CSV file: ask a question, get a chart back.
//!
//! A [`ChatSession`] loads a dataset, forwards questions to a
//! [`ChartBackend`], pulls chart specifications out of the free-text reply
//! and renders each one to an SVG artifact shown in the transcript.

pub mod artifact;
pub mod backend;
pub mod config;
pub mod dataset;
pub mod dispatcher;
pub mod error;
pub mod extract;
pub mod preview;
pub mod prompt;
pub mod render;
pub mod session;
pub mod spec;
pub mod transcript;

pub use artifact::{ArtifactId, ArtifactStore, RenderedArtifact};
pub use backend::{ChartBackend, HttpBackend};
pub use config::{ChatConfig, ConfigLoader, FilePickerGuard};
pub use dataset::{ColumnType, Dataset, FileSource, Row, SampleStrategy, Value};
pub use dispatcher::{PayloadMode, QueryDispatcher};
pub use error::{
    ChartalkError, ConfigError, ErrorKind, IngestError, PreconditionError, RenderError, Result,
    SpecError,
};
pub use extract::{extract_segments, Extraction, ExtractionStrategy};
pub use preview::PreviewPanel;
pub use prompt::{FewShotExample, PromptBuilder};
pub use render::{
    ChartEngine, ChartRenderer, ChartView, PlottersEngine, RenderJob, RenderPhase, RenderedChart,
};
pub use session::{BusyListener, ChatSession};
pub use spec::{BoundSpec, ChartSpec, DataBinding, ValidationPolicy};
pub use transcript::{Role, Transcript, Turn, TurnContent};
