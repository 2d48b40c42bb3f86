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

//! Turns a candidate specification into a stored SVG artifact.
//!
//! A [`RenderJob`] walks `Idle -> Validating -> Rendering -> Serializing ->
//! Appended`, or stops in `Errored`. The engine contract is two-phase: a view
//! returned by [`ChartEngine::embed`] can only be exported after
//! [`ChartView::run`] completed.

pub mod encoding;
pub mod scale;
pub mod svg;

pub use encoding::{Aggregate, Encoding, FieldType, Mark};
pub use scale::{Scale, ScaleKind};
pub use svg::PlottersEngine;

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::dataset::Dataset;
use crate::error::{ChartalkError, RenderError, RenderResult};
use crate::spec::{BoundSpec, ChartSpec, DataBinding, ValidationPolicy};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait ChartEngine: Send + Sync {
    fn embed(&self, spec: &BoundSpec) -> RenderResult<Box<dyn ChartView>>;

    fn name(&self) -> &'static str;
}

pub trait ChartView: Send {
    fn run(&mut self) -> RenderResult<()>;

    fn to_svg(&self) -> RenderResult<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderPhase {
    Idle,
    Validating,
    Rendering,
    Serializing,
    Appended,
    Errored,
}

impl fmt::Display for RenderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Rendering => "rendering",
            Self::Serializing => "serializing",
            Self::Appended => "appended",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedChart {
    pub artifact: ArtifactId,
    pub description: Option<String>,
}

enum JobState {
    Idle,
    Validating,
    Rendering {
        bound: BoundSpec,
        description: Option<String>,
    },
    Serializing {
        view: Box<dyn ChartView>,
        description: Option<String>,
    },
    Appended(RenderedChart),
    Errored(ChartalkError),
}

impl JobState {
    fn phase(&self) -> RenderPhase {
        match self {
            Self::Idle => RenderPhase::Idle,
            Self::Validating => RenderPhase::Validating,
            Self::Rendering { .. } => RenderPhase::Rendering,
            Self::Serializing { .. } => RenderPhase::Serializing,
            Self::Appended(_) => RenderPhase::Appended,
            Self::Errored(_) => RenderPhase::Errored,
        }
    }
}

/// One candidate segment on its way to the transcript.
pub struct RenderJob<'a> {
    candidate: &'a str,
    dataset: &'a Dataset,
    renderer: &'a ChartRenderer,
    state: JobState,
}

impl<'a> RenderJob<'a> {
    pub fn new(renderer: &'a ChartRenderer, candidate: &'a str, dataset: &'a Dataset) -> Self {
        Self {
            candidate,
            dataset,
            renderer,
            state: JobState::Idle,
        }
    }

    pub fn phase(&self) -> RenderPhase {
        self.state.phase()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase(), RenderPhase::Appended | RenderPhase::Errored)
    }

    /// Advances by one transition. Terminal states do not move.
    pub fn step(&mut self, artifacts: &mut ArtifactStore) -> RenderPhase {
        let state = std::mem::replace(&mut self.state, JobState::Idle);
        self.state = match state {
            JobState::Idle => JobState::Validating,
            JobState::Validating => {
                match ChartSpec::parse(self.candidate, &self.renderer.policy) {
                    Ok(spec) => {
                        let description = spec.description().map(str::to_string);
                        JobState::Rendering {
                            bound: spec.bind(self.dataset, self.renderer.binding),
                            description,
                        }
                    }
                    Err(e) => JobState::Errored(e.into()),
                }
            }
            JobState::Rendering { bound, description } => {
                let rendered = self.renderer.engine.embed(&bound).and_then(|mut view| {
                    view.run()?;
                    Ok(view)
                });
                match rendered {
                    Ok(view) => JobState::Serializing { view, description },
                    Err(e) => JobState::Errored(e.into()),
                }
            }
            JobState::Serializing { view, description } => match view.to_svg() {
                Ok(svg) => JobState::Appended(RenderedChart {
                    artifact: artifacts.insert_svg(svg),
                    description,
                }),
                Err(e) => JobState::Errored(e.into()),
            },
            terminal @ (JobState::Appended(_) | JobState::Errored(_)) => terminal,
        };
        let phase = self.phase();
        debug!(%phase, engine = self.renderer.engine.name(), "Render job advanced");
        phase
    }

    pub fn run(mut self, artifacts: &mut ArtifactStore) -> Result<RenderedChart, ChartalkError> {
        while !self.is_finished() {
            self.step(artifacts);
        }
        match self.state {
            JobState::Appended(chart) => Ok(chart),
            JobState::Errored(e) => {
                warn!("Render job failed: {}", e);
                Err(e)
            }
            _ => Err(RenderError::NotRun.into()),
        }
    }
}

/// Engine plus the validation and binding rules applied to every segment.
#[derive(Clone)]
pub struct ChartRenderer {
    engine: Arc<dyn ChartEngine>,
    policy: ValidationPolicy,
    binding: DataBinding,
}

impl ChartRenderer {
    pub fn new(engine: Arc<dyn ChartEngine>, policy: ValidationPolicy, binding: DataBinding) -> Self {
        Self {
            engine,
            policy,
            binding,
        }
    }

    pub fn job<'a>(&'a self, candidate: &'a str, dataset: &'a Dataset) -> RenderJob<'a> {
        RenderJob::new(self, candidate, dataset)
    }

    pub fn render(
        &self,
        candidate: &str,
        dataset: &Dataset,
        artifacts: &mut ArtifactStore,
    ) -> Result<RenderedChart, ChartalkError> {
        self.job(candidate, dataset).run(artifacts)
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }
}

impl fmt::Debug for ChartRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartRenderer")
            .field("engine", &self.engine.name())
            .field("policy", &self.policy)
            .field("binding", &self.binding)
            .finish()
    }
}
