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

//! Append-only chat log. Turns are typed records; HTML and plain text are
//! projections computed on demand.

use crate::artifact::{ArtifactId, ArtifactStore};
use crate::error::ErrorKind;
use chrono::{DateTime, Utc};
use htmlescape::encode_minimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

pub const NO_DESCRIPTION: &str = "No description provided.";
const REVOKED_PLACEHOLDER: &str = "[chart no longer available]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }

    fn speaker(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Bot",
            Self::System => "System",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum TurnContent {
    Text(String),
    Chart {
        artifact: ArtifactId,
        description: Option<String>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: TurnContent,
    pub at: DateTime<Utc>,
}

impl Turn {
    pub fn new(role: Role, content: TurnContent) -> Self {
        Self {
            role,
            content,
            at: Utc::now(),
        }
    }

    pub fn is_chart(&self) -> bool {
        matches!(self.content, TurnContent::Chart { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.content {
            TurnContent::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn to_plain_text(&self) -> String {
        let speaker = self.role.speaker();
        match &self.content {
            TurnContent::Text(text) => format!("{speaker}: {text}"),
            TurnContent::Chart {
                artifact,
                description,
            } => format!(
                "{speaker}: [chart {}]\nDescription: {}",
                artifact.object_url(),
                description.as_deref().unwrap_or(NO_DESCRIPTION)
            ),
            TurnContent::Error { message, .. } => format!("{speaker}: {message}"),
        }
    }

    fn write_html(&self, html: &mut String, artifacts: &ArtifactStore) {
        let role = self.role.as_str();
        let speaker = self.role.speaker();
        match &self.content {
            TurnContent::Text(text) => {
                let _ = write!(
                    html,
                    "<div class=\"turn {role}\"><strong>{speaker}:</strong> {}</div>",
                    encode_minimal(text)
                );
            }
            TurnContent::Chart {
                artifact,
                description,
            } => {
                let body = match artifacts.get(artifact) {
                    Some(rendered) => format!(
                        "<img alt=\"chart\" src=\"{}\"/>",
                        rendered.data_uri()
                    ),
                    None => format!("<em>{REVOKED_PLACEHOLDER}</em>"),
                };
                let _ = write!(
                    html,
                    "<div class=\"turn {role} chart\"><strong>{speaker}:</strong> {body}<p><strong>Description:</strong> {}</p></div>",
                    encode_minimal(description.as_deref().unwrap_or(NO_DESCRIPTION))
                );
            }
            TurnContent::Error { kind, message } => {
                let _ = write!(
                    html,
                    "<div class=\"turn {role} error\" data-kind=\"{}\"><strong>{speaker}:</strong> {}</div>",
                    kind.as_str(),
                    encode_minimal(message)
                );
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) -> &Turn {
        self.turns.push(turn);
        &self.turns[self.turns.len() - 1]
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Turn::new(Role::User, TurnContent::Text(text.into())))
    }

    pub fn push_assistant_text(&mut self, text: impl Into<String>) -> &Turn {
        self.push(Turn::new(Role::Assistant, TurnContent::Text(text.into())))
    }

    pub fn push_chart(&mut self, artifact: ArtifactId, description: Option<String>) -> &Turn {
        self.push(Turn::new(
            Role::Assistant,
            TurnContent::Chart {
                artifact,
                description,
            },
        ))
    }

    pub fn push_error(&mut self, role: Role, kind: ErrorKind, message: impl Into<String>) -> &Turn {
        self.push(Turn::new(
            role,
            TurnContent::Error {
                kind,
                message: message.into(),
            },
        ))
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn since(&self, start: usize) -> &[Turn] {
        self.turns.get(start..).unwrap_or(&[])
    }

    pub fn chart_count(&self) -> usize {
        self.turns.iter().filter(|t| t.is_chart()).count()
    }

    pub fn error_count(&self, kind: ErrorKind) -> usize {
        self.turns
            .iter()
            .filter(|t| t.error_kind() == Some(kind))
            .count()
    }

    pub fn to_plain_text(&self) -> String {
        self.turns
            .iter()
            .map(Turn::to_plain_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_html(&self, artifacts: &ArtifactStore) -> String {
        let mut html = String::from("<div id=\"chat\">\n");
        for turn in &self.turns {
            turn.write_html(&mut html, artifacts);
            html.push('\n');
        }
        html.push_str("</div>");
        html
    }
}
