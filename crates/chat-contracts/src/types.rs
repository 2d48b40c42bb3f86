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

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum BackendError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Response envelope has no 'response' field")]
    MissingResponse,

    #[error("Backend returned an empty response")]
    EmptyResponse,

    #[error("Response field is not text (found {found})")]
    NonTextResponse { found: String },

    #[error("{0}")]
    Upload(String),

    #[error("Timeout error")]
    Timeout,
}

/// Longest status body carried into an error, in characters.
pub const STATUS_BODY_LIMIT: usize = 200;

impl BackendError {
    /// Non-2xx reply. The body is trimmed and cut to [`STATUS_BODY_LIMIT`]
    /// characters, with `...` marking the cut.
    pub fn status(status: u16, body: &str) -> Self {
        let body = body.trim();
        let body = match body.char_indices().nth(STATUS_BODY_LIMIT) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };
        Self::Status { status, body }
    }

    /// Short stable label used in logs and transcript error turns.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::MalformedEnvelope(_) => "malformed-envelope",
            Self::MissingResponse => "missing-response",
            Self::EmptyResponse => "empty-response",
            Self::NonTextResponse { .. } => "non-text-response",
            Self::Upload(_) => "upload",
            Self::Timeout => "timeout",
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
