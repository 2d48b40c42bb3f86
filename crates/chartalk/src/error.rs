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

use chat_contracts::BackendError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartalkError {
    #[error("Input error: {0}")]
    Ingest(#[from] IngestError),
    #[error("{0}")]
    Precondition(#[from] PreconditionError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Specification error: {0}")]
    Spec(#[from] SpecError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Please upload a valid CSV file.")]
    NoFile,
    #[error("Please upload a valid CSV file (got media type '{media_type}').")]
    UnsupportedMediaType { media_type: String },
    #[error("The file has no header row")]
    MissingHeader,
    #[error("Failed to parse CSV: {0}")]
    Parse(#[from] csv::Error),
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Please enter a question.")]
    EmptyQuery,
    #[error("Please upload a dataset first.")]
    NoDataset,
    #[error("Your question does not seem to be related to the dataset columns. Please refine your question.")]
    IrrelevantQuery,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("malformed specification: {0}")]
    Malformed(String),
    #[error("incomplete specification: missing {}", missing.join(", "))]
    Incomplete { missing: Vec<String> },
    #[error("missing description")]
    MissingDescription,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Unsupported mark type '{0}'")]
    UnsupportedMark(String),
    #[error("Unsupported aggregate '{0}'")]
    UnsupportedAggregate(String),
    #[error("Field '{field}' referenced by the '{channel}' channel does not exist in the data")]
    UnknownField { channel: String, field: String },
    #[error("Encoding is missing the '{0}' channel")]
    MissingChannel(String),
    #[error("Mark '{mark}' cannot be drawn with this encoding: {reason}")]
    IncompatibleEncoding { mark: String, reason: String },
    #[error("Bound specification has no data values")]
    MissingData,
    #[error("Data on the {0} axis spans a range too wide to draw")]
    UnboundedScale(String),
    #[error("View must run to completion before export")]
    NotRun,
    #[error("Drawing failed: {0}")]
    Draw(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Invalid configuration: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

/// Taxonomy used to tag transcript error turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Precondition,
    Transport,
    Specification,
    Render,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Precondition => "precondition",
            Self::Transport => "transport",
            Self::Specification => "specification",
            Self::Render => "render",
        }
    }
}

impl ChartalkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Ingest(_) | Self::Io(_) | Self::Config(_) => ErrorKind::Input,
            Self::Precondition(_) => ErrorKind::Precondition,
            Self::Backend(_) => ErrorKind::Transport,
            Self::Spec(_) => ErrorKind::Specification,
            Self::Render(_) => ErrorKind::Render,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Ingest(IngestError::NoFile | IngestError::UnsupportedMediaType { .. }) => {
                "Please upload a valid CSV file.".to_string()
            }
            Self::Precondition(e) => e.to_string(),
            Self::Backend(BackendError::Upload(message)) => message.clone(),
            Self::Backend(e) => format!("Error: {e}"),
            Self::Spec(SpecError::Malformed(_)) => {
                "Error parsing the chart specification.".to_string()
            }
            Self::Spec(e) => format!("Invalid chart specification: {e}."),
            Self::Render(e) => format!("Error rendering chart: {e}"),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ChartalkError>;
pub type SpecResult<T> = std::result::Result<T, SpecError>;
pub type RenderResult<T> = std::result::Result<T, RenderError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
