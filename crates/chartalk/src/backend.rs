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

use crate::dataset::FileSource;
use async_trait::async_trait;
use chat_contracts::{
    parse_query_envelope, parse_upload_envelope, BackendError, BackendResult, QueryRequest,
    UploadResponse, QUERY_PATH, UPLOAD_FIELD, UPLOAD_PATH,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info, warn};

#[async_trait]
pub trait ChartBackend: Send + Sync {
    async fn upload_dataset(&self, file: &FileSource) -> BackendResult<UploadResponse>;

    /// Returns the free text of the `response` field.
    async fn query(&self, request: &QueryRequest) -> BackendResult<String>;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    /// No timeout is applied unless one is given.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> BackendResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(BackendError::Configuration(
                "backend base URL is empty".to_string(),
            ));
        }
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| BackendError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_body(response: Response) -> BackendResult<String> {
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            warn!("Backend returned status {}", status);
            return Err(BackendError::status(status.as_u16(), &body));
        }
        Ok(body)
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Network(e.to_string())
    }
}

#[async_trait]
impl ChartBackend for HttpBackend {
    async fn upload_dataset(&self, file: &FileSource) -> BackendResult<UploadResponse> {
        let mime = file.media_type.as_deref().unwrap_or("text/csv");
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(mime)
            .map_err(|e| BackendError::Configuration(format!("Invalid media type '{mime}': {e}")))?;
        let form = Form::new().part(UPLOAD_FIELD, part);

        debug!(file = %file.name, bytes = file.bytes.len(), "Uploading dataset");
        let response = self
            .client
            .post(self.url(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::read_body(response).await?;
        let uploaded = parse_upload_envelope(&body)?;
        info!("Uploaded dataset {}", file.name);
        Ok(uploaded)
    }

    async fn query(&self, request: &QueryRequest) -> BackendResult<String> {
        debug!(
            templated = request.is_templated(),
            chars = request.text().len(),
            "Sending query"
        );
        let response = self
            .client
            .post(self.url(QUERY_PATH))
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;
        let body = Self::read_body(response).await?;
        let envelope = parse_query_envelope(&body)?;
        Ok(envelope.response)
    }

    fn name(&self) -> &str {
        "http"
    }
}
