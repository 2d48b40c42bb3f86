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

//! Wire contracts shared by the chart chat front end and its backend:
//! the `/query` and `/upload-dataset` request shapes, their JSON envelopes,
//! and the transport error taxonomy.

pub mod requests;
pub mod responses;
pub mod types;

pub use requests::{QueryRequest, QUERY_PATH, UPLOAD_FIELD, UPLOAD_PATH};
pub use responses::{parse_query_envelope, parse_upload_envelope, QueryResponse, UploadResponse};
pub use types::{BackendError, BackendResult, STATUS_BODY_LIMIT};
