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

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use uuid::Uuid;

pub const SVG_MIME: &str = "image/svg+xml;charset=utf-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn object_url(&self) -> String {
        format!("blob:chartalk/{}", self.0)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub mime: &'static str,
    pub bytes: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl RenderedArtifact {
    pub fn as_svg(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }
}

/// Session-scoped holder for rendered images. Transcript turns keep only the
/// id; a revoked id no longer resolves.
#[derive(Debug, Default)]
pub struct ArtifactStore {
    artifacts: HashMap<ArtifactId, RenderedArtifact>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_svg(&mut self, svg: String) -> ArtifactId {
        let id = ArtifactId::new();
        self.artifacts.insert(
            id,
            RenderedArtifact {
                mime: SVG_MIME,
                bytes: svg.into_bytes(),
                created_at: Utc::now(),
            },
        );
        debug!(artifact = %id, "Stored rendered artifact");
        id
    }

    pub fn get(&self, id: &ArtifactId) -> Option<&RenderedArtifact> {
        self.artifacts.get(id)
    }

    pub fn revoke(&mut self, id: &ArtifactId) -> bool {
        self.artifacts.remove(id).is_some()
    }

    pub fn revoke_all(&mut self) -> usize {
        let count = self.artifacts.len();
        self.artifacts.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_revoke() {
        let mut store = ArtifactStore::new();
        let id = store.insert_svg("<svg></svg>".to_string());
        assert!(id.object_url().starts_with("blob:chartalk/"));
        assert_eq!(store.get(&id).and_then(RenderedArtifact::as_svg), Some("<svg></svg>"));
        assert!(store.revoke(&id));
        assert!(!store.revoke(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn test_data_uri() {
        let mut store = ArtifactStore::new();
        let id = store.insert_svg("<svg/>".to_string());
        let uri = store.get(&id).unwrap().data_uri();
        assert_eq!(uri, "data:image/svg+xml;charset=utf-8;base64,PHN2Zy8+");
    }
}
