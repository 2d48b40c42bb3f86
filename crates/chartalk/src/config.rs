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

use crate::dataset::SampleStrategy;
use crate::dispatcher::PayloadMode;
use crate::error::{ConfigError, ConfigResult};
use crate::spec::{DataBinding, ValidationPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const ENV_PREFIX: &str = "CHARTALK_";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub backend: BackendConfig,
    pub ingestion: IngestionConfig,
    pub query: QueryConfig,
    pub render: RenderConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    /// Unset means requests may wait forever.
    pub timeout_secs: Option<u64>,
    /// Send the file to `/upload-dataset` before previewing it locally.
    pub upload_before_preview: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: None,
            upload_before_preview: false,
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    pub check_media_type: bool,
    pub picker_guard_ms: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            check_media_type: true,
            picker_guard_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub payload: PayloadMode,
    pub sample: SampleStrategy,
    pub few_shot: bool,
    pub fenced_output: bool,
    pub relevance_gate: bool,
    pub require_non_empty: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            payload: PayloadMode::Minimal,
            sample: SampleStrategy::default(),
            few_shot: false,
            fenced_output: false,
            relevance_gate: false,
            require_non_empty: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub require_description: bool,
    pub binding: DataBinding,
    pub width: u32,
    pub height: u32,
    pub alert_on_spec_error: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            require_description: false,
            binding: DataBinding::Inline,
            width: 640,
            height: 400,
            alert_on_spec_error: false,
        }
    }
}

impl RenderConfig {
    pub fn policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            require_description: self.require_description,
        }
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

impl ChatConfig {
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let url = &self.backend.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("backend.base_url", url));
        }
        if self.backend.timeout_secs == Some(0) {
            return Err(invalid("backend.timeout_secs", 0));
        }
        match self.query.sample {
            SampleStrategy::FirstRows(0) => return Err(invalid("query.sample", "first_rows 0")),
            SampleStrategy::LeadingFraction(f) if !(0.0..=1.0).contains(&f) => {
                return Err(invalid("query.sample", f));
            }
            _ => {}
        }
        for (field, size) in [("render.width", self.render.width), ("render.height", self.render.height)] {
            if size == 0 || size > 4096 {
                return Err(invalid(field, size));
            }
        }
        Ok(())
    }

    /// Applies `CHARTALK_*` overrides from the given variables.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "BACKEND_URL" => self.backend.base_url = value.to_string(),
                "TIMEOUT_SECS" => {
                    self.backend.timeout_secs = if value.is_empty() {
                        None
                    } else {
                        Some(value.parse().map_err(|_| invalid("CHARTALK_TIMEOUT_SECS", value))?)
                    };
                }
                "UPLOAD" => self.backend.upload_before_preview = parse_bool(name, value)?,
                "CHECK_MEDIA_TYPE" => self.ingestion.check_media_type = parse_bool(name, value)?,
                "PAYLOAD" => {
                    self.query.payload = match value.to_ascii_lowercase().as_str() {
                        "minimal" => PayloadMode::Minimal,
                        "templated" => PayloadMode::Templated,
                        _ => return Err(invalid("CHARTALK_PAYLOAD", value)),
                    };
                }
                "SAMPLE" => {
                    self.query.sample =
                        parse_sample(value).ok_or_else(|| invalid("CHARTALK_SAMPLE", value))?;
                }
                "FEW_SHOT" => self.query.few_shot = parse_bool(name, value)?,
                "RELEVANCE_GATE" => self.query.relevance_gate = parse_bool(name, value)?,
                "REQUIRE_DESCRIPTION" => self.render.require_description = parse_bool(name, value)?,
                "BINDING" => {
                    self.render.binding = match value.to_ascii_lowercase().as_str() {
                        "inline" => DataBinding::Inline,
                        "named" => DataBinding::Named,
                        _ => return Err(invalid("CHARTALK_BINDING", value)),
                    };
                }
                "CHART_WIDTH" => {
                    self.render.width = value.parse().map_err(|_| invalid("CHARTALK_CHART_WIDTH", value))?;
                }
                "CHART_HEIGHT" => {
                    self.render.height = value.parse().map_err(|_| invalid("CHARTALK_CHART_HEIGHT", value))?;
                }
                _ => continue,
            }
            debug!("Applied environment override {}{}", ENV_PREFIX, name);
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(&format!("{ENV_PREFIX}{name}"), value)),
    }
}

/// `full`, `rows:N` or `fraction:F`.
pub fn parse_sample(text: &str) -> Option<SampleStrategy> {
    let text = text.trim().to_ascii_lowercase();
    if text == "full" {
        return Some(SampleStrategy::Full);
    }
    let (kind, amount) = text.split_once(':')?;
    match kind.trim() {
        "rows" => amount.trim().parse().ok().map(SampleStrategy::FirstRows),
        "fraction" => amount.trim().parse().ok().map(SampleStrategy::LeadingFraction),
        _ => None,
    }
}

/// Layers configuration: defaults, then an optional TOML file, then
/// `CHARTALK_*` environment variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn load(&self) -> ConfigResult<ChatConfig> {
        self.load_with_env(std::env::vars())
    }

    pub fn load_with_env<I, K, V>(&self, vars: I) -> ConfigResult<ChatConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = match &self.path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| {
                    ConfigError::ConfigFileError {
                        path: path.display().to_string(),
                        source,
                    }
                })?;
                info!("Loaded configuration from {}", path.display());
                ChatConfig::from_toml_str(&text)?
            }
            None => ChatConfig::default(),
        };
        config.apply_env(vars)?;
        config.validate()?;
        Ok(config)
    }
}

/// Swallows a second file-picker request that arrives inside the window
/// opened by the first.
#[derive(Debug, Clone)]
pub struct FilePickerGuard {
    window: Duration,
    last_opened: Option<Instant>,
}

impl FilePickerGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_opened: None,
        }
    }

    pub fn try_open(&mut self) -> bool {
        self.try_open_at(Instant::now())
    }

    pub fn try_open_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_opened {
            if now.saturating_duration_since(last) < self.window {
                debug!("Suppressed repeated file picker request");
                return false;
            }
        }
        self.last_opened = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ChatConfig::default();
        config.validate().unwrap();
        assert_eq!(config.backend.timeout(), None);
        assert_eq!(config.query.sample, SampleStrategy::LeadingFraction(0.75));
        assert_eq!(config.query.payload, PayloadMode::Minimal);
    }

    #[test]
    fn test_partial_toml() {
        let config = ChatConfig::from_toml_str(
            r#"
            [backend]
            base_url = "https://charts.example"
            timeout_secs = 30

            [query]
            payload = "templated"
            sample = { kind = "first_rows", value = 20 }

            [render]
            binding = "named"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.query.payload, PayloadMode::Templated);
        assert_eq!(config.query.sample, SampleStrategy::FirstRows(20));
        assert_eq!(config.render.binding, DataBinding::Named);
        assert_eq!(config.render.width, 640);
        assert!(config.ingestion.check_media_type);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backend]\nbase_url = \"http://from-file:1\"").unwrap();
        let config = ConfigLoader::new()
            .with_file(file.path())
            .load_with_env([
                ("CHARTALK_BACKEND_URL", "http://from-env:2"),
                ("CHARTALK_SAMPLE", "rows:5"),
                ("CHARTALK_RELEVANCE_GATE", "yes"),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert_eq!(config.backend.base_url, "http://from-env:2");
        assert_eq!(config.query.sample, SampleStrategy::FirstRows(5));
        assert!(config.query.relevance_gate);
    }

    #[test]
    fn test_invalid_values() {
        let err = ConfigLoader::new()
            .load_with_env([("CHARTALK_FEW_SHOT", "maybe")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = ConfigLoader::new()
            .load_with_env([("CHARTALK_BACKEND_URL", "ftp://x")])
            .unwrap_err();
        assert!(err.to_string().contains("backend.base_url"));

        let mut config = ChatConfig::default();
        config.query.sample = SampleStrategy::LeadingFraction(1.5);
        assert!(config.validate().is_err());

        let missing = ConfigLoader::new().with_file("/nonexistent/chartalk.toml").load_with_env(Vec::<(String, String)>::new());
        assert!(matches!(missing, Err(ConfigError::ConfigFileError { .. })));
    }

    #[test]
    fn test_sample_parsing() {
        assert_eq!(parse_sample("full"), Some(SampleStrategy::Full));
        assert_eq!(parse_sample("rows: 10"), Some(SampleStrategy::FirstRows(10)));
        assert_eq!(parse_sample("fraction:0.5"), Some(SampleStrategy::LeadingFraction(0.5)));
        assert_eq!(parse_sample("half"), None);
    }

    #[test]
    fn test_picker_guard_window() {
        let mut guard = FilePickerGuard::new(Duration::from_millis(500));
        let start = Instant::now();
        assert!(guard.try_open_at(start));
        assert!(!guard.try_open_at(start + Duration::from_millis(100)));
        assert!(guard.try_open_at(start + Duration::from_millis(600)));
    }
}
