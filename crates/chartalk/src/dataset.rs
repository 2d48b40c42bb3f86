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

//! CSV ingestion with per-field type inference.
//!
//! Every row carries exactly the keys of the header line, in header order.
//! Short records are padded with [`Value::Null`], surplus fields are dropped.

use crate::error::IngestError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info};

const CSV_MEDIA_TYPES: &[&str] = &[
    "text/csv",
    "application/csv",
    "text/x-csv",
    "application/vnd.ms-excel",
];

#[derive(Debug, Clone)]
pub struct FileSource {
    pub name: String,
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileSource {
    pub fn new(name: impl Into<String>, media_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type,
            bytes,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, IngestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| IngestError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("csv") => Some("text/csv".to_string()),
            Some("tsv") => Some("text/tab-separated-values".to_string()),
            _ => None,
        };
        Ok(Self::new(name, media_type, bytes))
    }

    pub fn is_csv_like(&self) -> bool {
        match &self.media_type {
            Some(media_type) => {
                let essence = media_type
                    .split(';')
                    .next()
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                CSV_MEDIA_TYPES.contains(&essence.as_str())
            }
            None => self.name.to_ascii_lowercase().ends_with(".csv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl Value {
    /// Typed reading of a single CSV field.
    pub fn infer(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Null;
        }
        match trimmed {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            "NaN" => return Self::Number(f64::NAN),
            "Infinity" | "+Infinity" => return Self::Number(f64::INFINITY),
            "-Infinity" => return Self::Number(f64::NEG_INFINITY),
            _ => {}
        }
        if let Some(number) = parse_number(trimmed) {
            return Self::Number(number);
        }
        if let Some(date) = parse_iso_date(trimmed) {
            return Self::Date(date);
        }
        Self::Text(raw.to_string())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Date(d) => serde_json::Value::String(format_date(d)),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.is_nan() => f.write_str("NaN"),
            Self::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Self::Number(n) => write!(f, "{n}"),
            Self::Date(d) => f.write_str(&format_date(d)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_number(text: &str) -> Option<f64> {
    // Rust accepts "inf"/"nan" spellings that should stay text.
    if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    text.parse::<f64>().ok()
}

fn iso_date_regex() -> &'static Regex {
    static ISO_DATE: OnceLock<Regex> = OnceLock::new();
    ISO_DATE.get_or_init(|| {
        Regex::new(
            r"^(\d{4})(?:-(\d{2})(?:-(\d{2}))?)?(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,3}))?)?(Z|[-+]\d{2}:\d{2})?)?$",
        )
        .expect("ISO date pattern is valid")
    })
}

fn parse_iso_date(text: &str) -> Option<DateTime<Utc>> {
    let caps = iso_date_regex().captures(text)?;
    // A bare year is already a number; only dashed or timed forms get here.
    caps.get(2)?;
    if caps.get(8).is_some() {
        return DateTime::parse_from_rfc3339(&normalise_rfc3339(text))
            .ok()
            .map(|d| d.with_timezone(&Utc));
    }
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let day: u32 = caps.get(3).map_or(Some(1), |m| m.as_str().parse().ok())?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let hour: u32 = caps.get(4).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let minute: u32 = caps.get(5).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let second: u32 = caps.get(6).map_or(Some(0), |m| m.as_str().parse().ok())?;
    let millis: u32 = caps
        .get(7)
        .map_or(Some(0), |m| format!("{:0<3}", m.as_str()).parse().ok())?;
    let naive: NaiveDateTime = date.and_hms_milli_opt(hour, minute, second, millis)?;
    Some(naive.and_utc())
}

fn normalise_rfc3339(text: &str) -> String {
    // RFC 3339 wants seconds; "2020-01-01T10:00Z" lacks them.
    let Some(t) = text.find('T') else {
        return text.to_string();
    };
    let (date, time) = text.split_at(t + 1);
    let zone_at = time
        .find(|c| c == 'Z' || c == '+' || c == '-')
        .unwrap_or(time.len());
    let (clock, zone) = time.split_at(zone_at);
    let clock = if clock.matches(':').count() == 1 {
        format!("{clock}:00")
    } else {
        clock.to_string()
    };
    let date = if date.matches('-').count() == 1 {
        date.replacen('T', "-01T", 1)
    } else {
        date.to_string()
    };
    format!("{date}{clock}{zone}")
}

pub type Row = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Number,
    Boolean,
    Date,
    String,
    Empty,
}

impl ColumnType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::String => "string",
            Self::Empty => "empty",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Boolean),
            Value::Number(_) => Some(Self::Number),
            Value::Date(_) => Some(Self::Date),
            Value::Text(_) => Some(Self::String),
        }
    }
}

/// How much of the dataset goes into a templated prompt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SampleStrategy {
    Full,
    FirstRows(usize),
    LeadingFraction(f64),
}

impl Default for SampleStrategy {
    fn default() -> Self {
        Self::LeadingFraction(0.75)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Row>,
    source_name: Option<String>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self {
            columns,
            rows,
            source_name: None,
        }
    }

    pub fn from_bytes(bytes: &[u8], name: Option<&str>) -> Result<Self, IngestError> {
        let text = String::from_utf8_lossy(bytes);
        Self::from_csv_str(&text, name)
    }

    pub fn from_csv_str(text: &str, name: Option<&str>) -> Result<Self, IngestError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        if text.trim().is_empty() {
            return Err(IngestError::MissingHeader);
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut columns: Vec<String> = Vec::new();
        for header in reader.headers()?.iter() {
            if !columns.iter().any(|c| c == header) {
                columns.push(header.to_string());
            }
        }
        let headers = reader.headers()?.clone();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Row = columns.iter().map(|c| (c.clone(), Value::Null)).collect();
            for (header, field) in headers.iter().zip(record.iter()) {
                row.insert(header.to_string(), Value::infer(field));
            }
            rows.push(row);
        }
        debug!(columns = columns.len(), rows = rows.len(), "Parsed CSV text");
        info!(
            "Loaded dataset {} with {} rows",
            name.unwrap_or("<unnamed>"),
            rows.len()
        );
        Ok(Self {
            columns,
            rows,
            source_name: name.map(str::to_string),
        })
    }

    pub fn from_file(source: &FileSource) -> Result<Self, IngestError> {
        Self::from_bytes(&source.bytes, Some(&source.name))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source_name.as_deref()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_types(&self) -> Vec<(String, ColumnType)> {
        self.columns
            .iter()
            .map(|column| {
                let mut seen: Option<ColumnType> = None;
                for value in self.rows.iter().filter_map(|row| row.get(column)) {
                    let Some(kind) = ColumnType::of(value) else {
                        continue;
                    };
                    seen = match seen {
                        None => Some(kind),
                        Some(prev) if prev == kind => Some(prev),
                        Some(_) => Some(ColumnType::String),
                    };
                }
                (column.clone(), seen.unwrap_or(ColumnType::Empty))
            })
            .collect()
    }

    pub fn sample(&self, strategy: SampleStrategy) -> &[Row] {
        let take = match strategy {
            SampleStrategy::Full => self.rows.len(),
            SampleStrategy::FirstRows(n) => n.min(self.rows.len()),
            SampleStrategy::LeadingFraction(fraction) => {
                let fraction = if fraction.is_nan() {
                    0.0
                } else {
                    fraction.clamp(0.0, 1.0)
                };
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
                let n = (self.rows.len() as f64 * fraction).floor() as usize;
                n.min(self.rows.len())
            }
        };
        &self.rows[..take]
    }

    pub fn row_to_json(row: &Row) -> serde_json::Value {
        serde_json::Value::Object(
            row.iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn to_json_rows(&self) -> Vec<serde_json::Value> {
        self.rows.iter().map(Self::row_to_json).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_scalars() {
        assert_eq!(Value::infer(""), Value::Null);
        assert_eq!(Value::infer("   "), Value::Null);
        assert_eq!(Value::infer("true"), Value::Bool(true));
        assert_eq!(Value::infer("false"), Value::Bool(false));
        assert_eq!(Value::infer("42"), Value::Number(42.0));
        assert_eq!(Value::infer(" -3.5 "), Value::Number(-3.5));
        assert_eq!(Value::infer("1e3"), Value::Number(1000.0));
        assert_eq!(Value::infer("inf"), Value::Text("inf".to_string()));
        assert_eq!(Value::infer("True"), Value::Text("True".to_string()));
        assert!(matches!(Value::infer("NaN"), Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_infer_dates() {
        let Value::Date(d) = Value::infer("2021-03-04") else {
            panic!("expected a date");
        };
        assert_eq!(d.to_rfc3339(), "2021-03-04T00:00:00+00:00");

        let Value::Date(d) = Value::infer("2021-03") else {
            panic!("expected a date");
        };
        assert_eq!(d.format("%Y-%m-%d").to_string(), "2021-03-01");

        let Value::Date(d) = Value::infer("2021-03-04T10:30Z") else {
            panic!("expected a date");
        };
        assert_eq!(d.format("%H:%M").to_string(), "10:30");

        assert_eq!(Value::infer("2021"), Value::Number(2021.0));
        assert_eq!(
            Value::infer("2021-13-01"),
            Value::Text("2021-13-01".to_string())
        );
    }

    #[test]
    fn test_rows_keyed_by_header() {
        let csv = "name,price,active\nwidget,9.5,true\ngadget,,false\nshort\n";
        let dataset = Dataset::from_csv_str(csv, Some("items.csv")).unwrap();
        assert_eq!(dataset.columns(), &["name", "price", "active"]);
        assert_eq!(dataset.len(), 3);
        for row in dataset.rows() {
            let keys: Vec<&String> = row.keys().collect();
            assert_eq!(keys, vec!["name", "price", "active"]);
        }
        assert_eq!(dataset.rows()[1]["price"], Value::Null);
        assert_eq!(dataset.rows()[2]["active"], Value::Null);
        assert_eq!(dataset.source_name(), Some("items.csv"));
    }

    #[test]
    fn test_bom_and_surplus_fields() {
        let csv = "\u{feff}a,b\n1,2,3\n";
        let dataset = Dataset::from_csv_str(csv, None).unwrap();
        assert_eq!(dataset.columns(), &["a", "b"]);
        assert_eq!(dataset.rows()[0].len(), 2);
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            Dataset::from_csv_str("  \n", None),
            Err(IngestError::MissingHeader)
        ));
    }

    #[test]
    fn test_column_types() {
        let csv = "n,flag,when,mixed,blank\n1,true,2020-01-01,1,\n2,false,2020-02-01,x,\n";
        let dataset = Dataset::from_csv_str(csv, None).unwrap();
        let labels: Vec<&str> = dataset
            .column_types()
            .iter()
            .map(|(_, t)| t.label())
            .collect();
        assert_eq!(labels, vec!["number", "boolean", "date", "string", "empty"]);
    }

    #[test]
    fn test_sample_strategies() {
        let csv = "v\n1\n2\n3\n4\n5\n";
        let dataset = Dataset::from_csv_str(csv, None).unwrap();
        assert_eq!(dataset.sample(SampleStrategy::Full).len(), 5);
        assert_eq!(dataset.sample(SampleStrategy::FirstRows(2)).len(), 2);
        assert_eq!(dataset.sample(SampleStrategy::FirstRows(50)).len(), 5);
        assert_eq!(dataset.sample(SampleStrategy::LeadingFraction(0.75)).len(), 3);
        assert_eq!(dataset.sample(SampleStrategy::LeadingFraction(2.0)).len(), 5);
    }

    #[test]
    fn test_json_rows() {
        let csv = "x,y\n1,NaN\n";
        let dataset = Dataset::from_csv_str(csv, None).unwrap();
        let rows = dataset.to_json_rows();
        assert_eq!(rows[0]["x"], serde_json::json!(1.0));
        assert!(rows[0]["y"].is_null());
    }

    #[test]
    fn test_media_type_check() {
        let csv = FileSource::new("a.csv", Some("text/csv; charset=utf-8".to_string()), vec![]);
        assert!(csv.is_csv_like());
        let png = FileSource::new("a.png", Some("image/png".to_string()), vec![]);
        assert!(!png.is_csv_like());
        let undeclared = FileSource::new("data.CSV", None, vec![]);
        assert!(undeclared.is_csv_like());
    }
}
