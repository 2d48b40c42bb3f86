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

//! Reads the `mark` and `encoding` of a bound specification and reduces the
//! bound rows to plottable data points.

use super::scale::ScaleKind;
use crate::dataset::Value as Cell;
use crate::error::{RenderError, RenderResult};
use crate::spec::BoundSpec;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    Bar,
    Line,
    Area,
    Point,
    Circle,
    Square,
    Tick,
}

impl Mark {
    pub fn parse(name: &str) -> RenderResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bar" => Ok(Self::Bar),
            "line" => Ok(Self::Line),
            "area" => Ok(Self::Area),
            "point" => Ok(Self::Point),
            "circle" => Ok(Self::Circle),
            "square" => Ok(Self::Square),
            "tick" => Ok(Self::Tick),
            _ => Err(RenderError::UnsupportedMark(name.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bar => "bar",
            Self::Line => "line",
            Self::Area => "area",
            Self::Point => "point",
            Self::Circle => "circle",
            Self::Square => "square",
            Self::Tick => "tick",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Quantitative,
    Temporal,
    Ordinal,
    Nominal,
}

impl FieldType {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "quantitative" | "q" => Some(Self::Quantitative),
            "temporal" | "t" => Some(Self::Temporal),
            "ordinal" | "o" => Some(Self::Ordinal),
            "nominal" | "n" => Some(Self::Nominal),
            _ => None,
        }
    }

    fn infer(field: &str, rows: &[Value]) -> Self {
        let mut numbers = 0usize;
        let mut dates = 0usize;
        let mut seen = 0usize;
        for value in rows.iter().filter_map(|row| row.get(field)) {
            match value {
                Value::Null => continue,
                Value::Number(_) => numbers += 1,
                Value::String(s) if matches!(Cell::infer(s), Cell::Date(_)) => dates += 1,
                _ => {}
            }
            seen += 1;
        }
        if seen == 0 {
            Self::Nominal
        } else if numbers == seen {
            Self::Quantitative
        } else if dates == seen {
            Self::Temporal
        } else {
            Self::Nominal
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Valid,
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Distinct,
}

impl Aggregate {
    pub fn parse(name: &str) -> RenderResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Ok(Self::Count),
            "valid" => Ok(Self::Valid),
            "sum" => Ok(Self::Sum),
            "mean" | "average" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "distinct" => Ok(Self::Distinct),
            _ => Err(RenderError::UnsupportedAggregate(name.to_string())),
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Count => "Count",
            Self::Valid => "Valid",
            Self::Sum => "Sum",
            Self::Mean => "Mean",
            Self::Median => "Median",
            Self::Min => "Min",
            Self::Max => "Max",
            Self::Distinct => "Distinct",
        }
    }

    /// `values` holds one entry per grouped row; `None` when the channel
    /// has no field.
    #[allow(clippy::cast_precision_loss)]
    pub fn apply(self, values: &[Option<&Value>]) -> Option<f64> {
        let numbers = || values.iter().filter_map(|v| v.and_then(Value::as_f64));
        match self {
            Self::Count => Some(values.len() as f64),
            Self::Valid => Some(
                values
                    .iter()
                    .filter(|v| v.is_some_and(|v| !v.is_null()))
                    .count() as f64,
            ),
            Self::Distinct => {
                let distinct: HashSet<String> = values
                    .iter()
                    .map(|v| v.map_or_else(String::new, ToString::to_string))
                    .collect();
                Some(distinct.len() as f64)
            }
            Self::Sum => Some(numbers().sum()),
            Self::Mean => {
                let (sum, n) = numbers().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                (n > 0).then(|| sum / n as f64)
            }
            Self::Median => {
                let mut sorted: Vec<f64> = numbers().collect();
                if sorted.is_empty() {
                    return None;
                }
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                Some(if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                })
            }
            Self::Min => numbers().reduce(f64::min),
            Self::Max => numbers().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
    Data,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDef {
    pub field: Option<String>,
    pub field_type: FieldType,
    pub aggregate: Option<Aggregate>,
    pub title: Option<String>,
    pub sort: SortOrder,
    pub scale: ScaleKind,
}

impl ChannelDef {
    fn parse(channel: &str, def: &Value, rows: &[Value]) -> RenderResult<Self> {
        let field = def.get("field").and_then(Value::as_str).map(str::to_string);
        let aggregate = def
            .get("aggregate")
            .and_then(Value::as_str)
            .map(Aggregate::parse)
            .transpose()?;

        if let Some(name) = &field {
            if !rows.is_empty() && !rows.iter().any(|row| row.get(name).is_some()) {
                return Err(RenderError::UnknownField {
                    channel: channel.to_string(),
                    field: name.clone(),
                });
            }
        } else if aggregate != Some(Aggregate::Count) {
            return Err(RenderError::MissingChannel(format!("{channel}.field")));
        }

        let declared = def.get("type").and_then(Value::as_str).and_then(FieldType::parse);
        let field_type = match (declared, aggregate, &field) {
            (_, Some(_), _) => FieldType::Quantitative,
            (Some(declared), None, _) => declared,
            (None, None, Some(name)) => FieldType::infer(name, rows),
            (None, None, None) => FieldType::Nominal,
        };

        let title = def
            .get("title")
            .and_then(Value::as_str)
            .or_else(|| {
                def.get("axis")
                    .and_then(|axis| axis.get("title"))
                    .and_then(Value::as_str)
            })
            .map(str::to_string);

        let sort = match def.get("sort") {
            Some(Value::Null) => SortOrder::Data,
            Some(Value::String(s)) if s.eq_ignore_ascii_case("descending") => {
                SortOrder::Descending
            }
            _ => SortOrder::Ascending,
        };

        let scale = match field_type {
            FieldType::Quantitative => ScaleKind::Linear,
            FieldType::Temporal => ScaleKind::Time,
            FieldType::Ordinal | FieldType::Nominal => ScaleKind::Band,
        };

        Ok(Self {
            field,
            field_type,
            aggregate,
            title,
            sort,
            scale,
        })
    }

    pub fn axis_title(&self) -> String {
        if let Some(title) = &self.title {
            return title.clone();
        }
        match (&self.field, self.aggregate) {
            (None, _) => "Count of Records".to_string(),
            (Some(field), Some(aggregate)) => format!("{} of {field}", aggregate.label()),
            (Some(field), None) => field.clone(),
        }
    }

    fn key(&self, row: &Value) -> Option<Key> {
        let value = row.get(self.field.as_deref()?).unwrap_or(&Value::Null);
        match self.scale {
            ScaleKind::Band => Some(Key::Cat(category_label(value, self.field_type))),
            ScaleKind::Linear => numeric(value).map(Key::Num),
            ScaleKind::Time => timestamp(value).map(Key::Num),
        }
    }

    fn category(&self, row: &Value) -> Option<String> {
        let field = self.field.as_deref()?;
        Some(category_label(
            row.get(field).unwrap_or(&Value::Null),
            self.field_type,
        ))
    }
}

/// A position along one axis: a number on continuous scales, a category
/// label on band scales.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Num(f64),
    Cat(String),
}

impl Key {
    fn group_key(&self) -> String {
        match self {
            Self::Num(n) => format!("#{}", n.to_bits()),
            Self::Cat(s) => format!("${s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub x: Key,
    pub y: Key,
    pub series: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub mark: Mark,
    pub x: ChannelDef,
    pub y: ChannelDef,
    pub color: Option<ChannelDef>,
    pub x_offset: Option<ChannelDef>,
}

impl Encoding {
    /// Checks mark and channels against the bound rows.
    pub fn compile(spec: &BoundSpec) -> RenderResult<Self> {
        let mark_name = spec
            .mark_type()
            .ok_or_else(|| RenderError::UnsupportedMark("<none>".to_string()))?;
        let mark = Mark::parse(mark_name)?;
        let rows = spec.values().ok_or(RenderError::MissingData)?;
        let encoding = spec
            .get("encoding")
            .and_then(Value::as_object)
            .ok_or_else(|| RenderError::MissingChannel("encoding".to_string()))?;

        let channel = |name: &str| -> RenderResult<Option<ChannelDef>> {
            encoding
                .get(name)
                .filter(|def| def.is_object())
                .map(|def| ChannelDef::parse(name, def, rows))
                .transpose()
        };
        let mut x = channel("x")?.ok_or_else(|| RenderError::MissingChannel("x".to_string()))?;
        let mut y = channel("y")?.ok_or_else(|| RenderError::MissingChannel("y".to_string()))?;
        let color = channel("color")?;
        let x_offset = channel("xOffset")?;

        if x.aggregate.is_some() && y.aggregate.is_some() {
            return Err(RenderError::IncompatibleEncoding {
                mark: mark.as_str().to_string(),
                reason: "only one positional channel may be aggregated".to_string(),
            });
        }

        if mark == Mark::Bar {
            for def in [&mut x, &mut y] {
                if def.field_type == FieldType::Temporal {
                    def.scale = ScaleKind::Band;
                }
            }
            let reason = match (x.scale, y.scale) {
                (ScaleKind::Band, ScaleKind::Band) => Some("both axes are discrete"),
                (ScaleKind::Band, _) | (_, ScaleKind::Band) => None,
                _ => Some("bars need a discrete or temporal axis"),
            };
            if let Some(reason) = reason {
                return Err(RenderError::IncompatibleEncoding {
                    mark: mark.as_str().to_string(),
                    reason: reason.to_string(),
                });
            }
        }

        debug!(mark = mark.as_str(), x = ?x.field, y = ?y.field, "Compiled encoding");
        Ok(Self {
            mark,
            x,
            y,
            color,
            x_offset,
        })
    }

    /// Rows with an unusable position are skipped. When one positional
    /// channel is aggregated the rows are grouped by every other channel.
    pub fn collect(&self, rows: &[Value]) -> Vec<Datum> {
        let series_of = |row: &Value| self.color.as_ref().and_then(|c| c.category(row));
        let offset_of = |row: &Value| self.x_offset.as_ref().and_then(|c| c.category(row));

        let (measure, dimension, measure_is_x) = match (self.x.aggregate, self.y.aggregate) {
            (None, Some(_)) => (&self.y, &self.x, false),
            (Some(_), None) => (&self.x, &self.y, true),
            _ => {
                return rows
                    .iter()
                    .filter_map(|row| {
                        Some(Datum {
                            x: self.x.key(row)?,
                            y: self.y.key(row)?,
                            series: series_of(row),
                            offset: offset_of(row),
                        })
                    })
                    .collect();
            }
        };
        let Some(aggregate) = measure.aggregate else {
            return Vec::new();
        };

        type GroupKey = (String, Option<String>, Option<String>);
        let mut groups: IndexMap<GroupKey, (Key, Vec<Option<&Value>>)> = IndexMap::new();
        for row in rows {
            let Some(key) = dimension.key(row) else {
                continue;
            };
            let group = (key.group_key(), series_of(row), offset_of(row));
            let value = measure.field.as_deref().and_then(|f| row.get(f));
            groups
                .entry(group)
                .or_insert_with(|| (key, Vec::new()))
                .1
                .push(value);
        }

        groups
            .into_iter()
            .filter_map(|((_, series, offset), (key, values))| {
                let total = Key::Num(aggregate.apply(&values)?);
                let (x, y) = if measure_is_x { (total, key) } else { (key, total) };
                Some(Datum {
                    x,
                    y,
                    series,
                    offset,
                })
            })
            .collect()
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

#[allow(clippy::cast_precision_loss)]
fn timestamp(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => match Cell::infer(s) {
            Cell::Date(d) => Some(d.timestamp_millis() as f64),
            Cell::Number(n) => year_millis(n),
            _ => None,
        },
        Value::Number(n) => n.as_f64().and_then(year_millis),
        _ => None,
    }
}

/// Bare four digit years are read as January 1st of that year; any other
/// number is taken as epoch milliseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn year_millis(n: f64) -> Option<f64> {
    if n.fract() == 0.0 && (1000.0..=9999.0).contains(&n) {
        let date = chrono::NaiveDate::from_ymd_opt(n as i32, 1, 1)?;
        let at = date.and_hms_opt(0, 0, 0)?.and_utc();
        return Some(at.timestamp_millis() as f64);
    }
    n.is_finite().then_some(n)
}

pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        let text = format!("{n:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn category_label(value: &Value, field_type: FieldType) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) if field_type == FieldType::Temporal => match Cell::infer(s) {
            Cell::Date(d) => d.format("%Y-%m-%d").to_string(),
            _ => s.clone(),
        },
        Value::String(s) => s.clone(),
        Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::spec::{ChartSpec, DataBinding, ValidationPolicy};

    fn bound(text: &str, csv: &str) -> BoundSpec {
        let dataset = Dataset::from_csv_str(csv, None).unwrap();
        ChartSpec::parse(text, &ValidationPolicy::default())
            .unwrap()
            .bind(&dataset, DataBinding::Inline)
    }

    const CARS: &str = "cyl,hp,origin,year\n4,90,EU,2001-01-01\n4,110,US,2002-01-01\n6,150,US,2003-01-01\n";

    #[test]
    fn test_mean_by_category() {
        let spec = bound(
            r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"cyl","type":"ordinal"},"y":{"field":"hp","aggregate":"mean"}}}"#,
            CARS,
        );
        let encoding = Encoding::compile(&spec).unwrap();
        assert_eq!(encoding.y.axis_title(), "Mean of hp");
        let data = encoding.collect(spec.values().unwrap());
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].x, Key::Cat("4".to_string()));
        assert_eq!(data[0].y, Key::Num(100.0));
        assert_eq!(data[1].y, Key::Num(150.0));
    }

    #[test]
    fn test_count_without_field() {
        let spec = bound(
            r#"{"mark":"bar","data":{},"encoding":{"y":{"field":"origin"},"x":{"aggregate":"count"}}}"#,
            CARS,
        );
        let encoding = Encoding::compile(&spec).unwrap();
        assert_eq!(encoding.x.axis_title(), "Count of Records");
        let data = encoding.collect(spec.values().unwrap());
        assert_eq!(data[0].x, Key::Num(1.0));
        assert_eq!(data[1].x, Key::Num(2.0));
    }

    #[test]
    fn test_groups_with_separator_characters_stay_apart() {
        let spec = bound(
            r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"k","type":"nominal"},"y":{"field":"v","aggregate":"sum"},"color":{"field":"g"}}}"#,
            "k,g,v\na|b,c,1\na,b|c,10\n",
        );
        let encoding = Encoding::compile(&spec).unwrap();
        let data = encoding.collect(spec.values().unwrap());
        assert_eq!(data.len(), 2);
        assert_eq!(data[0].x, Key::Cat("a|b".to_string()));
        assert_eq!(data[0].y, Key::Num(1.0));
        assert_eq!(data[0].series.as_deref(), Some("c"));
        assert_eq!(data[1].y, Key::Num(10.0));
        assert_eq!(data[1].series.as_deref(), Some("b|c"));
    }

    #[test]
    fn test_type_inference() {
        let spec = bound(
            r#"{"mark":"line","data":{},"encoding":{"x":{"field":"year"},"y":{"field":"hp"},"color":{"field":"origin"}}}"#,
            CARS,
        );
        let encoding = Encoding::compile(&spec).unwrap();
        assert_eq!(encoding.x.field_type, FieldType::Temporal);
        assert_eq!(encoding.y.field_type, FieldType::Quantitative);
        let data = encoding.collect(spec.values().unwrap());
        assert_eq!(data.len(), 3);
        assert_eq!(data[1].series.as_deref(), Some("US"));
    }

    #[test]
    fn test_rejections() {
        let unknown = bound(
            r#"{"mark":"point","data":{},"encoding":{"x":{"field":"nope"},"y":{"field":"hp"}}}"#,
            CARS,
        );
        assert!(matches!(
            Encoding::compile(&unknown),
            Err(RenderError::UnknownField { .. })
        ));

        let mark = bound(r#"{"mark":"arc","data":{},"encoding":{}}"#, CARS);
        assert_eq!(
            Encoding::compile(&mark),
            Err(RenderError::UnsupportedMark("arc".to_string()))
        );

        let missing = bound(r#"{"mark":"point","data":{},"encoding":{"x":{"field":"hp"}}}"#, CARS);
        assert_eq!(
            Encoding::compile(&missing),
            Err(RenderError::MissingChannel("y".to_string()))
        );

        let bars = bound(
            r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"hp"},"y":{"field":"cyl"}}}"#,
            CARS,
        );
        assert!(matches!(
            Encoding::compile(&bars),
            Err(RenderError::IncompatibleEncoding { .. })
        ));

        let agg = bound(
            r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"origin"},"y":{"field":"hp","aggregate":"p95"}}}"#,
            CARS,
        );
        assert_eq!(
            Encoding::compile(&agg),
            Err(RenderError::UnsupportedAggregate("p95".to_string()))
        );
    }

    #[test]
    fn test_aggregates() {
        let a = serde_json::json!(1.0);
        let b = serde_json::json!(3.0);
        let c = serde_json::json!(8.0);
        let n = Value::Null;
        let values = [Some(&a), Some(&b), Some(&c), Some(&n), None];
        assert_eq!(Aggregate::Count.apply(&values), Some(5.0));
        assert_eq!(Aggregate::Valid.apply(&values), Some(3.0));
        assert_eq!(Aggregate::Sum.apply(&values), Some(12.0));
        assert_eq!(Aggregate::Mean.apply(&values), Some(4.0));
        assert_eq!(Aggregate::Median.apply(&values), Some(3.0));
        assert_eq!(Aggregate::Min.apply(&values), Some(1.0));
        assert_eq!(Aggregate::Max.apply(&values), Some(8.0));
        assert_eq!(Aggregate::Distinct.apply(&values), Some(5.0));
        assert_eq!(Aggregate::Mean.apply(&[]), None);
    }

    #[test]
    fn test_number_format() {
        assert_eq!(format_number(4.0), "4");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.33");
    }
}
