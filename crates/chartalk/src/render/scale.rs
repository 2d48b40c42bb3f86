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

use super::encoding::{format_number, Key, SortOrder};
use crate::error::{RenderError, RenderResult};
use chrono::DateTime;
use std::cmp::Ordering;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleKind {
    Linear,
    Time,
    Band,
}

/// Maps keys onto the f64 axis plotters draws. Band categories sit on
/// integer positions.
#[derive(Debug, Clone, PartialEq)]
pub enum Scale {
    Linear { min: f64, max: f64 },
    Time { min: f64, max: f64 },
    Band { categories: Vec<String> },
}

impl Scale {
    pub fn band<'a>(keys: impl Iterator<Item = &'a Key>, sort: SortOrder) -> Self {
        let mut categories: Vec<String> = Vec::new();
        for key in keys {
            if let Key::Cat(label) = key {
                if !categories.contains(label) {
                    categories.push(label.clone());
                }
            }
        }
        match sort {
            SortOrder::Data => {}
            SortOrder::Ascending => categories.sort_by(|a, b| natural_order(a, b)),
            SortOrder::Descending => categories.sort_by(|a, b| natural_order(b, a)),
        }
        Self::Band { categories }
    }

    /// Fits a linear or time scale around `values` with 5% headroom. Fails
    /// when the padded bounds leave the finite range of f64.
    pub fn continuous(
        axis: &str,
        kind: ScaleKind,
        values: impl Iterator<Item = f64>,
        include_zero: bool,
    ) -> RenderResult<Self> {
        let (mut min, mut max) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        if min > max {
            (min, max) = (0.0, 1.0);
        }
        if include_zero {
            min = min.min(0.0);
            max = max.max(0.0);
        }
        if (max - min).abs() < f64::EPSILON {
            let pad = if kind == ScaleKind::Time { 86_400_000.0 } else { 1.0 };
            min -= pad;
            max += pad;
        } else {
            let headroom = (max - min) * 0.05;
            if max > 0.0 || !include_zero {
                max += headroom;
            }
            if min < 0.0 || !include_zero {
                min -= headroom;
            }
        }
        if !(max - min).is_finite() {
            return Err(RenderError::UnboundedScale(axis.to_string()));
        }
        Ok(match kind {
            ScaleKind::Time => Self::Time { min, max },
            _ => Self::Linear { min, max },
        })
    }

    pub fn is_band(&self) -> bool {
        matches!(self, Self::Band { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Band { categories } => categories.len(),
            _ => 0,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn range(&self) -> Range<f64> {
        match self {
            Self::Linear { min, max } | Self::Time { min, max } => *min..*max,
            Self::Band { categories } => -0.5..(categories.len().max(1) as f64 - 0.5),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn position(&self, key: &Key) -> Option<f64> {
        match (self, key) {
            (Self::Band { categories }, Key::Cat(label)) => categories
                .iter()
                .position(|c| c == label)
                .map(|i| i as f64),
            (Self::Linear { .. } | Self::Time { .. }, Key::Num(n)) => Some(*n),
            _ => None,
        }
    }

    /// Tick label for an axis position.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn label(&self, at: f64) -> String {
        match self {
            Self::Linear { .. } => format_number(at),
            Self::Time { .. } => DateTime::from_timestamp_millis(at as i64)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
            Self::Band { categories } => {
                let nearest = at.round();
                if (at - nearest).abs() > 1e-6 || nearest < 0.0 {
                    return String::new();
                }
                categories
                    .get(nearest as usize)
                    .cloned()
                    .unwrap_or_default()
            }
        }
    }

    /// Baseline for bars and areas.
    pub fn baseline(&self) -> f64 {
        let range = self.range();
        0.0_f64.clamp(range.start, range.end)
    }
}

fn natural_order(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(labels: &[&str]) -> Vec<Key> {
        labels.iter().map(|l| Key::Cat((*l).to_string())).collect()
    }

    #[test]
    fn test_band_sorting() {
        let keys = cats(&["8", "4", "6", "4"]);
        let scale = Scale::band(keys.iter(), SortOrder::Ascending);
        assert_eq!(
            scale,
            Scale::Band {
                categories: vec!["4".into(), "6".into(), "8".into()]
            }
        );
        assert_eq!(scale.position(&Key::Cat("6".into())), Some(1.0));
        assert_eq!(scale.range(), -0.5..2.5);

        let data_order = Scale::band(keys.iter(), SortOrder::Data);
        assert_eq!(data_order.label(0.0), "8");
        let descending = Scale::band(keys.iter(), SortOrder::Descending);
        assert_eq!(descending.label(0.0), "8");
        assert_eq!(descending.label(2.0), "4");
    }

    #[test]
    fn test_band_labels_only_on_categories() {
        let scale = Scale::band(cats(&["a", "b"]).iter(), SortOrder::Ascending);
        assert_eq!(scale.label(1.0), "b");
        assert_eq!(scale.label(0.5), "");
        assert_eq!(scale.label(-0.5), "");
        assert_eq!(scale.label(5.0), "");
    }

    #[test]
    fn test_continuous_includes_zero() {
        let scale = Scale::continuous("y", ScaleKind::Linear, [10.0, 20.0].into_iter(), true).unwrap();
        let range = scale.range();
        assert_eq!(range.start, 0.0);
        assert_eq!(range.end, 21.0);
        assert_eq!(scale.baseline(), 0.0);

        let flat = Scale::continuous("x", ScaleKind::Linear, [5.0].into_iter(), false).unwrap();
        assert_eq!(flat.range(), 4.0..6.0);

        let empty = Scale::continuous("x", ScaleKind::Time, std::iter::empty(), false).unwrap();
        assert!(matches!(empty, Scale::Time { .. }));
    }

    #[test]
    fn test_continuous_rejects_overflowing_span() {
        let err = Scale::continuous("x", ScaleKind::Linear, [-1e308, 1e308].into_iter(), false);
        assert_eq!(err, Err(RenderError::UnboundedScale("x".to_string())));

        let headroom = Scale::continuous("y", ScaleKind::Linear, [0.0, f64::MAX].into_iter(), true);
        assert_eq!(headroom, Err(RenderError::UnboundedScale("y".to_string())));

        let wide = Scale::continuous("y", ScaleKind::Linear, [1e20].into_iter(), true).unwrap();
        assert!(wide.range().end.is_finite());
    }

    #[test]
    fn test_time_labels() {
        let scale = Scale::Time {
            min: 0.0,
            max: 1.0,
        };
        assert_eq!(scale.label(86_400_000.0), "1970-01-02");
    }
}
