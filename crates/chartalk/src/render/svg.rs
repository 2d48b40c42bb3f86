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

use super::encoding::{Datum, Encoding, Key, Mark, SortOrder};
use super::scale::{Scale, ScaleKind};
use super::{ChartEngine, ChartView};
use crate::error::{RenderError, RenderResult};
use crate::spec::BoundSpec;
use plotters::prelude::{
    AreaSeries, ChartBuilder, Circle, Color, EmptyElement, IntoDrawingArea, LineSeries,
    PathElement, RGBColor, Rectangle, SVGBackend, SeriesLabelPosition, BLACK, WHITE,
};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const PALETTE: [RGBColor; 10] = [
    RGBColor(0x4c, 0x78, 0xa8),
    RGBColor(0xf5, 0x85, 0x18),
    RGBColor(0xe4, 0x57, 0x56),
    RGBColor(0x72, 0xb7, 0xb2),
    RGBColor(0x54, 0xa2, 0x4b),
    RGBColor(0xee, 0xca, 0x3b),
    RGBColor(0xb2, 0x79, 0xa2),
    RGBColor(0xff, 0x9d, 0xa6),
    RGBColor(0x9d, 0x75, 0x5d),
    RGBColor(0xba, 0xb0, 0xac),
];
const BAND_WIDTH: f64 = 0.8;
const MAX_DIMENSION: u32 = 4096;

fn draw_err<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

#[derive(Debug, Clone)]
pub struct PlottersEngine {
    default_size: (u32, u32),
}

impl PlottersEngine {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            default_size: (width, height),
        }
    }
}

impl Default for PlottersEngine {
    fn default() -> Self {
        Self::new(640, 400)
    }
}

impl ChartEngine for PlottersEngine {
    fn embed(&self, spec: &BoundSpec) -> RenderResult<Box<dyn ChartView>> {
        let encoding = Encoding::compile(spec)?;
        let data = encoding.collect(spec.values().unwrap_or(&[]));
        let size = (
            dimension(spec.get("width")).unwrap_or(self.default_size.0),
            dimension(spec.get("height")).unwrap_or(self.default_size.1),
        );
        let title = match spec.get("title") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Object(t)) => t.get("text").and_then(Value::as_str).map(str::to_string),
            _ => None,
        };
        debug!(points = data.len(), ?size, "Embedded chart view");
        Ok(Box::new(PlottersView {
            encoding,
            data,
            size,
            title,
            svg: None,
        }))
    }

    fn name(&self) -> &'static str {
        "plotters-svg"
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn dimension(value: Option<&Value>) -> Option<u32> {
    let n = value?.as_f64()?;
    (n >= 1.0 && n <= f64::from(MAX_DIMENSION)).then(|| n as u32)
}

struct Bar {
    x0: f64,
    x1: f64,
    y0: f64,
    y1: f64,
}

/// Geometry of one colour group, in axis coordinates.
struct SeriesGeometry {
    name: Option<String>,
    color: RGBColor,
    bars: Vec<Bar>,
    points: Vec<(f64, f64)>,
}

pub struct PlottersView {
    encoding: Encoding,
    data: Vec<Datum>,
    size: (u32, u32),
    title: Option<String>,
    svg: Option<String>,
}

impl PlottersView {
    fn series_names(&self) -> Vec<Option<String>> {
        let keys: Vec<Key> = self
            .data
            .iter()
            .filter_map(|d| d.series.clone().map(Key::Cat))
            .collect();
        match Scale::band(keys.iter(), SortOrder::Ascending) {
            Scale::Band { categories } if !categories.is_empty() => {
                categories.into_iter().map(Some).collect()
            }
            _ => vec![None],
        }
    }

    fn offsets(&self) -> Vec<String> {
        let keys: Vec<Key> = self
            .data
            .iter()
            .filter_map(|d| d.offset.clone().map(Key::Cat))
            .collect();
        match Scale::band(keys.iter(), SortOrder::Ascending) {
            Scale::Band { categories } => categories,
            _ => Vec::new(),
        }
    }

    fn discrete_scale(&self, keys: impl Iterator<Item = Key>, sort: SortOrder) -> Scale {
        let keys: Vec<Key> = keys.collect();
        Scale::band(keys.iter(), sort)
    }

    /// Lays out every datum and fits both scales around the result.
    fn layout(&self) -> RenderResult<(Vec<SeriesGeometry>, Scale, Scale)> {
        let enc = &self.encoding;
        let names = self.series_names();
        let index: HashMap<Option<String>, usize> = names
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, n)| (n, i))
            .collect();
        let mut series: Vec<SeriesGeometry> = names
            .into_iter()
            .enumerate()
            .map(|(i, name)| SeriesGeometry {
                name,
                color: PALETTE[i % PALETTE.len()],
                bars: Vec::new(),
                points: Vec::new(),
            })
            .collect();
        let slot = |d: &Datum| index.get(&d.series).copied().unwrap_or(0);

        let x_band = enc.x.scale == ScaleKind::Band;
        let y_band = enc.y.scale == ScaleKind::Band;
        let x_scale_band = x_band.then(|| self.discrete_scale(self.data.iter().map(|d| d.x.clone()), enc.x.sort));
        let y_scale_band = y_band.then(|| self.discrete_scale(self.data.iter().map(|d| d.y.clone()), enc.y.sort));
        let pos = |scale: &Option<Scale>, key: &Key| match (scale, key) {
            (Some(band), key) => band.position(key),
            (None, Key::Num(n)) => Some(*n),
            (None, Key::Cat(_)) => None,
        };

        let mut x_extent: Vec<f64> = Vec::new();
        let mut y_extent: Vec<f64> = Vec::new();

        if enc.mark == Mark::Bar {
            let vertical = x_band;
            let offsets = self.offsets();
            let stacked = offsets.is_empty() && series.len() > 1;
            let mut positive: HashMap<u64, f64> = HashMap::new();
            let mut negative: HashMap<u64, f64> = HashMap::new();
            for datum in &self.data {
                let (band_key, value_key) = if vertical {
                    (&datum.x, &datum.y)
                } else {
                    (&datum.y, &datum.x)
                };
                let band_scale = if vertical { &x_scale_band } else { &y_scale_band };
                let (Some(center), Key::Num(value)) = (pos(band_scale, band_key), value_key) else {
                    continue;
                };
                let (lo, hi) = match datum.offset.as_ref().and_then(|o| offsets.iter().position(|c| c == o)) {
                    #[allow(clippy::cast_precision_loss)]
                    Some(j) => {
                        let width = BAND_WIDTH / offsets.len() as f64;
                        let lo = center - BAND_WIDTH / 2.0 + width * j as f64;
                        (lo, lo + width)
                    }
                    None => (center - BAND_WIDTH / 2.0, center + BAND_WIDTH / 2.0),
                };
                let (base, top) = if stacked {
                    let stack = if *value >= 0.0 { &mut positive } else { &mut negative };
                    let base = stack.entry(center.to_bits()).or_insert(0.0);
                    let start = *base;
                    *base += *value;
                    (start, *base)
                } else {
                    (0.0, *value)
                };
                let bar = if vertical {
                    Bar { x0: lo, x1: hi, y0: base, y1: top }
                } else {
                    Bar { x0: base, x1: top, y0: lo, y1: hi }
                };
                if vertical {
                    y_extent.extend([base, top]);
                } else {
                    x_extent.extend([base, top]);
                }
                series[slot(datum)].bars.push(bar);
            }
        } else {
            for datum in &self.data {
                let (Some(x), Some(y)) = (pos(&x_scale_band, &datum.x), pos(&y_scale_band, &datum.y)) else {
                    continue;
                };
                x_extent.push(x);
                y_extent.push(y);
                series[slot(datum)].points.push((x, y));
            }
            if matches!(enc.mark, Mark::Line | Mark::Area) {
                for geometry in &mut series {
                    geometry.points.sort_by(|a, b| a.0.total_cmp(&b.0));
                }
            }
        }

        let include_zero = |kind: ScaleKind| kind == ScaleKind::Linear;
        let x_scale = match x_scale_band {
            Some(band) => band,
            None => Scale::continuous("x", enc.x.scale, x_extent.into_iter(), include_zero(enc.x.scale))?,
        };
        let y_scale = match y_scale_band {
            Some(band) => band,
            None => Scale::continuous("y", enc.y.scale, y_extent.into_iter(), include_zero(enc.y.scale))?,
        };
        Ok((series, x_scale, y_scale))
    }

    fn draw(&self) -> RenderResult<String> {
        let (series, x_scale, y_scale) = self.layout()?;
        let mark = self.encoding.mark;
        let x_title = self.encoding.x.axis_title();
        let y_title = self.encoding.y.axis_title();
        let x_fmt = |v: &f64| x_scale.label(*v);
        let y_fmt = |v: &f64| y_scale.label(*v);
        let label_count = |scale: &Scale| if scale.is_band() { scale.len().max(1) } else { 8 };
        let baseline = y_scale.baseline();

        let mut svg = String::new();
        {
            let root = SVGBackend::with_string(&mut svg, self.size).into_drawing_area();
            root.fill(&WHITE).map_err(draw_err)?;

            let mut builder = ChartBuilder::on(&root);
            builder.margin(16).x_label_area_size(44).y_label_area_size(60);
            if let Some(title) = &self.title {
                builder.caption(title, ("sans-serif", 20));
            }
            let mut chart = builder
                .build_cartesian_2d(x_scale.range(), y_scale.range())
                .map_err(draw_err)?;

            chart
                .configure_mesh()
                .x_desc(x_title)
                .y_desc(y_title)
                .x_labels(label_count(&x_scale))
                .y_labels(label_count(&y_scale))
                .x_label_formatter(&x_fmt)
                .y_label_formatter(&y_fmt)
                .disable_x_mesh()
                .draw()
                .map_err(draw_err)?;

            let vertical_ticks = !x_scale.is_band();
            for geometry in &series {
                let color = geometry.color;
                let anno = match mark {
                    Mark::Bar => chart.draw_series(geometry.bars.iter().map(|b| {
                        Rectangle::new([(b.x0, b.y0), (b.x1, b.y1)], color.filled())
                    })),
                    Mark::Line => chart.draw_series(LineSeries::new(
                        geometry.points.iter().copied(),
                        color.stroke_width(2),
                    )),
                    Mark::Area => chart.draw_series(
                        AreaSeries::new(
                            geometry.points.iter().copied(),
                            baseline,
                            color.mix(0.6).filled(),
                        )
                        .border_style(color.stroke_width(1)),
                    ),
                    Mark::Point => chart.draw_series(
                        geometry
                            .points
                            .iter()
                            .map(|p| Circle::new(*p, 4, color.stroke_width(2))),
                    ),
                    Mark::Circle => chart.draw_series(
                        geometry
                            .points
                            .iter()
                            .map(|p| Circle::new(*p, 4, color.filled())),
                    ),
                    Mark::Square => chart.draw_series(geometry.points.iter().map(|p| {
                        EmptyElement::at(*p) + Rectangle::new([(-4, -4), (4, 4)], color.filled())
                    })),
                    Mark::Tick => chart.draw_series(geometry.points.iter().map(|p| {
                        let stroke = if vertical_ticks {
                            vec![(0, -8), (0, 8)]
                        } else {
                            vec![(-8, 0), (8, 0)]
                        };
                        EmptyElement::at(*p) + PathElement::new(stroke, color.stroke_width(2))
                    })),
                }
                .map_err(draw_err)?;
                if let Some(name) = &geometry.name {
                    anno.label(name.clone()).legend(move |(x, y)| {
                        Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled())
                    });
                }
            }

            if series.iter().any(|s| s.name.is_some()) {
                chart
                    .configure_series_labels()
                    .position(SeriesLabelPosition::UpperRight)
                    .background_style(&WHITE.mix(0.8))
                    .border_style(&BLACK)
                    .draw()
                    .map_err(draw_err)?;
            }
            root.present().map_err(draw_err)?;
        }
        Ok(svg)
    }
}

impl ChartView for PlottersView {
    fn run(&mut self) -> RenderResult<()> {
        let svg = self.draw()?;
        debug!(bytes = svg.len(), mark = self.encoding.mark.as_str(), "Chart view finished");
        self.svg = Some(svg);
        Ok(())
    }

    fn to_svg(&self) -> RenderResult<String> {
        self.svg.clone().ok_or(RenderError::NotRun)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use crate::spec::{ChartSpec, DataBinding, ValidationPolicy};

    fn view(text: &str) -> Box<dyn ChartView> {
        let dataset = Dataset::from_csv_str(
            "cat,grp,val\na,x,1\na,y,2\nb,x,3\nb,y,-1\n",
            None,
        )
        .unwrap();
        let bound = ChartSpec::parse(text, &ValidationPolicy::default())
            .unwrap()
            .bind(&dataset, DataBinding::Named);
        PlottersEngine::default().embed(&bound).unwrap()
    }

    #[test]
    fn test_export_requires_run() {
        let mut chart = view(
            r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"cat","type":"nominal"},"y":{"field":"val","aggregate":"sum"}}}"#,
        );
        assert_eq!(chart.to_svg(), Err(RenderError::NotRun));
        chart.run().unwrap();
        let svg = chart.to_svg().unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("Sum of val"));
    }

    #[test]
    fn test_every_mark_draws() {
        for mark in ["bar", "line", "area", "point", "circle", "square", "tick"] {
            let text = format!(
                r#"{{"mark":"{mark}","title":"T","data":{{}},"encoding":{{"x":{{"field":"cat"}},"y":{{"field":"val"}},"color":{{"field":"grp"}}}}}}"#
            );
            let mut chart = view(&text);
            chart.run().unwrap();
            let svg = chart.to_svg().unwrap();
            assert!(svg.contains("<svg"), "{mark} produced no svg");
        }
    }

    #[test]
    fn test_grouped_bars_and_size() {
        let mut chart = view(
            r#"{"mark":"bar","width":300,"height":200,"data":{},"encoding":{"x":{"field":"cat"},"xOffset":{"field":"grp"},"y":{"field":"val"},"color":{"field":"grp"}}}"#,
        );
        chart.run().unwrap();
        let svg = chart.to_svg().unwrap();
        assert!(svg.contains("width=\"300\""));
        assert!(svg.contains("height=\"200\""));
    }

    #[test]
    fn test_dimension_bounds() {
        assert_eq!(dimension(Some(&serde_json::json!(320))), Some(320));
        assert_eq!(dimension(Some(&serde_json::json!("container"))), None);
        assert_eq!(dimension(Some(&serde_json::json!(0))), None);
        assert_eq!(dimension(Some(&serde_json::json!(100_000))), None);
    }
}
