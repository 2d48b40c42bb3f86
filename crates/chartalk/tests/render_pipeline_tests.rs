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

use chartalk::prompt::default_examples;
use chartalk::{
    ArtifactStore, ChartRenderer, ChartalkError, DataBinding, Dataset, PlottersEngine,
    RenderError, ValidationPolicy,
};
use std::sync::Arc;

fn renderer(binding: DataBinding) -> ChartRenderer {
    ChartRenderer::new(
        Arc::new(PlottersEngine::new(480, 320)),
        ValidationPolicy::default(),
        binding,
    )
}

fn svg_of(artifacts: &ArtifactStore, chart: &chartalk::RenderedChart) -> String {
    artifacts
        .get(&chart.artifact)
        .and_then(|a| a.as_svg())
        .unwrap()
        .to_string()
}

#[test]
fn test_default_examples_render_against_matching_data() {
    let cars = Dataset::from_csv_str(
        "cylinders,horsepower,weight\n4,95,2372\n6,105,2833\n8,150,3433\n4,88,2130\n8,165,3693\n",
        Some("cars.csv"),
    )
    .unwrap();
    let grouped = Dataset::from_csv_str(
        "category,group,value\nA,g1,3\nA,g2,4\nB,g1,1\nB,g2,6\n",
        Some("grouped.csv"),
    )
    .unwrap();

    for binding in [DataBinding::Inline, DataBinding::Named] {
        let renderer = renderer(binding);
        let mut artifacts = ArtifactStore::new();
        for example in default_examples() {
            let dataset = if example.schema.contains("category") {
                &grouped
            } else {
                &cars
            };
            let text = example.spec.to_string();
            let chart = renderer.render(&text, dataset, &mut artifacts).unwrap();
            assert!(chart.description.is_some());
            assert!(svg_of(&artifacts, &chart).contains("<svg"));
        }
        assert_eq!(artifacts.len(), 3);
    }
}

#[test]
fn test_temporal_line_with_series_legend() {
    let dataset = Dataset::from_csv_str(
        "month,region,sales\n2024-01,north,10\n2024-02,north,12\n2024-01,south,7\n2024-02,south,9\n",
        None,
    )
    .unwrap();
    let spec = r#"{
        "mark": {"type": "line"},
        "title": {"text": "Monthly sales"},
        "data": {"name": "dataset"},
        "encoding": {
            "x": {"field": "month", "type": "temporal"},
            "y": {"field": "sales", "type": "quantitative", "axis": {"title": "Units"}},
            "color": {"field": "region"},
        },
    }"#;
    let mut artifacts = ArtifactStore::new();
    let chart = renderer(DataBinding::Inline)
        .render(spec, &dataset, &mut artifacts)
        .unwrap();
    let svg = svg_of(&artifacts, &chart);
    assert!(svg.contains("Monthly sales"));
    assert!(svg.contains("Units"));
    assert!(svg.contains("north"));
    assert!(svg.contains("south"));
    assert_eq!(chart.description, None);
}

#[test]
fn test_count_bar_without_field() {
    let dataset = Dataset::from_csv_str("fruit\napple\npear\napple\n", None).unwrap();
    let spec = r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"fruit"},"y":{"aggregate":"count"}}}"#;
    let mut artifacts = ArtifactStore::new();
    let chart = renderer(DataBinding::Inline)
        .render(spec, &dataset, &mut artifacts)
        .unwrap();
    assert!(svg_of(&artifacts, &chart).contains("Count of Records"));
}

#[test]
fn test_unsupported_aggregate_is_render_error() {
    let dataset = Dataset::from_csv_str("k,v\na,1\n", None).unwrap();
    let spec = r#"{"mark":"bar","data":{},"encoding":{"x":{"field":"k"},"y":{"field":"v","aggregate":"stdev"}}}"#;
    let mut artifacts = ArtifactStore::new();
    let err = renderer(DataBinding::Inline)
        .render(spec, &dataset, &mut artifacts)
        .unwrap_err();
    assert!(matches!(
        err,
        ChartalkError::Render(RenderError::UnsupportedAggregate(ref name)) if name == "stdev"
    ));
    assert!(artifacts.is_empty());
}

#[test]
fn test_overflowing_axis_range_is_render_error() {
    let dataset = Dataset::from_csv_str("x,y\n-1e308,1e308\n1e308,-1e308\n", None).unwrap();
    let spec = r#"{"mark":"point","data":{},"encoding":{"x":{"field":"x","type":"quantitative"},"y":{"field":"y","type":"quantitative"}}}"#;
    let mut artifacts = ArtifactStore::new();
    let err = renderer(DataBinding::Inline)
        .render(spec, &dataset, &mut artifacts)
        .unwrap_err();
    assert!(matches!(
        err,
        ChartalkError::Render(RenderError::UnboundedScale(_))
    ));
    assert!(artifacts.is_empty());
}
