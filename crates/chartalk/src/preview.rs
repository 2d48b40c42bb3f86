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

use crate::dataset::Dataset;
use htmlescape::encode_minimal;
use std::fmt::Write;

pub const NO_DATA_PLACEHOLDER: &str = "<p>No data to preview.</p>";

/// Rebuilds the preview table from scratch. Header cells come from the keys
/// of the first record.
pub fn render_table(dataset: &Dataset) -> String {
    let Some(first) = dataset.rows().first() else {
        return NO_DATA_PLACEHOLDER.to_string();
    };
    let mut html = String::from("<table>\n<thead>\n<tr>");
    for key in first.keys() {
        let _ = write!(html, "<th>{}</th>", encode_minimal(key));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for row in dataset.rows() {
        html.push_str("<tr>");
        for value in row.values() {
            let _ = write!(html, "<td>{}</td>", encode_minimal(&value.to_string()));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>");
    html
}

#[derive(Debug, Clone)]
pub struct PreviewPanel {
    visible: bool,
    html: String,
}

impl Default for PreviewPanel {
    fn default() -> Self {
        Self {
            visible: false,
            html: NO_DATA_PLACEHOLDER.to_string(),
        }
    }
}

impl PreviewPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&mut self, dataset: &Dataset) {
        self.html = render_table(dataset);
    }

    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn html(&self) -> &str {
        &self.html
    }
}
