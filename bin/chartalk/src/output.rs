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

use anyhow::{Context, Result};
use chartalk::{ChatSession, Turn, TurnContent};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Mirrors the session into a directory: `index.html` plus one
/// `chart-N.svg` per chart turn still in the transcript.
#[derive(Debug, Clone)]
pub struct PageWriter {
    dir: PathBuf,
}

impl PageWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, session: &ChatSession) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        self.remove_stale_charts()?;

        let index = self.dir.join("index.html");
        fs::write(&index, session.render_page())
            .with_context(|| format!("Failed to write {}", index.display()))?;

        let mut charts = Vec::new();
        let ids = session.transcript().turns().iter().filter_map(|turn| match &turn.content {
            TurnContent::Chart { artifact, .. } => Some(*artifact),
            _ => None,
        });
        for (n, id) in ids.enumerate() {
            let Some(svg) = session.artifacts().get(&id).and_then(|a| a.as_svg()) else {
                continue;
            };
            let path = self.dir.join(format!("chart-{}.svg", n + 1));
            fs::write(&path, svg).with_context(|| format!("Failed to write {}", path.display()))?;
            charts.push(path);
        }
        debug!(dir = %self.dir.display(), charts = charts.len(), "Wrote session page");
        Ok(charts)
    }

    fn remove_stale_charts(&self) -> Result<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let stale = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("chart-") && n.ends_with(".svg"));
            if stale {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

pub fn print_turns(turns: &[Turn]) {
    for turn in turns {
        println!("{}", turn.to_plain_text());
    }
}

pub fn print_alerts(alerts: Vec<String>) {
    for alert in alerts {
        eprintln!("alert: {alert}");
    }
}
