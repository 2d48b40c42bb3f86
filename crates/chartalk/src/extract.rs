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

//! Locates chart specification candidates inside free-form model replies.
//!
//! Fenced ```` ```json ```` blocks are preferred. Without any, the span from
//! the first `{` to the last `}` is taken as a single candidate. That span is
//! a heuristic: stray braces in surrounding prose widen it and the result may
//! not parse. Validation downstream decides.

use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    Fenced,
    BraceSpan,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub segments: Vec<String>,
    pub strategy: ExtractionStrategy,
    /// Reply text left once the candidate segments are cut out, trimmed.
    pub prose: String,
}

impl Extraction {
    pub fn has_segments(&self) -> bool {
        !self.segments.is_empty()
    }
}

fn fenced_json_regex() -> &'static Regex {
    static FENCED: OnceLock<Regex> = OnceLock::new();
    FENCED.get_or_init(|| Regex::new(r"(?is)```json(.*?)```").expect("fence pattern is valid"))
}

pub fn extract_segments(text: &str) -> Extraction {
    let fenced = fenced_json_regex();
    let mut segments = Vec::new();
    let mut prose = String::new();
    let mut last = 0;
    for caps in fenced.captures_iter(text) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        segments.push(inner.as_str().trim().to_string());
        prose.push_str(&text[last..whole.start()]);
        last = whole.end();
    }
    if !segments.is_empty() {
        prose.push_str(&text[last..]);
        debug!(count = segments.len(), "Extracted fenced JSON segments");
        return Extraction {
            segments,
            strategy: ExtractionStrategy::Fenced,
            prose: prose.trim().to_string(),
        };
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            debug!(start, end, "Falling back to brace span extraction");
            let prose = format!("{}{}", &text[..start], &text[end + 1..]);
            return Extraction {
                segments: vec![text[start..=end].to_string()],
                strategy: ExtractionStrategy::BraceSpan,
                prose: prose.trim().to_string(),
            };
        }
    }

    Extraction {
        segments: Vec::new(),
        strategy: ExtractionStrategy::None,
        prose: text.trim().to_string(),
    }
}

/// Tolerant preprocessing applied before parsing. Only two repairs are made:
/// residual fence markers around the segment are stripped, and a comma that
/// directly precedes `}` or `]` outside a string literal is dropped.
pub fn repair_json(segment: &str) -> String {
    drop_trailing_commas(strip_fences(segment))
}

fn strip_fences(segment: &str) -> &str {
    let mut text = segment.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
        if text.len() >= 4 && text[..4].eq_ignore_ascii_case("json") {
            text = &text[4..];
        }
    }
    text.strip_suffix("```").unwrap_or(text).trim()
}

fn drop_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_single_fenced_block() {
        let text = "Here you go:\n```json\n{\"mark\": \"bar\"}\n```\nEnjoy.";
        let extraction = extract_segments(text);
        assert_eq!(extraction.strategy, ExtractionStrategy::Fenced);
        assert_eq!(extraction.segments, vec!["{\"mark\": \"bar\"}"]);
        assert_eq!(extraction.prose, "Here you go:\n\nEnjoy.");
    }

    #[test]
    fn test_multiple_blocks_in_order() {
        let text = "```json\n{\"a\":1}\n```\ntext\n```JSON\n{\"b\":2}\n```";
        let extraction = extract_segments(text);
        assert_eq!(extraction.segments, vec!["{\"a\":1}", "{\"b\":2}"]);
        assert_eq!(extraction.prose, "text");
    }

    #[test]
    fn test_brace_span_fallback() {
        let text = "The chart is {\"mark\": {\"type\": \"bar\"}} as requested";
        let extraction = extract_segments(text);
        assert_eq!(extraction.strategy, ExtractionStrategy::BraceSpan);
        assert_eq!(extraction.segments, vec!["{\"mark\": {\"type\": \"bar\"}}"]);
        assert_eq!(extraction.prose, "The chart is  as requested");
    }

    #[test]
    fn test_brace_span_is_greedy() {
        let text = "{a} and {b}";
        let extraction = extract_segments(text);
        assert_eq!(extraction.segments, vec!["{a} and {b}"]);
    }

    #[test]
    fn test_no_candidates() {
        let extraction = extract_segments("  No chart for that question. } {  ");
        assert_eq!(extraction.strategy, ExtractionStrategy::None);
        assert!(!extraction.has_segments());
        assert_eq!(extraction.prose, "No chart for that question. } {");
    }

    #[test]
    fn test_trailing_comma_repair() {
        let repaired = repair_json("{\"mark\":\"bar\",}");
        let parsed: Value = serde_json::from_str(&repaired).unwrap();
        let expected: Value = serde_json::from_str("{\"mark\":\"bar\"}").unwrap();
        assert_eq!(parsed, expected);

        let repaired = repair_json("{\"v\": [1, 2, ],\n}");
        assert_eq!(repaired, "{\"v\": [1, 2 ]\n}");
    }

    #[test]
    fn test_commas_inside_strings_survive() {
        let repaired = repair_json(r#"{"title": "a,}", "q": "x\",]"}"#);
        assert_eq!(repaired, r#"{"title": "a,}", "q": "x\",]"}"#);
    }

    #[test]
    fn test_fence_markers_stripped() {
        assert_eq!(repair_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(repair_json("```\n[1,]\n```"), "[1]");
    }
}
