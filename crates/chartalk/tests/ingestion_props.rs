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

use chartalk::preview::{render_table, NO_DATA_PLACEHOLDER};
use chartalk::{Dataset, FileSource};
use proptest::prelude::*;
use std::io::Write;

fn header_and_rows() -> impl Strategy<Value = (Vec<String>, Vec<Vec<String>>)> {
    prop::collection::btree_set("c_[a-z]{1,6}", 1..6).prop_flat_map(|names| {
        let header: Vec<String> = names.into_iter().collect();
        let width = header.len();
        let rows = prop::collection::vec(prop::collection::vec("[a-z0-9]{1,5}", width), 0..20);
        (Just(header), rows)
    })
}

proptest! {
    #[test]
    fn rows_keep_header_keys_and_order((header, rows) in header_and_rows()) {
        let mut text = format!("row_no,{}\n", header.join(","));
        for (i, row) in rows.iter().enumerate() {
            text.push_str(&format!("{i},{}\n", row.join(",")));
        }

        let dataset = Dataset::from_csv_str(&text, None).unwrap();
        prop_assert_eq!(dataset.len(), rows.len());

        let mut expected_keys = vec!["row_no".to_string()];
        expected_keys.extend(header.iter().cloned());
        prop_assert_eq!(dataset.columns(), expected_keys.as_slice());
        for (i, row) in dataset.rows().iter().enumerate() {
            let keys: Vec<&String> = row.keys().collect();
            prop_assert_eq!(keys, expected_keys.iter().collect::<Vec<_>>());
            prop_assert_eq!(row["row_no"].as_f64(), Some(i as f64));
        }

        let table = render_table(&dataset);
        if rows.is_empty() {
            prop_assert_eq!(table, NO_DATA_PLACEHOLDER);
        } else {
            prop_assert_eq!(table.matches("<tr>").count(), rows.len() + 1);
        }
    }
}

#[test]
fn test_file_source_from_path() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "name,score").unwrap();
    writeln!(file, "ada,3").unwrap();
    writeln!(file, "bob").unwrap();

    let source = FileSource::from_path(file.path()).unwrap();
    assert_eq!(source.media_type.as_deref(), Some("text/csv"));
    assert!(source.is_csv_like());

    let dataset = Dataset::from_file(&source).unwrap();
    assert_eq!(dataset.len(), 2);
    assert!(dataset.rows()[1]["score"].is_null());
}
