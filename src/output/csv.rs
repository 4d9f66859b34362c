// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use super::{FormatOptions, OutputFormatter, QueryResult};

pub struct CsvFormatter;

impl OutputFormatter for CsvFormatter {
    fn format(result: &QueryResult, options: &FormatOptions) -> String {
        let mut lines = Vec::with_capacity(result.rows.len() + 1);

        if !options.no_headers {
            lines.push(csv_line(&result.columns));
        }
        for row in &result.rows {
            lines.push(csv_line(row));
        }

        lines.join("\n")
    }
}

fn csv_line(values: &[String]) -> String {
    values
        .iter()
        .map(|v| escape_csv(v))
        .collect::<Vec<_>>()
        .join(",")
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
