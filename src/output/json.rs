// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use super::{FormatOptions, OutputFormatter, QueryResult};

/// Array of row objects, keys in column order
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format(result: &QueryResult, _options: &FormatOptions) -> String {
        serde_json::to_string_pretty(&result.records()).unwrap_or_else(|_| "[]".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::tests::sample;
    use serde_json::Value;

    #[test]
    fn test_json_output() {
        let output = JsonFormatter::format(&sample(), &FormatOptions::default());
        let parsed: Value = serde_json::from_str(&output).unwrap();
        let rows = parsed.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["pod"], "db, primary");
        assert_eq!(rows[1]["namespace"], "b");
    }

    #[test]
    fn test_json_empty() {
        let result = QueryResult {
            columns: vec!["pod".to_string()],
            rows: vec![],
        };
        assert_eq!(JsonFormatter::format(&result, &FormatOptions::default()), "[]");
    }
}
