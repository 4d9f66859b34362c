// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod csv;
mod json;
mod table;
mod yaml;

pub use csv::CsvFormatter;
pub use json::JsonFormatter;
pub use table::TableFormatter;
pub use yaml::YamlFormatter;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::cli::OutputFormat;
use crate::table::ResultTable;

/// Rendering switches shared by all formatters
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    pub no_headers: bool,
    /// Colour table cells per column
    pub color: bool,
}

pub trait OutputFormatter {
    fn format(result: &QueryResult, options: &FormatOptions) -> String;
}

/// A result table flattened to display strings
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl From<&ResultTable> for QueryResult {
    fn from(table: &ResultTable) -> Self {
        Self {
            columns: table.columns().to_vec(),
            rows: table
                .rows()
                .iter()
                .map(|row| row.iter().map(|v| v.clone().unwrap_or_default()).collect())
                .collect(),
        }
    }
}

impl QueryResult {
    pub fn format(&self, format: &OutputFormat, no_headers: bool) -> String {
        let options = FormatOptions {
            no_headers,
            color: matches!(format, OutputFormat::Color) && console::colors_enabled(),
        };
        match format {
            OutputFormat::Color | OutputFormat::Plain => TableFormatter::format(self, &options),
            OutputFormat::Json => JsonFormatter::format(self, &options),
            OutputFormat::Yaml => YamlFormatter::format(self, &options),
            OutputFormat::Csv => CsvFormatter::format(self, &options),
        }
    }

    /// Rows as column-ordered maps, for JSON and YAML
    fn records(&self) -> Vec<Record<'_>> {
        self.rows
            .iter()
            .map(|values| Record {
                columns: &self.columns,
                values,
            })
            .collect()
    }
}

/// One row serialized as a map in column order
struct Record<'a> {
    columns: &'a [String],
    values: &'a [String],
}

impl Serialize for Record<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
