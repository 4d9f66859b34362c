// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::borrow::Cow;

use comfy_table::{Cell, Color, Table, presets::NOTHING};

use super::{FormatOptions, OutputFormatter, QueryResult};

/// Cells longer than this are cut in table mode
const MAX_CELL_WIDTH: usize = 120;

/// Column colours, repeated from the left
const COLUMN_COLORS: [Color; 5] = [
    Color::Cyan,
    Color::Green,
    Color::Magenta,
    Color::White,
    Color::Yellow,
];

/// Truncate a string to max_len chars, adding "..." if truncated
fn truncate_value(s: &str, max_len: usize) -> Cow<'_, str> {
    if s.chars().count() <= max_len {
        Cow::Borrowed(s)
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        Cow::Owned(format!("{}...", truncated))
    }
}

/// Borderless, left-aligned table with upper-cased headers
pub struct TableFormatter;

impl OutputFormatter for TableFormatter {
    fn format(result: &QueryResult, options: &FormatOptions) -> String {
        let mut table = Table::new();
        table.load_preset(NOTHING);
        if options.color {
            table.enforce_styling();
        }

        if !options.no_headers && !result.columns.is_empty() {
            table.set_header(result.columns.iter().map(|c| c.to_uppercase()));
        }

        for row in &result.rows {
            let cells = row.iter().enumerate().map(|(idx, val)| {
                let cell = Cell::new(truncate_value(val, MAX_CELL_WIDTH));
                if options.color {
                    cell.fg(COLUMN_COLORS[idx % COLUMN_COLORS.len()])
                } else {
                    cell
                }
            });
            table.add_row(cells);
        }

        table
            .lines()
            .map(|line| line.trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
