// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Row expansion: one row per combination of a record's field values

use super::field::ColumnValue;

/// Column name and value pairs for one expanded row, in column order
pub type ExpandedRow = Vec<(String, String)>;

/// Cartesian product over the extracted fields of a single record.
///
/// Cheap to create; rows are produced lazily by [`Expansion::iter`], which can
/// be called any number of times.
pub struct Expansion<'a> {
    fields: &'a [(String, ColumnValue)],
}

impl<'a> Expansion<'a> {
    pub fn new(fields: &'a [(String, ColumnValue)]) -> Self {
        Self { fields }
    }

    /// Number of rows the product yields
    pub fn len(&self) -> usize {
        self.fields.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> ExpansionIter<'a> {
        ExpansionIter {
            fields: self.fields,
            indices: vec![0; self.fields.len()],
            done: self.is_empty(),
        }
    }
}

impl<'a> IntoIterator for &Expansion<'a> {
    type Item = ExpandedRow;
    type IntoIter = ExpansionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Odometer over the per-field value indices; the last field varies fastest
#[derive(Clone)]
pub struct ExpansionIter<'a> {
    fields: &'a [(String, ColumnValue)],
    indices: Vec<usize>,
    done: bool,
}

impl ExpansionIter<'_> {
    fn current_row(&self) -> ExpandedRow {
        let mut row: ExpandedRow = Vec::with_capacity(self.fields.len());
        for ((name, value), &idx) in self.fields.iter().zip(&self.indices) {
            match value {
                ColumnValue::Flat(values) => set_cell(&mut row, name, &values[idx]),
                ColumnValue::Records(records) => {
                    for (sub, value) in &records[idx] {
                        set_cell(&mut row, sub, value);
                    }
                }
            }
        }
        row
    }

    fn advance(&mut self) {
        for pos in (0..self.indices.len()).rev() {
            self.indices[pos] += 1;
            if self.indices[pos] < self.fields[pos].1.len() {
                return;
            }
            self.indices[pos] = 0;
        }
        self.done = true;
    }
}

/// Later writes to the same column replace earlier ones
fn set_cell(row: &mut ExpandedRow, name: &str, value: &str) {
    match row.iter_mut().find(|(existing, _)| existing == name) {
        Some(cell) => cell.1 = value.to_string(),
        None => row.push((name.to_string(), value.to_string())),
    }
}

impl Iterator for ExpansionIter<'_> {
    type Item = ExpandedRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let row = self.current_row();
        self.advance();
        Some(row)
    }
}
