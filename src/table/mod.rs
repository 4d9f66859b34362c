// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! In-memory result tables
//!
//! A [`ResultTable`] is an ordered list of rows over a shared, ordered column
//! set. Every cell is a string or missing; missing cells are what a left join
//! produces for right-only columns and are rendered as `-` after
//! postprocessing.

mod builder;
mod source;

pub use builder::TableBuilder;

use std::cmp::Ordering;
use std::collections::HashMap;

use thiserror::Error;

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("no common columns between {left:?} and {right:?}")]
    NoCommonColumns {
        left: Vec<String>,
        right: Vec<String>,
    },
}

/// How rows without a partner on the right side are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep every left row, filling right-only columns with missing values
    Left,
    /// Keep only left rows that found a partner
    Inner,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl ResultTable {
    /// Empty table with the given columns; duplicate names are collapsed
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let mut table = Self::default();
        for column in columns {
            table.ensure_column(&column.into());
        }
        table
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Index of `name`, adding it (missing in every existing row) if needed
    fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    /// Append a row given as named cells; unknown names become new columns
    /// and columns the row does not mention are missing
    pub fn push_named<K, V>(&mut self, cells: impl IntoIterator<Item = (K, V)>)
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut row: Row = vec![None; self.columns.len()];
        for (name, value) in cells {
            let idx = self.ensure_column(name.as_ref());
            if idx >= row.len() {
                row.resize(idx + 1, None);
            }
            row[idx] = Some(value.into());
        }
        self.rows.push(row);
    }

    /// Append a row already aligned with the column order
    #[cfg(test)]
    pub fn push_row(&mut self, mut row: Row) {
        row.resize(self.columns.len(), None);
        self.rows.push(row);
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Values of one column, top to bottom
    #[cfg(test)]
    pub fn column_values(&self, column: &str) -> Option<Vec<Option<&str>>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[idx].as_deref()).collect())
    }

    /// Keep rows for which `keep` returns true; returns how many were dropped
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&Row) -> bool) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| keep(row));
        before - self.rows.len()
    }

    /// Replace every missing cell with `placeholder`
    pub fn fill_missing(&mut self, placeholder: &str) {
        for cell in self.rows.iter_mut().flatten() {
            if cell.is_none() {
                *cell = Some(placeholder.to_string());
            }
        }
    }

    /// Resolve a column name exactly, then case-insensitively
    pub fn resolve_column(&self, name: &str) -> Option<usize> {
        self.column_index(name).or_else(|| {
            self.columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(name))
        })
    }

    /// Stable ascending sort by the given columns; missing values sort last.
    /// Fails without reordering when a column is unknown.
    pub fn sort_by_columns(&mut self, keys: &[String]) -> Result<(), TableError> {
        let indices = keys
            .iter()
            .map(|key| {
                self.resolve_column(key)
                    .ok_or_else(|| TableError::UnknownColumn(key.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.rows.sort_by(|a, b| {
            indices
                .iter()
                .map(|&idx| match (&a[idx], &b[idx]) {
                    (Some(x), Some(y)) => x.cmp(y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(Ordering::Equal)
        });
        Ok(())
    }

    /// Remove the named columns that exist; returns the names removed
    pub fn drop_columns(&mut self, names: &[String]) -> Vec<String> {
        let mut dropped = Vec::new();
        for name in names {
            let Some(idx) = self.column_index(name) else {
                continue;
            };
            self.columns.remove(idx);
            for row in &mut self.rows {
                row.remove(idx);
            }
            dropped.push(name.clone());
        }
        dropped
    }

    /// Natural join on every column the two tables share.
    ///
    /// Left rows keep their order; a left row with several partners fans out
    /// into one row per partner, in right-side order. Right-only columns are
    /// appended after the left columns. Missing key values match each other.
    pub fn join(&self, right: &ResultTable, kind: JoinKind) -> Result<ResultTable, TableError> {
        let keys: Vec<(usize, usize)> = self
            .columns
            .iter()
            .enumerate()
            .filter_map(|(li, name)| right.column_index(name).map(|ri| (li, ri)))
            .collect();
        if keys.is_empty() {
            return Err(TableError::NoCommonColumns {
                left: self.columns.clone(),
                right: right.columns.clone(),
            });
        }

        let right_only: Vec<usize> = (0..right.columns.len())
            .filter(|ri| !keys.iter().any(|(_, k)| k == ri))
            .collect();

        let mut index: HashMap<Vec<Option<&str>>, Vec<usize>> = HashMap::new();
        for (pos, row) in right.rows.iter().enumerate() {
            let key = keys.iter().map(|&(_, ri)| row[ri].as_deref()).collect();
            index.entry(key).or_default().push(pos);
        }

        let mut columns = self.columns.clone();
        columns.extend(right_only.iter().map(|&ri| right.columns[ri].clone()));

        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let key: Vec<Option<&str>> = keys.iter().map(|&(li, _)| row[li].as_deref()).collect();
            match index.get(&key) {
                Some(partners) => {
                    for &pos in partners {
                        let mut joined = row.clone();
                        joined.extend(right_only.iter().map(|&ri| right.rows[pos][ri].clone()));
                        rows.push(joined);
                    }
                }
                None if kind == JoinKind::Left => {
                    let mut joined = row.clone();
                    joined.resize(columns.len(), None);
                    rows.push(joined);
                }
                None => {}
            }
        }

        Ok(ResultTable { columns, rows })
    }

    /// Shared columns `join` would use
    pub fn join_keys<'a>(&'a self, right: &ResultTable) -> Vec<&'a str> {
        self.columns
            .iter()
            .filter(|c| right.has_column(c))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> ResultTable {
        let mut t = ResultTable::new(columns.iter().copied());
        for row in rows {
            t.push_row(row.iter().map(|v| v.map(String::from)).collect());
        }
        t
    }

    #[test]
    fn test_push_named_extends_columns() {
        let mut t = ResultTable::new(["name"]);
        t.push_named([("name", "a")]);
        t.push_named([("name", "b"), ("node", "n1")]);
        assert_eq!(t.columns(), &["name", "node"]);
        assert_eq!(t.value(0, "node"), None);
        assert_eq!(t.value(1, "node"), Some("n1"));
    }

    #[test]
    fn test_new_collapses_duplicates() {
        let t = ResultTable::new(["a", "b", "a"]);
        assert_eq!(t.columns(), &["a", "b"]);
    }

    #[test]
    fn test_left_join_keeps_unmatched_left_rows() {
        let pods = table(
            &["name", "namespace"],
            &[&[Some("p1"), Some("a")], &[Some("p2"), Some("b")]],
        );
        let nodes = table(&["node", "namespace"], &[&[Some("n1"), Some("a")]]);

        let joined = pods.join(&nodes, JoinKind::Left).unwrap();
        assert_eq!(joined.columns(), &["name", "namespace", "node"]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.value(0, "node"), Some("n1"));
        assert_eq!(joined.value(1, "name"), Some("p2"));
        assert_eq!(joined.value(1, "node"), None);
    }

    #[test]
    fn test_left_join_fans_out_and_drops_orphans() {
        let left = table(&["ns"], &[&[Some("a")], &[Some("b")]]);
        let right = table(
            &["ns", "svc"],
            &[
                &[Some("a"), Some("s1")],
                &[Some("c"), Some("orphan")],
                &[Some("a"), Some("s2")],
            ],
        );
        let joined = left.join(&right, JoinKind::Left).unwrap();
        let svcs = joined.column_values("svc").unwrap();
        assert_eq!(svcs, vec![Some("s1"), Some("s2"), None]);
    }

    #[test]
    fn test_inner_join_discards_unmatched() {
        let left = table(&["ns"], &[&[Some("a")], &[Some("z")]]);
        let right = table(&["ns", "x"], &[&[Some("a"), Some("1")]]);
        let joined = left.join(&right, JoinKind::Inner).unwrap();
        assert_eq!(joined.len(), 1);
    }

    #[test]
    fn test_join_on_multiple_shared_columns() {
        let left = table(&["ctx", "ns", "pod"], &[&[Some("c1"), Some("a"), Some("p")]]);
        let right = table(
            &["ns", "ctx", "quota"],
            &[&[Some("a"), Some("c2"), Some("q2")], &[Some("a"), Some("c1"), Some("q1")]],
        );
        assert_eq!(left.join_keys(&right), vec!["ctx", "ns"]);
        let joined = left.join(&right, JoinKind::Left).unwrap();
        assert_eq!(joined.column_values("quota").unwrap(), vec![Some("q1")]);
    }

    #[test]
    fn test_join_missing_keys_match_each_other() {
        let left = table(&["k", "a"], &[&[None, Some("1")]]);
        let right = table(&["k", "b"], &[&[None, Some("2")]]);
        let joined = left.join(&right, JoinKind::Left).unwrap();
        assert_eq!(joined.value(0, "b"), Some("2"));
    }

    #[test]
    fn test_join_without_common_columns_fails() {
        let left = table(&["a"], &[]);
        let right = table(&["b"], &[]);
        let err = left.join(&right, JoinKind::Left).unwrap_err();
        assert_eq!(
            err,
            TableError::NoCommonColumns {
                left: vec!["a".to_string()],
                right: vec!["b".to_string()],
            }
        );
        assert!(err.to_string().starts_with("no common columns"));
    }

    #[test]
    fn test_declared_order_reduction() {
        let a = table(&["ns", "pod"], &[&[Some("x"), Some("p1")]]);
        let b = table(&["ns", "node"], &[&[Some("x"), Some("n1")]]);
        let c = table(&["node", "zone"], &[&[Some("n1"), Some("z1")]]);

        let result = [b, c]
            .iter()
            .try_fold(a, |left, right| left.join(right, JoinKind::Left))
            .unwrap();
        assert_eq!(result.columns(), &["ns", "pod", "node", "zone"]);
        assert_eq!(result.value(0, "zone"), Some("z1"));
    }

    #[test]
    fn test_sort_is_stable_and_puts_missing_last() {
        let mut t = table(
            &["k", "id"],
            &[
                &[Some("b"), Some("1")],
                &[None, Some("2")],
                &[Some("a"), Some("3")],
                &[Some("b"), Some("4")],
            ],
        );
        t.sort_by_columns(&["k".to_string()]).unwrap();
        let ids = t.column_values("id").unwrap();
        assert_eq!(ids, vec![Some("3"), Some("1"), Some("4"), Some("2")]);
    }

    #[test]
    fn test_sort_multiple_keys_case_insensitive() {
        let mut t = table(
            &["Node", "name"],
            &[
                &[Some("n2"), Some("a")],
                &[Some("n1"), Some("b")],
                &[Some("n1"), Some("a")],
            ],
        );
        t.sort_by_columns(&["node".to_string(), "name".to_string()])
            .unwrap();
        assert_eq!(
            t.column_values("name").unwrap(),
            vec![Some("a"), Some("b"), Some("a")]
        );
        assert_eq!(t.value(0, "Node"), Some("n1"));
    }

    #[test]
    fn test_sort_unknown_column_leaves_order() {
        let mut t = table(&["k"], &[&[Some("b")], &[Some("a")]]);
        assert_eq!(
            t.sort_by_columns(&["missing".to_string()]),
            Err(TableError::UnknownColumn("missing".to_string()))
        );
        assert_eq!(t.column_values("k").unwrap(), vec![Some("b"), Some("a")]);
    }

    #[test]
    fn test_drop_columns_and_fill_missing() {
        let mut t = table(&["a", "b", "c"], &[&[Some("1"), None, Some("3")]]);
        let dropped = t.drop_columns(&["c".to_string(), "zzz".to_string()]);
        assert_eq!(dropped, vec!["c"]);
        t.fill_missing("-");
        assert_eq!(t.rows(), &[vec![Some("1".to_string()), Some("-".to_string())]]);
    }

    #[test]
    fn test_retain_rows_reports_dropped() {
        let mut t = table(&["a"], &[&[Some("1")], &[Some("2")], &[Some("3")]]);
        let dropped = t.retain_rows(|row| row[0].as_deref() != Some("2"));
        assert_eq!(dropped, 1);
        assert_eq!(t.len(), 2);
    }
}
