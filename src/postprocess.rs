// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Cleanup of a combined result before display
//!
//! Steps run in a fixed order: namespace filter, field filters, missing-value
//! fill, sort, pattern filter, column projection. Misconfigured filters and
//! sorts are logged and skipped; they never fail the run.

use regex::Regex;
use tracing::{debug, warn};

use crate::config::QueryDef;
use crate::table::ResultTable;

/// Display value for cells a join left empty
pub const MISSING: &str = "-";

const NAMESPACE_COLUMN: &str = "namespace";

/// User-supplied postprocessing inputs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostprocessOptions {
    /// Free-text patterns, any column may match
    pub patterns: Vec<String>,
    /// `column=pattern` filters
    pub filters: Vec<String>,
    pub namespaces: Vec<String>,
    /// Sort keys overriding the configured ones; entries may be comma-joined
    pub sort: Vec<String>,
    /// Columns to show; entries may be comma-joined
    pub columns: Vec<String>,
}

impl PostprocessOptions {
    /// These options plus the namespaces, filters and patterns a query
    /// declares for itself
    pub fn with_query_defaults(&self, query: Option<&QueryDef>) -> Self {
        let mut options = self.clone();
        if let Some(query) = query {
            extend_unique(&mut options.namespaces, &query.namespaces);
            extend_unique(&mut options.filters, &query.filters);
            extend_unique(&mut options.patterns, &query.patterns);
        }
        options
    }
}

fn extend_unique(target: &mut Vec<String>, extra: &[String]) {
    for value in extra {
        if !target.contains(value) {
            target.push(value.clone());
        }
    }
}

/// Flatten repeated and comma-joined values into one list
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}

/// Run every postprocessing step over `table`
///
/// `default_sort` and `hide` come from the table or query definition.
pub fn postprocess(
    mut table: ResultTable,
    options: &PostprocessOptions,
    default_sort: &[String],
    hide: &[String],
) -> ResultTable {
    filter_namespaces(&mut table, &options.namespaces);

    for filter in &options.filters {
        apply_field_filter(&mut table, filter);
    }

    table.fill_missing(MISSING);

    let sort_keys = if options.sort.is_empty() {
        split_list(default_sort)
    } else {
        split_list(&options.sort)
    };
    if !sort_keys.is_empty()
        && let Err(e) = table.sort_by_columns(&sort_keys)
    {
        warn!(sort = ?sort_keys, error = %e, "Could not sort, keeping order");
    }

    filter_patterns(&mut table, &options.patterns);

    project_columns(&mut table, &options.columns, hide);

    table
}

/// Keep rows whose namespace is in `namespaces`; a no-op without a
/// namespace column
pub fn filter_namespaces(table: &mut ResultTable, namespaces: &[String]) {
    if namespaces.is_empty() {
        return;
    }
    let Some(idx) = table.column_index(NAMESPACE_COLUMN) else {
        return;
    };
    debug!(namespaces = ?namespaces, "Limiting to namespaces");
    let dropped = table.retain_rows(|row| {
        row[idx]
            .as_deref()
            .is_some_and(|ns| namespaces.iter().any(|n| n == ns))
    });
    debug!(dropped, "Dropped rows outside the namespaces");
}

/// Loose regex: the pattern itself, or its literal text when it does not
/// compile
fn loose_regex(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .or_else(|_| Regex::new(&regex::escape(pattern)))
        .ok()
}

/// `column=pattern`: drop rows whose column does not contain the pattern.
/// Nothing is dropped when the column is absent or no row matches at all.
fn apply_field_filter(table: &mut ResultTable, filter: &str) {
    let Some((key, pattern)) = filter.split_once('=') else {
        warn!(filter = %filter, "Ignoring filter without '='");
        return;
    };
    let key = key.trim().to_lowercase();
    let Some(idx) = table.resolve_column(&key) else {
        warn!(column = %key, "Ignoring filter on unknown column");
        return;
    };
    let Some(regex) = loose_regex(pattern) else {
        warn!(pattern = %pattern, "Ignoring filter with unusable pattern");
        return;
    };

    debug!(column = %key, pattern = %pattern, "Filtering on column");
    let matches = |row: &Vec<Option<String>>| row[idx].as_deref().is_some_and(|v| regex.is_match(v));
    if !table.rows().iter().any(matches) {
        warn!(column = %key, pattern = %pattern, "Filter matches no row, ignoring it");
        return;
    }
    let dropped = table.retain_rows(matches);
    debug!(dropped, column = %key, "Dropped rows not matching filter");
}

/// Keep rows where any cell matches any pattern
///
/// Each pattern that is not a valid regex is matched as a literal.
fn filter_patterns(table: &mut ResultTable, patterns: &[String]) {
    if patterns.is_empty() {
        return;
    }
    let regexes: Vec<Regex> = patterns.iter().filter_map(|p| loose_regex(p)).collect();
    if regexes.is_empty() {
        warn!(patterns = ?patterns, "Ignoring unusable patterns");
        return;
    }

    let dropped = table.retain_rows(|row| {
        row.iter()
            .flatten()
            .any(|cell| regexes.iter().any(|regex| regex.is_match(cell)))
    });
    debug!(dropped, patterns = ?patterns, "Dropped rows not matching patterns");
}

/// Hide columns not in `show` (when given) and every column in `hide`
fn project_columns(table: &mut ResultTable, show: &[String], hide: &[String]) {
    let mut drop: Vec<String> = Vec::new();

    let show: Vec<String> = split_list(show).iter().map(|c| c.to_lowercase()).collect();
    if !show.is_empty() {
        debug!(columns = ?show, "Limiting columns");
        drop.extend(
            table
                .columns()
                .iter()
                .filter(|c| !show.contains(&c.to_lowercase()))
                .cloned(),
        );
    }
    drop.extend(hide.iter().cloned());

    if !drop.is_empty() {
        let dropped = table.drop_columns(&drop);
        debug!(columns = ?dropped, "Dropped columns");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn pods() -> ResultTable {
        let mut t = ResultTable::new(["pod", "namespace", "node"]);
        t.push_named([("pod", "web-1"), ("namespace", "a"), ("node", "n2")]);
        t.push_named([("pod", "db-1"), ("namespace", "b"), ("node", "n1")]);
        t.push_named([("pod", "web-2"), ("namespace", "a")]);
        t.push_named([("pod", "cache"), ("namespace", "c"), ("node", "n1")]);
        t
    }

    fn column(t: &ResultTable, name: &str) -> Vec<String> {
        t.column_values(name)
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or("<missing>").to_string())
            .collect()
    }

    #[test]
    fn test_namespace_filter_is_idempotent() {
        let mut once = pods();
        filter_namespaces(&mut once, &strings(&["a"]));
        assert_eq!(column(&once, "pod"), vec!["web-1", "web-2"]);

        let mut twice = once.clone();
        filter_namespaces(&mut twice, &strings(&["a"]));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_namespace_filter_without_column_is_noop() {
        let mut t = ResultTable::new(["node"]);
        t.push_named([("node", "n1")]);
        filter_namespaces(&mut t, &strings(&["a"]));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_field_filter() {
        let options = PostprocessOptions {
            filters: strings(&["POD=web"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &[], &[]);
        assert_eq!(column(&t, "pod"), vec!["web-1", "web-2"]);
    }

    #[test]
    fn test_field_filter_regex_and_literal_fallback() {
        let mut t = pods();
        apply_field_filter(&mut t, "pod=^web-[2-9]$");
        assert_eq!(column(&t, "pod"), vec!["web-2"]);

        let mut t = ResultTable::new(["image"]);
        t.push_named([("image", "nginx:1.25(beta")]);
        t.push_named([("image", "envoy:v1")]);
        apply_field_filter(&mut t, "image=1.25(");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_field_filter_on_absent_column_is_noop() {
        let mut t = pods();
        apply_field_filter(&mut t, "zone=eu");
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_field_filter_matching_nothing_is_noop() {
        let mut t = pods();
        apply_field_filter(&mut t, "pod=nothing-like-this");
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_field_filter_skips_missing_cells() {
        let mut t = pods();
        apply_field_filter(&mut t, "node=n");
        assert_eq!(column(&t, "pod"), vec!["web-1", "db-1", "cache"]);
    }

    #[test]
    fn test_missing_values_become_dash() {
        let t = postprocess(pods(), &PostprocessOptions::default(), &[], &[]);
        assert_eq!(t.value(2, "node"), Some(MISSING));
    }

    #[test]
    fn test_sort_override_beats_configured_sort() {
        let options = PostprocessOptions {
            sort: strings(&["node,pod"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &strings(&["namespace"]), &[]);
        assert_eq!(column(&t, "pod"), vec!["web-2", "cache", "db-1", "web-1"]);

        let t = postprocess(pods(), &PostprocessOptions::default(), &strings(&["namespace"]), &[]);
        assert_eq!(column(&t, "pod"), vec!["web-1", "web-2", "db-1", "cache"]);
    }

    #[test]
    fn test_missing_values_sort_as_dash() {
        let mut t = ResultTable::new(["pod", "node"]);
        t.push_named([("pod", "a"), ("node", "n1")]);
        t.push_named([("pod", "b")]);
        t.push_named([("pod", "c"), ("node", "+n0")]);
        let options = PostprocessOptions {
            sort: strings(&["node"]),
            ..Default::default()
        };
        let t = postprocess(t, &options, &[], &[]);
        // '+' < '-' < 'n'
        assert_eq!(column(&t, "pod"), vec!["c", "b", "a"]);
        assert_eq!(column(&t, "node"), vec!["+n0", MISSING, "n1"]);
    }

    #[test]
    fn test_sort_on_unknown_column_keeps_order() {
        let options = PostprocessOptions {
            sort: strings(&["zone"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &[], &[]);
        assert_eq!(column(&t, "pod"), vec!["web-1", "db-1", "web-2", "cache"]);
    }

    #[test]
    fn test_pattern_filter_keeps_sorted_order() {
        let options = PostprocessOptions {
            patterns: strings(&["web", "cache"]),
            sort: strings(&["pod"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &[], &[]);
        assert_eq!(column(&t, "pod"), vec!["cache", "web-1", "web-2"]);
    }

    #[test]
    fn test_invalid_pattern_does_not_disable_valid_ones() {
        let mut t = pods();
        filter_patterns(&mut t, &strings(&["^web", "("]));
        assert_eq!(column(&t, "pod"), vec!["web-1", "web-2"]);

        let mut t = ResultTable::new(["image"]);
        t.push_named([("image", "nginx:1.25(beta")]);
        t.push_named([("image", "envoy:v1")]);
        t.push_named([("image", "web:2")]);
        filter_patterns(&mut t, &strings(&["^web", "1.25("]));
        assert_eq!(column(&t, "image"), vec!["nginx:1.25(beta", "web:2"]);
    }

    #[test]
    fn test_pattern_matches_any_column() {
        let mut t = pods();
        filter_patterns(&mut t, &strings(&["n2"]));
        assert_eq!(column(&t, "pod"), vec!["web-1"]);
    }

    #[test]
    fn test_projection() {
        let options = PostprocessOptions {
            columns: strings(&["POD", "node,namespace"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &[], &strings(&["node"]));
        assert_eq!(t.columns(), &["pod", "namespace"]);
    }

    #[test]
    fn test_hide_ignores_absent_columns() {
        let t = postprocess(pods(), &PostprocessOptions::default(), &[], &strings(&["node", "zone"]));
        assert_eq!(t.columns(), &["pod", "namespace"]);
    }

    #[test]
    fn test_empty_result_is_fine() {
        let options = PostprocessOptions {
            patterns: strings(&["nothing"]),
            ..Default::default()
        };
        let t = postprocess(pods(), &options, &[], &[]);
        assert!(t.is_empty());
        assert_eq!(t.columns().len(), 3);
    }

    #[test]
    fn test_query_defaults_are_added() {
        let base = PostprocessOptions {
            namespaces: strings(&["a"]),
            ..Default::default()
        };
        let query = QueryDef {
            namespaces: strings(&["a", "kube-system"]),
            filters: strings(&["phase=Running"]),
            ..Default::default()
        };
        let options = base.with_query_defaults(Some(&query));
        assert_eq!(options.namespaces, strings(&["a", "kube-system"]));
        assert_eq!(options.filters, strings(&["phase=Running"]));
        assert_eq!(base.with_query_defaults(None), base);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(
            split_list(&strings(&["a,b", " c ", "", "d,,e"])),
            strings(&["a", "b", "c", "d", "e"])
        );
    }
}
