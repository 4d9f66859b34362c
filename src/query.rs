// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Query evaluation: build the constituent tables and left-join them
//!
//! A query's tables are joined left to right on the columns they share.
//! Requested namespaces act as an extra first table holding only those
//! namespaces, so rows from other namespaces never enter the join.

use tracing::{debug, error};

use crate::config::{Catalog, Target};
use crate::error::{QueryError, Result};
use crate::postprocess::{PostprocessOptions, postprocess};
use crate::table::{JoinKind, ResultTable, TableBuilder, TableError};

pub struct QueryCombiner<'a> {
    catalog: &'a Catalog,
    builder: TableBuilder<'a>,
}

impl<'a> QueryCombiner<'a> {
    pub fn new(catalog: &'a Catalog, builder: TableBuilder<'a>) -> Self {
        Self { catalog, builder }
    }

    /// Combined, postprocessed result for one target
    ///
    /// `options` are the invocation-wide inputs; a query's own namespaces,
    /// filters and patterns are added to them.
    pub async fn evaluate(&self, target: &Target, options: &PostprocessOptions) -> ResultTable {
        let options = match target {
            Target::Query(name) => options.with_query_defaults(self.catalog.query(name)),
            _ => options.clone(),
        };
        let table = self.resolve(target, &options.namespaces).await;
        let (sort, hide) = self.catalog.presentation(target);
        postprocess(table, &options, sort, hide)
    }

    /// Combined result for one target before postprocessing; failures are
    /// logged and give an empty table
    pub async fn resolve(&self, target: &Target, namespaces: &[String]) -> ResultTable {
        debug!(target = %target.name(), "Loading data");
        match self.try_resolve(target, namespaces).await {
            Ok(table) => {
                debug!(target = %target.name(), rows = table.len(), "Combined data");
                table
            }
            Err(e) => {
                error!(target = %target.name(), error = %e, "Query yields no rows");
                ResultTable::default()
            }
        }
    }

    async fn try_resolve(&self, target: &Target, namespaces: &[String]) -> Result<ResultTable> {
        match target {
            Target::Catalog(kind) => Ok(self
                .catalog
                .as_table(*kind, self.builder.default_contexts())),
            Target::Table(name) => {
                let def = self
                    .catalog
                    .table(name)
                    .ok_or_else(|| QueryError::config(name, "no such table"))?;
                Ok(self.builder.build(def).await)
            }
            Target::Query(name) => {
                let Some(query) = self.catalog.query(name) else {
                    // a table name stands in as a single-table query
                    let def = self
                        .catalog
                        .table(name)
                        .ok_or_else(|| QueryError::config(name, "no such query or table"))?;
                    return Ok(self.builder.build(def).await);
                };
                if query.tables.is_empty() {
                    return Err(QueryError::config(name, "query lists no tables"));
                }

                let defs = query
                    .tables
                    .iter()
                    .map(|table| {
                        self.catalog.table(table).ok_or_else(|| {
                            QueryError::config(name, format!("references undefined table '{}'", table))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;

                let mut tables = Vec::with_capacity(defs.len());
                for def in defs {
                    tables.push(self.builder.build(def).await);
                }

                join_tables(&query.tables, tables, namespaces)
            }
        }
    }
}

/// Left-join `tables` in order, anchored on `namespaces` when the first
/// table has a namespace column
pub fn join_tables(
    names: &[String],
    tables: Vec<ResultTable>,
    namespaces: &[String],
) -> Result<ResultTable> {
    let join_error = |source: TableError| QueryError::Join {
        tables: names.to_vec(),
        source,
    };

    let mut tables = tables.into_iter();
    let Some(first) = tables.next() else {
        return Ok(ResultTable::default());
    };

    let mut result = match namespace_anchor(namespaces) {
        Some(anchor) if first.has_column("namespace") => {
            debug!(namespaces = ?namespaces, "Anchoring join on namespaces");
            anchor.join(&first, JoinKind::Inner).map_err(join_error)?
        }
        _ => first,
    };

    for right in tables {
        let keys = result.join_keys(&right);
        if keys.len() > 1 {
            debug!(keys = ?keys, "Joining on more than one shared column");
        }
        result = result.join(&right, JoinKind::Left).map_err(join_error)?;
    }

    Ok(result)
}

fn namespace_anchor(namespaces: &[String]) -> Option<ResultTable> {
    if namespaces.is_empty() {
        return None;
    }
    let mut anchor = ResultTable::new(["namespace"]);
    let mut seen: Vec<&str> = Vec::new();
    for ns in namespaces {
        if !seen.contains(&ns.as_str()) {
            seen.push(ns);
            anchor.push_named([("namespace", ns.as_str())]);
        }
    }
    Some(anchor)
}
