// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Builds one result table from a table definition
//!
//! Records are fetched from every context of the table concurrently, then
//! each record is run through field extraction and row expansion in context
//! order. Unreachable contexts are skipped; a broken definition or a
//! transform failure empties the whole table.

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::borrow::Cow;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::ResultTable;
use super::source::{load_file_records, load_url_records};
use crate::config::{SourceDef, TableDef};
use crate::error::{QueryError, Result};
use crate::extract::{ColumnValue, Expansion};
use crate::kubernetes::{ContextMatcher, SourceConnector};
use crate::progress::ProgressHandle;

/// Column tagging rows with their context when several are queried
pub const CONTEXT_COLUMN: &str = "context";

/// Maximum number of contexts fetched at the same time
const MAX_CONCURRENT_CONTEXTS: usize = 15;

pub struct TableBuilder<'a> {
    connector: &'a dyn SourceConnector,
    /// Contexts for tables that do not name their own
    default_contexts: Vec<String>,
    progress: Option<ProgressHandle>,
}

impl<'a> TableBuilder<'a> {
    pub fn new(connector: &'a dyn SourceConnector, default_contexts: Vec<String>) -> Self {
        Self {
            connector,
            default_contexts,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: ProgressHandle) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn default_contexts(&self) -> &[String] {
        &self.default_contexts
    }

    /// Build the table; failures are logged and give an empty table
    pub async fn build(&self, def: &TableDef) -> ResultTable {
        match self.try_build(def).await {
            Ok(table) => {
                info!(
                    table = %def.name,
                    kind = %def.source.kind(),
                    rows = table.len(),
                    "Loaded {} rows for table {} ({})",
                    table.len(),
                    def.name,
                    def.source.kind()
                );
                table
            }
            Err(e) => {
                warn!(table = %def.name, error = %e, "Table yields no rows");
                ResultTable::new(def.field_columns())
            }
        }
    }

    async fn try_build(&self, def: &TableDef) -> Result<ResultTable> {
        if let Some(reason) = &def.broken {
            return Err(QueryError::config(&def.name, reason.clone()));
        }

        match &def.source {
            SourceDef::Kubernetes { api_version, kind } => {
                self.build_from_contexts(def, api_version, kind).await
            }
            SourceDef::File { kind, include } => {
                let records = load_file_records(&def.name, kind, include)?;
                records_to_table(def, &records)
            }
            SourceDef::Url { kind, url, headers } => {
                let records = load_url_records(&def.name, kind, url, headers).await?;
                records_to_table(def, &records)
            }
        }
    }

    /// The table's own contexts when it names any, the defaults otherwise
    fn contexts_for(&self, def: &TableDef) -> Result<Vec<String>> {
        if def.contexts.is_empty() {
            return Ok(self.default_contexts.clone());
        }
        let available = self.connector.contexts();
        ContextMatcher::new(&available).resolve_all(&def.contexts)
    }

    async fn build_from_contexts(
        &self,
        def: &TableDef,
        api_version: &str,
        kind: &str,
    ) -> Result<ResultTable> {
        let contexts = self.contexts_for(def)?;
        debug!(table = %def.name, contexts = ?contexts, "Building table");

        if let Some(progress) = &self.progress {
            progress.start_table(&def.name, contexts.len());
        }

        let fetched: Vec<(String, Result<Vec<Value>>)> = stream::iter(contexts.iter().cloned())
            .map(|context| async move {
                let start = Instant::now();
                let result = self.fetch_context(def, &context, api_version, kind).await;
                if let Some(progress) = &self.progress {
                    match &result {
                        Ok(records) => progress.context_complete(
                            &context,
                            records.len(),
                            start.elapsed().as_millis() as u64,
                        ),
                        Err(e) => progress.context_failed(&context, &e.to_string()),
                    }
                }
                (context, result)
            })
            .buffered(MAX_CONCURRENT_CONTEXTS)
            .collect()
            .await;

        let tag_context = contexts.len() > 1;
        let mut columns: Vec<&str> = Vec::new();
        if tag_context {
            columns.push(CONTEXT_COLUMN);
        }
        columns.extend(def.field_columns());
        let mut table = ResultTable::new(columns);

        for (context, result) in fetched {
            match result {
                Ok(records) => {
                    let tag = tag_context.then_some(context.as_str());
                    for record in &records {
                        append_record(&mut table, def, record, tag)?;
                    }
                }
                Err(e) => {
                    warn!(table = %def.name, context = %context, error = %e, "Skipping context");
                }
            }
        }

        Ok(table)
    }

    /// All records of one context, one request per configured namespace
    ///
    /// Cluster-scoped kinds are listed once whatever namespaces are
    /// configured.
    async fn fetch_context(
        &self,
        def: &TableDef,
        context: &str,
        api_version: &str,
        kind: &str,
    ) -> Result<Vec<Value>> {
        debug!(table = %def.name, context = %context, "Loading table from context");
        let namespaced = !def.namespaces.is_empty()
            && self
                .connector
                .is_namespaced(context, api_version, kind)
                .await?;
        if !namespaced {
            return self
                .connector
                .fetch_list(context, api_version, kind, None)
                .await;
        }

        let mut records = Vec::new();
        for namespace in &def.namespaces {
            records.extend(
                self.connector
                    .fetch_list(context, api_version, kind, Some(namespace))
                    .await?,
            );
        }
        Ok(records)
    }
}

/// Table from records of a file or URL source (never context-tagged)
fn records_to_table(def: &TableDef, records: &[Value]) -> Result<ResultTable> {
    let mut table = ResultTable::new(def.field_columns());
    for record in records {
        append_record(&mut table, def, record, None)?;
    }
    Ok(table)
}

/// Extract and expand one record into `table`
///
/// A record carrying a `specs` list is evaluated once per entry, with that
/// entry standing in as `spec`.
fn append_record(
    table: &mut ResultTable,
    def: &TableDef,
    record: &Value,
    context: Option<&str>,
) -> Result<()> {
    let alternatives: Vec<Cow<'_, Value>> = match record.get("specs") {
        Some(Value::Array(specs)) => specs
            .iter()
            .map(|spec| {
                let mut alt = record.clone();
                if let Value::Object(map) = &mut alt {
                    map.insert("spec".to_string(), spec.clone());
                }
                Cow::Owned(alt)
            })
            .collect(),
        _ => vec![Cow::Borrowed(record)],
    };

    for alt in &alternatives {
        let values: Vec<(String, ColumnValue)> = def
            .fields
            .iter()
            .map(|(name, spec)| {
                spec.extract(alt)
                    .map(|value| (name.clone(), value))
                    .map_err(|source| QueryError::Extract {
                        table: def.name.clone(),
                        field: name.clone(),
                        source,
                    })
            })
            .collect::<Result<_>>()?;

        for row in &Expansion::new(&values) {
            let cells = context
                .map(|ctx| (CONTEXT_COLUMN.to_string(), ctx.to_string()))
                .into_iter()
                .chain(row);
            table.push_named(cells);
        }
    }

    Ok(())
}
