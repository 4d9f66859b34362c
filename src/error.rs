// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Error taxonomy for table and query evaluation
//!
//! Everything here is recovered at the table/query boundary: a failing table
//! or query logs the error and contributes an empty result, so one broken
//! definition or unreachable cluster never stops the rest of the run.

use thiserror::Error;

use crate::extract::FieldError;
use crate::table::TableError;

#[derive(Error, Debug)]
pub enum QueryError {
    /// Bad definition: unknown transform, bad path, undefined table, ...
    #[error("configuration error in '{name}': {reason}")]
    Config { name: String, reason: String },

    /// A field could not be evaluated against a record
    #[error("table '{table}', field '{field}': {source}")]
    Extract {
        table: String,
        field: String,
        source: FieldError,
    },

    /// A context could not be reached or the kind could not be listed
    #[error("failed to fetch '{kind}' from context '{context}': {reason}")]
    Connectivity {
        context: String,
        kind: String,
        reason: String,
    },

    /// Constituent tables could not be joined
    #[error("could not join {tables:?}: {source}")]
    Join {
        tables: Vec<String>,
        source: TableError,
    },

    /// A file or URL document could not be loaded
    #[error("failed to load source for '{name}': {reason}")]
    Source { name: String, reason: String },
}

impl QueryError {
    pub fn config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn source(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Source {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
