// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Records from YAML files and URLs

use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{QueryError, Result};

/// Timeout for the whole URL request
const URL_TIMEOUT: Duration = Duration::from_secs(30);

/// Merge the top-level mappings of every `**/*.y*ml` file below the include
/// directories (later files win) and return the records under `kind`
pub(super) fn load_file_records(table: &str, kind: &str, include: &[PathBuf]) -> Result<Vec<Value>> {
    let mut merged = Map::new();

    for dir in include {
        debug!(table = %table, path = %dir.display(), "Scanning include directory");
        let pattern = format!("{}/**/*.y*ml", dir.display());
        let paths = glob::glob(&pattern)
            .map_err(|e| QueryError::source(table, format!("bad include path '{}': {}", dir.display(), e)))?;

        for entry in paths {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!(table = %table, error = %e, "Cannot read include entry");
                    continue;
                }
            };
            debug!(table = %table, path = %path.display(), "Reading records file");
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(table = %table, path = %path.display(), error = %e, "Cannot read records file");
                    continue;
                }
            };
            match serde_yaml::from_str::<Value>(&content) {
                Ok(Value::Object(doc)) => merged.extend(doc),
                Ok(Value::Null) => {}
                Ok(_) => {
                    warn!(table = %table, path = %path.display(), "Records file is not a mapping, skipping")
                }
                Err(e) => {
                    warn!(table = %table, path = %path.display(), error = %e, "Cannot parse records file")
                }
            }
        }
    }

    records_of(table, kind, merged)
}

/// GET the document at `url` and return the records under `kind`
pub(super) async fn load_url_records(
    table: &str,
    kind: &str,
    url: &str,
    headers: &[(String, String)],
) -> Result<Vec<Value>> {
    let client = reqwest::Client::builder()
        .timeout(URL_TIMEOUT)
        .build()
        .map_err(|e| QueryError::source(table, e.to_string()))?;

    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(name.as_str(), value.as_str());
    }

    debug!(table = %table, url = %url, "Requesting records");
    let body = request
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| QueryError::source(table, format!("could not request {}: {}", url, e)))?
        .text()
        .await
        .map_err(|e| QueryError::source(table, format!("could not read {}: {}", url, e)))?;

    match serde_yaml::from_str::<Value>(&body) {
        Ok(Value::Object(doc)) => records_of(table, kind, doc),
        Ok(_) => Err(QueryError::source(table, format!("{} is not a mapping", url))),
        Err(e) => Err(QueryError::source(table, format!("cannot parse {}: {}", url, e))),
    }
}

/// The records stored under `kind`; a single mapping counts as one record
fn records_of(table: &str, kind: &str, mut doc: Map<String, Value>) -> Result<Vec<Value>> {
    match doc.remove(kind) {
        Some(Value::Array(records)) => Ok(records),
        Some(record @ Value::Object(_)) => Ok(vec![record]),
        Some(Value::Null) => Ok(Vec::new()),
        Some(other) => Err(QueryError::source(
            table,
            format!("'{}' holds {} instead of records", kind, other),
        )),
        None => Err(QueryError::source(table, format!("no '{}' in the loaded documents", kind))),
    }
}
