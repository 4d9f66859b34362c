// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod client;
mod context_matcher;

pub use client::K8sClientPool;
pub use context_matcher::ContextMatcher;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Opaque access to cluster records, one named context at a time
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Every context this connector knows about, in configuration order
    fn contexts(&self) -> Vec<String>;

    /// List all objects of `kind` in `api_version`, optionally restricted to
    /// one namespace. Failures are `Connectivity` errors for that context.
    async fn fetch_list(
        &self,
        context: &str,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<Value>>;

    /// Whether objects of `kind` live in namespaces; cluster-scoped kinds
    /// ignore the namespace given to [`SourceConnector::fetch_list`]
    async fn is_namespaced(&self, context: &str, api_version: &str, kind: &str) -> Result<bool>;
}
