// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::{ApiCapabilities, Scope, pinned_kind};
use kube::{Api, Client, Config};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::SourceConnector;
use crate::error::QueryError;
use crate::progress::ProgressHandle;

/// Timeout for connecting to K8s API
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for reading K8s API responses
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum retry attempts for transient failures
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (doubles each retry)
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

/// Page size for paginated list requests
const PAGE_SIZE: u32 = 500;

/// (context, apiVersion, kind)
type ResourceKey = (String, String, String);

/// Kubernetes clients for every context of one invocation
///
/// Clients are created on first use and reused afterwards, as are the API
/// resources resolved for each (context, apiVersion, kind).
pub struct K8sClientPool {
    kubeconfig: Kubeconfig,
    clients: Arc<RwLock<HashMap<String, Client>>>,
    resources: Arc<RwLock<HashMap<ResourceKey, (ApiResource, ApiCapabilities)>>>,
    progress: ProgressHandle,
}

impl K8sClientPool {
    /// Read the kubeconfig without connecting anywhere
    pub fn new(progress: ProgressHandle) -> Result<Self> {
        let kubeconfig = Kubeconfig::read().context("Failed to read kubeconfig")?;
        Ok(Self::with_kubeconfig(kubeconfig, progress))
    }

    pub fn with_kubeconfig(kubeconfig: Kubeconfig, progress: ProgressHandle) -> Self {
        Self {
            kubeconfig,
            clients: Arc::new(RwLock::new(HashMap::new())),
            resources: Arc::new(RwLock::new(HashMap::new())),
            progress,
        }
    }

    /// The kubeconfig's current context, if any
    pub fn current_context(&self) -> Option<String> {
        self.kubeconfig.current_context.clone()
    }

    pub fn list_contexts(&self) -> Vec<String> {
        self.kubeconfig
            .contexts
            .iter()
            .map(|c| c.name.clone())
            .collect()
    }

    /// Get or create a client for the given context
    async fn get_or_create_client(&self, context: &str) -> Result<Client> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(context) {
                return Ok(client.clone());
            }
        }

        if !self.kubeconfig.contexts.iter().any(|c| c.name == context) {
            return Err(anyhow!("Context '{}' not found in kubeconfig", context));
        }

        self.progress.connecting(context);
        let start = Instant::now();

        let mut config = Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            },
        )
        .await
        .with_context(|| format!("Failed to load kubeconfig for context '{}'", context))?;

        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);

        let client = Client::try_from(config)
            .with_context(|| format!("Failed to create client for context '{}'", context))?;

        self.progress
            .connected(context, start.elapsed().as_millis() as u64);

        // Two tables racing on the same context may both build a client;
        // the first one stored wins.
        let mut clients = self.clients.write().await;
        Ok(clients
            .entry(context.to_string())
            .or_insert(client)
            .clone())
    }

    /// Resolve `apiVersion` + `kind` to an API resource on one context
    async fn resolve_resource(
        &self,
        client: &Client,
        context: &str,
        api_version: &str,
        kind: &str,
    ) -> Result<(ApiResource, ApiCapabilities)> {
        let key = (
            context.to_string(),
            api_version.to_string(),
            kind.to_string(),
        );
        {
            let resources = self.resources.read().await;
            if let Some(found) = resources.get(&key) {
                return Ok(found.clone());
            }
        }

        let (group, version) = split_api_version(api_version);
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let found = pinned_kind(client, &gvk)
            .await
            .with_context(|| format!("Unknown resource {} in {}", kind, api_version))?;

        debug!(
            context = %context,
            api_version = %api_version,
            kind = %kind,
            plural = %found.0.plural,
            "Resolved API resource"
        );

        self.resources.write().await.insert(key, found.clone());
        Ok(found)
    }

    /// Scope of a kind on one context, resolved once and cached
    async fn scope(&self, context: &str, api_version: &str, kind: &str) -> Result<Scope> {
        let client = self.get_or_create_client(context).await?;
        let (_, caps) = self
            .resolve_resource(&client, context, api_version, kind)
            .await?;
        Ok(caps.scope)
    }

    async fn fetch(
        &self,
        context: &str,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<serde_json::Value>> {
        let client = self.get_or_create_client(context).await?;
        let (ar, caps) = self
            .resolve_resource(&client, context, api_version, kind)
            .await?;

        let (api, scope): (Api<DynamicObject>, &str) = match (&caps.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => (Api::namespaced_with(client, ns, &ar), "namespaced"),
            (Scope::Namespaced, None) => (Api::all_with(client, &ar), "all-namespaces"),
            (Scope::Cluster, _) => (Api::all_with(client, &ar), "cluster-scoped"),
        };

        debug!(
            context = %context,
            kind = %kind,
            namespace = ?namespace,
            scope = %scope,
            "Fetching K8s resource"
        );

        let items = self.list_with_retry(&api, kind, context).await?;

        // List responses omit apiVersion and kind per item
        let values = items
            .into_iter()
            .filter_map(|item| serde_json::to_value(item).ok())
            .map(|mut value| {
                if let serde_json::Value::Object(ref mut map) = value {
                    map.insert("apiVersion".to_string(), ar.api_version.clone().into());
                    map.insert("kind".to_string(), ar.kind.clone().into());
                }
                value
            })
            .collect();

        Ok(values)
    }

    /// List every page using continue tokens
    async fn list_with_retry(
        &self,
        api: &Api<DynamicObject>,
        kind: &str,
        context: &str,
    ) -> Result<Vec<DynamicObject>> {
        let mut all_items: Vec<DynamicObject> = Vec::new();
        let mut continue_token: Option<String> = None;
        let mut page_count = 0u32;

        loop {
            let mut params = ListParams::default().limit(PAGE_SIZE);
            if let Some(ref token) = continue_token {
                params = params.continue_token(token);
            }

            let list = self
                .list_page_with_retry(api, &params, kind, context)
                .await?;

            let items_count = list.items.len();
            all_items.extend(list.items);
            page_count += 1;

            match list.metadata.continue_ {
                Some(token) if !token.is_empty() => {
                    debug!(
                        kind = %kind,
                        context = %context,
                        page = page_count,
                        items_this_page = items_count,
                        total_so_far = all_items.len(),
                        "Fetched page, continuing"
                    );
                    continue_token = Some(token);
                }
                _ => break,
            }
        }

        if page_count > 1 {
            debug!(
                kind = %kind,
                context = %context,
                pages = page_count,
                total_items = all_items.len(),
                "Pagination complete"
            );
        }

        Ok(all_items)
    }

    async fn list_page_with_retry(
        &self,
        api: &Api<DynamicObject>,
        params: &ListParams,
        kind: &str,
        context: &str,
    ) -> Result<kube::api::ObjectList<DynamicObject>> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match api.list(params).await {
                Ok(list) => return Ok(list),
                Err(e) if is_retryable_error(&e) => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt);
                    warn!(
                        kind = %kind,
                        context = %context,
                        attempt = attempt + 1,
                        max_attempts = MAX_RETRIES,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retryable error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => {
                    debug!(kind = %kind, context = %context, error = %e, "Non-retryable error");
                    return Err(anyhow!("K8s API error: {}", e));
                }
            }
        }

        Err(anyhow!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }
}

#[async_trait]
impl SourceConnector for K8sClientPool {
    fn contexts(&self) -> Vec<String> {
        self.list_contexts()
    }

    async fn fetch_list(
        &self,
        context: &str,
        api_version: &str,
        kind: &str,
        namespace: Option<&str>,
    ) -> crate::error::Result<Vec<serde_json::Value>> {
        self.fetch(context, api_version, kind, namespace)
            .await
            .map_err(|e| connectivity_error(context, kind, e))
    }

    async fn is_namespaced(
        &self,
        context: &str,
        api_version: &str,
        kind: &str,
    ) -> crate::error::Result<bool> {
        self.scope(context, api_version, kind)
            .await
            .map(|scope| matches!(scope, Scope::Namespaced))
            .map_err(|e| connectivity_error(context, kind, e))
    }
}

fn connectivity_error(context: &str, kind: &str, err: anyhow::Error) -> QueryError {
    QueryError::Connectivity {
        context: context.to_string(),
        kind: kind.to_string(),
        reason: format!("{:#}", err),
    }
}

/// `apps/v1` → ("apps", "v1"); `v1` → ("", "v1")
fn split_api_version(api_version: &str) -> (&str, &str) {
    api_version.rsplit_once('/').unwrap_or(("", api_version))
}

/// Transient failures worth another attempt
fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::HyperError(_) => true,
        // 429 (rate limit), 503 (unavailable), 504 (timeout)
        kube::Error::Api(api_err) => matches!(api_err.code, 429 | 503 | 504),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::create_progress_handle;

    fn kubeconfig(contexts: &[&str], current: Option<&str>) -> Kubeconfig {
        let contexts = contexts
            .iter()
            .map(|name| kube::config::NamedContext {
                name: name.to_string(),
                context: None,
            })
            .collect();
        Kubeconfig {
            contexts,
            current_context: current.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_split_api_version() {
        assert_eq!(split_api_version("v1"), ("", "v1"));
        assert_eq!(split_api_version("apps/v1"), ("apps", "v1"));
        assert_eq!(
            split_api_version("cilium.io/v2"),
            ("cilium.io", "v2")
        );
    }

    #[test]
    fn test_contexts_from_kubeconfig() {
        let pool = K8sClientPool::with_kubeconfig(
            kubeconfig(&["prod", "dev"], Some("dev")),
            create_progress_handle(),
        );
        assert_eq!(pool.list_contexts(), vec!["prod", "dev"]);
        assert_eq!(SourceConnector::contexts(&pool), vec!["prod", "dev"]);
        assert_eq!(pool.current_context().as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn test_unknown_context_is_connectivity_error() {
        let pool = K8sClientPool::with_kubeconfig(
            kubeconfig(&["prod"], Some("prod")),
            create_progress_handle(),
        );
        let err = pool
            .fetch_list("missing", "v1", "Pod", None)
            .await
            .unwrap_err();
        match err {
            QueryError::Connectivity { context, kind, reason } => {
                assert_eq!(context, "missing");
                assert_eq!(kind, "Pod");
                assert!(reason.contains("not found in kubeconfig"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
