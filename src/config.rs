// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Table, query and bundle catalog
//!
//! Definitions are read from YAML documents with top-level `tables`,
//! `queries` and `bundles` mappings. All kubectl-query data lives under
//! ~/.kubectl-query/:
//! - ~/.kubectl-query/conf.d/*.yaml - user catalog files, read on every run
//! - ~/.kubectl-query/log/ - rotating log files
//!
//! The catalog is assembled once per invocation and is read-only afterwards.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_yaml::{Mapping, Value as YamlValue};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::extract::FieldSpec;
use crate::table::ResultTable;

/// Catalog compiled into the binary, loaded before anything else
const BUILTIN_CATALOG: &str = include_str!("catalog/builtin.yaml");
const BUILTIN_FILE: &str = "builtin.yaml";
/// File extensions read from catalog directories
const CATALOG_EXTENSIONS: [&str; 2] = ["yaml", "yml"];

/// Get the base kubectl-query directory (~/.kubectl-query/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".kubectl-query"))
        .context("Could not determine home directory")
}

/// Directory scanned for user catalog files (~/.kubectl-query/conf.d/)
pub fn conf_dir() -> Result<PathBuf> {
    Ok(base_dir()?.join("conf.d"))
}

/// Where a table's records come from
#[derive(Debug, Clone, PartialEq)]
pub enum SourceDef {
    /// Cluster objects listed per context
    Kubernetes { api_version: String, kind: String },
    /// YAML files found below the `include` directories
    File { kind: String, include: Vec<PathBuf> },
    /// A YAML/JSON document fetched over HTTP
    Url {
        kind: String,
        url: String,
        headers: Vec<(String, String)>,
    },
}

impl SourceDef {
    pub fn kind(&self) -> &str {
        match self {
            SourceDef::Kubernetes { kind, .. }
            | SourceDef::File { kind, .. }
            | SourceDef::Url { kind, .. } => kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableDef {
    pub name: String,
    pub source: SourceDef,
    /// Column name to field specification, in declaration order
    pub fields: Vec<(String, FieldSpec)>,
    pub sort: Vec<String>,
    pub hide: Vec<String>,
    pub aliases: Vec<String>,
    pub note: Option<String>,
    /// Context patterns overriding the invocation's default contexts
    pub contexts: Vec<String>,
    /// Namespaces fetched server-side instead of all namespaces
    pub namespaces: Vec<String>,
    /// Base name of the file the definition came from
    pub file: String,
    /// Set when the definition could not be parsed; building it yields no rows
    pub broken: Option<String>,
}

impl TableDef {
    /// Field columns in declaration order, sub-fields expanded
    pub fn field_columns(&self) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for (name, spec) in &self.fields {
            for column in spec.column_names(name) {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        columns
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryDef {
    pub name: String,
    /// Constituent tables, joined left to right
    pub tables: Vec<String>,
    pub sort: Vec<String>,
    pub hide: Vec<String>,
    pub aliases: Vec<String>,
    pub note: Option<String>,
    pub namespaces: Vec<String>,
    pub filters: Vec<String>,
    pub patterns: Vec<String>,
    pub file: String,
}

#[derive(Debug, Clone, Default)]
pub struct BundleDef {
    pub name: String,
    pub queries: Vec<String>,
    pub tables: Vec<String>,
    pub aliases: Vec<String>,
    pub note: Option<String>,
    pub file: String,
}

/// The three kinds of catalog entries, in alias priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Bundles,
    Queries,
    Tables,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::Bundles, EntryKind::Queries, EntryKind::Tables];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Bundles => "bundles",
            EntryKind::Queries => "queries",
            EntryKind::Tables => "tables",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EntryKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("'{}' is not a catalog listing", s))
    }
}

/// One thing to evaluate and show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The catalog itself, rendered as a table
    Catalog(EntryKind),
    Query(String),
    Table(String),
}

impl Target {
    pub fn name(&self) -> &str {
        match self {
            Target::Catalog(kind) => kind.as_str(),
            Target::Query(name) | Target::Table(name) => name,
        }
    }
}

/// Positional arguments sorted into targets and free-text patterns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    pub targets: Vec<Target>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableDef>,
    queries: BTreeMap<String, QueryDef>,
    bundles: BTreeMap<String, BundleDef>,
    /// Alias to entity name
    unaliases: HashMap<String, String>,
}

impl Catalog {
    /// Built-in definitions, then conf.d, then every extra path; aliases are
    /// computed once everything is merged
    pub fn load(extra_paths: &[PathBuf]) -> Self {
        let mut catalog = Self::default();
        catalog.merge_str(BUILTIN_CATALOG, BUILTIN_FILE);

        if let Ok(dir) = conf_dir()
            && dir.is_dir()
        {
            catalog.merge_path(&dir);
        }

        for path in extra_paths {
            catalog.merge_path(path);
        }

        catalog.build_aliases();
        catalog
    }

    /// Merge a file, or every `*.yaml`/`*.yml` file of a directory
    pub fn merge_path(&mut self, path: &Path) {
        if path.is_file() {
            if let Err(e) = self.merge_file(path) {
                let error = format!("{:#}", e);
                warn!(path = %path.display(), error = %error, "Skipping catalog file");
            }
        } else if path.is_dir() {
            let dir = glob::Pattern::escape(&path.to_string_lossy());
            let mut files: Vec<PathBuf> = Vec::new();
            for ext in CATALOG_EXTENSIONS {
                let pattern = format!("{}/*.{}", dir, ext);
                let entries = match glob::glob(&pattern) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot scan catalog directory");
                        return;
                    }
                };
                for entry in entries {
                    match entry {
                        Ok(file) if file.is_file() => files.push(file),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Cannot read catalog directory entry"),
                    }
                }
            }
            files.sort();
            for file in files {
                if let Err(e) = self.merge_file(&file) {
                    let error = format!("{:#}", e);
                    warn!(path = %file.display(), error = %error, "Skipping catalog file");
                }
            }
        } else {
            warn!(path = %path.display(), "Don't know what to do with catalog path");
        }
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        debug!(path = %path.display(), "Reading catalog file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        let file = path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.merge_str(&content, &file);
        Ok(())
    }

    /// Merge one YAML document; later definitions replace earlier ones
    pub fn merge_str(&mut self, content: &str, file: &str) {
        let doc: YamlValue = match serde_yaml::from_str(content) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(file = %file, error = %e, "Cannot parse catalog file");
                return;
            }
        };

        let section = |key: &str| doc.get(key).and_then(YamlValue::as_mapping);
        if EntryKind::ALL.iter().all(|k| section(k.as_str()).is_none()) {
            warn!(file = %file, "File contains neither tables nor queries nor bundles");
            return;
        }

        for (name, prop) in entries(section("tables")) {
            let table = parse_table(&name, prop, file);
            if let Some(reason) = &table.broken {
                warn!(table = %name, file = %file, reason = %reason, "Broken table definition");
            }
            self.tables.insert(name, table);
        }

        for (name, prop) in entries(section("queries")) {
            match serde_yaml::from_value::<RawQuery>(prop.clone()) {
                Ok(raw) => {
                    let query = raw.into_def(&name, file);
                    self.queries.insert(name, query);
                }
                Err(e) => warn!(query = %name, file = %file, error = %e, "Skipping query definition"),
            }
        }

        for (name, prop) in entries(section("bundles")) {
            match serde_yaml::from_value::<RawBundle>(prop.clone()) {
                Ok(raw) => {
                    let bundle = raw.into_def(&name, file);
                    self.bundles.insert(name, bundle);
                }
                Err(e) => warn!(bundle = %name, file = %file, error = %e, "Skipping bundle definition"),
            }
        }
    }

    /// Explicit aliases first, then a short alias for every entity without
    /// one, first come first served in bundle, query, table order
    pub fn build_aliases(&mut self) {
        self.unaliases.clear();

        for kind in EntryKind::ALL {
            for (name, aliases) in self.aliases_of(kind) {
                for alias in aliases {
                    self.unaliases.insert(alias, name.clone());
                }
            }
        }

        for kind in EntryKind::ALL {
            for (name, aliases) in self.aliases_of(kind) {
                if !aliases.is_empty() {
                    continue;
                }
                let alias = shorten(&name);
                if alias.is_empty() || alias == name || self.unaliases.contains_key(&alias) {
                    continue;
                }
                self.unaliases.insert(alias.clone(), name.clone());
                match kind {
                    EntryKind::Bundles => self.bundles.get_mut(&name).map(|b| b.aliases.push(alias)),
                    EntryKind::Queries => self.queries.get_mut(&name).map(|q| q.aliases.push(alias)),
                    EntryKind::Tables => self.tables.get_mut(&name).map(|t| t.aliases.push(alias)),
                };
            }
        }
    }

    fn aliases_of(&self, kind: EntryKind) -> Vec<(String, Vec<String>)> {
        match kind {
            EntryKind::Bundles => self
                .bundles
                .values()
                .map(|b| (b.name.clone(), b.aliases.clone()))
                .collect(),
            EntryKind::Queries => self
                .queries
                .values()
                .map(|q| (q.name.clone(), q.aliases.clone()))
                .collect(),
            EntryKind::Tables => self
                .tables
                .values()
                .map(|t| (t.name.clone(), t.aliases.clone()))
                .collect(),
        }
    }

    pub fn unalias<'a>(&'a self, name: &'a str) -> &'a str {
        self.unaliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn query(&self, name: &str) -> Option<&QueryDef> {
        self.queries.get(name)
    }

    pub fn bundle(&self, name: &str) -> Option<&BundleDef> {
        self.bundles.get(name)
    }

    /// Sort keys and hidden columns configured for a target
    pub fn presentation(&self, target: &Target) -> (&[String], &[String]) {
        match target {
            Target::Query(name) => self
                .queries
                .get(name)
                .map(|q| (q.sort.as_slice(), q.hide.as_slice()))
                .unwrap_or((&[], &[])),
            Target::Table(name) => self
                .tables
                .get(name)
                .map(|t| (t.sort.as_slice(), t.hide.as_slice()))
                .unwrap_or((&[], &[])),
            Target::Catalog(_) => (&[], &[]),
        }
    }

    /// Target for a plain name, preferring queries over tables
    fn target_for(&self, name: &str) -> Target {
        if self.tables.contains_key(name) && !self.queries.contains_key(name) {
            Target::Table(name.to_string())
        } else {
            Target::Query(name.to_string())
        }
    }

    /// Sort positional arguments into targets and extra patterns
    ///
    /// Each argument is un-aliased and looked up as bundle, query, table or
    /// catalog listing, in that order; anything else becomes a pattern.
    pub fn resolve(&self, args: &[String]) -> Resolution {
        let mut resolution = Resolution::default();

        for arg in args {
            let name = self.unalias(arg);
            if let Some(bundle) = self.bundle(name) {
                debug!(bundle = %name, "Expanding bundle");
                for query in &bundle.queries {
                    resolution.targets.push(self.target_for(query));
                }
                for table in &bundle.tables {
                    resolution.targets.push(Target::Table(table.clone()));
                }
            } else if self.queries.contains_key(name) {
                resolution.targets.push(Target::Query(name.to_string()));
            } else if self.tables.contains_key(name) {
                resolution.targets.push(Target::Table(name.to_string()));
            } else if let Ok(kind) = name.parse::<EntryKind>() {
                resolution.targets.push(Target::Catalog(kind));
            } else {
                debug!(arg = %arg, "Not a known name, using it as a pattern");
                resolution.patterns.insert(0, arg.clone());
            }
        }

        resolution
    }

    /// Render one section of the catalog as a table
    ///
    /// `default_contexts` stands in for tables that name no contexts.
    pub fn as_table(&self, kind: EntryKind, default_contexts: &[String]) -> ResultTable {
        let mut table = ResultTable::new(["name", "aliases", "file", "contexts", "references", "note"]);

        let mut push = |name: &str,
                        aliases: &[String],
                        file: &str,
                        contexts: &[String],
                        references: Vec<&str>,
                        note: Option<&str>| {
            let mut cells = vec![
                ("name", name.to_string()),
                ("file", file.to_string()),
                ("contexts", contexts.join(", ")),
                ("note", note.unwrap_or_default().to_string()),
            ];
            if !aliases.is_empty() {
                cells.push(("aliases", aliases.join(", ")));
            }
            if !references.is_empty() {
                cells.push(("references", references.join(", ")));
            }
            table.push_named(cells);
        };

        match kind {
            EntryKind::Tables => {
                for t in self.tables.values() {
                    let contexts = match &t.source {
                        SourceDef::Kubernetes { .. } if t.contexts.is_empty() => default_contexts,
                        SourceDef::Kubernetes { .. } => t.contexts.as_slice(),
                        _ => &[],
                    };
                    push(&t.name, &t.aliases, &t.file, contexts, vec![], t.note.as_deref());
                }
            }
            EntryKind::Queries => {
                for q in self.queries.values() {
                    let references = q.tables.iter().map(String::as_str).collect();
                    push(&q.name, &q.aliases, &q.file, &[], references, q.note.as_deref());
                }
            }
            EntryKind::Bundles => {
                for b in self.bundles.values() {
                    let references = b
                        .queries
                        .iter()
                        .chain(&b.tables)
                        .map(String::as_str)
                        .collect();
                    push(&b.name, &b.aliases, &b.file, &[], references, b.note.as_deref());
                }
            }
        }

        table
    }
}

/// Named entries of a catalog section; non-string keys are skipped
fn entries(section: Option<&Mapping>) -> Vec<(String, &YamlValue)> {
    section
        .into_iter()
        .flatten()
        .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v)))
        .collect()
}

/// First two characters of every dash-separated part: `node-taints` → `nota`
fn shorten(name: &str) -> String {
    name.split('-')
        .map(|part| part.chars().take(2).collect::<String>())
        .collect()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// A single string or a list of strings
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

#[derive(Debug, Deserialize)]
struct RawTable {
    api: String,
    kind: String,
    #[serde(default)]
    fields: Mapping,
    #[serde(default, deserialize_with = "string_list")]
    sort: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    hide: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    aliases: Vec<String>,
    note: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    contexts: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    namespaces: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    include: Vec<String>,
    url: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    #[serde(default, deserialize_with = "string_list")]
    tables: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    sort: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    hide: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    aliases: Vec<String>,
    note: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    namespaces: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    filters: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    patterns: Vec<String>,
}

impl RawQuery {
    fn into_def(self, name: &str, file: &str) -> QueryDef {
        QueryDef {
            name: name.to_string(),
            tables: self.tables,
            sort: self.sort,
            hide: self.hide,
            aliases: self.aliases,
            note: self.note,
            namespaces: self.namespaces,
            filters: self.filters,
            patterns: self.patterns,
            file: file.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawBundle {
    #[serde(default, deserialize_with = "string_list")]
    queries: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    tables: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    aliases: Vec<String>,
    note: Option<String>,
}

impl RawBundle {
    fn into_def(self, name: &str, file: &str) -> BundleDef {
        BundleDef {
            name: name.to_string(),
            queries: self.queries,
            tables: self.tables,
            aliases: self.aliases,
            note: self.note,
            file: file.to_string(),
        }
    }
}

/// Parse a table entry; failures produce a broken definition, not an error
fn parse_table(name: &str, prop: &YamlValue, file: &str) -> TableDef {
    let broken = |reason: String| TableDef {
        name: name.to_string(),
        source: SourceDef::Kubernetes {
            api_version: String::new(),
            kind: String::new(),
        },
        fields: Vec::new(),
        sort: Vec::new(),
        hide: Vec::new(),
        aliases: Vec::new(),
        note: None,
        contexts: Vec::new(),
        namespaces: Vec::new(),
        file: file.to_string(),
        broken: Some(reason),
    };

    let raw: RawTable = match serde_yaml::from_value(prop.clone()) {
        Ok(raw) => raw,
        Err(e) => return broken(e.to_string()),
    };

    let mut table = TableDef {
        name: name.to_string(),
        source: SourceDef::Kubernetes {
            api_version: raw.api.clone(),
            kind: raw.kind.clone(),
        },
        fields: Vec::new(),
        sort: raw.sort,
        hide: raw.hide,
        aliases: raw.aliases,
        note: raw.note,
        contexts: raw.contexts,
        namespaces: raw.namespaces,
        file: file.to_string(),
        broken: None,
    };

    match raw.api.as_str() {
        "file" => {
            table.source = SourceDef::File {
                kind: raw.kind,
                include: raw.include.iter().map(|p| expand_home(p)).collect(),
            };
        }
        "url" => match raw.url {
            Some(url) => {
                table.source = SourceDef::Url {
                    kind: raw.kind,
                    url,
                    headers: raw.headers.into_iter().collect(),
                };
            }
            None => table.broken = Some("url source without 'url'".to_string()),
        },
        _ => {}
    }

    for (field, spec) in &raw.fields {
        let Some(field) = field.as_str() else {
            table.broken = Some(format!("field names must be strings, got {:?}", field));
            break;
        };
        match FieldSpec::from_yaml(spec) {
            Ok(spec) => table.fields.push((field.to_string(), spec)),
            Err(e) => {
                table.broken = Some(format!("field '{}': {}", field, e));
                break;
            }
        }
    }

    if table.broken.is_none() {
        let mut seen: Vec<&str> = Vec::new();
        for (field, spec) in &table.fields {
            for column in spec.column_names(field) {
                if seen.contains(&column) {
                    warn!(table = %name, column = %column, "Column produced by more than one field, last one wins");
                }
                seen.push(column);
            }
        }
    }

    if table.broken.is_some() {
        table.fields.clear();
    }
    table
}

/// `~/x` → `$HOME/x`
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CATALOG: &str = r#"
tables:
  pods:
    api: v1
    kind: Pod
    fields:
      name: metadata.name
      namespace: metadata.namespace
    sort: [namespace, name]
  node-taints:
    api: v1
    kind: Node
    fields:
      node: metadata.name
      taint: spec.taints[*]
  hosts:
    api: file
    kind: hosts
    include: [/tmp/inventory]
    fields:
      host: name
  broken:
    api: v1
    kind: Pod
    fields:
      name: [metadata.name, explode]
queries:
  pod-nodes:
    tables: [pods, node-taints]
    hide: node
    namespaces: [kube-system]
    aliases: [pn]
bundles:
  everything:
    queries: [pod-nodes]
    tables: [hosts]
"#;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::default();
        catalog.merge_str(CATALOG, "test.yaml");
        catalog.build_aliases();
        catalog
    }

    #[test]
    fn test_parse_tables() {
        let catalog = catalog();
        let pods = catalog.table("pods").unwrap();
        assert_eq!(pods.field_columns(), vec!["name", "namespace"]);
        assert_eq!(pods.sort, vec!["namespace", "name"]);
        assert_eq!(pods.file, "test.yaml");
        assert!(pods.broken.is_none());
        assert_eq!(
            pods.source,
            SourceDef::Kubernetes {
                api_version: "v1".to_string(),
                kind: "Pod".to_string()
            }
        );

        let hosts = catalog.table("hosts").unwrap();
        assert!(matches!(&hosts.source, SourceDef::File { kind, .. } if kind == "hosts"));
    }

    #[test]
    fn test_broken_table_is_kept() {
        let catalog = catalog();
        let broken = catalog.table("broken").unwrap();
        let reason = broken.broken.as_deref().unwrap();
        assert!(reason.contains("explode"));
        assert!(broken.fields.is_empty());
    }

    #[test]
    fn test_single_string_lists() {
        let catalog = catalog();
        assert_eq!(catalog.query("pod-nodes").unwrap().hide, vec!["node"]);
    }

    #[test]
    fn test_aliases() {
        let catalog = catalog();
        assert_eq!(catalog.unalias("pn"), "pod-nodes");
        assert_eq!(catalog.unalias("nota"), "node-taints");
        assert_eq!(catalog.unalias("ev"), "everything");
        assert_eq!(catalog.unalias("ho"), "hosts");
        assert_eq!(catalog.unalias("unknown"), "unknown");
        // explicit aliases suppress the generated one
        assert_eq!(catalog.query("pod-nodes").unwrap().aliases, vec!["pn"]);
    }

    #[test]
    fn test_alias_first_come_first_served() {
        let mut catalog = Catalog::default();
        catalog.merge_str(
            r#"
queries:
  nodes-all: {tables: [nodes]}
tables:
  no-al: {api: v1, kind: Node}
  nodes: {api: v1, kind: Node}
"#,
            "a.yaml",
        );
        catalog.build_aliases();
        assert_eq!(catalog.unalias("noal"), "nodes-all");
        assert!(catalog.table("no-al").unwrap().aliases.is_empty());
        assert_eq!(catalog.unalias("no"), "nodes");
    }

    #[test]
    fn test_later_definitions_replace_earlier() {
        let mut catalog = catalog();
        catalog.merge_str(
            "tables:\n  pods:\n    api: v1\n    kind: Pod\n    fields:\n      pod: metadata.name\n",
            "override.yaml",
        );
        let pods = catalog.table("pods").unwrap();
        assert_eq!(pods.field_columns(), vec!["pod"]);
        assert_eq!(pods.file, "override.yaml");
    }

    #[test]
    fn test_unparseable_and_empty_documents_are_skipped() {
        let mut catalog = catalog();
        catalog.merge_str("tables: [unclosed", "bad.yaml");
        catalog.merge_str("something: else", "other.yaml");
        assert!(catalog.table("pods").is_some());
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        let args: Vec<String> = ["pn", "pods", "nginx", "tables", "everything"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolution = catalog.resolve(&args);
        assert_eq!(
            resolution.targets,
            vec![
                Target::Query("pod-nodes".to_string()),
                Target::Table("pods".to_string()),
                Target::Catalog(EntryKind::Tables),
                Target::Query("pod-nodes".to_string()),
                Target::Table("hosts".to_string()),
            ]
        );
        assert_eq!(resolution.patterns, vec!["nginx"]);
    }

    #[test]
    fn test_as_table() {
        let catalog = catalog();
        let defaults = vec!["prod".to_string()];

        let tables = catalog.as_table(EntryKind::Tables, &defaults);
        assert_eq!(
            tables.columns(),
            &["name", "aliases", "file", "contexts", "references", "note"]
        );
        assert_eq!(
            tables.column_values("name").unwrap(),
            vec![Some("broken"), Some("hosts"), Some("node-taints"), Some("pods")]
        );
        assert_eq!(tables.value(3, "contexts"), Some("prod"));
        assert_eq!(tables.value(1, "contexts"), Some(""));
        assert_eq!(tables.value(3, "references"), None);

        let queries = catalog.as_table(EntryKind::Queries, &defaults);
        assert_eq!(queries.value(0, "references"), Some("pods, node-taints"));
        assert_eq!(queries.value(0, "aliases"), Some("pn"));
    }

    #[test]
    fn test_merge_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("extra.yaml"),
            "tables:\n  svc:\n    api: v1\n    kind: Service\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("more.yml"),
            "tables:\n  nodes:\n    api: v1\n    kind: Node\n",
        )
        .unwrap();
        fs::write(dir.path().join("ignored.txt"), "tables:\n  txt:\n    kind: Pod\n").unwrap();
        fs::create_dir(dir.path().join("nested.yaml")).unwrap();

        let mut catalog = Catalog::default();
        catalog.merge_path(dir.path());
        assert_eq!(catalog.table("svc").unwrap().file, "extra.yaml");
        assert_eq!(catalog.table("nodes").unwrap().file, "more.yml");
        assert!(catalog.table("txt").is_none());
    }

    #[test]
    fn test_merge_directory_with_glob_characters() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("conf[1]");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("a.yaml"), "tables:\n  svc:\n    api: v1\n    kind: Service\n").unwrap();

        let mut catalog = Catalog::default();
        catalog.merge_path(&dir);
        assert_eq!(catalog.table("svc").unwrap().file, "a.yaml");
    }

    #[test]
    fn test_builtin_catalog_parses() {
        let mut catalog = Catalog::default();
        catalog.merge_str(BUILTIN_CATALOG, BUILTIN_FILE);
        assert!(catalog.table("pods").is_some());
        for kind in EntryKind::ALL {
            assert!(!catalog.as_table(kind, &[]).is_empty(), "no {kind}");
        }
        for table in catalog.tables.values() {
            assert!(table.broken.is_none(), "{}: {:?}", table.name, table.broken);
        }
        for query in catalog.queries.values() {
            for table in &query.tables {
                assert!(catalog.table(table).is_some(), "{} -> {}", query.name, table);
            }
        }
    }

    #[test]
    fn test_builtin_catalog_is_valid_yaml() {
        let raw: serde_yaml::Value = serde_yaml::from_str(BUILTIN_CATALOG).unwrap();
        assert!(raw.get("tables").is_some());

        let mut catalog = Catalog::default();
        catalog.merge_str(BUILTIN_CATALOG, BUILTIN_FILE);
        let containers = catalog.table("containers").unwrap();
        assert_eq!(containers.field_columns(), vec!["namespace", "pod", "container", "image", "tag"]);
    }

    #[test]
    fn test_shorten() {
        assert_eq!(shorten("pods"), "po");
        assert_eq!(shorten("node-taints"), "nota");
        assert_eq!(shorten("a-b"), "ab");
    }
}
