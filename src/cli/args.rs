// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};

use crate::postprocess::{PostprocessOptions, split_list};

#[derive(Parser, Debug)]
#[command(name = "kubectl-query")]
#[command(
    author,
    version,
    about = "Query Kubernetes resources through declared tables and joins"
)]
pub struct Args {
    /// Queries, tables or bundles to show; `list` shows the catalog.
    /// Anything else is used as an extra pattern.
    #[arg(value_name = "QUERIES")]
    pub queries: Vec<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Extra catalog file or directory (repeatable)
    #[arg(short, long, value_name = "PATH")]
    pub config: Vec<PathBuf>,

    /// Keep only rows where any column matches this regex (repeatable)
    #[arg(short, long, value_name = "REGEX")]
    pub pattern: Vec<String>,

    /// Keep only rows where COLUMN matches VALUE (repeatable)
    #[arg(short, long, value_name = "COLUMN=VALUE")]
    pub filter: Vec<String>,

    /// Restrict results to these namespaces (repeatable)
    #[arg(short, long, value_name = "NAMESPACE")]
    pub namespace: Vec<String>,

    /// Kubernetes context(s) to query. Supports comma-separated lists,
    /// glob patterns and `all`.
    /// Examples: --context prod, --context "prod,staging", --context "prod-*"
    #[arg(long, visible_alias = "contexts", value_name = "CONTEXT")]
    pub context: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "color")]
    pub output: OutputFormat,

    /// Sort by these columns (repeatable or comma-separated)
    #[arg(short, long, value_name = "COLUMN")]
    pub sort: Vec<String>,

    /// Show only these columns (repeatable or comma-separated)
    #[arg(short = 'C', long, value_name = "COLUMN")]
    pub columns: Vec<String>,

    /// List the available tables and queries
    #[arg(short, long)]
    pub list: bool,

    /// Omit column headers in output
    #[arg(long)]
    pub no_headers: bool,
}

impl Args {
    /// Postprocessing inputs given on the command line
    pub fn postprocess_options(&self) -> PostprocessOptions {
        PostprocessOptions {
            patterns: self.pattern.clone(),
            filters: self.filter.clone(),
            namespaces: split_list(&self.namespace),
            sort: split_list(&self.sort),
            columns: split_list(&self.columns),
        }
    }

    /// Log filter directive for the requested verbosity
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "kubectl_query=warn",
            1 => "kubectl_query=info",
            _ => "kubectl_query=debug",
        }
    }
}

#[derive(ValueEnum, Clone, Debug, Default, PartialEq)]
pub enum OutputFormat {
    /// Table with coloured columns when the terminal supports it
    #[default]
    Color,
    /// Table without colours
    Plain,
    Json,
    Yaml,
    Csv,
}
