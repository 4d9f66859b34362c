// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

mod cli;
pub mod config;
mod error;
mod extract;
mod kubernetes;
mod output;
mod postprocess;
pub mod progress;
mod query;
mod table;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use kube::config::Kubeconfig;
use tracing::{Subscriber, debug, warn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;

use cli::{Args, OutputFormat};
use config::{Catalog, EntryKind, Target};
use kubernetes::{ContextMatcher, K8sClientPool};
use output::QueryResult;
use progress::{ProgressHandle, create_progress_handle, create_spinner};
use query::QueryCombiner;
use table::{ResultTable, TableBuilder};

/// Positional argument that lists the catalog
const LIST_ARG: &str = "list";

/// Initialize logging to stderr plus a rotating file when possible
fn init_logging(filter: &str) {
    use tracing_rolling_file::{RollingConditionBase, RollingFileAppenderBase};

    let log_dir = config::base_dir()
        .map(|p| p.join("log"))
        .unwrap_or_else(|_| std::path::PathBuf::from("."));

    // File appender with size-based rotation:
    // - Max 10MB per file
    // - Keep up to 5 files
    // - Also rotate daily
    let file_appender = std::fs::create_dir_all(&log_dir)
        .map_err(|e| e.to_string())
        .and_then(|_| {
            let condition = RollingConditionBase::new()
                .daily()
                .max_size(10 * 1024 * 1024);
            RollingFileAppenderBase::new(log_dir.join("kubectl-query.log"), condition, 5)
                .map_err(|e| e.to_string())
        });

    let file_writer = match file_appender {
        Ok(appender) => {
            let (non_blocking, guard) = appender.get_non_blocking_appender();
            // Leak the guard to keep the background writer alive
            std::mem::forget(guard);
            Some(non_blocking)
        }
        Err(e) => {
            eprintln!("Warning: Could not create log file: {}", e);
            None
        }
    };

    log_subscriber(filter, file_writer).init();
}

/// Subscriber writing to stderr and, when given, to `file_writer`
fn log_subscriber<W>(filter: &str, file_writer: Option<W>) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::NONE)
    });

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_span_events(FmtSpan::NONE);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (aws-lc-rs)
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let args = Args::parse();
    init_logging(args.log_filter());

    if args.queries.is_empty() && !args.list {
        Args::command().print_help()?;
        println!();
        return Ok(());
    }

    let catalog = Catalog::load(&args.config);

    let progress = create_progress_handle();
    let pool = match K8sClientPool::new(progress.clone()) {
        Ok(pool) => pool,
        Err(e) => {
            let error = format!("{:#}", e);
            warn!(error = %error, "No kubeconfig, cluster tables will be empty");
            K8sClientPool::with_kubeconfig(Kubeconfig::default(), progress.clone())
        }
    };

    let contexts = default_contexts(&pool, &args.context)?;
    debug!(contexts = ?contexts, "Default contexts");

    let requested = requested_names(&args);
    let resolution = catalog.resolve(&requested);
    if resolution.targets.is_empty() {
        eprintln!("Nothing to show for: {}", args.queries.join(" "));
        eprintln!();
        for kind in [EntryKind::Tables, EntryKind::Queries] {
            let listing = catalog.as_table(kind, &contexts);
            eprintln!("{}", render(&listing, &OutputFormat::Plain, false));
            eprintln!();
        }
        std::process::exit(1);
    }

    let mut options = args.postprocess_options();
    let mut patterns = resolution.patterns.clone();
    patterns.append(&mut options.patterns);
    options.patterns = patterns;

    let show_progress = matches!(args.output, OutputFormat::Color) && console::user_attended_stderr();
    let builder = TableBuilder::new(&pool, contexts).with_progress(progress.clone());
    let combiner = QueryCombiner::new(&catalog, builder);

    for (idx, target) in resolution.targets.iter().enumerate() {
        let result = if show_progress {
            evaluate_with_spinner(&combiner, target, &options, &progress).await
        } else {
            combiner.evaluate(target, &options).await
        };

        if idx > 0 {
            println!();
        }
        println!("{}", render(&result, &args.output, args.no_headers));
    }

    Ok(())
}

/// Contexts used by tables that don't name their own
fn default_contexts(pool: &K8sClientPool, specs: &[String]) -> Result<Vec<String>> {
    if specs.is_empty() {
        return Ok(pool.current_context().into_iter().collect());
    }
    let available = pool.list_contexts();
    Ok(ContextMatcher::new(&available).resolve_all(specs)?)
}

/// Positional arguments with `list` / `--list` turned into the catalog
/// listings
fn requested_names(args: &Args) -> Vec<String> {
    let listing = [EntryKind::Tables, EntryKind::Queries].map(|k| k.as_str().to_string());
    let mut names = Vec::new();
    if args.list {
        names.extend(listing.iter().cloned());
    }
    for name in &args.queries {
        if name == LIST_ARG {
            names.extend(listing.iter().cloned());
        } else {
            names.push(name.clone());
        }
    }
    names
}

async fn evaluate_with_spinner(
    combiner: &QueryCombiner<'_>,
    target: &Target,
    options: &postprocess::PostprocessOptions,
    progress: &ProgressHandle,
) -> ResultTable {
    let spinner = create_spinner(&format!("Loading {}...", target.name()));
    let mut progress_rx = progress.subscribe();

    let mut evaluation = Box::pin(combiner.evaluate(target, options));
    let result = loop {
        tokio::select! {
            biased;
            update = progress_rx.recv() => {
                if let Ok(update) = update
                    && let Some(message) = update.message()
                {
                    let (done, total) = progress.progress();
                    if total > 1 {
                        spinner.set_message(format!("[{}/{}] {}", done, total, message));
                    } else {
                        spinner.set_message(message);
                    }
                }
            }
            result = &mut evaluation => {
                break result;
            }
        }
    };

    spinner.finish_and_clear();
    result
}

fn render(table: &ResultTable, format: &OutputFormat, no_headers: bool) -> String {
    QueryResult::from(table).format(format, no_headers)
}
