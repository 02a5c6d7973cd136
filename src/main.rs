//! # allurls
//!
//! Fetches every URL the public web archives know about for a set of
//! domains and streams them to stdout or a file.
//!
//! ## Features
//!
//! - Queries the Wayback Machine, Common Crawl, AlienVault OTX and urlscan.io
//! - Bounded worker pool pulling (domain, provider) units from a shared queue
//! - Retries with exponential backoff and a rotating User-Agent per request
//! - Extension and path blacklists, plus `host + path` deduplication
//! - Plain or JSON-lines output
//! - Graceful shutdown on Ctrl-C or an optional deadline
//!
//! ## Usage
//!
//! ```sh
//! allurls --threads 4 --subs example.com
//! cat domains.txt | allurls --json -o urls.jsonl
//! ```
//!
//! ## Architecture
//!
//! 1. **Configuration**: CLI flags merged over `$HOME/.allurls.yaml`
//! 2. **Providers**: built once per run (Common Crawl discovers its index here)
//! 3. **Scheduling**: one work unit per (domain, provider) pair, pulled by workers
//! 4. **Output**: a single consumer filters and writes every result

use clap::Parser;
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod http;
mod models;
mod output;
mod providers;
mod runner;
mod utils;

use cli::Cli;
use config::Settings;
use models::Work;
use output::write_urls;
use providers::{AnyProvider, build_providers};
use runner::{Runner, enqueue};
use utils::parse_domain_line;

/// Results buffered between providers and the output stage.
const RESULTS_BUFFER: usize = 1024;

type Sink = Box<dyn AsyncWrite + Unpin + Send>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let default_level = if args.verbose { "info" } else { "error" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("allurls starting up");

    let file_config = config::read_config(args.config.as_deref()).inspect_err(|e| {
        error!(error = %e, "failed to read config");
    })?;
    let settings = Settings::resolve(&args, file_config).inspect_err(|e| {
        error!(error = %e, "invalid configuration");
    })?;
    debug!(
        threads = settings.threads,
        timeout_secs = settings.timeout.as_secs(),
        retries = settings.retries,
        providers = ?settings.providers,
        "resolved settings"
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_triggers(&cancel, settings.deadline);

    let provider_config = Arc::new(settings.provider_config()?);
    let providers: Vec<Arc<AnyProvider>> =
        build_providers(&settings.providers, provider_config, &cancel)
            .await
            .into_iter()
            .map(Arc::new)
            .collect();
    if providers.is_empty() {
        error!("no providers available");
        return Err("no providers available".into());
    }

    let sink = open_sink(settings.output.as_deref()).await.inspect_err(|e| {
        error!(error = %e, "failed to open output");
    })?;

    // --- Output stage ---
    let (results_tx, results_rx) = mpsc::channel(RESULTS_BUFFER);
    let output = tokio::spawn({
        let cancel = cancel.clone();
        let filter = settings.url_filter();
        let format = settings.format;
        async move {
            let outcome = write_urls(sink, results_rx, filter, format).await;
            if outcome.is_err() {
                cancel.cancel();
            }
            outcome
        }
    });

    // --- Workers ---
    let (work_tx, work_rx) = mpsc::channel(settings.threads);
    let mut runner = Runner::new(settings.threads, cancel.clone());
    runner.start(work_rx, results_tx);

    let domains = match feed_domains(&args.domains, &work_tx, &cancel, &providers).await {
        Ok(count) => count,
        Err(e) => {
            error!(error = %e, "failed to read domains from stdin");
            runner.cancel();
            0
        }
    };
    drop(work_tx);
    runner.wait().await;

    let written = output.await?.inspect_err(|e| {
        error!(error = %e, "failed to write output");
    })?;

    let elapsed = start_time.elapsed();
    info!(
        domains,
        written,
        cancelled = cancel.is_cancelled(),
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "allurls finished"
    );
    Ok(())
}

/// Append to `path`, creating it if needed, or fall back to stdout.
async fn open_sink(path: Option<&Path>) -> std::io::Result<Sink> {
    match path {
        Some(path) => {
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            info!(path = %path.display(), "appending results to file");
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Cancel the run on Ctrl-C, or once `deadline` elapses.
fn spawn_shutdown_triggers(cancel: &CancellationToken, deadline: Option<Duration>) {
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = on_deadline.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    warn!(secs = deadline.as_secs(), "deadline reached, stopping");
                    on_deadline.cancel();
                }
            }
        });
    }
}

/// Queue work for every domain given on the command line, or read from
/// stdin when none were. Returns how many domains were queued.
async fn feed_domains(
    from_args: &[String],
    queue: &mpsc::Sender<Work<AnyProvider>>,
    cancel: &CancellationToken,
    providers: &[Arc<AnyProvider>],
) -> std::io::Result<usize> {
    let mut queued = 0;

    if !from_args.is_empty() {
        for domain in from_args.iter().filter_map(|line| parse_domain_line(line)) {
            if !enqueue(queue, cancel, &domain, providers).await {
                break;
            }
            queued += 1;
        }
        return Ok(queued);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let Some(domain) = parse_domain_line(&line) else {
            continue;
        };
        if !enqueue(queue, cancel, &domain, providers).await {
            break;
        }
        queued += 1;
    }
    Ok(queued)
}
