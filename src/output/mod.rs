//! Output stage: the single consumer of the results channel.
//!
//! Drains [`UrlRecord`]s until every producer has hung up, runs each one
//! through a [`UrlFilter`], and writes survivors to the sink in one of two
//! line formats:
//!
//! ```text
//! plain:  https://example.com/login
//! json:   {"url":"https://example.com/login","provider":"wayback"}
//! ```
//!
//! A write failure ends the stage immediately; dropping the receiver makes
//! every producer's next send fail, which stops them too.

pub mod filter;

pub use filter::UrlFilter;

use crate::error::OutputError;
use crate::models::UrlRecord;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc::Receiver;
use tracing::{info, instrument};

/// Line format of the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Plain,
    Json,
}

/// Write every accepted record to `writer`, returning how many were written.
///
/// # Errors
///
/// Returns [`OutputError`] on the first failed write or encode; records
/// still in flight are discarded.
#[instrument(level = "info", skip_all, fields(?format))]
pub async fn write_urls<W>(
    writer: W,
    mut results: Receiver<UrlRecord>,
    mut filter: UrlFilter,
    format: Format,
) -> Result<u64, OutputError>
where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(writer);
    let mut line = Vec::with_capacity(256);
    let mut written = 0u64;
    let mut dropped = 0u64;

    while let Some(record) = results.recv().await {
        if !filter.accept(&record.url) {
            dropped += 1;
            continue;
        }

        line.clear();
        match format {
            Format::Plain => line.extend_from_slice(record.url.as_bytes()),
            Format::Json => serde_json::to_writer(&mut line, &record)?,
        }
        line.push(b'\n');
        out.write_all(&line).await?;
        written += 1;
    }

    out.flush().await?;
    info!(written, dropped, "output complete");
    Ok(written)
}
