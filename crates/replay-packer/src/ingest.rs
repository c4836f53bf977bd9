//! Batch ingestion: decode every discovered file, drop the ones that fail.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::decoder::ReplayDecoder;
use crate::replay::Replay;

/// Outcome of one ingestion batch.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Decoded replays, in discovery order.
    pub replays: Vec<Replay>,
    pub succeeded: usize,
    pub failed: usize,
}

impl IngestReport {
    /// `succeeded / (succeeded + failed)`, or `None` for an empty batch.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.succeeded + self.failed;
        if total == 0 {
            None
        } else {
            Some(self.succeeded as f64 / total as f64)
        }
    }

    /// Number of game states across all decoded replays.
    pub fn total_states(&self) -> usize {
        self.replays.iter().map(|r| r.timeline().len()).sum()
    }

    fn log(&self) {
        let rate = self
            .success_rate()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "n/a".to_string());
        info!("Parsing complete:");
        info!("\tReplays failed:    {}", self.failed);
        info!("\tReplays succeeded: {}", self.succeeded);
        info!("\tSuccess rate: {rate}");
    }
}

/// Decode `files` with `decoder`.
///
/// Files that fail to decode are deleted from disk so later runs over the
/// same directory do not retry them. Decoding runs on the current rayon pool;
/// deletion and counting happen afterwards in discovery order.
pub fn ingest_replays<D: ReplayDecoder>(
    files: &[PathBuf],
    decoder: &D,
    progress_every: usize,
) -> IngestReport {
    let total = files.len();
    let processed = AtomicUsize::new(0);

    let decoded: Vec<_> = files
        .par_iter()
        .map(|path| {
            let result = decoder.decode(path);
            let i = processed.fetch_add(1, Ordering::Relaxed);
            if let Some(line) = progress_line(i, total, progress_every) {
                info!("{line}");
            }
            result
        })
        .collect();

    let mut report = IngestReport::default();
    for (path, result) in files.iter().zip(decoded) {
        match result {
            Ok(mut replay) => {
                replay.attach_source(path);
                report.replays.push(replay);
                report.succeeded += 1;
            }
            Err(err) => {
                debug!("dropping {}: {err}", path.display());
                if let Err(err) = discard(path) {
                    warn!("{err:#}");
                }
                report.failed += 1;
            }
        }
    }
    report.log();
    report
}

/// Progress line for the `i`-th completed decode (zero-based), emitted every
/// `every` files starting with the first.
fn progress_line(i: usize, total: usize, every: usize) -> Option<String> {
    (i % every.max(1) == 0).then(|| format!("{i}/{total} files parsed..."))
}

fn discard(path: &Path) -> Result<()> {
    fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
}
