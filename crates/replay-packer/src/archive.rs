//! Human-readable per-replay summaries.
//!
//! A summary file holds `key: value` lines for the replay metadata and
//! summary, a blank line, the per-state header and one row per game state.
//! Files are named after an id drawn from [`SummaryCounter`] and written via
//! a temporary sibling, so a failed write never leaves a partial file behind.

use std::fmt;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::warn;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::counter::SummaryCounter;
use crate::features::StateRow;
use crate::replay::{Replay, display_value};
use crate::schema::FeatureSchema;

const SUMMARY_EXT: &str = "abt";
const NO_SUMMARY: &str = "nofile";

/// Where a replay's rows point back to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SummaryRef {
    Archived(u64),
    NotArchived,
}

impl fmt::Display for SummaryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryRef::Archived(id) => write!(f, "{}", summary_file_name(*id)),
            SummaryRef::NotArchived => f.write_str(NO_SUMMARY),
        }
    }
}

/// `00005.abt` style file name for an id.
pub fn summary_file_name(id: u64) -> String {
    format!("{id:05X}.{SUMMARY_EXT}")
}

/// Per-replay archival failures. These never abort the batch.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("{field} cannot be represented in a summary line")]
    Encoding { field: String },
    #[error("failed to write summary: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes summaries into one directory, drawing ids from a shared counter.
pub struct SummaryArchiver<'a> {
    dir: PathBuf,
    counter: &'a SummaryCounter,
    schema: &'a FeatureSchema,
}

impl<'a> SummaryArchiver<'a> {
    pub fn new(dir: &Path, counter: &'a SummaryCounter, schema: &'a FeatureSchema) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create summary dir {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            counter,
            schema,
        })
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(summary_file_name(id))
    }

    /// Archive one replay.
    ///
    /// Write failures are logged and reported as [`SummaryRef::NotArchived`];
    /// only counter failures are returned as errors.
    pub fn archive(&self, replay: &Replay, rows: &[StateRow]) -> Result<SummaryRef> {
        let (id, written) = self
            .counter
            .allocate(|id| self.write_summary(id, replay, rows))?;
        match written {
            Ok(()) => Ok(SummaryRef::Archived(id)),
            Err(err) => {
                warn!(
                    "skipping summary {} for {}: {err}",
                    summary_file_name(id),
                    replay.source_path().unwrap_or("<unknown>")
                );
                Ok(SummaryRef::NotArchived)
            }
        }
    }

    fn write_summary(
        &self,
        id: u64,
        replay: &Replay,
        rows: &[StateRow],
    ) -> std::result::Result<(), ArchiveError> {
        let final_path = self.path_for(id);
        let tmp_path = final_path.with_extension(format!("{SUMMARY_EXT}.tmp"));
        let result = (|| -> std::result::Result<(), ArchiveError> {
            let file = File::create(&tmp_path)?;
            let mut out = BufWriter::new(file);
            write_entries(&mut out, "metadata", replay.metadata())?;
            write_entries(&mut out, "summary", replay.summary())?;
            writeln!(out)?;
            writeln!(out, "{}", self.schema.state_header().join(","))?;
            let name = summary_file_name(id);
            for row in rows {
                write!(out, "{name}")?;
                for cell in row.cells() {
                    write!(out, ",{cell}")?;
                }
                writeln!(out)?;
            }
            out.flush()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })();
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

fn write_entries<W: Write>(
    out: &mut W,
    section: &str,
    entries: &Map<String, Value>,
) -> std::result::Result<(), ArchiveError> {
    for (key, value) in entries {
        let value = display_value(value);
        // `read_summary` splits on the first ": ", so keys may not contain it.
        if key.contains(": ") {
            return Err(ArchiveError::Encoding {
                field: format!("{section}.{key}"),
            });
        }
        check_line(section, key, key)?;
        check_line(section, key, &value)?;
        writeln!(out, "{key}: {value}")?;
    }
    Ok(())
}

fn check_line(section: &str, key: &str, text: &str) -> std::result::Result<(), ArchiveError> {
    if text.contains(&['\n', '\r', '\0'][..]) {
        return Err(ArchiveError::Encoding {
            field: format!("{section}.{key}"),
        });
    }
    Ok(())
}

/// Parsed contents of a summary file.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SummaryFile {
    /// Metadata then summary entries, in file order.
    pub entries: Vec<(String, String)>,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read a summary file back into its entries, header and rows.
pub fn read_summary(path: &Path) -> Result<SummaryFile> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut summary = SummaryFile::default();
    for line in lines.by_ref() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.is_empty() {
            break;
        }
        let Some((key, value)) = line.split_once(": ") else {
            bail!("malformed entry line in {}: {line:?}", path.display());
        };
        summary.entries.push((key.to_string(), value.to_string()));
    }
    let Some(header) = lines.next() else {
        bail!("{} has no header line", path.display());
    };
    let header = header.with_context(|| format!("failed to read {}", path.display()))?;
    summary.header = header.split(',').map(str::to_string).collect();
    for line in lines {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        let row: Vec<String> = line.split(',').map(str::to_string).collect();
        if row.len() != summary.header.len() {
            bail!(
                "row has {} cells but header has {} in {}",
                row.len(),
                summary.header.len(),
                path.display()
            );
        }
        summary.rows.push(row);
    }
    Ok(summary)
}
