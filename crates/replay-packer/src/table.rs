//! CSV assembly of every extracted row.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;

use crate::archive::SummaryRef;
use crate::features::StateRow;
use crate::replay::display_value;
use crate::schema::FeatureSchema;

/// Streams output rows to `<path>.tmp` and renames into place on finish.
///
/// Rows are numbered globally in the order they are appended, and every row
/// is checked against the schema width before it is written. Dropping the
/// writer without a successful [`TableWriter::finish`] removes the temp file.
pub struct TableWriter {
    writer: Option<BufWriter<File>>,
    tmp_path: PathBuf,
    final_path: PathBuf,
    width: usize,
    rows_written: usize,
    committed: bool,
}

impl TableWriter {
    pub fn create(path: &Path, schema: &FeatureSchema, overwrite: bool) -> Result<Self> {
        if path.exists() && !overwrite {
            bail!("{} already exists (use --overwrite)", path.display());
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let tmp_path = tmp_path_for(path);
        let file = File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        let mut table = Self {
            writer: Some(BufWriter::new(file)),
            tmp_path,
            final_path: path.to_path_buf(),
            width: schema.table_width(),
            rows_written: 0,
            committed: false,
        };
        table.write_line(&schema.table_header())?;
        Ok(table)
    }

    /// Append all rows of one replay.
    pub fn write_replay(
        &mut self,
        summary: SummaryRef,
        rows: &[StateRow],
        winner: &Value,
    ) -> Result<()> {
        let summary = summary.to_string();
        let winner = display_value(winner);
        for row in rows {
            let mut cells = Vec::with_capacity(self.width);
            cells.push(self.rows_written.to_string());
            cells.push(summary.clone());
            cells.extend(row.cells());
            cells.push(winner.clone());
            if cells.len() != self.width {
                bail!(
                    "row {} has {} columns, expected {}",
                    self.rows_written,
                    cells.len(),
                    self.width
                );
            }
            self.write_line(&cells)?;
            self.rows_written += 1;
        }
        Ok(())
    }

    /// Flush and move the table into place; returns `(rows, columns)`.
    ///
    /// Nothing is renamed unless exactly `expected_rows` rows were written.
    pub fn finish(mut self, expected_rows: usize) -> Result<(usize, usize)> {
        if self.rows_written != expected_rows {
            bail!(
                "assembled {} rows but expected {expected_rows}",
                self.rows_written
            );
        }
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("failed to flush {}", self.tmp_path.display()))?;
        }
        fs::rename(&self.tmp_path, &self.final_path).with_context(|| {
            format!(
                "failed to rename {} -> {}",
                self.tmp_path.display(),
                self.final_path.display()
            )
        })?;
        self.committed = true;
        Ok((self.rows_written, self.width))
    }

    fn write_line(&mut self, cells: &[String]) -> Result<()> {
        // Cells are written unquoted, so a delimiter inside one would shift
        // every column after it.
        if let Some(cell) = cells.iter().find(|c| c.contains(&[',', '\n', '\r'][..])) {
            bail!(
                "cell {cell:?} in row {} contains a CSV delimiter",
                self.rows_written
            );
        }
        let Some(writer) = self.writer.as_mut() else {
            bail!("{} is already finished", self.tmp_path.display());
        };
        writeln!(writer, "{}", cells.join(","))
            .with_context(|| format!("failed to write {}", self.tmp_path.display()))?;
        Ok(())
    }
}

impl Drop for TableWriter {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
