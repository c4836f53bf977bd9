//! File-backed monotonic id sequence for summary files.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;

/// Persisted counter handing out strictly increasing ids.
///
/// The file holds the next id as base-10 text and survives across runs. A
/// missing file starts the sequence at zero.
pub struct SummaryCounter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SummaryCounter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Current value without advancing.
    pub fn peek(&self) -> Result<u64> {
        let _guard = self.lock.lock();
        self.read()
    }

    /// Allocate one id and run `f` with it inside the critical section.
    ///
    /// The counter advances and is persisted whatever `f` returns, so an id
    /// handed to a failed write is never reused.
    pub fn allocate<T>(&self, f: impl FnOnce(u64) -> T) -> Result<(u64, T)> {
        let _guard = self.lock.lock();
        let id = self.read()?;
        let out = f(id);
        let next = id
            .checked_add(1)
            .ok_or_else(|| anyhow!("summary counter overflow at {id}"))?;
        self.write(next)?;
        Ok((id, out))
    }

    fn read(&self) -> Result<u64> {
        if !self.path.exists() {
            return Ok(0);
        }
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        text.trim().parse().with_context(|| {
            format!(
                "counter file {} does not hold an integer: {:?}",
                self.path.display(),
                text
            )
        })
    }

    fn write(&self, value: u64) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, value.to_string())
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "failed to rename {} -> {}",
                tmp.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }
}
