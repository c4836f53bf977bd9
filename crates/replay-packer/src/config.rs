use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::schema::FeatureSchema;

/// On-disk pipeline configuration (TOML). Every field has a default, so an
/// empty file is a valid configuration.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default = "defaults::input_dir")]
    pub input_dir: PathBuf,
    /// Replay file extension, without the dot. Matched case-sensitively.
    #[serde(default = "defaults::extension")]
    pub extension: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default = "defaults::summary_dir")]
    pub summary_dir: PathBuf,
    /// File holding the next summary id; never reset between runs.
    #[serde(default = "defaults::counter_file")]
    pub counter_file: PathBuf,
    #[serde(default = "defaults::output_file")]
    pub output_file: PathBuf,
    #[serde(default = "defaults::archive_summaries")]
    pub archive_summaries: bool,
    /// Log a progress line every N files.
    #[serde(default = "defaults::progress_every")]
    pub progress_every: usize,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub overwrite: bool,
    /// Ordered feature names; omit for the default schema.
    #[serde(default)]
    pub features: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: defaults::input_dir(),
            extension: defaults::extension(),
            recursive: false,
            summary_dir: defaults::summary_dir(),
            counter_file: defaults::counter_file(),
            output_file: defaults::output_file(),
            archive_summaries: defaults::archive_summaries(),
            progress_every: defaults::progress_every(),
            workers: None,
            overwrite: false,
            features: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn schema(&self) -> Result<FeatureSchema> {
        match &self.features {
            Some(names) => FeatureSchema::new(names.iter().cloned())
                .context("invalid feature list in config"),
            None => Ok(FeatureSchema::default()),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    pub fn input_dir() -> PathBuf { PathBuf::from("replays") }
    pub fn extension() -> String { "SC2Replay".to_string() }
    pub fn summary_dir() -> PathBuf { PathBuf::from("replay_metadata") }
    pub fn counter_file() -> PathBuf { PathBuf::from("about_file_number.txt") }
    pub fn output_file() -> PathBuf { PathBuf::from("output.csv") }
    pub fn archive_summaries() -> bool { true }
    pub fn progress_every() -> usize { 1000 }
}
