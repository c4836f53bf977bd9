use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::info;
use replay_packer::config::PipelineConfig;
use replay_packer::{DumpDecoder, PackOptions, pack_replays};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Pack decoded game replays into a per-observation CSV dataset"
)]
struct Cli {
    /// TOML config file; flags below override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory containing replay files
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Replay file extension (without the dot)
    #[arg(long, value_name = "EXT")]
    extension: Option<String>,

    /// Scan subdirectories of the input directory too
    #[arg(long)]
    recursive: bool,

    /// Output CSV path
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Directory for per-replay summary files
    #[arg(long, value_name = "DIR")]
    summary_dir: Option<PathBuf>,

    /// Persisted summary id counter file
    #[arg(long, value_name = "FILE")]
    counter_file: Option<PathBuf>,

    /// Skip writing per-replay summaries
    #[arg(long)]
    no_summaries: bool,

    /// Log a progress line every N files
    #[arg(long, value_name = "N")]
    progress_every: Option<usize>,

    /// Number of decoder threads (defaults to Rayon default)
    #[arg(long, value_name = "N")]
    workers: Option<usize>,

    /// Overwrite the output CSV if present
    #[arg(long)]
    overwrite: bool,
}

impl Cli {
    fn into_config(self) -> Result<PipelineConfig> {
        let mut cfg = match &self.config {
            Some(path) => PipelineConfig::from_toml(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(input) = self.input {
            cfg.input_dir = input;
        }
        if let Some(extension) = self.extension {
            cfg.extension = extension.trim_start_matches('.').to_string();
        }
        if let Some(output) = self.output {
            cfg.output_file = output;
        }
        if let Some(dir) = self.summary_dir {
            cfg.summary_dir = dir;
        }
        if let Some(path) = self.counter_file {
            cfg.counter_file = path;
        }
        if let Some(n) = self.progress_every {
            cfg.progress_every = n;
        }
        if self.workers.is_some() {
            cfg.workers = self.workers;
        }
        cfg.recursive |= self.recursive;
        cfg.overwrite |= self.overwrite;
        if self.no_summaries {
            cfg.archive_summaries = false;
        }
        Ok(cfg)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cfg = cli.into_config()?;
    let options = PackOptions::from_config(&cfg)?;
    let summary = pack_replays(&options, &DumpDecoder)?;
    info!(
        "Completed packing: {} of {} files decoded, {} rows x {} columns, {} summaries",
        summary.replays, summary.files, summary.rows, summary.columns, summary.summaries_written
    );
    Ok(())
}
