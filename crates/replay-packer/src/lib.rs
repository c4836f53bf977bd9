pub mod archive;
pub mod config;
pub mod counter;
pub mod decoder;
pub mod discovery;
pub mod features;
pub mod ingest;
pub mod replay;
pub mod schema;
pub mod table;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::archive::{SummaryArchiver, SummaryRef};
use crate::config::PipelineConfig;
use crate::counter::SummaryCounter;
use crate::decoder::ReplayDecoder;
use crate::features::extract_replay;
use crate::ingest::{IngestReport, ingest_replays};
use crate::schema::FeatureSchema;
use crate::table::TableWriter;

pub use crate::decoder::DumpDecoder;

/// Packing configuration supplied by the CLI.
#[derive(Clone, Debug)]
pub struct PackOptions {
    /// Directory scanned for replay files.
    pub input_dir: PathBuf,
    /// Replay extension filter (no leading dot).
    pub extension: String,
    /// Descend into subdirectories of `input_dir`.
    pub recursive: bool,
    /// Destination of the assembled CSV.
    pub output_file: PathBuf,
    /// Where per-replay summaries go; `None` disables archival.
    pub summary_dir: Option<PathBuf>,
    /// Persisted summary id counter.
    pub counter_file: PathBuf,
    pub schema: FeatureSchema,
    pub progress_every: usize,
    /// Optional override for Rayon worker count.
    pub max_workers: Option<usize>,
    /// Replace an existing output file when true.
    pub overwrite: bool,
}

impl PackOptions {
    pub fn from_config(cfg: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            input_dir: cfg.input_dir.clone(),
            extension: cfg.extension.clone(),
            recursive: cfg.recursive,
            output_file: cfg.output_file.clone(),
            summary_dir: cfg.archive_summaries.then(|| cfg.summary_dir.clone()),
            counter_file: cfg.counter_file.clone(),
            schema: cfg.schema()?,
            progress_every: cfg.progress_every,
            max_workers: cfg.workers,
            overwrite: cfg.overwrite,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackSummary {
    pub files: usize,
    pub replays: usize,
    pub failed: usize,
    pub success_rate: Option<f64>,
    pub rows: usize,
    pub columns: usize,
    pub summaries_written: usize,
    pub summaries_skipped: usize,
}

pub(crate) fn default_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Discover, decode, extract, archive and assemble in one pass.
pub fn pack_replays<D: ReplayDecoder>(opts: &PackOptions, decoder: &D) -> Result<PackSummary> {
    // Surface schema/extractor mismatches, an unusable counter and an
    // existing output before any failing replay is deleted.
    opts.schema.validate()?;
    if opts.summary_dir.is_some() {
        let next = SummaryCounter::new(&opts.counter_file).peek().with_context(|| {
            format!("unusable summary counter {}", opts.counter_file.display())
        })?;
        info!("Next summary id: {next}");
    }
    if opts.output_file.exists() && !opts.overwrite {
        bail!("{} already exists (use --overwrite)", opts.output_file.display());
    }

    let files = discovery::discover_replays(&opts.input_dir, &opts.extension, opts.recursive)?;
    info!(
        "Looking for .{} files: {} found, starting parsing",
        opts.extension,
        files.len()
    );
    if files.is_empty() {
        warn!("no .{} files under {}", opts.extension, opts.input_dir.display());
    }

    let report = match opts.max_workers {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .context("failed to build rayon thread pool")?
            .install(|| ingest_replays(&files, decoder, opts.progress_every)),
        None => ingest_replays(&files, decoder, opts.progress_every),
    };

    let total_states = report.total_states();
    info!("Starting feature processing on {total_states} observations");

    let (written, skipped, rows, columns) = assemble(opts, &report)?;
    info!("Output shape: ({rows}, {columns})");

    Ok(PackSummary {
        files: files.len(),
        replays: report.succeeded,
        failed: report.failed,
        success_rate: report.success_rate(),
        rows,
        columns,
        summaries_written: written,
        summaries_skipped: skipped,
    })
}

fn assemble(opts: &PackOptions, report: &IngestReport) -> Result<(usize, usize, usize, usize)> {
    let counter = SummaryCounter::new(&opts.counter_file);
    let archiver = match &opts.summary_dir {
        Some(dir) => Some(SummaryArchiver::new(dir, &counter, &opts.schema)?),
        None => None,
    };
    let mut table = TableWriter::create(&opts.output_file, &opts.schema, opts.overwrite)?;

    let pb = default_progress_bar(report.replays.len() as u64);
    pb.set_message("extracting features");
    let mut written = 0usize;
    let mut skipped = 0usize;
    for replay in &report.replays {
        let rows = extract_replay(replay, &opts.schema)?;
        let summary = match &archiver {
            Some(archiver) => archiver.archive(replay, &rows)?,
            None => SummaryRef::NotArchived,
        };
        match summary {
            SummaryRef::Archived(_) => written += 1,
            SummaryRef::NotArchived if archiver.is_some() => skipped += 1,
            SummaryRef::NotArchived => {}
        }
        table.write_replay(summary, &rows, replay.winner())?;
        pb.inc(1);
    }
    pb.finish_with_message("replays processed");

    let (rows, columns) = table.finish(report.total_states())?;
    info!("Wrote {} ({} summaries, {} skipped)", opts.output_file.display(), written, skipped);
    Ok((written, skipped, rows, columns))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_summary;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn player(gameloop: u32, minerals: u64) -> Value {
        json!({
            "gameloop": gameloop,
            "unspent_resources": {"minerals": minerals, "gas": 0},
            "unit": {"Drone": {}},
            "building": {},
            "upgrade": [],
            "workers_active": 12,
            "supply_cap": 15,
            "resources_collected": {"minerals": 0, "gas": 0},
            "total_army_value": 0
        })
    }

    fn write_dump(path: &Path, winner: u8, states: &[(u32, u64, u64)]) {
        let timeline: Vec<Value> = states
            .iter()
            .map(|&(gl, m1, m2)| json!({"1": player(gl, m1), "2": player(gl, m2)}))
            .collect();
        let dump = json!({
            "metadata": {"map": "Acropolis", "winner": winner},
            "summary": {"game_length": states.len()},
            "timeline": timeline
        });
        fs::write(path, serde_json::to_vec(&dump).unwrap()).unwrap();
    }

    fn options(root: &Path) -> PackOptions {
        PackOptions {
            input_dir: root.join("replays"),
            extension: "SC2Replay".into(),
            recursive: false,
            output_file: root.join("output.csv"),
            summary_dir: Some(root.join("replay_metadata")),
            counter_file: root.join("about_file_number.txt"),
            schema: FeatureSchema::default(),
            progress_every: 1000,
            max_workers: Some(2),
            overwrite: false,
        }
    }

    #[test]
    fn three_file_batch() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        write_dump(&replays.join("a.SC2Replay"), 1, &[(0, 50, 75)]);
        fs::write(replays.join("b.SC2Replay"), b"\x00MPQ garbage").unwrap();
        write_dump(&replays.join("c.SC2Replay"), 2, &[(0, 50, 50), (160, 10, 20)]);

        let opts = options(tmp.path());
        let summary = pack_replays(&opts, &DumpDecoder).unwrap();

        assert!(!replays.join("b.SC2Replay").exists());
        assert_eq!(summary.replays, 2);
        assert_eq!(summary.failed, 1);
        assert!((summary.success_rate.unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.columns, opts.schema.table_width());
        assert_eq!(summary.summaries_written, 2);

        let text = fs::read_to_string(&opts.output_file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], opts.schema.table_header().join(","));
        for line in &lines[1..] {
            assert_eq!(line.split(',').count(), opts.schema.table_width());
        }
        // a: p1 minerals 50, p2 minerals 75, winner 1
        let first: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(&first[..4], ["0", "00000.abt", "0", "50"]);
        assert_eq!(first[3 + opts.schema.len()], "75");
        assert_eq!(*first.last().unwrap(), "1");
        let ids: Vec<&str> = lines[1..].iter().map(|l| l.split(',').nth(1).unwrap()).collect();
        assert_eq!(ids, ["00000.abt", "00001.abt", "00001.abt"]);
        assert!(lines[1..].iter().skip(1).all(|l| l.ends_with(",2")));

        let meta_dir = tmp.path().join("replay_metadata");
        assert_eq!(read_summary(&meta_dir.join("00000.abt")).unwrap().rows.len(), 1);
        let c = read_summary(&meta_dir.join("00001.abt")).unwrap();
        assert_eq!(c.rows.len(), 2);
        assert!(
            c.entries
                .iter()
                .any(|(k, v)| k == "filename" && v.ends_with("c.SC2Replay"))
        );
        assert_eq!(
            fs::read_to_string(tmp.path().join("about_file_number.txt")).unwrap(),
            "2"
        );
    }

    #[test]
    fn ids_keep_increasing_across_runs() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        write_dump(&replays.join("a.SC2Replay"), 1, &[(0, 1, 1)]);

        let mut opts = options(tmp.path());
        opts.overwrite = true;
        pack_replays(&opts, &DumpDecoder).unwrap();
        pack_replays(&opts, &DumpDecoder).unwrap();

        let text = fs::read_to_string(&opts.output_file).unwrap();
        assert!(text.lines().nth(1).unwrap().starts_with("0,00001.abt,"));
        let meta_dir = tmp.path().join("replay_metadata");
        assert!(meta_dir.join("00000.abt").exists());
        assert!(meta_dir.join("00001.abt").exists());
    }

    #[test]
    fn archival_can_be_disabled() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        write_dump(&replays.join("a.SC2Replay"), 2, &[(0, 1, 1), (16, 2, 2)]);

        let mut opts = options(tmp.path());
        opts.summary_dir = None;
        let summary = pack_replays(&opts, &DumpDecoder).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.summaries_written, 0);
        assert_eq!(summary.summaries_skipped, 0);
        assert!(!tmp.path().join("about_file_number.txt").exists());
        let text = fs::read_to_string(&opts.output_file).unwrap();
        assert!(text.lines().skip(1).all(|l| l.split(',').nth(1) == Some("nofile")));
    }

    #[test]
    fn empty_directory_writes_header_only() {
        let tmp = tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("replays")).unwrap();
        let opts = options(tmp.path());
        let summary = pack_replays(&opts, &DumpDecoder).unwrap();
        assert_eq!(summary.success_rate, None);
        assert_eq!(summary.rows, 0);
        let text = fs::read_to_string(&opts.output_file).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn schema_mismatch_aborts_before_any_work() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        fs::write(replays.join("b.SC2Replay"), b"garbage").unwrap();

        let mut opts = options(tmp.path());
        opts.schema = FeatureSchema::new(["unit_count", "apm"]).unwrap();
        let err = pack_replays(&opts, &DumpDecoder).unwrap_err();
        assert!(err.to_string().contains("apm"));
        assert!(replays.join("b.SC2Replay").exists());
        assert!(!opts.output_file.exists());
    }

    #[test]
    fn corrupt_counter_aborts_before_deleting_inputs() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        write_dump(&replays.join("a.SC2Replay"), 1, &[(0, 1, 1)]);
        fs::write(replays.join("b.SC2Replay"), b"garbage").unwrap();
        fs::write(tmp.path().join("about_file_number.txt"), "five").unwrap();

        let opts = options(tmp.path());
        let err = pack_replays(&opts, &DumpDecoder).unwrap_err();
        assert!(format!("{err:#}").contains("counter"));
        assert!(replays.join("b.SC2Replay").exists());
        assert!(!opts.output_file.exists());
        assert!(!tmp.path().join("output.csv.tmp").exists());
    }

    #[test]
    fn existing_output_aborts_before_deleting_inputs() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        fs::write(replays.join("b.SC2Replay"), b"garbage").unwrap();
        let opts = options(tmp.path());
        fs::write(&opts.output_file, "old").unwrap();

        assert!(pack_replays(&opts, &DumpDecoder).is_err());
        assert!(replays.join("b.SC2Replay").exists());
        assert_eq!(fs::read_to_string(&opts.output_file).unwrap(), "old");
    }

    #[test]
    fn comma_in_winner_drops_only_that_replay() {
        let tmp = tempdir().unwrap();
        let replays = tmp.path().join("replays");
        fs::create_dir_all(&replays).unwrap();
        write_dump(&replays.join("a.SC2Replay"), 1, &[(0, 50, 75)]);
        let dump = json!({
            "metadata": {"winner": "Player 1, Zerg"},
            "timeline": [{"1": player(0, 1), "2": player(0, 2)}]
        });
        fs::write(replays.join("b.SC2Replay"), serde_json::to_vec(&dump).unwrap()).unwrap();

        let opts = options(tmp.path());
        let summary = pack_replays(&opts, &DumpDecoder).unwrap();
        assert_eq!((summary.replays, summary.failed, summary.rows), (1, 1, 1));
        assert!(!replays.join("b.SC2Replay").exists());
        let text = fs::read_to_string(&opts.output_file).unwrap();
        for line in text.lines() {
            assert_eq!(line.split(',').count(), opts.schema.table_width());
        }
    }
}
