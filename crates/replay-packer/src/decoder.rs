//! Replay decoding seam.
//!
//! The pipeline only depends on [`ReplayDecoder`]. [`DumpDecoder`] reads
//! replays that an external parser already exported to JSON (plain or
//! gzip-compressed), which keeps the binary usable without linking a native
//! replay engine.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::replay::{GameState, PlayerState, Replay};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Why a file could not be turned into a [`Replay`].
///
/// Every variant is recoverable at batch level: the ingestion controller
/// drops the file and moves on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read replay: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed replay dump: {0}")]
    Json(#[from] serde_json::Error),
    #[error("game state {index} has no data for player {slot}")]
    MissingPlayer { index: usize, slot: usize },
    #[error("replay metadata has no winner")]
    MissingWinner,
    #[error("winner {0} is not a plain scalar")]
    InvalidWinner(String),
    #[error("unsupported replay: {0}")]
    Unsupported(String),
}

/// Turns one replay file into a [`Replay`].
pub trait ReplayDecoder: Sync {
    fn decode(&self, path: &Path) -> Result<Replay, DecodeError>;
}

impl<F> ReplayDecoder for F
where
    F: Fn(&Path) -> Result<Replay, DecodeError> + Sync,
{
    fn decode(&self, path: &Path) -> Result<Replay, DecodeError> {
        self(path)
    }
}

/// Decoder for JSON replay dumps, gzip detected by magic bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct DumpDecoder;

#[derive(Debug, Deserialize)]
struct DumpRecord {
    metadata: Map<String, Value>,
    #[serde(default)]
    summary: Map<String, Value>,
    #[serde(default)]
    timeline: Vec<HashMap<String, PlayerRecord>>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourcePair {
    #[serde(default)]
    minerals: u64,
    #[serde(default)]
    gas: u64,
}

#[derive(Debug, Deserialize)]
struct PlayerRecord {
    #[serde(default)]
    gameloop: u32,
    #[serde(default)]
    unspent_resources: ResourcePair,
    #[serde(default)]
    unit: Collection,
    #[serde(default)]
    building: Collection,
    #[serde(default)]
    upgrade: Collection,
    #[serde(default)]
    workers_active: u64,
    #[serde(default)]
    supply_cap: u64,
    #[serde(default)]
    resources_collected: ResourcePair,
    #[serde(default)]
    total_army_value: f64,
}

/// Units, buildings and upgrades may be exported either as an object keyed by
/// name or as a list; only the number of entries matters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Collection {
    Keyed(Map<String, Value>),
    Listed(Vec<Value>),
}

impl Default for Collection {
    fn default() -> Self {
        Collection::Listed(Vec::new())
    }
}

impl Collection {
    fn len(&self) -> u64 {
        match self {
            Collection::Keyed(m) => m.len() as u64,
            Collection::Listed(v) => v.len() as u64,
        }
    }
}

impl From<PlayerRecord> for PlayerState {
    fn from(rec: PlayerRecord) -> Self {
        PlayerState {
            unspent_minerals: rec.unspent_resources.minerals,
            unspent_gas: rec.unspent_resources.gas,
            unit_count: rec.unit.len(),
            building_count: rec.building.len(),
            upgrade_count: rec.upgrade.len(),
            active_workers: rec.workers_active,
            supply_cap: rec.supply_cap,
            minerals_collected: rec.resources_collected.minerals,
            gas_collected: rec.resources_collected.gas,
            army_value: rec.total_army_value,
        }
    }
}

impl DumpDecoder {
    /// Decode from any reader; gzip streams are unwrapped transparently.
    pub fn decode_reader<R: Read>(&self, reader: R) -> Result<Replay, DecodeError> {
        let mut reader = BufReader::new(reader);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let record: DumpRecord = if bytes.starts_with(&GZIP_MAGIC) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(bytes.as_slice())))?
        } else {
            serde_json::from_slice(&bytes)?
        };
        into_replay(record)
    }
}

impl ReplayDecoder for DumpDecoder {
    fn decode(&self, path: &Path) -> Result<Replay, DecodeError> {
        let file = File::open(path)?;
        self.decode_reader(file)
    }
}

fn into_replay(record: DumpRecord) -> Result<Replay, DecodeError> {
    let mut timeline = Vec::with_capacity(record.timeline.len());
    for (index, mut players) in record.timeline.into_iter().enumerate() {
        let p1 = players
            .remove("1")
            .ok_or(DecodeError::MissingPlayer { index, slot: 1 })?;
        let p2 = players
            .remove("2")
            .ok_or(DecodeError::MissingPlayer { index, slot: 2 })?;
        // The game clock is carried on player 1's snapshot.
        let gameloop = p1.gameloop;
        timeline.push(GameState::new(gameloop, p1.into(), p2.into()));
    }
    if timeline.windows(2).any(|w| w[0].gameloop > w[1].gameloop) {
        return Err(DecodeError::Unsupported(
            "timeline is not ordered by gameloop".into(),
        ));
    }
    let replay = Replay::new(record.metadata, record.summary, timeline)
        .ok_or(DecodeError::MissingWinner)?;
    check_winner(replay.winner())?;
    Ok(replay)
}

/// The winner lands unquoted in a CSV cell, so only scalars without
/// delimiters are accepted.
fn check_winner(winner: &Value) -> Result<(), DecodeError> {
    let plain = match winner {
        Value::Number(_) | Value::Bool(_) => true,
        Value::String(s) => !s.is_empty() && !s.contains(&[',', '\n', '\r'][..]),
        _ => false,
    };
    if plain {
        Ok(())
    } else {
        Err(DecodeError::InvalidWinner(winner.to_string()))
    }
}
