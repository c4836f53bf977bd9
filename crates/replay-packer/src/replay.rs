//! In-memory model of a decoded replay.
//!
//! A [`Replay`] is what the decoder hands to the pipeline: ordered metadata
//! and summary mappings plus the timeline of [`GameState`] snapshots. Nothing
//! downstream mutates these values; the ingestion controller only attaches
//! the source path to the metadata before handing the replay on.

use std::path::Path;

use serde_json::{Map, Value};

/// Metadata key carrying the winning player slot.
pub const WINNER_KEY: &str = "winner";
/// Metadata key attached by the ingestion controller.
pub const FILENAME_KEY: &str = "filename";

/// Snapshot of a single player's economy and army at one game loop.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlayerState {
    pub unspent_minerals: u64,
    pub unspent_gas: u64,
    pub unit_count: u64,
    pub building_count: u64,
    pub upgrade_count: u64,
    pub active_workers: u64,
    pub supply_cap: u64,
    /// Cumulative minerals collected up to this loop.
    pub minerals_collected: u64,
    /// Cumulative gas collected up to this loop.
    pub gas_collected: u64,
    /// Aggregate resource value of the living army.
    pub army_value: f64,
}

/// Both players at one point in game time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GameState {
    pub gameloop: u32,
    pub players: [PlayerState; 2],
}

impl GameState {
    pub fn new(gameloop: u32, p1: PlayerState, p2: PlayerState) -> Self {
        Self {
            gameloop,
            players: [p1, p2],
        }
    }

    /// Player by slot number (1 or 2).
    pub fn player(&self, slot: usize) -> Option<&PlayerState> {
        slot.checked_sub(1).and_then(|idx| self.players.get(idx))
    }
}

/// A successfully decoded replay.
#[derive(Clone, Debug, PartialEq)]
pub struct Replay {
    metadata: Map<String, Value>,
    summary: Map<String, Value>,
    timeline: Vec<GameState>,
    winner: Value,
}

impl Replay {
    /// Build a replay, returning `None` when the metadata lacks a winner.
    pub fn new(
        metadata: Map<String, Value>,
        summary: Map<String, Value>,
        timeline: Vec<GameState>,
    ) -> Option<Self> {
        let winner = metadata.get(WINNER_KEY)?.clone();
        Some(Self {
            metadata,
            summary,
            timeline,
            winner,
        })
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn summary(&self) -> &Map<String, Value> {
        &self.summary
    }

    pub fn timeline(&self) -> &[GameState] {
        &self.timeline
    }

    pub fn winner(&self) -> &Value {
        &self.winner
    }

    /// Source file the replay was decoded from, once attached.
    pub fn source_path(&self) -> Option<&str> {
        self.metadata.get(FILENAME_KEY).and_then(Value::as_str)
    }

    pub(crate) fn attach_source(&mut self, path: &Path) {
        self.metadata.insert(
            FILENAME_KEY.to_string(),
            Value::String(path.display().to_string()),
        );
    }
}

/// Render a JSON value the way it should appear in text outputs: strings
/// raw, everything else as compact JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
