//! Feature schema shared by extraction, summaries and the output CSV.
//!
//! The schema is an ordered list of feature names. Extraction projects each
//! player's feature map through this list, and every header written by the
//! crate is derived from the same instance, so column order cannot drift
//! between producers and consumers.

use std::collections::HashSet;

use thiserror::Error;

use crate::features::FeatureMap;
use crate::replay::PlayerState;

/// Leading administrative columns of the output CSV.
pub const ADMIN_HEADER: [&str; 3] = ["id", "file_name", "gametime"];
/// Trailing administrative columns of the output CSV.
pub const ADMIN_FOOTER: [&str; 1] = ["winner"];

/// Column order used when no explicit feature list is configured.
pub const DEFAULT_FEATURES: [&str; 10] = [
    "unspent_minerals",
    "unspent_gas",
    "unit_count",
    "building_count",
    "upgrade_count",
    "active_workers",
    "supply_cap",
    "total_gas_collected",
    "total_minerals_collected",
    "total_army_value",
];

/// Contract violations between the schema and the extractor's feature map.
///
/// These are never recovered from: a row built against a broken schema would
/// misalign every column after it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("feature '{0}' is not produced by the extractor")]
    UnknownFeature(String),
    #[error("feature '{0}' appears more than once in the schema")]
    Duplicate(String),
    #[error("feature schema is empty")]
    Empty,
}

/// Ordered feature names defining every column layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            names: DEFAULT_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FeatureSchema {
    /// Build a schema from an ordered list of names.
    ///
    /// Only structural problems (empty, duplicates) are rejected here; unknown
    /// names surface from [`FeatureSchema::validate`] or at extraction time.
    pub fn new<I, S>(names: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::new();
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(SchemaError::Duplicate(name.clone()));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Fail fast if any schema key would miss during extraction.
    ///
    /// Runs the real projection against a blank player so the check can never
    /// disagree with what extraction does later.
    pub fn validate(&self) -> Result<(), SchemaError> {
        FeatureMap::from_player(&PlayerState::default())
            .project(self)
            .map(|_| ())
    }

    /// Schema names with a player prefix, e.g. `p1_unit_count`.
    pub fn player_columns(&self, slot: usize) -> Vec<String> {
        self.names
            .iter()
            .map(|name| format!("p{slot}_{name}"))
            .collect()
    }

    /// Per-state columns: `file_name`, `gametime`, then both players.
    ///
    /// This is the header of the per-replay summary files; it matches the
    /// output CSV minus the row index and winner.
    pub fn state_header(&self) -> Vec<String> {
        let mut header: Vec<String> = ADMIN_HEADER[1..].iter().map(|s| s.to_string()).collect();
        header.extend(self.player_columns(1));
        header.extend(self.player_columns(2));
        header
    }

    /// Full CSV header including administrative prefix and suffix columns.
    pub fn table_header(&self) -> Vec<String> {
        let mut header: Vec<String> = ADMIN_HEADER.iter().map(|s| s.to_string()).collect();
        header.extend(self.player_columns(1));
        header.extend(self.player_columns(2));
        header.extend(ADMIN_FOOTER.iter().map(|s| s.to_string()));
        header
    }

    /// Number of columns in every CSV row.
    pub fn table_width(&self) -> usize {
        ADMIN_HEADER.len() + 2 * self.len() + ADMIN_FOOTER.len()
    }
}
