//! Per-state feature extraction.
//!
//! Each player state is first turned into a [`FeatureMap`] keyed by feature
//! name and then projected through the [`FeatureSchema`]. Adding a feature
//! means adding it here and to the schema; a schema key missing from the map
//! is a hard [`SchemaError`].

use std::collections::HashMap;
use std::fmt;

use crate::replay::{GameState, PlayerState, Replay};
use crate::schema::{FeatureSchema, SchemaError};

/// A single numeric feature value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FeatureValue {
    Count(u64),
    Amount(f64),
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Count(v) => write!(f, "{v}"),
            FeatureValue::Amount(v) => write!(f, "{v}"),
        }
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Count(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Amount(v)
    }
}

/// Every feature the extractor knows how to produce, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct FeatureMap {
    values: HashMap<&'static str, FeatureValue>,
}

impl FeatureMap {
    pub fn from_player(player: &PlayerState) -> Self {
        let values: HashMap<&'static str, FeatureValue> = HashMap::from([
            ("unspent_minerals", player.unspent_minerals.into()),
            ("unspent_gas", player.unspent_gas.into()),
            ("unit_count", player.unit_count.into()),
            ("building_count", player.building_count.into()),
            ("upgrade_count", player.upgrade_count.into()),
            ("active_workers", player.active_workers.into()),
            ("supply_cap", player.supply_cap.into()),
            ("total_gas_collected", player.gas_collected.into()),
            ("total_minerals_collected", player.minerals_collected.into()),
            ("total_army_value", player.army_value.into()),
        ]);
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.values.get(name).copied()
    }

    /// Look up every schema key in order.
    pub fn project(&self, schema: &FeatureSchema) -> Result<Vec<FeatureValue>, SchemaError> {
        schema
            .names()
            .iter()
            .map(|name| {
                self.get(name)
                    .ok_or_else(|| SchemaError::UnknownFeature(name.clone()))
            })
            .collect()
    }
}

/// Features extracted from one game state, before any summary id is known.
#[derive(Clone, Debug, PartialEq)]
pub struct StateRow {
    pub gameloop: u32,
    pub p1: Vec<FeatureValue>,
    pub p2: Vec<FeatureValue>,
}

impl StateRow {
    /// Cells in column order: gameloop, player 1, player 2.
    pub fn cells(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.gameloop.to_string())
            .chain(self.p1.iter().map(ToString::to_string))
            .chain(self.p2.iter().map(ToString::to_string))
    }
}

pub fn extract_state(state: &GameState, schema: &FeatureSchema) -> Result<StateRow, SchemaError> {
    let [p1, p2] = &state.players;
    Ok(StateRow {
        gameloop: state.gameloop,
        p1: FeatureMap::from_player(p1).project(schema)?,
        p2: FeatureMap::from_player(p2).project(schema)?,
    })
}

/// One row per timeline entry, in timeline order.
pub fn extract_replay(replay: &Replay, schema: &FeatureSchema) -> Result<Vec<StateRow>, SchemaError> {
    replay
        .timeline()
        .iter()
        .map(|state| extract_state(state, schema))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DEFAULT_FEATURES;

    fn player(minerals: u64, units: u64) -> PlayerState {
        PlayerState {
            unspent_minerals: minerals,
            unit_count: units,
            army_value: 250.5,
            ..Default::default()
        }
    }

    #[test]
    fn projection_follows_schema_order() {
        let p = player(120, 14);
        let schema = FeatureSchema::new(["unspent_minerals", "unit_count"]).unwrap();
        let values = FeatureMap::from_player(&p).project(&schema).unwrap();
        assert_eq!(values, [FeatureValue::Count(120), FeatureValue::Count(14)]);

        let reversed = FeatureSchema::new(["unit_count", "unspent_minerals"]).unwrap();
        let values = FeatureMap::from_player(&p).project(&reversed).unwrap();
        assert_eq!(values, [FeatureValue::Count(14), FeatureValue::Count(120)]);
    }

    #[test]
    fn vector_length_matches_schema_for_both_players() {
        let schema = FeatureSchema::default();
        let state = GameState::new(32, player(1, 2), player(3, 4));
        let row = extract_state(&state, &schema).unwrap();
        assert_eq!(row.p1.len(), schema.len());
        assert_eq!(row.p2.len(), schema.len());
        for (idx, name) in DEFAULT_FEATURES.iter().enumerate() {
            let expected = FeatureMap::from_player(&state.players[1]).get(name).unwrap();
            assert_eq!(row.p2[idx], expected, "column {name}");
        }
    }

    #[test]
    fn unknown_feature_is_an_error() {
        let schema = FeatureSchema::new(["unit_count", "larva_count"]).unwrap();
        let state = GameState::new(0, player(0, 0), player(0, 0));
        let err = extract_state(&state, &schema).unwrap_err();
        assert_eq!(err, SchemaError::UnknownFeature("larva_count".into()));
    }

    #[test]
    fn cells_are_printed_verbatim() {
        let schema = FeatureSchema::new(["unspent_minerals", "total_army_value"]).unwrap();
        let state = GameState::new(224, player(50, 0), player(75, 0));
        let row = extract_state(&state, &schema).unwrap();
        let cells: Vec<String> = row.cells().collect();
        assert_eq!(cells, ["224", "50", "250.5", "75", "250.5"]);
    }
}
