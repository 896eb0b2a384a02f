// battle-spatial/src/lib.rs
//
// Uniform-grid spatial index for the battle simulator:
// 1. add/update/kill units as they spawn, move and die
// 2. commit once per tick (compaction + quadrant sort)
// 3. nearest-enemy and radius queries for targeting

mod bands;
mod config;
mod console;
mod error;
mod geometry;
mod index;
mod query;
mod store;

pub use bands::{BandPool, ColumnBand};
pub use config::GridConfig;
pub use error::{GridError, GridResult, QueryError};
pub use geometry::{Bounds, GridGeometry, Position};
pub use index::{PositionUpdate, SpatialIndex, TickBatch};
pub use query::RadiusFilter;
pub use store::{BucketStats, Entry, EntryStore};

use wasm_bindgen::prelude::*;

/// WASM-exported spatial index
#[wasm_bindgen]
pub struct WasmSpatialIndex {
    index: SpatialIndex,
}

#[wasm_bindgen]
impl WasmSpatialIndex {
    /// Create a new index from a JSON `GridConfig`
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: &str) -> Result<WasmSpatialIndex, JsValue> {
        console::init();

        let config = GridConfig::from_json(config_json)
            .map_err(|e| JsValue::from_str(&e.to_string()))?;
        let index = SpatialIndex::from_config(&config)
            .map_err(|e| JsValue::from_str(&format!("Failed to build grid: {}", e)))?;

        log::debug!(
            "[WASM] Spatial index ready: {}x{} quadrants, capacity {}",
            config.dimension,
            config.dimension,
            config.capacity
        );

        Ok(WasmSpatialIndex { index })
    }

    #[wasm_bindgen]
    pub fn add_unit(&mut self, unit_id: u32, army_id: u32, x: f32, y: f32) {
        self.index.add(unit_id, army_id, Position::new(x, y));
    }

    #[wasm_bindgen]
    pub fn update_unit(&mut self, unit_id: u32, x: f32, y: f32) {
        self.index.update(unit_id, Position::new(x, y));
    }

    #[wasm_bindgen]
    pub fn kill_unit(&mut self, unit_id: u32) {
        self.index.kill(unit_id);
    }

    #[wasm_bindgen]
    pub fn commit(&mut self) {
        self.index.commit();
    }

    /// Apply a JSON `TickBatch` (moves, then deaths) and commit.
    /// Returns the alive count afterwards.
    #[wasm_bindgen]
    pub fn apply_tick(&mut self, batch_json: &str) -> Result<u32, JsValue> {
        let batch: TickBatch = serde_json::from_str(batch_json)
            .map_err(|e| JsValue::from_str(&format!("Failed to parse tick batch: {}", e)))?;

        self.index.apply_tick(&batch);

        if !batch.moved.is_empty() || !batch.destroyed.is_empty() {
            log::debug!(
                "[WASM] Tick applied: moved={}, destroyed={}, alive={}",
                batch.moved.len(),
                batch.destroyed.len(),
                self.index.alive_count()
            );
        }

        Ok(self.index.alive_count() as u32)
    }

    /// Nearest unit not in `exclude_army`. Errors instead of aborting the
    /// module when the index is stale or that army is the only one left.
    #[wasm_bindgen]
    pub fn find_nearest_enemy(&self, x: f32, y: f32, exclude_army: u32) -> Result<u32, JsValue> {
        self.index
            .try_find_nearest_enemy(Position::new(x, y), exclude_army)
            .map_err(|e| JsValue::from_str(&format!("Nearest enemy query failed: {}", e)))
    }

    /// Enemy ids within `max_distance` - returns JSON array
    #[wasm_bindgen]
    pub fn find_all_within_radius(
        &self,
        x: f32,
        y: f32,
        exclude_army: u32,
        max_distance: f32,
    ) -> Result<String, JsValue> {
        self.ensure_committed()?;
        let ids = self
            .index
            .find_all_within_radius(Position::new(x, y), exclude_army, max_distance);
        serde_json::to_string(&ids)
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize ids: {}", e)))
    }

    /// Ally ids within `max_distance`, without `self_id` - returns JSON array
    #[wasm_bindgen]
    pub fn find_allies_within_radius(
        &self,
        x: f32,
        y: f32,
        army: u32,
        max_distance: f32,
        self_id: Option<u32>,
    ) -> Result<String, JsValue> {
        self.ensure_committed()?;
        let ids = self
            .index
            .find_allies_within_radius(Position::new(x, y), army, max_distance, self_id);
        serde_json::to_string(&ids)
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize ids: {}", e)))
    }

    #[wasm_bindgen]
    pub fn alive_count(&self) -> u32 {
        self.index.alive_count() as u32
    }

    /// Armies with alive units - returns JSON array
    #[wasm_bindgen]
    pub fn get_active_armies(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.index.armies())
            .map_err(|e| JsValue::from_str(&format!("Failed to serialize armies: {}", e)))
    }

    /// Battle is over once at most one army has units left
    #[wasm_bindgen]
    pub fn is_battle_ended(&self) -> bool {
        self.index.armies().len() <= 1
    }
}

impl WasmSpatialIndex {
    fn ensure_committed(&self) -> Result<(), JsValue> {
        if self.index.is_committed() {
            Ok(())
        } else {
            Err(JsValue::from_str(&QueryError::NotCommitted.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Built directly so no console logger is installed. JsValue errors
    // cannot be constructed off wasm, so refusals are checked on the
    // guarded query the exports delegate to.
    fn wasm_index() -> WasmSpatialIndex {
        let index = SpatialIndex::new(Bounds::new(-5.0, -5.0, 5.0, 5.0), 5, 4).unwrap();
        WasmSpatialIndex { index }
    }

    #[test]
    fn test_nearest_enemy_guard() {
        let mut wasm = wasm_index();
        wasm.add_unit(0, 1, 0.0, 0.0);

        // Added but not committed
        assert_eq!(
            wasm.index.try_find_nearest_enemy(Position::new(0.5, 0.5), 0),
            Err(QueryError::NotCommitted)
        );

        wasm.commit();
        assert_eq!(
            wasm.index.try_find_nearest_enemy(Position::new(0.5, 0.5), 1),
            Err(QueryError::NoEnemy(1))
        );
        assert_eq!(wasm.find_nearest_enemy(0.5, 0.5, 0).ok(), Some(0));
    }

    #[test]
    fn test_battle_state() {
        let mut wasm = wasm_index();
        wasm.add_unit(0, 1, 0.0, 0.0);
        wasm.add_unit(1, 2, 3.0, 3.0);
        wasm.commit();
        assert!(!wasm.is_battle_ended());
        assert_eq!(wasm.alive_count(), 2);
        assert_eq!(wasm.get_active_armies().ok().as_deref(), Some("[1,2]"));

        assert_eq!(wasm.apply_tick(r#"{ "destroyed": [1] }"#).ok(), Some(1));
        assert!(wasm.is_battle_ended());
        assert_eq!(
            wasm.find_all_within_radius(0.0, 0.0, 2, 10.0).ok().as_deref(),
            Some("[0]")
        );
    }
}
