use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::bands::BandPool;
use crate::config::GridConfig;
use crate::error::{GridError, GridResult};
use crate::geometry::{Bounds, GridGeometry, Position};
use crate::store::{BucketStats, Entry, EntryStore};

/// Position update for one unit that moved this tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// Everything the simulation reports for one tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickBatch {
    #[serde(default)]
    pub moved: Vec<PositionUpdate>,
    #[serde(default)]
    pub destroyed: Vec<u32>,
}

/// Uniform-grid index for nearest-enemy and radius queries
///
/// Per tick: add/update/kill, then `commit` once, then query. Queries take
/// `&self`; the band pool sits behind a `RefCell`, so the index is
/// single-threaded.
#[derive(Debug)]
pub struct SpatialIndex {
    pub(crate) store: EntryStore,
    pub(crate) pool: RefCell<BandPool>,
}

impl SpatialIndex {
    pub fn new(bounds: Bounds, dimension: u32, capacity: usize) -> GridResult<Self> {
        if capacity == 0 {
            return Err(GridError::ZeroCapacity);
        }
        let geometry = GridGeometry::new(bounds, dimension)?;
        Ok(Self {
            store: EntryStore::new(geometry, capacity),
            pool: RefCell::new(BandPool::new()),
        })
    }

    pub fn from_config(config: &GridConfig) -> GridResult<Self> {
        config.validate()?;
        Self::new(config.bounds, config.dimension, config.capacity as usize)
    }

    #[inline]
    pub fn add(&mut self, unit_id: u32, army_id: u32, position: Position) {
        self.store.add(unit_id, army_id, position);
    }

    #[inline]
    pub fn update(&mut self, unit_id: u32, position: Position) {
        self.store.update(unit_id, position);
    }

    #[inline]
    pub fn kill(&mut self, unit_id: u32) {
        self.store.kill(unit_id);
    }

    #[inline]
    pub fn commit(&mut self) {
        self.store.commit();
    }

    /// Apply one tick's moves and deaths, then commit.
    ///
    /// Moves are applied before deaths, so a unit may appear in both lists.
    pub fn apply_tick(&mut self, batch: &TickBatch) {
        for update in &batch.moved {
            self.store.update(update.id, Position::new(update.x, update.y));
        }
        for &unit_id in &batch.destroyed {
            self.store.kill(unit_id);
        }
        self.store.commit();
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn geometry(&self) -> &GridGeometry {
        self.store.geometry()
    }

    pub fn entry(&self, unit_id: u32) -> Option<&Entry> {
        self.store.entry(unit_id)
    }

    pub fn alive_count(&self) -> usize {
        self.store.alive_count()
    }

    pub fn capacity(&self) -> usize {
        self.store.capacity()
    }

    pub fn is_committed(&self) -> bool {
        self.store.is_committed()
    }

    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    pub fn has_enemy_of(&self, army_id: u32) -> bool {
        self.store.has_enemy_of(army_id)
    }

    pub fn armies(&self) -> Vec<u32> {
        self.store.armies()
    }

    pub fn stats(&self) -> BucketStats {
        self.store.stats()
    }
}
