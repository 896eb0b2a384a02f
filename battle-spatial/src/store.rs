use std::collections::HashMap;
use std::ops::Range;

use crate::geometry::{GridGeometry, Position};

/// Lightweight per-unit record
///
/// Flat and `Copy` so the committed table can hold copies next to each other
/// in quadrant order.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Entry {
    pub alive: bool,
    pub unit_id: u32,
    pub army_id: u32,
    pub quadrant_x: u32,
    pub quadrant_y: u32,
    pub position: Position,
}

/// Fixed-capacity unit store plus the per-quadrant bucket tables.
///
/// Two arrays are kept:
/// - `slots`, indexed by unit id, written by add/update/kill in O(1). A slot
///   never moves, so `slots[id].unit_id == id` always holds.
/// - `dense`, the committed table: alive entries only, sorted by quadrant
///   linear index. `bucket_start` / `bucket_length` index into it.
///
/// Mutations only touch `slots`; `commit` carries them into `dense`.
#[derive(Debug, Clone)]
pub struct EntryStore {
    geometry: GridGeometry,
    slots: Vec<Entry>,
    // Slot is present in `dense` or queued in `pending`
    listed: Vec<bool>,
    dense: Vec<Entry>,
    pending: Vec<u32>,
    bucket_start: Vec<u32>,
    bucket_length: Vec<u32>,
    alive_count: usize,
    army_alive: HashMap<u32, u32>,
    dirty: bool,
    killed_since_commit: bool,
    generation: u64,
}

/// Bucket occupancy summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketStats {
    pub occupied_buckets: usize,
    pub max_bucket_len: usize,
    pub alive: usize,
}

impl EntryStore {
    pub fn new(geometry: GridGeometry, capacity: usize) -> Self {
        let quadrants = geometry.quadrant_count();
        let slots = (0..capacity)
            .map(|id| Entry {
                unit_id: id as u32,
                ..Default::default()
            })
            .collect();

        Self {
            geometry,
            slots,
            listed: vec![false; capacity],
            dense: Vec::with_capacity(capacity),
            pending: Vec::with_capacity(capacity),
            bucket_start: vec![0; quadrants],
            bucket_length: vec![0; quadrants],
            alive_count: 0,
            army_alive: HashMap::new(),
            dirty: false,
            killed_since_commit: false,
            generation: 0,
        }
    }

    #[inline]
    fn slot_index(&self, unit_id: u32, op: &str) -> usize {
        let idx = unit_id as usize;
        assert!(
            idx < self.slots.len(),
            "{}: unit {} is outside capacity {}",
            op,
            unit_id,
            self.slots.len()
        );
        idx
    }

    /// Register a unit. Panics if the id is out of range or already alive.
    pub fn add(&mut self, unit_id: u32, army_id: u32, position: Position) {
        let idx = self.slot_index(unit_id, "add");
        assert!(!self.slots[idx].alive, "add: unit {} is already alive", unit_id);

        let (quadrant_x, quadrant_y) = self.geometry.locate(position);
        self.slots[idx] = Entry {
            alive: true,
            unit_id,
            army_id,
            quadrant_x,
            quadrant_y,
            position,
        };

        // A unit killed and re-added before the next commit is still listed
        if !self.listed[idx] {
            self.listed[idx] = true;
            self.pending.push(unit_id);
        }

        self.alive_count += 1;
        *self.army_alive.entry(army_id).or_insert(0) += 1;
        self.dirty = true;
    }

    /// Move a unit. Panics if the unit is not alive.
    pub fn update(&mut self, unit_id: u32, position: Position) {
        let idx = self.slot_index(unit_id, "update");
        let (quadrant_x, quadrant_y) = self.geometry.locate(position);

        let slot = &mut self.slots[idx];
        assert!(slot.alive, "update: unit {} is not alive", unit_id);
        slot.position = position;
        slot.quadrant_x = quadrant_x;
        slot.quadrant_y = quadrant_y;
        self.dirty = true;
    }

    /// Flag a unit dead. Removal from the committed table happens on commit.
    pub fn kill(&mut self, unit_id: u32) {
        let idx = self.slot_index(unit_id, "kill");

        let slot = &mut self.slots[idx];
        assert!(slot.alive, "kill: unit {} is already dead", unit_id);
        slot.alive = false;
        let army_id = slot.army_id;

        self.alive_count -= 1;
        if let Some(count) = self.army_alive.get_mut(&army_id) {
            *count -= 1;
            if *count == 0 {
                self.army_alive.remove(&army_id);
            }
        }
        self.killed_since_commit = true;
        self.dirty = true;
    }

    /// Compact dead entries, sort by quadrant and rebuild the bucket tables.
    ///
    /// No-op when nothing changed since the last commit.
    pub fn commit(&mut self) {
        if !self.dirty {
            return;
        }

        // Pull this tick's moves and deaths into the committed copies
        for entry in self.dense.iter_mut() {
            *entry = self.slots[entry.unit_id as usize];
        }

        // Swap-to-end partition: `i` only advances past entries known alive
        let mut compacted = 0;
        if self.killed_since_commit {
            let mut end = self.dense.len();
            let mut i = 0;
            while i < end {
                if self.dense[i].alive {
                    i += 1;
                } else {
                    end -= 1;
                    self.dense.swap(i, end);
                }
            }
            for entry in &self.dense[end..] {
                self.listed[entry.unit_id as usize] = false;
            }
            compacted = self.dense.len() - end;
            self.dense.truncate(end);
        }

        let added = self.pending.len();
        for &unit_id in &self.pending {
            let slot = self.slots[unit_id as usize];
            if slot.alive {
                self.dense.push(slot);
            } else {
                self.listed[unit_id as usize] = false;
            }
        }
        self.pending.clear();

        debug_assert_eq!(self.dense.len(), self.alive_count);

        let dimension = self.geometry.dimension() as usize;
        self.dense.sort_unstable_by_key(|e| {
            (
                e.quadrant_x as usize + e.quadrant_y as usize * dimension,
                e.unit_id,
            )
        });

        self.bucket_length.fill(0);
        for entry in &self.dense {
            let q = entry.quadrant_x as usize + entry.quadrant_y as usize * dimension;
            self.bucket_length[q] += 1;
        }
        // Empty buckets still get a start so row ranges can be sliced directly
        let mut offset = 0u32;
        for (start, &length) in self.bucket_start.iter_mut().zip(&self.bucket_length) {
            *start = offset;
            offset += length;
        }

        self.dirty = false;
        self.killed_since_commit = false;
        self.generation += 1;

        log::debug!(
            "[Commit] generation {}: alive={}, compacted={}, added={}",
            self.generation,
            self.alive_count,
            compacted,
            added
        );
    }

    /// Panics unless the bucket tables match the current slots.
    #[inline]
    pub fn assert_committed(&self) {
        assert!(
            !self.dirty,
            "query issued before commit (generation {})",
            self.generation
        );
    }

    #[inline]
    pub fn is_committed(&self) -> bool {
        !self.dirty
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Slot for `unit_id`, alive or not
    pub fn entry(&self, unit_id: u32) -> Option<&Entry> {
        self.slots.get(unit_id as usize)
    }

    /// All slots, indexed by unit id
    pub fn slots(&self) -> &[Entry] {
        &self.slots
    }

    /// Committed table: alive entries in quadrant order
    pub fn committed(&self) -> &[Entry] {
        self.assert_committed();
        &self.dense
    }

    pub fn bucket_start(&self) -> &[u32] {
        &self.bucket_start
    }

    pub fn bucket_length(&self) -> &[u32] {
        &self.bucket_length
    }

    /// Range of the committed table holding quadrant `q`
    #[inline]
    pub fn bucket_range(&self, q: usize) -> Range<usize> {
        let start = self.bucket_start[q] as usize;
        start..start + self.bucket_length[q] as usize
    }

    /// Entries of quadrant `(x, y)`
    #[inline]
    pub fn bucket(&self, x: u32, y: u32) -> &[Entry] {
        self.assert_committed();
        let q = self.geometry.linear(x, y);
        &self.dense[self.bucket_range(q)]
    }

    /// True if some alive unit belongs to an army other than `army_id`
    pub fn has_enemy_of(&self, army_id: u32) -> bool {
        self.army_alive.keys().any(|&army| army != army_id)
    }

    /// Armies with at least one alive unit, ascending
    pub fn armies(&self) -> Vec<u32> {
        let mut armies: Vec<u32> = self.army_alive.keys().copied().collect();
        armies.sort_unstable();
        armies
    }

    pub fn stats(&self) -> BucketStats {
        BucketStats {
            occupied_buckets: self.bucket_length.iter().filter(|&&l| l > 0).count(),
            max_bucket_len: self.bucket_length.iter().copied().max().unwrap_or(0) as usize,
            alive: self.alive_count,
        }
    }

    /// Dense table without the commit check, for range assembly
    #[inline]
    pub(crate) fn dense(&self) -> &[Entry] {
        &self.dense
    }
}
