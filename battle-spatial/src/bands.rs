//! Ring band assembly over the committed table.
//!
//! Entries are sorted by `x + y * N`, so the quadrants of one row sit next to
//! each other: a horizontal band is a single borrowed slice. A vertical band
//! crosses rows and is split into one range per row. Those ranges go into a
//! pooled `ColumnBand` so ring expansion does not allocate per query.

use std::ops::Range;

use crate::store::{Entry, EntryStore};

/// Each pooled band starts with room for this many row ranges
const BAND_INITIAL_RANGES: usize = 4;
/// Bands kept on the free list; more than this are dropped on release
const POOL_LIMIT: usize = 4;

/// Row ranges of one vertical band, stamped with the commit generation they
/// were taken from
#[derive(Debug, Default)]
pub struct ColumnBand {
    generation: u64,
    ranges: Vec<Range<usize>>,
}

impl ColumnBand {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            generation: 0,
            ranges: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Resolve the ranges into slices of `store`.
    ///
    /// Panics if the store was committed again since the band was filled.
    pub fn slices<'a>(&'a self, store: &'a EntryStore) -> impl Iterator<Item = &'a [Entry]> + 'a {
        assert_eq!(
            self.generation,
            store.generation(),
            "column band outlived its commit"
        );
        let dense = store.dense();
        self.ranges.iter().map(move |r| &dense[r.clone()])
    }
}

/// Free list of reusable column bands
#[derive(Debug)]
pub struct BandPool {
    free: Vec<ColumnBand>,
}

impl Default for BandPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BandPool {
    pub fn new() -> Self {
        Self {
            free: (0..POOL_LIMIT)
                .map(|_| ColumnBand::with_capacity(BAND_INITIAL_RANGES))
                .collect(),
        }
    }

    /// Check out an empty band for the given commit generation
    pub fn acquire(&mut self, generation: u64) -> ColumnBand {
        let mut band = self
            .free
            .pop()
            .unwrap_or_else(|| ColumnBand::with_capacity(BAND_INITIAL_RANGES));
        band.generation = generation;
        band.ranges.clear();
        band
    }

    /// Give a band back; its capacity is kept for the next ring
    pub fn release(&mut self, mut band: ColumnBand) {
        if self.free.len() < POOL_LIMIT {
            band.ranges.clear();
            self.free.push(band);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

impl EntryStore {
    /// Entries of quadrants `x0..=x1` in `row`, as one contiguous slice
    pub fn row_band(&self, row: u32, x0: u32, x1: u32) -> &[Entry] {
        self.assert_committed();
        debug_assert!(x0 <= x1);
        let geo = self.geometry();
        let first = self.bucket_range(geo.linear(x0, row));
        let last = self.bucket_range(geo.linear(x1, row));
        &self.dense()[first.start..last.end]
    }

    /// Collect the non-empty buckets of quadrants `(column, y0..=y1)` into
    /// `band`, one range per row, in ascending row order
    pub fn fill_column_band(&self, column: u32, y0: u32, y1: u32, band: &mut ColumnBand) {
        self.assert_committed();
        debug_assert_eq!(band.generation, self.generation());
        band.ranges.clear();
        let geo = self.geometry();
        for row in y0..=y1 {
            let range = self.bucket_range(geo.linear(column, row));
            if !range.is_empty() {
                band.ranges.push(range);
            }
        }
    }
}
