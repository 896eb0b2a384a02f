//! Nearest-enemy and radius queries.
//!
//! Both walk the grid in square rings around the query's home quadrant.
//! After each ring the visitor is asked whether anything outside the rings
//! scanned so far could still matter, given the distance from the query point
//! to that outside area.

use crate::error::QueryError;
use crate::geometry::Position;
use crate::index::SpatialIndex;
use crate::store::Entry;

/// Which units a radius query keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadiusFilter {
    /// Every army except this one
    Enemies { exclude_army: u32 },
    /// Only this army, optionally leaving out the querying unit
    Allies { army: u32, exclude_unit: Option<u32> },
}

impl RadiusFilter {
    #[inline]
    fn accepts(&self, entry: &Entry) -> bool {
        match *self {
            RadiusFilter::Enemies { exclude_army } => entry.army_id != exclude_army,
            RadiusFilter::Allies { army, exclude_unit } => {
                entry.army_id == army && exclude_unit != Some(entry.unit_id)
            }
        }
    }
}

trait RingVisitor {
    fn visit(&mut self, entry: &Entry);

    /// `outside` is the distance from the query point to the nearest quadrant
    /// not yet scanned
    fn finished(&self, outside: f32) -> bool;
}

struct Nearest {
    position: Position,
    exclude_army: u32,
    best: Option<(u32, f32)>,
}

impl RingVisitor for Nearest {
    #[inline]
    fn visit(&mut self, entry: &Entry) {
        if entry.army_id == self.exclude_army {
            return;
        }
        let dist_sq = self.position.distance_sq(entry.position);
        if self.best.map_or(true, |(_, best)| dist_sq < best) {
            self.best = Some((entry.unit_id, dist_sq));
        }
    }

    #[inline]
    fn finished(&self, outside: f32) -> bool {
        // Strict: a unit exactly on the boundary could tie from the far side
        self.best.map_or(false, |(_, best)| best < outside * outside)
    }
}

struct WithinRadius<'o> {
    position: Position,
    max_distance_sq: f32,
    filter: RadiusFilter,
    out: &'o mut Vec<u32>,
}

impl RingVisitor for WithinRadius<'_> {
    #[inline]
    fn visit(&mut self, entry: &Entry) {
        if self.filter.accepts(entry)
            && self.position.distance_sq(entry.position) <= self.max_distance_sq
        {
            self.out.push(entry.unit_id);
        }
    }

    #[inline]
    fn finished(&self, outside: f32) -> bool {
        // Squared, so the cut-off agrees exactly with the `<=` test in `visit`
        outside * outside > self.max_distance_sq
    }
}

impl SpatialIndex {
    /// Nearest alive unit whose army is not `exclude_army`.
    ///
    /// Panics if the index is not committed, or if no such unit exists.
    /// Callers that cannot rule that out check `has_enemy_of` first.
    pub fn find_nearest_enemy(&self, position: Position, exclude_army: u32) -> u32 {
        let mut nearest = Nearest {
            position,
            exclude_army,
            best: None,
        };
        let rings = self.traverse(position, &mut nearest);

        match nearest.best {
            Some((unit_id, dist_sq)) => {
                log::trace!(
                    "[Query] nearest to ({:.1}, {:.1}) excluding army {}: unit {} at {:.2} after {} rings",
                    position.x,
                    position.y,
                    exclude_army,
                    unit_id,
                    dist_sq.sqrt(),
                    rings
                );
                unit_id
            }
            None => panic!(
                "find_nearest_enemy: no alive unit outside army {} ({} alive)",
                exclude_army,
                self.store.alive_count()
            ),
        }
    }

    /// `find_nearest_enemy` that refuses instead of panicking when the index
    /// is stale or `exclude_army` is the only army left
    pub fn try_find_nearest_enemy(
        &self,
        position: Position,
        exclude_army: u32,
    ) -> Result<u32, QueryError> {
        if !self.store.is_committed() {
            return Err(QueryError::NotCommitted);
        }
        if !self.store.has_enemy_of(exclude_army) {
            return Err(QueryError::NoEnemy(exclude_army));
        }
        Ok(self.find_nearest_enemy(position, exclude_army))
    }

    /// Ids of alive units within `max_distance` (inclusive) whose army is not
    /// `exclude_army`
    pub fn find_all_within_radius(
        &self,
        position: Position,
        exclude_army: u32,
        max_distance: f32,
    ) -> Vec<u32> {
        let mut out = Vec::new();
        self.find_all_within_radius_into(position, exclude_army, max_distance, &mut out);
        out
    }

    /// `find_all_within_radius` writing into a caller-owned buffer, which is
    /// cleared first
    pub fn find_all_within_radius_into(
        &self,
        position: Position,
        exclude_army: u32,
        max_distance: f32,
        out: &mut Vec<u32>,
    ) {
        self.find_matching_within_radius(
            position,
            RadiusFilter::Enemies { exclude_army },
            max_distance,
            out,
        );
    }

    /// Ids of alive units of `army` within `max_distance`, minus `exclude_unit`
    pub fn find_allies_within_radius(
        &self,
        position: Position,
        army: u32,
        max_distance: f32,
        exclude_unit: Option<u32>,
    ) -> Vec<u32> {
        let mut out = Vec::new();
        self.find_matching_within_radius(
            position,
            RadiusFilter::Allies { army, exclude_unit },
            max_distance,
            &mut out,
        );
        out
    }

    /// Radius query with an explicit filter; `out` is cleared first
    pub fn find_matching_within_radius(
        &self,
        position: Position,
        filter: RadiusFilter,
        max_distance: f32,
        out: &mut Vec<u32>,
    ) {
        out.clear();
        if max_distance < 0.0 || max_distance.is_nan() {
            self.store.assert_committed();
            return;
        }

        let mut within = WithinRadius {
            position,
            max_distance_sq: max_distance * max_distance,
            filter,
            out,
        };
        let rings = self.traverse(position, &mut within);

        log::trace!(
            "[Query] radius {:.1} around ({:.1}, {:.1}): {} hits after {} rings",
            max_distance,
            position.x,
            position.y,
            within.out.len(),
            rings
        );
    }

    /// Scan the home quadrant, then rings of growing radius until the visitor
    /// is done or the whole grid is covered. Returns the last ring scanned.
    fn traverse<V: RingVisitor>(&self, position: Position, visitor: &mut V) -> u32 {
        let store = &self.store;
        store.assert_committed();

        let geo = store.geometry();
        let (x, y) = geo.locate(position);

        for entry in store.bucket(x, y) {
            visitor.visit(entry);
        }

        let mut ring = 0;
        loop {
            let outside = geo.min_distance_outside_ring(position, x, y, ring);
            if outside == f32::INFINITY || visitor.finished(outside) {
                return ring;
            }
            ring += 1;
            self.scan_ring(x, y, ring, visitor);
        }
    }

    /// Visit every quadrant at Chebyshev distance exactly `ring` from `(x, y)`.
    ///
    /// Rows `y - ring` and `y + ring` span the full clamped x-range; columns
    /// `x - ring` and `x + ring` span only the rows strictly between them, so
    /// no quadrant is read twice.
    fn scan_ring<V: RingVisitor>(&self, x: u32, y: u32, ring: u32, visitor: &mut V) {
        let store = &self.store;
        let last = store.geometry().dimension() as i64 - 1;
        let (x, y, r) = (x as i64, y as i64, ring as i64);

        let x0 = (x - r).max(0) as u32;
        let x1 = (x + r).min(last) as u32;
        for row in [y - r, y + r] {
            if (0..=last).contains(&row) {
                for entry in store.row_band(row as u32, x0, x1) {
                    visitor.visit(entry);
                }
            }
        }

        let y0 = (y - r + 1).max(0) as u32;
        let y1 = (y + r - 1).min(last) as u32;
        let mut band = self.pool.borrow_mut().acquire(store.generation());
        for column in [x - r, x + r] {
            if (0..=last).contains(&column) {
                store.fill_column_band(column as u32, y0, y1, &mut band);
                for slice in band.slices(store) {
                    for entry in slice {
                        visitor.visit(entry);
                    }
                }
            }
        }
        self.pool.borrow_mut().release(band);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scenario_index() -> SpatialIndex {
        let mut index = SpatialIndex::new(Bounds::new(-5.0, -5.0, 5.0, 5.0), 5, 3).unwrap();
        index.add(0, 1, Position::new(0.0, 0.0));
        index.add(1, 0, Position::new(-2.5, -2.5));
        index.add(2, 0, Position::new(2.5, -2.5));
        index.commit();
        index
    }

    fn brute_nearest(index: &SpatialIndex, position: Position, exclude_army: u32) -> Option<(u32, f32)> {
        index
            .store()
            .slots()
            .iter()
            .filter(|e| e.alive && e.army_id != exclude_army)
            .map(|e| (e.unit_id, position.distance_sq(e.position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    fn brute_radius(index: &SpatialIndex, position: Position, filter: RadiusFilter, max_distance: f32) -> Vec<u32> {
        let mut ids: Vec<u32> = index
            .store()
            .slots()
            .iter()
            .filter(|e| e.alive && filter.accepts(e))
            .filter(|e| position.distance_sq(e.position) <= max_distance * max_distance)
            .map(|e| e.unit_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    fn random_index(rng: &mut StdRng, dimension: u32, units: u32, armies: u32) -> SpatialIndex {
        let mut index =
            SpatialIndex::new(Bounds::new(-100.0, -50.0, 100.0, 50.0), dimension, units as usize).unwrap();
        for id in 0..units {
            // Some units fall outside the bounds on purpose
            let position = Position::new(rng.gen_range(-120.0..120.0), rng.gen_range(-60.0..60.0));
            index.add(id, rng.gen_range(0..armies), position);
        }
        index.commit();
        index
    }

    #[test]
    fn test_scenario_nearest_enemy() {
        let index = scenario_index();
        assert_eq!(index.find_nearest_enemy(Position::new(0.8, 0.8), 0), 0);
        assert_eq!(index.find_nearest_enemy(Position::new(0.8, 0.8), 1), 2);
        assert_eq!(index.find_nearest_enemy(Position::new(-4.0, -1.0), 1), 1);
    }

    #[test]
    #[should_panic(expected = "no alive unit outside army 0")]
    fn test_nearest_without_enemies_panics() {
        let mut index = scenario_index();
        index.kill(0);
        index.commit();
        index.find_nearest_enemy(Position::new(0.8, 0.8), 0);
    }

    #[test]
    #[should_panic(expected = "before commit")]
    fn test_query_before_commit_panics() {
        let mut index = scenario_index();
        index.update(1, Position::new(-1.0, -1.0));
        index.find_nearest_enemy(Position::new(0.0, 0.0), 1);
    }

    #[test]
    fn test_try_nearest_refuses_instead_of_panicking() {
        let mut index = scenario_index();
        let at = Position::new(0.8, 0.8);
        assert_eq!(index.try_find_nearest_enemy(at, 0), Ok(0));

        // Stale after a mutation, even though an enemy exists
        index.update(0, Position::new(0.5, 0.5));
        assert_eq!(
            index.try_find_nearest_enemy(at, 0),
            Err(QueryError::NotCommitted)
        );

        index.kill(0);
        index.commit();
        assert_eq!(
            index.try_find_nearest_enemy(at, 0),
            Err(QueryError::NoEnemy(0))
        );
        assert_eq!(index.try_find_nearest_enemy(at, 1), Ok(2));
    }

    #[test]
    fn test_nearest_in_far_corner() {
        let mut index = SpatialIndex::new(Bounds::new(0.0, 0.0, 90.0, 90.0), 9, 4).unwrap();
        index.add(0, 0, Position::new(1.0, 1.0));
        index.add(1, 1, Position::new(89.0, 89.0));
        index.add(2, 1, Position::new(89.0, 1.0));
        index.commit();
        assert_eq!(index.find_nearest_enemy(Position::new(2.0, 2.0), 0), 2);
        assert_eq!(index.find_nearest_enemy(Position::new(88.0, 60.0), 0), 1);
    }

    #[test]
    fn test_closer_unit_in_neighbor_quadrant() {
        // Home quadrant has a candidate, but a neighbor holds a closer one
        let mut index = SpatialIndex::new(Bounds::new(0.0, 0.0, 10.0, 10.0), 10, 2).unwrap();
        index.add(0, 1, Position::new(5.1, 5.9));
        index.add(1, 1, Position::new(4.95, 5.5));
        index.commit();
        assert_eq!(index.find_nearest_enemy(Position::new(5.05, 5.5), 0), 1);
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5EED);
        for dimension in [1, 2, 3, 7, 16] {
            let index = random_index(&mut rng, dimension, 300, 3);
            for _ in 0..200 {
                let position = Position::new(rng.gen_range(-130.0..130.0), rng.gen_range(-70.0..70.0));
                let exclude = rng.gen_range(0..3);
                let found = index.find_nearest_enemy(position, exclude);
                let (_, best) = brute_nearest(&index, position, exclude).unwrap();

                let entry = index.entry(found).unwrap();
                assert!(entry.alive);
                assert_ne!(entry.army_id, exclude);
                assert_eq!(
                    position.distance_sq(entry.position),
                    best,
                    "dimension {} query {:?}",
                    dimension,
                    position
                );
            }
        }
    }

    #[test]
    fn test_nearest_after_kills_and_moves() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut index = random_index(&mut rng, 6, 200, 2);

        for tick in 0..5 {
            for id in 0..200u32 {
                let alive = index.entry(id).map_or(false, |e| e.alive);
                if !alive {
                    continue;
                }
                if rng.gen_range(0..10) == 0 && index.alive_count() > 20 {
                    index.kill(id);
                } else {
                    let position = Position::new(rng.gen_range(-100.0..100.0), rng.gen_range(-50.0..50.0));
                    index.update(id, position);
                }
            }
            index.commit();

            for _ in 0..50 {
                let position = Position::new(rng.gen_range(-100.0..100.0), rng.gen_range(-50.0..50.0));
                let exclude = rng.gen_range(0..2);
                if !index.has_enemy_of(exclude) {
                    continue;
                }
                let found = index.find_nearest_enemy(position, exclude);
                let (_, best) = brute_nearest(&index, position, exclude).unwrap();
                let entry = index.entry(found).unwrap();
                assert_eq!(position.distance_sq(entry.position), best, "tick {}", tick);
            }
        }
    }

    #[test]
    fn test_radius_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0xBEEF);
        let mut out = Vec::new();
        for dimension in [1, 4, 9] {
            let index = random_index(&mut rng, dimension, 250, 3);
            for _ in 0..150 {
                let position = Position::new(rng.gen_range(-110.0..110.0), rng.gen_range(-55.0..55.0));
                let exclude = rng.gen_range(0..3);
                let radius = rng.gen_range(0.0..80.0);

                index.find_all_within_radius_into(position, exclude, radius, &mut out);
                out.sort_unstable();
                let filter = RadiusFilter::Enemies { exclude_army: exclude };
                assert_eq!(out, brute_radius(&index, position, filter, radius));
            }
        }
    }

    #[test]
    fn test_ally_radius_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let index = random_index(&mut rng, 5, 120, 2);
        for unit_id in 0..40u32 {
            let entry = *index.entry(unit_id).unwrap();
            let mut allies =
                index.find_allies_within_radius(entry.position, entry.army_id, 30.0, Some(unit_id));
            allies.sort_unstable();

            assert!(!allies.contains(&unit_id));
            let filter = RadiusFilter::Allies {
                army: entry.army_id,
                exclude_unit: Some(unit_id),
            };
            assert_eq!(allies, brute_radius(&index, entry.position, filter, 30.0));
        }
    }

    #[test]
    fn test_radius_small_and_empty() {
        let index = scenario_index();
        assert!(index.find_all_within_radius(Position::new(0.8, 0.8), 0, 0.5).is_empty());
        assert_eq!(index.find_all_within_radius(Position::new(0.8, 0.8), 0, 1.5), vec![0]);
        assert!(index.find_all_within_radius(Position::new(0.0, 0.0), 0, -1.0).is_empty());

        let mut hits = index.find_all_within_radius(Position::new(0.0, -2.5), 1, 2.5);
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn test_queries_do_not_grow_pool() {
        let mut rng = StdRng::seed_from_u64(3);
        let index = random_index(&mut rng, 12, 400, 4);
        let before = index.pool.borrow().available();
        for _ in 0..100 {
            let position = Position::new(rng.gen_range(-100.0..100.0), rng.gen_range(-50.0..50.0));
            index.find_nearest_enemy(position, 0);
            index.find_all_within_radius(position, 1, 40.0);
        }
        assert_eq!(index.pool.borrow().available(), before);
    }
}
