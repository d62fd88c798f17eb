use std::collections::HashSet;

use crate::data::poi::{KmProjection, PlanarPoint};
use crate::error::{PlanError, PlanResult};
use crate::models::settlement::Settlement;
use crate::utils::spatial_index::SpatialIndex;

/// The canonical settlement table.
#[derive(Debug, Clone)]
pub struct SettlementStore {
    settlements: Vec<Settlement>,
    planar: Vec<PlanarPoint>,
    calibrated: bool,
}

impl SettlementStore {
    pub fn new(settlements: Vec<Settlement>) -> PlanResult<Self> {
        let mut ids = HashSet::new();
        for (row, s) in settlements.iter().enumerate() {
            if !ids.insert(s.id) {
                return Err(PlanError::InvalidValue {
                    column: "id".to_string(),
                    row: row + 1,
                    value: s.id.to_string(),
                });
            }
        }
        let projection = KmProjection::around(settlements.iter().map(|s| &s.coordinate));
        let planar = settlements.iter().map(|s| s.coordinate.project(&projection)).collect();
        Ok(Self {
            settlements,
            planar,
            calibrated: false,
        })
    }

    pub fn len(&self) -> usize {
        self.settlements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settlements.is_empty()
    }

    pub fn settlements(&self) -> &[Settlement] {
        &self.settlements
    }

    pub fn settlements_mut(&mut self) -> &mut [Settlement] {
        &mut self.settlements
    }

    pub fn get(&self, index: usize) -> &Settlement {
        &self.settlements[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Settlement {
        &mut self.settlements[index]
    }

    pub fn planar(&self, index: usize) -> PlanarPoint {
        self.planar[index]
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn mark_calibrated(&mut self) {
        self.calibrated = true;
    }

    /// Row indices of the settlements belonging to `region`.
    pub fn region_members(&self, region: &str) -> Vec<usize> {
        self.settlements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.region == region)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn spatial_index(&self, members: &[usize]) -> SpatialIndex {
        let points: Vec<(usize, PlanarPoint)> = members.iter().map(|&i| (i, self.planar[i])).collect();
        SpatialIndex::new(&points)
    }

    /// Population in `year`, or the calibrated start population for years
    /// without a projection.
    pub fn total_population(&self, year: u32) -> f64 {
        self.settlements.iter().map(|s| s.population_in(year)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::poi::Coordinate;

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = Settlement::new(1, Coordinate::new(0.0, 0.0), 10.0, "Est");
        let b = Settlement::new(1, Coordinate::new(1.0, 0.0), 10.0, "Est");
        assert!(matches!(SettlementStore::new(vec![a, b]), Err(PlanError::InvalidValue { .. })));
    }

    #[test]
    fn region_members_and_neighbours() {
        let settlements = vec![
            Settlement::new(1, Coordinate::new(0.0, 0.0), 10.0, "Est"),
            Settlement::new(2, Coordinate::new(0.01, 0.0), 10.0, "Sud"),
            Settlement::new(3, Coordinate::new(0.02, 0.0), 10.0, "Est"),
        ];
        let store = SettlementStore::new(settlements).unwrap();
        let est = store.region_members("Est");
        assert_eq!(est, vec![0, 2]);
        let index = store.spatial_index(&est);
        let near = index.within_radius(&store.planar(0), 5.0);
        assert_eq!(near.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 2]);
    }
}
