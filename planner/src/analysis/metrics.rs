use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::simulation_config::TimeStep;
use crate::config::tech_type::TechKind;
use crate::core::grid_extension::RegionPlan;
use crate::core::limitations::RationingReport;
use crate::data::store::SettlementStore;
use crate::models::grid_region::{Budget, GridRegion};

/// Totals of one technology in one analysis year.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TechYearTotals {
    pub settlements: usize,
    /// Population served by the technology in this year.
    pub population: f64,
    /// People connected in this step.
    pub new_connections: f64,
    pub new_capacity_kw: f64,
    pub investment: f64,
}

/// Grid growth charged against one region's allowance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionYearTotals {
    pub region: String,
    pub allowance: Budget,
    pub new_households: f64,
    pub new_capacity_kw: f64,
    pub investment: f64,
    pub new_settlements: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearlySummary {
    pub year: u32,
    pub elec_target: f64,
    pub total_population: f64,
    pub electrified_population: f64,
    pub per_tech: BTreeMap<TechKind, TechYearTotals>,
    pub regions: Vec<RegionYearTotals>,
    pub rationing: RationingReport,
}

impl YearlySummary {
    pub fn collect(
        store: &SettlementStore,
        step: &TimeStep,
        regions: &[GridRegion],
        plans: &[RegionPlan],
        rationing: RationingReport,
    ) -> Self {
        let mut per_tech: BTreeMap<TechKind, TechYearTotals> = BTreeMap::new();
        let mut total_population = 0.0;
        let mut electrified_population = 0.0;

        for s in store.settlements() {
            let Some(record) = s.record(step.year) else { continue };
            total_population += record.pop;
            let Some(tech) = record.final_tech() else { continue };
            electrified_population += record.pop;
            let totals = per_tech.entry(tech).or_default();
            totals.settlements += 1;
            totals.population += record.pop;
            totals.new_connections += record.new_connections;
            totals.new_capacity_kw += record.new_capacity_kw;
            totals.investment += record.investment;
        }

        let regions = regions
            .iter()
            .map(|region| {
                let plan = plans.iter().find(|p| p.region == region.index);
                RegionYearTotals {
                    region: region.name().to_string(),
                    allowance: region.budget_for(step.year, step.time_step),
                    new_households: plan.map(|p| p.new_households).unwrap_or(0.0),
                    new_capacity_kw: plan.map(|p| p.new_capacity_kw).unwrap_or(0.0),
                    investment: plan.map(|p| p.investment).unwrap_or(0.0),
                    new_settlements: plan.map(|p| p.connected_indices().count()).unwrap_or(0),
                }
            })
            .collect();

        Self {
            year: step.year,
            elec_target: step.elec_target,
            total_population,
            electrified_population,
            per_tech,
            regions,
            rationing,
        }
    }

    pub fn electrification_rate(&self) -> f64 {
        if self.total_population > 0.0 {
            self.electrified_population / self.total_population
        } else {
            0.0
        }
    }

    pub fn total_investment(&self) -> f64 {
        self.per_tech.values().map(|t| t.investment).sum()
    }

    pub fn total_new_capacity_kw(&self) -> f64 {
        self.per_tech.values().map(|t| t.new_capacity_kw).sum()
    }

    pub fn tech(&self, kind: TechKind) -> TechYearTotals {
        self.per_tech.get(&kind).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::simulation_config::ScenarioConfig;
    use crate::data::poi::Coordinate;
    use crate::models::settlement::{Settlement, SettlementYearRecord};

    fn rationing() -> RationingReport {
        RationingReport { cap: 0.0, existing_pop: 0.0, electrified_pop: 0.0, kept: 0, de_electrified: 0 }
    }

    #[test]
    fn totals_group_by_final_technology() {
        let step = TimeStep { year: 2025, time_step: 5, elec_target: 1.0, is_first: true };
        let settlements = [(TechKind::Grid, 100.0), (TechKind::SaPv, 50.0), (TechKind::Grid, 30.0)]
            .iter()
            .enumerate()
            .map(|(i, (tech, pop))| {
                let mut s = Settlement::new(i as u64, Coordinate::new(0.0, i as f64 * 0.01), *pop, "Est");
                let mut record = SettlementYearRecord::new(*pop, 5.0, *pop, 0.0);
                record.final_code = tech.code();
                record.investment = 1000.0;
                s.years.insert(2025, record);
                s
            })
            .chain(std::iter::once({
                let mut s = Settlement::new(9, Coordinate::new(1.0, 1.0), 20.0, "Est");
                s.years.insert(2025, SettlementYearRecord::new(20.0, 5.0, 20.0, 0.0));
                s
            }))
            .collect();
        let store = SettlementStore::new(settlements).unwrap();
        let regions = GridRegion::from_config(&ScenarioConfig::default()).unwrap();

        let summary = YearlySummary::collect(&store, &step, &regions, &[], rationing());
        assert_eq!(summary.tech(TechKind::Grid).settlements, 2);
        assert_eq!(summary.tech(TechKind::Grid).population, 130.0);
        assert_eq!(summary.tech(TechKind::MgHydro), TechYearTotals::default());
        assert_eq!(summary.total_investment(), 3000.0);
        assert!((summary.electrification_rate() - 180.0 / 200.0).abs() < 1e-12);
        assert_eq!(summary.regions.len(), 3);
        assert_eq!(summary.regions[0].new_households, 0.0);
    }
}
