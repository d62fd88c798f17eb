use tracing::debug;

use crate::config::simulation_config::{DemandConfig, TimeStep};
use crate::data::store::SettlementStore;
use crate::models::settlement::{Settlement, SettlementYearRecord};

/// Residential demand per person (kWh/year) for the settlement's tier.
pub fn per_capita_residential(s: &Settlement, demand: &DemandConfig) -> f64 {
    let (tier, hh_size) = if s.is_urban {
        (demand.urban_tier, demand.urban_hh_size)
    } else {
        (demand.rural_tier, demand.rural_hh_size)
    };
    tier.household_kwh(s.custom_residential_kwh) / hh_size
}

/// People newly connected in `step`.
pub fn new_connections(s: &Settlement, step: &TimeStep, pop: f64) -> f64 {
    let electrified = s.was_electrified_before(step.year);
    let connections = if step.is_first {
        if electrified {
            pop - s.elec_pop_calib
        } else {
            pop
        }
    } else if electrified {
        pop - s.previous_record(step.year).map(|r| r.pop).unwrap_or(pop)
    } else {
        pop
    };
    connections.max(0.0)
}

impl SettlementStore {
    /// Opens the year record of every settlement for `step` with its
    /// population, new connections and incremental demand.
    pub fn set_scenario_variables(&mut self, demand: &DemandConfig, step: &TimeStep) {
        let mut total_demand = 0.0;
        for s in self.settlements_mut() {
            let pop = s.population_in(step.year);
            let hh_size = if s.is_urban { demand.urban_hh_size } else { demand.rural_hh_size };
            let connections = new_connections(s, step, pop);

            let mut demand_kwh = connections * per_capita_residential(s, demand);
            if demand.productive_demand && !s.was_electrified_before(step.year) {
                demand_kwh += s.productive.total();
            }
            total_demand += demand_kwh;

            s.years.insert(
                step.year,
                SettlementYearRecord::new(pop, hh_size, connections, demand_kwh),
            );
        }
        debug!("Incremental demand for {}: {:.0} kWh", step.year, total_demand);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::*;
    use crate::config::simulation_config::TierLevel;
    use crate::config::tech_type::TechKind;
    use crate::data::poi::Coordinate;
    use approx::assert_relative_eq;

    fn demand() -> DemandConfig {
        DemandConfig {
            urban_tier: TierLevel::Tier4,
            rural_tier: TierLevel::Custom,
            urban_hh_size: 4.0,
            rural_hh_size: 5.0,
            productive_demand: true,
        }
    }

    fn step(year: u32, is_first: bool) -> TimeStep {
        TimeStep { year, time_step: 5, elec_target: 1.0, is_first }
    }

    #[test]
    fn tiers_divide_by_household_size() {
        let mut s = Settlement::new(1, Coordinate::new(0.0, 0.0), 100.0, "Est");
        s.is_urban = true;
        assert_relative_eq!(per_capita_residential(&s, &demand()), TIER_4_KWH / 4.0);
        s.is_urban = false;
        assert_eq!(per_capita_residential(&s, &demand()), 0.0);
        s.custom_residential_kwh = Some(500.0);
        assert_relative_eq!(per_capita_residential(&s, &demand()), 100.0);
    }

    #[test]
    fn connections_follow_electrification_history() {
        let mut s = Settlement::new(1, Coordinate::new(0.0, 0.0), 100.0, "Est");
        s.elec_start = true;
        s.elec_pop_calib = 60.0;
        assert_relative_eq!(new_connections(&s, &step(2025, true), 120.0), 60.0);

        let mut record = SettlementYearRecord::new(120.0, 5.0, 60.0, 0.0);
        record.final_code = TechKind::Grid.code();
        s.years.insert(2025, record);
        assert_relative_eq!(new_connections(&s, &step(2030, false), 150.0), 30.0);

        s.years.get_mut(&2025).unwrap().final_code = UNELECTRIFIED_CODE;
        assert_relative_eq!(new_connections(&s, &step(2030, false), 150.0), 150.0);
    }

    #[test]
    fn productive_demand_only_when_newly_electrified() {
        let mut fresh = Settlement::new(1, Coordinate::new(0.0, 0.0), 100.0, "Est");
        fresh.productive.health = 1000.0;
        fresh.projected_pop.insert(2025, 100.0);
        let mut old = fresh.clone();
        old.id = 2;
        old.elec_start = true;
        old.elec_pop_calib = 100.0;

        let mut store = SettlementStore::new(vec![fresh, old]).unwrap();
        store.set_scenario_variables(&demand(), &step(2025, true));
        assert_relative_eq!(store.get(0).record(2025).unwrap().demand_kwh, 1000.0);
        let old = store.get(1).record(2025).unwrap();
        assert_eq!(old.new_connections, 0.0);
        assert_eq!(old.demand_kwh, 0.0);
    }
}
