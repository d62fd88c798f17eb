use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::constants::{INFEASIBLE_LCOE, UNELECTRIFIED_CODE};
use crate::config::tech_type::TechKind;
use crate::data::poi::{Coordinate, POI};
use crate::models::technology::LcoeResult;

/// Non-residential demand components (kWh/year).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductiveDemand {
    pub health: f64,
    pub education: f64,
    pub agriculture: f64,
    pub commercial: f64,
    pub heavy_industry: f64,
}

impl ProductiveDemand {
    pub fn total(&self) -> f64 {
        self.health + self.education + self.agriculture + self.commercial + self.heavy_industry
    }
}

/// Outcome of one analysis year for one settlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementYearRecord {
    pub pop: f64,
    pub people_per_hh: f64,
    pub new_connections: f64,
    pub demand_kwh: f64,
    pub lcoe: BTreeMap<TechKind, LcoeResult>,
    pub grid_lcoe: f64,
    pub min_grid_dist: f64,
    pub elec_order: u32,
    pub elec_loop: u32,
    pub pre_screened: bool,
    pub forced: bool,
    /// Connected by the grid planner this year.
    pub grid_connected: bool,
    pub grid_investment: f64,
    pub grid_capacity_kw: f64,
    pub min_off_grid: Option<TechKind>,
    pub min_off_grid_lcoe: f64,
    pub minimum_overall: Option<TechKind>,
    pub minimum_overall_lcoe: f64,
    pub final_code: u8,
    pub new_capacity_kw: f64,
    pub investment: f64,
}

impl SettlementYearRecord {
    pub fn new(pop: f64, people_per_hh: f64, new_connections: f64, demand_kwh: f64) -> Self {
        Self {
            pop,
            people_per_hh,
            new_connections,
            demand_kwh,
            lcoe: BTreeMap::new(),
            grid_lcoe: INFEASIBLE_LCOE,
            min_grid_dist: f64::INFINITY,
            elec_order: 0,
            elec_loop: 0,
            pre_screened: false,
            forced: false,
            grid_connected: false,
            grid_investment: 0.0,
            grid_capacity_kw: 0.0,
            min_off_grid: None,
            min_off_grid_lcoe: INFEASIBLE_LCOE,
            minimum_overall: None,
            minimum_overall_lcoe: INFEASIBLE_LCOE,
            final_code: UNELECTRIFIED_CODE,
            new_capacity_kw: 0.0,
            investment: 0.0,
        }
    }

    pub fn final_tech(&self) -> Option<TechKind> {
        TechKind::from_code(self.final_code)
    }

    pub fn is_electrified(&self) -> bool {
        self.final_code != UNELECTRIFIED_CODE
    }

    pub fn new_households(&self) -> f64 {
        if self.people_per_hh > 0.0 {
            self.new_connections / self.people_per_hh
        } else {
            0.0
        }
    }
}

/// One row of the settlement table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: u64,
    pub coordinate: Coordinate,
    pub pop: f64,
    pub region: String,
    pub is_urban: bool,
    pub cell_area_km2: f64,
    pub night_lights: f64,
    pub dist_to_transformer_km: f64,
    pub mv_line_dist_km: f64,
    pub hv_line_dist_km: f64,
    pub travel_hours: f64,
    pub ghi: f64,
    pub wind_cf: f64,
    pub hydro_potential_kw: f64,
    pub hydro_dist_km: f64,
    pub grid_penalty: f64,
    pub custom_residential_kwh: Option<f64>,
    pub productive: ProductiveDemand,

    // Calibration results
    pub pop_start: f64,
    pub elec_start: bool,
    pub elec_pop_calib: f64,

    /// Projected population per analysis year.
    pub projected_pop: BTreeMap<u32, f64>,
    pub years: BTreeMap<u32, SettlementYearRecord>,
}

impl Settlement {
    pub fn new(id: u64, coordinate: Coordinate, pop: f64, region: &str) -> Self {
        Self {
            id,
            coordinate,
            pop,
            region: region.to_string(),
            is_urban: false,
            cell_area_km2: 1.0,
            night_lights: 0.0,
            dist_to_transformer_km: f64::INFINITY,
            mv_line_dist_km: f64::INFINITY,
            hv_line_dist_km: f64::INFINITY,
            travel_hours: 0.0,
            ghi: 0.0,
            wind_cf: 0.0,
            hydro_potential_kw: 0.0,
            hydro_dist_km: 0.0,
            grid_penalty: 1.0,
            custom_residential_kwh: None,
            productive: ProductiveDemand::default(),
            pop_start: pop,
            elec_start: false,
            elec_pop_calib: 0.0,
            projected_pop: BTreeMap::new(),
            years: BTreeMap::new(),
        }
    }

    /// Distance to the closest existing MV or HV line (km).
    pub fn existing_grid_dist_km(&self) -> f64 {
        self.mv_line_dist_km.min(self.hv_line_dist_km)
    }

    /// Record of the last analysis year before `year`.
    pub fn previous_record(&self, year: u32) -> Option<&SettlementYearRecord> {
        self.years.range(..year).next_back().map(|(_, r)| r)
    }

    /// Electrification code carried into `year`: the previous year's final
    /// code, or grid for settlements electrified at the start.
    pub fn prior_code(&self, year: u32) -> u8 {
        match self.previous_record(year) {
            Some(record) => record.final_code,
            None if self.elec_start => TechKind::Grid.code(),
            None => UNELECTRIFIED_CODE,
        }
    }

    pub fn was_electrified_before(&self, year: u32) -> bool {
        self.prior_code(year) != UNELECTRIFIED_CODE
    }

    pub fn was_on_grid_before(&self, year: u32) -> bool {
        self.prior_code(year) == TechKind::Grid.code()
    }

    pub fn record(&self, year: u32) -> Option<&SettlementYearRecord> {
        self.years.get(&year)
    }

    pub fn population_in(&self, year: u32) -> f64 {
        self.projected_pop.get(&year).copied().unwrap_or(self.pop_start)
    }
}

impl POI for Settlement {
    fn get_coordinate(&self) -> &Coordinate {
        &self.coordinate
    }

    fn get_id(&self) -> u64 {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prior_code_follows_history() {
        let mut s = Settlement::new(1, Coordinate::new(0.0, 0.0), 100.0, "Est");
        assert_eq!(s.prior_code(2025), UNELECTRIFIED_CODE);
        s.elec_start = true;
        assert!(s.was_on_grid_before(2025));

        let mut record = SettlementYearRecord::new(100.0, 5.0, 0.0, 0.0);
        record.final_code = TechKind::SaPv.code();
        s.years.insert(2025, record);
        assert_eq!(s.prior_code(2030), TechKind::SaPv.code());
        assert!(!s.was_on_grid_before(2030));
        assert!(s.was_electrified_before(2030));
        // The 2025 decision itself is not visible to 2025
        assert!(s.was_on_grid_before(2025));
    }

    #[test]
    fn new_households_guard_zero_household_size() {
        let record = SettlementYearRecord::new(10.0, 0.0, 10.0, 0.0);
        assert_eq!(record.new_households(), 0.0);
    }
}
