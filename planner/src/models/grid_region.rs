use serde::Serialize;

use crate::config::simulation_config::{RegionConfig, ScenarioConfig};
use crate::error::PlanResult;
use crate::models::technology::Technology;

/// Remaining connection (households) and capacity (kW) allowance of one
/// region for one time step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Budget {
    pub connections_hh: f64,
    pub capacity_kw: f64,
}

impl Budget {
    pub fn new(connections_hh: f64, capacity_kw: f64) -> Self {
        Self {
            connections_hh,
            capacity_kw,
        }
    }

    pub fn allows(&self, households: f64, capacity_kw: f64) -> bool {
        households <= self.connections_hh && capacity_kw <= self.capacity_kw
    }

    pub fn charge(&mut self, households: f64, capacity_kw: f64) {
        self.connections_hh -= households;
        self.capacity_kw -= capacity_kw;
    }

    pub fn is_exhausted(&self) -> bool {
        self.connections_hh <= 0.0 || self.capacity_kw <= 0.0
    }
}

/// An independently operated sub-grid with its own technology and caps.
#[derive(Debug, Clone)]
pub struct GridRegion {
    pub index: usize,
    pub config: RegionConfig,
    pub grid: Technology,
}

impl GridRegion {
    pub fn from_config(config: &ScenarioConfig) -> PlanResult<Vec<GridRegion>> {
        config
            .regions
            .iter()
            .enumerate()
            .map(|(index, region)| {
                Ok(GridRegion {
                    index,
                    config: region.clone(),
                    grid: Technology::new(region.grid.clone(), config.line_costs, config.timeline)?,
                })
            })
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Allowance for a step of `time_step` years ending in `year`.
    pub fn budget_for(&self, year: u32, time_step: u32) -> Budget {
        let limits = self.config.limits_for(year);
        Budget::new(
            limits.annual_new_connections * time_step as f64,
            limits.annual_capacity_kw * time_step as f64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::simulation_config::RegionLimits;

    #[test]
    fn budget_scales_with_step_length() {
        let mut config = ScenarioConfig::default();
        config.regions[0].default_limits = RegionLimits {
            annual_new_connections: 100.0,
            annual_capacity_kw: 20.0,
        };
        let regions = GridRegion::from_config(&config).unwrap();
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].budget_for(2025, 5), Budget::new(500.0, 100.0));
    }

    #[test]
    fn charge_and_exhaust() {
        let mut budget = Budget::new(10.0, 5.0);
        assert!(budget.allows(10.0, 5.0));
        budget.charge(10.0, 1.0);
        assert!(!budget.allows(0.1, 0.0));
        assert!(budget.is_exhausted());
    }
}
