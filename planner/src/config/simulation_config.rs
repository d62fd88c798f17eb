use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::constants::*;
use crate::config::tech_type::{SupplyCategory, TechKind};
use crate::error::{PlanError, PlanResult};
use crate::models::technology::{CostBreak, DieselLogistics, LineCosts, Technology, TechnologyParams};

/// Years and discount rate shared by every technology of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioTimeline {
    pub base_year: u32,
    pub start_year: u32,
    pub end_year: u32,
    pub discount_rate: f64,
}

impl ScenarioTimeline {
    pub fn validate(&self) -> PlanResult<()> {
        if self.start_year < self.base_year {
            return Err(PlanError::Config(format!(
                "start year {} precedes base year {}",
                self.start_year, self.base_year
            )));
        }
        if self.end_year <= self.start_year {
            return Err(PlanError::Config(format!(
                "end year {} must follow start year {}",
                self.end_year, self.start_year
            )));
        }
        if !self.discount_rate.is_finite() || self.discount_rate <= -1.0 {
            return Err(PlanError::Config(format!("invalid discount rate {}", self.discount_rate)));
        }
        Ok(())
    }

    /// Number of years covered by the discounted cash flow.
    pub fn project_life(&self) -> u32 {
        self.end_year - self.base_year + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisYear {
    pub year: u32,
    /// Share of the population to be electrified by this year (0..=1).
    pub elec_target: f64,
}

/// One analysis year with its duration since the previous step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStep {
    pub year: u32,
    pub time_step: u32,
    pub elec_target: f64,
    pub is_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TierLevel {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
    Tier5,
    /// Per-settlement `ResidentialDemandTierCustom` column.
    Custom,
}

impl TierLevel {
    /// Residential demand per household (kWh/year). A custom tier without a
    /// value for the settlement contributes no residential demand.
    pub fn household_kwh(&self, custom: Option<f64>) -> f64 {
        match self {
            TierLevel::Tier1 => TIER_1_KWH,
            TierLevel::Tier2 => TIER_2_KWH,
            TierLevel::Tier3 => TIER_3_KWH,
            TierLevel::Tier4 => TIER_4_KWH,
            TierLevel::Tier5 => TIER_5_KWH,
            TierLevel::Custom => custom.unwrap_or(0.0).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandConfig {
    pub urban_tier: TierLevel,
    pub rural_tier: TierLevel,
    pub urban_hh_size: f64,
    pub rural_hh_size: f64,
    /// Adds health, education, agriculture, commercial and industrial demand.
    pub productive_demand: bool,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            urban_tier: TierLevel::Tier5,
            rural_tier: TierLevel::Tier3,
            urban_hh_size: 5.0,
            rural_hh_size: 5.0,
            productive_demand: true,
        }
    }
}

/// Initial guess for the electrification calibration search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElectrificationThresholds {
    pub min_night_lights: f64,
    pub min_pop: f64,
    pub max_transformer_dist: f64,
    pub max_mv_dist: f64,
    pub max_hv_dist: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub start_year_pop: f64,
    pub urban_ratio_start: f64,
    pub elec_rate: f64,
    pub urban_elec_rate: f64,
    pub rural_elec_rate: f64,
    pub thresholds: ElectrificationThresholds,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            start_year_pop: 90_000_000.0,
            urban_ratio_start: 0.45,
            elec_rate: 0.19,
            urban_elec_rate: 0.41,
            rural_elec_rate: 0.01,
            thresholds: ElectrificationThresholds {
                min_night_lights: 0.0,
                min_pop: 100.0,
                max_transformer_dist: 1.0,
                max_mv_dist: 2.0,
                max_hv_dist: 25.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub end_year_pop: f64,
    pub urban_ratio_end: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            end_year_pop: 120_000_000.0,
            urban_ratio_end: 0.5,
        }
    }
}

/// Annual caps of a region (households/year and kW/year).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionLimits {
    pub annual_new_connections: f64,
    pub annual_capacity_kw: f64,
}

impl RegionLimits {
    pub fn unlimited() -> Self {
        Self {
            annual_new_connections: 999_999_999.0,
            annual_capacity_kw: 999_999_999.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub name: String,
    pub grid: TechnologyParams,
    pub default_limits: RegionLimits,
    /// Overrides of `default_limits` for specific analysis years.
    #[serde(default)]
    pub yearly_limits: BTreeMap<u32, RegionLimits>,
    /// Buffer around existing lines inside which settlements are force-connected (km).
    #[serde(default)]
    pub auto_intensification_km: f64,
    pub max_extension_km: f64,
}

impl RegionConfig {
    pub fn limits_for(&self, year: u32) -> RegionLimits {
        self.yearly_limits.get(&year).copied().unwrap_or(self.default_limits)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRasterPaths {
    pub region: String,
    /// Existing network cells (non-zero = grid).
    pub origins: PathBuf,
    /// Traversal cost weights.
    pub cost: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtensionMode {
    Distance,
    Raster { regions: Vec<RegionRasterPaths> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub timeline: ScenarioTimeline,
    pub analysis_years: Vec<AnalysisYear>,
    pub demand: DemandConfig,
    pub calibration: CalibrationConfig,
    pub projection: ProjectionConfig,
    pub off_grid: Vec<TechnologyParams>,
    #[serde(default)]
    pub line_costs: LineCosts,
    pub regions: Vec<RegionConfig>,
    pub extension: ExtensionMode,
}

fn grid_params() -> TechnologyParams {
    TechnologyParams {
        kind: TechKind::Grid,
        distribution_losses: 0.08,
        connection_cost_per_hh: 150.0,
        base_to_peak_load_ratio: 0.8,
        capacity_factor: 1.0,
        tech_life: 30,
        om_costs: 0.0,
        om_of_td_lines: 0.1,
        capital_cost: Vec::new(),
        grid_price: 0.07,
        grid_capacity_investment: 2000.0,
        fuel: None,
    }
}

fn mini_grid_params(kind: TechKind, capacity_factor: f64, tech_life: u32, om_costs: f64, usd_per_kw: f64) -> TechnologyParams {
    TechnologyParams {
        kind,
        distribution_losses: 0.05,
        connection_cost_per_hh: 92.0,
        base_to_peak_load_ratio: 0.85,
        capacity_factor,
        tech_life,
        om_costs,
        om_of_td_lines: 0.02,
        capital_cost: CostBreak::flat(usd_per_kw),
        grid_price: 0.0,
        grid_capacity_investment: 0.0,
        fuel: None,
    }
}

fn standalone_params(kind: TechKind, capacity_factor: f64, tech_life: u32, om_costs: f64, capital_cost: Vec<CostBreak>) -> TechnologyParams {
    TechnologyParams {
        kind,
        distribution_losses: 0.0,
        connection_cost_per_hh: 0.0,
        base_to_peak_load_ratio: 0.9,
        capacity_factor,
        tech_life,
        om_costs,
        om_of_td_lines: 0.0,
        capital_cost,
        grid_price: 0.0,
        grid_capacity_investment: 0.0,
        fuel: None,
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        let mut mg_diesel = mini_grid_params(TechKind::MgDiesel, 0.7, 20, 0.1, 672.0);
        mg_diesel.fuel = Some(DieselLogistics {
            diesel_price: 0.8,
            efficiency: 0.33,
            truck_consumption: 33.7,
            truck_volume: 15_000.0,
        });
        let mut sa_diesel = standalone_params(TechKind::SaDiesel, 0.5, 20, 0.1, CostBreak::flat(814.0));
        sa_diesel.fuel = Some(DieselLogistics {
            diesel_price: 0.8,
            efficiency: 0.28,
            truck_consumption: 14.0,
            truck_volume: 300.0,
        });
        let sa_pv = standalone_params(
            TechKind::SaPv,
            1.0,
            25,
            0.02,
            vec![
                CostBreak { below_kw_per_hh: Some(0.020), usd_per_kw: 9620.0 },
                CostBreak { below_kw_per_hh: Some(0.050), usd_per_kw: 8780.0 },
                CostBreak { below_kw_per_hh: Some(0.100), usd_per_kw: 6380.0 },
                CostBreak { below_kw_per_hh: Some(1.0), usd_per_kw: 4470.0 },
                CostBreak { below_kw_per_hh: None, usd_per_kw: 6950.0 },
            ],
        );

        let regions = ["Est", "Ouest", "Sud"]
            .iter()
            .map(|name| RegionConfig {
                name: name.to_string(),
                grid: grid_params(),
                default_limits: RegionLimits::unlimited(),
                yearly_limits: BTreeMap::new(),
                auto_intensification_km: 0.0,
                max_extension_km: DEFAULT_MAX_EXTENSION_KM,
            })
            .collect();

        Self {
            timeline: ScenarioTimeline {
                base_year: 2020,
                start_year: 2020,
                end_year: 2030,
                discount_rate: 0.08,
            },
            analysis_years: vec![
                AnalysisYear { year: 2025, elec_target: 0.8 },
                AnalysisYear { year: 2030, elec_target: 1.0 },
            ],
            demand: DemandConfig::default(),
            calibration: CalibrationConfig::default(),
            projection: ProjectionConfig::default(),
            off_grid: vec![
                sa_diesel,
                sa_pv,
                mg_diesel,
                mini_grid_params(TechKind::MgPv, 1.0, 25, 0.015, 2950.0),
                mini_grid_params(TechKind::MgWind, 1.0, 20, 0.02, 3750.0),
                mini_grid_params(TechKind::MgHydro, 0.5, 35, 0.03, 5000.0),
            ],
            line_costs: LineCosts::default(),
            regions,
            extension: ExtensionMode::Distance,
        }
    }
}

impl ScenarioConfig {
    pub fn load(path: &Path) -> PlanResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: ScenarioConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> PlanResult<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> PlanResult<()> {
        self.timeline.validate()?;

        if self.analysis_years.is_empty() {
            return Err(PlanError::Config("no analysis years".to_string()));
        }
        let mut previous = self.timeline.start_year;
        for step in &self.analysis_years {
            if step.year <= previous || step.year > self.timeline.end_year {
                return Err(PlanError::Config(format!(
                    "analysis year {} must be increasing and within {}-{}",
                    step.year, self.timeline.start_year, self.timeline.end_year
                )));
            }
            if !(0.0..=1.0).contains(&step.elec_target) {
                return Err(PlanError::Config(format!(
                    "electrification target {} for {} is not a share",
                    step.elec_target, step.year
                )));
            }
            previous = step.year;
        }

        if self.demand.urban_hh_size <= 0.0 || self.demand.rural_hh_size <= 0.0 {
            return Err(PlanError::Config("household sizes must be positive".to_string()));
        }

        let mut kinds = HashSet::new();
        for params in &self.off_grid {
            if params.kind.category() == SupplyCategory::Grid {
                return Err(PlanError::Config("the grid cannot be listed as an off-grid option".to_string()));
            }
            if !kinds.insert(params.kind) {
                return Err(PlanError::Config(format!("{} is configured twice", params.kind)));
            }
        }

        if self.regions.is_empty() {
            return Err(PlanError::Config("no grid regions".to_string()));
        }
        let mut names = HashSet::new();
        for region in &self.regions {
            if !names.insert(region.name.as_str()) {
                return Err(PlanError::Config(format!("region {} is configured twice", region.name)));
            }
            if region.grid.kind != TechKind::Grid {
                return Err(PlanError::Config(format!("region {} must use a grid technology", region.name)));
            }
            if region.max_extension_km < 0.0 || region.auto_intensification_km < 0.0 {
                return Err(PlanError::Config(format!("region {} has negative distances", region.name)));
            }
        }

        if let ExtensionMode::Raster { regions } = &self.extension {
            for paths in regions {
                if !names.contains(paths.region.as_str()) {
                    return Err(PlanError::Config(format!("unknown region {} in raster paths", paths.region)));
                }
            }
        }

        // Surfaces schedule and logistics problems before any computation
        self.build_off_grid()?;
        for region in &self.regions {
            Technology::new(region.grid.clone(), self.line_costs, self.timeline)?;
        }
        Ok(())
    }

    /// Analysis years paired with the number of years since the previous step.
    pub fn time_steps(&self) -> Vec<TimeStep> {
        let mut previous = self.timeline.start_year;
        self.analysis_years
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let time_step = TimeStep {
                    year: step.year,
                    time_step: step.year - previous,
                    elec_target: step.elec_target,
                    is_first: i == 0,
                };
                previous = step.year;
                time_step
            })
            .collect()
    }

    pub fn build_off_grid(&self) -> PlanResult<Vec<Technology>> {
        self.off_grid
            .iter()
            .map(|params| Technology::new(params.clone(), self.line_costs, self.timeline))
            .collect()
    }

    pub fn region_index(&self, name: &str) -> PlanResult<usize> {
        self.regions
            .iter()
            .position(|r| r.name == name)
            .ok_or_else(|| PlanError::Config(format!("unknown region {}", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ScenarioConfig::default();
        config.validate().unwrap();
        assert_eq!(config.regions.len(), 3);
        assert_eq!(config.build_off_grid().unwrap().len(), 6);
    }

    #[test]
    fn time_steps_measure_from_previous_year() {
        let steps = ScenarioConfig::default().time_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!((steps[0].year, steps[0].time_step, steps[0].is_first), (2025, 5, true));
        assert_eq!((steps[1].year, steps[1].time_step, steps[1].is_first), (2030, 5, false));
    }

    #[test]
    fn rejects_years_outside_timeline() {
        let mut config = ScenarioConfig::default();
        config.analysis_years.push(AnalysisYear { year: 2035, elec_target: 1.0 });
        assert!(matches!(config.validate(), Err(PlanError::Config(_))));

        let mut config = ScenarioConfig::default();
        config.timeline.end_year = 2019;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_regions_and_unknown_raster_regions() {
        let mut config = ScenarioConfig::default();
        let copy = config.regions[0].clone();
        config.regions.push(copy);
        assert!(config.validate().is_err());

        let mut config = ScenarioConfig::default();
        config.extension = ExtensionMode::Raster {
            regions: vec![RegionRasterPaths {
                region: "Nord".to_string(),
                origins: PathBuf::from("o.asc"),
                cost: PathBuf::from("c.asc"),
            }],
        };
        assert!(config.validate().is_err());
        assert!(config.region_index("Nord").is_err());
    }

    #[test]
    fn yearly_limits_override_defaults() {
        let mut region = ScenarioConfig::default().regions.remove(0);
        let tight = RegionLimits { annual_new_connections: 10.0, annual_capacity_kw: 5.0 };
        region.yearly_limits.insert(2025, tight);
        assert_eq!(region.limits_for(2025), tight);
        assert_eq!(region.limits_for(2030), RegionLimits::unlimited());
    }

    #[test]
    fn config_survives_json() {
        let config = ScenarioConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: ScenarioConfig = serde_json::from_str(&text).unwrap();
        back.validate().unwrap();
        assert_eq!(back.analysis_years, config.analysis_years);
    }
}
