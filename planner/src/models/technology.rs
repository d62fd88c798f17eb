//! Levelized cost of electricity for one supply technology.
//!
//! A [`Technology`] is built once per scenario from its parameters and the
//! run's [`ScenarioTimeline`], and is then shared read-only by every
//! settlement and year.
use serde::{Deserialize, Serialize};

use crate::config::const_funcs::{calc_diesel_fuel_cost, discount_factor};
use crate::config::constants::*;
use crate::config::simulation_config::ScenarioTimeline;
use crate::config::tech_type::{SupplyCategory, TechKind};
use crate::error::{PlanError, PlanResult};

/// One step of a capital-cost schedule. Applies to installations whose kW
/// per household is strictly below `below_kw_per_hh` (`None` = unbounded).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CostBreak {
    pub below_kw_per_hh: Option<f64>,
    pub usd_per_kw: f64,
}

impl CostBreak {
    pub fn flat(usd_per_kw: f64) -> Vec<CostBreak> {
        vec![CostBreak { below_kw_per_hh: None, usd_per_kw }]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DieselLogistics {
    pub diesel_price: f64,          // USD/litre
    pub efficiency: f64,
    pub truck_consumption: f64,     // litres/hour
    pub truck_volume: f64,          // litres
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineCosts {
    pub hv_line_cost: f64,
    pub mv_line_cost: f64,
    pub lv_line_cost: f64,
    pub service_transformer_cost: f64,
    pub mv_line_capacity_kw: f64,
    pub lv_line_capacity_kw: f64,
    pub mv_line_max_length_km: f64,
    pub existing_grid_cost_ratio: f64,
}

impl Default for LineCosts {
    fn default() -> Self {
        Self {
            hv_line_cost: HV_LINE_COST,
            mv_line_cost: MV_LINE_COST,
            lv_line_cost: LV_LINE_COST,
            service_transformer_cost: SERVICE_TRANSFORMER_COST,
            mv_line_capacity_kw: MV_LINE_CAPACITY_KW,
            lv_line_capacity_kw: LV_LINE_CAPACITY_KW,
            mv_line_max_length_km: MV_LINE_MAX_LENGTH_KM,
            existing_grid_cost_ratio: EXISTING_GRID_COST_RATIO,
        }
    }
}

fn default_one() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnologyParams {
    pub kind: TechKind,
    #[serde(default)]
    pub distribution_losses: f64,
    #[serde(default)]
    pub connection_cost_per_hh: f64,
    pub base_to_peak_load_ratio: f64,
    #[serde(default = "default_one")]
    pub capacity_factor: f64,
    pub tech_life: u32,
    #[serde(default)]
    pub om_costs: f64,
    #[serde(default)]
    pub om_of_td_lines: f64,
    #[serde(default)]
    pub capital_cost: Vec<CostBreak>,
    /// Generation price of the grid (USD/kWh).
    #[serde(default)]
    pub grid_price: f64,
    /// Generation capacity investment of the grid (USD/kW).
    #[serde(default)]
    pub grid_capacity_investment: f64,
    #[serde(default)]
    pub fuel: Option<DieselLogistics>,
}

/// Per-settlement inputs of one LCOE evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LcoeInput {
    /// Demand to be served by the new investment (kWh/year).
    pub energy_kwh: f64,
    pub people: f64,
    pub people_per_hh: f64,
    /// People newly connected by this investment.
    pub new_connections: f64,
    pub year: u32,
    pub time_step: u32,
    pub additional_mv_km: f64,
    pub cell_area_km2: f64,
    pub grid_penalty: f64,
    pub elec_loop: u32,
    pub capacity_factor: Option<f64>,
    pub fuel_cost: f64,
    pub max_capacity_kw: Option<f64>,
}

impl LcoeInput {
    pub fn new(
        energy_kwh: f64,
        people: f64,
        people_per_hh: f64,
        new_connections: f64,
        year: u32,
        time_step: u32,
    ) -> Self {
        Self {
            energy_kwh,
            people,
            people_per_hh,
            new_connections,
            year,
            time_step,
            additional_mv_km: 0.0,
            cell_area_km2: 1.0,
            grid_penalty: 1.0,
            elec_loop: 0,
            capacity_factor: None,
            fuel_cost: 0.0,
            max_capacity_kw: None,
        }
    }

    pub fn with_distance(mut self, additional_mv_km: f64) -> Self {
        self.additional_mv_km = additional_mv_km;
        self
    }

    pub fn with_cell_area(mut self, cell_area_km2: f64) -> Self {
        self.cell_area_km2 = cell_area_km2;
        self
    }

    pub fn with_grid_penalty(mut self, grid_penalty: f64) -> Self {
        self.grid_penalty = grid_penalty;
        self
    }

    pub fn with_elec_loop(mut self, elec_loop: u32) -> Self {
        self.elec_loop = elec_loop;
        self
    }

    pub fn with_capacity_factor(mut self, capacity_factor: f64) -> Self {
        self.capacity_factor = Some(capacity_factor);
        self
    }

    pub fn with_fuel_cost(mut self, fuel_cost: f64) -> Self {
        self.fuel_cost = fuel_cost;
        self
    }

    pub fn with_max_capacity(mut self, max_capacity_kw: f64) -> Self {
        self.max_capacity_kw = Some(max_capacity_kw);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LcoeResult {
    pub lcoe: f64,
    pub new_capacity_kw: f64,
    pub investment: f64,
}

impl LcoeResult {
    pub fn infeasible() -> Self {
        Self {
            lcoe: INFEASIBLE_LCOE,
            new_capacity_kw: 0.0,
            investment: 0.0,
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.lcoe < INFEASIBLE_LCOE
    }
}

#[derive(Debug, Clone)]
pub struct Technology {
    params: TechnologyParams,
    lines: LineCosts,
    timeline: ScenarioTimeline,
}

impl Technology {
    pub fn new(params: TechnologyParams, lines: LineCosts, timeline: ScenarioTimeline) -> PlanResult<Self> {
        timeline.validate()?;
        let kind = params.kind;
        if params.tech_life == 0 {
            return Err(PlanError::Config(format!("{}: technology life must be positive", kind)));
        }
        if !(0.0..1.0).contains(&params.distribution_losses) {
            return Err(PlanError::Config(format!("{}: distribution losses must be in [0, 1)", kind)));
        }
        if params.base_to_peak_load_ratio <= 0.0 {
            return Err(PlanError::Config(format!("{}: base-to-peak load ratio must be positive", kind)));
        }
        if kind.category() != SupplyCategory::Grid && params.capital_cost.is_empty() {
            return Err(PlanError::Config(format!("{}: capital cost schedule is empty", kind)));
        }
        if kind.burns_diesel() && params.fuel.is_none() {
            return Err(PlanError::Config(format!("{}: diesel logistics are missing", kind)));
        }

        let mut params = params;
        // Ascending breakpoints, unbounded step last
        params.capital_cost.sort_by(|a, b| {
            let a = a.below_kw_per_hh.unwrap_or(f64::INFINITY);
            let b = b.below_kw_per_hh.unwrap_or(f64::INFINITY);
            a.total_cmp(&b)
        });

        Ok(Self { params, lines, timeline })
    }

    pub fn kind(&self) -> TechKind {
        self.params.kind
    }

    pub fn params(&self) -> &TechnologyParams {
        &self.params
    }

    pub fn timeline(&self) -> &ScenarioTimeline {
        &self.timeline
    }

    /// Fuel cost per kWh for a settlement `travel_hours` from the nearest
    /// town. Zero for technologies that burn no fuel.
    pub fn fuel_cost(&self, travel_hours: f64) -> f64 {
        match self.params.fuel {
            Some(f) => calc_diesel_fuel_cost(
                f.diesel_price,
                f.efficiency,
                f.truck_consumption,
                f.truck_volume,
                travel_hours,
            ),
            None => 0.0,
        }
    }

    fn capital_cost_per_kw(&self, kw_per_household: f64) -> f64 {
        if self.params.kind.category() == SupplyCategory::Grid {
            return self.params.grid_capacity_investment;
        }
        self.params
            .capital_cost
            .iter()
            .find(|b| kw_per_household < b.below_kw_per_hh.unwrap_or(f64::INFINITY))
            .or(self.params.capital_cost.last())
            .map(|b| b.usd_per_kw)
            .unwrap_or(0.0)
    }

    /// Transmission and distribution investment needed to serve the new
    /// connections, including the extension line to the supply point.
    fn td_investment(&self, input: &LcoeInput, peak_load_kw: f64, new_households: f64) -> f64 {
        if self.params.kind.category() == SupplyCategory::Standalone {
            return 0.0;
        }
        let lines = &self.lines;
        let households = (input.people / input.people_per_hh).max(1.0);
        let area = input.cell_area_km2.max(0.01);

        let lv_unit_length = (area / households).sqrt() * std::f64::consts::SQRT_2 / 2.0;
        let lv_km = LV_LENGTH_FACTOR * new_households * lv_unit_length;

        let mv_lines = peak_load_kw / lines.mv_line_capacity_kw;
        let internal_mv_km = (area.sqrt() / 2.0).min(lines.mv_line_max_length_km) * mv_lines;
        let transformers = peak_load_kw / lines.lv_line_capacity_kw;

        let extension_cost = input.additional_mv_km
            * lines.mv_line_cost
            * input.grid_penalty
            * (1.0 + lines.existing_grid_cost_ratio).powi(input.elec_loop as i32);

        lv_km * lines.lv_line_cost
            + internal_mv_km * lines.mv_line_cost
            + transformers * lines.service_transformer_cost
            + extension_cost
            + self.params.connection_cost_per_hh * new_households
    }

    /// Levelized cost of serving `input.energy_kwh` with this technology.
    ///
    /// Returns the infeasible sentinel when the cost cannot be computed.
    /// A year outside the scenario timeline is a configuration error.
    pub fn lcoe(&self, input: &LcoeInput) -> PlanResult<LcoeResult> {
        let timeline = &self.timeline;
        let investment_year = input.year.checked_sub(input.time_step).unwrap_or(0);
        if investment_year < timeline.base_year || input.year > timeline.end_year {
            return Err(PlanError::Config(format!(
                "{}: year {} (step {}) lies outside the scenario timeline {}-{}",
                self.params.kind, input.year, input.time_step, timeline.base_year, timeline.end_year
            )));
        }

        let capacity_factor = input.capacity_factor.unwrap_or(self.params.capacity_factor);
        if input.people <= 0.0
            || input.energy_kwh <= 0.0
            || input.new_connections <= 0.0
            || input.people_per_hh <= 0.0
            || capacity_factor <= 0.0
            || !input.additional_mv_km.is_finite()
            || input.additional_mv_km < 0.0
            || !input.fuel_cost.is_finite()
        {
            return Ok(LcoeResult::infeasible());
        }

        let generation_per_year = input.energy_kwh / (1.0 - self.params.distribution_losses);
        let peak_load_kw = generation_per_year / HOURS_PER_YEAR / self.params.base_to_peak_load_ratio;
        let installed_capacity = peak_load_kw / capacity_factor;
        if let Some(max_kw) = input.max_capacity_kw {
            if installed_capacity > max_kw {
                return Ok(LcoeResult::infeasible());
            }
        }

        let new_households = input.new_connections / input.people_per_hh;
        let capital = installed_capacity * self.capital_cost_per_kw(installed_capacity / new_households);
        let td = self.td_investment(input, peak_load_kw, new_households);
        let total_investment = capital + td;
        let annual_om = self.params.om_costs * capital + self.params.om_of_td_lines * td;
        let fuel_per_kwh = match self.params.kind.category() {
            SupplyCategory::Grid => self.params.grid_price,
            _ => input.fuel_cost,
        };

        let lcoe = self.discounted_lcoe(
            investment_year - timeline.base_year,
            total_investment,
            annual_om,
            fuel_per_kwh,
            generation_per_year,
        );

        if !lcoe.is_finite() || lcoe >= INFEASIBLE_LCOE {
            return Ok(LcoeResult::infeasible());
        }

        Ok(LcoeResult {
            lcoe,
            new_capacity_kw: installed_capacity,
            investment: total_investment,
        })
    }

    /// Discounted cash flow over the project life with one reinvestment if
    /// the technology wears out early and a linear salvage value at the end.
    fn discounted_lcoe(&self, step: u32, investment: f64, annual_om: f64, fuel_per_kwh: f64, generation: f64) -> f64 {
        let project_life = self.timeline.project_life();
        let tech_life = self.params.tech_life;
        let reinvest_year = (tech_life + step < project_life).then_some(tech_life + step);

        let used_life = match reinvest_year {
            Some(_) => (project_life - step).saturating_sub(tech_life),
            None => (project_life - step).saturating_sub(1),
        };
        let salvage = investment * (1.0 - used_life as f64 / tech_life as f64).clamp(0.0, 1.0);

        let mut discounted_costs = 0.0;
        let mut discounted_generation = 0.0;
        for year in 0..project_life {
            let factor = discount_factor(self.timeline.discount_rate, year);
            let mut cost = 0.0;
            if year == step || Some(year) == reinvest_year {
                cost += investment;
            }
            if year >= step {
                cost += annual_om + fuel_per_kwh * generation;
                discounted_generation += generation / factor;
            }
            if year == project_life - 1 {
                cost -= salvage;
            }
            discounted_costs += cost / factor;
        }

        discounted_costs / discounted_generation
    }
}
