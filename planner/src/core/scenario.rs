//! The year loop: costing, grid planning, least-cost choice and rationing.
use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::analysis::metrics::YearlySummary;
use crate::config::const_funcs::calc_pv_capacity_factor;
use crate::config::constants::{INFEASIBLE_LCOE, UNELECTRIFIED_CODE};
use crate::config::simulation_config::{ExtensionMode, ScenarioConfig, TimeStep};
use crate::config::tech_type::TechKind;
use crate::core::grid_extension::{plan_region, pre_screen, ConnectionKind, RegionPlan};
use crate::core::limitations::apply_limitations;
use crate::core::pathfinder::{plan_region_raster, RegionRasterState};
use crate::data::calibration::CalibrationReport;
use crate::data::store::SettlementStore;
use crate::error::{PlanError, PlanResult};
use crate::models::grid_region::GridRegion;
use crate::models::settlement::{Settlement, SettlementYearRecord};
use crate::models::technology::{LcoeInput, LcoeResult, Technology};
use crate::utils::logging::{self, CostStage, DataStage, OperationCategory, PlanningStage};

/// Receives progress notifications from a running scenario. Region
/// notifications arrive from worker threads.
pub trait ProgressObserver: Sync {
    fn year_started(&self, _step: &TimeStep, _index: usize, _total: usize) {}
    fn region_planned(&self, _year: u32, _region: &str) {}
    fn year_finished(&self, _summary: &YearlySummary) {}
}

pub struct NoProgress;

impl ProgressObserver for NoProgress {}

#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    /// Present when the run had to calibrate the table itself.
    pub calibration: Option<CalibrationReport>,
    /// Annual (urban, rural) population growth rates.
    pub growth_rates: (f64, f64),
    pub summaries: Vec<YearlySummary>,
    /// Final network state of every raster-planned region.
    pub raster_states: Vec<(String, RegionRasterState)>,
}

/// Runs the scenario, loading the region rasters named in the config when
/// it uses raster extension.
pub fn run_scenario(
    store: &mut SettlementStore,
    config: &ScenarioConfig,
    observer: &dyn ProgressObserver,
) -> PlanResult<ScenarioOutcome> {
    let mut states: Vec<Option<RegionRasterState>> = vec![None; config.regions.len()];
    if let ExtensionMode::Raster { regions } = &config.extension {
        for paths in regions {
            let index = config.region_index(&paths.region)?;
            states[index] = Some(RegionRasterState::load(paths)?);
        }
    }
    run_scenario_with_rasters(store, config, states, observer)
}

/// Runs the scenario with in-memory network rasters. Regions without a
/// raster state use distance-based extension.
pub fn run_scenario_with_rasters(
    store: &mut SettlementStore,
    config: &ScenarioConfig,
    mut states: Vec<Option<RegionRasterState>>,
    observer: &dyn ProgressObserver,
) -> PlanResult<ScenarioOutcome> {
    let _timing = logging::start_timing("run_scenario", OperationCategory::Scenario);
    config.validate()?;
    if states.len() != config.regions.len() {
        return Err(PlanError::Config(format!(
            "{} raster states for {} regions",
            states.len(),
            config.regions.len()
        )));
    }

    let regions = GridRegion::from_config(config)?;
    let off_grid = config.build_off_grid()?;
    for s in store.settlements() {
        if !regions.iter().any(|r| r.name() == s.region) {
            return Err(PlanError::Config(format!(
                "settlement {} belongs to unknown region {}",
                s.id, s.region
            )));
        }
    }

    let calibration = if store.is_calibrated() {
        None
    } else {
        let _timing = logging::start_timing(
            "calibrate",
            OperationCategory::DataPreparation { subcategory: DataStage::Calibration },
        );
        Some(store.calibrate(&config.calibration))
    };

    let steps = config.time_steps();
    let years: Vec<u32> = steps.iter().map(|s| s.year).collect();
    let growth_rates = {
        let _timing = logging::start_timing(
            "project_pop_and_urban",
            OperationCategory::DataPreparation { subcategory: DataStage::Projection },
        );
        store.project_pop_and_urban(&config.projection, &config.timeline, &years)
    };
    for s in store.settlements_mut() {
        s.years.clear();
    }

    let mut summaries = Vec::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        observer.year_started(step, index, steps.len());
        let summary = run_year(store, config, &regions, &off_grid, &mut states, step, observer)?;
        info!(
            "{}: electrified {:.1}% (target {:.1}%), investment {:.0} USD",
            step.year,
            summary.electrification_rate() * 100.0,
            step.elec_target * 100.0,
            summary.total_investment()
        );
        observer.year_finished(&summary);
        summaries.push(summary);
    }

    let raster_states = regions
        .iter()
        .zip(states)
        .filter_map(|(region, state)| state.map(|s| (region.name().to_string(), s)))
        .collect();

    Ok(ScenarioOutcome {
        calibration,
        growth_rates,
        summaries,
        raster_states,
    })
}

fn run_year(
    store: &mut SettlementStore,
    config: &ScenarioConfig,
    regions: &[GridRegion],
    off_grid: &[Technology],
    states: &mut [Option<RegionRasterState>],
    step: &TimeStep,
    observer: &dyn ProgressObserver,
) -> PlanResult<YearlySummary> {
    {
        let _timing = logging::start_timing(
            "set_scenario_variables",
            OperationCategory::DataPreparation { subcategory: DataStage::Demand },
        );
        store.set_scenario_variables(&config.demand, step);
    }

    compute_off_grid_lcoes(store, off_grid, step)?;

    {
        let _timing = logging::start_timing(
            "pre_screen",
            OperationCategory::Planning { subcategory: PlanningStage::PreScreening },
        );
        for region in regions {
            pre_screen(store, region, step)?;
        }
    }

    let plans = {
        let store: &SettlementStore = store;
        regions
            .par_iter()
            .zip(states.par_iter_mut())
            .map(|(region, state)| -> PlanResult<RegionPlan> {
                let plan = match state {
                    Some(state) => plan_region_raster(store, region, step, state)?,
                    None => plan_region(store, region, step)?,
                };
                observer.region_planned(step.year, region.name());
                Ok(plan)
            })
            .collect::<PlanResult<Vec<_>>>()?
    };
    for plan in &plans {
        apply_plan(store, plan, step);
    }

    choose_final_technologies(store, step);
    let rationing = apply_limitations(store, step);
    record_investments(store, step);

    Ok(YearlySummary::collect(store, step, regions, &plans, rationing))
}

/// Inputs of one off-grid technology for one settlement.
pub fn off_grid_input(tech: &Technology, s: &Settlement, record: &SettlementYearRecord, step: &TimeStep) -> LcoeInput {
    let input = LcoeInput::new(
        record.demand_kwh,
        record.pop,
        record.people_per_hh,
        record.new_connections,
        step.year,
        step.time_step,
    )
    .with_cell_area(s.cell_area_km2);

    match tech.kind() {
        TechKind::SaPv | TechKind::MgPv => input.with_capacity_factor(calc_pv_capacity_factor(s.ghi)),
        TechKind::MgWind => input.with_capacity_factor(s.wind_cf),
        TechKind::MgHydro => input
            .with_distance(s.hydro_dist_km)
            .with_max_capacity(s.hydro_potential_kw),
        TechKind::SaDiesel | TechKind::MgDiesel => input.with_fuel_cost(tech.fuel_cost(s.travel_hours)),
        TechKind::Grid => input,
    }
}

/// Cheapest feasible entry; ties keep the technology listed first.
pub fn cheapest(lcoes: &BTreeMap<TechKind, LcoeResult>) -> (Option<TechKind>, f64) {
    let mut best = (None, INFEASIBLE_LCOE);
    for (&kind, result) in lcoes {
        if result.is_feasible() && result.lcoe < best.1 {
            best = (Some(kind), result.lcoe);
        }
    }
    best
}

/// LCOE of every off-grid technology for every settlement, and the
/// cheapest off-grid option.
pub fn compute_off_grid_lcoes(store: &mut SettlementStore, off_grid: &[Technology], step: &TimeStep) -> PlanResult<()> {
    let _timing = logging::start_timing(
        "compute_off_grid_lcoes",
        OperationCategory::CostModel { subcategory: CostStage::OffGrid },
    );
    let results = store
        .settlements()
        .par_iter()
        .map(|s| -> PlanResult<Option<BTreeMap<TechKind, LcoeResult>>> {
            let Some(record) = s.record(step.year) else { return Ok(None) };
            let mut lcoes = BTreeMap::new();
            for tech in off_grid {
                lcoes.insert(tech.kind(), tech.lcoe(&off_grid_input(tech, s, record, step))?);
            }
            Ok(Some(lcoes))
        })
        .collect::<PlanResult<Vec<_>>>()?;

    let mut feasible = 0;
    for (s, lcoes) in store.settlements_mut().iter_mut().zip(results) {
        let (Some(lcoes), Some(record)) = (lcoes, s.years.get_mut(&step.year)) else { continue };
        let (kind, lcoe) = cheapest(&lcoes);
        record.min_off_grid = kind;
        record.min_off_grid_lcoe = lcoe;
        record.lcoe = lcoes;
        feasible += usize::from(kind.is_some());
    }
    debug!("{}: {} settlements have a feasible off-grid option", step.year, feasible);
    Ok(())
}

fn apply_plan(store: &mut SettlementStore, plan: &RegionPlan, step: &TimeStep) {
    let _timing = logging::start_timing(
        "apply_plan",
        OperationCategory::CostModel { subcategory: CostStage::Grid },
    );
    for a in &plan.assignments {
        let Some(record) = store.get_mut(a.index).years.get_mut(&step.year) else { continue };
        record.grid_lcoe = a.grid_lcoe;
        record.min_grid_dist = a.min_grid_dist;
        record.elec_order = a.elec_order;
        record.elec_loop = a.elec_loop;
        record.forced = a.kind == ConnectionKind::Forced;
        record.grid_connected = a.is_new_connection();
        record.grid_investment = a.investment;
        record.grid_capacity_kw = a.capacity_kw;
        record.lcoe.insert(
            TechKind::Grid,
            LcoeResult {
                lcoe: a.grid_lcoe,
                new_capacity_kw: a.capacity_kw,
                investment: a.investment,
            },
        );
    }
}

/// Least-cost comparison and final codes. Grid settlements stay on the
/// grid, off-grid settlements keep their technology unless the grid reached
/// them, and new settlements take the grid when connected or else the
/// cheapest feasible off-grid option.
fn choose_final_technologies(store: &mut SettlementStore, step: &TimeStep) {
    let grid = TechKind::Grid.code();
    for s in store.settlements_mut() {
        let prior = s.prior_code(step.year);
        let Some(record) = s.years.get_mut(&step.year) else { continue };

        record.lcoe.entry(TechKind::Grid).or_insert_with(LcoeResult::infeasible);
        let (overall, overall_lcoe) = cheapest(&record.lcoe);
        record.minimum_overall = overall;
        record.minimum_overall_lcoe = overall_lcoe;

        record.final_code = if prior == grid || record.grid_connected {
            grid
        } else if prior != UNELECTRIFIED_CODE {
            prior
        } else {
            record.min_off_grid.map(|t| t.code()).unwrap_or(UNELECTRIFIED_CODE)
        };
    }
}

fn record_investments(store: &mut SettlementStore, step: &TimeStep) {
    for s in store.settlements_mut() {
        let Some(record) = s.years.get_mut(&step.year) else { continue };
        let (capacity, investment) = match record.final_tech() {
            Some(TechKind::Grid) => (record.grid_capacity_kw, record.grid_investment),
            Some(tech) => record
                .lcoe
                .get(&tech)
                .map(|r| (r.new_capacity_kw, r.investment))
                .unwrap_or((0.0, 0.0)),
            None => (0.0, 0.0),
        };
        record.new_capacity_kw = capacity;
        record.investment = investment;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::simulation_config::RegionLimits;
    use crate::data::poi::Coordinate;

    fn config() -> ScenarioConfig {
        let mut config = ScenarioConfig::default();
        config.analysis_years.truncate(1);
        config.analysis_years[0].elec_target = 1.0;
        config
    }

    fn calibrated(settlements: Vec<Settlement>) -> SettlementStore {
        let mut store = SettlementStore::new(settlements).unwrap();
        store.mark_calibrated();
        store
    }

    fn village(id: u64, x: f64, pop: f64) -> Settlement {
        let mut s = Settlement::new(id, Coordinate::new(x, 0.0), pop, "Est");
        s.ghi = 2000.0;
        s.travel_hours = 2.0;
        s.mv_line_dist_km = 1.0;
        s
    }

    #[test]
    fn minimum_overall_is_the_cheapest_lcoe() {
        let mut store = calibrated((0..5).map(|i| village(i + 1, i as f64 * 0.05, 500.0)).collect());
        run_scenario(&mut store, &config(), &NoProgress).unwrap();
        for s in store.settlements() {
            let record = s.record(2025).unwrap();
            let min = record.lcoe.values().map(|r| r.lcoe).fold(INFEASIBLE_LCOE, f64::min);
            assert_eq!(record.minimum_overall_lcoe, min);
            assert!(record.lcoe.contains_key(&TechKind::Grid));
        }
    }

    #[test]
    fn empty_settlement_gets_sentinels() {
        let mut store = calibrated(vec![village(1, 0.0, 0.0), village(2, 0.05, 500.0)]);
        run_scenario(&mut store, &config(), &NoProgress).unwrap();
        let record = store.get(0).record(2025).unwrap();
        assert!(record.lcoe.values().all(|r| r.lcoe == INFEASIBLE_LCOE));
        assert_eq!(record.minimum_overall_lcoe, INFEASIBLE_LCOE);
        assert_eq!(record.minimum_overall, None);
        assert_eq!(record.final_code, UNELECTRIFIED_CODE);
    }

    #[test]
    fn grid_settlements_stay_on_the_grid() {
        let mut config = ScenarioConfig::default();
        config.analysis_years[0].elec_target = 1.0;
        for region in &mut config.regions {
            region.default_limits = RegionLimits { annual_new_connections: 0.0, annual_capacity_kw: 0.0 };
        }
        let mut old = village(1, 0.0, 500.0);
        old.elec_start = true;
        old.elec_pop_calib = 500.0;
        let mut store = calibrated(vec![old, village(2, 0.05, 500.0)]);
        run_scenario(&mut store, &config, &NoProgress).unwrap();

        for year in [2025, 2030] {
            let record = store.get(0).record(year).unwrap();
            assert_eq!(record.final_tech(), Some(TechKind::Grid));
        }
        // No budget: the other village can only go off-grid
        let other = store.get(1).record(2025).unwrap();
        assert_ne!(other.final_tech(), Some(TechKind::Grid));
        assert_eq!(store.get(1).record(2030).unwrap().final_code, other.final_code);
    }

    #[test]
    fn unknown_region_is_a_configuration_error() {
        let mut s = village(1, 0.0, 100.0);
        s.region = "Nord".to_string();
        let mut store = calibrated(vec![s]);
        assert!(matches!(run_scenario(&mut store, &config(), &NoProgress), Err(PlanError::Config(_))));
    }

    #[test]
    fn uncalibrated_tables_are_calibrated_first() {
        let mut store = SettlementStore::new((0..4).map(|i| village(i + 1, i as f64 * 0.05, 500.0)).collect()).unwrap();
        let outcome = run_scenario(&mut store, &config(), &NoProgress).unwrap();
        assert!(outcome.calibration.is_some());
        assert!(store.is_calibrated());
        assert_eq!(outcome.summaries.len(), 1);
    }
}
