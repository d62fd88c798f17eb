//! Capacity-constrained least-cost line routing over a cost raster.
//!
//! `seek` grows a multi-source shortest-path tree from the existing network.
//! Targets are linked in order of path distance while their allowance and the
//! region budget permit, and every new line becomes a source itself, so later
//! targets may branch off earlier ones.
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap, HashMap};

use tracing::{debug, info};

use crate::config::constants::MAX_DISTANCE_BISECTION_STEPS;
use crate::config::constants::MAX_PATHFINDER_ITERATIONS;
use crate::config::simulation_config::{RegionRasterPaths, TimeStep};
use crate::core::grid_extension::{
    grid_beats_off_grid, grid_lcoe, in_intensification_buffer, pre_electrify, year_record, ConnectionKind,
    GridAssignment, RegionPlan,
};
use crate::data::raster_io::load_ascii_grid;
use crate::data::store::SettlementStore;
use crate::error::{PlanError, PlanResult};
use crate::models::grid_region::{Budget, GridRegion};
use crate::models::raster::Raster;
use crate::models::settlement::{Settlement, SettlementYearRecord};
use crate::utils::logging::{self, FileIOType, OperationCategory, PlanningStage};

/// Network state of one region carried from year to year.
#[derive(Debug, Clone)]
pub struct RegionRasterState {
    /// Non-zero where a line exists.
    pub origins: Raster<u8>,
    pub cost: Raster<f64>,
    /// Path distance (km) from the network, zero on it.
    pub mv_dist: Raster<f64>,
    /// Cells that received a line, per analysis year.
    pub new_lines: BTreeMap<u32, Raster<u8>>,
}

impl RegionRasterState {
    pub fn new(origins: Raster<u8>, cost: Raster<f64>) -> PlanResult<Self> {
        if !origins.same_grid(&cost) {
            return Err(PlanError::Raster("origins and cost rasters are not on the same grid".to_string()));
        }
        let mut mv_dist = Raster::filled(cost.transform, f64::INFINITY);
        for (i, &v) in origins.values().iter().enumerate() {
            if v != 0 {
                mv_dist.set_flat(i, 0.0);
            }
        }
        Ok(Self {
            origins,
            cost,
            mv_dist,
            new_lines: BTreeMap::new(),
        })
    }

    pub fn load(paths: &RegionRasterPaths) -> PlanResult<Self> {
        let _timing = logging::start_timing(
            "load_region_rasters",
            OperationCategory::FileIO { subcategory: FileIOType::RasterLoad },
        );
        let origins = load_ascii_grid(&paths.origins)?;
        let cost = load_ascii_grid(&paths.cost)?;
        let mut network = Raster::filled(origins.transform, 0u8);
        for (i, &v) in origins.values().iter().enumerate() {
            if v.is_finite() && v != 0.0 {
                network.set_flat(i, 1);
            }
        }
        Self::new(network, cost)
    }

    pub fn network_cells(&self) -> usize {
        self.origins.values().iter().filter(|&&v| v != 0).count()
    }
}

/// A settlement waiting for a line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub id: u64,
    pub cell: usize,
    /// Longest affordable path distance (km); unbounded for forced targets.
    pub max_dist: f64,
    pub households: f64,
    pub capacity_kw: f64,
    /// Inside the intensification buffer: routed before everything else.
    pub forced: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeekOutcome {
    pub new_cells: Vec<usize>,
    /// Linked targets with their path distance, in linking order.
    pub connected: Vec<(u64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Node {
    dist: f64,
    cell: usize,
}

impl Eq for Node {}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.cell.cmp(&other.cell))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn passable(weight: f64) -> bool {
    weight.is_finite() && weight > 0.0
}

/// One least-cost search from the current network. Links targets whose path
/// distance fits their allowance while `budget` covers them, turns the new
/// lines into network cells and updates `mv_dist`.
pub fn seek(
    origins: &mut Raster<u8>,
    cost: &Raster<f64>,
    mv_dist: &mut Raster<f64>,
    targets: &[Target],
    budget: &mut Budget,
) -> SeekOutcome {
    let mut outcome = SeekOutcome::default();
    if targets.is_empty() || budget.is_exhausted() {
        return outcome;
    }

    let cell_km = cost.transform.cell_km();
    let bound = targets.iter().map(|t| t.max_dist).fold(0.0, f64::max);
    let cells = cost.transform.len();

    let mut by_cell: HashMap<usize, Vec<usize>> = HashMap::new();
    for (k, t) in targets.iter().enumerate() {
        by_cell.entry(t.cell).or_default().push(k);
    }
    for list in by_cell.values_mut() {
        list.sort_by_key(|&k| targets[k].id);
    }
    let mut linked = vec![false; targets.len()];
    let mut pending = targets.len();

    let mut dist = vec![f64::INFINITY; cells];
    let mut prev: Vec<Option<usize>> = vec![None; cells];
    let mut heap = BinaryHeap::new();
    for (i, &v) in origins.values().iter().enumerate() {
        if v != 0 {
            dist[i] = 0.0;
            heap.push(Reverse(Node { dist: 0.0, cell: i }));
        }
    }

    while let Some(Reverse(Node { dist: d, cell })) = heap.pop() {
        if d > dist[cell] {
            continue;
        }
        if d > bound || pending == 0 || budget.is_exhausted() {
            break;
        }

        if let Some(waiting) = by_cell.get(&cell) {
            let mut link_here = false;
            for &k in waiting {
                let t = &targets[k];
                if linked[k] || d > t.max_dist || !budget.allows(t.households, t.capacity_kw) {
                    continue;
                }
                budget.charge(t.households, t.capacity_kw);
                linked[k] = true;
                pending -= 1;
                link_here = true;
                outcome.connected.push((t.id, d));
            }

            if link_here && d > 0.0 {
                // Trace back to the network; the path becomes a source
                let mut c = Some(cell);
                while let Some(current) = c {
                    if dist[current] == 0.0 {
                        break;
                    }
                    if origins.at_flat(current) == 0 {
                        origins.set_flat(current, 1);
                        outcome.new_cells.push(current);
                    }
                    dist[current] = 0.0;
                    heap.push(Reverse(Node { dist: 0.0, cell: current }));
                    c = prev[current];
                }
                continue;
            }
        }

        let w_from = cost.at_flat(cell);
        for (next, diagonal) in cost.neighbours(cell) {
            let w_to = cost.at_flat(next);
            if !passable(w_to) {
                continue;
            }
            let w = if passable(w_from) { (w_from + w_to) / 2.0 } else { w_to };
            let step = cell_km * if diagonal { std::f64::consts::SQRT_2 } else { 1.0 } * w;
            let candidate = d + step;
            if candidate < dist[next] {
                dist[next] = candidate;
                prev[next] = Some(cell);
                heap.push(Reverse(Node { dist: candidate, cell: next }));
            }
        }
    }

    for (i, &d) in dist.iter().enumerate() {
        if d < mv_dist.at_flat(i) {
            mv_dist.set_flat(i, d);
        }
    }
    outcome
}

fn route(
    state: &mut RegionRasterState,
    mut remaining: Vec<Target>,
    budget: &mut Budget,
    new_lines: &mut Raster<u8>,
    connected: &mut Vec<(u64, f64)>,
) {
    for iteration in 1..=MAX_PATHFINDER_ITERATIONS {
        let outcome = seek(&mut state.origins, &state.cost, &mut state.mv_dist, &remaining, budget);
        debug!(
            "Pathfinder iteration {}: {} targets linked, {} new cells",
            iteration,
            outcome.connected.len(),
            outcome.new_cells.len()
        );
        for &cell in &outcome.new_cells {
            new_lines.set_flat(cell, 1);
        }
        if outcome.connected.is_empty() {
            break;
        }
        remaining.retain(|t| !outcome.connected.iter().any(|(id, _)| *id == t.id));
        connected.extend(outcome.connected);
    }
}

/// Repeats `seek` until no further target is linked, forced targets first.
/// Returns the path distance of every linked target, keyed by settlement id.
pub fn find_grid_path(
    state: &mut RegionRasterState,
    targets: &[Target],
    budget: &mut Budget,
    year: u32,
) -> Vec<(u64, f64)> {
    let _timing = logging::start_timing(
        "find_grid_path",
        OperationCategory::Planning { subcategory: PlanningStage::Pathfinding },
    );
    let mut new_lines = Raster::filled(state.origins.transform, 0u8);
    let mut connected: Vec<(u64, f64)> = Vec::new();
    let (forced, others): (Vec<Target>, Vec<Target>) = targets.iter().copied().partition(|t| t.forced);

    route(state, forced, budget, &mut new_lines, &mut connected);
    route(state, others, budget, &mut new_lines, &mut connected);

    state.new_lines.insert(year, new_lines);
    connected
}

/// Longest extension at which the grid still beats the cheapest off-grid
/// option, or `None` if it does not even at the line. Settlements in the
/// intensification buffer have no limit.
pub fn max_affordable_distance(
    region: &GridRegion,
    s: &Settlement,
    record: &SettlementYearRecord,
    step: &TimeStep,
) -> PlanResult<Option<f64>> {
    let max_km = region.config.max_extension_km;
    if in_intensification_buffer(region, s) {
        return Ok(Some(f64::INFINITY));
    }
    let affordable = |d: f64| -> PlanResult<bool> {
        let result = grid_lcoe(region, s, record, step, d, 0)?;
        Ok(grid_beats_off_grid(s, record, step, &result))
    };
    if !affordable(0.0)? {
        return Ok(None);
    }
    if affordable(max_km)? {
        return Ok(Some(max_km));
    }
    let (mut lo, mut hi) = (0.0, max_km);
    for _ in 0..MAX_DISTANCE_BISECTION_STEPS {
        let mid = (lo + hi) / 2.0;
        if affordable(mid)? {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(Some(lo))
}

/// Raster-mode planning of one region: pre-electrification, then routing
/// lines to the affordable candidates.
pub fn plan_region_raster(
    store: &SettlementStore,
    region: &GridRegion,
    step: &TimeStep,
    state: &mut RegionRasterState,
) -> PlanResult<RegionPlan> {
    let mut plan = RegionPlan::new(region.index, region.budget_for(step.year, step.time_step));
    pre_electrify(store, region, step, &mut plan)?;

    let transform = state.origins.transform;
    let mut targets = Vec::new();
    let mut by_id = HashMap::new();
    for i in store.region_members(region.name()) {
        let s = store.get(i);
        let Some(record) = year_record(s, step) else { continue };
        if !record.pre_screened {
            continue;
        }
        let Some(cell) = transform.cell_of(&s.coordinate) else { continue };
        let Some(max_dist) = max_affordable_distance(region, s, record, step)? else { continue };
        let at_line = grid_lcoe(region, s, record, step, 0.0, 0)?;
        targets.push(Target {
            id: s.id,
            cell: cell.0 * transform.ncols + cell.1,
            max_dist,
            households: record.new_households(),
            capacity_kw: at_line.new_capacity_kw,
            forced: in_intensification_buffer(region, s),
        });
        by_id.insert(s.id, i);
    }

    let mut budget = plan.budget_left;
    let connected = find_grid_path(state, &targets, &mut budget, step.year);

    let mut elec_order = 0;
    for (id, distance) in connected {
        let Some(&i) = by_id.get(&id) else { continue };
        let s = store.get(i);
        let Some(record) = year_record(s, step) else { continue };
        let result = grid_lcoe(region, s, record, step, distance, 0)?;
        elec_order += 1;
        let kind = if in_intensification_buffer(region, s) {
            ConnectionKind::Forced
        } else {
            ConnectionKind::Extended
        };
        plan.push(
            GridAssignment {
                index: i,
                kind,
                grid_lcoe: result.lcoe,
                min_grid_dist: distance,
                elec_order,
                elec_loop: 0,
                investment: result.investment,
                capacity_kw: result.new_capacity_kw,
            },
            record.new_households(),
        );
    }

    info!(
        "{} {}: {} settlements linked over {} network cells",
        region.name(),
        step.year,
        plan.connected_indices().count(),
        state.network_cells()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::raster::GeoTransform;

    fn transform(ncols: usize, nrows: usize) -> GeoTransform {
        GeoTransform { ncols, nrows, xll: 0.0, yll: 0.0, cell_size: 0.01 }
    }

    fn line_setup(ncols: usize) -> (Raster<u8>, Raster<f64>, Raster<f64>) {
        let t = transform(ncols, 1);
        let mut origins = Raster::filled(t, 0u8);
        origins.set(0, 0, 1);
        let cost = Raster::filled(t, 1.0);
        let mv = Raster::filled(t, f64::INFINITY);
        (origins, cost, mv)
    }

    fn target(id: u64, cell: usize, max_dist: f64) -> Target {
        Target { id, cell, max_dist, households: 10.0, capacity_kw: 5.0, forced: false }
    }

    #[test]
    fn links_target_and_turns_path_into_network() {
        let (mut origins, cost, mut mv) = line_setup(6);
        let cell_km = cost.transform.cell_km();
        let mut budget = Budget::new(100.0, 100.0);
        let outcome = seek(&mut origins, &cost, &mut mv, &[target(1, 4, 10.0)], &mut budget);

        assert_eq!(outcome.connected.len(), 1);
        assert!((outcome.connected[0].1 - 4.0 * cell_km).abs() < 1e-9);
        assert_eq!(outcome.new_cells.len(), 4);
        assert!((1..=4).all(|c| origins.at_flat(c) == 1));
        assert_eq!(origins.at_flat(5), 0);
        assert_eq!(budget, Budget::new(90.0, 95.0));
    }

    #[test]
    fn impassable_cells_are_never_crossed() {
        let t = transform(5, 3);
        let mut origins = Raster::filled(t, 0u8);
        origins.set(1, 0, 1);
        let mut cost = Raster::filled(t, 1.0);
        // Wall in column 2 with a gap at the bottom row
        cost.set(0, 2, 0.0);
        cost.set(1, 2, f64::NAN);
        let mut mv = Raster::filled(t, f64::INFINITY);
        let goal = origins.flat_index(1, 4);
        let mut budget = Budget::new(100.0, 100.0);
        let outcome = seek(&mut origins, &cost, &mut mv, &[target(7, goal, 100.0)], &mut budget);

        assert_eq!(outcome.connected.len(), 1);
        for &c in &outcome.new_cells {
            assert!(passable(cost.at_flat(c)));
        }
        assert!(outcome.new_cells.contains(&origins.flat_index(2, 2)));
    }

    #[test]
    fn targets_beyond_allowance_or_budget_stay_unlinked() {
        let (mut origins, cost, mut mv) = line_setup(6);
        let cell_km = cost.transform.cell_km();
        let mut budget = Budget::new(100.0, 100.0);
        let outcome = seek(&mut origins, &cost, &mut mv, &[target(1, 5, 2.0 * cell_km)], &mut budget);
        assert!(outcome.connected.is_empty());
        assert!(outcome.new_cells.is_empty());

        let mut budget = Budget::new(15.0, 100.0);
        let targets = [target(1, 2, 100.0), target(2, 4, 100.0)];
        let outcome = seek(&mut origins, &cost, &mut mv, &targets, &mut budget);
        assert_eq!(outcome.connected.iter().map(|c| c.0).collect::<Vec<_>>(), vec![1]);
        assert!(budget.connections_hh >= 0.0);
    }

    #[test]
    fn later_targets_branch_off_new_lines() {
        let t = transform(6, 3);
        let mut origins = Raster::filled(t, 0u8);
        origins.set(0, 0, 1);
        let cost = Raster::filled(t, 1.0);
        let mut mv = Raster::filled(t, f64::INFINITY);
        let cell_km = t.cell_km();
        let near = origins.flat_index(0, 5);
        let below = origins.flat_index(2, 5);
        let mut budget = Budget::new(100.0, 100.0);
        // The second target is only affordable from the first one's line
        let outcome = seek(
            &mut origins,
            &cost,
            &mut mv,
            &[target(1, near, 10.0), target(2, below, 2.5 * cell_km)],
            &mut budget,
        );
        assert_eq!(outcome.connected.len(), 2);
        assert!((outcome.connected[1].1 - 2.0 * cell_km).abs() < 1e-9);
    }

    #[test]
    fn find_grid_path_records_new_lines_per_year() {
        let (origins, cost, _) = line_setup(6);
        let mut state = RegionRasterState::new(origins, cost).unwrap();
        let mut budget = Budget::new(100.0, 100.0);
        let linked = find_grid_path(&mut state, &[target(1, 3, 100.0)], &mut budget, 2025);
        assert_eq!(linked.len(), 1);
        let lines = &state.new_lines[&2025];
        assert_eq!(lines.values().iter().filter(|&&v| v == 1).count(), 3);
        assert_eq!(state.mv_dist.at_flat(3), 0.0);
        assert_eq!(state.network_cells(), 4);
    }

    #[test]
    fn forced_targets_are_routed_first_over_any_terrain() {
        let (origins, _, _) = line_setup(8);
        let cost = Raster::filled(origins.transform, 60.0);
        let mut state = RegionRasterState::new(origins, cost).unwrap();
        let near = target(1, 2, 1e9);
        let far = Target { max_dist: f64::INFINITY, forced: true, ..target(2, 7, 0.0) };
        // Room for one of the two
        let mut budget = Budget::new(10.0, 100.0);
        let linked = find_grid_path(&mut state, &[near, far], &mut budget, 2025);

        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].0, 2);
        assert!(linked[0].1 > 7.0 * state.cost.transform.cell_km());
        assert_eq!(budget.connections_hh, 0.0);
    }
}
