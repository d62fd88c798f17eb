//! Budgeted, distance-ordered growth of one grid region for one time step.
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use tracing::{debug, info};

use crate::config::constants::UNELECTRIFIED_CODE;
use crate::config::simulation_config::TimeStep;
use crate::data::store::SettlementStore;
use crate::error::PlanResult;
use crate::models::grid_region::{Budget, GridRegion};
use crate::models::settlement::{Settlement, SettlementYearRecord};
use crate::models::technology::{LcoeInput, LcoeResult};
use crate::utils::logging::{self, OperationCategory, PlanningStage};
use crate::utils::spatial_index::SpatialIndex;

/// How a settlement ended up on the grid in this step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Already connected; the increment was charged to the budget.
    Densified,
    /// Already connected; the increment did not fit the budget.
    Deferred,
    /// Inside the intensification buffer, connected regardless of cost.
    Forced,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridAssignment {
    pub index: usize,
    pub kind: ConnectionKind,
    pub grid_lcoe: f64,
    pub min_grid_dist: f64,
    pub elec_order: u32,
    /// Number of settlement-to-settlement hops back to the original lines.
    pub elec_loop: u32,
    pub investment: f64,
    pub capacity_kw: f64,
}

impl GridAssignment {
    pub fn is_new_connection(&self) -> bool {
        matches!(self.kind, ConnectionKind::Forced | ConnectionKind::Extended)
    }
}

/// Result of planning one region, applied to the store afterwards.
#[derive(Debug, Clone)]
pub struct RegionPlan {
    pub region: usize,
    pub assignments: Vec<GridAssignment>,
    pub budget_left: Budget,
    pub investment: f64,
    pub new_households: f64,
    pub new_capacity_kw: f64,
}

impl RegionPlan {
    pub fn new(region: usize, budget: Budget) -> Self {
        Self {
            region,
            assignments: Vec::new(),
            budget_left: budget,
            investment: 0.0,
            new_households: 0.0,
            new_capacity_kw: 0.0,
        }
    }

    pub(crate) fn push(&mut self, assignment: GridAssignment, households: f64) {
        if assignment.kind != ConnectionKind::Deferred {
            self.budget_left.charge(households, assignment.capacity_kw);
            self.investment += assignment.investment;
            self.new_households += households;
            self.new_capacity_kw += assignment.capacity_kw;
        }
        self.assignments.push(assignment);
    }

    /// Settlements newly connected in this step.
    pub fn connected_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.assignments.iter().filter(|a| a.is_new_connection()).map(|a| a.index)
    }
}

pub(crate) fn year_record<'a>(s: &'a Settlement, step: &TimeStep) -> Option<&'a SettlementYearRecord> {
    s.years.get(&step.year)
}

/// Grid LCOE of serving the settlement's increment from `distance_km` away.
pub fn grid_lcoe(
    region: &GridRegion,
    s: &Settlement,
    record: &SettlementYearRecord,
    step: &TimeStep,
    distance_km: f64,
    elec_loop: u32,
) -> PlanResult<LcoeResult> {
    let input = LcoeInput::new(
        record.demand_kwh,
        record.pop,
        record.people_per_hh,
        record.new_connections,
        step.year,
        step.time_step,
    )
    .with_distance(distance_km)
    .with_cell_area(s.cell_area_km2)
    .with_grid_penalty(s.grid_penalty)
    .with_elec_loop(elec_loop);
    region.grid.lcoe(&input)
}

/// Whether a grid LCOE wins against the settlement's cheapest off-grid
/// option. Settlements already served off-grid only switch when the grid is
/// strictly cheaper.
pub fn grid_beats_off_grid(s: &Settlement, record: &SettlementYearRecord, step: &TimeStep, grid: &LcoeResult) -> bool {
    if !grid.is_feasible() {
        return false;
    }
    if s.prior_code(step.year) != UNELECTRIFIED_CODE {
        grid.lcoe < record.min_off_grid_lcoe
    } else {
        grid.lcoe <= record.min_off_grid_lcoe
    }
}

/// Elec loop a settlement carries into `step`: the one of its previous
/// year, zero for settlements on the grid from the start.
fn prior_elec_loop(s: &Settlement, step: &TimeStep) -> u32 {
    s.previous_record(step.year).map(|r| r.elec_loop).unwrap_or(0)
}

/// Distance (km) and elec loop from every member not yet on the grid to the
/// network as it stands at the start of `step`: the existing lines, or any
/// member connected in an earlier year within `max_km`.
pub(crate) fn network_distances(
    store: &SettlementStore,
    members: &[usize],
    index: &SpatialIndex,
    step: &TimeStep,
    max_km: f64,
) -> HashMap<usize, (f64, u32)> {
    let mut reach: HashMap<usize, (f64, u32)> = members
        .iter()
        .filter(|&&i| !store.get(i).was_on_grid_before(step.year))
        .map(|&i| (i, (store.get(i).existing_grid_dist_km(), 0)))
        .collect();

    for &i in members {
        let s = store.get(i);
        if !s.was_on_grid_before(step.year) {
            continue;
        }
        let hops = prior_elec_loop(s, step) + 1;
        for (j, dist) in index.within_radius(&store.planar(i), max_km) {
            if let Some(entry) = reach.get_mut(&j) {
                if dist < entry.0 || (dist == entry.0 && hops < entry.1) {
                    *entry = (dist, hops);
                }
            }
        }
    }
    reach
}

pub fn in_intensification_buffer(region: &GridRegion, s: &Settlement) -> bool {
    region.config.auto_intensification_km > 0.0 && s.existing_grid_dist_km() <= region.config.auto_intensification_km
}

/// Marks the settlements of `region` worth considering for extension this
/// step. Returns the number of candidates.
pub fn pre_screen(store: &mut SettlementStore, region: &GridRegion, step: &TimeStep) -> PlanResult<usize> {
    let members = store.region_members(region.name());
    let max_km = region.config.max_extension_km;
    let index = store.spatial_index(&members);
    let reach = network_distances(store, &members, &index, step, max_km);
    let mut flags = Vec::with_capacity(members.len());

    for &i in &members {
        let s = store.get(i);
        let Some(record) = year_record(s, step) else {
            flags.push((i, false));
            continue;
        };
        let network_km = reach.get(&i).map(|r| r.0).unwrap_or(f64::INFINITY);
        let candidate = if s.was_on_grid_before(step.year) || record.new_connections <= 0.0 || network_km > max_km {
            false
        } else if in_intensification_buffer(region, s) {
            true
        } else {
            let at_line = grid_lcoe(region, s, record, step, 0.0, 0)?;
            grid_beats_off_grid(s, record, step, &at_line)
        };
        flags.push((i, candidate));
    }

    let mut count = 0;
    for (i, candidate) in flags {
        if let Some(record) = store.get_mut(i).years.get_mut(&step.year) {
            record.pre_screened = candidate;
            count += usize::from(candidate);
        }
    }
    debug!("{} {}: {} extension candidates", region.name(), step.year, count);
    Ok(count)
}

/// Charges the increment of settlements already on the grid, at zero
/// extension distance. Increments that do not fit are deferred.
pub fn pre_electrify(store: &SettlementStore, region: &GridRegion, step: &TimeStep, plan: &mut RegionPlan) -> PlanResult<()> {
    for i in store.region_members(region.name()) {
        let s = store.get(i);
        if !s.was_on_grid_before(step.year) {
            continue;
        }
        let Some(record) = year_record(s, step) else { continue };

        let elec_loop = prior_elec_loop(s, step);
        let result = grid_lcoe(region, s, record, step, 0.0, 0)?;
        let households = record.new_households();
        let fits = result.is_feasible() && plan.budget_left.allows(households, result.new_capacity_kw);
        let assignment = GridAssignment {
            index: i,
            kind: if fits { ConnectionKind::Densified } else { ConnectionKind::Deferred },
            grid_lcoe: result.lcoe,
            min_grid_dist: 0.0,
            elec_order: 0,
            elec_loop,
            investment: if fits { result.investment } else { 0.0 },
            capacity_kw: if fits { result.new_capacity_kw } else { 0.0 },
        };
        plan.push(assignment, households);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Frontier {
    dist: f64,
    index: usize,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist).then(self.index.cmp(&other.index))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct CandidateState {
    dist: f64,
    elec_loop: u32,
    connected: bool,
}

/// Greedy, closest-first extension of the region's network over the
/// pre-screened candidates, within the remaining budget.
pub fn extend_grid(store: &SettlementStore, region: &GridRegion, step: &TimeStep, plan: &mut RegionPlan) -> PlanResult<()> {
    let max_km = region.config.max_extension_km;
    let members = store.region_members(region.name());
    let index = store.spatial_index(&members);
    let reach = network_distances(store, &members, &index, step, max_km);

    // Lines of earlier years count as network from the start
    let mut state: HashMap<usize, CandidateState> = members
        .iter()
        .filter(|&&i| year_record(store.get(i), step).is_some_and(|r| r.pre_screened))
        .filter_map(|&i| {
            let &(dist, elec_loop) = reach.get(&i)?;
            Some((i, CandidateState { dist, elec_loop, connected: false }))
        })
        .collect();

    let mut elec_order = 0u32;
    let mut heap = BinaryHeap::new();

    // Auto-intensification, closest first
    let mut forced: Vec<usize> = state
        .keys()
        .copied()
        .filter(|&i| in_intensification_buffer(region, store.get(i)))
        .collect();
    forced.sort_by(|&a, &b| {
        state[&a].dist.total_cmp(&state[&b].dist).then(store.get(a).id.cmp(&store.get(b).id))
    });
    for i in forced {
        let s = store.get(i);
        let Some(record) = year_record(s, step) else { continue };
        let (dist, elec_loop) = (state[&i].dist, state[&i].elec_loop);
        let result = grid_lcoe(region, s, record, step, dist, elec_loop)?;
        let households = record.new_households();
        if !result.is_feasible() || !plan.budget_left.allows(households, result.new_capacity_kw) {
            continue;
        }
        elec_order += 1;
        plan.push(
            GridAssignment {
                index: i,
                kind: ConnectionKind::Forced,
                grid_lcoe: result.lcoe,
                min_grid_dist: dist,
                elec_order,
                elec_loop,
                investment: result.investment,
                capacity_kw: result.new_capacity_kw,
            },
            households,
        );
        if let Some(st) = state.get_mut(&i) {
            st.connected = true;
        }
        relax_neighbours(store, &index, &mut state, &mut heap, i, max_km);
    }

    for (&i, st) in &state {
        if !st.connected && st.dist <= max_km {
            heap.push(Reverse(Frontier { dist: st.dist, index: i }));
        }
    }

    while let Some(Reverse(Frontier { dist, index: i })) = heap.pop() {
        if plan.budget_left.is_exhausted() {
            debug!("{} {}: budget exhausted", region.name(), step.year);
            break;
        }
        if dist > max_km {
            break;
        }
        let (current, elec_loop) = match state.get(&i) {
            Some(st) if !st.connected => (st.dist, st.elec_loop),
            _ => continue,
        };
        if dist > current {
            // Superseded by a closer entry
            continue;
        }

        let s = store.get(i);
        let Some(record) = year_record(s, step) else { continue };
        let result = grid_lcoe(region, s, record, step, dist, elec_loop)?;
        let households = record.new_households();
        if !grid_beats_off_grid(s, record, step, &result)
            || !plan.budget_left.allows(households, result.new_capacity_kw)
        {
            continue;
        }

        elec_order += 1;
        plan.push(
            GridAssignment {
                index: i,
                kind: ConnectionKind::Extended,
                grid_lcoe: result.lcoe,
                min_grid_dist: dist,
                elec_order,
                elec_loop,
                investment: result.investment,
                capacity_kw: result.new_capacity_kw,
            },
            households,
        );
        if let Some(st) = state.get_mut(&i) {
            st.connected = true;
        }
        relax_neighbours(store, &index, &mut state, &mut heap, i, max_km);
    }

    Ok(())
}

fn relax_neighbours(
    store: &SettlementStore,
    index: &SpatialIndex,
    state: &mut HashMap<usize, CandidateState>,
    heap: &mut BinaryHeap<Reverse<Frontier>>,
    parent: usize,
    max_km: f64,
) {
    let parent_loop = state.get(&parent).map(|st| st.elec_loop).unwrap_or(0);
    for (j, dist) in index.within_radius(&store.planar(parent), max_km) {
        if let Some(st) = state.get_mut(&j) {
            if !st.connected && dist < st.dist {
                st.dist = dist;
                st.elec_loop = parent_loop + 1;
                heap.push(Reverse(Frontier { dist, index: j }));
            }
        }
    }
}

/// Distance-mode planning of one region: pre-electrification, then
/// auto-intensification and greedy extension.
pub fn plan_region(store: &SettlementStore, region: &GridRegion, step: &TimeStep) -> PlanResult<RegionPlan> {
    let _timing = logging::start_timing(
        "plan_region",
        OperationCategory::Planning { subcategory: PlanningStage::GridExtension },
    );
    let mut plan = RegionPlan::new(region.index, region.budget_for(step.year, step.time_step));
    pre_electrify(store, region, step, &mut plan)?;
    extend_grid(store, region, step, &mut plan)?;

    info!(
        "{} {}: {} new connections, {:.0} households, {:.1} kW, {:.0} USD",
        region.name(),
        step.year,
        plan.connected_indices().count(),
        plan.new_households,
        plan.new_capacity_kw,
        plan.investment
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::simulation_config::{RegionLimits, ScenarioConfig};
    use crate::config::tech_type::TechKind;
    use crate::data::poi::Coordinate;

    const KM_DEG: f64 = 1.0 / 111.320;

    fn step() -> TimeStep {
        TimeStep { year: 2025, time_step: 5, elec_target: 1.0, is_first: true }
    }

    fn region(limits: RegionLimits, buffer_km: f64) -> GridRegion {
        let mut config = ScenarioConfig::default();
        config.regions[0].default_limits = limits;
        config.regions[0].auto_intensification_km = buffer_km;
        GridRegion::from_config(&config).unwrap().remove(0)
    }

    /// Settlements 1 km apart along the equator, moving away from a line
    /// that passes 1 km from the first one.
    fn chain(n: usize, min_off_grid_lcoe: f64) -> SettlementStore {
        let settlements = (0..n)
            .map(|k| {
                let mut s = Settlement::new(k as u64 + 1, Coordinate::new(k as f64 * KM_DEG, 0.0), 100.0, "Est");
                s.mv_line_dist_km = 1.0 + k as f64;
                let mut record = SettlementYearRecord::new(100.0, 5.0, 100.0, 10_000.0);
                record.min_off_grid_lcoe = min_off_grid_lcoe;
                s.years.insert(2025, record);
                s
            })
            .collect();
        SettlementStore::new(settlements).unwrap()
    }

    fn plan(store: &mut SettlementStore, region: &GridRegion) -> RegionPlan {
        pre_screen(store, region, &step()).unwrap();
        plan_region(store, region, &step()).unwrap()
    }

    #[test]
    fn extension_walks_the_chain_in_order() {
        let region = region(RegionLimits::unlimited(), 0.0);
        let mut store = chain(3, 10.0);
        let plan = plan(&mut store, &region);

        let orders: Vec<(usize, u32)> = plan.assignments.iter().map(|a| (a.index, a.elec_order)).collect();
        assert_eq!(orders, vec![(0, 1), (1, 2), (2, 3)]);
        for a in &plan.assignments {
            assert_eq!(a.kind, ConnectionKind::Extended);
            assert!((a.min_grid_dist - 1.0).abs() < 0.01);
        }
        // Later links pay the loop surcharge
        assert!(plan.assignments[2].investment > plan.assignments[0].investment);
    }

    #[test]
    fn budget_caps_connections() {
        // Each settlement is 20 households
        let limits = RegionLimits { annual_new_connections: 30.0 / 5.0, annual_capacity_kw: 1e9 };
        let region = region(limits, 0.0);
        let mut store = chain(3, 10.0);
        let plan = plan(&mut store, &region);
        assert_eq!(plan.connected_indices().count(), 1);
        assert!(plan.new_households <= 30.0);
        assert!(plan.budget_left.connections_hh >= 0.0);
    }

    #[test]
    fn off_grid_cheaper_blocks_extension_but_not_intensification() {
        let region_plain = region(RegionLimits::unlimited(), 0.0);
        let mut store = chain(3, 0.0001);
        assert_eq!(plan(&mut store, &region_plain).assignments.len(), 0);

        // Everything within 5 km of the line is forced
        let region_buffer = region(RegionLimits::unlimited(), 5.0);
        let mut store = chain(3, 0.0001);
        for i in 0..3 {
            store.get_mut(i).mv_line_dist_km = 1.0 + i as f64;
        }
        let plan = plan(&mut store, &region_buffer);
        assert_eq!(plan.assignments.len(), 3);
        assert!(plan.assignments.iter().all(|a| a.kind == ConnectionKind::Forced));
    }

    #[test]
    fn increments_beyond_budget_are_deferred() {
        let limits = RegionLimits { annual_new_connections: 0.0, annual_capacity_kw: 0.0 };
        let region = region(limits, 0.0);
        let mut store = chain(1, 10.0);
        store.get_mut(0).elec_start = true;
        let plan = plan(&mut store, &region);
        assert_eq!(plan.assignments.len(), 1);
        assert_eq!(plan.assignments[0].kind, ConnectionKind::Deferred);
        assert_eq!(plan.new_capacity_kw, 0.0);
        assert_eq!(plan.investment, 0.0);
    }

    fn settle(store: &mut SettlementStore, i: usize, code: u8) {
        if let Some(record) = store.get_mut(i).years.get_mut(&2025) {
            record.final_code = code;
        }
    }

    /// Opens a 2030 record for every settlement of `store`.
    fn next_year(store: &mut SettlementStore, min_off_grid_lcoe: f64) -> TimeStep {
        for s in store.settlements_mut() {
            let mut record = SettlementYearRecord::new(100.0, 5.0, 100.0, 10_000.0);
            record.min_off_grid_lcoe = min_off_grid_lcoe;
            s.years.insert(2030, record);
        }
        TimeStep { year: 2030, time_step: 5, elec_target: 1.0, is_first: false }
    }

    #[test]
    fn earlier_connections_extend_the_network() {
        let region = region(RegionLimits::unlimited(), 0.0);
        let mut store = chain(2, 10.0);
        settle(&mut store, 0, TechKind::Grid.code());
        // Far from the lines, but 1 km from last year's connection
        store.get_mut(1).mv_line_dist_km = 70.0;
        let step = next_year(&mut store, 10.0);

        assert_eq!(pre_screen(&mut store, &region, &step).unwrap(), 1);
        let plan = plan_region(&store, &region, &step).unwrap();
        let extended: Vec<&GridAssignment> = plan.assignments.iter().filter(|a| a.is_new_connection()).collect();
        assert_eq!(extended.len(), 1);
        assert_eq!(extended[0].index, 1);
        assert!((extended[0].min_grid_dist - 1.0).abs() < 0.01);
        assert_eq!(extended[0].elec_loop, 1);
    }

    #[test]
    fn off_grid_settlements_need_a_strictly_cheaper_grid() {
        let region = region(RegionLimits::unlimited(), 0.0);
        let mut store = chain(2, 10.0);
        settle(&mut store, 0, TechKind::SaPv.code());
        let step = next_year(&mut store, 10.0);

        let s = store.get(0);
        let record = s.record(2030).unwrap();
        let tie = LcoeResult { lcoe: 0.3, new_capacity_kw: 1.0, investment: 1.0 };
        let tied = SettlementYearRecord { min_off_grid_lcoe: 0.3, ..record.clone() };
        assert!(!grid_beats_off_grid(s, &tied, &step, &tie));
        assert!(grid_beats_off_grid(store.get(1), &tied, &step, &tie));
        assert!(grid_beats_off_grid(s, &tied, &step, &LcoeResult { lcoe: 0.29, ..tie }));
    }

    #[test]
    fn settlements_beyond_max_distance_stay_off() {
        let region = region(RegionLimits::unlimited(), 0.0);
        let mut store = chain(1, 10.0);
        store.get_mut(0).mv_line_dist_km = 80.0;
        let plan = plan(&mut store, &region);
        assert!(plan.assignments.is_empty());
    }
}
