//! Rationing of new electrification against the yearly target rate.
use std::cmp::Ordering;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::constants::UNELECTRIFIED_CODE;
use crate::config::simulation_config::TimeStep;
use crate::config::tech_type::TechKind;
use crate::data::store::SettlementStore;
use crate::models::settlement::SettlementYearRecord;
use crate::utils::logging::{self, OperationCategory, PlanningStage};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RationingReport {
    /// Population allowed to be electrified (people).
    pub cap: f64,
    pub existing_pop: f64,
    pub electrified_pop: f64,
    pub kept: usize,
    pub de_electrified: usize,
}

/// LCOE of the technology a settlement ended up with.
pub fn final_lcoe(record: &SettlementYearRecord) -> f64 {
    match record.final_tech() {
        Some(TechKind::Grid) => record.grid_lcoe,
        Some(tech) => record.lcoe.get(&tech).map(|r| r.lcoe).unwrap_or(record.minimum_overall_lcoe),
        None => record.minimum_overall_lcoe,
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    index: usize,
    forced: bool,
    lcoe: f64,
    elec_order: u32,
    id: u64,
    pop: f64,
}

fn priority(a: &Candidate, b: &Candidate) -> Ordering {
    b.forced
        .cmp(&a.forced)
        .then(a.lcoe.total_cmp(&b.lcoe))
        .then(a.elec_order.cmp(&b.elec_order))
        .then(a.id.cmp(&b.id))
}

/// Keeps the newly electrified settlements of `step` in priority order while
/// the electrified population stays within `elec_target × total population`.
/// The first settlement that does not fit and every later one are returned
/// to unelectrified. Never electrifies anything.
pub fn apply_limitations(store: &mut SettlementStore, step: &TimeStep) -> RationingReport {
    let _timing = logging::start_timing(
        "apply_limitations",
        OperationCategory::Planning { subcategory: PlanningStage::Rationing },
    );
    let total_pop: f64 = store
        .settlements()
        .iter()
        .filter_map(|s| s.record(step.year).map(|r| r.pop))
        .sum();
    let cap = step.elec_target * total_pop;

    let mut existing_pop = 0.0;
    let mut candidates = Vec::new();
    for (index, s) in store.settlements().iter().enumerate() {
        let Some(record) = s.record(step.year) else { continue };
        if !record.is_electrified() {
            continue;
        }
        if s.was_electrified_before(step.year) {
            existing_pop += record.pop;
        } else {
            candidates.push(Candidate {
                index,
                forced: record.forced,
                lcoe: final_lcoe(record),
                elec_order: record.elec_order,
                id: s.id,
                pop: record.pop,
            });
        }
    }
    if existing_pop > cap {
        warn!(
            "{}: existing electrification ({:.0}) already exceeds the target cap ({:.0})",
            step.year, existing_pop, cap
        );
    }

    candidates.sort_by(priority);
    let mut electrified_pop = existing_pop;
    let mut kept = 0;
    let mut overflow = false;
    let mut de_electrified = Vec::new();
    for c in &candidates {
        if !overflow && electrified_pop + c.pop <= cap {
            electrified_pop += c.pop;
            kept += 1;
        } else {
            overflow = true;
            de_electrified.push(c.index);
        }
    }

    for &index in &de_electrified {
        if let Some(record) = store.get_mut(index).years.get_mut(&step.year) {
            record.final_code = UNELECTRIFIED_CODE;
        }
    }

    debug!(
        "{}: kept {} new settlements, de-electrified {} (cap {:.0}, electrified {:.0})",
        step.year,
        kept,
        de_electrified.len(),
        cap,
        electrified_pop
    );
    RationingReport {
        cap,
        existing_pop,
        electrified_pop,
        kept,
        de_electrified: de_electrified.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::poi::Coordinate;
    use crate::models::settlement::Settlement;

    fn step(elec_target: f64) -> TimeStep {
        TimeStep { year: 2025, time_step: 5, elec_target, is_first: true }
    }

    fn settlement(id: u64, pop: f64, code: u8, grid_lcoe: f64) -> Settlement {
        let mut s = Settlement::new(id, Coordinate::new(id as f64 * 0.01, 0.0), pop, "Est");
        let mut record = SettlementYearRecord::new(pop, 5.0, pop, pop * 100.0);
        record.final_code = code;
        record.grid_lcoe = grid_lcoe;
        s.years.insert(2025, record);
        s
    }

    #[test]
    fn cheapest_settlements_are_kept_first() {
        let grid = TechKind::Grid.code();
        let settlements = vec![
            settlement(1, 100.0, grid, 0.30),
            settlement(2, 100.0, grid, 0.10),
            settlement(3, 100.0, grid, 0.20),
            settlement(4, 100.0, UNELECTRIFIED_CODE, 0.05),
        ];
        let mut store = SettlementStore::new(settlements).unwrap();
        let report = apply_limitations(&mut store, &step(0.5));
        assert_eq!(report.cap, 200.0);
        assert_eq!(report.kept, 2);
        assert_eq!(report.de_electrified, 1);
        assert_eq!(store.get(0).record(2025).unwrap().final_code, UNELECTRIFIED_CODE);
        assert!(store.get(1).record(2025).unwrap().is_electrified());
        assert!(store.get(2).record(2025).unwrap().is_electrified());
    }

    #[test]
    fn forced_settlements_win_and_prefix_is_strict() {
        let grid = TechKind::Grid.code();
        let mut big = settlement(1, 300.0, grid, 0.01);
        big.years.get_mut(&2025).unwrap().elec_order = 1;
        let mut forced = settlement(2, 100.0, grid, 0.50);
        forced.years.get_mut(&2025).unwrap().forced = true;
        let small = settlement(3, 50.0, grid, 0.40);
        let idle = settlement(4, 550.0, UNELECTRIFIED_CODE, 99.0);
        let mut store = SettlementStore::new(vec![big, forced, small, idle]).unwrap();

        // Cap 300: forced (100) fits, the big one overflows, the small one
        // would fit but follows the overflow
        let report = apply_limitations(&mut store, &step(0.3));
        assert_eq!(report.kept, 1);
        assert!(store.get(1).record(2025).unwrap().is_electrified());
        assert!(!store.get(0).record(2025).unwrap().is_electrified());
        assert!(!store.get(2).record(2025).unwrap().is_electrified());
    }

    #[test]
    fn existing_electrification_counts_first_and_is_never_removed() {
        let grid = TechKind::Grid.code();
        let mut old = settlement(1, 500.0, grid, 0.2);
        old.elec_start = true;
        let new = settlement(2, 500.0, grid, 0.1);
        let mut store = SettlementStore::new(vec![old, new]).unwrap();
        let report = apply_limitations(&mut store, &step(0.4));
        assert_eq!(report.existing_pop, 500.0);
        assert!(store.get(0).record(2025).unwrap().is_electrified());
        assert!(!store.get(1).record(2025).unwrap().is_electrified());
    }

    #[test]
    fn full_target_keeps_everything() {
        let grid = TechKind::Grid.code();
        let settlements = (1..=4).map(|id| settlement(id, 10.0, grid, 0.1)).collect();
        let mut store = SettlementStore::new(settlements).unwrap();
        let report = apply_limitations(&mut store, &step(1.0));
        assert_eq!(report.de_electrified, 0);
        assert_eq!(report.electrified_pop, 40.0);
    }
}
