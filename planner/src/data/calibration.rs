//! Start-year calibration of population, urban share and electrification.
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::constants::{CALIBRATION_MAX_ITERATIONS, CALIBRATION_STEP, CALIBRATION_TOLERANCE};
use crate::config::simulation_config::{CalibrationConfig, ElectrificationThresholds};
use crate::data::store::SettlementStore;
use crate::models::settlement::Settlement;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub pop_modelled: f64,
    pub urban_ratio_modelled: f64,
    pub elec_rate: f64,
    pub urban_elec_rate: f64,
    pub rural_elec_rate: f64,
    pub iterations: usize,
    pub converged: bool,
    pub thresholds: ElectrificationThresholds,
}

fn is_electrified(s: &Settlement, t: &ElectrificationThresholds) -> bool {
    s.night_lights > t.min_night_lights
        && s.pop_start > t.min_pop
        && (s.dist_to_transformer_km < t.max_transformer_dist
            || s.mv_line_dist_km < t.max_mv_dist
            || s.hv_line_dist_km < t.max_hv_dist)
}

fn relax(t: &ElectrificationThresholds) -> ElectrificationThresholds {
    ElectrificationThresholds {
        min_night_lights: t.min_night_lights / CALIBRATION_STEP,
        min_pop: t.min_pop / CALIBRATION_STEP,
        max_transformer_dist: t.max_transformer_dist * CALIBRATION_STEP,
        max_mv_dist: t.max_mv_dist * CALIBRATION_STEP,
        max_hv_dist: t.max_hv_dist * CALIBRATION_STEP,
    }
}

fn tighten(t: &ElectrificationThresholds) -> ElectrificationThresholds {
    ElectrificationThresholds {
        min_night_lights: t.min_night_lights * CALIBRATION_STEP,
        min_pop: (t.min_pop * CALIBRATION_STEP).max(1.0),
        max_transformer_dist: t.max_transformer_dist / CALIBRATION_STEP,
        max_mv_dist: t.max_mv_dist / CALIBRATION_STEP,
        max_hv_dist: t.max_hv_dist / CALIBRATION_STEP,
    }
}

/// Scales the electrified population of `members` so that it reaches
/// `target_rate` of their total population, capped per settlement.
fn scale_elec_pop(settlements: &mut [Settlement], members: &[usize], target_rate: f64) {
    let total: f64 = members.iter().map(|&i| settlements[i].pop_start).sum();
    let electrified: f64 = members
        .iter()
        .filter(|&&i| settlements[i].elec_start)
        .map(|&i| settlements[i].pop_start)
        .sum();
    if electrified <= 0.0 {
        return;
    }
    let ratio = target_rate.max(0.0) * total / electrified;
    for &i in members {
        let s = &mut settlements[i];
        if s.elec_start {
            s.elec_pop_calib = (s.pop_start * ratio).min(s.pop_start);
        }
    }
}

impl SettlementStore {
    /// Scales raw population to the start-year statistic and marks the
    /// densest settlements urban until the urban ratio is reached.
    /// Returns the modelled population and urban ratio.
    pub fn calibrate_current_pop_and_urban(&mut self, start_year_pop: f64, urban_ratio: f64) -> (f64, f64) {
        let raw_total: f64 = self.settlements().iter().map(|s| s.pop).sum();
        let factor = if raw_total > 0.0 { start_year_pop / raw_total } else { 1.0 };

        let settlements = self.settlements_mut();
        for s in settlements.iter_mut() {
            s.pop_start = s.pop * factor;
            s.is_urban = false;
        }
        let total: f64 = settlements.iter().map(|s| s.pop_start).sum();

        let mut order: Vec<usize> = (0..settlements.len()).collect();
        let density = |s: &Settlement| s.pop_start / s.cell_area_km2.max(f64::MIN_POSITIVE);
        order.sort_by(|&a, &b| {
            density(&settlements[b])
                .total_cmp(&density(&settlements[a]))
                .then(settlements[a].id.cmp(&settlements[b].id))
        });

        let urban_target = urban_ratio.clamp(0.0, 1.0) * total;
        let mut urban_pop = 0.0;
        for i in order {
            if urban_pop >= urban_target {
                break;
            }
            settlements[i].is_urban = true;
            urban_pop += settlements[i].pop_start;
        }

        let urban_modelled = if total > 0.0 { urban_pop / total } else { 0.0 };
        info!(
            "Calibrated population {:.0} (factor {:.4}), urban ratio {:.3}",
            total, factor, urban_modelled
        );
        (total, urban_modelled)
    }

    /// Searches electrification thresholds that match the national rate,
    /// then scales electrified population to the urban and rural rates.
    pub fn calibrate_electrification(&mut self, config: &CalibrationConfig) -> CalibrationReport {
        let total: f64 = self.settlements().iter().map(|s| s.pop_start).sum();
        let rate_for = |settlements: &[Settlement], t: &ElectrificationThresholds| {
            if total <= 0.0 {
                return 0.0;
            }
            settlements
                .iter()
                .filter(|s| is_electrified(s, t))
                .map(|s| s.pop_start)
                .sum::<f64>()
                / total
        };

        let mut thresholds = config.thresholds;
        let mut best = (f64::INFINITY, thresholds);
        let mut iterations = 0;
        let mut converged = false;

        while iterations < CALIBRATION_MAX_ITERATIONS {
            iterations += 1;
            let rate = rate_for(self.settlements(), &thresholds);
            let error = rate - config.elec_rate;
            debug!("Calibration iteration {}: modelled rate {:.4}", iterations, rate);

            if error.abs() < best.0 {
                best = (error.abs(), thresholds);
            }
            if error.abs() <= CALIBRATION_TOLERANCE {
                converged = true;
                break;
            }
            thresholds = if error < 0.0 { relax(&thresholds) } else { tighten(&thresholds) };
        }

        let thresholds = best.1;
        if !converged {
            warn!(
                "Electrification calibration did not converge after {} iterations (off by {:.4})",
                iterations, best.0
            );
        }

        let settlements = self.settlements_mut();
        for s in settlements.iter_mut() {
            s.elec_start = is_electrified(s, &thresholds);
            s.elec_pop_calib = if s.elec_start { s.pop_start } else { 0.0 };
        }

        let urban: Vec<usize> = (0..settlements.len()).filter(|&i| settlements[i].is_urban).collect();
        let rural: Vec<usize> = (0..settlements.len()).filter(|&i| !settlements[i].is_urban).collect();
        scale_elec_pop(settlements, &urban, config.urban_elec_rate);
        scale_elec_pop(settlements, &rural, config.rural_elec_rate);

        let share = |members: &[usize]| {
            let pop: f64 = members.iter().map(|&i| settlements[i].pop_start).sum();
            let elec: f64 = members.iter().map(|&i| settlements[i].elec_pop_calib).sum();
            if pop > 0.0 { elec / pop } else { 0.0 }
        };
        let all: Vec<usize> = (0..settlements.len()).collect();
        let urban_pop: f64 = urban.iter().map(|&i| settlements[i].pop_start).sum();

        CalibrationReport {
            pop_modelled: total,
            urban_ratio_modelled: if total > 0.0 { urban_pop / total } else { 0.0 },
            elec_rate: share(&all),
            urban_elec_rate: share(&urban),
            rural_elec_rate: share(&rural),
            iterations,
            converged,
            thresholds,
        }
    }

    /// Full start-year calibration.
    pub fn calibrate(&mut self, config: &CalibrationConfig) -> CalibrationReport {
        self.calibrate_current_pop_and_urban(config.start_year_pop, config.urban_ratio_start);
        let report = self.calibrate_electrification(config);
        self.mark_calibrated();

        info!(
            "Calibrated electrification: national {:.3}, urban {:.3}, rural {:.3}",
            report.elec_rate, report.urban_elec_rate, report.rural_elec_rate
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::poi::Coordinate;
    use approx::assert_relative_eq;

    fn store() -> SettlementStore {
        let settlements = (0..10)
            .map(|i| {
                let mut s = Settlement::new(i, Coordinate::new(i as f64 * 0.01, 0.0), 100.0 * (i + 1) as f64, "Est");
                s.night_lights = 1.0;
                s.mv_line_dist_km = i as f64;
                s
            })
            .collect();
        SettlementStore::new(settlements).unwrap()
    }

    #[test]
    fn population_matches_statistic_and_densest_are_urban() {
        let mut store = store();
        let (pop, urban) = store.calibrate_current_pop_and_urban(11_000.0, 0.3);
        assert_relative_eq!(pop, 11_000.0, epsilon = 1e-6);
        assert!(urban >= 0.3);
        // The largest settlement (equal areas) is the first urban one
        assert!(store.get(9).is_urban);
        assert!(!store.get(0).is_urban);
    }

    #[test]
    fn electrification_reaches_targets_and_caps_pop() {
        let mut store = store();
        let config = CalibrationConfig {
            start_year_pop: 5500.0,
            urban_ratio_start: 0.5,
            elec_rate: 0.5,
            urban_elec_rate: 0.8,
            rural_elec_rate: 0.2,
            thresholds: ElectrificationThresholds {
                min_night_lights: 0.0,
                min_pop: 50.0,
                max_transformer_dist: 0.0,
                max_mv_dist: 2.0,
                max_hv_dist: 0.0,
            },
        };
        let report = store.calibrate(&config);
        assert!(store.is_calibrated());
        assert!(report.iterations >= 1);
        assert!(report.elec_rate > 0.0);
        for s in store.settlements() {
            assert!(s.elec_pop_calib <= s.pop_start + 1e-9);
            if !s.elec_start {
                assert_eq!(s.elec_pop_calib, 0.0);
            }
        }
    }

    #[test]
    fn unreachable_target_reports_non_convergence() {
        let mut store = store();
        let mut config = CalibrationConfig::default();
        config.start_year_pop = 5500.0;
        config.elec_rate = 0.5;
        // No settlement has night lights above this
        config.thresholds.min_night_lights = 1e9;
        let report = store.calibrate(&config);
        assert!(!report.converged);
        assert_eq!(report.iterations, CALIBRATION_MAX_ITERATIONS);
    }
}
