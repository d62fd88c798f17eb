//! Seeded synthetic country for demonstrations and tests.
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::config::const_funcs::{calc_grid_penalty, calc_wind_capacity_factor};
use crate::config::constants::{KM_PER_DEGREE_LAT, KM_PER_DEGREE_LON_EQUATOR};
use crate::config::simulation_config::{ExtensionMode, RegionLimits, ScenarioConfig};
use crate::core::pathfinder::RegionRasterState;
use crate::data::poi::Coordinate;
use crate::data::store::SettlementStore;
use crate::error::PlanResult;
use crate::models::raster::{GeoTransform, Raster};
use crate::models::settlement::{ProductiveDemand, Settlement};

const WIDTH_DEG: f64 = 1.0;
const HEIGHT_DEG: f64 = 0.6;
const LINE_Y: f64 = 0.3;
const LINE_X: (f64, f64) = (0.1, 0.9);
const HV_X: (f64, f64) = (0.4, 0.6);
const CELL_DEG: f64 = 0.01;
const REGION_NAMES: [&str; 3] = ["Ouest", "Sud", "Est"];

pub struct SyntheticCountry {
    pub store: SettlementStore,
    pub config: ScenarioConfig,
    /// One network state per configured region, for raster extension.
    pub rasters: Vec<Option<RegionRasterState>>,
}

fn region_of(x: f64) -> usize {
    ((x / WIDTH_DEG * 3.0).floor() as usize).min(2)
}

fn region_x(index: usize) -> (f64, f64) {
    let w = WIDTH_DEG / 3.0;
    (index as f64 * w, (index + 1) as f64 * w)
}

/// Distance (km) from `c` to a horizontal line segment at `LINE_Y`.
fn dist_to_segment_km(c: &Coordinate, x_range: (f64, f64)) -> f64 {
    let dx = if c.x < x_range.0 {
        x_range.0 - c.x
    } else if c.x > x_range.1 {
        c.x - x_range.1
    } else {
        0.0
    };
    let dy = c.y - LINE_Y;
    let ew = dx * KM_PER_DEGREE_LON_EQUATOR * c.y.to_radians().cos();
    let ns = dy * KM_PER_DEGREE_LAT;
    (ew * ew + ns * ns).sqrt()
}

fn settlement(rng: &mut StdRng, id: u64, town: bool) -> Settlement {
    let coordinate = if town {
        Coordinate::new(
            rng.gen_range(LINE_X.0..LINE_X.1),
            LINE_Y + rng.gen_range(-0.02..0.02),
        )
    } else {
        Coordinate::new(rng.gen_range(0.0..WIDTH_DEG), rng.gen_range(0.0..HEIGHT_DEG))
    };
    let pop = if town {
        rng.gen_range(5_000.0..40_000.0)
    } else {
        50.0 + rng.gen::<f64>().powi(3) * 4_000.0
    };
    let region = REGION_NAMES[region_of(coordinate.x)];
    let mut s = Settlement::new(id, coordinate, pop, region);

    let mv = dist_to_segment_km(&s.coordinate, LINE_X);
    s.mv_line_dist_km = mv;
    s.hv_line_dist_km = dist_to_segment_km(&s.coordinate, HV_X);
    s.dist_to_transformer_km = mv + rng.gen_range(0.0..3.0);
    s.night_lights = if mv < 5.0 && pop > 500.0 { rng.gen_range(0.5..10.0) } else { rng.gen_range(0.0..0.3) };
    s.cell_area_km2 = 1.0;

    let center = Coordinate::new(WIDTH_DEG / 2.0, LINE_Y);
    let dx = (s.coordinate.x - center.x) * KM_PER_DEGREE_LON_EQUATOR;
    let dy = (s.coordinate.y - center.y) * KM_PER_DEGREE_LAT;
    s.travel_hours = (dx * dx + dy * dy).sqrt() / 40.0;

    s.ghi = rng.gen_range(1_800.0..2_300.0);
    s.wind_cf = calc_wind_capacity_factor(rng.gen_range(3.0..8.0));
    if rng.gen_bool(0.05) {
        s.hydro_potential_kw = rng.gen_range(50.0..1_000.0);
        s.hydro_dist_km = rng.gen_range(1.0..10.0);
    }
    s.grid_penalty = calc_grid_penalty(
        Some(rng.gen_range(0.0..30.0)),
        Some(rng.gen_range(0.0..15.0)),
        Some(rng.gen_range(0.0..25.0)),
        Some(rng.gen_range(100.0..1_500.0)),
    );
    if rng.gen_bool(0.1) {
        s.productive = ProductiveDemand {
            health: rng.gen_range(0.0..5_000.0),
            education: rng.gen_range(0.0..3_000.0),
            agriculture: rng.gen_range(0.0..10_000.0),
            commercial: rng.gen_range(0.0..8_000.0),
            heavy_industry: 0.0,
        };
    }
    s.is_urban = town;
    s
}

fn country_transform() -> GeoTransform {
    GeoTransform {
        ncols: (WIDTH_DEG / CELL_DEG).round() as usize,
        nrows: (HEIGHT_DEG / CELL_DEG).round() as usize,
        xll: 0.0,
        yll: 0.0,
        cell_size: CELL_DEG,
    }
}

/// Shared traversal cost: rough terrain everywhere, a lake nothing crosses
/// and a ridge that is expensive to cross.
fn cost_raster(rng: &mut StdRng) -> Raster<f64> {
    let t = country_transform();
    let mut cost = Raster::filled(t, 1.0);
    for row in 0..t.nrows {
        for col in 0..t.ncols {
            let c = t.cell_center(row, col);
            let mut w = rng.gen_range(0.8..1.4);
            if (c.x - 0.25).powi(2) + (c.y - 0.45).powi(2) < 0.06f64.powi(2) {
                w = f64::NAN;
            } else if (c.x - 0.75).abs() < 0.02 && c.y < 0.25 {
                w = 5.0;
            }
            cost.set(row, col, w);
        }
    }
    cost
}

fn origins_raster(region: usize) -> Raster<u8> {
    let t = country_transform();
    let mut origins = Raster::filled(t, 0u8);
    let (x0, x1) = region_x(region);
    for col in 0..t.ncols {
        let c = t.cell_center(0, col);
        if c.x >= LINE_X.0.max(x0) && c.x <= LINE_X.1.min(x1) {
            if let Some((row, col)) = t.cell_of(&Coordinate::new(c.x, LINE_Y)) {
                origins.set(row, col, 1);
            }
        }
    }
    origins
}

impl SyntheticCountry {
    /// A three-region country of `villages` rural settlements and a few
    /// towns along the national line. The same seed always yields the same
    /// country.
    pub fn generate(seed: u64, villages: usize, raster_mode: bool) -> PlanResult<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        let towns = (villages / 40).max(3);
        let settlements: Vec<Settlement> = (0..towns + villages)
            .map(|i| settlement(&mut rng, i as u64 + 1, i < towns))
            .collect();
        let total_pop: f64 = settlements.iter().map(|s| s.pop).sum();
        let urban_pop: f64 = settlements.iter().filter(|s| s.is_urban).map(|s| s.pop).sum();
        let store = SettlementStore::new(settlements)?;

        let mut config = ScenarioConfig::default();
        let template = config.regions[0].clone();
        config.regions = REGION_NAMES
            .iter()
            .map(|name| {
                let mut region = template.clone();
                region.name = name.to_string();
                region
            })
            .collect();
        config.calibration.start_year_pop = total_pop;
        config.calibration.urban_ratio_start = urban_pop / total_pop.max(1.0);
        config.projection.end_year_pop = total_pop * 1.3;
        config.projection.urban_ratio_end = (config.calibration.urban_ratio_start + 0.05).min(1.0);
        // The eastern utility can only afford slow growth
        config.regions[2].default_limits = RegionLimits {
            annual_new_connections: 400.0,
            annual_capacity_kw: 2_000.0,
        };
        config.regions[0].auto_intensification_km = 2.0;

        let rasters = if raster_mode {
            let cost = cost_raster(&mut rng);
            let states = (0..REGION_NAMES.len())
                .map(|i| RegionRasterState::new(origins_raster(i), cost.clone()).map(Some))
                .collect::<PlanResult<Vec<_>>>()?;
            // Marks the mode; the states themselves are passed in memory
            config.extension = ExtensionMode::Raster { regions: Vec::new() };
            states
        } else {
            vec![None; REGION_NAMES.len()]
        };

        info!(
            "Generated synthetic country: {} settlements, {:.0} people, raster mode {}",
            store.len(),
            total_pop,
            raster_mode
        );
        Ok(Self { store, config, rasters })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_country() {
        let a = SyntheticCountry::generate(7, 60, false).unwrap();
        let b = SyntheticCountry::generate(7, 60, false).unwrap();
        assert_eq!(a.store.settlements(), b.store.settlements());
        let c = SyntheticCountry::generate(8, 60, false).unwrap();
        assert_ne!(a.store.settlements(), c.store.settlements());
    }

    #[test]
    fn every_region_is_populated_and_config_is_valid() {
        let country = SyntheticCountry::generate(1, 120, true).unwrap();
        country.config.validate().unwrap();
        for name in REGION_NAMES {
            assert!(!country.store.region_members(name).is_empty(), "{} is empty", name);
        }
        assert_eq!(country.rasters.len(), 3);
        for state in country.rasters.iter().flatten() {
            assert!(state.network_cells() > 0);
        }
    }
}
