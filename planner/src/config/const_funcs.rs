use crate::config::constants::*;

/// Fuel cost per delivered kWh for a diesel generator, including the cost of
/// trucking the fuel there and back (`travel_hours` one way).
pub fn calc_diesel_fuel_cost(
    diesel_price: f64,
    efficiency: f64,
    truck_consumption: f64,
    truck_volume: f64,
    travel_hours: f64,
) -> f64 {
    if efficiency <= 0.0 || truck_volume <= 0.0 {
        return f64::INFINITY;
    }
    let travel_hours = travel_hours.max(0.0);
    let delivered_price =
        diesel_price + 2.0 * diesel_price * truck_consumption * travel_hours / truck_volume;
    delivered_price / LHV_DIESEL / efficiency
}

/// PV capacity factor from global horizontal irradiation (kWh/m²/year).
pub fn calc_pv_capacity_factor(ghi: f64) -> f64 {
    (ghi / HOURS_PER_YEAR).max(0.0)
}

fn turbine_output(velocity: f64) -> f64 {
    if velocity < WIND_CUT_IN || velocity > WIND_CUT_OUT {
        0.0
    } else if velocity >= WIND_RATED {
        1.0
    } else {
        (velocity.powi(3) - WIND_CUT_IN.powi(3)) / (WIND_RATED.powi(3) - WIND_CUT_IN.powi(3))
    }
}

/// Wind capacity factor for a site with the given mean wind speed, assuming
/// Rayleigh-distributed velocities and a generic turbine power curve.
pub fn calc_wind_capacity_factor(mean_velocity: f64) -> f64 {
    if mean_velocity <= 0.0 {
        return 0.0;
    }
    // Rayleigh scale parameter from the mean
    let sigma = mean_velocity / (std::f64::consts::PI / 2.0).sqrt();
    let step = 0.1;
    let mut cf = 0.0;
    let mut v = step / 2.0;
    while v < WIND_CUT_OUT + 1.0 {
        let pdf = v / (sigma * sigma) * (-(v * v) / (2.0 * sigma * sigma)).exp();
        cf += turbine_output(v) * pdf * step;
        v += step;
    }
    cf.clamp(0.0, 1.0)
}

/// 1..=5 class of a value against four ascending breakpoints (higher is harder).
fn classify(value: f64, breakpoints: &[f64; 4]) -> f64 {
    let above = breakpoints.iter().filter(|b| value > **b).count();
    (above + 1) as f64
}

/// Multiplier on grid extension line cost reflecting terrain and access.
///
/// Missing inputs are scored as the easiest class.
pub fn calc_grid_penalty(
    road_dist_km: Option<f64>,
    substation_dist_km: Option<f64>,
    slope_deg: Option<f64>,
    elevation_m: Option<f64>,
) -> f64 {
    if road_dist_km.is_none() && substation_dist_km.is_none() && slope_deg.is_none() && elevation_m.is_none() {
        return 1.0;
    }
    let c = classify(road_dist_km.unwrap_or(0.0), &ROAD_DIST_CLASSES_KM)
        + classify(substation_dist_km.unwrap_or(0.0), &SUBSTATION_DIST_CLASSES_KM)
        + classify(slope_deg.unwrap_or(0.0), &SLOPE_CLASSES_DEG)
        + classify(elevation_m.unwrap_or(0.0), &ELEVATION_CLASSES_M);
    1.0 + ((0.85 * c.log10()).exp() - 1.0) / 100.0
}

/// Discount factor `(1 + r)^t`.
pub fn discount_factor(discount_rate: f64, years: u32) -> f64 {
    (1.0 + discount_rate).powi(years as i32)
}

/// Compound annual growth rate taking `from` to `to` over `years`.
pub fn calc_annual_growth_rate(from: f64, to: f64, years: u32) -> f64 {
    if from <= 0.0 || to <= 0.0 || years == 0 {
        return 0.0;
    }
    (to / from).powf(1.0 / years as f64) - 1.0
}
