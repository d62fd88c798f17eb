// Sentinels
pub const INFEASIBLE_LCOE: f64 = 99.0;              // USD/kWh, "cannot be computed"
pub const UNELECTRIFIED_CODE: u8 = 99;

// Physical constants
pub const HOURS_PER_YEAR: f64 = 8760.0;
pub const LHV_DIESEL: f64 = 9.9445485;              // kWh per litre
pub const KM_PER_DEGREE_LAT: f64 = 110.574;
pub const KM_PER_DEGREE_LON_EQUATOR: f64 = 111.320;

// Household electricity tiers (kWh/household/year)
pub const TIER_1_KWH: f64 = 38.7;                   // mean of Tier 1 and Tier 2 lower bounds
pub const TIER_2_KWH: f64 = 219.0;
pub const TIER_3_KWH: f64 = 803.0;
pub const TIER_4_KWH: f64 = 2117.0;
pub const TIER_5_KWH: f64 = 2993.0;

// Distribution network defaults
pub const HV_LINE_COST: f64 = 53_000.0;             // USD/km
pub const MV_LINE_COST: f64 = 7_000.0;              // USD/km
pub const LV_LINE_COST: f64 = 4_250.0;              // USD/km
pub const SERVICE_TRANSFORMER_COST: f64 = 4_250.0;  // USD per unit
pub const MV_LINE_CAPACITY_KW: f64 = 10_000.0;
pub const LV_LINE_CAPACITY_KW: f64 = 50.0;
pub const MV_LINE_MAX_LENGTH_KM: f64 = 50.0;
pub const EXISTING_GRID_COST_RATIO: f64 = 0.1;      // MV cost increase per extension loop
pub const LV_LENGTH_FACTOR: f64 = 1.333;

// Grid extension
pub const DEFAULT_MAX_EXTENSION_KM: f64 = 50.0;
pub const MAX_PATHFINDER_ITERATIONS: usize = 5;
pub const MAX_DISTANCE_BISECTION_STEPS: usize = 40;

// Calibration search
pub const CALIBRATION_MAX_ITERATIONS: usize = 60;
pub const CALIBRATION_TOLERANCE: f64 = 0.01;
pub const CALIBRATION_STEP: f64 = 1.1;

// Wind turbine power curve (m/s)
pub const WIND_CUT_IN: f64 = 3.0;
pub const WIND_RATED: f64 = 12.0;
pub const WIND_CUT_OUT: f64 = 25.0;

// Grid penalty class weights are uniform; only the breakpoints differ
pub const ROAD_DIST_CLASSES_KM: [f64; 4] = [5.0, 10.0, 25.0, 50.0];
pub const SUBSTATION_DIST_CLASSES_KM: [f64; 4] = [0.5, 1.0, 5.0, 10.0];
pub const SLOPE_CLASSES_DEG: [f64; 4] = [10.0, 20.0, 30.0, 40.0];
pub const ELEVATION_CLASSES_M: [f64; 4] = [500.0, 1000.0, 2000.0, 3000.0];
