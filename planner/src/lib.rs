// Main module declarations for the electrification planner

pub mod error;

// Core planning modules
pub mod core {
    pub mod scenario;
    pub mod grid_extension;
    pub mod pathfinder;
    pub mod limitations;
}

// Configuration modules
pub mod config {
    pub mod constants;
    pub mod const_funcs;
    pub mod simulation_config;
    pub mod tech_type;
}

// Model definitions
pub mod models {
    pub mod settlement;
    pub mod technology;
    pub mod grid_region;
    pub mod raster;
}

// Settlement table, its preparation steps and loaders
pub mod data {
    pub mod poi;
    pub mod store;
    pub mod settlements_loader;
    pub mod calibration;
    pub mod projection;
    pub mod demand;
    pub mod raster_io;
    pub mod synthetic;
}

// Analysis and reporting
pub mod analysis {
    pub mod metrics;
    pub mod reporting;
}

// Utility functions
pub mod utils {
    pub mod spatial_index;
    pub mod logging;
    pub mod csv_export;
}

// CLI interface
pub mod cli {
    pub mod cli;
}

// Re-export commonly used items
pub use crate::core::scenario::{run_scenario, ScenarioOutcome};
pub use crate::config::simulation_config::ScenarioConfig;
pub use crate::data::store::SettlementStore;
pub use crate::error::{PlanError, PlanResult};
pub use crate::models::technology::Technology;
