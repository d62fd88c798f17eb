use thiserror::Error;

/// Errors that abort a planning run.
///
/// Per-settlement infeasibility is never an error: it is carried as the
/// [`INFEASIBLE_LCOE`](crate::config::constants::INFEASIBLE_LCOE) sentinel and
/// simply loses the least-cost comparison. Budget exhaustion and calibration
/// non-convergence are reported through results, not through this type.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(String),

    #[error("invalid value '{value}' in column '{column}' (row {row})")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("raster error: {0}")]
    Raster(String),

    /// The scenario is inconsistent (timeline, technology parameters,
    /// regions). Must be fixed before retrying.
    #[error("configuration error: {0}")]
    Config(String),
}

pub type PlanResult<T> = Result<T, PlanError>;
