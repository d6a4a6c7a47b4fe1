// Core modules
pub mod api;
pub mod backtest;
pub mod config;
pub mod error;
pub mod models;
pub mod sweep;

// Re-export commonly used types
pub use api::SweepDataSource;
pub use backtest::{BacktestOrchestrator, BacktestOutcome, ResultAggregator, Summary};
pub use config::{DataPolicy, Settings};
pub use error::{BacktestError, DataAcquisitionError, ValidationError};
pub use models::*;

// Error handling
pub type Result<T, E = BacktestError> = std::result::Result<T, E>;
