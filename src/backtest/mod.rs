pub mod metrics;
pub mod runner;
pub mod synthetic;

pub use metrics::{LocationBreakdown, ResultAggregator, Summary};
pub use runner::{BacktestOrchestrator, BacktestOutcome, Progress, ProgressSink};
pub use synthetic::{Lcg, SyntheticBatch, SyntheticSweepGenerator};
