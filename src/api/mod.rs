pub mod market_data;

pub use market_data::{DailyBar, MarketDataClient, RawSweep};

use crate::error::DataAcquisitionError;
use crate::models::{PricedSweep, TestParameters};
use async_trait::async_trait;

/// Source of live sweeps with their realized entry/exit prices.
///
/// Implementations own their retry policy; the backtest engine treats any
/// error as "live data unavailable".
#[async_trait]
pub trait SweepDataSource: Send + Sync {
    async fn fetch_sweeps_and_prices(
        &self,
        params: &TestParameters,
    ) -> Result<Vec<PricedSweep>, DataAcquisitionError>;

    /// Provider name, for logs
    fn name(&self) -> &str;
}
