use chrono::NaiveDate;
use thiserror::Error;

/// Malformed backtest parameters. Never retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("ticker: must not be empty")]
    EmptyTicker,

    #[error("trade_locations: at least one trade location is required")]
    NoTradeLocations,

    #[error("hold_period: {0} is outside the allowed range of 1-30 days")]
    HoldPeriodOutOfRange(u32),

    #[error("start_date: {start} is after end_date {end}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },

    #[error("trade_locations: unknown trade location '{0}'")]
    UnknownTradeLocation(String),
}

/// Failure of the external market-data provider
#[derive(Error, Debug)]
pub enum DataAcquisitionError {
    /// No live provider is configured
    #[error("no live market-data source configured")]
    Unavailable,

    /// Built through `network`, which drops the request URL
    #[error("network error: {0}")]
    Network(reqwest::Error),

    #[error("market data API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("rate limited by market data API after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("failed to decode market data response: {0}")]
    Decode(String),

    #[error("market data request timed out after {0}s")]
    Timeout(u64),
}

impl DataAcquisitionError {
    /// Wrap a transport error without its URL
    pub fn network(e: reqwest::Error) -> Self {
        DataAcquisitionError::Network(e.without_url())
    }
}

/// Everything a backtest run can report to its caller
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("invalid parameters: {0}")]
    Validation(#[from] ValidationError),

    #[error("data acquisition failed: {0}")]
    DataAcquisition(#[from] DataAcquisitionError),

    /// An upstream contract was broken; not recoverable
    #[error("computation error: {0}")]
    Computation(String),
}
