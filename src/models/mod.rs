use crate::error::ValidationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Longest hold period a backtest accepts, in days
pub const MAX_HOLD_PERIOD: u32 = 30;

/// Price tolerance used when placing a print against its quote (one cent)
const QUOTE_TOLERANCE: f64 = 0.01;

/// Where a sweep's price fell relative to the quoted spread.
///
/// Variants are declared from most-sold to most-bought, so the derived
/// `Ord` follows the same left-to-right order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TradeLocation {
    BelowBid,
    AtBid,
    Midpoint,
    AtAsk,
    AboveAsk,
}

impl TradeLocation {
    pub const ALL: [TradeLocation; 5] = [
        TradeLocation::BelowBid,
        TradeLocation::AtBid,
        TradeLocation::Midpoint,
        TradeLocation::AtAsk,
        TradeLocation::AboveAsk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeLocation::BelowBid => "below-bid",
            TradeLocation::AtBid => "at-bid",
            TradeLocation::Midpoint => "midpoint",
            TradeLocation::AtAsk => "at-ask",
            TradeLocation::AboveAsk => "above-ask",
        }
    }

    /// Place a traded price against its bid/ask quote.
    ///
    /// Returns `None` for a crossed or non-positive quote. Touching the ask
    /// is checked before touching the bid, so a locked market reads as `AtAsk`.
    pub fn from_quote(price: f64, bid: f64, ask: f64) -> Option<Self> {
        if !(price.is_finite() && bid.is_finite() && ask.is_finite()) {
            return None;
        }
        if bid <= 0.0 || ask <= 0.0 || bid > ask {
            return None;
        }

        let location = if price < bid - QUOTE_TOLERANCE {
            TradeLocation::BelowBid
        } else if price > ask + QUOTE_TOLERANCE {
            TradeLocation::AboveAsk
        } else if (price - ask).abs() <= QUOTE_TOLERANCE {
            TradeLocation::AtAsk
        } else if (price - bid).abs() <= QUOTE_TOLERANCE {
            TradeLocation::AtBid
        } else {
            TradeLocation::Midpoint
        };

        Some(location)
    }
}

impl fmt::Display for TradeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeLocation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        TradeLocation::ALL
            .into_iter()
            .find(|loc| loc.as_str() == needle)
            .ok_or_else(|| ValidationError::UnknownTradeLocation(s.to_string()))
    }
}

/// Option contract kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => f.write_str("call"),
            OptionType::Put => f.write_str("put"),
        }
    }
}

/// Directional bias implied by a trade location
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InferredSide {
    Buy,
    Sell,
    Neutral,
}

impl fmt::Display for InferredSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InferredSide::Buy => f.write_str("buy"),
            InferredSide::Sell => f.write_str("sell"),
            InferredSide::Neutral => f.write_str("neutral"),
        }
    }
}

/// Data source identifier
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Live,
    Synthetic,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Live => f.write_str("live"),
            DataSource::Synthetic => f.write_str("synthetic"),
        }
    }
}

/// One raw sweep print
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepObservation {
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub option_type: OptionType,
    pub volume: u64,
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
    pub trade_location: TradeLocation,
}

/// A sweep together with the realized underlying prices around it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricedSweep {
    pub observation: SweepObservation,
    pub entry_price: f64,
    pub exit_price: f64,
    pub exit_date: NaiveDate,
}

/// A scored sweep: the unit the aggregator works on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluatedResult {
    pub id: String,
    pub ticker: String,
    pub trade_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub option_type: OptionType,
    pub trade_location: TradeLocation,
    pub inferred_side: InferredSide,
    pub hold_days: u32,
    pub entry_price: f64,
    pub exit_price: f64,
    pub percent_change: f64,
    pub is_win: bool,
    pub data_source: DataSource,
}

/// Inputs of one backtest run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestParameters {
    pub ticker: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub hold_period: u32,
    pub trade_locations: BTreeSet<TradeLocation>,
}

impl TestParameters {
    /// Build validated parameters; the ticker is trimmed and upper-cased
    pub fn new(
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        hold_period: u32,
        trade_locations: impl IntoIterator<Item = TradeLocation>,
    ) -> Result<Self, ValidationError> {
        let params = Self {
            ticker: ticker.trim().to_uppercase(),
            start_date,
            end_date,
            hold_period,
            trade_locations: trade_locations.into_iter().collect(),
        };
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ticker.trim().is_empty() {
            return Err(ValidationError::EmptyTicker);
        }
        if self.trade_locations.is_empty() {
            return Err(ValidationError::NoTradeLocations);
        }
        if !(1..=MAX_HOLD_PERIOD).contains(&self.hold_period) {
            return Err(ValidationError::HoldPeriodOutOfRange(self.hold_period));
        }
        if self.start_date > self.end_date {
            return Err(ValidationError::InvertedDateRange {
                start: self.start_date,
                end: self.end_date,
            });
        }
        Ok(())
    }

    /// Inclusive number of calendar days covered
    pub fn span_days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }
}
