use crate::models::{InferredSide, OptionType};

/// Decide whether the realized move matched the sweep's implied direction.
///
/// Bought calls and sold puts are bullish; bought puts and sold calls are
/// bearish. A flat move never wins. Neutral sweeps are never scored, so they
/// always come back as a loss here; callers filter them out beforehand.
pub fn evaluate(option_type: OptionType, side: InferredSide, percent_change: f64) -> bool {
    match (option_type, side) {
        (OptionType::Call, InferredSide::Buy) | (OptionType::Put, InferredSide::Sell) => {
            percent_change > 0.0
        }
        (OptionType::Put, InferredSide::Buy) | (OptionType::Call, InferredSide::Sell) => {
            percent_change < 0.0
        }
        (_, InferredSide::Neutral) => false,
    }
}

/// Percent change from entry to exit
pub fn percent_change(entry_price: f64, exit_price: f64) -> f64 {
    ((exit_price - entry_price) / entry_price) * 100.0
}
