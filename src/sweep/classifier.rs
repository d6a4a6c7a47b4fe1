use crate::models::{InferredSide, TradeLocation};

/// Infer the directional side of a sweep from where it printed
///
/// Prints at or through the ask were paid up for (buys), prints at or
/// through the bid were hit (sells), and midpoint prints carry no bias.
///
/// # Example
/// ```
/// use sweep_backtest::models::{InferredSide, TradeLocation};
/// use sweep_backtest::sweep::classify;
///
/// assert_eq!(classify(TradeLocation::AboveAsk), InferredSide::Buy);
/// assert_eq!(classify(TradeLocation::Midpoint), InferredSide::Neutral);
/// ```
pub fn classify(location: TradeLocation) -> InferredSide {
    match location {
        TradeLocation::AtAsk | TradeLocation::AboveAsk => InferredSide::Buy,
        TradeLocation::BelowBid | TradeLocation::AtBid => InferredSide::Sell,
        TradeLocation::Midpoint => InferredSide::Neutral,
    }
}
