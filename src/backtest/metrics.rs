use crate::models::{DataSource, EvaluatedResult, TradeLocation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate for one trade location
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationBreakdown {
    pub total: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub avg_move: f64,
}

/// Whole-run statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Whether these numbers come from live or synthetic sweeps
    pub data_source: DataSource,

    // Trade counts
    pub total_trades: usize,
    pub neutral_trades: usize,
    pub non_neutral_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,

    // Move distribution (absolute percent)
    pub average_move: f64,
    pub best_trade: Option<EvaluatedResult>,
    pub worst_trade: Option<EvaluatedResult>,

    /// Always holds all five locations
    pub by_location: BTreeMap<TradeLocation, LocationBreakdown>,
}

/// Reduces scored sweeps into a `Summary`
pub struct ResultAggregator;

impl ResultAggregator {
    /// Aggregate scored (non-neutral) results.
    ///
    /// `total_including_neutral` is the number of sweeps classified during
    /// the run; the difference to `results.len()` is reported as neutral.
    /// Ties for best/worst trade go to the earliest result. `data_source`
    /// tags the summary so it stays identifiable on its own.
    pub fn aggregate(
        results: &[EvaluatedResult],
        total_including_neutral: usize,
        data_source: DataSource,
    ) -> Summary {
        let scored = results.len();
        let total_trades = total_including_neutral.max(scored);

        let wins = results.iter().filter(|r| r.is_win).count();
        let losses = scored - wins;

        let mut best_trade: Option<&EvaluatedResult> = None;
        let mut worst_trade: Option<&EvaluatedResult> = None;
        let mut total_move = 0.0;

        for result in results {
            let magnitude = result.percent_change.abs();
            total_move += magnitude;

            // Strict comparisons keep the first occurrence on ties
            if best_trade.map_or(true, |b| magnitude > b.percent_change.abs()) {
                best_trade = Some(result);
            }
            if worst_trade.map_or(true, |w| magnitude < w.percent_change.abs()) {
                worst_trade = Some(result);
            }
        }

        Summary {
            data_source,
            total_trades,
            neutral_trades: total_trades - scored,
            non_neutral_trades: scored,
            wins,
            losses,
            win_rate: rate(wins, scored),
            average_move: mean(total_move, scored),
            best_trade: best_trade.cloned(),
            worst_trade: worst_trade.cloned(),
            by_location: Self::breakdown(results),
        }
    }

    /// Per-location statistics, zeroed for locations with no results
    pub fn breakdown(results: &[EvaluatedResult]) -> BTreeMap<TradeLocation, LocationBreakdown> {
        TradeLocation::ALL
            .into_iter()
            .map(|location| {
                let subset: Vec<&EvaluatedResult> = results
                    .iter()
                    .filter(|r| r.trade_location == location)
                    .collect();

                let total = subset.len();
                let wins = subset.iter().filter(|r| r.is_win).count();
                let total_move: f64 = subset.iter().map(|r| r.percent_change.abs()).sum();

                (
                    location,
                    LocationBreakdown {
                        total,
                        wins,
                        win_rate: rate(wins, total),
                        avg_move: mean(total_move, total),
                    },
                )
            })
            .collect()
    }
}

fn rate(wins: usize, total: usize) -> f64 {
    if total > 0 {
        (wins as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

fn mean(sum: f64, count: usize) -> f64 {
    if count > 0 {
        sum / count as f64
    } else {
        0.0
    }
}

impl Summary {
    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║             SWEEP BACKTEST SUMMARY REPORT             ║");
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!("📈 TRADE STATISTICS");
        println!("  Data Source:           {}", self.data_source);
        println!("  Sweeps Considered:     {}", self.total_trades);
        println!("  Neutral (unscored):    {}", self.neutral_trades);
        println!("  Scored:                {}", self.non_neutral_trades);
        println!("  Wins:                  {} ({:.1}%)", self.wins, self.win_rate);
        println!("  Losses:                {}", self.losses);
        println!("  Average Move:          {:.2}%", self.average_move);

        if let (Some(best), Some(worst)) = (&self.best_trade, &self.worst_trade) {
            println!("\n💰 BEST / WORST");
            println!(
                "  Best:                  {} {} {} {} {:+.2}%",
                best.trade_date, best.inferred_side, best.option_type, best.trade_location, best.percent_change
            );
            println!(
                "  Worst:                 {} {} {} {} {:+.2}%",
                worst.trade_date,
                worst.inferred_side,
                worst.option_type,
                worst.trade_location,
                worst.percent_change
            );
        }

        println!("\n📍 BY TRADE LOCATION");
        println!(
            "  {:<12} {:>7} {:>7} {:>9} {:>9}",
            "Location", "Trades", "Wins", "Win%", "AvgMove"
        );
        for (location, stats) in &self.by_location {
            println!(
                "  {:<12} {:>7} {:>7} {:>8.1}% {:>8.2}%",
                location.as_str(),
                stats.total,
                stats.wins,
                stats.win_rate,
                stats.avg_move
            );
        }

        println!("\n═══════════════════════════════════════════════════════\n");
    }
}
