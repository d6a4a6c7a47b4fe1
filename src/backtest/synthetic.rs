use crate::models::{DataSource, EvaluatedResult, InferredSide, OptionType, TestParameters};
use crate::sweep::{classify, evaluate};
use chrono::{Datelike, Duration, Weekday};
use rand::{Rng, RngCore, SeedableRng};

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

// Knuth MMIX constants
const LCG_MULTIPLIER: u64 = 6_364_136_223_846_793_005;
const LCG_INCREMENT: u64 = 1_442_695_040_888_963_407;

const MIN_CANDIDATES: i64 = 15;
const MAX_CANDIDATES: i64 = 25;

/// Base price for tickers without a known band
const FALLBACK_BASE_PRICE: f64 = 100.0;

/// Plausible underlying price bands (low, high) for well-known tickers
const PRICE_BANDS: &[(&str, f64, f64)] = &[
    ("SPY", 470.0, 510.0),
    ("QQQ", 400.0, 440.0),
    ("IWM", 190.0, 210.0),
    ("DIA", 370.0, 390.0),
    ("AAPL", 180.0, 195.0),
    ("MSFT", 370.0, 415.0),
    ("NVDA", 480.0, 620.0),
    ("TSLA", 180.0, 250.0),
    ("AMZN", 150.0, 175.0),
    ("META", 340.0, 400.0),
    ("GOOGL", 135.0, 150.0),
    ("AMD", 140.0, 180.0),
];

/// Stable 64-bit FNV-1a hash, used to derive generator seeds
pub fn stable_seed(input: &str) -> u64 {
    input.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Linear congruential generator (64-bit state, high 32 bits per draw)
///
/// Plugs into `rand::Rng` so callers get `gen_range`/`gen_bool`, but the
/// sequence depends only on the seed.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u64,
}

impl Lcg {
    fn step(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(LCG_MULTIPLIER)
            .wrapping_add(LCG_INCREMENT);
        self.state
    }
}

impl RngCore for Lcg {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let high = u64::from(self.next_u32());
        let low = u64::from(self.next_u32());
        (high << 32) | low
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Lcg {
    type Seed = [u8; 8];

    fn from_seed(seed: Self::Seed) -> Self {
        Self {
            state: u64::from_le_bytes(seed),
        }
    }

    fn seed_from_u64(state: u64) -> Self {
        Self { state }
    }
}

/// Output of one synthetic generation pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticBatch {
    pub seed: u64,
    pub results: Vec<EvaluatedResult>,
    /// Candidates dropped because they classified as neutral
    pub neutral_skipped: usize,
    /// Candidates dropped because their date fell on a weekend
    pub weekend_skipped: usize,
}

impl SyntheticBatch {
    /// Every candidate that reached classification, neutral ones included
    pub fn classified_count(&self) -> usize {
        self.results.len() + self.neutral_skipped
    }
}

/// Generates reproducible sweep outcomes when live data is unavailable.
///
/// Everything is derived from a seed hashed out of the parameters, so two
/// runs with the same ticker, date range and hold period are identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticSweepGenerator;

impl SyntheticSweepGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Seed for a parameter set: hash of ticker + start + end + hold period
    pub fn seed_for(params: &TestParameters) -> u64 {
        let key = format!(
            "{}{}{}{}",
            params.ticker,
            params.start_date.format("%Y-%m-%d"),
            params.end_date.format("%Y-%m-%d"),
            params.hold_period
        );
        stable_seed(&key)
    }

    /// Number of candidate events for a range: more days, more events
    pub fn candidate_count(params: &TestParameters) -> usize {
        (10 + params.span_days() / 3).clamp(MIN_CANDIDATES, MAX_CANDIDATES) as usize
    }

    /// Generate scored synthetic sweeps, neutral ones already removed
    pub fn generate(&self, params: &TestParameters) -> Vec<EvaluatedResult> {
        self.generate_batch(params).results
    }

    /// Generate scored synthetic sweeps along with skip counters
    pub fn generate_batch(&self, params: &TestParameters) -> SyntheticBatch {
        let seed = Self::seed_for(params);
        let mut rng = Lcg::seed_from_u64(seed);

        let span = params.span_days().max(1);
        let candidates = Self::candidate_count(params);
        let locations: Vec<_> = params.trade_locations.iter().copied().collect();
        let (price_low, price_high) = price_band(&params.ticker);
        let max_move = 1.5 * f64::from(params.hold_period).sqrt();

        let mut batch = SyntheticBatch {
            seed,
            results: Vec::with_capacity(candidates),
            neutral_skipped: 0,
            weekend_skipped: 0,
        };

        if locations.is_empty() {
            return batch;
        }

        for n in 0..candidates {
            let trade_date = params.start_date + Duration::days(rng.gen_range(0..span));
            if matches!(trade_date.weekday(), Weekday::Sat | Weekday::Sun) {
                batch.weekend_skipped += 1;
                continue;
            }

            let option_type = if rng.gen_bool(0.5) {
                OptionType::Call
            } else {
                OptionType::Put
            };
            let trade_location = locations[rng.gen_range(0..locations.len())];

            let inferred_side = classify(trade_location);
            if inferred_side == InferredSide::Neutral {
                batch.neutral_skipped += 1;
                continue;
            }

            let entry_price = round_to_cents(rng.gen_range(price_low..price_high));
            let percent_change = round_to_cents(rng.gen_range(-max_move..max_move));
            let exit_price = round_to_cents(entry_price * (1.0 + percent_change / 100.0));

            batch.results.push(EvaluatedResult {
                id: format!("synthetic-{:016x}-{:02}", seed, n),
                ticker: params.ticker.clone(),
                trade_date,
                exit_date: trade_date + Duration::days(i64::from(params.hold_period)),
                option_type,
                trade_location,
                inferred_side,
                hold_days: params.hold_period,
                entry_price,
                exit_price,
                percent_change,
                is_win: evaluate(option_type, inferred_side, percent_change),
                data_source: DataSource::Synthetic,
            });
        }

        // Stable sort keeps generation order within a day
        batch.results.sort_by_key(|r| r.trade_date);

        tracing::debug!(
            "Synthetic batch for {} (seed {:016x}): {} results, {} neutral, {} weekend",
            params.ticker,
            seed,
            batch.results.len(),
            batch.neutral_skipped,
            batch.weekend_skipped
        );

        batch
    }
}

/// Price band for a ticker, falling back to ±5% around a constant base
fn price_band(ticker: &str) -> (f64, f64) {
    PRICE_BANDS
        .iter()
        .find(|(symbol, _, _)| *symbol == ticker)
        .map(|&(_, low, high)| (low, high))
        .unwrap_or((FALLBACK_BASE_PRICE * 0.95, FALLBACK_BASE_PRICE * 1.05))
}

fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
