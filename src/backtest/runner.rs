use crate::api::SweepDataSource;
use crate::backtest::metrics::{ResultAggregator, Summary};
use crate::backtest::synthetic::SyntheticSweepGenerator;
use crate::config::{BacktestSettings, DataPolicy};
use crate::error::{BacktestError, DataAcquisitionError};
use crate::models::{DataSource, EvaluatedResult, InferredSide, PricedSweep, TestParameters};
use crate::sweep::{classify, evaluate, percent_change};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

/// Coarse progress update emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub percent: u8,
    pub status: String,
}

/// Receives progress updates. Must not block.
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, status: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, status: &str) {
        self(percent, status)
    }
}

impl ProgressSink for UnboundedSender<Progress> {
    fn report(&self, percent: u8, status: &str) {
        // Receiver may be gone; progress is fire-and-forget
        let _ = self.send(Progress {
            percent,
            status: status.to_string(),
        });
    }
}

/// Discards progress
impl ProgressSink for () {
    fn report(&self, _percent: u8, _status: &str) {}
}

/// Everything a run hands back to its caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutcome {
    pub run_id: Uuid,
    pub params: TestParameters,
    pub data_source: DataSource,
    /// Why live data was not used, when the run fell back
    pub fallback_reason: Option<String>,
    pub results: Vec<EvaluatedResult>,
    pub summary: Summary,
    pub generated_at: DateTime<Utc>,
}

impl BacktestOutcome {
    pub fn is_synthetic(&self) -> bool {
        self.data_source == DataSource::Synthetic
    }

    /// Print a formatted report to stdout
    pub fn print_report(&self) {
        println!("\n🔬 Sweep backtest: {}", self.params.ticker);
        println!(
            "   Period: {} to {} (hold {} days)",
            self.params.start_date, self.params.end_date, self.params.hold_period
        );
        let locations: Vec<&str> = self.params.trade_locations.iter().map(|l| l.as_str()).collect();
        println!("   Locations: {}", locations.join(", "));
        println!("   Data: {}", self.data_source);
        if let Some(reason) = &self.fallback_reason {
            println!("   ⚠️  SYNTHETIC DATA - live data unavailable: {}", reason);
        }

        self.summary.print_report();
    }
}

/// Runs sweep backtests.
///
/// Holds only configuration; every `run_test` call works on its own
/// parameters and progress sink, so concurrent runs do not interact.
#[derive(Clone)]
pub struct BacktestOrchestrator {
    source: Option<Arc<dyn SweepDataSource>>,
    policy: DataPolicy,
    acquisition_timeout: Duration,
    generator: SyntheticSweepGenerator,
}

impl BacktestOrchestrator {
    pub fn new(policy: DataPolicy) -> Self {
        Self {
            source: None,
            policy,
            acquisition_timeout: Duration::from_secs(BacktestSettings::default().acquisition_timeout_secs),
            generator: SyntheticSweepGenerator::new(),
        }
    }

    pub fn from_settings(settings: &BacktestSettings) -> Self {
        Self::new(settings.data_policy)
            .with_acquisition_timeout(Duration::from_secs(settings.acquisition_timeout_secs))
    }

    /// Attach the live market-data collaborator
    pub fn with_source(mut self, source: Arc<dyn SweepDataSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.acquisition_timeout = timeout;
        self
    }

    /// Which live/synthetic behavior is active
    pub fn policy(&self) -> DataPolicy {
        self.policy
    }

    /// Run one backtest
    ///
    /// Validation happens before any acquisition. Progress is reported at
    /// start, once data is acquired, and when analysis completes.
    pub async fn run_test(
        &self,
        params: &TestParameters,
        progress: &dyn ProgressSink,
    ) -> Result<BacktestOutcome, BacktestError> {
        params.validate()?;

        progress.report(0, "starting");
        tracing::info!(
            "Starting sweep backtest: {} {} to {}, hold {}d, policy {}",
            params.ticker,
            params.start_date,
            params.end_date,
            params.hold_period,
            self.policy
        );

        let (data_source, fallback_reason, results, total) = match self.policy {
            DataPolicy::SyntheticOnly => {
                let (results, total) = self.synthetic(params);
                (DataSource::Synthetic, None, results, total)
            }
            DataPolicy::LiveOnly => {
                let sweeps = self.acquire(params).await?;
                let (results, total) = score_live(params, &sweeps)?;
                (DataSource::Live, None, results, total)
            }
            DataPolicy::Fallback => match self.acquire(params).await {
                Ok(sweeps) => {
                    let (results, total) = score_live(params, &sweeps)?;
                    (DataSource::Live, None, results, total)
                }
                Err(e) => {
                    tracing::warn!(
                        "Live data unavailable for {} ({}); using synthetic sweeps",
                        params.ticker,
                        e
                    );
                    let (results, total) = self.synthetic(params);
                    (DataSource::Synthetic, Some(e.to_string()), results, total)
                }
            },
        };

        progress.report(40, &format!("data acquired ({})", data_source));

        check_scored(&results)?;
        let summary = ResultAggregator::aggregate(&results, total, data_source);

        progress.report(100, "analysis complete");
        tracing::info!(
            "Sweep backtest complete ({}): {} scored, {} neutral, win rate {:.1}%",
            data_source,
            summary.non_neutral_trades,
            summary.neutral_trades,
            summary.win_rate
        );

        Ok(BacktestOutcome {
            run_id: Uuid::new_v4(),
            params: params.clone(),
            data_source,
            fallback_reason,
            results,
            summary,
            generated_at: Utc::now(),
        })
    }

    async fn acquire(&self, params: &TestParameters) -> Result<Vec<PricedSweep>, DataAcquisitionError> {
        let source = self.source.as_ref().ok_or(DataAcquisitionError::Unavailable)?;

        tracing::debug!("Fetching live sweeps from {}", source.name());

        match tokio::time::timeout(self.acquisition_timeout, source.fetch_sweeps_and_prices(params)).await {
            Ok(result) => result,
            Err(_) => Err(DataAcquisitionError::Timeout(self.acquisition_timeout.as_secs())),
        }
    }

    fn synthetic(&self, params: &TestParameters) -> (Vec<EvaluatedResult>, usize) {
        let batch = self.generator.generate_batch(params);
        let total = batch.classified_count();
        (batch.results, total)
    }
}

/// Classify and score live sweeps. Returns scored results and the number
/// of sweeps considered, neutral ones included.
fn score_live(
    params: &TestParameters,
    sweeps: &[PricedSweep],
) -> Result<(Vec<EvaluatedResult>, usize), BacktestError> {
    let mut results = Vec::new();
    let mut total = 0;

    for sweep in sweeps {
        let observation = &sweep.observation;
        if !params.trade_locations.contains(&observation.trade_location) {
            continue;
        }
        total += 1;

        let side = classify(observation.trade_location);
        if side == InferredSide::Neutral {
            continue;
        }

        if !(sweep.entry_price.is_finite() && sweep.entry_price > 0.0 && sweep.exit_price.is_finite()) {
            return Err(BacktestError::Computation(format!(
                "sweep on {} has unusable prices (entry {}, exit {})",
                observation.trade_date, sweep.entry_price, sweep.exit_price
            )));
        }

        let change = percent_change(sweep.entry_price, sweep.exit_price);

        results.push(EvaluatedResult {
            id: format!("live-{}", Uuid::new_v4()),
            ticker: observation.ticker.clone(),
            trade_date: observation.trade_date,
            exit_date: sweep.exit_date,
            option_type: observation.option_type,
            trade_location: observation.trade_location,
            inferred_side: side,
            hold_days: params.hold_period,
            entry_price: sweep.entry_price,
            exit_price: sweep.exit_price,
            percent_change: change,
            is_win: evaluate(observation.option_type, side, change),
            data_source: DataSource::Live,
        });
    }

    Ok((results, total))
}

/// Scored results must be directional with a finite move
fn check_scored(results: &[EvaluatedResult]) -> Result<(), BacktestError> {
    match results
        .iter()
        .find(|r| r.inferred_side == InferredSide::Neutral || !r.percent_change.is_finite())
    {
        Some(bad) => Err(BacktestError::Computation(format!(
            "result {} cannot be scored (side {}, change {})",
            bad.id, bad.inferred_side, bad.percent_change
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::models::{OptionType, SweepObservation, TradeLocation};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    struct StaticSource(Vec<PricedSweep>);

    #[async_trait]
    impl SweepDataSource for StaticSource {
        async fn fetch_sweeps_and_prices(
            &self,
            _params: &TestParameters,
        ) -> Result<Vec<PricedSweep>, DataAcquisitionError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "static"
        }
    }

    struct FailingSource;

    #[async_trait]
    impl SweepDataSource for FailingSource {
        async fn fetch_sweeps_and_prices(
            &self,
            _params: &TestParameters,
        ) -> Result<Vec<PricedSweep>, DataAcquisitionError> {
            Err(DataAcquisitionError::Api {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SweepDataSource for SlowSource {
        async fn fetch_sweeps_and_prices(
            &self,
            _params: &TestParameters,
        ) -> Result<Vec<PricedSweep>, DataAcquisitionError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn params() -> TestParameters {
        TestParameters::new(
            "SPY",
            date("2024-01-02"),
            date("2024-01-31"),
            10,
            [TradeLocation::AtAsk, TradeLocation::BelowBid, TradeLocation::Midpoint],
        )
        .unwrap()
    }

    fn priced(location: TradeLocation, option_type: OptionType, entry: f64, exit: f64) -> PricedSweep {
        PricedSweep {
            observation: SweepObservation {
                ticker: "SPY".to_string(),
                trade_date: date("2024-01-03"),
                option_type,
                volume: 100,
                price: 1.0,
                bid: 0.95,
                ask: 1.05,
                trade_location: location,
            },
            entry_price: entry,
            exit_price: exit,
            exit_date: date("2024-01-16"),
        }
    }

    #[tokio::test]
    async fn test_live_run_scores_and_counts_neutral() {
        tracing_subscriber::fmt()
            .with_env_filter("sweep_backtest=debug")
            .try_init()
            .ok();

        let source = StaticSource(vec![
            priced(TradeLocation::AtAsk, OptionType::Call, 100.0, 102.0), // win
            priced(TradeLocation::BelowBid, OptionType::Call, 100.0, 101.0), // loss
            priced(TradeLocation::Midpoint, OptionType::Put, 100.0, 95.0), // neutral
            priced(TradeLocation::AboveAsk, OptionType::Call, 100.0, 110.0), // not requested
        ]);
        let orchestrator =
            BacktestOrchestrator::new(DataPolicy::LiveOnly).with_source(Arc::new(source));

        let outcome = orchestrator.run_test(&params(), &()).await.unwrap();

        assert_eq!(outcome.data_source, DataSource::Live);
        assert_eq!(outcome.summary.data_source, DataSource::Live);
        assert!(outcome.fallback_reason.is_none());
        assert_eq!(outcome.results.len(), 2);
        assert!(outcome.results.iter().all(|r| r.id.starts_with("live-")));
        assert_eq!(outcome.summary.total_trades, 3);
        assert_eq!(outcome.summary.neutral_trades, 1);
        assert_eq!(outcome.summary.wins, 1);
        assert_eq!(outcome.summary.losses, 1);
        assert!((outcome.summary.win_rate - 50.0).abs() < 1e-9);
        assert!((outcome.summary.best_trade.unwrap().percent_change - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fallback_on_failure_is_tagged() {
        let orchestrator =
            BacktestOrchestrator::new(DataPolicy::Fallback).with_source(Arc::new(FailingSource));

        let outcome = orchestrator.run_test(&params(), &()).await.unwrap();

        assert!(outcome.is_synthetic());
        assert_eq!(outcome.summary.data_source, DataSource::Synthetic);
        assert!(outcome.fallback_reason.unwrap().contains("401"));
        assert!(outcome
            .results
            .iter()
            .all(|r| r.data_source == DataSource::Synthetic));
    }

    #[tokio::test]
    async fn test_fallback_without_source() {
        let orchestrator = BacktestOrchestrator::new(DataPolicy::Fallback);
        let outcome = orchestrator.run_test(&params(), &()).await.unwrap();

        assert!(outcome.is_synthetic());
        assert!(outcome.fallback_reason.is_some());
    }

    #[tokio::test]
    async fn test_live_only_propagates_failure() {
        let orchestrator =
            BacktestOrchestrator::new(DataPolicy::LiveOnly).with_source(Arc::new(FailingSource));

        let err = orchestrator.run_test(&params(), &()).await.unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataAcquisition(DataAcquisitionError::Api { status: 401, .. })
        ));

        let err = BacktestOrchestrator::new(DataPolicy::LiveOnly)
            .run_test(&params(), &())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataAcquisition(DataAcquisitionError::Unavailable)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquisition_timeout() {
        let orchestrator = BacktestOrchestrator::new(DataPolicy::LiveOnly)
            .with_source(Arc::new(SlowSource))
            .with_acquisition_timeout(Duration::from_secs(1));

        let err = orchestrator.run_test(&params(), &()).await.unwrap_err();
        assert!(matches!(
            err,
            BacktestError::DataAcquisition(DataAcquisitionError::Timeout(1))
        ));
    }

    #[tokio::test]
    async fn test_synthetic_only_never_calls_source() {
        let orchestrator =
            BacktestOrchestrator::new(DataPolicy::SyntheticOnly).with_source(Arc::new(FailingSource));

        let outcome = orchestrator.run_test(&params(), &()).await.unwrap();
        assert!(outcome.is_synthetic());
        assert!(outcome.fallback_reason.is_none());
        assert_eq!(
            outcome.summary.neutral_trades + outcome.summary.non_neutral_trades,
            outcome.summary.total_trades
        );
    }

    #[tokio::test]
    async fn test_validation_happens_first() {
        let mut bad = params();
        bad.hold_period = 45;

        let calls = Mutex::new(Vec::new());
        let sink = |percent: u8, status: &str| {
            calls.lock().unwrap().push((percent, status.to_string()));
        };

        let err = BacktestOrchestrator::new(DataPolicy::Fallback)
            .run_test(&bad, &sink)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BacktestError::Validation(ValidationError::HoldPeriodOutOfRange(45))
        ));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_progress_milestones() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        BacktestOrchestrator::new(DataPolicy::SyntheticOnly)
            .run_test(&params(), &tx)
            .await
            .unwrap();
        drop(tx);

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        let percents: Vec<u8> = updates.iter().map(|u| u.percent).collect();
        assert_eq!(percents, vec![0, 40, 100]);
        assert_eq!(updates[1].status, "data acquired (synthetic)");
        assert_eq!(updates[2].status, "analysis complete");
    }

    #[tokio::test]
    async fn test_bad_live_prices_are_a_computation_error() {
        let source = StaticSource(vec![priced(TradeLocation::AtAsk, OptionType::Call, 0.0, 1.0)]);
        let orchestrator =
            BacktestOrchestrator::new(DataPolicy::Fallback).with_source(Arc::new(source));

        let err = orchestrator.run_test(&params(), &()).await.unwrap_err();
        assert!(matches!(err, BacktestError::Computation(_)));
    }

    #[test]
    fn test_dropped_receiver_does_not_fail_run() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        let outcome = tokio_test::block_on(
            BacktestOrchestrator::new(DataPolicy::SyntheticOnly).run_test(&params(), &tx),
        );
        assert!(outcome.is_ok());
    }
}
