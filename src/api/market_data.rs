use super::SweepDataSource;
use crate::config::MarketDataSettings;
use crate::error::DataAcquisitionError;
use crate::models::{OptionType, PricedSweep, SweepObservation, TestParameters, TradeLocation};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate};
use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Extra calendar days of bars fetched past the hold window (weekends, holidays)
const EXIT_BAR_SLACK_DAYS: i64 = 7;

// Type alias for the rate limiter to simplify signatures
type MarketDataRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// HTTP client for the historical market-data provider
///
/// Cloneable; all clones share one rate limiter.
#[derive(Clone)]
pub struct MarketDataClient {
    client: Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_backoff_ms: u64,
    rate_limiter: Arc<MarketDataRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ResultsEnvelope<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Bar open time, unix millis
    t: i64,
    c: f64,
}

/// One options sweep print as returned by the provider
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RawSweep {
    pub date: NaiveDate,
    pub contract_type: OptionType,
    pub size: u64,
    pub price: f64,
    pub bid: f64,
    pub ask: f64,
}

// ============== Public Types ==============

/// Daily closing price of the underlying
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub close: f64,
}

impl MarketDataClient {
    pub fn new(
        settings: &MarketDataSettings,
        api_key: impl Into<String>,
    ) -> Result<Self, DataAcquisitionError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(DataAcquisitionError::network)?;

        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: settings.max_retries.max(1),
            retry_backoff_ms: settings.retry_backoff_ms,
            rate_limiter,
        })
    }

    /// Make a rate-limited GET with retry on 429, 5xx and network errors.
    ///
    /// The key travels in the `Authorization` header, never in the URL.
    async fn make_request(&self, path: &str) -> Result<reqwest::Response, DataAcquisitionError> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 1..=self.max_retries {
            self.rate_limiter.until_ready().await;

            let backoff = backoff_delay(self.retry_backoff_ms, attempt);
            let last_attempt = attempt == self.max_retries;

            match self
                .client
                .get(&url)
                .bearer_auth(&self.api_key)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.as_u16() == 429 {
                        if last_attempt {
                            return Err(DataAcquisitionError::RateLimited { attempts: attempt });
                        }
                        tracing::warn!(
                            "Rate limited on {} (429), backing off for {:?} (attempt {}/{})",
                            path,
                            backoff,
                            attempt,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if status.is_server_error() && !last_attempt {
                        tracing::warn!(
                            "Server error {} on {}, retrying in {:?} (attempt {}/{})",
                            status,
                            path,
                            backoff,
                            attempt,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    // Other 4xx, or 5xx on the final attempt
                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(DataAcquisitionError::Api {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if !last_attempt => {
                    let e = e.without_url();
                    tracing::warn!(
                        "Network error on {}: {}, retrying in {:?} (attempt {}/{})",
                        path,
                        e,
                        backoff,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(DataAcquisitionError::network(e)),
            }
        }

        Err(DataAcquisitionError::RateLimited {
            attempts: self.max_retries,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DataAcquisitionError> {
        let response = self.make_request(path).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| DataAcquisitionError::Decode(e.without_url().to_string()))
    }

    /// Fetch daily bars for the underlying, oldest first
    pub async fn get_daily_bars(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyBar>, DataAcquisitionError> {
        let path = format!(
            "/v2/aggs/ticker/{}/range/1/day/{}/{}?adjusted=true&sort=asc",
            ticker,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        tracing::debug!("Fetching daily bars for {} ({} to {})", ticker, from, to);

        let envelope: ResultsEnvelope<AggregateBar> = self.get_json(&path).await?;

        let mut bars = envelope
            .results
            .into_iter()
            .map(|bar| {
                DateTime::from_timestamp_millis(bar.t)
                    .map(|ts| DailyBar {
                        date: ts.date_naive(),
                        close: bar.c,
                    })
                    .ok_or_else(|| {
                        DataAcquisitionError::Decode(format!("invalid bar timestamp {}", bar.t))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|bar| bar.date);

        tracing::debug!("Fetched {} daily bars for {}", bars.len(), ticker);

        Ok(bars)
    }

    /// Fetch options sweep prints on the underlying
    pub async fn get_sweeps(
        &self,
        ticker: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RawSweep>, DataAcquisitionError> {
        let path = format!(
            "/v1/options/sweeps/{}?from={}&to={}",
            ticker,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        tracing::debug!("Fetching option sweeps for {} ({} to {})", ticker, from, to);

        let envelope: ResultsEnvelope<RawSweep> = self.get_json(&path).await?;

        tracing::debug!("Fetched {} sweeps for {}", envelope.results.len(), ticker);

        Ok(envelope.results)
    }
}

#[async_trait]
impl SweepDataSource for MarketDataClient {
    async fn fetch_sweeps_and_prices(
        &self,
        params: &TestParameters,
    ) -> Result<Vec<PricedSweep>, DataAcquisitionError> {
        let bars_until = params.end_date
            + Duration::days(i64::from(params.hold_period) + EXIT_BAR_SLACK_DAYS);

        let sweeps = self
            .get_sweeps(&params.ticker, params.start_date, params.end_date)
            .await?;
        let bars = self
            .get_daily_bars(&params.ticker, params.start_date, bars_until)
            .await?;

        Ok(price_sweeps(params, &sweeps, &bars))
    }

    fn name(&self) -> &str {
        "market-data-api"
    }
}

/// Exponential backoff for a 1-based attempt, saturating instead of overflowing
fn backoff_delay(base_ms: u64, attempt: u32) -> std::time::Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    std::time::Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Attach realized entry/exit closes to raw sweeps.
///
/// Entry is the close on the trade date (or the next session), exit the
/// first close on or after trade date + hold period. Sweeps outside the
/// requested range or locations, with unusable quotes, or without an exit
/// bar yet are dropped.
pub fn price_sweeps(
    params: &TestParameters,
    sweeps: &[RawSweep],
    bars: &[DailyBar],
) -> Vec<PricedSweep> {
    let first_bar_on_or_after = |date: NaiveDate| {
        let idx = bars.partition_point(|bar| bar.date < date);
        bars.get(idx)
    };

    let mut priced = Vec::with_capacity(sweeps.len());
    let mut unusable_quotes = 0;

    for sweep in sweeps {
        if sweep.date < params.start_date || sweep.date > params.end_date {
            continue;
        }

        let Some(trade_location) = TradeLocation::from_quote(sweep.price, sweep.bid, sweep.ask)
        else {
            unusable_quotes += 1;
            continue;
        };
        if !params.trade_locations.contains(&trade_location) {
            continue;
        }

        let exit_target = sweep.date + Duration::days(i64::from(params.hold_period));
        let (Some(entry), Some(exit)) = (
            first_bar_on_or_after(sweep.date),
            first_bar_on_or_after(exit_target),
        ) else {
            continue;
        };

        priced.push(PricedSweep {
            observation: SweepObservation {
                ticker: params.ticker.clone(),
                trade_date: sweep.date,
                option_type: sweep.contract_type,
                volume: sweep.size,
                price: sweep.price,
                bid: sweep.bid,
                ask: sweep.ask,
                trade_location,
            },
            entry_price: entry.close,
            exit_price: exit.close,
            exit_date: exit.date,
        });
    }

    if unusable_quotes > 0 {
        tracing::warn!(
            "Dropped {} {} sweeps with crossed or empty quotes",
            unusable_quotes,
            params.ticker
        );
    }

    priced
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn params() -> TestParameters {
        TestParameters::new(
            "SPY",
            date("2024-01-02"),
            date("2024-01-05"),
            2,
            [TradeLocation::AtAsk, TradeLocation::AtBid, TradeLocation::Midpoint],
        )
        .unwrap()
    }

    fn bars() -> Vec<DailyBar> {
        [
            ("2024-01-02", 470.0),
            ("2024-01-03", 468.0),
            ("2024-01-04", 467.0),
            ("2024-01-05", 468.5),
            ("2024-01-08", 474.0),
        ]
        .into_iter()
        .map(|(d, close)| DailyBar {
            date: date(d),
            close,
        })
        .collect()
    }

    fn sweep(d: &str, price: f64, bid: f64, ask: f64) -> RawSweep {
        RawSweep {
            date: date(d),
            contract_type: OptionType::Call,
            size: 500,
            price,
            bid,
            ask,
        }
    }

    #[test]
    fn test_price_sweeps_entry_and_exit() {
        let sweeps = vec![sweep("2024-01-02", 2.10, 2.00, 2.10)];
        let priced = price_sweeps(&params(), &sweeps, &bars());

        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].observation.trade_location, TradeLocation::AtAsk);
        assert_eq!(priced[0].entry_price, 470.0);
        assert_eq!(priced[0].exit_price, 467.0);
        assert_eq!(priced[0].exit_date, date("2024-01-04"));
    }

    #[test]
    fn test_price_sweeps_rolls_exit_past_weekend() {
        // 01-04 + 2 days lands on Saturday; exit on Monday's close
        let sweeps = vec![sweep("2024-01-04", 2.00, 2.00, 2.10)];
        let priced = price_sweeps(&params(), &sweeps, &bars());

        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].observation.trade_location, TradeLocation::AtBid);
        assert_eq!(priced[0].exit_date, date("2024-01-08"));
        assert_eq!(priced[0].exit_price, 474.0);
    }

    #[test]
    fn test_price_sweeps_drops_unusable_rows() {
        let sweeps = vec![
            // crossed quote
            sweep("2024-01-02", 2.00, 2.20, 2.10),
            // outside date range
            sweep("2024-01-10", 2.10, 2.00, 2.10),
            // location not requested
            sweep("2024-01-02", 2.50, 2.00, 2.10),
            // no exit bar yet
            sweep("2024-01-05", 2.10, 2.00, 2.10),
        ];
        let mut p = params();
        p.hold_period = 10;

        assert!(price_sweeps(&p, &sweeps, &bars()).is_empty());
    }

    #[test]
    fn test_price_sweeps_keeps_requested_midpoint() {
        let sweeps = vec![sweep("2024-01-03", 2.05, 2.00, 2.10)];
        let priced = price_sweeps(&params(), &sweeps, &bars());

        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].observation.trade_location, TradeLocation::Midpoint);
    }

    #[tokio::test]
    async fn test_fetch_sweeps_and_prices_from_api() {
        let mut server = mockito::Server::new_async().await;

        let sweeps_mock = server
            .mock("GET", "/v1/options/sweeps/SPY")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("from".into(), "2024-01-02".into()),
                mockito::Matcher::UrlEncoded("to".into(), "2024-01-05".into()),
            ]))
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"results":[{"date":"2024-01-02","contract_type":"put","size":1200,"price":3.40,"bid":3.30,"ask":3.40}]}"#,
            )
            .create_async()
            .await;

        let bars_mock = server
            .mock(
                "GET",
                "/v2/aggs/ticker/SPY/range/1/day/2024-01-02/2024-01-14",
            )
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"status":"OK","results":[
                    {"t":1704171600000,"o":472.0,"h":473.0,"l":469.0,"c":470.0,"v":1000},
                    {"t":1704258000000,"o":470.0,"h":471.0,"l":467.0,"c":468.0,"v":1000},
                    {"t":1704344400000,"o":468.0,"h":469.0,"l":466.0,"c":467.0,"v":1000}
                ]}"#,
            )
            .create_async()
            .await;

        let settings = MarketDataSettings {
            base_url: server.url(),
            ..MarketDataSettings::default()
        };
        let client = MarketDataClient::new(&settings, "test-key").unwrap();

        let priced = client.fetch_sweeps_and_prices(&params()).await.unwrap();

        sweeps_mock.assert_async().await;
        bars_mock.assert_async().await;

        assert_eq!(priced.len(), 1);
        assert_eq!(priced[0].observation.option_type, OptionType::Put);
        assert_eq!(priced[0].observation.trade_location, TradeLocation::AtAsk);
        assert_eq!(priced[0].entry_price, 470.0);
        assert_eq!(priced[0].exit_price, 467.0);
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/v1/options/sweeps/SPY")
            .match_query(mockito::Matcher::Any)
            .with_status(403)
            .with_body("forbidden")
            .expect(1)
            .create_async()
            .await;

        let settings = MarketDataSettings {
            base_url: server.url(),
            max_retries: 3,
            retry_backoff_ms: 1,
            ..MarketDataSettings::default()
        };
        let client = MarketDataClient::new(&settings, "bad-key").unwrap();

        let err = client
            .get_sweeps("SPY", date("2024-01-02"), date("2024-01-05"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DataAcquisitionError::Api { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("GET", "/v1/options/sweeps/SPY")
            .match_query(mockito::Matcher::Any)
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let settings = MarketDataSettings {
            base_url: server.url(),
            max_retries: 2,
            retry_backoff_ms: 1,
            ..MarketDataSettings::default()
        };
        let client = MarketDataClient::new(&settings, "key").unwrap();

        let err = client
            .get_sweeps("SPY", date("2024-01-02"), date("2024-01-05"))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, DataAcquisitionError::Api { status: 503, .. }));
    }

    #[test]
    fn test_backoff_delay_saturates() {
        assert_eq!(backoff_delay(1000, 1), std::time::Duration::from_millis(1000));
        assert_eq!(backoff_delay(1000, 3), std::time::Duration::from_millis(4000));
        assert_eq!(
            backoff_delay(u64::MAX, 200),
            std::time::Duration::from_millis(u64::MAX)
        );
        assert_eq!(
            backoff_delay(2000, 80),
            std::time::Duration::from_millis(u64::MAX)
        );
    }

    #[tokio::test]
    async fn test_network_error_does_not_expose_api_key() {
        // Nothing listens on port 1
        let settings = MarketDataSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            max_retries: 1,
            ..MarketDataSettings::default()
        };
        let client = MarketDataClient::new(&settings, "SUPERSECRETKEY").unwrap();

        let err = client
            .get_sweeps("SPY", date("2024-01-02"), date("2024-01-05"))
            .await
            .unwrap_err();

        assert!(matches!(err, DataAcquisitionError::Network(_)));
        assert!(!err.to_string().contains("SUPERSECRETKEY"));
        assert!(!format!("{:?}", err).contains("SUPERSECRETKEY"));
    }
}
