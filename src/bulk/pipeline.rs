use crate::bulk::assemble::{ResultRow, assemble};
use crate::bulk::encode::encode;
use crate::bulk::resolve::{Resolve, ResolutionOutcome};
use crate::bulk::selector;
use crate::bulk::table::{InputRow, parse_table};
use futures::stream::{self, StreamExt};
use std::{env, sync::Arc, time::Duration, time::Instant};
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_MAX_ROWS: usize = 10_000;
pub const DEFAULT_ROW_TIMEOUT: Duration = Duration::from_secs(55);

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub max_rows: usize,
    pub row_timeout: Duration,
    /// Rows resolved at once. 1 resolves strictly one row after another.
    pub concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            row_timeout: DEFAULT_ROW_TIMEOUT,
            concurrency: 1,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_rows: env_parse("BULK_MAX_ROWS")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.max_rows),
            row_timeout: env_parse::<u64>("BULK_ROW_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.row_timeout),
            concurrency: env_parse("BULK_CONCURRENCY")
                .filter(|v| *v > 0)
                .unwrap_or(defaults.concurrency),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

#[derive(Debug, Error)]
#[error("batch `{stage}` rejected: {message}")]
pub struct BatchError {
    stage: &'static str,
    message: String,
    kind: BatchErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorKind {
    Configuration,
    InvalidInput,
}

impl BatchError {
    pub fn configuration(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: BatchErrorKind::Configuration,
        }
    }

    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            kind: BatchErrorKind::InvalidInput,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> BatchErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

/// Encoded output of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub rows: Vec<ResultRow>,
    pub csv: String,
}

/// Runs an uploaded table through selection, resolution, assembly and
/// encoding. Every input row yields exactly one output row, in input order.
#[derive(Clone)]
pub struct BatchPipeline<R> {
    resolver: Arc<R>,
    config: BatchConfig,
}

impl<R: Resolve> BatchPipeline<R> {
    pub fn new(resolver: Arc<R>, config: BatchConfig) -> Self {
        Self { resolver, config }
    }

    pub async fn run(&self, table: &[u8]) -> Result<BatchOutput, BatchError> {
        if !self.resolver.has_credential() {
            return Err(BatchError::configuration("config", "missing_api_key"));
        }
        let rows = parse_table(table, self.config.max_rows)?;
        let started = Instant::now();
        let total = rows.len();
        info!(
            target = "valuation.bulk",
            rows = total,
            concurrency = self.config.concurrency,
            "batch_started"
        );

        let results = self.process(rows).await;

        crate::metrics::batch_elapsed(total, started.elapsed().as_millis());
        info!(
            target = "valuation.bulk",
            rows = total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch_finished"
        );
        let csv = encode(&results);
        Ok(BatchOutput { rows: results, csv })
    }

    async fn process(&self, rows: Vec<InputRow>) -> Vec<ResultRow> {
        let concurrency = self.config.concurrency.max(1);
        // `buffered` yields in submission order whatever the completion order.
        stream::iter(rows.into_iter().enumerate())
            .map(|(index, row)| async move { self.process_row(index + 1, row).await })
            .buffered(concurrency)
            .collect()
            .await
    }

    async fn process_row(&self, row_number: usize, row: InputRow) -> ResultRow {
        let started = Instant::now();
        let selector = selector::resolve(&row);
        let outcome = if selector.is_resolvable() {
            self.resolver
                .resolve(&selector, self.config.row_timeout)
                .await
        } else {
            ResolutionOutcome::InvalidSelector
        };
        let result = assemble(&row, &outcome);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            ResolutionOutcome::Matched(_) | ResolutionOutcome::NoMatch => info!(
                target = "valuation.bulk",
                row = row_number,
                status = %result.match_status,
                elapsed_ms,
                "bulk_row"
            ),
            _ => warn!(
                target = "valuation.bulk",
                row = row_number,
                status = %result.match_status,
                elapsed_ms,
                "bulk_row"
            ),
        }
        crate::metrics::row_outcome(&result.match_status);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::selector::Selector;
    use crate::valuation::models::{SimpleValueResponse, Valuation};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies by APN: `match`, `missing`, `slow`, `boom`, anything else 500.
    /// Address selectors always match.
    #[derive(Default)]
    struct FakeResolver {
        calls: AtomicUsize,
        seen: Mutex<Vec<Selector>>,
        credential_missing: bool,
    }

    impl Resolve for FakeResolver {
        fn has_credential(&self) -> bool {
            !self.credential_missing
        }

        async fn resolve(&self, selector: &Selector, deadline: Duration) -> ResolutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(selector.clone());
            let apn = match selector {
                Selector::Parcel(p) => p.apn.clone(),
                Selector::Address(_) => "match".to_string(),
                Selector::Unresolvable => return ResolutionOutcome::InvalidSelector,
            };
            match apn.as_str() {
                "match" => {
                    let body: SimpleValueResponse = serde_json::from_str(
                        r#"{"data":{"estimated_value":450000},"artifacts":{"pdf_url":"https://x/y.pdf"}}"#,
                    )
                    .unwrap();
                    ResolutionOutcome::Matched(Valuation::from(body))
                }
                "missing" => ResolutionOutcome::NoMatch,
                "slow" => {
                    let work = tokio::time::sleep(deadline * 4);
                    match tokio::time::timeout(deadline, work).await {
                        Ok(()) => ResolutionOutcome::NoMatch,
                        Err(_) => ResolutionOutcome::Timeout,
                    }
                }
                "boom" => ResolutionOutcome::TransportError,
                delay if delay.starts_with("delay-") => {
                    let ms: u64 = delay["delay-".len()..].parse().unwrap();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    ResolutionOutcome::NoMatch
                }
                _ => ResolutionOutcome::UpstreamError { status: 500 },
            }
        }
    }

    fn pipeline(resolver: FakeResolver, concurrency: usize) -> (BatchPipeline<FakeResolver>, Arc<FakeResolver>) {
        let resolver = Arc::new(resolver);
        let config = BatchConfig {
            max_rows: DEFAULT_MAX_ROWS,
            row_timeout: Duration::from_millis(20),
            concurrency,
        };
        (BatchPipeline::new(resolver.clone(), config), resolver)
    }

    #[tokio::test]
    async fn every_row_yields_one_result_in_order() {
        let (pipeline, resolver) = pipeline(FakeResolver::default(), 1);
        let table = "address,city,state,zip,apn,fips\n\
1 Main St,Chicago,IL,60601,,\n\
,,,,missing,17031\n\
,,,,,\n\
,,,,slow,17031\n\
,,,,boom,17031\n\
,,,,weird,17031\n";
        let out = pipeline.run(table.as_bytes()).await.expect("batch");
        let statuses: Vec<&str> = out.rows.iter().map(|r| r.match_status.as_str()).collect();
        assert_eq!(
            statuses,
            vec![
                "matched",
                "no_match",
                "error:invalid_selector",
                "error:timeout",
                "error:unknown",
                "error:500",
            ]
        );
        assert_eq!(out.rows[1].input_apn, "missing");
        assert_eq!(out.rows[0].estimated_value, "450000");
        assert_eq!(out.rows[0].pdf_url, "https://x/y.pdf");
        // the unresolvable row never reached the resolver
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 5);
        assert_eq!(out.csv.lines().count(), 7);
    }

    #[tokio::test]
    async fn address_triple_is_sent_when_parcel_also_present() {
        let (pipeline, resolver) = pipeline(FakeResolver::default(), 1);
        let table = "Street,City,St,Zip,APN,FIPS\n\"1 Main St\",\"Chicago\",\"IL\",\"60601\",123-45-678,17031\n";
        pipeline.run(table.as_bytes()).await.expect("batch");
        let seen = resolver.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], Selector::Address(_)));
    }

    #[tokio::test]
    async fn concurrent_rows_keep_input_order() {
        let (pipeline, _) = pipeline(FakeResolver::default(), 4);
        let table = "apn,fips\ndelay-40,1\ndelay-5,2\ndelay-25,3\ndelay-1,4\n";
        let out = pipeline.run(table.as_bytes()).await.expect("batch");
        let fips: Vec<&str> = out.rows.iter().map(|r| r.input_fips.as_str()).collect();
        assert_eq!(fips, vec!["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn missing_credential_rejects_before_any_row() {
        let resolver = FakeResolver {
            credential_missing: true,
            ..FakeResolver::default()
        };
        let (pipeline, resolver) = pipeline(resolver, 1);
        let err = pipeline
            .run(b"apn,fips\nmatch,1\n")
            .await
            .expect_err("config error");
        assert_eq!(err.kind(), BatchErrorKind::Configuration);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn over_limit_rejects_before_any_row() {
        let (pipeline, resolver) = pipeline(FakeResolver::default(), 1);
        let mut table = String::from("apn,fips\n");
        for _ in 0..=DEFAULT_MAX_ROWS {
            table.push_str("match,17031\n");
        }
        let err = pipeline.run(table.as_bytes()).await.expect_err("over limit");
        assert_eq!(err.kind(), BatchErrorKind::InvalidInput);
        assert!(err.detail().contains("10000"));
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_table_is_rejected() {
        let (pipeline, _) = pipeline(FakeResolver::default(), 1);
        let err = pipeline.run(b"address,city\n").await.expect_err("empty");
        assert_eq!(err.kind(), BatchErrorKind::InvalidInput);
        assert_eq!(err.detail(), "empty input");
    }
}
