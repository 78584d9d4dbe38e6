//! Batched geocoding with retry, timeout and checkpointing.
//!
//! Records are submitted in bounded batches. Within a batch up to
//! `concurrent_requests` calls run at once; completion order does not
//! matter because results are keyed by record id. After every batch the
//! final outcomes are written to the checkpoint, so an interrupted run
//! resumes from the last completed batch.
//!
//! A call that exceeds the timeout, hits a rate limit or fails in
//! transport is retried with exponential backoff (`base_backoff`,
//! doubling). A quota error is not retried: the record is deferred and no
//! further batches are submitted.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::stream::{self, StreamExt as _};
use pothole_record_models::{Coordinates, Record};

use crate::address::{build_query, is_generic_result};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::progress::GeocodeProgress;
use crate::{DeferReason, GeocodeError, GeocodeOutcome, Geocoder};

/// Tuning for a geocoding run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeSettings {
    /// City name appended to every query (e.g. `"Seattle"`).
    pub address_suffix: String,
    /// Matched addresses treated as ambiguous (bare city centroid).
    pub generic_addresses: Vec<String>,
    /// Records per batch.
    pub batch_size: usize,
    /// Concurrent calls within a batch.
    pub concurrent_requests: usize,
    /// Timeout for each individual call.
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_backoff: Duration,
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            address_suffix: "Seattle".to_string(),
            generic_addresses: vec!["Seattle, WA, USA".to_string()],
            batch_size: 500,
            concurrent_requests: 4,
            timeout: Duration::from_secs(10),
            max_retries: 5,
            base_backoff: Duration::from_secs(2),
        }
    }
}

/// A record to geocode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeocodeRequest {
    /// Stable record identifier.
    pub object_id: i64,
    /// Raw address description.
    pub address: String,
}

impl From<&Record> for GeocodeRequest {
    fn from(record: &Record) -> Self {
        Self {
            object_id: record.object_id,
            address: record.address.clone(),
        }
    }
}

/// Outcomes and counters for a geocoding run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeocodeReport {
    /// Outcome per record id, for every requested record.
    pub outcomes: BTreeMap<i64, GeocodeOutcome>,
    /// Records whose outcome was taken from the checkpoint.
    pub from_checkpoint: usize,
    /// Records submitted to the geocoder in this run.
    pub submitted: usize,
    /// Whether the run stopped submitting because of a quota error.
    pub quota_exhausted: bool,
}

impl GeocodeReport {
    /// Number of records with coordinates.
    #[must_use]
    pub fn resolved(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.coordinates().is_some())
            .count()
    }

    /// Number of records that failed permanently.
    #[must_use]
    pub fn permanent_failures(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| o.is_permanent_failure())
            .count()
    }

    /// Number of records left for a later run.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.outcomes.values().filter(|o| !o.is_final()).count()
    }
}

/// Geocodes every request, reusing checkpointed outcomes.
///
/// # Errors
///
/// Returns [`CheckpointError`] if the checkpoint cannot be read or
/// written. Geocoder failures never abort the run.
pub async fn geocode_all(
    geocoder: &dyn Geocoder,
    requests: &[GeocodeRequest],
    settings: &GeocodeSettings,
    checkpoint: &mut dyn CheckpointStore,
    progress: &dyn GeocodeProgress,
) -> Result<GeocodeReport, CheckpointError> {
    let prior = checkpoint.load()?;
    let mut report = GeocodeReport::default();
    let mut pending: Vec<&GeocodeRequest> = Vec::new();

    for request in requests {
        match prior.get(&request.object_id) {
            Some(outcome) if outcome.is_final() => {
                report.outcomes.insert(request.object_id, outcome.clone());
                report.from_checkpoint += 1;
            }
            _ => pending.push(request),
        }
    }

    if report.from_checkpoint > 0 {
        log::info!(
            "Checkpoint: {} records already geocoded, {} remaining",
            report.from_checkpoint,
            pending.len()
        );
    }

    progress.started(pending.len() as u64, report.from_checkpoint as u64);

    let batch_size = settings.batch_size.max(1);
    let concurrency = settings.concurrent_requests.max(1);
    let batch_count = pending.len().div_ceil(batch_size);

    for (batch_index, batch) in pending.chunks(batch_size).enumerate() {
        if report.quota_exhausted {
            for request in batch {
                report.outcomes.insert(
                    request.object_id,
                    GeocodeOutcome::Deferred {
                        reason: DeferReason::NotSubmitted,
                    },
                );
            }
            continue;
        }

        log::info!(
            "Geocoding batch {}/{batch_count} ({} addresses)",
            batch_index + 1,
            batch.len()
        );
        progress.batch_started(batch_index + 1, batch_count);

        let results: Vec<(i64, GeocodeOutcome)> = stream::iter(batch.iter().map(|request| async move {
            (request.object_id, geocode_one(geocoder, &request.address, settings).await)
        }))
        .buffer_unordered(concurrency)
        .inspect(|_| progress.record_finished())
        .collect()
        .await;

        report.submitted += batch.len();

        if results.iter().any(|(_, outcome)| {
            matches!(
                outcome,
                GeocodeOutcome::Deferred {
                    reason: DeferReason::QuotaExceeded
                }
            )
        }) {
            log::warn!("Geocoding quota exhausted; no further batches will be submitted");
            report.quota_exhausted = true;
        }

        checkpoint.record(&results)?;
        report.outcomes.extend(results);
    }

    progress.finished(
        report.resolved(),
        report.permanent_failures(),
        report.deferred(),
    );

    log::info!(
        "Geocoding: {} resolved, {} permanent failures, {} deferred ({} from checkpoint)",
        report.resolved(),
        report.permanent_failures(),
        report.deferred(),
        report.from_checkpoint
    );

    Ok(report)
}

/// Geocodes one address, applying timeout, retry and result
/// classification.
pub async fn geocode_one(
    geocoder: &dyn Geocoder,
    address: &str,
    settings: &GeocodeSettings,
) -> GeocodeOutcome {
    let Some(query) = build_query(address, &settings.address_suffix) else {
        log::debug!("Not geocodable: '{address}'");
        return GeocodeOutcome::NotGeocodable;
    };

    let mut last_reason = DeferReason::Transport;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let delay = settings
                .base_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            log::warn!("  retry {attempt}/{} for '{query}' in {delay:?}...", settings.max_retries);
            tokio::time::sleep(delay).await;
        }

        let result = tokio::time::timeout(settings.timeout, geocoder.geocode(&query))
            .await
            .unwrap_or(Err(GeocodeError::Timeout(settings.timeout)));

        match result {
            Ok(Some(found)) => {
                if found
                    .matched_address
                    .as_deref()
                    .is_some_and(|matched| is_generic_result(matched, &settings.generic_addresses))
                {
                    log::debug!("Generic city-level match for '{query}'");
                    return GeocodeOutcome::Ambiguous;
                }
                return GeocodeOutcome::Resolved {
                    latitude: found.latitude,
                    longitude: found.longitude,
                    address: found.matched_address,
                };
            }
            Ok(None) => {
                log::debug!("No match for '{query}'");
                return GeocodeOutcome::NotFound;
            }
            Err(e) if !e.is_transient() => {
                log::debug!("Permanent failure for '{query}': {e}");
                return GeocodeOutcome::Ambiguous;
            }
            Err(GeocodeError::QuotaExceeded) => {
                return GeocodeOutcome::Deferred {
                    reason: DeferReason::QuotaExceeded,
                };
            }
            Err(e) => {
                log::warn!("  transient error for '{query}': {e}");
                last_reason = e.defer_reason();
            }
        }
    }

    GeocodeOutcome::Deferred {
        reason: last_reason,
    }
}

/// Writes resolved coordinates and addresses onto records by id.
/// Records without a resolved outcome keep `coordinates: None`.
#[must_use]
pub fn apply_outcomes(records: Vec<Record>, outcomes: &BTreeMap<i64, GeocodeOutcome>) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            if let Some(GeocodeOutcome::Resolved {
                latitude,
                longitude,
                address,
            }) = outcomes.get(&record.object_id)
            {
                record.coordinates = Some(Coordinates::new(*latitude, *longitude));
                record.resolved_address.clone_from(address);
            }
            record
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::GeocodedAddress;
    use crate::checkpoint::MemoryCheckpoint;
    use crate::progress::NullProgress;

    type Scripted = Result<Option<GeocodedAddress>, GeocodeError>;

    /// Replays scripted responses per query; unscripted queries resolve to
    /// a fixed point.
    #[derive(Default)]
    struct ScriptedGeocoder {
        scripts: Mutex<BTreeMap<String, VecDeque<Scripted>>>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl ScriptedGeocoder {
        fn script(self, query: &str, responses: Vec<Scripted>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(query.to_string(), responses.into());
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Geocoder for ScriptedGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let next = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(query)
                .and_then(VecDeque::pop_front);
            next.unwrap_or_else(|| Ok(found(47.6, -122.3, "somewhere, Seattle, WA")))
        }
    }

    fn found(latitude: f64, longitude: f64, address: &str) -> Option<GeocodedAddress> {
        Some(GeocodedAddress {
            latitude,
            longitude,
            matched_address: Some(address.to_string()),
        })
    }

    fn fast_settings() -> GeocodeSettings {
        GeocodeSettings {
            batch_size: 2,
            concurrent_requests: 2,
            timeout: Duration::from_millis(200),
            max_retries: 2,
            base_backoff: Duration::from_millis(1),
            ..GeocodeSettings::default()
        }
    }

    fn request(object_id: i64, address: &str) -> GeocodeRequest {
        GeocodeRequest {
            object_id,
            address: address.to_string(),
        }
    }

    #[tokio::test]
    async fn resolves_and_classifies_each_record() {
        let geocoder = ScriptedGeocoder::default()
            .script("100 PINE ST Seattle", vec![Ok(found(47.61, -122.34, "100 Pine St"))])
            .script("1 NOWHERE RD Seattle", vec![Ok(None)])
            .script("5 MAIN ST Seattle", vec![Ok(found(47.6, -122.33, "Seattle, WA, USA"))]);
        let requests = vec![
            request(1, "100 PINE ST"),
            request(2, "1 NOWHERE RD"),
            request(3, "5 MAIN ST"),
            request(4, "unknown"),
        ];

        let mut checkpoint = MemoryCheckpoint::default();
        let report = geocode_all(&geocoder, &requests, &fast_settings(), &mut checkpoint, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.outcomes[&1].coordinates(), Some((47.61, -122.34)));
        assert_eq!(report.outcomes[&2], GeocodeOutcome::NotFound);
        assert_eq!(report.outcomes[&3], GeocodeOutcome::Ambiguous);
        assert_eq!(report.outcomes[&4], GeocodeOutcome::NotGeocodable);
        assert_eq!(report.resolved(), 1);
        assert_eq!(report.permanent_failures(), 3);
        assert_eq!(geocoder.calls(), 3);
    }

    /// Records every progress event as text.
    #[derive(Default)]
    struct RecordingProgress {
        events: Mutex<Vec<String>>,
    }

    impl GeocodeProgress for RecordingProgress {
        fn started(&self, pending: u64, from_checkpoint: u64) {
            self.events
                .lock()
                .unwrap()
                .push(format!("started {pending} {from_checkpoint}"));
        }

        fn batch_started(&self, batch: usize, batches: usize) {
            self.events.lock().unwrap().push(format!("batch {batch}/{batches}"));
        }

        fn record_finished(&self) {
            self.events.lock().unwrap().push("record".to_string());
        }

        fn finished(&self, resolved: usize, failed: usize, deferred: usize) {
            self.events
                .lock()
                .unwrap()
                .push(format!("finished {resolved} {failed} {deferred}"));
        }
    }

    #[tokio::test]
    async fn reports_progress_per_batch_and_record() {
        let geocoder = ScriptedGeocoder::default().script("1 NOWHERE RD Seattle", vec![Ok(None)]);
        let requests = vec![
            request(1, "100 PINE ST"),
            request(2, "1 NOWHERE RD"),
            request(3, "200 PINE ST"),
        ];

        let progress = RecordingProgress::default();
        geocode_all(
            &geocoder,
            &requests,
            &fast_settings(),
            &mut MemoryCheckpoint::default(),
            &progress,
        )
        .await
        .unwrap();

        assert_eq!(
            *progress.events.lock().unwrap(),
            vec![
                "started 3 0",
                "batch 1/2",
                "record",
                "record",
                "batch 2/2",
                "record",
                "finished 2 1 0",
            ]
        );
    }

    #[tokio::test]
    async fn retries_transient_errors_then_succeeds() {
        let geocoder = ScriptedGeocoder::default().script(
            "100 PINE ST Seattle",
            vec![
                Err(GeocodeError::RateLimited),
                Err(GeocodeError::Transport {
                    message: "connection reset".to_string(),
                }),
                Ok(found(47.61, -122.34, "100 Pine St")),
            ],
        );

        let outcome = geocode_one(&geocoder, "100 PINE ST", &fast_settings()).await;
        assert_eq!(outcome.coordinates(), Some((47.61, -122.34)));
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_final_without_retry() {
        let geocoder = ScriptedGeocoder::default().script(
            "5 MAIN ST Seattle",
            vec![
                Err(GeocodeError::Ambiguous { candidates: 4 }),
                Ok(found(47.61, -122.34, "5 Main St")),
            ],
        );
        let requests = vec![request(7, "5 MAIN ST")];

        let mut checkpoint = MemoryCheckpoint::default();
        let report = geocode_all(&geocoder, &requests, &fast_settings(), &mut checkpoint, &NullProgress)
            .await
            .unwrap();

        assert_eq!(report.outcomes[&7], GeocodeOutcome::Ambiguous);
        assert_eq!(report.permanent_failures(), 1);
        assert_eq!(report.deferred(), 0);
        assert_eq!(geocoder.calls(), 1);
        assert_eq!(
            checkpoint.load().unwrap().get(&7),
            Some(&GeocodeOutcome::Ambiguous)
        );
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_and_defers() {
        let geocoder = ScriptedGeocoder::default().script(
            "100 PINE ST Seattle",
            vec![
                Err(GeocodeError::RateLimited),
                Err(GeocodeError::RateLimited),
                Err(GeocodeError::RateLimited),
                Ok(found(47.61, -122.34, "100 Pine St")),
            ],
        );

        let outcome = geocode_one(&geocoder, "100 PINE ST", &fast_settings()).await;
        assert_eq!(
            outcome,
            GeocodeOutcome::Deferred {
                reason: DeferReason::RateLimited
            }
        );
        assert_eq!(geocoder.calls(), 3);
    }

    #[tokio::test]
    async fn timed_out_calls_are_deferred_not_fatal() {
        let geocoder = ScriptedGeocoder {
            delay: Some(Duration::from_millis(500)),
            ..ScriptedGeocoder::default()
        };
        let settings = GeocodeSettings {
            timeout: Duration::from_millis(20),
            max_retries: 1,
            ..fast_settings()
        };

        let outcome = geocode_one(&geocoder, "100 PINE ST", &settings).await;
        assert_eq!(
            outcome,
            GeocodeOutcome::Deferred {
                reason: DeferReason::Timeout
            }
        );
    }

    #[tokio::test]
    async fn quota_error_stops_later_batches() {
        let geocoder = ScriptedGeocoder::default()
            .script("2 B ST Seattle", vec![Err(GeocodeError::QuotaExceeded)]);
        let requests = vec![
            request(1, "1 A ST"),
            request(2, "2 B ST"),
            request(3, "3 C ST"),
            request(4, "4 D ST"),
        ];

        let mut checkpoint = MemoryCheckpoint::default();
        let report = geocode_all(&geocoder, &requests, &fast_settings(), &mut checkpoint, &NullProgress)
            .await
            .unwrap();

        assert!(report.quota_exhausted);
        assert_eq!(report.submitted, 2);
        assert_eq!(geocoder.calls(), 2);
        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(
            report.outcomes[&2],
            GeocodeOutcome::Deferred {
                reason: DeferReason::QuotaExceeded
            }
        );
        assert_eq!(
            report.outcomes[&3],
            GeocodeOutcome::Deferred {
                reason: DeferReason::NotSubmitted
            }
        );
        assert_eq!(report.deferred(), 3);
    }

    #[tokio::test]
    async fn resumes_from_checkpoint_and_retries_deferred() {
        let requests = vec![request(1, "1 A ST"), request(2, "2 B ST"), request(3, "3 C ST")];
        let mut checkpoint = MemoryCheckpoint::default();

        let first = ScriptedGeocoder::default()
            .script("2 B ST Seattle", vec![Err(GeocodeError::QuotaExceeded)]);
        let settings = GeocodeSettings {
            batch_size: 1,
            ..fast_settings()
        };
        let report = geocode_all(&first, &requests, &settings, &mut checkpoint, &NullProgress)
            .await
            .unwrap();
        assert_eq!(report.resolved(), 1);
        assert_eq!(report.deferred(), 2);

        let second = ScriptedGeocoder::default();
        let report = geocode_all(&second, &requests, &settings, &mut checkpoint, &NullProgress)
            .await
            .unwrap();
        assert_eq!(report.from_checkpoint, 1);
        assert_eq!(report.resolved(), 3);
        assert_eq!(second.calls(), 2);
    }

    #[test]
    fn applies_outcomes_by_record_id() {
        let start = chrono::NaiveDate::from_ymd_opt(2015, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let record = |object_id| Record {
            object_id,
            work_order_key: String::new(),
            location: String::new(),
            address: String::new(),
            initiated_at: start,
            field_start_at: None,
            field_end_at: start + chrono::TimeDelta::days(1),
            duration: chrono::TimeDelta::days(1),
            coordinates: None,
            resolved_address: None,
        };

        let mut outcomes = BTreeMap::new();
        outcomes.insert(
            2,
            GeocodeOutcome::Resolved {
                latitude: 47.6,
                longitude: -122.3,
                address: Some("2 B St".to_string()),
            },
        );
        outcomes.insert(1, GeocodeOutcome::NotFound);

        let records = apply_outcomes(vec![record(1), record(2), record(3)], &outcomes);
        assert!(records[0].coordinates.is_none());
        assert_eq!(records[1].coordinates, Some(Coordinates::new(47.6, -122.3)));
        assert_eq!(records[1].resolved_address.as_deref(), Some("2 B St"));
        assert!(records[2].coordinates.is_none());
    }
}
