//! Day-granularity temporal aggregation.
//!
//! A record is open on date `D` when `start_date <= D < start_date +
//! open_days`, where `open_days` is its duration rounded up to whole days.
//! Counts are computed over the full cleaned record set and joined back
//! onto records by start date.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, TimeDelta};
use pothole_record_models::Record;

/// Per-date counts. Dates that were never counted read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyCounts(BTreeMap<NaiveDate, u32>);

impl DailyCounts {
    /// Count for `date`, zero if absent.
    #[must_use]
    pub fn get(&self, date: NaiveDate) -> u32 {
        self.0.get(&date).copied().unwrap_or(0)
    }

    /// Number of dates with a stored count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates `(date, count)` in date order.
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.0.iter().map(|(date, count)| (*date, *count))
    }
}

impl FromIterator<(NaiveDate, u32)> for DailyCounts {
    fn from_iter<T: IntoIterator<Item = (NaiveDate, u32)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn open_interval(record: &Record) -> (NaiveDate, NaiveDate) {
    let start = record.start_date();
    (start, start + TimeDelta::days(record.open_days()))
}

fn distinct_start_dates(records: &[Record]) -> Vec<NaiveDate> {
    records
        .iter()
        .map(Record::start_date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Concurrent-open count for every distinct start date in `records`.
#[must_use]
pub fn count_concurrent(records: &[Record]) -> DailyCounts {
    let counts = count_concurrent_on(records, &distinct_start_dates(records));
    log::info!(
        "Concurrent-open counts: {} dates from {} records",
        counts.len(),
        records.len()
    );
    counts
}

/// Concurrent-open count for each of `dates`, by sweep line.
///
/// Interval starts and ends become `+1`/`-1` events; the events and the
/// sorted query dates are scanned together with a running counter. An
/// interval ending on `D` is already closed on `D`.
#[must_use]
pub fn count_concurrent_on(records: &[Record], dates: &[NaiveDate]) -> DailyCounts {
    let mut events: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for record in records {
        let (start, end) = open_interval(record);
        if end > start {
            *events.entry(start).or_insert(0) += 1;
            *events.entry(end).or_insert(0) -= 1;
        }
    }

    let mut queries: Vec<NaiveDate> = dates.to_vec();
    queries.sort_unstable();
    queries.dedup();

    let mut events = events.into_iter().peekable();
    let mut running: i64 = 0;

    queries
        .into_iter()
        .map(|date| {
            while let Some((_, delta)) = events.next_if(|(event, _)| *event <= date) {
                running += delta;
            }
            (date, u32::try_from(running).unwrap_or(0))
        })
        .collect()
}

/// Concurrent-open count for each of `dates` by scanning every record.
/// Reference baseline for [`count_concurrent_on`].
#[must_use]
pub fn count_concurrent_naive(records: &[Record], dates: &[NaiveDate]) -> DailyCounts {
    dates
        .iter()
        .map(|&date| {
            let open = records
                .iter()
                .filter(|record| {
                    let (start, end) = open_interval(record);
                    start <= date && date < end
                })
                .count();
            (date, u32::try_from(open).unwrap_or(u32::MAX))
        })
        .collect()
}

/// Number of records initiated on each date.
#[must_use]
pub fn count_daily(records: &[Record]) -> DailyCounts {
    let mut counts: BTreeMap<NaiveDate, u32> = BTreeMap::new();
    for record in records {
        *counts.entry(record.start_date()).or_insert(0) += 1;
    }
    DailyCounts(counts)
}
