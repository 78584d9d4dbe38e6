//! Progress reporting for geocoding runs.
//!
//! [`resolve::geocode_all`](crate::resolve::geocode_all) reports through
//! this trait so the rendering backend stays outside the library. The
//! `indicatif` implementation lives in `pothole_cli_utils`.

/// Receives progress events from a geocoding run.
///
/// Events arrive from a single task, in order: one `started`, then for
/// each submitted batch a `batch_started` followed by one
/// `record_finished` per record, then one `finished`.
pub trait GeocodeProgress: Send + Sync {
    /// `pending` records need a geocoder call; `from_checkpoint` were
    /// already final.
    fn started(&self, pending: u64, from_checkpoint: u64);

    /// Batch `batch` (1-based) of `batches` is being submitted.
    fn batch_started(&self, batch: usize, batches: usize);

    /// One record of the current batch has an outcome.
    fn record_finished(&self);

    /// The run is over; counts cover every requested record.
    fn finished(&self, resolved: usize, failed: usize, deferred: usize);
}

/// Discards every event.
pub struct NullProgress;

impl GeocodeProgress for NullProgress {
    fn started(&self, _pending: u64, _from_checkpoint: u64) {}
    fn batch_started(&self, _batch: usize, _batches: usize) {}
    fn record_finished(&self) {}
    fn finished(&self, _resolved: usize, _failed: usize, _deferred: usize) {}
}
