#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator tooling for binaries that embed the feature pipeline.
//!
//! [`GeocodeBar`] renders a geocoding run through the
//! [`GeocodeProgress`] trait. [`init_logger`] routes `pretty_env_logger`
//! through `indicatif-log-bridge` so log lines are suspended while the bar
//! redraws.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use pothole_geocoder::progress::GeocodeProgress;

pub use indicatif::MultiProgress;

/// A spinner that becomes a bar once the number of pending records is
/// known.
pub struct GeocodeBar {
    bar: ProgressBar,
    bar_style: ProgressStyle,
}

impl GeocodeBar {
    /// Adds the bar to `multi`.
    #[must_use]
    pub fn new(multi: &MultiProgress) -> Self {
        Self::with_bar(multi.add(ProgressBar::new_spinner()))
    }

    fn with_bar(bar: ProgressBar) -> Self {
        bar.enable_steady_tick(Duration::from_millis(100));
        bar.set_style(
            ProgressStyle::with_template("{spinner:.yellow} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("geocoding");

        let bar_style = ProgressStyle::with_template(
            "  {msg} {wide_bar:.yellow/dim} {pos}/{len} {percent}% [{eta}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

        Self { bar, bar_style }
    }
}

impl GeocodeProgress for GeocodeBar {
    fn started(&self, pending: u64, from_checkpoint: u64) {
        self.bar.set_length(pending);
        self.bar.set_position(0);
        self.bar.set_style(self.bar_style.clone());
        if from_checkpoint > 0 {
            self.bar
                .set_message(format!("geocoding ({from_checkpoint} from checkpoint)"));
        }
    }

    fn batch_started(&self, batch: usize, batches: usize) {
        self.bar.set_message(format!("batch {batch}/{batches}"));
    }

    fn record_finished(&self) {
        self.bar.inc(1);
    }

    fn finished(&self, resolved: usize, failed: usize, deferred: usize) {
        self.bar.finish_with_message(format!(
            "{resolved} resolved, {failed} failed, {deferred} deferred"
        ));
    }
}

/// Initializes the global logger wrapped in `indicatif-log-bridge`.
/// The filter is read from `RUST_LOG`.
///
/// Returns the [`MultiProgress`] that progress bars must be added to.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    // A logger may already be installed, e.g. by another test.
    indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .ok();

    log::set_max_level(level);

    multi
}
