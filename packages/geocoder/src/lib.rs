#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Forward geocoding of pothole work-order addresses.
//!
//! The actual address resolver is an external service and is injected
//! through the [`Geocoder`] trait. This crate owns everything around it:
//!
//! - address cleaning and query construction ([`address`])
//! - bounded batches with per-call timeouts, retry with exponential
//!   backoff, and quota handling ([`resolve`])
//! - partial-progress checkpoints so an interrupted run resumes where it
//!   stopped ([`checkpoint`])
//!
//! Transient failures (rate limiting, quota, timeouts, transport errors)
//! leave a record deferred for a later run. Permanent failures (no match,
//! ambiguous or generic match, unusable address) are final.

pub mod address;
pub mod checkpoint;
pub mod progress;
pub mod resolve;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display};
use thiserror::Error;

/// A geocoding result with coordinates and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The matched/canonical address returned by the geocoder.
    pub matched_address: Option<String>,
}

/// Errors from a single geocoder call.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Daily or account quota exhausted.
    #[error("Quota exceeded")]
    QuotaExceeded,

    /// The call did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Network or service failure.
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the failure.
        message: String,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The service returned several equally plausible matches.
    #[error("Ambiguous result: {candidates} candidates")]
    Ambiguous {
        /// Number of candidate matches.
        candidates: usize,
    },
}

impl GeocodeError {
    /// Whether a later attempt might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Ambiguous { .. })
    }

    const fn defer_reason(&self) -> DeferReason {
        match self {
            Self::RateLimited => DeferReason::RateLimited,
            Self::QuotaExceeded => DeferReason::QuotaExceeded,
            Self::Timeout(_) => DeferReason::Timeout,
            Self::Transport { .. } | Self::Parse { .. } | Self::Ambiguous { .. } => {
                DeferReason::Transport
            }
        }
    }
}

/// Forward geocoding capability: address text to coordinates.
///
/// Implementations return `Ok(None)` when the service finds no match.
/// They should not retry internally; retry, timeout and backoff policy
/// is applied by [`resolve::geocode_all`].
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Resolves a single free-form address query.
    async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError>;
}

/// Why a record was left for a later run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeferReason {
    /// Rate limited on every attempt.
    RateLimited,
    /// The service quota is exhausted.
    QuotaExceeded,
    /// Every attempt timed out.
    Timeout,
    /// Network, service or response failure on every attempt.
    Transport,
    /// Never submitted because an earlier batch exhausted the quota.
    NotSubmitted,
}

/// Final or provisional geocoding result for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GeocodeOutcome {
    /// Coordinates were found.
    Resolved {
        latitude: f64,
        longitude: f64,
        address: Option<String>,
    },
    /// The service found no match.
    NotFound,
    /// The match was ambiguous or only the generic city-level result.
    Ambiguous,
    /// The address text cannot be geocoded.
    NotGeocodable,
    /// A transient failure; the record should be retried later.
    Deferred {
        reason: DeferReason,
    },
}

impl GeocodeOutcome {
    /// Whether the outcome will not change on a later run.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Deferred { .. })
    }

    /// Whether the record failed permanently.
    #[must_use]
    pub const fn is_permanent_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::Ambiguous | Self::NotGeocodable)
    }

    /// Resolved `(latitude, longitude)`, if any.
    #[must_use]
    pub const fn coordinates(&self) -> Option<(f64, f64)> {
        match self {
            Self::Resolved {
                latitude,
                longitude,
                ..
            } => Some((*latitude, *longitude)),
            _ => None,
        }
    }
}
