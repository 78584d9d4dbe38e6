//! Pipeline configuration.
//!
//! A default configuration is embedded at compile time. Operators may
//! override it with a TOML file, given explicitly or through the
//! `POTHOLE_FEATURES_CONFIG` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use pothole_geocoder::resolve::GeocodeSettings;
use pothole_spatial::load::StreetAttributeFields;
use serde::{Deserialize, Serialize};

use crate::FeatureError;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV_VAR: &str = "POTHOLE_FEATURES_CONFIG";

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Target-variable settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// A repair taking longer than this many days is labeled `1`.
    pub threshold_days: f64,
    /// Percentile of the cleaned duration distribution for the auxiliary
    /// label, in `(0, 100]`.
    pub percentile: f64,
}

/// Geocoding settings, as written in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// City name appended to every query.
    pub address_suffix: String,
    /// Matched addresses treated as ambiguous.
    #[serde(default)]
    pub generic_addresses: Vec<String>,
    /// Records per batch.
    pub batch_size: usize,
    /// Concurrent calls within a batch.
    pub concurrent_requests: usize,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First retry delay in milliseconds; doubles per retry.
    pub base_backoff_ms: u64,
}

impl From<&GeocodeConfig> for GeocodeSettings {
    fn from(config: &GeocodeConfig) -> Self {
        Self {
            address_suffix: config.address_suffix.clone(),
            generic_addresses: config.generic_addresses.clone(),
            batch_size: config.batch_size,
            concurrent_requests: config.concurrent_requests,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
            base_backoff: Duration::from_millis(config.base_backoff_ms),
        }
    }
}

/// Spatial join settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialConfig {
    /// Nearest-street bound in the network's native units. Absent means
    /// unbounded.
    pub max_street_distance: Option<f64>,
}

/// Calendar feature settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Month of the fiscal-year end (1-12).
    pub fiscal_year_end_month: u32,
    /// Day of the fiscal-year end. Clamped to the month's last day.
    pub fiscal_year_end_day: u32,
}

/// Reference-table settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupConfig {
    /// Width block-group identifiers are zero-padded to.
    pub geoid_width: usize,
}

/// Column and property names in the reference files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    /// Neighborhood id property. Absent numbers neighborhoods by position.
    pub neighborhood_id_property: Option<String>,
    /// Block-group GEOID property.
    pub block_group_id_property: Option<String>,
    /// GEOID column in census tables.
    pub census_key_column: String,
    /// Date or timestamp column in weather observations.
    pub weather_date_column: String,
    /// Weather columns to average per day.
    pub weather_columns: Vec<String>,
    /// Street attribute property names.
    pub street_fields: StreetAttributeFields,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            neighborhood_id_property: None,
            block_group_id_property: Some("GEOID10".to_string()),
            census_key_column: "GEOID".to_string(),
            weather_date_column: "DATE".to_string(),
            weather_columns: vec!["TMAX".to_string(), "TMIN".to_string(), "PRCP".to_string()],
            street_fields: StreetAttributeFields::default(),
        }
    }
}

/// A point of interest for distance features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Column prefix for the distance feature.
    pub name: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub target: TargetConfig,
    pub geocode: GeocodeConfig,
    pub spatial: SpatialConfig,
    pub calendar: CalendarConfig,
    pub lookups: LookupConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
    /// Rows missing any of these columns are dropped before output.
    #[serde(default)]
    pub required_features: Vec<String>,
    /// Output columns, in order. Absent keeps every column.
    #[serde(default)]
    pub output_columns: Option<Vec<String>>,
}

impl PipelineConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::Config`] if the TOML is malformed or a
    /// value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self, FeatureError> {
        let config: Self = toml::de::from_str(text).map_err(|e| FeatureError::Config {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError::Config`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, FeatureError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Loads the configuration from `path`, else from the file named by
    /// `env_path` (normally the value of [`CONFIG_ENV_VAR`]), else the
    /// embedded default.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError`] if the chosen file cannot be read or is
    /// invalid.
    pub fn load(path: Option<&Path>, env_path: Option<PathBuf>) -> Result<Self, FeatureError> {
        let chosen = path.map(Path::to_path_buf).or(env_path);

        match chosen {
            Some(path) => {
                log::info!("Loading pipeline configuration from {}", path.display());
                let text = std::fs::read_to_string(&path)?;
                Self::from_toml_str(&text)
            }
            None => {
                log::debug!("Using embedded pipeline configuration");
                Self::embedded()
            }
        }
    }

    /// [`Self::load`] with the environment variable read from the process
    /// environment.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_from_env(path: Option<&Path>) -> Result<Self, FeatureError> {
        Self::load(path, std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from))
    }

    /// Geocoder resolver settings.
    #[must_use]
    pub fn geocode_settings(&self) -> GeocodeSettings {
        GeocodeSettings::from(&self.geocode)
    }

    fn validate(&self) -> Result<(), FeatureError> {
        let invalid = |message: String| -> Result<(), FeatureError> { Err(FeatureError::Config { message }) };

        if self.target.threshold_days.is_nan() || self.target.threshold_days <= 0.0 {
            return invalid(format!(
                "target.threshold_days must be positive, got {}",
                self.target.threshold_days
            ));
        }
        if self.target.percentile.is_nan() || self.target.percentile <= 0.0 || self.target.percentile > 100.0 {
            return invalid(format!(
                "target.percentile must be in (0, 100], got {}",
                self.target.percentile
            ));
        }
        if self.geocode.batch_size == 0 || self.geocode.concurrent_requests == 0 {
            return invalid("geocode.batch_size and geocode.concurrent_requests must be at least 1".to_string());
        }
        if chrono::NaiveDate::from_ymd_opt(2000, self.calendar.fiscal_year_end_month, self.calendar.fiscal_year_end_day)
            .is_none()
        {
            return invalid(format!(
                "calendar fiscal year end {}/{} is not a valid date",
                self.calendar.fiscal_year_end_month, self.calendar.fiscal_year_end_day
            ));
        }
        if self.lookups.geoid_width == 0 {
            return invalid("lookups.geoid_width must be at least 1".to_string());
        }
        Ok(())
    }
}
