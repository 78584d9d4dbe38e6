//! End-to-end feature pipeline.
//!
//! Stage order: clean, geocode, spatial joins, temporal aggregation,
//! reference lookups, then table assembly. Each stage consumes the full
//! output of the previous one. The geocoder is injected; reference data
//! is loaded by the caller and shared read-only.

use std::sync::Arc;

use chrono::NaiveDate;
use pothole_clean::reader::RawBatch;
use pothole_enrich::lookup::{LookupJoin, LookupTable, left_join, normalize_geoid};
use pothole_enrich::spatial_join::{JoinCounts, JoinKind, join_regions, join_streets};
use pothole_enrich::temporal::{count_concurrent, count_daily};
use pothole_features_models::{
    FeatureTable, GeocodeSummary, JoinSummary, RunSummary, StageReport,
};
use pothole_geocoder::Geocoder;
use pothole_geocoder::checkpoint::CheckpointStore;
use pothole_geocoder::progress::GeocodeProgress;
use pothole_geocoder::resolve::{GeocodeRequest, apply_outcomes, geocode_all};
use pothole_spatial::{RegionLookup, SegmentLookup};

use crate::FeatureError;
use crate::builder::{FeatureInputs, build};
use crate::config::PipelineConfig;

/// Read-only reference data for one run.
#[derive(Clone, Copy)]
pub struct ReferenceData<'a> {
    pub neighborhoods: &'a dyn RegionLookup,
    pub block_groups: &'a dyn RegionLookup,
    pub streets: &'a dyn SegmentLookup,
    /// Census tables keyed by normalized block-group GEOID.
    pub census: &'a [LookupTable<String>],
    /// Daily weather keyed by date.
    pub weather: Option<&'a LookupTable<NaiveDate>>,
}

/// The feature table and the counts gathered while building it.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub summary: RunSummary,
}

const fn join_summary(counts: JoinCounts) -> JoinSummary {
    JoinSummary {
        matched: counts.matched,
        not_found: counts.not_found,
        unknown: counts.unknown,
    }
}

/// Runs the feature pipeline with an injected geocoder.
pub struct FeaturePipeline {
    config: PipelineConfig,
    geocoder: Arc<dyn Geocoder>,
}

impl FeaturePipeline {
    #[must_use]
    pub fn new(config: PipelineConfig, geocoder: Arc<dyn Geocoder>) -> Self {
        Self { config, geocoder }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage over the rows of `raw` and returns the feature
    /// table. Rows the reader could not deserialize are reported as drops
    /// of the `read` stage.
    ///
    /// Geocoding outcomes are persisted to `checkpoint` after each batch,
    /// so a rerun with the same store resumes instead of starting over.
    ///
    /// # Errors
    ///
    /// Returns [`FeatureError`] on schema violations (duplicate record id),
    /// checkpoint I/O failures and unknown configured columns. Data
    /// quality problems are counted in the summary instead.
    pub async fn run(
        &self,
        raw: &RawBatch,
        reference: ReferenceData<'_>,
        checkpoint: &mut dyn CheckpointStore,
        progress: &dyn GeocodeProgress,
    ) -> Result<PipelineOutput, FeatureError> {
        let mut summary = RunSummary::default();

        summary.stages.push(
            StageReport::new(
                "read",
                raw.records.len() + raw.unreadable_rows,
                raw.records.len(),
            )
            .with_dropped("unreadable_row", raw.unreadable_rows),
        );

        let (records, clean_report) = pothole_clean::clean(&raw.records)?;
        let mut stage = StageReport::new("clean", clean_report.input, clean_report.kept);
        for (reason, count) in &clean_report.dropped {
            stage = stage.with_dropped(reason.to_string(), *count);
        }
        summary.stages.push(stage);

        let requests: Vec<GeocodeRequest> = records.iter().map(GeocodeRequest::from).collect();
        let geocoded = geocode_all(
            self.geocoder.as_ref(),
            &requests,
            &self.config.geocode_settings(),
            checkpoint,
            progress,
        )
        .await?;
        summary.geocode = GeocodeSummary {
            resolved: geocoded.resolved(),
            permanent_failures: geocoded.permanent_failures(),
            deferred: geocoded.deferred(),
            from_checkpoint: geocoded.from_checkpoint,
            quota_exhausted: geocoded.quota_exhausted,
        };
        let records = apply_outcomes(records, &geocoded.outcomes);
        summary.stages.push(StageReport::new(
            "geocode",
            records.len(),
            records.iter().filter(|r| r.coordinates.is_some()).count(),
        ));

        let neighborhoods = join_regions(&records, reference.neighborhoods, JoinKind::Neighborhood);
        let block_groups = join_regions(&records, reference.block_groups, JoinKind::BlockGroup);
        let streets = join_streets(
            &records,
            reference.streets,
            self.config.spatial.max_street_distance,
        );
        for (kind, counts) in [
            (JoinKind::Neighborhood, JoinCounts::from_labels(neighborhoods.values())),
            (JoinKind::BlockGroup, JoinCounts::from_labels(block_groups.values())),
            (JoinKind::Street, JoinCounts::from_matches(streets.values())),
        ] {
            summary.joins.insert(kind.to_string(), join_summary(counts));
        }

        let concurrent = count_concurrent(&records);
        let daily = count_daily(&records);

        let geoid_width = self.config.lookups.geoid_width;
        let mut lookups: Vec<LookupJoin> = reference
            .census
            .iter()
            .map(|table| {
                let keys = records.iter().map(|record| {
                    let key = block_groups
                        .get(&record.object_id)
                        .and_then(|label| label.region())
                        .and_then(|geoid| normalize_geoid(geoid, geoid_width));
                    (record.object_id, key)
                });
                left_join(table, keys)
            })
            .collect();
        if let Some(weather) = reference.weather {
            lookups.push(left_join(
                weather,
                records.iter().map(|r| (r.object_id, Some(r.start_date()))),
            ));
        }
        for join in &lookups {
            summary.lookup_misses.insert(join.table.clone(), join.missed);
        }

        let built = build(
            &FeatureInputs {
                records: &records,
                neighborhoods: &neighborhoods,
                block_groups: &block_groups,
                streets: &streets,
                concurrent: &concurrent,
                daily: &daily,
                lookups: &lookups,
            },
            &self.config,
        )?;
        summary.stages.push(built.report);
        summary.percentile_cutoff_days = built.percentile_cutoff_days;

        summary.log();

        Ok(PipelineOutput {
            table: built.table,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use geo::{LineString, MultiLineString, MultiPolygon, Polygon};
    use pothole_geocoder::checkpoint::MemoryCheckpoint;
    use pothole_geocoder::progress::NullProgress;
    use pothole_geocoder::{GeocodeError, GeocodedAddress};
    use pothole_record_models::{RawRecord, StreetAttributes};
    use pothole_spatial::{Region, RegionIndex, StreetIndex, StreetSegment};

    use super::*;

    /// Resolves every query to a fixed downtown point and counts calls.
    #[derive(Default)]
    struct FixedGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FixedGeocoder {
        async fn geocode(&self, query: &str) -> Result<Option<GeocodedAddress>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(GeocodedAddress {
                latitude: 47.62,
                longitude: -122.35,
                matched_address: Some(format!("{query}, WA")),
            }))
        }
    }

    fn raw(id: &str, status: &str, start: &str, end: &str, address: &str) -> RawRecord {
        RawRecord {
            object_id: Some(id.to_string()),
            work_order_key: Some(format!("WO-{id}")),
            location: Some(String::new()),
            address: Some(address.to_string()),
            status: Some(status.to_string()),
            initiated_at: Some(start.to_string()),
            field_start_at: None,
            field_end_at: Some(end.to_string()),
        }
    }

    fn square(id: &str) -> Region {
        Region {
            id: id.to_string(),
            geometry: MultiPolygon(vec![Polygon::new(
                LineString::from(vec![
                    (-122.4, 47.6),
                    (-122.3, 47.6),
                    (-122.3, 47.7),
                    (-122.4, 47.7),
                    (-122.4, 47.6),
                ]),
                vec![],
            )]),
        }
    }

    fn inputs() -> RawBatch {
        let records = vec![
            raw("1", "COMPLETED", "2015-01-01T08:00:00", "2015-01-04T08:00:00", "100 BLOCK OF PINE ST"),
            raw("2", "COMPLETED", "2015-01-02T08:00:00", "2015-01-03T08:00:00", "UNKNOWN"),
            raw("3", "OPEN", "2015-01-02T08:00:00", "2015-01-03T08:00:00", "200 PINE ST"),
            raw("4", "COMPLETED", "2015-01-02T08:00:00", "2015-01-02T08:00:00", "300 PINE ST"),
        ];
        RawBatch {
            records,
            unreadable_rows: 0,
        }
    }

    #[tokio::test]
    async fn runs_every_stage_and_resumes_from_checkpoint() {
        let neighborhoods = RegionIndex::new(vec![square("belltown")]);
        let block_groups = RegionIndex::new(vec![square("53033000100")]);
        let streets = StreetIndex::new(vec![StreetSegment {
            id: "s1".to_string(),
            geometry: MultiLineString(vec![LineString::from(vec![
                (-122.40, 47.6201),
                (-122.30, 47.6201),
            ])]),
            attributes: StreetAttributes {
                street_class: Some("ARTERIAL".to_string()),
                ..StreetAttributes::default()
            },
        }]);
        let mut income = LookupTable::new("income", vec!["median".to_string()]);
        income.insert("053033000100".to_string(), vec![Some(85000.0)]);
        let census = vec![income];

        let reference = ReferenceData {
            neighborhoods: &neighborhoods,
            block_groups: &block_groups,
            streets: &streets,
            census: &census,
            weather: None,
        };

        let geocoder = Arc::new(FixedGeocoder::default());
        let pipeline = FeaturePipeline::new(PipelineConfig::embedded().unwrap(), geocoder.clone());
        let mut checkpoint = MemoryCheckpoint::default();

        let output = pipeline
            .run(&inputs(), reference, &mut checkpoint, &NullProgress)
            .await
            .unwrap();

        let read = output.summary.stage("read").unwrap();
        assert_eq!(read.input, 4);
        assert!(read.dropped.is_empty());

        let clean = output.summary.stage("clean").unwrap();
        assert_eq!(clean.input, 4);
        assert_eq!(clean.output, 2);
        assert_eq!(clean.dropped["not_completed"], 1);
        assert_eq!(clean.dropped["end_not_after_start"], 1);

        assert_eq!(output.summary.geocode.resolved, 1);
        assert_eq!(output.summary.geocode.permanent_failures, 1);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(output.summary.joins["neighborhood"].matched, 1);
        assert_eq!(output.summary.joins["neighborhood"].unknown, 1);
        assert_eq!(output.summary.lookup_misses["income"], 1);

        let build = output.summary.stage("build").unwrap();
        assert_eq!(build.dropped["missing_latitude"], 1);

        let table = &output.table;
        assert_eq!(table.len(), 1);
        assert_eq!(table.cell(1, "neighborhood").unwrap().as_category(), Some("belltown"));
        assert_eq!(table.cell(1, "block_group").unwrap().as_category(), Some("53033000100"));
        assert_eq!(table.cell(1, "street_class").unwrap().as_category(), Some("ARTERIAL"));
        assert_eq!(table.cell(1, "income_median").unwrap().as_f64(), Some(85000.0));
        assert_eq!(table.cell(1, "concurrent_open").unwrap().as_f64(), Some(1.0));
        assert_eq!(table.cell(1, "exceeds_threshold").unwrap().as_f64(), Some(0.0));

        let rerun = pipeline
            .run(&inputs(), reference, &mut checkpoint, &NullProgress)
            .await
            .unwrap();
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rerun.summary.geocode.from_checkpoint, 2);
        assert_eq!(rerun.table, output.table);
    }

    #[tokio::test]
    async fn duplicate_ids_abort_the_run() {
        let empty_regions = RegionIndex::new(Vec::new());
        let empty_streets = StreetIndex::new(Vec::new());
        let reference = ReferenceData {
            neighborhoods: &empty_regions,
            block_groups: &empty_regions,
            streets: &empty_streets,
            census: &[],
            weather: None,
        };

        let mut raw_records = inputs();
        raw_records
            .records
            .push(raw("1", "COMPLETED", "2015-02-01", "2015-02-03", "1 A ST"));

        let pipeline = FeaturePipeline::new(
            PipelineConfig::embedded().unwrap(),
            Arc::new(FixedGeocoder::default()),
        );
        let result = pipeline
            .run(&raw_records, reference, &mut MemoryCheckpoint::default(), &NullProgress)
            .await;
        assert!(matches!(result, Err(FeatureError::Clean(_))));
    }

    #[tokio::test]
    async fn unreadable_rows_are_reported_as_read_drops() {
        let csv = "OBJECTID,WOKEY,LOCATION,ADDRDESC,WO_STATUS,INITDT,FLDSTARTDT,FLDENDDT\n\
                   1,WO-1,PINE ST,100 PINE ST,COMPLETED,2015-01-01,,2015-01-03\n\
                   2,truncated\n\
                   3,WO-3,PINE ST,300 PINE ST,COMPLETED,2015-01-02,,2015-01-04\n";
        let batch = pothole_clean::reader::read_raw_records(csv.as_bytes()).unwrap();

        let empty_regions = RegionIndex::new(Vec::new());
        let empty_streets = StreetIndex::new(Vec::new());
        let reference = ReferenceData {
            neighborhoods: &empty_regions,
            block_groups: &empty_regions,
            streets: &empty_streets,
            census: &[],
            weather: None,
        };
        let pipeline = FeaturePipeline::new(
            PipelineConfig::embedded().unwrap(),
            Arc::new(FixedGeocoder::default()),
        );

        let output = pipeline
            .run(&batch, reference, &mut MemoryCheckpoint::default(), &NullProgress)
            .await
            .unwrap();

        let read = output.summary.stage("read").unwrap();
        assert_eq!(read.input, 3);
        assert_eq!(read.output, 2);
        assert_eq!(read.dropped["unreadable_row"], 1);
        assert_eq!(output.summary.stage("clean").unwrap().input, 2);
    }
}
