//! Left joins against external reference tables.
//!
//! Census tables are keyed by block-group GEOID, weather by calendar date.
//! Every value column is numeric; cells that do not parse become missing
//! instead of failing the load. A join never drops or duplicates records:
//! an absent key yields a row of missing values.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::NaiveDate;
use pothole_clean::parsing::parse_timestamp;

use crate::EnrichError;

/// A numeric reference table keyed by `K`.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupTable<K: Ord> {
    name: String,
    columns: Vec<String>,
    rows: BTreeMap<K, Vec<Option<f64>>>,
}

impl<K: Ord> LookupTable<K> {
    /// Creates an empty table with the given value columns.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Adds a row. Returns `false` and keeps the existing row if the key is
    /// already present.
    ///
    /// Rows shorter than the column list are padded with missing values.
    pub fn insert(&mut self, key: K, mut values: Vec<Option<f64>>) -> bool {
        if self.rows.contains_key(&key) {
            return false;
        }
        values.resize(self.columns.len(), None);
        self.rows.insert(key, values);
        true
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value column names, in row order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// The row for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&[Option<f64>]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    /// Number of keyed rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl LookupTable<String> {
    /// Reads a census-style table from CSV.
    ///
    /// `normalize_key` maps the raw key text to the join key; rows whose
    /// key it rejects are skipped. When `value_columns` is `None` every
    /// column other than the key is loaded.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError`] if the CSV cannot be read or a named column
    /// is absent.
    pub fn from_csv_reader<R: Read>(
        name: &str,
        reader: R,
        key_column: &str,
        value_columns: Option<&[String]>,
        normalize_key: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, EnrichError> {
        let mut csv = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = csv.headers()?.clone();

        let position = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| EnrichError::MissingColumn {
                    table: name.to_string(),
                    column: column.to_string(),
                })
        };

        let key_index = position(key_column)?;
        let (columns, indexes): (Vec<String>, Vec<usize>) = match value_columns {
            Some(wanted) => wanted
                .iter()
                .map(|c| position(c).map(|i| (c.clone(), i)))
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .unzip(),
            None => headers
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != key_index)
                .map(|(i, h)| (h.to_string(), i))
                .unzip(),
        };

        let mut table = Self::new(name, columns);
        let mut skipped = 0_usize;
        let mut duplicates = 0_usize;

        for row in csv.records() {
            let row = row?;
            let Some(key) = row.get(key_index).and_then(&normalize_key) else {
                skipped += 1;
                continue;
            };
            let values = indexes
                .iter()
                .map(|&i| row.get(i).and_then(parse_number))
                .collect();
            if !table.insert(key, values) {
                duplicates += 1;
            }
        }

        if skipped > 0 {
            log::warn!("Lookup '{name}': skipped {skipped} rows with an unusable key");
        }
        if duplicates > 0 {
            log::warn!("Lookup '{name}': {duplicates} duplicate keys, kept first occurrence");
        }
        log::info!(
            "Loaded lookup '{name}': {} rows, {} columns",
            table.len(),
            table.columns.len()
        );

        Ok(table)
    }
}

/// Parses a numeric cell; blanks and non-numeric text are missing.
#[must_use]
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().replace(',', "");
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalizes a census GEOID to a zero-padded string of `width` digits.
///
/// Accepts integral float renderings (`"530330001001.0"`). Returns `None`
/// for empty or non-numeric input and for identifiers wider than `width`.
#[must_use]
pub fn normalize_geoid(raw: &str, width: usize) -> Option<String> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_suffix(".0")
        .unwrap_or(trimmed)
        .trim_start_matches('0');

    if !digits.chars().all(|c| c.is_ascii_digit()) || digits.len() > width {
        return None;
    }
    if digits.is_empty() && !trimmed.starts_with('0') {
        return None;
    }

    Some(format!("{digits:0>width$}"))
}

/// Result of left-joining a set of keyed records against a table.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupJoin {
    /// Name of the joined table.
    pub table: String,
    /// Joined value columns.
    pub columns: Vec<String>,
    /// One row per input record, keyed by record id.
    pub rows: BTreeMap<i64, Vec<Option<f64>>>,
    /// Records whose key was absent from the table (or had no key).
    pub missed: usize,
}

impl LookupJoin {
    /// Joined values for a record. Unknown ids read as all-missing.
    #[must_use]
    pub fn values(&self, object_id: i64) -> Vec<Option<f64>> {
        self.rows
            .get(&object_id)
            .cloned()
            .unwrap_or_else(|| vec![None; self.columns.len()])
    }
}

/// Left-joins `(record id, key)` pairs against `table`.
///
/// A `None` key (e.g. a record outside every block group) is a miss.
#[must_use]
pub fn left_join<K: Ord>(
    table: &LookupTable<K>,
    keys: impl IntoIterator<Item = (i64, Option<K>)>,
) -> LookupJoin {
    let width = table.columns.len();
    let mut missed = 0;

    let rows: BTreeMap<i64, Vec<Option<f64>>> = keys
        .into_iter()
        .map(|(object_id, key)| {
            let values = key.as_ref().and_then(|k| table.get(k)).map_or_else(
                || {
                    missed += 1;
                    vec![None; width]
                },
                <[Option<f64>]>::to_vec,
            );
            (object_id, values)
        })
        .collect();

    log::info!(
        "Lookup '{}': {} of {} records matched",
        table.name,
        rows.len() - missed,
        rows.len()
    );

    LookupJoin {
        table: table.name.clone(),
        columns: table.columns.clone(),
        rows,
        missed,
    }
}

/// One sub-daily weather observation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherObservation {
    /// Observation date.
    pub date: NaiveDate,
    /// Values aligned with the weather columns.
    pub values: Vec<Option<f64>>,
}

/// Aggregates observations to one row per date by taking the mean of the
/// non-missing values in each column.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn daily_weather(
    name: &str,
    columns: Vec<String>,
    observations: impl IntoIterator<Item = WeatherObservation>,
) -> LookupTable<NaiveDate> {
    let width = columns.len();
    let mut sums: BTreeMap<NaiveDate, Vec<(f64, usize)>> = BTreeMap::new();

    for observation in observations {
        let acc = sums
            .entry(observation.date)
            .or_insert_with(|| vec![(0.0, 0); width]);
        for (slot, value) in acc.iter_mut().zip(observation.values) {
            if let Some(v) = value {
                slot.0 += v;
                slot.1 += 1;
            }
        }
    }

    let mut table = LookupTable::new(name, columns);
    for (date, acc) in sums {
        let means = acc
            .into_iter()
            .map(|(sum, n)| (n > 0).then(|| sum / n as f64))
            .collect();
        table.insert(date, means);
    }
    table
}

/// Reads weather observations from CSV and aggregates them to daily
/// means. The date column may hold dates or timestamps.
///
/// # Errors
///
/// Returns [`EnrichError`] if the CSV cannot be read or a named column
/// is absent.
pub fn read_weather<R: Read>(
    name: &str,
    reader: R,
    date_column: &str,
    value_columns: &[String],
) -> Result<LookupTable<NaiveDate>, EnrichError> {
    let mut csv = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv.headers()?.clone();

    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| EnrichError::MissingColumn {
                table: name.to_string(),
                column: column.to_string(),
            })
    };
    let date_index = position(date_column)?;
    let indexes = value_columns
        .iter()
        .map(|c| position(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut observations = Vec::new();
    let mut unparseable = 0_usize;
    for row in csv.records() {
        let row = row?;
        let Some(date) = row
            .get(date_index)
            .and_then(parse_timestamp)
            .map(|ts| ts.date())
        else {
            unparseable += 1;
            continue;
        };
        observations.push(WeatherObservation {
            date,
            values: indexes
                .iter()
                .map(|&i| row.get(i).and_then(parse_number))
                .collect(),
        });
    }

    if unparseable > 0 {
        log::warn!("Weather '{name}': skipped {unparseable} rows with an unparseable date");
    }

    let table = daily_weather(name, value_columns.to_vec(), observations);
    log::info!("Loaded weather '{name}': {} days", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CENSUS: &str = "\
GEOID,median_income,housing_units
530330001001,85000,412
530330001002,not available,380
53033000100.0,1000,1
";

    fn census() -> LookupTable<String> {
        LookupTable::from_csv_reader("income", CENSUS.as_bytes(), "GEOID", None, |raw| {
            normalize_geoid(raw, 12)
        })
        .unwrap()
    }

    #[test]
    fn pads_and_normalizes_geoids() {
        assert_eq!(normalize_geoid("530330001001", 12).as_deref(), Some("530330001001"));
        assert_eq!(normalize_geoid("53033000100", 12).as_deref(), Some("053033000100"));
        assert_eq!(normalize_geoid("530330001001.0", 12).as_deref(), Some("530330001001"));
        assert_eq!(normalize_geoid("0", 3).as_deref(), Some("000"));
        assert_eq!(normalize_geoid("", 12), None);
        assert_eq!(normalize_geoid("53-033", 12), None);
        assert_eq!(normalize_geoid("1234567890123", 12), None);
    }

    #[test]
    fn unparseable_numbers_become_missing() {
        let table = census();
        assert_eq!(table.columns(), ["median_income", "housing_units"]);
        assert_eq!(
            table.get(&"530330001002".to_string()),
            Some([None, Some(380.0)].as_slice())
        );
        assert_eq!(
            table.get(&"053033000100".to_string()),
            Some([Some(1000.0), Some(1.0)].as_slice())
        );
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = LookupTable::from_csv_reader("income", CENSUS.as_bytes(), "TRACT", None, |raw| {
            Some(raw.to_string())
        })
        .unwrap_err();
        assert!(matches!(err, EnrichError::MissingColumn { column, .. } if column == "TRACT"));
    }

    #[test]
    fn left_join_preserves_every_record() {
        let table = census();
        let keys = vec![
            (1, Some("530330001001".to_string())),
            (2, Some("999999999999".to_string())),
            (3, None),
        ];
        let joined = left_join(&table, keys);
        assert_eq!(joined.rows.len(), 3);
        assert_eq!(joined.missed, 2);
        assert_eq!(joined.values(1), vec![Some(85000.0), Some(412.0)]);
        assert_eq!(joined.values(2), vec![None, None]);
        assert_eq!(joined.values(3), vec![None, None]);
    }

    #[test]
    fn empty_table_makes_every_row_missing() {
        let table: LookupTable<String> = LookupTable::new("empty", vec!["a".to_string()]);
        let joined = left_join(&table, (0..5).map(|id| (id, Some(id.to_string()))));
        assert_eq!(joined.rows.len(), 5);
        assert_eq!(joined.missed, 5);
        assert!(joined.rows.values().all(|row| row == &vec![None]));
    }

    #[test]
    fn duplicate_keys_keep_first_row() {
        let csv = "GEOID,v\n1,10\n1,20\n";
        let table =
            LookupTable::from_csv_reader("dup", csv.as_bytes(), "GEOID", None, |raw| normalize_geoid(raw, 2))
                .unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&"01".to_string()), Some([Some(10.0)].as_slice()));
    }

    #[test]
    fn weather_is_averaged_per_day() {
        let csv = "\
DATE,TEMP,PRCP
2015-01-02T00:00:00,40,0.1
2015-01-02T12:00:00,50,
2015-01-03,35,0.0
garbage,1,1
";
        let columns = vec!["TEMP".to_string(), "PRCP".to_string()];
        let table = read_weather("weather", csv.as_bytes(), "DATE", &columns).unwrap();
        assert_eq!(table.len(), 2);

        let jan2 = NaiveDate::from_ymd_opt(2015, 1, 2).unwrap();
        let row = table.get(&jan2).unwrap();
        assert!((row[0].unwrap() - 45.0).abs() < 1e-9);
        assert!((row[1].unwrap() - 0.1).abs() < 1e-9);

        let joined = left_join(
            &table,
            vec![(7, Some(jan2)), (8, NaiveDate::from_ymd_opt(2015, 2, 1))],
        );
        assert_eq!(joined.missed, 1);
        assert_eq!(joined.values(8), vec![None, None]);
    }

    #[test]
    fn all_missing_day_stays_missing() {
        let jan2 = NaiveDate::from_ymd_opt(2015, 1, 2).unwrap();
        let table = daily_weather(
            "weather",
            vec!["TEMP".to_string()],
            vec![WeatherObservation {
                date: jan2,
                values: vec![None],
            }],
        );
        assert_eq!(table.get(&jan2), Some([None].as_slice()));
    }
}
