//! Reads raw work-order exports from CSV.
//!
//! The header is validated against [`REQUIRED_RAW_COLUMNS`] before any row
//! is deserialized; a missing column is a schema violation. Rows whose
//! field count does not match the header are skipped and counted.

use std::io::Read;

use pothole_record_models::{REQUIRED_RAW_COLUMNS, RawRecord};

use crate::CleanError;

/// Raw rows read from one export.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    /// Successfully deserialized rows, in file order.
    pub records: Vec<RawRecord>,
    /// Rows that could not be deserialized.
    pub unreadable_rows: usize,
}

/// Verifies that every required column is present in `headers`.
///
/// # Errors
///
/// Returns [`CleanError::MissingColumns`] listing every absent column.
pub fn validate_columns<'a>(headers: impl IntoIterator<Item = &'a str>) -> Result<(), CleanError> {
    let present: Vec<&str> = headers.into_iter().map(str::trim).collect();
    let missing: Vec<&str> = REQUIRED_RAW_COLUMNS
        .iter()
        .copied()
        .filter(|column| !present.contains(column))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(CleanError::MissingColumns {
            columns: missing.join(", "),
        })
    }
}

/// Reads every row of a raw CSV export.
///
/// # Errors
///
/// Returns [`CleanError::MissingColumns`] if the header lacks a required
/// column, or [`CleanError::Csv`] if the header itself cannot be read.
pub fn read_raw_records<R: Read>(reader: R) -> Result<RawBatch, CleanError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    validate_columns(csv_reader.headers()?.iter())?;

    let mut batch = RawBatch::default();
    for (line, row) in csv_reader.deserialize::<RawRecord>().enumerate() {
        match row {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                log::debug!("Skipping unreadable row {}: {e}", line + 2);
                batch.unreadable_rows += 1;
            }
        }
    }

    if batch.unreadable_rows > 0 {
        log::warn!(
            "Skipped {} unreadable rows ({} read)",
            batch.unreadable_rows,
            batch.records.len()
        );
    }

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "OBJECTID,WOKEY,LOCATION,ADDRDESC,WO_STATUS,INITDT,FLDSTARTDT,FLDENDDT";

    #[test]
    fn reads_rows_with_empty_fields_as_none() {
        let data = format!(
            "{HEADER}\n\
             1,WO-1,AURORA AVE N,8500 BLOCK OF AURORA AVE N,COMPLETED,01/02/2015 10:00:00 AM,,01/05/2015 10:00:00 AM\n"
        );
        let batch = read_raw_records(data.as_bytes()).unwrap();
        assert_eq!(batch.records.len(), 1);
        let row = &batch.records[0];
        assert_eq!(row.object_id.as_deref(), Some("1"));
        assert_eq!(row.status.as_deref(), Some("COMPLETED"));
        assert!(row.field_start_at.is_none());
    }

    #[test]
    fn missing_column_is_a_schema_violation() {
        let data = "OBJECTID,WOKEY,LOCATION,WO_STATUS,INITDT,FLDSTARTDT\n1,a,b,c,d,e\n";
        match read_raw_records(data.as_bytes()) {
            Err(CleanError::MissingColumns { columns }) => {
                assert_eq!(columns, "ADDRDESC, FLDENDDT");
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn skips_rows_with_wrong_field_count() {
        let data = format!("{HEADER}\n1,WO-1,LOC,ADDR,COMPLETED,2015-01-01,2015-01-01,2015-01-02\n2,short\n");
        let batch = read_raw_records(data.as_bytes()).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.unreadable_rows, 1);
    }
}
