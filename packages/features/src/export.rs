//! CSV export of the feature table.

use std::io::Write;

use pothole_features_models::FeatureTable;

use crate::FeatureError;

/// Header of the record-id column written before every feature column.
pub const ID_COLUMN: &str = "OBJECTID";

/// Writes the table as CSV: the record id first, then one column per
/// feature. Missing categoricals are written as `NO_<FEATURE>` (or the
/// empty string for region misses) and missing numerics as `NaN`.
///
/// # Errors
///
/// Returns [`FeatureError::Csv`] if writing fails.
pub fn write_csv<W: Write>(table: &FeatureTable, writer: W) -> Result<(), FeatureError> {
    let mut csv = csv::Writer::from_writer(writer);

    csv.write_record(
        std::iter::once(ID_COLUMN).chain(table.columns.iter().map(|c| c.name.as_str())),
    )?;

    for row in &table.rows {
        let fields = std::iter::once(row.object_id.to_string()).chain(
            row.cells
                .iter()
                .zip(&table.columns)
                .map(|(cell, column)| cell.encode(&column.name)),
        );
        csv.write_record(fields)?;
    }

    csv.flush()?;
    log::info!("Wrote {} feature rows", table.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use pothole_features_models::{Cell, CategoricalCell, ColumnSource, ColumnSpec, FeatureRow};

    use super::*;

    #[test]
    fn writes_missing_markers() {
        let table = FeatureTable {
            columns: vec![
                ColumnSpec::categorical("neighborhood", ColumnSource::NeighborhoodJoin),
                ColumnSpec::categorical("street_class", ColumnSource::StreetJoin),
                ColumnSpec::numeric("income_median", ColumnSource::Lookup("income".into())),
            ],
            rows: vec![
                FeatureRow {
                    object_id: 1,
                    cells: vec![
                        Cell::Categorical(CategoricalCell::Value("belltown".into())),
                        Cell::Categorical(CategoricalCell::Value("ARTERIAL".into())),
                        Cell::Numeric(Some(85000.0)),
                    ],
                },
                FeatureRow {
                    object_id: 2,
                    cells: vec![
                        Cell::Categorical(CategoricalCell::NotFound),
                        Cell::Categorical(CategoricalCell::Missing),
                        Cell::Numeric(None),
                    ],
                },
            ],
        };

        let mut out = Vec::new();
        write_csv(&table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(
            text,
            "OBJECTID,neighborhood,street_class,income_median\n\
             1,belltown,ARTERIAL,85000\n\
             2,,NO_STREET_CLASS,NaN\n"
        );
    }
}
