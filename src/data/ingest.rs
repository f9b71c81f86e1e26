use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::debug;

use super::features::{SensorTable, REQUIRED_FEATURES};
use crate::error::InputError;

/// Leading columns of a C-MAPSS run-to-failure log; sensors follow.
const CMAPSS_PREFIX: [&str; 5] = [
    "engine_id",
    "cycle",
    "op_setting_1",
    "op_setting_2",
    "op_setting_3",
];

impl SensorTable {
    /// Builds a table from JSON readings. Columns are the union of keys seen
    /// across all readings; every row must carry a numeric value for each of
    /// the `required` columns it is later projected onto.
    pub fn from_readings(
        readings: &[Map<String, Value>],
        required: &[&str],
    ) -> Result<Self, InputError> {
        let keys: BTreeSet<&str> = readings
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect();

        let missing: Vec<String> = required
            .iter()
            .filter(|name| !keys.contains(*name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(InputError::MissingFeatures(missing));
        }
        if readings.is_empty() {
            return Err(InputError::NoReadings);
        }

        let columns: Vec<String> = required.iter().map(|c| c.to_string()).collect();
        let mut rows = Vec::with_capacity(readings.len());

        for (row_idx, reading) in readings.iter().enumerate() {
            let mut row = Vec::with_capacity(columns.len());
            for name in required {
                let value = reading.get(*name).unwrap_or(&Value::Null);
                row.push(numeric(value).ok_or_else(|| InputError::InvalidValue {
                    row: row_idx,
                    feature: name.to_string(),
                    value: value.to_string(),
                })?);
            }
            rows.push(row);
        }

        SensorTable::new(columns, rows)
    }

    /// Parses an uploaded log. `.txt` files are read as headerless,
    /// whitespace-separated C-MAPSS data; everything else as CSV with a header.
    pub fn from_upload(file_name: &str, bytes: &[u8]) -> Result<Self, InputError> {
        if file_name.to_ascii_lowercase().ends_with(".txt") {
            parse_cmapss(bytes)
        } else {
            parse_csv(bytes)
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn parse_cell(cell: &str, line: usize, column: &str) -> Result<f64, InputError> {
    cell.trim().parse::<f64>().map_err(|_| {
        InputError::Malformed(format!(
            "line {}: could not convert '{}' in column '{}' to float",
            line, cell, column
        ))
    })
}

pub fn cmapss_columns(width: usize) -> Vec<String> {
    CMAPSS_PREFIX
        .iter()
        .map(|c| c.to_string())
        .chain((1..).map(|i| format!("sensor_{}", i)))
        .take(width)
        .collect()
}

fn parse_cmapss(bytes: &[u8]) -> Result<SensorTable, InputError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| InputError::Malformed(format!("file is not valid UTF-8: {}", e)))?;

    let mut width = None;
    let mut rows = Vec::new();
    let mut columns = Vec::new();

    for (line_idx, line) in text.lines().enumerate() {
        let cells: Vec<&str> = line.split_whitespace().collect();
        if cells.is_empty() {
            continue;
        }

        let expected = *width.get_or_insert_with(|| {
            columns = cmapss_columns(cells.len());
            cells.len()
        });
        if cells.len() != expected {
            return Err(InputError::Malformed(format!(
                "line {}: expected {} fields, saw {}",
                line_idx + 1,
                expected,
                cells.len()
            )));
        }

        let row = cells
            .iter()
            .zip(&columns)
            .map(|(cell, column)| parse_cell(cell, line_idx + 1, column))
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(row);
    }

    debug!("Parsed {} whitespace-delimited rows", rows.len());
    SensorTable::new(columns, rows)
}

/// Columns the pipeline reads must be numeric in every row. Any other column
/// is kept when it happens to be numeric and dropped otherwise.
fn parse_csv(bytes: &[u8]) -> Result<SensorTable, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| InputError::Malformed(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let records = reader
        .records()
        .collect::<Result<Vec<csv::StringRecord>, _>>()
        .map_err(|e| InputError::Malformed(e.to_string()))?;

    let kept: Vec<usize> = (0..headers.len())
        .filter(|&col| {
            let name = headers[col].as_str();
            let read = name == "engine_id" || REQUIRED_FEATURES.contains(&name);
            let numeric = records
                .iter()
                .all(|r| r.get(col).is_some_and(|cell| cell.parse::<f64>().is_ok()));
            if !read && !numeric {
                debug!("Dropping non-numeric column '{}'", name);
            }
            read || numeric
        })
        .collect();

    let mut rows = Vec::with_capacity(records.len());
    for (idx, record) in records.iter().enumerate() {
        // header is line 1
        let line = idx + 2;
        let row = kept
            .iter()
            .map(|&col| parse_cell(record.get(col).unwrap_or(""), line, &headers[col]))
            .collect::<Result<Vec<f64>, _>>()?;
        rows.push(row);
    }

    let columns: Vec<String> = kept.iter().map(|&col| headers[col].clone()).collect();
    debug!("Parsed {} CSV rows across {} columns", rows.len(), columns.len());
    SensorTable::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(value: f64) -> Map<String, Value> {
        let mut map = Map::new();
        for name in REQUIRED_FEATURES {
            map.insert(name.to_string(), json!(value));
        }
        map
    }

    #[test]
    fn readings_become_rows_in_required_order() {
        let mut first = reading(1.0);
        first.insert("sensor_2".into(), json!(642.5));
        first.insert("unused".into(), json!("ignored"));

        let table = SensorTable::from_readings(&[first, reading(2.0)], &REQUIRED_FEATURES).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns()[2], "sensor_2");
        assert_eq!(table.rows()[0][2], 642.5);
        assert_eq!(table.rows()[1][0], 2.0);
    }

    #[test]
    fn readings_missing_a_feature_everywhere_report_it() {
        let mut r = reading(1.0);
        r.remove("sensor_9");
        r.remove("op_setting_2");

        let err = SensorTable::from_readings(&[r], &REQUIRED_FEATURES).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing features: ['op_setting_2', 'sensor_9']"
        );
    }

    #[test]
    fn empty_readings_report_every_feature_missing() {
        let err = SensorTable::from_readings(&[], &REQUIRED_FEATURES).unwrap_err();
        match err {
            InputError::MissingFeatures(names) => assert_eq!(names.len(), 17),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn feature_missing_from_one_reading_is_invalid() {
        let mut second = reading(1.0);
        second.remove("sensor_4");

        let err = SensorTable::from_readings(&[reading(1.0), second], &REQUIRED_FEATURES)
            .unwrap_err();
        assert!(matches!(err, InputError::InvalidValue { row: 1, ref feature, .. } if feature == "sensor_4"));
    }

    #[test]
    fn numeric_strings_are_accepted_but_text_is_not() {
        let mut ok = reading(0.0);
        ok.insert("sensor_3".into(), json!(" 1589.7 "));
        assert!(SensorTable::from_readings(&[ok], &REQUIRED_FEATURES).is_ok());

        let mut bad = reading(0.0);
        bad.insert("sensor_3".into(), json!("hot"));
        assert!(SensorTable::from_readings(&[bad], &REQUIRED_FEATURES).is_err());
    }

    #[test]
    fn csv_upload_uses_header_names() {
        let body = b"sensor_2, sensor_3\n641.82,1589.70\n642.15,1591.82\n";
        let table = SensorTable::from_upload("log.csv", body).unwrap();

        assert_eq!(table.columns(), &["sensor_2", "sensor_3"]);
        assert_eq!(table.rows()[1], vec![642.15, 1591.82]);
    }

    #[test]
    fn csv_upload_rejects_text_in_feature_columns() {
        let err = SensorTable::from_upload("log.csv", b"sensor_2,b\n1,2\nx,3\n").unwrap_err();
        assert!(err.to_string().contains("line 3"));
        assert!(err.to_string().contains("'sensor_2'"));
    }

    #[test]
    fn csv_upload_drops_text_and_blank_extra_columns() {
        let header = format!("timestamp,{},notes,asset_tag", REQUIRED_FEATURES.join(","));
        let values = vec!["0.5"; REQUIRED_FEATURES.len()].join(",");
        let body = format!(
            "{header}\n2024-01-01T00:00,{values},,ESN-1\n2024-01-01T01:00,{values},,ESN-1\n"
        );

        let table = SensorTable::from_upload("log.csv", body.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.columns(), &REQUIRED_FEATURES[..]);
        assert!(table.select(&REQUIRED_FEATURES).is_ok());
    }

    #[test]
    fn csv_upload_keeps_numeric_extra_columns() {
        let body = b"cycle,sensor_2\n1,641.8\n2,642.1\n";
        let table = SensorTable::from_upload("log.csv", body).unwrap();
        assert_eq!(table.columns(), &["cycle", "sensor_2"]);
    }

    #[test]
    fn txt_upload_names_cmapss_columns() {
        let body = b"1 1 -0.0007 -0.0004 100.0 518.67 641.82 1589.70\n\
                     1 2  0.0019 -0.0003 100.0 518.67 642.15 1591.82\n\n";
        let table = SensorTable::from_upload("train_FD001.TXT", body).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(
            table.columns(),
            &[
                "engine_id",
                "cycle",
                "op_setting_1",
                "op_setting_2",
                "op_setting_3",
                "sensor_1",
                "sensor_2",
                "sensor_3"
            ]
        );
        assert_eq!(table.rows()[1][1], 2.0);
    }

    #[test]
    fn txt_upload_rejects_ragged_lines() {
        let err = SensorTable::from_upload("x.txt", b"1 2 3\n1 2\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn cmapss_columns_truncate_to_width() {
        assert_eq!(cmapss_columns(3), vec!["engine_id", "cycle", "op_setting_1"]);
        assert_eq!(cmapss_columns(26).last().unwrap(), "sensor_21");
    }
}
