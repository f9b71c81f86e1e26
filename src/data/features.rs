use nalgebra::DMatrix;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::error::InputError;

pub const FEATURE_COUNT: usize = 17;

/// Inputs the model was trained on, in the column order it expects.
pub const REQUIRED_FEATURES: [&str; FEATURE_COUNT] = [
    "op_setting_1",
    "op_setting_2",
    "sensor_2",
    "sensor_3",
    "sensor_4",
    "sensor_6",
    "sensor_7",
    "sensor_8",
    "sensor_9",
    "sensor_11",
    "sensor_12",
    "sensor_13",
    "sensor_14",
    "sensor_15",
    "sensor_17",
    "sensor_20",
    "sensor_21",
];

/// Named numeric columns with rows in arrival order (oldest first).
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTable {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub mean: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
}

impl SensorTable {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self, InputError> {
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != columns.len()) {
            return Err(InputError::Malformed(format!(
                "row {} has {} values but {} columns were declared",
                idx,
                row.len(),
                columns.len()
            )));
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn head(&self, n: usize) -> &[Vec<f64>] {
        &self.rows[..n.min(self.rows.len())]
    }

    fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Required names absent from this table, in the order they were asked for.
    pub fn missing(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .map(|name| name.to_string())
            .collect()
    }

    /// Projects the table onto `required`, yielding an `n_rows x required.len()` matrix.
    pub fn select(&self, required: &[&str]) -> Result<DMatrix<f64>, InputError> {
        let missing = self.missing(required);
        if !missing.is_empty() {
            return Err(InputError::MissingColumns(missing));
        }
        if self.rows.is_empty() {
            return Err(InputError::NoReadings);
        }

        let indices: Vec<usize> = required
            .iter()
            .filter_map(|name| self.column_index(name))
            .collect();

        Ok(DMatrix::from_fn(self.rows.len(), indices.len(), |r, c| {
            self.rows[r][indices[c]]
        }))
    }

    /// Narrows a multi-engine log to one unit. Tables without an `engine_id`
    /// column, or with no rows for `engine_id`, come back unchanged.
    pub fn for_engine(self, engine_id: i64) -> Self {
        let Some(idx) = self.column_index("engine_id") else {
            return self;
        };

        let rows: Vec<Vec<f64>> = self
            .rows
            .iter()
            .filter(|row| row[idx] == engine_id as f64)
            .cloned()
            .collect();

        if rows.is_empty() {
            return self;
        }

        Self {
            columns: self.columns,
            rows,
        }
    }

    pub fn summarize(&self, names: &[&str]) -> Vec<ColumnSummary> {
        names
            .iter()
            .filter_map(|name| {
                let idx = self.column_index(name)?;
                if self.rows.is_empty() {
                    return None;
                }
                let values: Vec<f64> = self.rows.iter().map(|r| r[idx]).collect();
                Some(ColumnSummary {
                    name: name.to_string(),
                    mean: Statistics::mean(&values),
                    std_dev: if values.len() > 1 { Statistics::std_dev(&values) } else { 0.0 },
                    min: Statistics::min(&values),
                    max: Statistics::max(&values),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<f64>>) -> SensorTable {
        SensorTable::new(columns.iter().map(|c| c.to_string()).collect(), rows).unwrap()
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let result = SensorTable::new(vec!["a".into(), "b".into()], vec![vec![1.0]]);
        assert!(matches!(result, Err(InputError::Malformed(_))));
    }

    #[test]
    fn missing_preserves_required_order() {
        let t = table(&["sensor_3", "op_setting_1"], vec![vec![1.0, 2.0]]);
        let missing = t.missing(&["op_setting_1", "sensor_2", "sensor_3", "sensor_4"]);
        assert_eq!(missing, vec!["sensor_2", "sensor_4"]);
    }

    #[test]
    fn select_reorders_columns_and_drops_extras() {
        let t = table(
            &["extra", "b", "a"],
            vec![vec![9.0, 2.0, 1.0], vec![9.0, 4.0, 3.0]],
        );
        let m = t.select(&["a", "b"]).unwrap();

        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 2);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 0)], 3.0);
        assert_eq!(m[(1, 1)], 4.0);
    }

    #[test]
    fn select_on_empty_table_fails() {
        let t = table(&["a"], vec![]);
        assert!(matches!(t.select(&["a"]), Err(InputError::NoReadings)));
    }

    #[test]
    fn for_engine_filters_when_unit_present() {
        let t = table(
            &["engine_id", "x"],
            vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![1.0, 11.0]],
        );
        let filtered = t.for_engine(1);
        assert_eq!(filtered.rows(), &[vec![1.0, 10.0], vec![1.0, 11.0]]);
    }

    #[test]
    fn for_engine_keeps_table_when_unit_absent() {
        let t = table(&["engine_id", "x"], vec![vec![3.0, 10.0]]);
        assert_eq!(t.clone().for_engine(7), t);

        let no_id = table(&["x"], vec![vec![1.0]]);
        assert_eq!(no_id.clone().for_engine(1), no_id);
    }

    #[test]
    fn summarize_reports_basic_statistics() {
        let t = table(&["a"], vec![vec![1.0], vec![3.0]]);
        let summary = t.summarize(&["a", "not_there"]);

        assert_eq!(summary.len(), 1);
        assert_eq!(summary[0].mean, 2.0);
        assert_eq!(summary[0].min, 1.0);
        assert_eq!(summary[0].max, 3.0);
    }
}
