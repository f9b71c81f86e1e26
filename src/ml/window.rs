use nalgebra::{DMatrix, DVector};

/// Fixed-length, already-scaled input to the sequence model.
/// Rows are timesteps (oldest first), columns are features.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorWindow {
    data: DMatrix<f64>,
    observed: usize,
}

impl SensorWindow {
    /// Keeps the most recent `sequence_length` rows; shorter histories are
    /// left-padded with zero rows so the latest reading stays last.
    pub fn from_scaled(scaled: &DMatrix<f64>, sequence_length: usize) -> Self {
        let rows = scaled.nrows();
        let cols = scaled.ncols();

        if rows >= sequence_length {
            let start = rows - sequence_length;
            return Self {
                data: scaled.rows(start, sequence_length).into_owned(),
                observed: sequence_length,
            };
        }

        let mut data = DMatrix::zeros(sequence_length, cols);
        data.rows_mut(sequence_length - rows, rows).copy_from(scaled);

        Self {
            data,
            observed: rows,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.data.ncols()
    }

    /// Rows that came from real readings rather than padding.
    pub fn observed(&self) -> usize {
        self.observed
    }

    pub fn timestep(&self, t: usize) -> DVector<f64> {
        self.data.row(t).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(rows: usize, cols: usize) -> DMatrix<f64> {
        DMatrix::from_fn(rows, cols, |r, _| (r + 1) as f64)
    }

    #[test]
    fn short_history_is_padded_at_the_front() {
        let window = SensorWindow::from_scaled(&ramp(3, 2), 5);

        assert_eq!(window.sequence_length(), 5);
        assert_eq!(window.observed(), 3);
        assert_eq!(window.timestep(0), DVector::from_vec(vec![0.0, 0.0]));
        assert_eq!(window.timestep(1), DVector::from_vec(vec![0.0, 0.0]));
        assert_eq!(window.timestep(2), DVector::from_vec(vec![1.0, 1.0]));
        assert_eq!(window.timestep(4), DVector::from_vec(vec![3.0, 3.0]));
    }

    #[test]
    fn long_history_keeps_most_recent_rows() {
        let window = SensorWindow::from_scaled(&ramp(80, 17), 50);

        assert_eq!(window.sequence_length(), 50);
        assert_eq!(window.n_features(), 17);
        assert_eq!(window.observed(), 50);
        assert_eq!(window.timestep(0)[0], 31.0);
        assert_eq!(window.timestep(49)[16], 80.0);
    }

    #[test]
    fn exact_length_is_unchanged() {
        let input = ramp(50, 3);
        let window = SensorWindow::from_scaled(&input, 50);
        assert_eq!(window, SensorWindow { data: input, observed: 50 });
    }
}
