pub mod features;
pub mod ingest;
pub mod payload;

pub use features::{ColumnSummary, SensorTable, REQUIRED_FEATURES};
pub use payload::{PredictionResult, SensorInput};
