use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /predict/sensors`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorInput {
    pub engine_id: i64,
    pub readings: Vec<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PredictionResult {
    pub engine_id: i64,
    #[serde(rename = "predicted_RUL")]
    pub predicted_rul: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_uses_wire_field_names() {
        let json = serde_json::to_value(PredictionResult {
            engine_id: 7,
            predicted_rul: 112.5,
        })
        .unwrap();

        assert_eq!(json, serde_json::json!({"engine_id": 7, "predicted_RUL": 112.5}));
    }
}
