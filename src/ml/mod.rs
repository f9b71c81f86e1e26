pub mod engine;
pub mod models;
pub mod predictor;
pub mod scaler;
pub mod window;

pub use engine::{EngineStatus, MLEngine};
