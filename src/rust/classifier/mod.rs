//! Local image classifier: preprocessing, inference backends and ranking.

mod backend;
mod engine;
mod interpreter;
mod onnx;
mod preprocess;
mod utils;

pub use backend::{build_backend, InferenceBackend};
pub use engine::{classify, classify_image, PredictionResult, RankedPrediction};
pub use interpreter::LayersInterpreter;
pub use onnx::OnnxBackend;
pub use preprocess::preprocess;

pub(crate) use utils::to_percent;
