//! Core plugin infrastructure: errors, capability traits, the datastore
//! default, and the inference engine layer.

pub mod datastore;
pub mod errors;
pub mod inference;
pub mod traits;

pub use datastore::{Datastore, LocalDatastore};
pub use errors::{ProcessingStage, SegError, SegResult};
pub use inference::{ModelFormat, OrtModel, SlidingWindowInferer, WindowPredictor};
pub use traits::{InferRequest, InferResult, InferTask, TrainTask};
