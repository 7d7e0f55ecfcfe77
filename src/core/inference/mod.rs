//! Inference engine layer.
//!
//! This module owns everything between the transform pipeline and the
//! serialized network: ONNX Runtime session handling, the format-inspecting
//! model loader, and the sliding-window evaluation strategy.

pub mod session;
pub mod sliding_window;

pub use session::{load_session, ModelFormat, OrtModel};
pub use sliding_window::{SlidingWindowInferer, WindowPredictor};
