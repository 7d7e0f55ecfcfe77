//! Concrete inference task adapters.

pub mod aorta;

pub use aorta::AortaSegmentation;
