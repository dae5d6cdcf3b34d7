pub mod detect;
pub mod encode;
pub mod model;
pub mod pipeline;

// Re-export commonly used types
pub use detect::Detection;
pub use encode::Embedding;
pub use pipeline::{Detector, Pipeline};
