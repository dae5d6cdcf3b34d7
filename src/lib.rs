pub mod builder;
pub mod cascade;
pub mod config;
pub mod error;
pub mod extract;
pub mod normalize;
pub mod ranker;
pub mod store;

pub use error::Error;
pub use extract::Represent;

// Re-export vision types for convenience
pub use lookalike_vision::{Detector, Embedding, Pipeline};

use std::path::Path;

use image::DynamicImage;

use crate::ranker::QueryResult;
use crate::store::EmbeddingStore;

/// Full query path: normalize the photo, run the detection cascade and
/// rank the embedding against the store.
pub fn predict(
    extractor: &mut impl Represent,
    store: &EmbeddingStore,
    image: &Path,
    top_k: usize,
) -> Result<Vec<QueryResult>, Error> {
    let normalized = normalize::normalize_file(image)?;
    let img = DynamicImage::ImageRgb8(normalized);
    let embedding = cascade::extract_query_embedding(extractor, &img)?;
    ranker::rank(&embedding, store, top_k)
}
