use anyhow::Result;
use image::DynamicImage;

use lookalike_vision::{Detector, Embedding, Pipeline};

/// The embedding-extractor capability: locate a face with the given
/// backend and return its embedding, or fail.
///
/// The core never assumes which concrete detector sits behind a backend,
/// only the relative leniency encoded in [`Detector`].
pub trait Represent {
    fn represent(
        &mut self,
        img: &DynamicImage,
        detector: Detector,
        strict: bool,
    ) -> Result<Embedding>;
}

impl Represent for Pipeline {
    fn represent(
        &mut self,
        img: &DynamicImage,
        detector: Detector,
        strict: bool,
    ) -> Result<Embedding> {
        Pipeline::represent(self, img, detector, strict)
    }
}
