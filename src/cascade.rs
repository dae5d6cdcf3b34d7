//! Query-time embedding extraction with ordered fallback strategies.

use image::DynamicImage;
use log::debug;

use lookalike_vision::{Detector, Embedding};

use crate::error::Error;
use crate::extract::Represent;

/// Strategies in attempt order, most discriminative first. The strict
/// attempts avoid embedding background noise on well-behaved photos; the
/// lenient tail keeps hard photos (occlusion, off-angle, poor light)
/// answerable instead of hard-failing.
pub const QUERY_STRATEGIES: &[(Detector, bool)] = &[
    (Detector::Strict, true),
    (Detector::Relaxed, true),
    (Detector::Permissive, true),
    (Detector::Skip, false),
];

/// Try each strategy in order and return the first embedding produced.
/// Fails with [`Error::NoFaceFound`] only once every strategy is exhausted.
pub fn extract_query_embedding(
    extractor: &mut impl Represent,
    img: &DynamicImage,
) -> Result<Embedding, Error> {
    run_cascade(extractor, img, QUERY_STRATEGIES)
}

fn run_cascade(
    extractor: &mut impl Represent,
    img: &DynamicImage,
    strategies: &[(Detector, bool)],
) -> Result<Embedding, Error> {
    for &(detector, strict) in strategies {
        match extractor.represent(img, detector, strict) {
            Ok(embedding) if !embedding.is_empty() => {
                debug!("extracted embedding with {:?} (strict: {})", detector, strict);
                return Ok(embedding);
            }
            Ok(_) => debug!("{:?} returned an empty embedding", detector),
            // Diagnostic only; the caller sees the cascade's failure.
            Err(e) => debug!("{:?} (strict: {}) failed: {:#}", detector, strict, e),
        }
    }
    Err(Error::NoFaceFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};

    /// Scripted extractor recording every attempt.
    struct Scripted {
        script: Vec<Result<Embedding>>,
        calls: Vec<(Detector, bool)>,
    }

    impl Scripted {
        fn new(script: Vec<Result<Embedding>>) -> Self {
            Self {
                script,
                calls: Vec::new(),
            }
        }
    }

    impl Represent for Scripted {
        fn represent(
            &mut self,
            _img: &DynamicImage,
            detector: Detector,
            strict: bool,
        ) -> Result<Embedding> {
            self.calls.push((detector, strict));
            if self.script.is_empty() {
                Err(anyhow!("script exhausted"))
            } else {
                self.script.remove(0)
            }
        }
    }

    fn embedding() -> Embedding {
        Embedding {
            vector: vec![0.5, 0.5],
        }
    }

    fn blank_image() -> DynamicImage {
        DynamicImage::new_rgb8(8, 8)
    }

    #[test]
    fn first_success_short_circuits() {
        let mut extractor = Scripted::new(vec![Ok(embedding())]);
        let result = extract_query_embedding(&mut extractor, &blank_image()).unwrap();
        assert_eq!(result, embedding());
        assert_eq!(extractor.calls.len(), 1);
    }

    #[test]
    fn failures_fall_through_to_next_strategy() {
        let mut extractor = Scripted::new(vec![
            Err(anyhow!("no face")),
            Err(anyhow!("still no face")),
            Ok(embedding()),
        ]);
        let result = extract_query_embedding(&mut extractor, &blank_image()).unwrap();
        assert_eq!(result, embedding());
        assert_eq!(extractor.calls.len(), 3);
    }

    #[test]
    fn empty_embedding_counts_as_failure() {
        let mut extractor = Scripted::new(vec![
            Ok(Embedding { vector: vec![] }),
            Ok(embedding()),
        ]);
        let result = extract_query_embedding(&mut extractor, &blank_image()).unwrap();
        assert_eq!(result, embedding());
        assert_eq!(extractor.calls.len(), 2);
    }

    #[test]
    fn exhaustion_reports_no_face_found() {
        let mut extractor = Scripted::new(vec![]);
        let result = extract_query_embedding(&mut extractor, &blank_image());
        assert!(matches!(result, Err(Error::NoFaceFound)));
        assert_eq!(extractor.calls.len(), QUERY_STRATEGIES.len());
    }

    #[test]
    fn strategies_are_attempted_strict_first() {
        let mut extractor = Scripted::new(vec![]);
        let _ = extract_query_embedding(&mut extractor, &blank_image());
        assert_eq!(extractor.calls, QUERY_STRATEGIES.to_vec());
        // The lenient whole-image fallback comes last.
        assert_eq!(extractor.calls.last(), Some(&(Detector::Skip, false)));
    }
}
