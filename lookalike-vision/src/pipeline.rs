use std::path::Path;

use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::encode::{self, Embedding};
use crate::{detect, model};

const NMS_THRESHOLD: f32 = 0.3;

/// Face-localization backend, ordered here from most to least
/// discriminative. Callers only rely on the relative leniency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    /// High-confidence detections only.
    Strict,
    /// Relaxed confidence threshold.
    Relaxed,
    /// Near-minimal confidence threshold.
    Permissive,
    /// No detection; the whole frame is treated as the face region.
    Skip,
}

impl Detector {
    pub fn score_threshold(self) -> Option<f32> {
        match self {
            Detector::Strict => Some(0.8),
            Detector::Relaxed => Some(0.6),
            Detector::Permissive => Some(0.3),
            Detector::Skip => None,
        }
    }
}

/// Full pipeline: detect face → align → encode
pub struct Pipeline {
    detector: Session,
    encoder: Session,
}

impl Pipeline {
    pub fn new(detector_model: &Path, encoder_model: &Path) -> Result<Self> {
        Ok(Self {
            detector: model::detector_session(detector_model)?,
            encoder: model::encoder_session(encoder_model)?,
        })
    }

    /// Locate a face with the given backend and encode it.
    ///
    /// In strict mode a missed detection is an error; in lenient mode the
    /// whole frame is encoded instead.
    pub fn represent(
        &mut self,
        img: &DynamicImage,
        detector: Detector,
        strict: bool,
    ) -> Result<Embedding> {
        let best = match detector.score_threshold() {
            Some(threshold) => {
                detect::detect_faces(&mut self.detector, img, threshold, NMS_THRESHOLD)
                    .context("detecting faces")?
                    .into_iter()
                    .max_by(|a, b| a.score.total_cmp(&b.score))
            }
            None => None,
        };

        match best {
            Some(detection) => {
                let face = encode::align_face(img, &detection, encode::ENCODER_INPUT)
                    .context("aligning face")?;
                encode::encode_face(&mut self.encoder, &face).context("encoding face")
            }
            None if strict => anyhow::bail!("no face detected in image"),
            None => encode::encode_face(&mut self.encoder, img).context("encoding full frame"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_ordered_by_leniency() {
        let strict = Detector::Strict.score_threshold().unwrap();
        let relaxed = Detector::Relaxed.score_threshold().unwrap();
        let permissive = Detector::Permissive.score_threshold().unwrap();
        assert!(strict > relaxed && relaxed > permissive);
        assert_eq!(Detector::Skip.score_threshold(), None);
    }
}
