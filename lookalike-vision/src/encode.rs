//! Landmark-based face alignment and embedding extraction.

use anyhow::{ensure, Result};
use image::{imageops, DynamicImage, GenericImageView, Rgb, RgbImage};
use ort::{session::Session, value::Value};

use crate::detect::{bgr_chw_tensor, Detection};

/// Square input resolution of the encoder model.
pub const ENCODER_INPUT: u32 = 112;

/// Output dimensionality of the encoder model.
pub const EMBEDDING_DIM: usize = 128;

/// L2-normalized face embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Vec<f32>,
}

impl Embedding {
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.is_empty()
    }
}

// Reference eye positions for a 112x112 crop (ArcFace standard).
const REF_LEFT_EYE: (f32, f32) = (38.3, 51.7);
const REF_RIGHT_EYE: (f32, f32) = (73.5, 51.5);

/// Rotate, scale and crop the detected face so that the eyes land on the
/// encoder's reference positions.
pub fn align_face(img: &DynamicImage, detection: &Detection, size: u32) -> Result<DynamicImage> {
    let left = (detection.landmarks[0], detection.landmarks[1]);
    let right = (detection.landmarks[2], detection.landmarks[3]);

    let eye_dx = right.0 - left.0;
    let eye_dy = right.1 - left.1;
    let eye_dist = (eye_dx * eye_dx + eye_dy * eye_dy).sqrt();
    ensure!(eye_dist > f32::EPSILON, "degenerate eye landmarks");

    let ref_dist = ((REF_RIGHT_EYE.0 - REF_LEFT_EYE.0).powi(2)
        + (REF_RIGHT_EYE.1 - REF_LEFT_EYE.1).powi(2))
    .sqrt();
    let out_scale = size as f32 / ENCODER_INPUT as f32;
    let scale = out_scale * ref_dist / eye_dist;
    let angle = eye_dy.atan2(eye_dx);

    let eye_center = ((left.0 + right.0) / 2.0, (left.1 + right.1) / 2.0);
    let target = (
        (REF_LEFT_EYE.0 + REF_RIGHT_EYE.0) / 2.0 * out_scale,
        (REF_LEFT_EYE.1 + REF_RIGHT_EYE.1) / 2.0 * out_scale,
    );

    // Affine [a b; c d] + [tx ty]: rotate by the eye angle, scale to the
    // reference eye distance, then translate the eye midpoint onto the
    // reference midpoint.
    let (sin, cos) = angle.sin_cos();
    let (a, b) = (scale * cos, scale * sin);
    let (c, d) = (-scale * sin, scale * cos);
    let tx = target.0 - (a * eye_center.0 + b * eye_center.1);
    let ty = target.1 - (c * eye_center.0 + d * eye_center.1);
    let det = a * d - b * c;

    let (img_w, img_h) = img.dimensions();
    let mut output = RgbImage::new(size, size);
    for out_y in 0..size {
        for out_x in 0..size {
            // Invert the affine to find the source sample point.
            let px = out_x as f32 - tx;
            let py = out_y as f32 - ty;
            let src_x = (d * px - b * py) / det;
            let src_y = (-c * px + a * py) / det;

            if src_x >= 0.0 && src_x < img_w as f32 && src_y >= 0.0 && src_y < img_h as f32 {
                output.put_pixel(out_x, out_y, sample_bilinear(img, src_x, src_y));
            }
            // else: leave black
        }
    }

    Ok(DynamicImage::ImageRgb8(output))
}

fn sample_bilinear(img: &DynamicImage, x: f32, y: f32) -> Rgb<u8> {
    let (img_w, img_h) = img.dimensions();
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(img_w - 1);
    let y1 = (y0 + 1).min(img_h - 1);

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    let p00 = img.get_pixel(x0, y0);
    let p10 = img.get_pixel(x1, y0);
    let p01 = img.get_pixel(x0, y1);
    let p11 = img.get_pixel(x1, y1);

    let mut out = [0u8; 3];
    for ch in 0..3 {
        out[ch] = (p00[ch] as f32 * w00
            + p10[ch] as f32 * w10
            + p01[ch] as f32 * w01
            + p11[ch] as f32 * w11) as u8;
    }
    Rgb(out)
}

/// Encode a face crop to an L2-normalized embedding.
pub fn encode_face(session: &mut Session, face: &DynamicImage) -> Result<Embedding> {
    let crop = face
        .resize_exact(ENCODER_INPUT, ENCODER_INPUT, imageops::FilterType::Triangle)
        .to_rgb8();

    let input = Value::from_array(bgr_chw_tensor(&crop)?)?;
    let outputs = session.run(ort::inputs![input])?;
    let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

    // Expecting shape [1, 128]
    let dim = if shape.len() == 2 {
        shape[1] as usize
    } else {
        data.len()
    };
    let mut vector: Vec<f32> = data[..dim].to_vec();

    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }

    Ok(Embedding { vector })
}
