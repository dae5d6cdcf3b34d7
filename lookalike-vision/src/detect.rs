//! Anchor-free face detector inference and post-processing.
//!
//! The detector predicts directly from grid locations at strides 8, 16 and
//! 32. For each stride it outputs classification scores, objectness scores,
//! bbox deltas (dx, dy, dw, dh) and five landmark point deltas; a grid cell
//! decodes as `cx = (grid_x + dx) * stride`, `w = dw * stride`, both then
//! normalized by the input size.

use anyhow::{ensure, Result};
use image::{imageops, DynamicImage, GenericImageView, RgbImage};
use ndarray::Array4;
use ort::{session::Session, value::Value};

/// Square input resolution of the detector model.
pub const DETECTOR_INPUT: u32 = 640;

const STRIDES: [usize; 3] = [8, 16, 32];

/// One detected face, in source image pixel coordinates.
#[derive(Debug, Clone)]
pub struct Detection {
    /// x, y, w, h
    pub bbox: [f32; 4],
    pub score: f32,
    /// 5 points: x1,y1 .. x5,y5 (left eye, right eye, nose, mouth corners)
    pub landmarks: [f32; 10],
}

/// Run the detector over an image and return all faces above
/// `score_threshold`, NMS-suppressed at `nms_threshold`.
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    // Letterbox into a square canvas so the fixed input does not distort
    // the face geometry.
    let (orig_w, orig_h) = img.dimensions();
    let side = DETECTOR_INPUT;
    let scale = side as f32 / orig_w.max(orig_h) as f32;
    let new_w = (orig_w as f32 * scale) as u32;
    let new_h = (orig_h as f32 * scale) as u32;

    let resized = img.resize_exact(new_w, new_h, imageops::FilterType::Triangle);
    let mut canvas = DynamicImage::new_rgb8(side, side);
    let off_x = (side - new_w) / 2;
    let off_y = (side - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, off_x as i64, off_y as i64);

    let input = Value::from_array(bgr_chw_tensor(&canvas.to_rgb8())?)?;
    let outputs = session.run(ort::inputs![input])?;

    let mut raw: Vec<(Vec<i64>, Vec<f32>)> = Vec::new();
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        raw.push((shape.iter().copied().collect(), data.to_vec()));
    }

    let mut detections = decode_outputs(&raw, side as usize, score_threshold)?;

    // Undo the letterboxing: normalized canvas coordinates back to source
    // image pixels.
    let side_f = side as f32;
    for det in &mut detections {
        det.bbox[0] = (det.bbox[0] * side_f - off_x as f32) / scale;
        det.bbox[1] = (det.bbox[1] * side_f - off_y as f32) / scale;
        det.bbox[2] = det.bbox[2] * side_f / scale;
        det.bbox[3] = det.bbox[3] * side_f / scale;
        for k in 0..5 {
            det.landmarks[k * 2] = (det.landmarks[k * 2] * side_f - off_x as f32) / scale;
            det.landmarks[k * 2 + 1] = (det.landmarks[k * 2 + 1] * side_f - off_y as f32) / scale;
        }
    }

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    Ok(detections)
}

/// Pack an RGB image into a [1, 3, H, W] tensor in BGR channel order with
/// values in [0, 255], the layout both models expect.
pub(crate) fn bgr_chw_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (w, h) = img.dimensions();
    let pixels = (w * h) as usize;

    let mut data = vec![0f32; 3 * pixels];
    let (b_channel, rest) = data.split_at_mut(pixels);
    let (g_channel, r_channel) = rest.split_at_mut(pixels);
    for (i, px) in img.pixels().enumerate() {
        r_channel[i] = px[0] as f32;
        g_channel[i] = px[1] as f32;
        b_channel[i] = px[2] as f32;
    }

    Ok(Array4::from_shape_vec((1, 3, h as usize, w as usize), data)?)
}

/// Decode the 12 raw output tensors (cls, obj, bbox, kps at each stride)
/// into detections with normalized [0, 1] coordinates.
fn decode_outputs(
    outputs: &[(Vec<i64>, Vec<f32>)],
    input_size: usize,
    score_threshold: f32,
) -> Result<Vec<Detection>> {
    ensure!(
        outputs.len() >= 12,
        "detector produced {} outputs, expected 12",
        outputs.len()
    );

    let mut detections = Vec::new();
    for (scale, &stride) in STRIDES.iter().enumerate() {
        let grid = input_size / stride;
        let locations = grid * grid;

        let cls = tensor_at(outputs, scale, locations, 1)?;
        let obj = tensor_at(outputs, scale + 3, locations, 1)?;
        let bbox = tensor_at(outputs, scale + 6, locations, 4)?;
        let kps = tensor_at(outputs, scale + 9, locations, 10)?;

        let s = stride as f32;
        let n = input_size as f32;
        for i in 0..grid {
            for j in 0..grid {
                let idx = i * grid + j;
                let score = sigmoid(cls[idx] * obj[idx]);
                if score < score_threshold {
                    continue;
                }

                let cx = (j as f32 + bbox[idx * 4]) * s / n;
                let cy = (i as f32 + bbox[idx * 4 + 1]) * s / n;
                let w = bbox[idx * 4 + 2] * s / n;
                let h = bbox[idx * 4 + 3] * s / n;

                let mut landmarks = [0f32; 10];
                for k in 0..5 {
                    landmarks[k * 2] = (j as f32 + kps[idx * 10 + k * 2]) * s / n;
                    landmarks[k * 2 + 1] = (i as f32 + kps[idx * 10 + k * 2 + 1]) * s / n;
                }

                detections.push(Detection {
                    bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                    score,
                    landmarks,
                });
            }
        }
    }

    Ok(detections)
}

fn tensor_at<'a>(
    outputs: &'a [(Vec<i64>, Vec<f32>)],
    index: usize,
    locations: usize,
    width: usize,
) -> Result<&'a [f32]> {
    let (shape, data) = &outputs[index];
    ensure!(
        shape.len() == 3
            && shape[0] == 1
            && shape[1] as usize == locations
            && shape[2] as usize == width,
        "unexpected shape {:?} for detector output {}, expected [1, {}, {}]",
        shape,
        index,
        locations,
        width
    );
    Ok(data.as_slice())
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted: Vec<&Detection> = detections.iter().collect();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for candidate in sorted {
        if keep
            .iter()
            .all(|kept| iou(&kept.bbox, &candidate.bbox) <= iou_threshold)
        {
            keep.push(candidate.clone());
        }
    }
    keep
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = (a[0] + a[2]).min(b[0] + b[2]);
    let y2 = (a[1] + a[3]).min(b[1] + b[3]);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let inter = (x2 - x1) * (y2 - y1);
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(locations: usize, width: usize) -> (Vec<i64>, Vec<f32>) {
        (
            vec![1, locations as i64, width as i64],
            vec![0.0; locations * width],
        )
    }

    #[test]
    fn sigmoid_is_monotonic() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(8.0) > 0.99);
        assert!(sigmoid(-8.0) < 0.01);
    }

    #[test]
    fn decode_single_detection_at_stride_32() {
        let input_size = 640;
        let grid = input_size / 32;

        let mut outputs = Vec::new();
        for &width in &[1usize, 1, 4, 10] {
            for &stride in &STRIDES {
                let g = input_size / stride;
                outputs.push(blank(g * g, width));
            }
        }

        // One confident hit at grid cell (i=4, j=6) of the stride-32 map.
        let idx = 4 * grid + 6;
        outputs[2].1[idx] = 4.0; // cls
        outputs[5].1[idx] = 4.0; // obj
        outputs[8].1[idx * 4] = 0.25; // dx
        outputs[8].1[idx * 4 + 1] = 0.5; // dy
        outputs[8].1[idx * 4 + 2] = 4.0; // dw: 4 * 32 = 128 px
        outputs[8].1[idx * 4 + 3] = 4.0; // dh
        outputs[11].1[idx * 10] = 0.25; // first landmark dx

        let detections = decode_outputs(&outputs, input_size, 0.6).unwrap();
        assert_eq!(detections.len(), 1);

        let det = &detections[0];
        // cx = (6 + 0.25) * 32 / 640 = 0.3125, w = 128 / 640 = 0.2
        assert!((det.bbox[0] - (0.3125 - 0.1)).abs() < 1e-5);
        assert!((det.bbox[2] - 0.2).abs() < 1e-5);
        // cy = (4 + 0.5) * 32 / 640 = 0.225
        assert!((det.bbox[1] - (0.225 - 0.1)).abs() < 1e-5);
        assert!(det.score > 0.99);
        // landmark x = (6 + 0.25) * 32 / 640
        assert!((det.landmarks[0] - 0.3125).abs() < 1e-5);
    }

    #[test]
    fn decode_rejects_truncated_outputs() {
        let outputs = vec![blank(4, 1); 3];
        assert!(decode_outputs(&outputs, 640, 0.6).is_err());
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = [10.0, 10.0, 20.0, 20.0];
        let b = [100.0, 100.0, 10.0, 10.0];
        assert_eq!(iou(&a, &b), 0.0);

        let c = [15.0, 15.0, 20.0, 20.0];
        let overlap = iou(&a, &c);
        assert!(overlap > 0.0 && overlap < 1.0);
    }

    #[test]
    fn nms_suppresses_overlapping_boxes() {
        let detections = vec![
            Detection {
                bbox: [10.0, 10.0, 20.0, 20.0],
                score: 0.9,
                landmarks: [0.0; 10],
            },
            Detection {
                bbox: [12.0, 12.0, 20.0, 20.0],
                score: 0.8,
                landmarks: [0.0; 10],
            },
            Detection {
                bbox: [100.0, 100.0, 20.0, 20.0],
                score: 0.85,
                landmarks: [0.0; 10],
            },
        ];

        let kept = nms(&detections, 0.3);
        assert_eq!(kept.len(), 2);
        assert!((kept[0].score - 0.9).abs() < 1e-6);
    }
}
