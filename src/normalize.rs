use std::path::Path;

use image::{
    imageops::{self, FilterType},
    DynamicImage, Rgb, RgbImage,
};

use crate::error::Error;

/// Canonical edge length fed to the embedding extractor.
pub const CANONICAL_SIZE: u32 = 224;

/// Decode an image file and normalize it (see [`normalize`]).
pub fn normalize_file(path: &Path) -> Result<RgbImage, Error> {
    let decoded = image::open(path).map_err(|source| Error::ImageDecode {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(normalize(decoded))
}

/// Flatten any alpha channel over a white background, force RGB8 and
/// resize to the canonical resolution with a deterministic filter.
pub fn normalize(img: DynamicImage) -> RgbImage {
    let rgb = if img.color().has_alpha() {
        flatten_over_white(&img)
    } else {
        img.to_rgb8()
    };
    imageops::resize(&rgb, CANONICAL_SIZE, CANONICAL_SIZE, FilterType::Triangle)
}

fn flatten_over_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = px[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(px[0]), blend(px[1]), blend(px[2])]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn resizes_to_canonical_resolution() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(37, 91, Rgb([10, 20, 30])));
        let normalized = normalize(img);
        assert_eq!(normalized.dimensions(), (CANONICAL_SIZE, CANONICAL_SIZE));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        img.put_pixel(0, 0, Rgba([200, 100, 50, 255]));

        let flat = flatten_over_white(&DynamicImage::ImageRgba8(img));
        assert_eq!(*flat.get_pixel(0, 0), Rgb([200, 100, 50]));
        assert_eq!(*flat.get_pixel(2, 2), Rgb([255, 255, 255]));
    }

    #[test]
    fn half_transparent_pixels_blend_toward_white() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128]));
        let flat = flatten_over_white(&DynamicImage::ImageRgba8(img));
        let px = flat.get_pixel(0, 0);
        assert!(px[0] > 120 && px[0] < 135);
    }

    #[test]
    fn undecodable_file_reports_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.jpg");
        std::fs::write(&path, b"definitely not an image").unwrap();

        match normalize_file(&path) {
            Err(Error::ImageDecode { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected ImageDecode, got {other:?}"),
        }
    }
}
