//! Shared fixtures: a detector that reads face geometry from pixel colors and
//! helpers that write small PNG corpora.
#![allow(dead_code)]

use std::f64::consts::PI;
use std::path::Path;

use faceshape_classifiers::error::DetectorError;
use faceshape_classifiers::landmarks::{DetectedFace, Landmark, LandmarkDetector, LandmarkSchema};
use image::{Rgb, RgbImage};

/// Synthesizes a 468-point face outline from the top-left pixel.
///
/// * red: width / height ratio of the outline (0 means "no face"),
/// * green: horizontal offset and per-image jitter,
/// * blue: overall face size.
pub struct PixelGeometryDetector;

fn jitter(seed: u8, i: usize) -> f64 {
    let h = (seed as u64).wrapping_mul(2_654_435_761).wrapping_add(i as u64 * 40_503);
    (h % 1000) as f64 / 500.0 - 1.0
}

impl LandmarkDetector for PixelGeometryDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let [r, g, b] = image.get_pixel(0, 0).0;
        if r == 0 {
            return Ok(Vec::new());
        }

        let schema = self.schema();
        let ratio = r as f64 / 255.0;
        let size = 0.15 + b as f64 / 255.0 * 0.25;
        let (cx, cy) = (0.3 + g as f64 / 255.0 * 0.4, 0.5);

        let mut points: Vec<Landmark> = (0..schema.num_landmarks)
            .map(|i| {
                let theta = 2.0 * PI * i as f64 / schema.num_landmarks as f64;
                let noise = 0.02 * jitter(g, i);
                Landmark::new(
                    cx + size * (ratio * theta.cos() + noise),
                    cy + size * (theta.sin() - noise),
                    0.01 * noise,
                )
            })
            .collect();
        points[schema.forehead_top] = Landmark::new(cx, cy - size, 0.0);
        points[schema.chin] = Landmark::new(cx, cy + size, 0.0);

        Ok(vec![DetectedFace {
            points,
            confidence: 0.99,
        }])
    }

    fn schema(&self) -> LandmarkSchema {
        LandmarkSchema::FACE_MESH_468
    }
}

pub fn write_face(path: &Path, r: u8, g: u8, b: u8) {
    RgbImage::from_pixel(4, 4, Rgb([r, g, b])).save(path).unwrap();
}

/// Red channel per class: "round" faces are nearly as wide as tall, "oval"
/// faces are narrow.
pub const ROUND_RATIO: u8 = 240;
pub const OVAL_RATIO: u8 = 175;

/// Write `count` synthetic faces per class under `root/<label>/`.
pub fn write_corpus(root: &Path, classes: &[(&str, usize, u8)]) {
    for (label, count, red) in classes {
        let dir = root.join(label);
        std::fs::create_dir_all(&dir).unwrap();
        for k in 0..*count {
            let g = (k * 37 % 251) as u8;
            let b = (k * 53 % 241) as u8;
            write_face(&dir.join(format!("{:03}.png", k)), *red, g, b);
        }
    }
}
