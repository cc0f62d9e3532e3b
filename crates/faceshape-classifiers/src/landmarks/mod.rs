//! Facial landmark types and the extraction boundary.
//!
//! The landmark detector is an external collaborator: anything that turns an
//! RGB image into ordered `(x, y, z)` face points can implement
//! [`LandmarkDetector`]. [`LandmarkExtractor`] wraps a detector handle and
//! collapses every per-image failure into a single "no landmarks" outcome
//! carrying a [`SkipReason`](crate::corpus::SkipReason).

#[cfg(feature = "onnx")]
pub mod face_box;
#[cfg(feature = "onnx")]
pub mod face_mesh;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::corpus::SkipReason;
use crate::error::DetectorError;

/// Landmark topology produced by a detector model.
///
/// The forehead/chin indices are tied to the point ordering of the model; a
/// detector upgrade that reorders points needs a new schema, not new literals
/// scattered through the feature code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkSchema {
    pub name: &'static str,
    pub num_landmarks: usize,
    /// Top of the forehead (upper end of the face-height reference).
    pub forehead_top: usize,
    /// Bottom of the chin (lower end of the face-height reference).
    pub chin: usize,
}

impl LandmarkSchema {
    /// MediaPipe face mesh, 468 points.
    pub const FACE_MESH_468: LandmarkSchema = LandmarkSchema {
        name: "face-mesh",
        num_landmarks: 468,
        forehead_top: 10,
        chin: 152,
    };

    /// MediaPipe face landmarker: face mesh plus 10 iris points.
    pub const FACE_LANDMARKER_478: LandmarkSchema = LandmarkSchema {
        name: "face-landmarker",
        num_landmarks: 478,
        forehead_top: 10,
        chin: 152,
    };

    /// Look up a built-in schema by name.
    pub fn from_name(name: &str) -> Option<LandmarkSchema> {
        match name.to_lowercase().as_str() {
            "face-mesh" | "face_mesh" | "facemesh" => Some(Self::FACE_MESH_468),
            "face-landmarker" | "face_landmarker" => Some(Self::FACE_LANDMARKER_478),
            _ => None,
        }
    }

    /// Length of a feature vector encoded under this schema.
    pub fn feature_len(&self) -> usize {
        self.num_landmarks * 2
    }
}

impl Default for LandmarkSchema {
    fn default() -> Self {
        Self::FACE_MESH_468
    }
}

/// A single landmark in image-normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Distance in the image plane, ignoring depth.
    pub fn planar_distance(&self, other: &Landmark) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// The ordered landmarks of one face, validated against its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
    schema: LandmarkSchema,
}

impl LandmarkSet {
    /// Returns `None` when the point count does not match the schema.
    pub fn new(points: Vec<Landmark>, schema: LandmarkSchema) -> Option<Self> {
        if points.len() != schema.num_landmarks {
            return None;
        }
        Some(Self { points, schema })
    }

    /// Build from a flat `[x0, y0, z0, x1, ...]` buffer.
    pub fn from_flat(values: &[f32], schema: LandmarkSchema) -> Option<Self> {
        if values.len() != schema.num_landmarks * 3 {
            return None;
        }
        let points = values
            .chunks_exact(3)
            .map(|c| Landmark::new(c[0] as f64, c[1] as f64, c[2] as f64))
            .collect();
        Some(Self { points, schema })
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    pub fn schema(&self) -> &LandmarkSchema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl std::ops::Index<usize> for LandmarkSet {
    type Output = Landmark;

    fn index(&self, idx: usize) -> &Self::Output {
        &self.points[idx]
    }
}

/// One face returned by a detector, as raw points plus a confidence.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub points: Vec<Landmark>,
    pub confidence: f32,
}

/// Pluggable landmark detection backend.
///
/// Implementations receive a decoded RGB image and return the faces found,
/// ordered by confidence (primary face first). The handle is shared across
/// dataset-building workers, so implementations that are not reentrant must
/// serialize access internally.
pub trait LandmarkDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError>;

    /// Landmark topology this detector produces.
    fn schema(&self) -> LandmarkSchema;
}

/// Turns images into landmark sets, absorbing per-image failures.
pub struct LandmarkExtractor<'a> {
    detector: &'a dyn LandmarkDetector,
}

impl<'a> LandmarkExtractor<'a> {
    pub fn new(detector: &'a dyn LandmarkDetector) -> Self {
        Self { detector }
    }

    pub fn schema(&self) -> LandmarkSchema {
        self.detector.schema()
    }

    /// Landmarks of the primary face, or `None`.
    pub fn extract(&self, image: &RgbImage) -> Option<LandmarkSet> {
        self.try_extract(image).ok()
    }

    /// Like [`extract`](Self::extract) but reports why nothing was returned.
    pub fn try_extract(&self, image: &RgbImage) -> Result<LandmarkSet, SkipReason> {
        if image.width() == 0 || image.height() == 0 {
            return Err(SkipReason::EmptyImage);
        }

        let faces = match self.detector.detect(image) {
            Ok(faces) => faces,
            Err(e) => {
                log::debug!("Landmark detection failed: {}", e);
                return Err(SkipReason::DetectorFailed);
            }
        };

        let Some(primary) = faces.into_iter().next() else {
            return Err(SkipReason::NoFace);
        };

        let schema = self.detector.schema();
        let count = primary.points.len();
        LandmarkSet::new(primary.points, schema).ok_or_else(|| {
            log::warn!(
                "Detector returned {} landmarks, schema '{}' expects {}",
                count,
                schema.name,
                schema.num_landmarks
            );
            SkipReason::LandmarkCountMismatch
        })
    }
}
