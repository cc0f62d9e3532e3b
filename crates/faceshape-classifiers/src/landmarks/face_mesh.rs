//! Face mesh landmark model via ONNX Runtime.
//!
//! Runs a MediaPipe-style face mesh network over a face-centred square crop
//! resized to the model's square input. The crop comes from an optional
//! [`FaceBoxDetector`]; without one the whole image is fed to the mesh. The
//! first output holds `N * 3` coordinates in input pixel space; an optional
//! second output is a face-presence logit.

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::error::DetectorError;
use crate::landmarks::face_box::{CropRegion, FaceBoxDetector};
use crate::landmarks::{DetectedFace, Landmark, LandmarkDetector, LandmarkSchema};

const FACE_MESH_INPUT_SIZE: u32 = 192;
const FACE_PRESENCE_THRESHOLD: f32 = 0.5;

/// Memory layout of the model's image input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputLayout {
    /// `1 x H x W x 3` (TFLite conversions).
    #[default]
    Nhwc,
    /// `1 x 3 x H x W` (PyTorch-style exports).
    Nchw,
}

impl FromStr for InputLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nhwc" => Ok(InputLayout::Nhwc),
            "nchw" => Ok(InputLayout::Nchw),
            _ => Err(format!("Unknown input layout: {}. Valid options are: nhwc, nchw", s)),
        }
    }
}

/// Face mesh detector backed by an ONNX session.
///
/// `Session::run` needs exclusive access, so the session sits behind a mutex
/// and concurrent dataset workers take turns.
pub struct FaceMeshDetector {
    session: Mutex<Session>,
    schema: LandmarkSchema,
    layout: InputLayout,
    input_size: u32,
    face_boxes: Option<FaceBoxDetector>,
}

impl FaceMeshDetector {
    /// Load the ONNX model at `model_path`.
    pub fn load(
        model_path: &Path,
        schema: LandmarkSchema,
        layout: InputLayout,
    ) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session =
            open_session(model_path).map_err(|e| DetectorError::LoadFailed(e.to_string()))?;

        log::info!(
            "Loaded face mesh model {} ({} inputs, {} outputs, schema '{}')",
            model_path.display(),
            session.inputs().len(),
            session.outputs().len(),
            schema.name
        );

        Ok(Self {
            session: Mutex::new(session),
            schema,
            layout,
            input_size: FACE_MESH_INPUT_SIZE,
            face_boxes: None,
        })
    }

    /// Crop each image to its most confident face box before running the
    /// mesh. Images without a face box yield no faces.
    pub fn with_face_detector(mut self, face_boxes: FaceBoxDetector) -> Self {
        self.face_boxes = Some(face_boxes);
        self
    }

    pub fn crops_faces(&self) -> bool {
        self.face_boxes.is_some()
    }

    /// Resize to the model input and scale RGB to `[0, 1]`.
    fn preprocess(&self, image: &RgbImage) -> Vec<f32> {
        let size = self.input_size;
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let n = (size * size) as usize;

        match self.layout {
            InputLayout::Nhwc => resized.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
            InputLayout::Nchw => {
                let mut data = vec![0.0f32; 3 * n];
                for (i, px) in resized.pixels().enumerate() {
                    for c in 0..3 {
                        data[c * n + i] = px[c] as f32 / 255.0;
                    }
                }
                data
            }
        }
    }

    fn input_shape(&self) -> [usize; 4] {
        let s = self.input_size as usize;
        match self.layout {
            InputLayout::Nhwc => [1, s, s, 3],
            InputLayout::Nchw => [1, 3, s, s],
        }
    }
}

fn open_session(model_path: &Path) -> ort::Result<Session> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;
    Ok(session)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl FaceMeshDetector {
    /// Run the mesh on `image`; points are normalized to `image`.
    fn run_mesh(&self, image: &RgbImage) -> Result<Option<DetectedFace>, DetectorError> {
        let input = Tensor::from_array((self.input_shape(), self.preprocess(image)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::InferenceFailed("session mutex poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input])?;

        let (_, coords) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {}", e)))?;
        let confidence = if outputs.len() > 1 {
            let (_, score) = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("face flag: {}", e)))?;
            score.first().map(|&s| sigmoid(s)).unwrap_or(1.0)
        } else {
            1.0
        };

        if confidence < FACE_PRESENCE_THRESHOLD {
            return Ok(None);
        }
        if coords.len() % 3 != 0 {
            return Err(DetectorError::InferenceFailed(format!(
                "landmark output length {} is not a multiple of 3",
                coords.len()
            )));
        }

        let scale = self.input_size as f64;
        let points = coords
            .chunks_exact(3)
            .map(|c| Landmark::new(c[0] as f64 / scale, c[1] as f64 / scale, c[2] as f64 / scale))
            .collect();

        Ok(Some(DetectedFace { points, confidence }))
    }
}

/// Re-express crop-normalized points in whole-image coordinates.
fn map_from_crop(face: DetectedFace, crop: &CropRegion, width: u32, height: u32) -> DetectedFace {
    let depth_scale = crop.side as f64 / width as f64;
    let confidence = face.confidence;
    let points = face
        .points
        .into_iter()
        .map(|p| {
            let (x, y) = crop.to_image(p.x, p.y, width, height);
            Landmark::new(x, y, p.z * depth_scale)
        })
        .collect();
    DetectedFace { points, confidence }
}

impl LandmarkDetector for FaceMeshDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<DetectedFace>, DetectorError> {
        let Some(face_boxes) = &self.face_boxes else {
            return Ok(self.run_mesh(image)?.into_iter().collect());
        };

        let boxes = face_boxes.detect(image)?;
        let Some(primary) = boxes.first() else {
            return Ok(Vec::new());
        };

        let (width, height) = image.dimensions();
        let crop = CropRegion::around(primary, width, height);
        log::trace!("Face box {:?} cropped to {:?}", primary, crop);

        Ok(self
            .run_mesh(&crop.crop(image))?
            .map(|face| map_from_crop(face, &crop, width, height))
            .into_iter()
            .collect())
    }

    fn schema(&self) -> LandmarkSchema {
        self.schema
    }
}
