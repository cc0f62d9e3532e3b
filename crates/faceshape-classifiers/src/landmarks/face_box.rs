//! SCRFD face box detector via ONNX Runtime.
//!
//! Used ahead of the face mesh: the mesh expects a face-centred square crop,
//! so photos are first searched for face boxes and the best one is cropped.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::RgbImage;
use ort::session::Session;
use ort::value::Tensor;

use crate::error::DetectorError;

const SCRFD_INPUT_SIZE: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_CONFIDENCE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_THRESHOLD: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;

/// Side of the mesh crop relative to the longer side of the face box.
const FACE_CROP_SCALE: f32 = 1.5;

/// Face box in source image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceBox {
    fn iou(&self, other: &FaceBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.width * self.height + other.width * other.height - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Square crop inside the image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x0: u32,
    pub y0: u32,
    pub side: u32,
}

impl CropRegion {
    /// Square around the box centre, `FACE_CROP_SCALE` times its longer
    /// side, shifted and shrunk as needed to stay inside the image.
    pub fn around(face: &FaceBox, image_width: u32, image_height: u32) -> Self {
        let max_side = image_width.min(image_height).max(1);
        let side = (face.width.max(face.height) * FACE_CROP_SCALE).round() as u32;
        let side = side.clamp(1, max_side);

        let cx = face.x + face.width / 2.0;
        let cy = face.y + face.height / 2.0;
        let place = |centre: f32, extent: u32| {
            let start = (centre - side as f32 / 2.0).round().max(0.0) as u32;
            start.min(extent.saturating_sub(side))
        };

        CropRegion {
            x0: place(cx, image_width),
            y0: place(cy, image_height),
            side,
        }
    }

    /// Map a point given in `[0, 1]` crop coordinates to `[0, 1]` image
    /// coordinates.
    pub fn to_image(&self, x: f64, y: f64, image_width: u32, image_height: u32) -> (f64, f64) {
        let side = self.side as f64;
        (
            (self.x0 as f64 + x * side) / image_width as f64,
            (self.y0 as f64 + y * side) / image_height as f64,
        )
    }

    pub fn crop(&self, image: &RgbImage) -> RgbImage {
        image::imageops::crop_imm(image, self.x0, self.y0, self.side, self.side).to_image()
    }
}

/// Scale and padding of the letterboxed detector input.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Output tensor indices for one stride: (score, bbox).
type StrideOutputIndices = (usize, usize);

/// SCRFD face detector. Boxes come back sorted by confidence.
pub struct FaceBoxDetector {
    session: Mutex<Session>,
    input_size: usize,
    stride_indices: [StrideOutputIndices; 3],
}

impl FaceBoxDetector {
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session =
            open_session(model_path).map_err(|e| DetectorError::LoadFailed(e.to_string()))?;
        let output_names: Vec<String> =
            session.outputs().iter().map(|o| o.name().to_string()).collect();
        if output_names.len() < 6 {
            return Err(DetectorError::LoadFailed(format!(
                "SCRFD model needs score and bbox outputs for 3 strides, got {} outputs",
                output_names.len()
            )));
        }

        let stride_indices = discover_output_indices(&output_names);
        log::info!(
            "Loaded face box model {} (outputs {:?})",
            model_path.display(),
            output_names
        );

        Ok(Self {
            session: Mutex::new(session),
            input_size: SCRFD_INPUT_SIZE,
            stride_indices,
        })
    }

    pub fn detect(&self, image: &RgbImage) -> Result<Vec<FaceBox>, DetectorError> {
        let (data, letterbox) = self.preprocess(image);
        let s = self.input_size;
        let input = Tensor::from_array(([1usize, 3, s, s], data))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::InferenceFailed("session mutex poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input])?;

        let mut boxes = Vec::new();
        for (pos, &stride) in SCRFD_STRIDES.iter().enumerate() {
            let (score_idx, bbox_idx) = self.stride_indices[pos];
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("scores stride {}: {}", stride, e)))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectorError::InferenceFailed(format!("bboxes stride {}: {}", stride, e)))?;
            boxes.extend(decode_stride(scores, bboxes, stride, s, &letterbox));
        }

        Ok(nms(boxes, SCRFD_NMS_THRESHOLD))
    }

    /// Letterbox into the square input, NCHW, normalized with the SCRFD mean
    /// and std. Padding normalizes to 0.
    fn preprocess(&self, image: &RgbImage) -> (Vec<f32>, Letterbox) {
        let s = self.input_size;
        let (w, h) = (image.width().max(1) as f32, image.height().max(1) as f32);
        let scale = (s as f32 / w).min(s as f32 / h);
        let new_w = ((w * scale).round() as usize).clamp(1, s);
        let new_h = ((h * scale).round() as usize).clamp(1, s);
        let pad_x = (s - new_w) as f32 / 2.0;
        let pad_y = (s - new_h) as f32 / 2.0;

        let resized = image::imageops::resize(image, new_w as u32, new_h as u32, FilterType::Triangle);
        let (x_start, y_start) = (pad_x.floor() as usize, pad_y.floor() as usize);
        let plane = s * s;
        let mut data = vec![0.0f32; 3 * plane];
        for (x, y, px) in resized.enumerate_pixels() {
            let offset = (y as usize + y_start) * s + x as usize + x_start;
            for c in 0..3 {
                data[c * plane + offset] = (px[c] as f32 - SCRFD_MEAN) / SCRFD_STD;
            }
        }

        (data, Letterbox { scale, pad_x, pad_y })
    }
}

fn open_session(model_path: &Path) -> ort::Result<Session> {
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(model_path)?;
    Ok(session)
}

/// Map strides to (score, bbox) outputs by name ("score_8", "bbox_8", ...),
/// falling back to the standard positional export order.
fn discover_output_indices(names: &[String]) -> [StrideOutputIndices; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{}_{}", prefix, stride);
        names.iter().position(|n| *n == target)
    };

    let named: Option<Vec<StrideOutputIndices>> = SCRFD_STRIDES
        .iter()
        .map(|&stride| Some((find("score", stride)?, find("bbox", stride)?)))
        .collect();

    match named {
        Some(found) => [found[0], found[1], found[2]],
        None => {
            log::debug!("SCRFD output names {:?} not recognized, using positional order", names);
            [(0, 3), (1, 4), (2, 5)]
        }
    }
}

fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    input_size: usize,
    letterbox: &Letterbox,
) -> Vec<FaceBox> {
    let grid = input_size / stride;
    let num_anchors = grid * grid * SCRFD_ANCHORS_PER_CELL;
    let step = stride as f32;

    let mut boxes = Vec::new();
    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= SCRFD_CONFIDENCE_THRESHOLD {
            continue;
        }
        let off = idx * 4;
        if off + 3 >= bboxes.len() {
            continue;
        }

        let cell = idx / SCRFD_ANCHORS_PER_CELL;
        let ax = (cell % grid) as f32 * step;
        let ay = (cell / grid) as f32 * step;
        let x1 = (ax - bboxes[off] * step - letterbox.pad_x) / letterbox.scale;
        let y1 = (ay - bboxes[off + 1] * step - letterbox.pad_y) / letterbox.scale;
        let x2 = (ax + bboxes[off + 2] * step - letterbox.pad_x) / letterbox.scale;
        let y2 = (ay + bboxes[off + 3] * step - letterbox.pad_y) / letterbox.scale;

        boxes.push(FaceBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: score,
        });
    }
    boxes
}

/// Greedy non-maximum suppression; output sorted by confidence.
fn nms(mut boxes: Vec<FaceBox>, iou_threshold: f32) -> Vec<FaceBox> {
    boxes.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<FaceBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn face(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceBox {
        FaceBox {
            x,
            y,
            width: w,
            height: h,
            confidence,
        }
    }

    #[test]
    fn nms_drops_overlapping_boxes() {
        let kept = nms(
            vec![
                face(5.0, 5.0, 100.0, 100.0, 0.8),
                face(0.0, 0.0, 100.0, 100.0, 0.9),
                face(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.7);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = face(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = face(5.0, 0.0, 10.0, 10.0, 1.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&face(20.0, 20.0, 5.0, 5.0, 1.0)), 0.0);
    }

    #[test]
    fn crop_is_square_centred_and_inside_the_image() {
        let crop = CropRegion::around(&face(100.0, 50.0, 40.0, 60.0, 0.9), 400, 300);
        assert_eq!(crop.side, 90);
        assert_eq!(crop, CropRegion { x0: 75, y0: 35, side: 90 });

        // Near the border the square is shifted, never cut.
        let corner = CropRegion::around(&face(0.0, 0.0, 40.0, 40.0, 0.9), 400, 300);
        assert_eq!((corner.x0, corner.y0, corner.side), (0, 0, 60));

        // Larger than the image: clamped to the shorter side.
        let huge = CropRegion::around(&face(0.0, 0.0, 400.0, 300.0, 0.9), 400, 300);
        assert_eq!(huge.side, 300);
        assert!(huge.x0 + huge.side <= 400);
    }

    #[test]
    fn crop_coordinates_map_back_to_the_image() {
        let crop = CropRegion { x0: 100, y0: 40, side: 200 };
        let (x, y) = crop.to_image(0.5, 0.25, 400, 200);
        assert!((x - 0.5).abs() < 1e-12);
        assert!((y - 0.45).abs() < 1e-12);

        let image = RgbImage::new(400, 200);
        assert_eq!(crop.crop(&image).dimensions(), (200, 200));
    }

    #[test]
    fn decode_maps_letterboxed_boxes_to_source_pixels() {
        // A 320x160 image letterboxed to 640: scale 2, 160 px of padding on top.
        let letterbox = Letterbox { scale: 2.0, pad_x: 0.0, pad_y: 160.0 };
        let stride = 32;
        let grid = SCRFD_INPUT_SIZE / stride;
        let n = grid * grid * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; n];
        let mut bboxes = vec![0.0f32; n * 4];
        // Anchor at cell (x=10, y=10) -> (320, 320) in input space.
        let idx = (10 * grid + 10) * SCRFD_ANCHORS_PER_CELL;
        scores[idx] = 0.95;
        bboxes[idx * 4..idx * 4 + 4].copy_from_slice(&[1.0, 1.0, 1.0, 1.0]);

        let boxes = decode_stride(&scores, &bboxes, stride, SCRFD_INPUT_SIZE, &letterbox);
        assert_eq!(boxes.len(), 1);
        let b = boxes[0];
        assert!((b.x - 144.0).abs() < 1e-4);
        assert!((b.y - 64.0).abs() < 1e-4);
        assert!((b.width - 32.0).abs() < 1e-4);
        assert!((b.height - 32.0).abs() < 1e-4);
    }

    #[test]
    fn output_indices_by_name_or_position() {
        let named: Vec<String> = ["bbox_8", "score_8", "bbox_16", "score_16", "bbox_32", "score_32"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(discover_output_indices(&named), [(1, 0), (3, 2), (5, 4)]);

        let generic: Vec<String> = (0..9).map(|i| i.to_string()).collect();
        assert_eq!(discover_output_indices(&generic), [(0, 3), (1, 4), (2, 5)]);
    }

    #[test]
    fn missing_model_is_reported() {
        assert!(matches!(
            FaceBoxDetector::load(Path::new("/nonexistent/scrfd.onnx")),
            Err(DetectorError::ModelNotFound(_))
        ));
    }
}
