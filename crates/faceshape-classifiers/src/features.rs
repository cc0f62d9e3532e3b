//! Landmark → feature vector encoding.
//!
//! The encoding is a 2D projection of the landmark cloud, centered on its
//! centroid and divided by the forehead-to-chin distance, flattened
//! row-major. It removes translation and face size but keeps in-plane
//! rotation, so head tilt is still visible to the classifier.

use ndarray::Array1;

use crate::landmarks::LandmarkSet;

/// Guard added to the face-height reference before dividing.
pub const SCALE_EPSILON: f64 = 1e-6;

/// Fixed-length encoding of one face: `[x0, y0, x1, y1, ...]`.
pub type FeatureVector = Array1<f64>;

/// Encode a landmark set into a `2 * N` feature vector.
///
/// 1. Keep `(x, y)`, drop `z`.
/// 2. Subtract the centroid of all points.
/// 3. Measure face height as the distance between the schema's forehead-top
///    and chin landmarks, in the original coordinates.
/// 4. Divide every centered coordinate by `height + SCALE_EPSILON`.
/// 5. Flatten row-major.
pub fn encode(landmarks: &LandmarkSet) -> FeatureVector {
    let points = landmarks.points();
    let n = points.len() as f64;

    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0f64, 0.0f64), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sum_x / n, sum_y / n);

    let schema = landmarks.schema();
    let face_height =
        landmarks[schema.forehead_top].planar_distance(&landmarks[schema.chin]);
    let scale = face_height + SCALE_EPSILON;

    let mut out = Vec::with_capacity(points.len() * 2);
    for p in points {
        out.push((p.x - cx) / scale);
        out.push((p.y - cy) / scale);
    }
    Array1::from_vec(out)
}

/// True when every component is finite.
pub fn is_finite(features: &FeatureVector) -> bool {
    features.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{Landmark, LandmarkSchema};

    fn synthetic_face(scale: f64, dx: f64, dy: f64) -> LandmarkSet {
        let schema = LandmarkSchema::FACE_MESH_468;
        let points = (0..schema.num_landmarks)
            .map(|i| {
                let t = i as f64 * 0.137;
                let x = 0.5 + 0.2 * t.cos() + 0.01 * (i % 7) as f64;
                let y = 0.5 + 0.3 * t.sin();
                Landmark::new(x * scale + dx, y * scale + dy, 0.01 * i as f64)
            })
            .collect();
        LandmarkSet::new(points, schema).unwrap()
    }

    #[test]
    fn encoding_has_two_values_per_landmark() {
        let features = encode(&synthetic_face(1.0, 0.0, 0.0));
        assert_eq!(features.len(), 936);
        assert!(is_finite(&features));
    }

    #[test]
    fn encoding_is_bit_identical_across_calls() {
        let face = synthetic_face(1.0, 0.0, 0.0);
        let a = encode(&face);
        let b = encode(&face);
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits()));
    }

    #[test]
    fn encoding_ignores_depth() {
        let face = synthetic_face(1.0, 0.0, 0.0);
        let flattened: Vec<Landmark> = face
            .points()
            .iter()
            .map(|p| Landmark::new(p.x, p.y, 0.0))
            .collect();
        let flat_face = LandmarkSet::new(flattened, *face.schema()).unwrap();
        assert_eq!(encode(&face), encode(&flat_face));
    }

    #[test]
    fn encoding_centers_the_cloud() {
        let features = encode(&synthetic_face(1.0, 0.2, -0.1));
        let mean_x: f64 = features.iter().step_by(2).sum::<f64>() / 468.0;
        let mean_y: f64 = features.iter().skip(1).step_by(2).sum::<f64>() / 468.0;
        assert!(mean_x.abs() < 1e-12);
        assert!(mean_y.abs() < 1e-12);
    }

    #[test]
    fn degenerate_face_height_stays_finite() {
        let schema = LandmarkSchema::FACE_MESH_468;
        let points = vec![Landmark::new(0.4, 0.4, 0.0); schema.num_landmarks];
        let features = encode(&LandmarkSet::new(points, schema).unwrap());
        assert!(is_finite(&features));
        // Centroid rounding leaves ~1e-17 residue, amplified by the epsilon.
        assert!(features.iter().all(|v| v.abs() < 1e-9));
    }
}
