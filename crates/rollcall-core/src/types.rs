use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace, L2-normalized).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute Euclidean distance between two embeddings.
    ///
    /// Lower = more similar. This is the metric the match tolerance is
    /// calibrated against.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Kept for diagnostics; matching uses
    /// [`euclidean_distance`](Self::euclidean_distance).
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }
}

/// Disposable roster copy carried next to each gallery embedding.
///
/// The persistence layer owns the student record; this is only what a
/// recognition response needs to name the match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    /// Database row id.
    pub id: i64,
    /// Institution-assigned student identifier (unique).
    pub student_id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
}

/// One enrolled face in the gallery: the student's representative
/// embedding (first face found in their reference photo).
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub student: StudentSummary,
    pub embedding: Embedding,
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Euclidean distance of the nearest gallery entry.
    /// `f32::INFINITY` when the gallery is empty.
    pub distance: f32,
    /// The matched student (if any).
    pub student: Option<StudentSummary>,
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult;
}

/// Nearest-neighbour Euclidean matcher.
///
/// Always traverses the full gallery. Strict `<` comparison means equal
/// distances resolve to the earliest-enrolled entry, and a match is
/// accepted only when the minimum distance is strictly below the
/// tolerance — a distance at the tolerance is "detected but not
/// recognized".
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], tolerance: f32) -> MatchResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist < tolerance => MatchResult {
                matched: true,
                distance: best_dist,
                student: Some(gallery[idx].student.clone()),
            },
            _ => MatchResult {
                matched: false,
                distance: best_dist,
                student: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedding(values: Vec<f32>) -> Embedding {
        Embedding {
            values,
            model_version: None,
        }
    }

    fn entry(id: i64, name: &str, values: Vec<f32>) -> GalleryEntry {
        GalleryEntry {
            student: StudentSummary {
                id,
                student_id: format!("S{id:03}"),
                name: name.into(),
                roll: id.to_string(),
                department: "CS".into(),
            },
            embedding: embedding(values),
        }
    }

    #[test]
    fn euclidean_distance_identical_is_zero() {
        let a = embedding(vec![1.0, 0.0, 0.0]);
        assert!(a.euclidean_distance(&a.clone()) < 1e-6);
    }

    #[test]
    fn euclidean_distance_unit_axes() {
        let a = embedding(vec![1.0, 0.0]);
        let b = embedding(vec![0.0, 1.0]);
        assert!((a.euclidean_distance(&b) - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn similarity_orthogonal_is_zero() {
        let a = embedding(vec![1.0, 0.0]);
        let b = embedding(vec![0.0, 1.0]);
        assert!(a.similarity(&b).abs() < 1e-6);
    }

    #[test]
    fn similarity_zero_vector_is_zero() {
        let a = embedding(vec![0.0, 0.0]);
        let b = embedding(vec![1.0, 0.0]);
        assert_eq!(a.similarity(&b), 0.0);
    }

    #[test]
    fn nearest_matcher_picks_closest_entry() {
        let probe = embedding(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            entry(1, "far", vec![0.0, 1.0, 0.0]),
            entry(2, "farther", vec![0.0, 0.0, 1.0]),
            entry(3, "close", vec![0.9, 0.1, 0.0]),
        ];

        let result = NearestMatcher.compare(&probe, &gallery, 0.6);
        assert!(result.matched);
        assert_eq!(result.student.as_ref().map(|s| s.id), Some(3));
        assert!(result.distance < 0.6);
    }

    #[test]
    fn nearest_matcher_rejects_above_tolerance() {
        let probe = embedding(vec![1.0, 0.0]);
        let gallery = vec![entry(1, "other", vec![0.0, 1.0])];

        let result = NearestMatcher.compare(&probe, &gallery, 0.6);
        assert!(!result.matched);
        assert!(result.student.is_none());
        // distance is still reported for diagnostics
        assert!((result.distance - 2.0f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn nearest_matcher_rejects_distance_at_tolerance() {
        // distance exactly 0.6 must not match ("at/above" is a rejection)
        let probe = embedding(vec![0.0, 0.0]);
        let gallery = vec![entry(1, "edge", vec![0.6, 0.0])];

        let result = NearestMatcher.compare(&probe, &gallery, 0.6);
        assert!(!result.matched);
    }

    #[test]
    fn nearest_matcher_empty_gallery() {
        let probe = embedding(vec![1.0, 0.0]);
        let result = NearestMatcher.compare(&probe, &[], 0.6);
        assert!(!result.matched);
        assert_eq!(result.distance, f32::INFINITY);
    }

    #[test]
    fn nearest_matcher_tie_breaks_to_earliest_entry() {
        // Two entries at identical distance: the earlier enrollment wins.
        let probe = embedding(vec![0.0, 0.0]);
        let gallery = vec![
            entry(1, "first", vec![0.3, 0.0]),
            entry(2, "second", vec![0.0, 0.3]),
        ];

        let result = NearestMatcher.compare(&probe, &gallery, 0.6);
        assert!(result.matched);
        assert_eq!(result.student.as_ref().map(|s| s.id), Some(1));
    }
}
