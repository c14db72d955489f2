//! rollcall-core — Face detection and recognition engine.
//!
//! Uses SCRFD for face detection and ArcFace for embedding extraction,
//! both running via ONNX Runtime for CPU inference. Matching is
//! nearest-neighbour Euclidean distance over a gallery of enrolled
//! student embeddings.

mod alignment;
pub mod detector;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use detector::FaceDetector;
pub use pipeline::{decode_rgb, FaceEncoder, FacePipeline, PipelineError, RgbFrame};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, Embedding, GalleryEntry, MatchResult, Matcher, NearestMatcher, StudentSummary,
};

/// Match tolerance carried over from the original system: a probe is
/// accepted only when its nearest gallery distance is strictly below this.
pub const DEFAULT_MATCH_TOLERANCE: f32 = 0.6;
