//! Image decoding and the detect-then-embed pipeline.
//!
//! [`FaceEncoder`] is the seam between the service layer and the ONNX
//! stack: it turns raw image bytes into one embedding per detected face.
//! Production code uses [`FacePipeline`]; tests substitute stub encoders.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("undecodable image payload: {0}")]
    InvalidImage(String),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// A decoded still frame as interleaved RGB pixel data
/// (`width * height * 3` bytes).
#[derive(Clone)]
pub struct RgbFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode arbitrary encoded image bytes (PNG, JPEG, ...) into an RGB frame.
///
/// Undecodable bytes are an input error, never a panic.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbFrame, PipelineError> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(RgbFrame {
        data: rgb.into_raw(),
        width,
        height,
    })
}

/// Turns encoded image bytes into face embeddings.
///
/// Implementations return one embedding per detected face, in the
/// detector's output order (confidence descending). An empty result means
/// no face was found — a normal outcome, not an error.
pub trait FaceEncoder {
    fn encode_all(&mut self, image_bytes: &[u8]) -> Result<Vec<Embedding>, PipelineError>;
}

/// The production encoder: SCRFD detection followed by ArcFace extraction.
pub struct FacePipeline {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FacePipeline {
    /// Load both ONNX models. Fails fast if either file is missing.
    pub fn load(scrfd_path: &str, arcface_path: &str) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for FacePipeline {
    fn encode_all(&mut self, image_bytes: &[u8]) -> Result<Vec<Embedding>, PipelineError> {
        let frame = decode_rgb(image_bytes)?;
        let faces = self.detector.detect(&frame)?;
        tracing::debug!(count = faces.len(), "faces detected");

        let mut embeddings = Vec::with_capacity(faces.len());
        for face in &faces {
            if face.landmarks.is_none() {
                // SCRFD always emits landmarks in practice; a face without
                // them cannot be aligned, so it contributes no embedding.
                tracing::warn!(confidence = face.confidence, "detection without landmarks skipped");
                continue;
            }
            embeddings.push(self.recognizer.extract(&frame, face)?);
        }
        Ok(embeddings)
    }
}
