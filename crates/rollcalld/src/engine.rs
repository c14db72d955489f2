//! Inference engine on a dedicated OS thread.
//!
//! ONNX sessions need `&mut` access, so a single thread owns the
//! [`FaceEncoder`] and serves requests from an mpsc channel; handlers
//! talk to it through the clone-safe [`EngineHandle`]. The recognition
//! and rebuild logic itself is in pure functions so it can be tested
//! with a stub encoder, no model files required.

use crate::gallery::Gallery;
use rollcall_core::{
    Embedding, FaceEncoder, GalleryEntry, Matcher, NearestMatcher, PipelineError, StudentSummary,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    /// True when the failure is a bad input image rather than an
    /// engine-side fault.
    pub fn is_input_error(&self) -> bool {
        matches!(self, EngineError::Pipeline(PipelineError::InvalidImage(_)))
    }
}

/// Per-face outcome of a recognition request, in detector output order.
#[derive(Debug, Clone)]
pub enum FaceOutcome {
    Matched {
        student: StudentSummary,
        distance: f32,
    },
    /// Detected but not recognized; `distance` is the nearest gallery
    /// distance (infinite against an empty gallery).
    Unmatched { distance: f32 },
}

/// One student's input to a gallery rebuild. `photo: None` means the
/// reference photo could not be resolved; the student is skipped.
pub struct EnrollPhoto {
    pub student: StudentSummary,
    pub photo: Option<Vec<u8>>,
}

enum EngineRequest {
    Recognize {
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        tolerance: f32,
        reply: oneshot::Sender<Result<Vec<FaceOutcome>, EngineError>>,
    },
    Rebuild {
        roster: Vec<EnrollPhoto>,
        reply: oneshot::Sender<Gallery>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect and match all faces in one captured frame against the given
    /// gallery snapshot.
    pub async fn recognize(
        &self,
        image: Vec<u8>,
        gallery: Arc<Gallery>,
        tolerance: f32,
    ) -> Result<Vec<FaceOutcome>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Recognize {
                image,
                gallery,
                tolerance,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Build a fresh gallery from the roster's reference photos.
    /// Per-student failures are isolated; this never fails as a whole.
    pub async fn rebuild(&self, roster: Vec<EnrollPhoto>) -> Result<Gallery, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Rebuild {
                roster,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The encoder (with its loaded models) is constructed by the caller so
/// startup fails fast before the thread exists.
pub fn spawn_engine(mut encoder: Box<dyn FaceEncoder + Send>) -> EngineHandle {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize {
                        image,
                        gallery,
                        tolerance,
                        reply,
                    } => {
                        let result =
                            run_recognize(encoder.as_mut(), &image, &gallery, tolerance);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Rebuild { roster, reply } => {
                        let gallery = build_gallery(encoder.as_mut(), roster);
                        let _ = reply.send(gallery);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}

/// Extract all face embeddings from the frame and match each against the
/// gallery snapshot. Zero faces is a normal outcome (empty vec).
fn run_recognize(
    encoder: &mut dyn FaceEncoder,
    image: &[u8],
    gallery: &Gallery,
    tolerance: f32,
) -> Result<Vec<FaceOutcome>, EngineError> {
    let embeddings = encoder.encode_all(image)?;
    tracing::debug!(faces = embeddings.len(), gallery = gallery.len(), "recognize");

    let matcher = NearestMatcher;
    let outcomes = embeddings
        .iter()
        .map(|embedding| {
            let result = matcher.compare(embedding, &gallery.entries, tolerance);
            match result.student {
                Some(student) if result.matched => FaceOutcome::Matched {
                    student,
                    distance: result.distance,
                },
                _ => FaceOutcome::Unmatched {
                    distance: result.distance,
                },
            }
        })
        .collect();
    Ok(outcomes)
}

/// Build a new gallery snapshot from scratch.
///
/// For each student: first detected face of the reference photo becomes
/// their representative embedding. Missing photos, undecodable images and
/// photos without a detectable face are logged and skipped — a
/// per-student failure never aborts the rebuild.
fn build_gallery(encoder: &mut dyn FaceEncoder, roster: Vec<EnrollPhoto>) -> Gallery {
    let total = roster.len();
    let mut entries = Vec::with_capacity(total);

    for EnrollPhoto { student, photo } in roster {
        let Some(bytes) = photo else {
            tracing::warn!(student_id = %student.student_id, "photo not found, student excluded from gallery");
            continue;
        };

        match encoder.encode_all(&bytes) {
            Ok(embeddings) => match first_face(embeddings) {
                Some(embedding) => entries.push(GalleryEntry { student, embedding }),
                None => {
                    tracing::warn!(
                        student_id = %student.student_id,
                        "no face found in photo, student excluded from gallery"
                    );
                }
            },
            Err(e) => {
                tracing::warn!(
                    student_id = %student.student_id,
                    error = %e,
                    "failed to process photo, student excluded from gallery"
                );
            }
        }
    }

    tracing::info!(enrolled = entries.len(), total, "gallery rebuilt");
    Gallery::new(entries)
}

/// The first detected face (detector output order) is the student's
/// representative embedding.
fn first_face(mut embeddings: Vec<Embedding>) -> Option<Embedding> {
    if embeddings.is_empty() {
        None
    } else {
        Some(embeddings.swap_remove(0))
    }
}
