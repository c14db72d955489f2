//! Attendance service: glue between the engine, the gallery cache and
//! the store. Everything the HTTP layer and the startup path call goes
//! through here.

use crate::engine::{EngineError, EngineHandle, EnrollPhoto, FaceOutcome};
use crate::gallery::GalleryCache;
use rollcall_core::StudentSummary;
use rollcall_store::{
    attendance, AttendanceRecord, AttendanceStatus, MarkOutcome, NewStudent, PhotoStore, Store,
    StoreError, Student, StudentUpdate,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("unknown student: {0}")]
    UnknownStudent(String),
}

/// One recognized face with its attendance side effect.
#[derive(Debug, Clone, Serialize)]
pub struct RecognizedStudent {
    pub student: StudentSummary,
    pub distance: f32,
    pub attendance: MarkOutcome,
}

/// Result of processing one captured frame.
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    /// Faces detected in the frame, matched or not.
    pub faces_count: usize,
    pub recognized: Vec<RecognizedStudent>,
}

/// Enrollment form fields (the photo travels separately as bytes).
#[derive(Debug, Clone, Deserialize)]
pub struct EnrollForm {
    pub student_id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardCounts {
    pub total_students: i64,
    pub total_attendance: i64,
    pub today_attendance: i64,
}

pub struct AttendanceService {
    store: Arc<Store>,
    photos: Arc<PhotoStore>,
    engine: EngineHandle,
    gallery: Arc<GalleryCache>,
    tolerance: f32,
}

impl AttendanceService {
    pub fn new(
        store: Arc<Store>,
        photos: Arc<PhotoStore>,
        engine: EngineHandle,
        gallery: Arc<GalleryCache>,
        tolerance: f32,
    ) -> Self {
        Self {
            store,
            photos,
            engine,
            gallery,
            tolerance,
        }
    }

    /// Recognize all faces in one captured frame and mark attendance for
    /// each confident match (automatic path: first event of the day wins).
    pub async fn recognize(&self, image: Vec<u8>) -> Result<Recognition, ServiceError> {
        let snapshot = self.gallery.snapshot();
        let outcomes = self
            .engine
            .recognize(image, snapshot, self.tolerance)
            .await?;

        let faces_count = outcomes.len();
        let today = attendance::today();
        let mut recognized = Vec::new();

        for outcome in outcomes {
            match outcome {
                FaceOutcome::Matched { student, distance } => {
                    let mark = self.store.mark_attendance(&student, &today, None)?;
                    tracing::info!(
                        student_id = %student.student_id,
                        distance,
                        "student recognized"
                    );
                    recognized.push(RecognizedStudent {
                        student,
                        distance,
                        attendance: mark,
                    });
                }
                FaceOutcome::Unmatched { distance } => {
                    tracing::debug!(distance, "face detected but not recognized");
                }
            }
        }

        Ok(Recognition {
            faces_count,
            recognized,
        })
    }

    /// Full gallery rebuild from the current roster.
    ///
    /// A roster query failure aborts and leaves the previous snapshot in
    /// place. Per-student photo problems are logged and skipped. On
    /// success the new snapshot atomically replaces the old one.
    pub async fn retrain(&self) -> Result<usize, ServiceError> {
        let students = self.store.list_students()?;

        let roster: Vec<EnrollPhoto> = students
            .iter()
            .map(|s| EnrollPhoto {
                student: s.summary(),
                photo: match self.photos.resolve(&s.photo) {
                    Ok(bytes) => Some(bytes),
                    Err(e) => {
                        tracing::warn!(
                            student_id = %s.student_id,
                            error = %e,
                            "reference photo unavailable"
                        );
                        None
                    }
                },
            })
            .collect();

        let gallery = self.engine.rebuild(roster).await?;
        let count = gallery.len();
        self.gallery.replace(gallery);
        tracing::info!(enrolled = count, "gallery cache replaced");
        Ok(count)
    }

    /// Enroll a student: persist the photo, then the roster row. The new
    /// face enters the gallery on the next retrain.
    pub fn enroll_student(
        &self,
        form: EnrollForm,
        photo_name: &str,
        photo_bytes: &[u8],
    ) -> Result<Student, ServiceError> {
        let photo = self.photos.save(photo_name, photo_bytes)?;
        let result = self.store.insert_student(&NewStudent {
            student_id: form.student_id,
            name: form.name,
            roll: form.roll,
            department: form.department,
            photo: photo.clone(),
        });
        if result.is_err() {
            // Roster insert failed; don't leave the photo orphaned.
            if let Err(e) = self.photos.remove(&photo) {
                tracing::warn!(photo = %photo, error = %e, "failed to remove orphaned photo");
            }
        }
        Ok(result?)
    }

    pub fn list_students(&self) -> Result<Vec<Student>, ServiceError> {
        Ok(self.store.list_students()?)
    }

    pub fn update_student(
        &self,
        id: i64,
        patch: &StudentUpdate,
    ) -> Result<Student, ServiceError> {
        Ok(self.store.update_student(id, patch)?)
    }

    /// Delete a student: roster row + attendance rows (one transaction),
    /// then the photo file. A photo removal failure is logged, not fatal —
    /// the next rebuild no longer includes the student either way.
    pub fn delete_student(&self, id: i64) -> Result<Student, ServiceError> {
        let student = self.store.delete_student(id)?;
        if let Err(e) = self.photos.remove(&student.photo) {
            tracing::warn!(photo = %student.photo, error = %e, "failed to remove photo");
        }
        Ok(student)
    }

    /// Manual attendance override for one student and date.
    pub fn mark_manual(
        &self,
        student_id: &str,
        date: Option<String>,
        status: AttendanceStatus,
    ) -> Result<MarkOutcome, ServiceError> {
        let student = self
            .store
            .get_student_by_code(student_id)?
            .ok_or_else(|| ServiceError::UnknownStudent(student_id.to_string()))?;
        let date = date.unwrap_or_else(attendance::today);
        Ok(self
            .store
            .mark_attendance(&student.summary(), &date, Some(status))?)
    }

    pub fn list_attendance(&self, date: Option<&str>) -> Result<Vec<AttendanceRecord>, ServiceError> {
        Ok(match date {
            Some(date) => self.store.list_attendance(date)?,
            None => self.store.list_all_attendance()?,
        })
    }

    pub fn distinct_dates(&self) -> Result<Vec<String>, ServiceError> {
        Ok(self.store.distinct_dates()?)
    }

    /// CSV report for one date covering the full roster.
    pub fn export_csv(&self, date: &str) -> Result<String, ServiceError> {
        Ok(self.store.export_csv(date)?)
    }

    pub fn dashboard(&self) -> Result<DashboardCounts, ServiceError> {
        Ok(DashboardCounts {
            total_students: self.store.count_students()?,
            total_attendance: self.store.count_attendance()?,
            today_attendance: self.store.count_attendance_on(&attendance::today())?,
        })
    }
}
