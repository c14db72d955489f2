//! Student roster CRUD.
//!
//! The roster is the source of truth the gallery cache is rebuilt from.
//! Deleting a student cascades to their attendance rows inside one
//! transaction; the cascade is manual because attendance rows reference
//! the institution-assigned `student_id` string, not the row id.

use crate::{Store, StoreError};
use rollcall_core::StudentSummary;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// An enrolled student as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub student_id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
    /// Photo reference resolved by [`crate::PhotoStore`].
    pub photo: String,
}

impl Student {
    /// The disposable copy carried into the gallery cache.
    pub fn summary(&self) -> StudentSummary {
        StudentSummary {
            id: self.id,
            student_id: self.student_id.clone(),
            name: self.name.clone(),
            roll: self.roll.clone(),
            department: self.department.clone(),
        }
    }
}

/// Enrollment form data.
#[derive(Debug, Clone, Deserialize)]
pub struct NewStudent {
    pub student_id: String,
    pub name: String,
    pub roll: String,
    pub department: String,
    pub photo: String,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub roll: Option<String>,
    pub department: Option<String>,
    pub photo: Option<String>,
}

fn row_to_student(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        student_id: row.get(1)?,
        name: row.get(2)?,
        roll: row.get(3)?,
        department: row.get(4)?,
        photo: row.get(5)?,
    })
}

const STUDENT_COLS: &str = "id, student_id, name, roll, department, photo";

impl Store {
    /// Enroll a new student. A duplicate `student_id` is reported as
    /// [`StoreError::Duplicate`], not as a raw constraint violation.
    pub fn insert_student(&self, new: &NewStudent) -> Result<Student, StoreError> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO students (student_id, name, roll, department, photo)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![new.student_id, new.name, new.roll, new.department, new.photo],
        );

        match result {
            Ok(_) => {
                let id = conn.last_insert_rowid();
                tracing::info!(student_id = %new.student_id, id, "student enrolled");
                Ok(Student {
                    id,
                    student_id: new.student_id.clone(),
                    name: new.name.clone(),
                    roll: new.roll.clone(),
                    department: new.department.clone(),
                    photo: new.photo.clone(),
                })
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(new.student_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All enrolled students in enrollment (row id) order.
    pub fn list_students(&self) -> Result<Vec<Student>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {STUDENT_COLS} FROM students ORDER BY id"))?;
        let students = stmt
            .query_map([], row_to_student)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(students)
    }

    pub fn get_student(&self, id: i64) -> Result<Option<Student>, StoreError> {
        let conn = self.conn();
        let student = conn
            .query_row(
                &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?1"),
                params![id],
                row_to_student,
            )
            .optional()?;
        Ok(student)
    }

    /// Look up by the institution-assigned identifier.
    pub fn get_student_by_code(&self, student_id: &str) -> Result<Option<Student>, StoreError> {
        let conn = self.conn();
        let student = conn
            .query_row(
                &format!("SELECT {STUDENT_COLS} FROM students WHERE student_id = ?1"),
                params![student_id],
                row_to_student,
            )
            .optional()?;
        Ok(student)
    }

    /// Apply a partial update and return the updated record.
    pub fn update_student(&self, id: i64, patch: &StudentUpdate) -> Result<Student, StoreError> {
        {
            let conn = self.conn();
            let changed = conn.execute(
                "UPDATE students SET
                     name       = COALESCE(?2, name),
                     roll       = COALESCE(?3, roll),
                     department = COALESCE(?4, department),
                     photo      = COALESCE(?5, photo)
                 WHERE id = ?1",
                params![id, patch.name, patch.roll, patch.department, patch.photo],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(id));
            }
        }
        self.get_student(id)?.ok_or(StoreError::NotFound(id))
    }

    /// Delete a student and all of their attendance rows in one
    /// transaction. Returns the deleted record so the caller can clean up
    /// the photo file.
    pub fn delete_student(&self, id: i64) -> Result<Student, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let student = tx
            .query_row(
                &format!("SELECT {STUDENT_COLS} FROM students WHERE id = ?1"),
                params![id],
                row_to_student,
            )
            .optional()?
            .ok_or(StoreError::NotFound(id))?;

        let attendance_removed = tx.execute(
            "DELETE FROM attendance WHERE student_id = ?1",
            params![student.student_id],
        )?;
        tx.execute("DELETE FROM students WHERE id = ?1", params![id])?;
        tx.commit()?;

        tracing::info!(
            student_id = %student.student_id,
            attendance_removed,
            "student deleted"
        );
        Ok(student)
    }

    pub fn count_students(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
        Ok(count)
    }
}
