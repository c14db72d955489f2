//! rollcall-store — SQLite persistence for the attendance service.
//!
//! Owns the student roster, the attendance ledger and the filesystem
//! photo store. The idempotent mark-attendance transaction lives here;
//! everything above it only sees result values.

pub mod attendance;
mod error;
pub mod photos;
pub mod student;

pub use attendance::{AttendanceRecord, AttendanceStatus, MarkOutcome};
pub use error::StoreError;
pub use photos::PhotoStore;
pub use student::{NewStudent, Student, StudentUpdate};

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    id          INTEGER PRIMARY KEY,
    student_id  TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    roll        TEXT NOT NULL,
    department  TEXT NOT NULL,
    photo       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id          INTEGER PRIMARY KEY,
    student_id  TEXT NOT NULL,
    roll        TEXT NOT NULL,
    name        TEXT NOT NULL,
    department  TEXT NOT NULL,
    time        TEXT NOT NULL,
    date        TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'Present'
);

CREATE INDEX IF NOT EXISTS idx_attendance_student_date
    ON attendance (student_id, date);
";

/// Handle to the SQLite database.
///
/// A single connection behind a mutex: every call is a short local
/// operation, and per-call transactions give the roll-back-in-full
/// guarantee for mutations.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database at the given path and apply the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex only means another thread panicked mid-call;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_applies_schema() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_students().unwrap(), 0);
        assert_eq!(store.count_attendance().unwrap(), 0);
    }

    #[test]
    fn open_creates_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        let store = Store::open(&path).unwrap();
        assert_eq!(store.list_students().unwrap().len(), 0);
        assert!(path.exists());
    }
}
