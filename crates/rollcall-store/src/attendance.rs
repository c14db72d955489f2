//! Attendance ledger: one row per (student, calendar date).
//!
//! Uniqueness is enforced by read-before-write inside a transaction, not
//! by a storage constraint — the row shape and the day/month/year string
//! dates are compatible with the system this replaces.

use crate::{Store, StoreError};
use rollcall_core::StudentSummary;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attendance dates are `%d/%m/%Y` strings, treated as opaque keys.
pub fn today() -> String {
    chrono::Local::now().format("%d/%m/%Y").to_string()
}

/// Timestamps are `%H:%M:%S` strings.
pub fn now_time() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttendanceStatus::Present => write!(f, "Present"),
            AttendanceStatus::Absent => write!(f, "Absent"),
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {other}")),
        }
    }
}

/// One attendance row. Student fields are denormalized so the ledger
/// remains readable after a student record changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    pub roll: String,
    pub name: String,
    pub department: String,
    /// `%H:%M:%S`, empty when the row records an explicit absence.
    pub time: String,
    /// `%d/%m/%Y`.
    pub date: String,
    pub status: AttendanceStatus,
}

/// What a mark-attendance call did.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MarkOutcome {
    /// A new row was inserted.
    Marked { time: String },
    /// A row already existed and no override was supplied — the first
    /// event of the day wins, nothing was changed.
    AlreadyMarked { time: String },
    /// A manual override rewrote an existing row.
    Updated {
        status: AttendanceStatus,
        time: String,
    },
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status_text: String = row.get(7)?;
    let status = status_text.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })?;
    Ok(AttendanceRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        roll: row.get(2)?,
        name: row.get(3)?,
        department: row.get(4)?,
        time: row.get(5)?,
        date: row.get(6)?,
        status,
    })
}

const RECORD_COLS: &str = "id, student_id, roll, name, department, time, date, status";

impl Store {
    pub fn find_attendance(
        &self,
        student_id: &str,
        date: &str,
    ) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let record = conn
            .query_row(
                &format!(
                    "SELECT {RECORD_COLS} FROM attendance
                     WHERE student_id = ?1 AND date = ?2"
                ),
                params![student_id, date],
                row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Idempotently mark attendance for one (student, date).
    ///
    /// Without an override (the automatic recognition path) an existing
    /// row is left untouched. With an override (the manual path) the row
    /// status is rewritten: the timestamp is reset to now for Present and
    /// cleared for Absent. The whole operation is one transaction.
    pub fn mark_attendance(
        &self,
        student: &StudentSummary,
        date: &str,
        override_status: Option<AttendanceStatus>,
    ) -> Result<MarkOutcome, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                &format!(
                    "SELECT {RECORD_COLS} FROM attendance
                     WHERE student_id = ?1 AND date = ?2"
                ),
                params![student.student_id, date],
                row_to_record,
            )
            .optional()?;

        let outcome = match (existing, override_status) {
            (Some(record), None) => {
                // First recognition event of the day already recorded.
                MarkOutcome::AlreadyMarked { time: record.time }
            }
            (Some(record), Some(status)) => {
                let time = match status {
                    AttendanceStatus::Present => now_time(),
                    AttendanceStatus::Absent => String::new(),
                };
                tx.execute(
                    "UPDATE attendance SET status = ?2, time = ?3 WHERE id = ?1",
                    params![record.id, status.to_string(), time],
                )?;
                MarkOutcome::Updated { status, time }
            }
            (None, status) => {
                let status = status.unwrap_or(AttendanceStatus::Present);
                let time = match status {
                    AttendanceStatus::Present => now_time(),
                    AttendanceStatus::Absent => String::new(),
                };
                tx.execute(
                    "INSERT INTO attendance
                         (student_id, roll, name, department, time, date, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        student.student_id,
                        student.roll,
                        student.name,
                        student.department,
                        time,
                        date,
                        status.to_string()
                    ],
                )?;
                MarkOutcome::Marked { time }
            }
        };

        tx.commit()?;
        tracing::debug!(student_id = %student.student_id, date, ?outcome, "attendance marked");
        Ok(outcome)
    }

    /// All attendance rows for one date.
    pub fn list_attendance(&self, date: &str) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLS} FROM attendance WHERE date = ?1 ORDER BY time"
        ))?;
        let records = stmt
            .query_map(params![date], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// The full ledger, most recent first.
    pub fn list_all_attendance(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RECORD_COLS} FROM attendance ORDER BY date DESC, time DESC"
        ))?;
        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Every date with at least one attendance row.
    pub fn distinct_dates(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT DISTINCT date FROM attendance ORDER BY date DESC")?;
        let dates = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dates)
    }

    pub fn count_attendance(&self) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row("SELECT COUNT(*) FROM attendance", [], |r| r.get(0))?;
        Ok(count)
    }

    pub fn count_attendance_on(&self, date: &str) -> Result<i64, StoreError> {
        let conn = self.conn();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM attendance WHERE date = ?1",
            params![date],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// CSV report for one date covering the full roster: recorded rows as
    /// stored, everyone without a row as an explicit Absent line.
    pub fn export_csv(&self, date: &str) -> Result<String, StoreError> {
        let students = self.list_students()?;
        let records = self.list_attendance(date)?;

        let mut csv = String::from("student_id,name,roll,department,date,status,time\n");
        for student in &students {
            let row = records.iter().find(|r| r.student_id == student.student_id);
            let (status, time) = match row {
                Some(r) => (r.status.to_string(), r.time.as_str()),
                None => (AttendanceStatus::Absent.to_string(), ""),
            };
            for field in [
                student.student_id.as_str(),
                student.name.as_str(),
                student.roll.as_str(),
                student.department.as_str(),
                date,
                status.as_str(),
                time,
            ] {
                csv.push_str(&csv_field(field));
                csv.push(',');
            }
            csv.pop(); // trailing comma
            csv.push('\n');
        }
        Ok(csv)
    }
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn csv_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
