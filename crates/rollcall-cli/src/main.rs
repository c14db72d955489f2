//! Roster and attendance administration against the local database.
//!
//! Operates on the same SQLite file and upload directory as the daemon.
//! Changes to the roster take effect in the recognition gallery on the
//! daemon's next retrain.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rollcall_store::{AttendanceStatus, NewStudent, PhotoStore, Store};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall attendance administration CLI")]
struct Cli {
    /// SQLite database path (default: $ROLLCALL_DB_PATH or the shared data dir)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Upload directory for reference photos (default: $ROLLCALL_UPLOAD_DIR)
    #[arg(long)]
    uploads: Option<PathBuf>,

    /// Print machine-readable JSON instead of plain text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new student with a reference photo
    AddStudent {
        /// Unique student code (e.g. "S001")
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        roll: String,
        #[arg(long)]
        department: String,
        /// Path to the reference photo
        #[arg(long)]
        photo: PathBuf,
    },
    /// List enrolled students
    ListStudents,
    /// Remove a student by code, including their attendance history
    RemoveStudent {
        /// Student code
        id: String,
    },
    /// Manually set a student's attendance for a date
    Mark {
        /// Student code
        #[arg(long)]
        id: String,
        /// "present" or "absent"
        #[arg(long)]
        status: String,
        /// Date in dd/mm/yyyy (default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Show attendance records
    Attendance {
        /// Date in dd/mm/yyyy (default: the full ledger)
        #[arg(long)]
        date: Option<String>,
    },
    /// List every date with attendance records
    Dates,
    /// Export one date's attendance as CSV
    Export {
        /// Date in dd/mm/yyyy
        #[arg(long)]
        date: String,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

fn parse_status(s: &str) -> Result<AttendanceStatus> {
    match s.to_ascii_lowercase().as_str() {
        "present" => Ok(AttendanceStatus::Present),
        "absent" => Ok(AttendanceStatus::Absent),
        other => bail!("unknown status {other:?} (expected \"present\" or \"absent\")"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let db_path = cli
        .db
        .or_else(|| std::env::var("ROLLCALL_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("attendance.db"));
    let upload_dir = cli
        .uploads
        .or_else(|| std::env::var("ROLLCALL_UPLOAD_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("uploads"));

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Store::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;

    match cli.command {
        Commands::AddStudent {
            id,
            name,
            roll,
            department,
            photo,
        } => {
            let photos = PhotoStore::open(&upload_dir)?;
            let bytes = std::fs::read(&photo)
                .with_context(|| format!("reading photo {}", photo.display()))?;
            let file_name = photo
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.jpg".to_string());
            let saved = photos.save(&file_name, &bytes)?;

            let result = store.insert_student(&NewStudent {
                student_id: id,
                name,
                roll,
                department,
                photo: saved.clone(),
            });
            if result.is_err() {
                let _ = photos.remove(&saved);
            }
            let student = result?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&student)?);
            } else {
                println!("enrolled {} ({})", student.student_id, student.name);
                println!("the daemon picks up the new face on its next retrain");
            }
        }
        Commands::ListStudents => {
            let students = store.list_students()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&students)?);
            } else {
                for s in &students {
                    println!("{}\t{}\t{}\t{}", s.student_id, s.name, s.roll, s.department);
                }
                println!("{} student(s)", students.len());
            }
        }
        Commands::RemoveStudent { id } => {
            let student = store
                .get_student_by_code(&id)?
                .with_context(|| format!("no student with code {id:?}"))?;
            let deleted = store.delete_student(student.id)?;
            let photos = PhotoStore::open(&upload_dir)?;
            if let Err(e) = photos.remove(&deleted.photo) {
                tracing::warn!(photo = %deleted.photo, error = %e, "failed to remove photo");
            }
            println!("removed {} and their attendance history", deleted.student_id);
        }
        Commands::Mark { id, status, date } => {
            let status = parse_status(&status)?;
            let student = store
                .get_student_by_code(&id)?
                .with_context(|| format!("no student with code {id:?}"))?;
            let date = date.unwrap_or_else(rollcall_store::attendance::today);
            let outcome = store.mark_attendance(&student.summary(), &date, Some(status))?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                println!("{id} on {date}: {outcome:?}");
            }
        }
        Commands::Attendance { date } => {
            let records = match date.as_deref() {
                Some(date) => store.list_attendance(date)?,
                None => store.list_all_attendance()?,
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                for r in &records {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        r.date, r.student_id, r.name, r.status, r.time
                    );
                }
                println!("{} record(s)", records.len());
            }
        }
        Commands::Dates => {
            for date in store.distinct_dates()? {
                println!("{date}");
            }
        }
        Commands::Export { date, out } => {
            let csv = store.export_csv(&date)?;
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("wrote {}", path.display());
                }
                None => print!("{csv}"),
            }
        }
    }

    Ok(())
}
