use std::path::PathBuf;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory holding uploaded student reference photos.
    pub upload_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Bind address for the HTTP API.
    pub bind: String,
    /// Euclidean distance below which a probe matches a gallery entry.
    pub match_tolerance: f32,
    /// Bearer token required on /api routes (unset = open).
    pub api_token: Option<String>,
    /// Bearer token required for retrain (unset = any authenticated caller).
    pub admin_token: Option<String>,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let upload_dir = std::env::var("ROLLCALL_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));

        let model_dir = std::env::var("ROLLCALL_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        Self {
            db_path,
            upload_dir,
            model_dir,
            bind: std::env::var("ROLLCALL_BIND").unwrap_or_else(|_| "0.0.0.0:5000".to_string()),
            match_tolerance: env_f32(
                "ROLLCALL_MATCH_TOLERANCE",
                rollcall_core::DEFAULT_MATCH_TOLERANCE,
            ),
            api_token: std::env::var("ROLLCALL_API_TOKEN").ok().filter(|t| !t.is_empty()),
            admin_token: std::env::var("ROLLCALL_ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
