//! JSON HTTP API.
//!
//! Thin layer over [`AttendanceService`]: transport decoding (base64
//! image payloads), bearer-token authorization and error mapping happen
//! here, before any core logic runs.

use crate::service::{AttendanceService, EnrollForm, ServiceError};
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine as _;
use rollcall_store::{AttendanceStatus, StudentUpdate};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AttendanceService>,
    pub api_token: Option<String>,
    pub admin_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/recognize", post(recognize))
        .route("/retrain", post(retrain))
        .route("/students", get(list_students).post(create_student))
        .route("/students/{id}", put(update_student).delete(delete_student))
        .route("/attendance", get(list_attendance))
        .route("/attendance/dates", get(attendance_dates))
        .route("/attendance/mark", post(mark_attendance))
        .route("/attendance/export", get(export_attendance))
        .route("/dashboard", get(dashboard))
        .layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Errors ---

enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "not authenticated".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "unauthorized".into()),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        use rollcall_store::StoreError;
        match &e {
            ServiceError::UnknownStudent(_) => ApiError::NotFound(e.to_string()),
            ServiceError::Store(StoreError::NotFound(_)) => ApiError::NotFound(e.to_string()),
            ServiceError::Store(StoreError::Duplicate(_)) => ApiError::Conflict(e.to_string()),
            ServiceError::Engine(engine) if engine.is_input_error() => {
                ApiError::BadRequest(e.to_string())
            }
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

// --- Auth ---

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// All /api routes require the API token when one is configured. The
/// admin token is also accepted so administrators need only one secret.
async fn require_token(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(expected) = &state.api_token {
        let presented = bearer(req.headers());
        let admin_ok = state.admin_token.as_deref().is_some_and(|t| presented == Some(t));
        if presented != Some(expected.as_str()) && !admin_ok {
            return ApiError::Unauthorized.into_response();
        }
    }
    next.run(req).await
}

/// Retrain is administrator-only when an admin token is configured.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    if let Some(admin) = &state.admin_token {
        if bearer(headers) != Some(admin.as_str()) {
            return Err(ApiError::Forbidden);
        }
    }
    Ok(())
}

// --- Transport decoding ---

/// Accepts either a browser data URL ("data:image/png;base64,...") or a
/// bare base64 string.
fn decode_image_payload(payload: &str) -> Result<Vec<u8>, ApiError> {
    let b64 = match payload.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => payload,
    };
    base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid image encoding: {e}")))
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Deserialize)]
struct RecognizeRequest {
    image: Option<String>,
}

#[derive(Serialize)]
struct RecognizeResponse {
    message: String,
    faces_count: usize,
    recognized: Vec<crate::service::RecognizedStudent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

async fn recognize(
    State(state): State<AppState>,
    Json(req): Json<RecognizeRequest>,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let payload = req
        .image
        .ok_or_else(|| ApiError::BadRequest("no image data provided".into()))?;
    let bytes = decode_image_payload(&payload)?;

    let result = state.service.recognize(bytes).await?;

    let (message, suggestion) = if result.faces_count == 0 {
        ("No face detected".to_string(), None)
    } else if result.recognized.is_empty() {
        (
            "Face detected but not recognized".to_string(),
            Some("Student may not be registered or photo is unclear.".to_string()),
        )
    } else {
        ("Face(s) recognized successfully!".to_string(), None)
    };

    Ok(Json(RecognizeResponse {
        message,
        faces_count: result.faces_count,
        recognized: result.recognized,
        suggestion,
    }))
}

#[derive(Serialize)]
struct RetrainResponse {
    rebuilt_count: usize,
}

async fn retrain(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<RetrainResponse>, ApiError> {
    require_admin(&state, &headers)?;
    let rebuilt_count = state.service.retrain().await?;
    Ok(Json(RetrainResponse { rebuilt_count }))
}

async fn list_students(
    State(state): State<AppState>,
) -> Result<Json<Vec<rollcall_store::Student>>, ApiError> {
    Ok(Json(state.service.list_students()?))
}

#[derive(Deserialize)]
struct CreateStudentRequest {
    student_id: String,
    name: String,
    roll: String,
    department: String,
    /// Base64 (or data URL) encoded reference photo.
    photo: String,
    photo_name: Option<String>,
}

async fn create_student(
    State(state): State<AppState>,
    Json(req): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<rollcall_store::Student>), ApiError> {
    let bytes = decode_image_payload(&req.photo)?;
    let student = state.service.enroll_student(
        EnrollForm {
            student_id: req.student_id,
            name: req.name,
            roll: req.roll,
            department: req.department,
        },
        req.photo_name.as_deref().unwrap_or("photo.jpg"),
        &bytes,
    )?;
    Ok((StatusCode::CREATED, Json(student)))
}

#[derive(Deserialize)]
struct UpdateStudentRequest {
    name: Option<String>,
    roll: Option<String>,
    department: Option<String>,
}

async fn update_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateStudentRequest>,
) -> Result<Json<rollcall_store::Student>, ApiError> {
    let student = state.service.update_student(
        id,
        &StudentUpdate {
            name: req.name,
            roll: req.roll,
            department: req.department,
            photo: None,
        },
    )?;
    Ok(Json(student))
}

async fn delete_student(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let student = state.service.delete_student(id)?;
    Ok(Json(serde_json::json!({ "deleted": student.student_id })))
}

#[derive(Deserialize)]
struct DateQuery {
    date: Option<String>,
}

async fn list_attendance(
    State(state): State<AppState>,
    Query(query): Query<DateQuery>,
) -> Result<Json<Vec<rollcall_store::AttendanceRecord>>, ApiError> {
    Ok(Json(state.service.list_attendance(query.date.as_deref())?))
}

async fn attendance_dates(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.service.distinct_dates()?))
}

#[derive(Deserialize)]
struct ManualMarkRequest {
    student_id: String,
    date: Option<String>,
    status: AttendanceStatus,
}

async fn mark_attendance(
    State(state): State<AppState>,
    Json(req): Json<ManualMarkRequest>,
) -> Result<Json<rollcall_store::MarkOutcome>, ApiError> {
    let outcome = state
        .service
        .mark_manual(&req.student_id, req.date, req.status)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct ExportQuery {
    date: String,
}

async fn export_attendance(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    let csv = state.service.export_csv(&query.date)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"attendance.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<crate::service::DashboardCounts>, ApiError> {
    Ok(Json(state.service.dashboard()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::engine::testing::TextEncoder;
    use crate::gallery::GalleryCache;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use base64::Engine;
    use rollcall_store::{PhotoStore, Store};
    use tower::util::ServiceExt;

    fn app(api_token: Option<&str>, admin_token: Option<&str>) -> (Router, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let photos = Arc::new(PhotoStore::open(dir.path()).unwrap());
        let engine = spawn_engine(Box::new(TextEncoder));
        let gallery = Arc::new(GalleryCache::empty());
        let service = Arc::new(AttendanceService::new(
            store, photos, engine, gallery, 0.6,
        ));
        let router = router(AppState {
            service,
            api_token: api_token.map(String::from),
            admin_token: admin_token.map(String::from),
        });
        (router, dir)
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_open() {
        let (app, _dir) = app(Some("secret"), None);
        let response = app
            .oneshot(HttpRequest::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn api_requires_token_when_configured() {
        let (app, _dir) = app(Some("secret"), None);
        let response = app
            .oneshot(
                HttpRequest::get("/api/students")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn api_accepts_valid_token() {
        let (app, _dir) = app(Some("secret"), None);
        let response = app
            .oneshot(
                HttpRequest::get("/api/students")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn retrain_requires_admin_token() {
        let (app, _dir) = app(Some("secret"), Some("super"));
        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/api/retrain")
                    .header("authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(
                HttpRequest::post("/api/retrain")
                    .header("authorization", "Bearer super")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn recognize_missing_image_is_bad_request() {
        let (app, _dir) = app(None, None);
        let response = app
            .oneshot(
                HttpRequest::post("/api/recognize")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recognize_no_face_returns_zero_count() {
        let (app, _dir) = app(None, None);
        let body = serde_json::json!({ "image": b64(b"") }).to_string();
        let response = app
            .oneshot(
                HttpRequest::post("/api/recognize")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["faces_count"], 0);
        assert_eq!(json["message"], "No face detected");
    }

    #[tokio::test]
    async fn enroll_retrain_recognize_over_http() {
        let (app, _dir) = app(None, None);

        let body = serde_json::json!({
            "student_id": "S001",
            "name": "Ada",
            "roll": "1",
            "department": "CS",
            "photo": b64(b"1.0,0.0"),
        })
        .to_string();
        let response = app
            .clone()
            .oneshot(
                HttpRequest::post("/api/students")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(HttpRequest::post("/api/retrain").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["rebuilt_count"], 1);

        let body = serde_json::json!({ "image": b64(b"1.0,0.0") }).to_string();
        let response = app
            .oneshot(
                HttpRequest::post("/api/recognize")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["faces_count"], 1);
        assert_eq!(json["recognized"][0]["student"]["student_id"], "S001");
    }

    #[tokio::test]
    async fn data_url_payloads_are_accepted() {
        let (app, _dir) = app(None, None);
        let body = serde_json::json!({
            "image": format!("data:image/png;base64,{}", b64(b""))
        })
        .to_string();
        let response = app
            .oneshot(
                HttpRequest::post("/api/recognize")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn export_returns_csv() {
        let (app, _dir) = app(None, None);
        let response = app
            .oneshot(
                HttpRequest::get("/api/attendance/export?date=15/09/2026")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
    }
}
