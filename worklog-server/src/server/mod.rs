mod acl;
pub mod auth;
mod config;
mod handlers;

use crate::server::auth::AuthCtx;
use crate::storage::{StorageError, Store};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Router,
    http::{Method, StatusCode, header},
    routing::{get, post},
};
pub use config::{
    AppConfig, CompanyConfig, ConfigError, HolidayConfig, MailBackend, MailConfig,
    SchedulerConfig, UserConfig,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
}

impl AppState {
    pub fn new(config: AppConfig, store: Store) -> Self {
        Self { config, store }
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    use handlers::*;

    let tenant = "/api/v1/companies/{company_id}";
    let private = Router::new()
        .route(&format!("{tenant}/attendance/login"), post(api_attendance_login))
        .route(&format!("{tenant}/attendance/logout"), post(api_attendance_logout))
        .route(&format!("{tenant}/attendance/today"), get(api_attendance_today))
        .route(
            &format!("{tenant}/users/{{user_id}}/attendance"),
            get(api_user_attendance),
        )
        .route(&format!("{tenant}/users/{{user_id}}/rewards"), get(api_user_rewards))
        .route(
            &format!("{tenant}/users/{{user_id}}/monthly-report"),
            get(api_user_monthly_report),
        )
        .route(
            &format!("{tenant}/users/{{user_id}}/deactivate"),
            post(api_deactivate_user),
        )
        .route(
            &format!("{tenant}/users"),
            get(api_list_users).post(api_create_user),
        )
        .route(&format!("{tenant}/reports"), post(api_submit_report))
        .route(
            &format!("{tenant}/leaves"),
            get(api_list_leaves).post(api_request_leave),
        )
        .route(&format!("{tenant}/leaves/{{id}}/approve"), post(api_approve_leave))
        .route(&format!("{tenant}/leaves/{{id}}/reject"), post(api_reject_leave))
        .route(
            &format!("{tenant}/holidays"),
            get(api_list_holidays).post(api_add_holiday),
        )
        .route(
            &format!("{tenant}/corrections"),
            get(api_list_corrections).post(api_request_correction),
        )
        .route(
            &format!("{tenant}/corrections/{{id}}/approve"),
            post(api_approve_correction),
        )
        .route(
            &format!("{tenant}/corrections/{{id}}/reject"),
            post(api_reject_correction),
        )
        .route(&format!("{tenant}/stats"), get(api_stats))
        .route(&format!("{tenant}/jobs"), get(api_list_jobs))
        .route(&format!("{tenant}/badges"), get(api_list_badges))
        .with_state(state.clone())
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ))
        .layer(middleware::from_fn(set_auth_span_fields));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            company_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/version", get(api_version))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    // Optionally add CORS for dev if configured
    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    // Use provided x-request-id if present, else generate
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let path = req.uri().path().to_string();
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-resource-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // HSTS is only honored on HTTPS
    headers.insert(
        HeaderName::from_static("strict-transport-security"),
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );

    // Attendance data must never be cached
    if path == "/healthz" || path.starts_with("/api/") {
        headers.insert(
            HeaderName::from_static("cache-control"),
            HeaderValue::from_static("no-store, no-cache, must-revalidate, private"),
        );
        headers.insert(
            HeaderName::from_static("pragma"),
            HeaderValue::from_static("no-cache"),
        );
    }

    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::display(auth.claims.role.as_str()));
        span.record("company_id", tracing::field::display(&auth.claims.company_id));
    }
    Ok(next.run(req).await)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidInput(m) => AppError::BadRequest(m),
            StorageError::NotFound(m) => AppError::NotFound(m),
            StorageError::Conflict(m) => AppError::Conflict(m),
            other => AppError::internal(other),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, kind, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, "bad_request", None),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized".into(),
                "unauthorized",
                None,
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), "forbidden", None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, "not_found", None),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m, "conflict", None),
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                "internal",
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, kind = kind, message = %msg, detail = %detail, "request failed");
        } else if status.is_server_error() {
            tracing::error!(status = %status, kind = kind, message = %msg, "request failed");
        } else {
            tracing::warn!(status = %status, kind = kind, message = %msg, "request rejected");
        }
        let body = axum::Json(ErrorBody { error: msg });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn storage_errors_map_to_http_statuses() {
        let cases = [
            (StorageError::InvalidInput("bad".into()), StatusCode::BAD_REQUEST),
            (StorageError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (StorageError::Conflict("dup".into()), StatusCode::CONFLICT),
            (StorageError::Migration("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).into_response().status(), status);
        }
    }

    async fn app() -> (Router, crate::storage::test_support::TestDb) {
        let db = crate::storage::test_support::seeded().await;
        let config = AppConfig {
            jwt_secret: "s3cret".into(),
            companies: Vec::new(),
            users: Vec::new(),
            holidays: Vec::new(),
            mail: MailConfig::default(),
            scheduler: SchedulerConfig::default(),
            dev_cors_origin: None,
            listen_port: None,
        };
        (router(AppState::new(config, db.store.clone())), db)
    }

    fn get(path: &str) -> axum::http::Request<axum::body::Body> {
        axum::http::Request::builder()
            .uri(path)
            .body(axum::body::Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_carries_security_and_request_id_headers() {
        use tower::ServiceExt;
        let (app, _db) = app().await;
        let mut req = get("/healthz");
        req.headers_mut()
            .insert("x-request-id", HeaderValue::from_static("req-42"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let h = resp.headers();
        assert_eq!(h["x-request-id"], "req-42");
        assert_eq!(h["x-content-type-options"], "nosniff");
        assert_eq!(h["cache-control"], "no-store, no-cache, must-revalidate, private");
    }

    #[tokio::test]
    async fn private_routes_require_a_bearer_token() {
        use tower::ServiceExt;
        let (app, _db) = app().await;
        for path in [
            "/api/v1/companies/acme/attendance/today",
            "/api/v1/companies/acme/stats",
            "/api/v1/companies/acme/users/ada/rewards",
        ] {
            let resp = app.clone().oneshot(get(path)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::UNAUTHORIZED, "{path}");
        }

        let mut req = get("/api/v1/companies/acme/stats");
        req.headers_mut()
            .insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer not-a-jwt"));
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn internal_errors_hide_their_detail() {
        let resp = AppError::internal("db path /secret is locked").into_response();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "internal server error");
    }
}
