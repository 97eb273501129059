use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::header::{HeaderName, AUTHORIZATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tower::limit::ConcurrencyLimitLayer;

use crate::credentials::CredentialAuthority;
use crate::detection::{LoopStatus, StatusProbe};
use crate::error::UnlockError;
use crate::telemetry::TelemetryCollector;
use crate::unlock::UnlockGate;

use super::sse;

/// Shared application state for HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<UnlockGate>,
    authority: Arc<CredentialAuthority>,
    telemetry: Arc<TelemetryCollector>,
    detection: Option<StatusProbe>,
    admin_token: Option<Arc<String>>,
}

impl AppState {
    pub fn new(
        gate: Arc<UnlockGate>,
        authority: Arc<CredentialAuthority>,
        telemetry: Arc<TelemetryCollector>,
    ) -> Self {
        Self {
            gate,
            authority,
            telemetry,
            detection: None,
            admin_token: None,
        }
    }

    /// Report this worker in `/health`.
    pub fn with_detection(mut self, probe: StatusProbe) -> Self {
        self.detection = Some(probe);
        self
    }

    /// Enable the admin routes.
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Arc::new(token.into()));
        self
    }

    fn authorize_admin(
        &self,
        headers: &HeaderMap,
        query_token: Option<&str>,
    ) -> Result<(), HttpServerError> {
        let expected = self
            .admin_token
            .as_ref()
            .ok_or(HttpServerError::ServiceUnavailable(
                "admin token not configured",
            ))?;

        match extract_token(headers, query_token) {
            Some(value) if tokens_match(&value, expected) => Ok(()),
            _ => Err(HttpServerError::Unauthorized),
        }
    }
}

/// Query payload for extracting token from URL.
#[derive(Debug, Default, Deserialize)]
pub struct AuthQuery {
    pub token: Option<String>,
}

/// HTTP error variants mapped to JSON responses.
#[derive(Debug)]
pub enum HttpServerError {
    Unauthorized,
    /// Any credential failure. The body never says which check failed.
    InvalidCredential,
    BadRequest(String),
    ActuatorFailed,
    ServiceUnavailable(&'static str),
    Internal(String),
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid token".into()),
            Self::InvalidCredential => (StatusCode::UNAUTHORIZED, "Invalid or expired OTP".into()),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::ActuatorFailed => (StatusCode::BAD_GATEWAY, "Servo control error".into()),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.into()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (
            status,
            Json(serde_json::json!({ "status": "error", "message": message })),
        )
            .into_response()
    }
}

impl From<UnlockError> for HttpServerError {
    fn from(err: UnlockError) -> Self {
        match err {
            UnlockError::Credential(_) => Self::InvalidCredential,
            UnlockError::Actuator(_) => Self::ActuatorFailed,
        }
    }
}

/// Unlock request body. `code` is accepted as an alias of `otp`.
#[derive(Debug, Deserialize)]
pub struct UnlockRequest {
    #[serde(alias = "code")]
    pub otp: String,
}

#[derive(Debug, Serialize)]
pub struct UnlockResponse {
    pub status: &'static str,
    pub angle: u16,
}

#[derive(Debug, Serialize)]
pub struct GeneratedCode {
    pub code: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_credentials: usize,
    pub telemetry_events: u64,
    pub detection: LoopStatus,
}

/// Build the Axum router with all handlers.
pub fn build_router(state: AppState, max_concurrent_requests: usize) -> Router {
    Router::new()
        .route("/generate-otp", post(generate_otp))
        .route("/unlock", get(unlock_page).post(unlock))
        .route("/health", get(health))
        .route("/events", get(events))
        .layer(ConcurrencyLimitLayer::new(max_concurrent_requests.max(1)))
        .with_state(state)
}

/// Run the HTTP server until `shutdown` resolves.
pub async fn run_http_server<F>(
    state: AppState,
    addr: SocketAddr,
    max_concurrent_requests: usize,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding HTTP listener on {}", addr))?;
    tracing::info!("[HTTP] Listening on {}", addr);

    let router = build_router(state, max_concurrent_requests);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .context("serving HTTP router")?;

    tracing::info!("[HTTP] Server stopped");
    Ok(())
}

pub async fn generate_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GeneratedCode>, HttpServerError> {
    state.authorize_admin(&headers, None)?;

    let credential = state.authority.issue();
    let expires_in_seconds = state.authority.validity().as_secs();
    state.telemetry.record_issued(expires_in_seconds);

    Ok(Json(GeneratedCode {
        code: credential.code,
        expires_in_seconds,
    }))
}

pub async fn unlock(
    State(state): State<AppState>,
    payload: Result<Json<UnlockRequest>, JsonRejection>,
) -> Result<Json<UnlockResponse>, HttpServerError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::debug!("[HTTP] Rejected unlock body: {}", rejection.body_text());
        HttpServerError::BadRequest("OTP is required".to_string())
    })?;

    let otp = request.otp.trim().to_string();
    if otp.is_empty() {
        return Err(HttpServerError::BadRequest("OTP is required".to_string()));
    }

    // The actuator holds the servo for a while; keep it off the async workers
    let gate = state.gate.clone();
    let receipt = tokio::task::spawn_blocking(move || gate.authorize(&otp))
        .await
        .map_err(|err| HttpServerError::Internal(format!("unlock task failed: {}", err)))??;

    Ok(Json(UnlockResponse {
        status: "success",
        angle: receipt.angle.degrees(),
    }))
}

/// Landing page for notification links.
///
/// A GET never consumes the code: chat apps fetch links for previews. The
/// page posts the code from the query string when the resident taps the
/// button.
pub async fn unlock_page() -> Html<&'static str> {
    Html(UNLOCK_PAGE)
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let detection = state
        .detection
        .as_ref()
        .map(StatusProbe::status)
        .unwrap_or_else(LoopStatus::stopped);

    Json(HealthResponse {
        status: "ok",
        active_credentials: state.authority.active_count(),
        telemetry_events: state.telemetry.snapshot().total_events,
        detection,
    })
}

pub async fn events(
    State(state): State<AppState>,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
) -> Result<sse::MetricStream, HttpServerError> {
    state.authorize_admin(&headers, query.token.as_deref())?;
    Ok(sse::metric_events(&state.telemetry))
}

fn extract_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token {
        return Some(token.to_string());
    }

    static X_ADMIN_TOKEN: HeaderName = HeaderName::from_static("x-admin-token");

    headers
        .get(&X_ADMIN_TOKEN)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| raw.strip_prefix("Bearer ").map(|v| v.to_string()))
        })
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}

const UNLOCK_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="robots" content="noindex">
<title>Unlock door</title>
<style>
body { font-family: sans-serif; text-align: center; padding-top: 3em; }
button { font-size: 1.5em; padding: 0.6em 1.6em; }
</style>
</head>
<body>
<h1>Someone is at the door</h1>
<button id="unlock">Unlock</button>
<p id="result"></p>
<script>
const otp = new URLSearchParams(window.location.search).get("otp") || "";
const result = document.getElementById("result");
document.getElementById("unlock").addEventListener("click", async () => {
  result.textContent = "Unlocking...";
  try {
    const res = await fetch("/unlock", {
      method: "POST",
      headers: { "Content-Type": "application/json" },
      body: JSON.stringify({ otp }),
    });
    const body = await res.json();
    result.textContent = res.ok ? "Door unlocked" : body.message;
  } catch (err) {
    result.textContent = "Request failed";
  }
});
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{ServoAngle, SimulatedActuator};
    use crate::clock::ManualClock;
    use crate::credentials::CredentialConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const TOKEN: &str = "admin-token-1234";

    struct Fixture {
        router: Router,
        authority: Arc<CredentialAuthority>,
        actuator: Arc<SimulatedActuator>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::at_time_of_day(12, 0));
        let telemetry = Arc::new(TelemetryCollector::default());
        let authority = Arc::new(CredentialAuthority::new(
            CredentialConfig::default(),
            clock.clone(),
        ));
        let actuator = Arc::new(SimulatedActuator::new());
        let gate = Arc::new(UnlockGate::new(
            authority.clone(),
            actuator.clone(),
            ServoAngle::new(90).unwrap(),
            clock.clone(),
            telemetry.clone(),
        ));
        let state = AppState::new(gate, authority.clone(), telemetry).with_admin_token(TOKEN);

        Fixture {
            router: build_router(state, 8),
            authority,
            actuator,
            clock,
        }
    }

    async fn response_json(response: Response) -> (StatusCode, Value) {
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
        (status, json)
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("post request")
    }

    #[tokio::test]
    async fn unlock_with_valid_code_moves_servo() {
        let f = fixture();
        let code = f.authority.issue().code;

        let (status, json) = response_json(
            f.router
                .oneshot(post_json("/unlock", &format!(r#"{{"otp":"{code}"}}"#)))
                .await
                .expect("unlock call"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["angle"], 90);
        assert_eq!(f.actuator.moves().len(), 1);
    }

    #[tokio::test]
    async fn unlock_accepts_code_alias() {
        let f = fixture();
        let code = f.authority.issue().code;

        let response = f
            .router
            .oneshot(post_json("/unlock", &format!(r#"{{"code":"{code}"}}"#)))
            .await
            .expect("unlock call");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn credential_failures_share_one_body() {
        let f = fixture();
        let spent = f.authority.issue().code;
        f.authority.validate_and_consume(&spent).unwrap();
        let stale = f.authority.issue().code;
        f.clock.advance(Duration::from_secs(31));

        let mut bodies = Vec::new();
        for code in ["not-issued", spent.as_str(), stale.as_str()] {
            let (status, json) = response_json(
                f.router
                    .clone()
                    .oneshot(post_json("/unlock", &format!(r#"{{"otp":"{code}"}}"#)))
                    .await
                    .expect("unlock call"),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            bodies.push(json);
        }

        assert_eq!(bodies[0]["message"], "Invalid or expired OTP");
        assert!(bodies.iter().all(|b| *b == bodies[0]));
        assert!(f.actuator.moves().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let f = fixture();
        for body in ["not json", "{}", r#"{"otp":"   "}"#] {
            let (status, json) = response_json(
                f.router
                    .clone()
                    .oneshot(post_json("/unlock", body))
                    .await
                    .expect("unlock call"),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
            assert_eq!(json["status"], "error");
        }
    }

    #[tokio::test]
    async fn actuator_failure_is_bad_gateway() {
        let f = fixture();
        let code = f.authority.issue().code;
        f.actuator.set_failing(true);

        let (status, _) = response_json(
            f.router
                .oneshot(post_json("/unlock", &format!(r#"{{"otp":"{code}"}}"#)))
                .await
                .expect("unlock call"),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn generate_otp_requires_token() {
        let f = fixture();
        let (status, json) = response_json(
            f.router
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/generate-otp")
                        .body(Body::empty())
                        .expect("generate request"),
                )
                .await
                .expect("generate call"),
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["message"], "missing or invalid token");
        assert_eq!(f.authority.active_count(), 0);
    }

    #[tokio::test]
    async fn generate_otp_with_bearer_token() {
        let f = fixture();
        let (status, json) = response_json(
            f.router
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri("/generate-otp")
                        .header("authorization", format!("Bearer {TOKEN}"))
                        .body(Body::empty())
                        .expect("generate request"),
                )
                .await
                .expect("generate call"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["expires_in_seconds"], 30);
        assert_eq!(json["code"].as_str().map(str::len), Some(6));
        assert_eq!(f.authority.active_count(), 1);
    }

    #[tokio::test]
    async fn health_reports_stopped_detection() {
        let f = fixture();
        f.authority.issue();

        let (status, json) = response_json(
            f.router
                .oneshot(
                    Request::builder()
                        .uri("/health")
                        .body(Body::empty())
                        .expect("health request"),
                )
                .await
                .expect("health call"),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["active_credentials"], 1);
        assert_eq!(json["detection"]["running"], false);
        assert_eq!(json["detection"]["state"], "idle");
    }

    #[tokio::test]
    async fn unlock_page_does_not_consume() {
        let f = fixture();
        let code = f.authority.issue().code;

        let response = f
            .router
            .oneshot(
                Request::builder()
                    .uri(format!("/unlock?otp={code}"))
                    .body(Body::empty())
                    .expect("page request"),
            )
            .await
            .expect("page call");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(f.authority.active_count(), 1);
        assert!(f.actuator.moves().is_empty());
    }

    #[test]
    fn token_comparison() {
        assert!(tokens_match("admin-token-1234", "admin-token-1234"));
        assert!(!tokens_match("admin-token-1235", "admin-token-1234"));
        assert!(!tokens_match("admin-token-12345", "admin-token-1234"));
        assert!(!tokens_match("", "admin-token-1234"));
    }
}
