//! HTTP surface: code issuance, unlock, health, and the telemetry stream.
//!
//! Handlers are thin. Credential checks and actuator moves live in
//! `UnlockGate`; this module only maps requests and errors to JSON.

mod routes;
mod sse;

pub use routes::{
    build_router, run_http_server, AppState, GeneratedCode, HealthResponse, HttpServerError,
    UnlockRequest, UnlockResponse,
};
pub use sse::MetricStream;
