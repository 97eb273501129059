// Router-level tests against a fully wired App.

use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use hound::{SampleFormat, WavSpec, WavWriter};
use intercom_unlock::actuator::SimulatedActuator;
use intercom_unlock::clock::ManualClock;
use intercom_unlock::config::{AppConfig, AudioSource};
use intercom_unlock::error::NotifierError;
use intercom_unlock::http::build_router;
use intercom_unlock::notify::Notifier;
use intercom_unlock::App;
use serde_json::Value;
use tower::ServiceExt;

const ADMIN: &str = "integration-admin";

#[derive(Default)]
struct RecordingNotifier {
    urls: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send(&self, _message: &str, url: &str, _image: Option<&[u8]>) -> Result<(), NotifierError> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Four seconds of the two-tone chime at 8 kHz
fn write_chime(path: &Path) {
    let spec = WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).unwrap();
    for i in 0..32_000 {
        let t = i as f32 / 8000.0;
        let s = 0.4 * (2.0 * PI * 502.0 * t).sin() + 0.4 * (2.0 * PI * 648.0 * t).sin();
        writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
    }
    writer.finalize().unwrap();
}

fn config(source: AudioSource) -> AppConfig {
    let mut config = AppConfig::default();
    config.audio.sample_rate = 8000;
    config.audio.frame_len = 800;
    config.audio.source = source;
    config.http.public_base_url = "http://door.test/".to_string();
    config.http.admin_token = Some(ADMIN.to_string());
    config
}

fn app(config: AppConfig, notifier: Arc<RecordingNotifier>) -> App {
    App::with_parts(
        config,
        Arc::new(ManualClock::at_time_of_day(12, 0)),
        Arc::new(SimulatedActuator::new()),
        notifier,
    )
    .expect("valid config")
}

async fn response_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    let json = serde_json::from_slice::<Value>(&bytes).expect("JSON body");
    (status, json)
}

async fn post_unlock(router: &Router, otp: &str) -> (StatusCode, Value) {
    response_json(
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/unlock")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(r#"{{"otp":"{otp}"}}"#)))
                    .expect("unlock request"),
            )
            .await
            .expect("unlock call"),
    )
    .await
}

#[tokio::test]
async fn chime_recording_to_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("chime.wav");
    write_chime(&wav);

    let notifier = Arc::new(RecordingNotifier::default());
    let app = app(
        config(AudioSource::Wav {
            path: wav,
            looping: false,
        }),
        notifier.clone(),
    );

    let handle = app.start_detection().unwrap().expect("detection enabled");
    let probe = handle.probe();
    let status = handle.join();
    assert_eq!(status.confirmations, 1);

    let urls = notifier.urls.lock().unwrap().clone();
    assert_eq!(urls.len(), 1);
    let otp = urls[0]
        .strip_prefix("http://door.test/unlock?otp=")
        .expect("link uses the public base URL")
        .to_string();

    let router = build_router(app.http_state(Some(probe)), 4);

    let (status, json) = post_unlock(&router, &otp).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["angle"], 90);

    let (status, json) = post_unlock(&router, &otp).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["message"], "Invalid or expired OTP");

    let (status, json) = response_json(
        router
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
    assert_eq!(json["active_credentials"], 0);
    assert_eq!(json["detection"]["confirmations"], 1);
    assert_eq!(json["detection"]["running"], false);
    assert_eq!(json["detection"]["frames_processed"], 40);
}

#[tokio::test]
async fn admin_issued_code_unlocks() {
    let app = app(config(AudioSource::Disabled), Arc::default());
    let router = build_router(app.http_state(None), 4);

    let (status, json) = response_json(
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/generate-otp")
                    .header("x-admin-token", ADMIN)
                    .body(Body::empty())
                    .expect("generate request"),
            )
            .await
            .expect("generate call"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let otp = json["code"].as_str().expect("code").to_string();

    let (status, _) = post_unlock(&router, &otp).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn event_stream_requires_token() {
    let app = app(config(AudioSource::Disabled), Arc::default());
    let router = build_router(app.http_state(None), 4);

    let denied = router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events?token=wrong-token")
                .body(Body::empty())
                .expect("events request"),
        )
        .await
        .expect("events call");
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let allowed = router
        .oneshot(
            Request::builder()
                .uri(format!("/events?token={ADMIN}"))
                .body(Body::empty())
                .expect("events request"),
        )
        .await
        .expect("events call");
    assert_eq!(allowed.status(), StatusCode::OK);
    assert_eq!(
        allowed.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn admin_routes_disabled_without_token() {
    let mut config = config(AudioSource::Disabled);
    config.http.admin_token = None;
    let app = app(config, Arc::default());
    let router = build_router(app.http_state(None), 4);

    let (status, json) = response_json(
        router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/generate-otp")
                    .header("authorization", "Bearer anything-at-all")
                    .body(Body::empty())
                    .expect("generate request"),
            )
            .await
            .expect("generate call"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "error");
}
