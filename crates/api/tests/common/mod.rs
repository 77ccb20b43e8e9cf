#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use image::metadata::Orientation;
use image::{DynamicImage, RgbImage};
use rawbatch_api::archives::ArchiveStore;
use rawbatch_api::config::ServerConfig;
use rawbatch_api::router::build_app_router;
use rawbatch_api::state::AppState;
use rawbatch_api::ws::WsManager;
use rawbatch_events::{BatchEvent, EventBus};
use rawbatch_pipeline::{
    Converter, Coordinator, DecodeError, DecodedImage, ImageOrigin, RawDecoder, RawSource,
    StagingArea,
};
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

pub const BOUNDARY: &str = "rawbatch-test-boundary";

/// Build a test `ServerConfig` rooted in `root`.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default).
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        max_upload_bytes: 1024 * 1024,
        conversion_concurrency: 2,
        job_timeout_secs: 10,
        staging_dir: root.join("staging"),
        archive_dir: root.join("archives"),
        archive_retention: 4,
        static_dir: None,
    }
}

/// Payload `BAD` fails to decode; everything else is a 64x48 image.
pub struct TestDecoder;

impl RawDecoder for TestDecoder {
    fn decode(&self, source: &RawSource<'_>) -> Result<DecodedImage, DecodeError> {
        if source.bytes == b"BAD" {
            return Err(DecodeError::new(source.name, "unreadable sensor data"));
        }
        Ok(DecodedImage {
            image: DynamicImage::ImageRgb8(RgbImage::new(64, 48)),
            orientation: Orientation::NoTransforms,
            origin: ImageOrigin::Developed,
        })
    }
}

/// The router together with the state behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub root: tempfile::TempDir,
}

impl TestApp {
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.state.event_bus.subscribe()
    }
}

pub fn build_test_app() -> TestApp {
    build_test_app_with(|_| {})
}

/// Build the full application router, letting the caller adjust the config.
///
/// This mirrors the construction in `main.rs` (with [`TestDecoder`]) so
/// integration tests exercise the same middleware stack production uses.
pub fn build_test_app_with(adjust: impl FnOnce(&mut ServerConfig)) -> TestApp {
    let root = tempfile::tempdir().unwrap();
    let mut config = test_config(root.path());
    adjust(&mut config);

    let converter = Converter::new(Arc::new(TestDecoder), StagingArea::new(&config.staging_dir));
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        event_bus: Arc::new(EventBus::default()),
        coordinator: Arc::new(Coordinator::new(
            Arc::new(converter),
            config.coordinator_config(),
        )),
        archive_store: Arc::new(
            ArchiveStore::open(&config.archive_dir, config.archive_retention).unwrap(),
        ),
        batch_tasks: TaskTracker::new(),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        root,
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn get(app: &TestApp, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

/// One part of a multipart form.
pub enum Part<'a> {
    File { name: &'a str, bytes: &'a [u8] },
    Text { field: &'a str, value: &'a str },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::File { name, bytes } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { field, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}")
                        .as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub async fn post_multipart(app: &TestApp, uri: &str, parts: &[Part<'_>]) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap();
    app.router.clone().oneshot(request).await.unwrap()
}

// ---------------------------------------------------------------------------
// Responses and events
// ---------------------------------------------------------------------------

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Wait for the event that ends a batch (download, nothing to package or
/// packaging failure), collecting everything seen for that batch on the way.
pub async fn wait_for_batch_end(
    rx: &mut broadcast::Receiver<BatchEvent>,
    batch_id: uuid::Uuid,
) -> Vec<BatchEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.batch_id != batch_id {
                continue;
            }
            let terminal = matches!(
                event.message_type(),
                "download" | "nothing_to_package" | "packaging_failed"
            );
            seen.push(event);
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("batch did not finish in time");
    seen
}
