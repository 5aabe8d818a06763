#![allow(dead_code, unused_macros)]

use std::sync::Arc;

use gallery::auth::create_jwt;
use gallery::models::{Record, User};
use gallery::repo::inmem::InMemRepo;
use gallery::storage::LocalObjectStore;
use gallery::{AppConfig, AppState};
use tempfile::TempDir;

pub const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

/// App state over a fresh in-memory repository and a local blob directory.
pub struct TestEnv {
    pub state: AppState,
    pub files: TempDir,
    pub uploads: TempDir,
}

pub fn env() -> TestEnv {
    let files = tempfile::tempdir().unwrap();
    let uploads = tempfile::tempdir().unwrap();
    let mut config = AppConfig::with_secret(SECRET);
    config.upload_folder = uploads.path().to_path_buf();
    config.storage.local_dir = Some(files.path().to_path_buf());
    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        store: Arc::new(LocalObjectStore::new(files.path())),
        config: Arc::new(config),
    };
    TestEnv { state, files, uploads }
}

pub fn token_for(id: i64, name: &str) -> String {
    let mut record = Record::new(id, chrono::Utc::now());
    record.name = name.into();
    create_jwt(&User { record }, SECRET).unwrap()
}

/// Token for a principal no repository knows about.
pub fn bearer() -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(0, "curator")))
}

/// Single-field multipart body with the `file` field.
pub fn multipart(filename: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "gallery-test-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

pub fn encoded(format: image::ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 90, 160]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img).write_to(&mut out, format).unwrap();
    out.into_inner()
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    encoded(image::ImageFormat::Png, width, height)
}

macro_rules! app {
    ($env:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(gallery::SecurityHeaders::default())
                .app_data(actix_web::web::Data::new($env.state.clone()))
                .configure(gallery::configure),
        )
        .await
    };
}

/// POSTs `body` as JSON with a bearer token and returns the status and parsed body.
macro_rules! post_json {
    ($app:expr, $uri:expr, $body:expr) => {{
        let req = actix_web::test::TestRequest::post()
            .uri(&$uri)
            .insert_header(crate::common::bearer())
            .set_json(&$body)
            .to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        let status = resp.status();
        let bytes = actix_web::test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }};
}

macro_rules! get_json {
    ($app:expr, $uri:expr) => {{
        let req = actix_web::test::TestRequest::get().uri(&$uri).to_request();
        let resp = actix_web::test::call_service(&$app, req).await;
        let status = resp.status();
        let bytes = actix_web::test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }};
}
