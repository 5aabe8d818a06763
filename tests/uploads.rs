#![cfg(feature = "inmem-store")]

#[macro_use]
mod common;

use actix_web::test;
use serde_json::json;
use sha2::{Digest, Sha256};

macro_rules! upload {
    ($app:expr, $artwork_id:expr, $filename:expr, $bytes:expr) => {{
        let (content_type, body) = common::multipart($filename, $bytes);
        let req = test::TestRequest::post()
            .uri(&format!("/artworks/{}/upload_file/", $artwork_id))
            .insert_header(common::bearer())
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&$app, req).await;
        let status = resp.status();
        let json: serde_json::Value =
            serde_json::from_slice(&test::read_body(resp).await).unwrap_or(serde_json::Value::Null);
        (status, json)
    }};
}

macro_rules! artwork {
    ($app:expr) => {{
        let (_, kind) = post_json!($app, "/artwork_types/create/", json!({"name": "Painting"}));
        let (status, artwork) = post_json!(
            $app,
            "/artworks/create/",
            json!({"name": "Irises", "type_id": kind["id"], "author": "V. van Gogh", "year": "1889"})
        );
        assert_eq!(status, 201);
        artwork["id"].as_i64().unwrap()
    }};
}

#[actix_web::test]
async fn image_upload_stores_original_and_thumbnail() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);
    let png = common::png(600, 400);

    let (status, file) = upload!(app, artwork_id, "Irises.PNG", &png);
    assert_eq!(status, 201);
    let name = format!("attachment_{artwork_id}_1.png");
    assert_eq!(file["name"], name.as_str());
    assert_eq!(file["seq"], 1);
    assert_eq!(file["kind"], "image");
    assert_eq!(file["url"], format!("/files/{name}"));
    assert_eq!(file["thumbnail_url"], format!("/files/thumb_{name}"));
    assert_eq!(file["hash"], format!("{:x}", Sha256::digest(&png)));

    assert_eq!(std::fs::read(env.files.path().join(&name)).unwrap(), png);
    let thumb = image::open(env.files.path().join(format!("thumb_{name}"))).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (300, 200));

    let req = test::TestRequest::get().uri(&format!("/files/{name}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");

    // temporary upload directories are gone
    assert_eq!(std::fs::read_dir(env.uploads.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn mp4_is_stored_as_is() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);
    let clip = b"\x00\x00\x00\x18ftypmp42 not a real movie".to_vec();

    let (status, file) = upload!(app, artwork_id, "clip.mp4", &clip);
    assert_eq!(status, 201);
    let name = format!("attachment_{artwork_id}_1.mp4");
    assert_eq!(file["name"], name.as_str());
    assert_eq!(file["kind"], "video");
    assert_eq!(file["thumbnail_url"], serde_json::Value::Null);
    assert_eq!(std::fs::read(env.files.path().join(&name)).unwrap(), clip);
    assert!(!env.files.path().join(format!("thumb_{name}")).exists());
}

/// True when an `ffmpeg` with libx264 is on PATH.
fn ffmpeg_with_x264() -> bool {
    std::process::Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .is_ok_and(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).contains("libx264"))
}

#[actix_web::test]
async fn other_videos_are_transcoded_to_mp4() {
    if !ffmpeg_with_x264() {
        eprintln!("skipping: ffmpeg with libx264 not available");
        return;
    }
    let scratch = tempfile::tempdir().unwrap();
    let source = scratch.path().join("clip.avi");
    let made = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-f", "lavfi", "-i", "testsrc=duration=1:size=64x48:rate=5", "-c:v", "mjpeg"])
        .arg(&source)
        .status()
        .unwrap();
    assert!(made.success());
    let clip = std::fs::read(&source).unwrap();

    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);
    let (status, file) = upload!(app, artwork_id, "clip.avi", &clip);
    assert_eq!(status, 201);
    let name = format!("attachment_{artwork_id}_1.mp4");
    assert_eq!(file["name"], name.as_str());
    assert_eq!(file["kind"], "video");

    let stored = std::fs::read(env.files.path().join(&name)).unwrap();
    assert_eq!(&stored[4..8], b"ftyp");
    assert_eq!(file["hash"], format!("{:x}", Sha256::digest(&stored)));
    assert!(!env.files.path().join(format!("attachment_{artwork_id}_1.avi")).exists());
    assert_eq!(std::fs::read_dir(env.uploads.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn failed_processing_leaves_no_attachment() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);

    // undecodable image, and a video ffmpeg cannot read (or cannot find)
    for name in ["broken.png", "broken.avi"] {
        let (status, _) = upload!(app, artwork_id, name, b"definitely not media");
        assert_eq!(status, 500, "{name}");
    }

    let (_, detail) = get_json!(app, format!("/artworks/view/{artwork_id}"));
    assert_eq!(detail["attachments"], json!([]));
    assert_eq!(std::fs::read_dir(env.files.path()).unwrap().count(), 0);
    assert_eq!(std::fs::read_dir(env.uploads.path()).unwrap().count(), 0);

    let (status, file) = upload!(app, artwork_id, "fine.png", &common::png(4, 4));
    assert_eq!(status, 201);
    assert_eq!(file["seq"], 3);
}

#[actix_web::test]
async fn rejected_uploads() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);

    let (status, _) = upload!(app, artwork_id, "notes.txt", b"hello");
    assert_eq!(status, 415);

    let (status, body) = upload!(app, artwork_id, "", b"hello");
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["file"], json!(["No selected file"]));

    let (status, _) = upload!(app, 999, "a.png", &common::png(4, 4));
    assert_eq!(status, 404);

    let (content_type, body) = common::multipart("a.png", &common::png(4, 4));
    let req = test::TestRequest::post()
        .uri(&format!("/artworks/{artwork_id}/upload_file/"))
        .insert_header(("Content-Type", content_type))
        .set_payload(body)
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 401);

    // nothing was recorded
    let (_, detail) = get_json!(app, format!("/artworks/view/{artwork_id}"));
    assert_eq!(detail["attachments"], json!([]));
}

#[actix_web::test]
async fn oversized_upload_is_refused() {
    let mut env = common::env();
    let mut config = (*env.state.config).clone();
    config.max_upload_bytes = 16;
    env.state.config = std::sync::Arc::new(config);
    let app = app!(env);
    let artwork_id = artwork!(app);

    let (status, _) = upload!(app, artwork_id, "big.png", &common::png(64, 64));
    assert_eq!(status, 413);
}

#[actix_web::test]
async fn sequence_numbers_are_never_reused() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);

    let (_, first) = upload!(app, artwork_id, "a.png", &common::png(8, 8));
    let (_, second) = upload!(app, artwork_id, "b.png", &common::png(8, 8));
    assert_eq!(second["seq"], 2);

    let (status, _) = post_json!(app, format!("/attachments/delete/{}", second["id"]), json!({}));
    assert_eq!(status, 204);
    let gone = format!("attachment_{artwork_id}_2.png");
    assert!(!env.files.path().join(&gone).exists());
    assert!(!env.files.path().join(format!("thumb_{gone}")).exists());

    let (_, third) = upload!(app, artwork_id, "c.png", &common::png(8, 8));
    assert_eq!(third["seq"], 3);
    assert_eq!(third["name"], format!("attachment_{artwork_id}_3.png"));

    let (status, _) = get_json!(app, format!("/attachments/view/{}", second["id"]));
    assert_eq!(status, 404);
    let (status, _) = get_json!(app, format!("/attachments/view/{}", first["id"]));
    assert_eq!(status, 200);
}

#[actix_web::test]
async fn one_main_image_per_artwork() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);
    let mut ids = Vec::new();
    for name in ["a.png", "b.png", "c.png"] {
        let (_, file) = upload!(app, artwork_id, name, &common::png(8, 8));
        ids.push(file["id"].as_i64().unwrap());
    }

    let (_, detail) = get_json!(app, format!("/artworks/view/{artwork_id}"));
    assert_eq!(detail["main_image"], ids[0], "first file stands in when none is flagged");

    for &id in &[ids[1], ids[2], ids[1]] {
        let (status, _) = post_json!(app, format!("/attachments/edit/{id}"), json!({"main_image": true, "info": "cover"}));
        assert_eq!(status, 200);
    }
    let (_, detail) = get_json!(app, format!("/artworks/view/{artwork_id}"));
    let flagged: Vec<i64> = detail["attachments"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|f| f["main_image"] == true)
        .map(|f| f["id"].as_i64().unwrap())
        .collect();
    assert_eq!(flagged, vec![ids[1]]);
    assert_eq!(detail["main_image"], ids[1]);

    let (_, file) = post_json!(app, format!("/attachments/edit/{}", ids[1]), json!({"main_image": false}));
    assert_eq!(file["main_image"], false);
    let (status, body) = post_json!(app, format!("/attachments/edit/{}", ids[0]), json!({"info": "x".repeat(201)}));
    assert_eq!(status, 422);
    assert!(body["fields"]["info"].is_array());
}

#[actix_web::test]
async fn pdf_sheet_for_both_layouts() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);

    // no image yet
    for template in [0, 1] {
        let req = test::TestRequest::post()
            .uri(&format!("/artworks/{artwork_id}/create_pdf/"))
            .set_json(json!({"template": template}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers().get("content-type").unwrap(), "application/pdf");
        assert!(test::read_body(resp).await.starts_with(b"%PDF"));
    }

    let (status, _) = upload!(app, artwork_id, "cover.png", &common::png(640, 480));
    assert_eq!(status, 201);
    for template in [0, 1] {
        let req = test::TestRequest::post()
            .uri(&format!("/artworks/{artwork_id}/create_pdf/"))
            .set_json(json!({"template": template}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let disposition = resp.headers().get("content-disposition").unwrap().to_str().unwrap().to_string();
        assert!(disposition.starts_with("inline"));
        assert!(test::read_body(resp).await.starts_with(b"%PDF"));
    }

    for (name, format) in [("cover.webp", image::ImageFormat::WebP), ("cover.gif", image::ImageFormat::Gif)] {
        let artwork_id = artwork!(app);
        let (status, _) = upload!(app, artwork_id, name, &common::encoded(format, 64, 48));
        assert_eq!(status, 201, "{name}");
        for template in [0, 1] {
            let req = test::TestRequest::post()
                .uri(&format!("/artworks/{artwork_id}/create_pdf/"))
                .set_json(json!({"template": template}))
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 200, "{name} with template {template}");
            assert!(test::read_body(resp).await.starts_with(b"%PDF"));
        }
    }

    let (status, body) = post_json!(app, format!("/artworks/{artwork_id}/create_pdf/"), json!({"template": 7}));
    assert_eq!(status, 422);
    assert_eq!(body["fields"]["template"], json!(["Not a valid choice"]));
    let (status, _) = post_json!(app, "/artworks/999/create_pdf/", json!({"template": 0}));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn deleting_an_artwork_hides_its_files() {
    let env = common::env();
    let app = app!(env);
    let artwork_id = artwork!(app);
    let (_, file) = upload!(app, artwork_id, "a.png", &common::png(8, 8));

    let (status, _) = post_json!(app, format!("/artworks/delete/{artwork_id}"), json!({}));
    assert_eq!(status, 204);
    let (status, _) = get_json!(app, format!("/attachments/view/{}", file["id"]));
    assert_eq!(status, 404);
}
