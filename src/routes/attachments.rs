use std::path::Path;

use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use validator::Validate;

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::forms::AttachmentForm;
use crate::media::{self, MediaKind};
use crate::models::{Artwork, Attachment, Id, NewAttachment};
use crate::repo::EntityRepo;
use crate::storage::{ObjectStore, StorageError};

pub const NO_SELECTED_FILE: &str = "No selected file";

/// Attachment with browser-facing URLs.
#[derive(Debug, Serialize, ToSchema)]
pub struct AttachmentView {
    #[serde(flatten)]
    pub attachment: Attachment,
    pub kind: MediaKind,
    pub url: String,
    pub thumbnail_url: Option<String>,
}

pub async fn attachment_view(store: &dyn ObjectStore, attachment: Attachment) -> Result<AttachmentView, ApiError> {
    let kind = attachment.kind();
    let url = store.url_for(&attachment.record.name).await?;
    let thumbnail_url = match kind {
        MediaKind::Image => Some(store.url_for(&media::thumbnail_key(&attachment.record.name)).await?),
        MediaKind::Video => None,
    };
    Ok(AttachmentView { attachment, kind, url, thumbnail_url })
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Stores the uploaded file (plus thumbnail or transcoded copy) and returns
/// the final object name and content hash.
async fn store_upload(
    store: &dyn ObjectStore,
    dir: &Path,
    name: &str,
    bytes: Vec<u8>,
) -> Result<(String, String), ApiError> {
    let src = dir.join(name);
    tokio::fs::write(&src, &bytes).await?;
    let extension = media::extension(name);

    match MediaKind::from_extension(&extension) {
        MediaKind::Image => {
            let thumb_name = media::thumbnail_key(name);
            let thumb_path = dir.join(&thumb_name);
            let (from, to) = (src.clone(), thumb_path.clone());
            web::block(move || media::write_thumbnail(&from, &to)).await??;
            let thumb = tokio::fs::read(&thumb_path).await?;
            store.put(&thumb_name, thumb).await?;

            let hash = sha256_hex(&bytes);
            store.put(name, bytes).await?;
            Ok((name.to_string(), hash))
        }
        MediaKind::Video if extension == ".mp4" => {
            let hash = sha256_hex(&bytes);
            store.put(name, bytes).await?;
            Ok((name.to_string(), hash))
        }
        MediaKind::Video => {
            let mp4_name = media::mp4_name(name);
            let mp4_path = dir.join(&mp4_name);
            media::transcode_to_mp4(&src, &mp4_path).await?;
            let mp4 = tokio::fs::read(&mp4_path).await?;
            let hash = sha256_hex(&mp4);
            store.put(&mp4_name, mp4).await?;
            Ok((mp4_name, hash))
        }
    }
}

#[utoipa::path(
    post,
    path = "/artworks/{id}/upload_file/",
    params(("id" = Id, Path, description = "Artwork id")),
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Multipart with a `file` field"),
    responses(
        (status = 201, description = "Attachment stored", body = AttachmentView),
        (status = 404, description = "Artwork not found"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Extension not allowed"),
        (status = 422, description = "No selected file")
    )
)]
pub async fn upload_file(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let artwork_id = path.into_inner();
    let artwork = EntityRepo::<Artwork>::get(&*data.repo, artwork_id).await?;
    let limit = data.config.max_upload_bytes;

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart body".into())
    })? {
        if field.content_disposition().get_name() != Some("file") {
            continue;
        }
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let Some(filename) = filename else {
            return Err(ApiError::field("file", NO_SELECTED_FILE));
        };
        if !data.config.allows_extension(&media::extension(&filename)) {
            log::info!("rejected upload '{filename}' for artwork #{artwork_id}: extension not allowed");
            return Err(ApiError::UnsupportedMedia);
        }
        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::BadRequest("upload interrupted".into())
        })? {
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((filename, bytes));
        break;
    }
    let Some((filename, bytes)) = upload else {
        return Err(ApiError::field("file", NO_SELECTED_FILE));
    };

    tokio::fs::create_dir_all(&data.config.upload_folder).await?;
    let workdir = tempfile::Builder::new().prefix("upload_").tempdir_in(&data.config.upload_folder)?;

    let reserved = data
        .repo
        .create_attachment(NewAttachment {
            artwork_id,
            extension: media::extension(&filename),
            path: data.store.bucket().to_string(),
        })
        .await?;
    let id = reserved.record.id;

    let stored = store_upload(data.store.as_ref(), workdir.path(), &reserved.record.name, bytes).await;
    drop(workdir);
    let (name, hash) = match stored {
        Ok(done) => done,
        Err(e) => {
            if let Err(cleanup) = data.repo.remove_attachment(id).await {
                log::warn!("could not drop attachment #{id} after failed upload: {cleanup}");
            }
            return Err(e);
        }
    };

    let file = data.repo.finish_attachment(id, &name, &hash).await?;
    log::info!("stored '{name}' for artwork #{} ({})", artwork.record.id, artwork.record.name);
    let view = attachment_view(data.store.as_ref(), file).await?;
    Ok(HttpResponse::Created().json(view))
}

#[utoipa::path(
    get,
    path = "/attachments/view/{id}",
    params(("id" = Id, Path, description = "Attachment id")),
    responses(
        (status = 200, description = "Attachment", body = AttachmentView),
        (status = 404, description = "Not found")
    )
)]
pub async fn view(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let file = data.repo.get_attachment(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(attachment_view(data.store.as_ref(), file).await?))
}

pub async fn edit_form(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let file = data.repo.get_attachment(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(file))
}

#[utoipa::path(
    post,
    path = "/attachments/edit/{id}",
    params(("id" = Id, Path, description = "Attachment id")),
    request_body = AttachmentForm,
    responses(
        (status = 200, description = "Updated", body = Attachment),
        (status = 404, description = "Not found"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn update(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Json<AttachmentForm>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    data.repo.get_attachment(id).await?;
    form.validate()?;
    let file = data.repo.update_attachment(id, &form).await?;
    Ok(HttpResponse::Ok().json(file))
}

#[utoipa::path(
    post,
    path = "/attachments/delete/{id}",
    params(("id" = Id, Path, description = "Attachment id")),
    responses(
        (status = 204, description = "Blob and row removed"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete(_auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let file = data.repo.get_attachment(id).await?;
    let name = &file.record.name;
    data.store.delete(name).await?;
    if file.kind() == MediaKind::Image {
        match data.store.delete(&media::thumbnail_key(name)).await {
            Ok(()) | Err(StorageError::NotFound) => {}
            Err(e) => return Err(e.into()),
        }
    }
    data.repo.remove_attachment(id).await?;
    log::info!("deleted attachment '{name}' of artwork #{}", file.artwork_id);
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/files/{key}",
    params(("key" = String, Path, description = "Object key")),
    responses(
        (status = 200, description = "Stored blob"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_file(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    let (bytes, mime) = data.store.get(&key).await?;
    Ok(HttpResponse::Ok().insert_header((header::CONTENT_TYPE, mime)).body(bytes))
}
