use std::collections::BTreeMap;

use actix_web::{http::header, web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use super::attachments::{attachment_view, AttachmentView};
use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::forms::{FeaturesValueForm, SearchForm, SelectTemplateForm, NOT_A_VALID_CHOICE};
use crate::media::{self, MediaKind};
use crate::models::{main_image, Artwork, ArtworkFilter, ArtworkType, Feature, FeatureFilter, Id, ListQuery, Tag};
use crate::pdf::{self, Layout};
use crate::repo::{EntityRepo, RepoError};
use crate::storage::StorageError;

/// Everything the artwork page shows.
#[derive(Debug, Serialize, ToSchema)]
pub struct ArtworkDetail {
    pub artwork: Artwork,
    pub artwork_type: Option<ArtworkType>,
    /// Features defined for the artwork's type.
    pub features: Vec<Feature>,
    /// feature id → value; features without a stored value are absent.
    pub values: BTreeMap<Id, Option<String>>,
    pub tags: Vec<Tag>,
    pub attachments: Vec<AttachmentView>,
    pub main_image: Option<Id>,
}

#[utoipa::path(
    get,
    path = "/artworks/view/{id}",
    params(("id" = Id, Path, description = "Artwork id")),
    responses(
        (status = 200, description = "Artwork detail", body = ArtworkDetail),
        (status = 404, description = "Not found")
    )
)]
pub async fn view(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let repo = &*data.repo;
    let artwork = EntityRepo::<Artwork>::get(repo, path.into_inner()).await?;
    let id = artwork.record.id;

    let artwork_type = match EntityRepo::<ArtworkType>::get(repo, artwork.type_id).await {
        Ok(t) => Some(t),
        Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let features = EntityRepo::<Feature>::all(repo, &FeatureFilter { type_id: Some(artwork.type_id) }).await?;
    let values = repo
        .list_feature_values(id)
        .await?
        .into_iter()
        .map(|v| (v.feature_id, v.value))
        .collect();
    let tags = repo.list_artwork_tags(id).await?;

    let files = repo.list_attachments(id).await?;
    let main = main_image(&files).map(|f| f.record.id);
    let mut attachments = Vec::with_capacity(files.len());
    for file in files {
        attachments.push(attachment_view(data.store.as_ref(), file).await?);
    }

    Ok(HttpResponse::Ok().json(ArtworkDetail {
        artwork,
        artwork_type,
        features,
        values,
        tags,
        attachments,
        main_image: main,
    }))
}

/// Loads the feature and the artwork, 404 unless the feature belongs to the
/// artwork's type.
async fn feature_of_artwork(data: &AppState, feature_id: Id, artwork_id: Id) -> Result<(Feature, Artwork), ApiError> {
    let feature = EntityRepo::<Feature>::get(&*data.repo, feature_id).await?;
    let artwork = EntityRepo::<Artwork>::get(&*data.repo, artwork_id).await?;
    if feature.type_id != artwork.type_id {
        return Err(ApiError::NotFound);
    }
    Ok((feature, artwork))
}

#[utoipa::path(
    get,
    path = "/features/{feature_id}/value/{artwork_id}",
    params(
        ("feature_id" = Id, Path, description = "Feature id"),
        ("artwork_id" = Id, Path, description = "Artwork id")
    ),
    responses(
        (status = 200, description = "Current value", body = FeaturesValueForm),
        (status = 404, description = "Unknown feature or artwork, or type mismatch")
    )
)]
pub async fn feature_value(data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (feature_id, artwork_id) = path.into_inner();
    feature_of_artwork(&data, feature_id, artwork_id).await?;
    let value = data
        .repo
        .get_feature_value(artwork_id, feature_id)
        .await?
        .and_then(|v| v.value);
    Ok(HttpResponse::Ok().json(FeaturesValueForm { value }))
}

#[utoipa::path(
    post,
    path = "/features/{feature_id}/value/{artwork_id}",
    params(
        ("feature_id" = Id, Path, description = "Feature id"),
        ("artwork_id" = Id, Path, description = "Artwork id")
    ),
    request_body = FeaturesValueForm,
    responses(
        (status = 200, description = "Stored value", body = FeaturesValue),
        (status = 404, description = "Unknown feature or artwork, or type mismatch"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn set_feature_value(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    form: web::Json<FeaturesValueForm>,
) -> Result<HttpResponse, ApiError> {
    let (feature_id, artwork_id) = path.into_inner();
    let (feature, _) = feature_of_artwork(&data, feature_id, artwork_id).await?;
    form.validate()?;
    let value = form
        .into_inner()
        .value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let stored = data.repo.set_feature_value(artwork_id, feature_id, value).await?;
    log::info!("artwork #{artwork_id}: '{}' set", feature.record.name);
    Ok(HttpResponse::Ok().json(stored))
}

#[utoipa::path(
    post,
    path = "/artworks/{id}/tags/{tag_id}",
    params(("id" = Id, Path, description = "Artwork id"), ("tag_id" = Id, Path, description = "Tag id")),
    responses(
        (status = 204, description = "Tag linked"),
        (status = 404, description = "Artwork not found"),
        (status = 422, description = "Unknown tag")
    )
)]
pub async fn add_tag(_auth: Auth, data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (artwork_id, tag_id) = path.into_inner();
    data.repo.add_tag(artwork_id, tag_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    delete,
    path = "/artworks/{id}/tags/{tag_id}",
    params(("id" = Id, Path, description = "Artwork id"), ("tag_id" = Id, Path, description = "Tag id")),
    responses((status = 204, description = "Tag unlinked"), (status = 404, description = "Artwork not found"))
)]
pub async fn remove_tag(_auth: Auth, data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (artwork_id, tag_id) = path.into_inner();
    data.repo.remove_tag(artwork_id, tag_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    get,
    path = "/artworks/search/",
    params(
        ("feature_id" = Id, Query, description = "Feature to match"),
        ("value" = String, Query, description = "Exact value"),
        ("page" = Option<i64>, Query, description = "1-based page")
    ),
    responses(
        (status = 200, description = "Matching artworks, paginated"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn search(data: web::Data<AppState>, query: web::Query<SearchForm>) -> Result<HttpResponse, ApiError> {
    query.validate()?;
    let SearchForm { feature_id, value, page } = query.into_inner();
    let params = ListQuery { page, ..Default::default() }.resolve(data.config.rows_per_page);
    let filter = ArtworkFilter {
        feature_id: Some(feature_id),
        value: Some(value.trim().to_string()),
        ..Default::default()
    };
    let found = EntityRepo::<Artwork>::list(&*data.repo, &params, &filter).await?;
    Ok(HttpResponse::Ok().json(found))
}

/// Thumbnail of the effective main image, falling back to the original.
async fn sheet_image(data: &AppState, artwork_id: Id) -> Result<Option<Vec<u8>>, ApiError> {
    let images: Vec<_> = data
        .repo
        .list_attachments(artwork_id)
        .await?
        .into_iter()
        .filter(|f| f.kind() == MediaKind::Image)
        .collect();
    let Some(file) = main_image(&images) else {
        return Ok(None);
    };
    let name = &file.record.name;
    match data.store.get(&media::thumbnail_key(name)).await {
        Ok((bytes, _)) => Ok(Some(bytes)),
        Err(StorageError::NotFound) => {
            log::warn!("thumbnail of '{name}' missing; using the original");
            let (bytes, _) = data.store.get(name).await?;
            Ok(Some(bytes))
        }
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    post,
    path = "/artworks/{id}/create_pdf/",
    params(("id" = Id, Path, description = "Artwork id")),
    request_body = SelectTemplateForm,
    responses(
        (status = 200, description = "One-page sheet", content_type = "application/pdf"),
        (status = 404, description = "Not found"),
        (status = 422, description = "Unknown template")
    )
)]
pub async fn create_pdf(
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Json<SelectTemplateForm>,
) -> Result<HttpResponse, ApiError> {
    let artwork = EntityRepo::<Artwork>::get(&*data.repo, path.into_inner()).await?;
    form.validate()?;
    let layout = Layout::try_from(form.template).map_err(|_| ApiError::field("template", NOT_A_VALID_CHOICE))?;
    let image = sheet_image(&data, artwork.record.id).await?;

    let file_name = format!("artwork_{}.pdf", artwork.record.id);
    let bytes = web::block(move || pdf::render_artwork_sheet(&artwork, layout, image.as_deref())).await??;
    Ok(HttpResponse::Ok()
        .content_type("application/pdf")
        .insert_header((header::CONTENT_DISPOSITION, format!("inline; filename=\"{file_name}\"")))
        .body(bytes))
}
