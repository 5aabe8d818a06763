use std::sync::Arc;

use actix_web::{error, web, HttpRequest};

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::{Artwork, ArtworkType, Client, Feature, Offer, Status, Tag};
use crate::repo::Repo;
use crate::storage::ObjectStore;

pub mod artworks;
pub mod attachments;
pub mod crud;
pub mod users;

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub store: Arc<dyn ObjectStore>,
    pub config: Arc<AppConfig>,
}

fn bad_json(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn bad_query(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::BadRequest(err.to_string()).into()
}

fn bad_path(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    log::debug!("unroutable path parameter: {err}");
    ApiError::NotFound.into()
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(bad_json))
        .app_data(web::QueryConfig::default().error_handler(bad_query))
        .app_data(web::PathConfig::default().error_handler(bad_path))
        .route("/", web::get().to(crud::list::<Artwork>))
        .route("/index/", web::get().to(crud::list::<Artwork>))
        .service(crud::scope::<ArtworkType>(true))
        .service(
            crud::scope::<Feature>(true).service(
                web::resource("/{feature_id}/value/{artwork_id}")
                    .route(web::get().to(artworks::feature_value))
                    .route(web::post().to(artworks::set_feature_value)),
            ),
        )
        .service(
            crud::scope::<Artwork>(false)
                .route("/view/{id}", web::get().to(artworks::view))
                .route("/search/", web::get().to(artworks::search))
                .service(
                    web::resource("/{id}/tags/{tag_id}")
                        .route(web::post().to(artworks::add_tag))
                        .route(web::delete().to(artworks::remove_tag)),
                )
                .route("/{id}/upload_file/", web::post().to(attachments::upload_file))
                .route("/{id}/create_pdf/", web::post().to(artworks::create_pdf)),
        )
        .service(crud::scope::<Tag>(true))
        .service(crud::scope::<Client>(true))
        .service(crud::scope::<Status>(true))
        .service(crud::scope::<Offer>(true))
        .service(
            web::scope("/attachments")
                .route("/view/{id}", web::get().to(attachments::view))
                .service(
                    web::resource("/edit/{id}")
                        .route(web::get().to(attachments::edit_form))
                        .route(web::post().to(attachments::update))
                        .route(web::put().to(attachments::update)),
                )
                .service(
                    web::resource("/delete/{id}")
                        .route(web::post().to(attachments::delete))
                        .route(web::delete().to(attachments::delete)),
                ),
        )
        .route("/files/{key}", web::get().to(attachments::get_file))
        .service(
            web::scope("/auth")
                .route("/login", web::post().to(users::login))
                .route("/me", web::get().to(users::me)),
        )
        .service(
            web::scope("/users")
                .route("/", web::get().to(users::list))
                .route("/create/", web::post().to(users::create))
                .service(
                    web::resource("/delete/{id}")
                        .route(web::post().to(users::delete))
                        .route(web::delete().to(users::delete)),
                ),
        );
}
