//! List / choices / create / edit / delete / view handlers shared by every
//! entity. Routes live under `/{table}/`.

use actix_web::{web, HttpResponse, Scope};
use validator::Validate;

use super::AppState;
use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Choice, Entity, Id, ListQuery};
use crate::repo::{EntityRepo, Repo};

/// Generic routes for `T`. `with_view` is false for entities that register a
/// richer `/view/{id}` of their own.
pub fn scope<T: Entity>(with_view: bool) -> Scope
where
    dyn Repo: EntityRepo<T>,
{
    let scope = web::scope(&format!("/{}", T::KIND.table()))
        .route("/", web::get().to(list::<T>))
        .route("/choices/", web::get().to(choices::<T>))
        .route("/create/", web::post().to(create::<T>))
        .service(
            web::resource("/edit/{id}")
                .route(web::get().to(edit_form::<T>))
                .route(web::post().to(update::<T>))
                .route(web::put().to(update::<T>)),
        )
        .service(
            web::resource("/delete/{id}")
                .route(web::post().to(delete::<T>))
                .route(web::delete().to(delete::<T>)),
        );
    if with_view {
        scope.route("/view/{id}", web::get().to(view::<T>))
    } else {
        scope
    }
}

pub async fn list<T: Entity>(
    data: web::Data<AppState>,
    query: web::Query<ListQuery>,
    filter: web::Query<T::Filter>,
) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let params = query.resolve(data.config.rows_per_page);
    let page = EntityRepo::<T>::list(&*data.repo, &params, &filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

pub async fn choices<T: Entity>(
    data: web::Data<AppState>,
    filter: web::Query<T::Filter>,
) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let rows = EntityRepo::<T>::all(&*data.repo, &filter).await?;
    let choices: Vec<Choice> = rows
        .iter()
        .map(|r| Choice { id: r.record().id, name: r.record().name.clone() })
        .collect();
    Ok(HttpResponse::Ok().json(choices))
}

pub async fn create<T: Entity>(
    _auth: Auth,
    data: web::Data<AppState>,
    form: web::Json<T::Form>,
) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    form.validate()?;
    let row = EntityRepo::<T>::create(&*data.repo, &form).await?;
    log::info!("created {} #{}", T::KIND.table(), row.record().id);
    Ok(HttpResponse::Created().json(row))
}

pub async fn edit_form<T: Entity>(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let row = EntityRepo::<T>::get(&*data.repo, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

pub async fn update<T: Entity>(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    form: web::Json<T::Form>,
) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let id = path.into_inner();
    // unknown ids are 404 even when the form is invalid
    EntityRepo::<T>::get(&*data.repo, id).await?;
    form.validate()?;
    let row = EntityRepo::<T>::update(&*data.repo, id, &form).await?;
    Ok(HttpResponse::Ok().json(row))
}

pub async fn delete<T: Entity>(
    _auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let id = path.into_inner();
    EntityRepo::<T>::delete(&*data.repo, id).await?;
    log::info!("deleted {} #{id}", T::KIND.table());
    Ok(HttpResponse::NoContent().finish())
}

pub async fn view<T: Entity>(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError>
where
    dyn Repo: EntityRepo<T>,
{
    let row = EntityRepo::<T>::get(&*data.repo, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}
