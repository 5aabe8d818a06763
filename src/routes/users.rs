use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use super::AppState;
use crate::auth::{self, Auth};
use crate::error::ApiError;
use crate::forms::{LoginForm, UserForm};
use crate::models::{Id, ListQuery};
use crate::repo::{Repo, RepoError, UserRepo};

pub const NAME_TAKEN: &str = "Name is already taken.";

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

async fn hash(password: String) -> Result<String, ApiError> {
    web::block(move || auth::hash_password(&password)).await?.map_err(|e| {
        log::error!("password hashing failed: {e}");
        ApiError::Internal
    })
}

/// Creates the first account when no user exists yet.
pub async fn ensure_bootstrap_user(repo: &dyn Repo, name: &str, password: &str) -> anyhow::Result<()> {
    if repo.count_users().await? > 0 {
        return Ok(());
    }
    let hashed = auth::hash_password(password).map_err(|e| anyhow::anyhow!("hashing bootstrap password: {e}"))?;
    let user = repo.create_user(name, &hashed).await?;
    log::info!("created bootstrap user '{}' (#{})", user.record.name, user.record.id);
    Ok(())
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginForm,
    responses(
        (status = 200, description = "Bearer token", body = TokenResponse),
        (status = 401, description = "Bad credentials"),
        (status = 422, description = "Validation failed")
    )
)]
pub async fn login(data: web::Data<AppState>, form: web::Json<LoginForm>) -> Result<HttpResponse, ApiError> {
    form.validate()?;
    let LoginForm { name, password } = form.into_inner();
    let Some((user, stored)) = data.repo.find_credentials(name.trim()).await? else {
        log::info!("login refused for unknown user '{name}'");
        return Err(ApiError::Unauthorized);
    };
    let ok = web::block(move || auth::verify_password(&password, &stored)).await?.map_err(|e| {
        log::error!("stored password hash unreadable: {e}");
        ApiError::Internal
    })?;
    if !ok {
        log::info!("login refused for '{name}': wrong password");
        return Err(ApiError::Unauthorized);
    }
    let token = auth::create_jwt(&user, &data.config.jwt_secret).map_err(|e| {
        log::error!("token signing failed: {e}");
        ApiError::Internal
    })?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    responses((status = 200, description = "Current user", body = User), (status = 401, description = "No valid token"))
)]
pub async fn me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    match data.repo.get_user(auth.0.sub).await {
        Ok(user) => Ok(HttpResponse::Ok().json(user)),
        // token outlived its account
        Err(RepoError::NotFound) => Err(ApiError::Unauthorized),
        Err(e) => Err(e.into()),
    }
}

#[utoipa::path(
    get,
    path = "/users/",
    params(ListQuery),
    responses((status = 200, description = "Users, paginated"), (status = 401, description = "No valid token"))
)]
pub async fn list(_auth: Auth, data: web::Data<AppState>, query: web::Query<ListQuery>) -> Result<HttpResponse, ApiError> {
    let params = query.resolve(data.config.rows_per_page);
    Ok(HttpResponse::Ok().json(data.repo.list_users(&params).await?))
}

#[utoipa::path(
    post,
    path = "/users/create/",
    request_body = UserForm,
    responses(
        (status = 201, description = "Created", body = User),
        (status = 401, description = "No valid token"),
        (status = 422, description = "Validation failed or name taken")
    )
)]
pub async fn create(_auth: Auth, data: web::Data<AppState>, form: web::Json<UserForm>) -> Result<HttpResponse, ApiError> {
    form.validate()?;
    let UserForm { name, password } = form.into_inner();
    let hashed = hash(password).await?;
    let user = match data.repo.create_user(name.trim(), &hashed).await {
        Ok(user) => user,
        Err(RepoError::Conflict) => return Err(ApiError::field("name", NAME_TAKEN)),
        Err(e) => return Err(e.into()),
    };
    log::info!("created user '{}' (#{})", user.record.name, user.record.id);
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    post,
    path = "/users/delete/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 204, description = "Deactivated"),
        (status = 400, description = "Own account"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    if id == auth.0.sub {
        return Err(ApiError::BadRequest("cannot delete your own account".into()));
    }
    data.repo.delete_user(id).await?;
    log::info!("user #{id} deleted by '{}'", auth.0.name);
    Ok(HttpResponse::NoContent().finish())
}
