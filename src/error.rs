use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::forms::{self, FieldErrors};
use crate::media::MediaError;
use crate::pdf::PdfError;
use crate::repo::RepoError;
use crate::storage::StorageError;

pub const DELETE_BLOCKED: &str = "Unable to delete the selected object";

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Vec<&'static str>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("not found")] NotFound,
    #[error("unauthorized")] Unauthorized,
    #[error("bad request: {0}")] BadRequest(String),
    #[error("validation failed")] Validation(FieldErrors),
    #[error("Unable to delete the selected object")] Protected(Vec<&'static str>),
    #[error("conflict")] Conflict,
    #[error("unsupported media type")] UnsupportedMedia,
    #[error("payload too large")] PayloadTooLarge,
    #[error("internal error")] Internal,
}

impl ApiError {
    pub fn field(field: &str, message: &str) -> Self {
        ApiError::Validation(forms::single_error(field, message))
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Protected(blocked) => ApiError::Protected(blocked),
            RepoError::InvalidChoice(field) => ApiError::field(field, forms::NOT_A_VALID_CHOICE),
            RepoError::Internal(msg) => {
                log::error!("repository failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(e: validator::ValidationErrors) -> Self {
        ApiError::Validation(forms::field_errors(&e))
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound => ApiError::NotFound,
            StorageError::Other(msg) => {
                log::error!("object storage failure: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<MediaError> for ApiError {
    fn from(e: MediaError) -> Self {
        log::error!("media processing failure: {e}");
        ApiError::Internal
    }
}

impl From<PdfError> for ApiError {
    fn from(e: PdfError) -> Self {
        log::error!("pdf export failure: {e}");
        ApiError::Internal
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        log::error!("io failure: {e}");
        ApiError::Internal
    }
}

impl From<actix_web::error::BlockingError> for ApiError {
    fn from(_: actix_web::error::BlockingError) -> Self {
        log::error!("blocking task was cancelled");
        ApiError::Internal
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Protected(_) | ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::UnsupportedMedia => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = ApiErrorBody {
            error: self.to_string(),
            fields: match self {
                ApiError::Validation(fields) => Some(fields.clone()),
                _ => None,
            },
            blocked_by: match self {
                ApiError::Protected(blocked) => Some(blocked.clone()),
                _ => None,
            },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}
