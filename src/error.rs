use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::adapters::AdapterError;
use crate::repo::RepoError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("unauthorized")] Unauthorized,
    #[error("forbidden")] Forbidden,
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("upstream service error")] BadGateway,
    #[error("service not configured")] ServiceUnavailable,
    #[error("internal error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Conflict => ApiError::Conflict,
            RepoError::Transport(msg) => {
                tracing::error!("storage transport error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UnknownCard | StoreError::UnknownLink => ApiError::NotFound,
            StoreError::LastCard | StoreError::LookupInFlight => ApiError::Conflict,
            StoreError::EmptyName
            | StoreError::NoCreatorCard
            | StoreError::NoDomain
            | StoreError::InvalidDomain => ApiError::BadRequest(e.to_string()),
            StoreError::Lookup(AdapterError::NotConfigured) => ApiError::ServiceUnavailable,
            StoreError::Lookup(AdapterError::LookupFailed(msg)) => {
                tracing::warn!("channel lookup failed: {msg}");
                ApiError::BadGateway
            }
            StoreError::Repo(e) => e.into(),
        }
    }
}

impl ResponseError for ApiError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::BadGateway => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        HttpResponse::build(status).json(ApiErrorBody { error: self.to_string() })
    }
}
