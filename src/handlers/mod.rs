pub mod accounts;
pub mod links;
pub mod metrics;

use crate::error::LinkError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

/// Body of both link creation endpoints.
#[derive(Debug, Deserialize)]
pub struct CutLinkRequest {
    pub link: String,
}

/// Unwrap a JSON body, answering 400 for anything malformed.
pub(crate) fn parse_body<T>(
    payload: Result<axum::Json<T>, JsonRejection>,
) -> Result<T, Response> {
    payload
        .map(|axum::Json(body)| body)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()).into_response())
}

/// Trim the submitted URL and require an http(s) scheme.
pub(crate) fn validate_url(raw: &str) -> Result<String, Response> {
    let url = raw.trim();
    if url.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "URL must not be empty").into_response());
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(
            (StatusCode::BAD_REQUEST, "URL must start with http:// or https://").into_response(),
        );
    }
    Ok(url.to_owned())
}

/// Service failures as HTTP responses.
pub struct ApiError(LinkError);

impl From<LinkError> for ApiError {
    fn from(e: LinkError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.0 {
            LinkError::NotFound => {
                (StatusCode::BAD_REQUEST, "Short link not found").into_response()
            }
            LinkError::AccessDenied => (StatusCode::FORBIDDEN, "Access denied").into_response(),
            e => {
                tracing::error!("Request failed: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}
