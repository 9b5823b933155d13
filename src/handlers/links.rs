use super::{parse_body, validate_url, ApiError, CutLinkRequest};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use std::sync::Arc;

/// POST /links
///
/// Cut an anonymous link. Responds with the bare short id.
pub async fn create_link(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CutLinkRequest>, JsonRejection>,
) -> Response {
    let body = match parse_body(payload) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let url = match validate_url(&body.link) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match state.service.cut_link(&url, None).await {
        Ok(short_id) => short_id.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET /link/:short_id
///
/// 303 to the target URL.
pub async fn redirect(
    State(state): State<Arc<AppState>>,
    Path(short_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let target = state.service.resolve(&short_id).await?;
    Ok(Redirect::to(&target))
}
