use super::{parse_body, validate_url, ApiError, CutLinkRequest};
use crate::{
    auth::AuthAccount,
    models::{Link, LinkStatus},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct LinkView {
    pub short_id: String,
    pub target_url: String,
    pub status: LinkStatus,
}

impl From<Link> for LinkView {
    fn from(link: Link) -> Self {
        Self {
            short_id: link.short_id,
            target_url: link.target_url,
            status: link.status,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountLinks {
    pub links: Vec<LinkView>,
}

/// Account routes act on behalf of the token holder only.
fn ensure_self(auth: &AuthAccount, account_id: &str) -> Result<(), Response> {
    if auth.0 == account_id {
        Ok(())
    } else {
        Err((StatusCode::FORBIDDEN, "Token does not match account").into_response())
    }
}

/// GET /accounts/:id
pub async fn list_links(
    auth: AuthAccount,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
) -> Response {
    if let Err(resp) = ensure_self(&auth, &account_id) {
        return resp;
    }

    match state.service.list_by_owner(&auth.0).await {
        Ok(links) => Json(AccountLinks {
            links: links.into_iter().map(LinkView::from).collect(),
        })
        .into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST /accounts/:id/links
pub async fn create_link(
    auth: AuthAccount,
    State(state): State<Arc<AppState>>,
    Path(account_id): Path<String>,
    payload: Result<Json<CutLinkRequest>, JsonRejection>,
) -> Response {
    if let Err(resp) = ensure_self(&auth, &account_id) {
        return resp;
    }
    let body = match parse_body(payload) {
        Ok(body) => body,
        Err(resp) => return resp,
    };
    let url = match validate_url(&body.link) {
        Ok(url) => url,
        Err(resp) => return resp,
    };

    match state.service.cut_link(&url, Some(&auth.0)).await {
        Ok(short_id) => short_id.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// DELETE /accounts/:id/links/:short_id
pub async fn delete_link(
    auth: AuthAccount,
    State(state): State<Arc<AppState>>,
    Path((account_id, short_id)): Path<(String, String)>,
) -> Response {
    if let Err(resp) = ensure_self(&auth, &account_id) {
        return resp;
    }

    match state.service.delete_link(&short_id, &auth.0).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}
