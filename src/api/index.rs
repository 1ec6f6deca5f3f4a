//! Site root and catalog home page

use axum::{extract::State, response::Redirect, Json};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::AppResult, services::catalog::CatalogCounts};

use super::MaybeUser;

/// Cookie the front end uses to remember the navigation menu state
pub const NAV_MENU_COOKIE: &str = "nav_menu_state";

#[derive(Serialize, ToSchema)]
pub struct IndexResponse {
    #[serde(flatten)]
    pub counts: CatalogCounts,
    pub nav_menu_open: bool,
    /// Username of the caller, when logged in
    pub username: Option<String>,
}

/// Redirect the site root to the catalog
#[utoipa::path(
    get,
    path = "/",
    tag = "catalog",
    responses((status = 308, description = "Permanent redirect to /catalog/"))
)]
pub async fn root() -> Redirect {
    Redirect::permanent("/catalog/")
}

/// Catalog home page counters
#[utoipa::path(
    get,
    path = "/catalog/",
    tag = "catalog",
    responses((status = 200, description = "Catalog counters", body = IndexResponse))
)]
pub async fn index(
    State(state): State<crate::AppState>,
    MaybeUser(claims): MaybeUser,
    jar: CookieJar,
) -> AppResult<Json<IndexResponse>> {
    let counts = state.services.catalog.counts().await?;
    let nav_menu_open = jar
        .get(NAV_MENU_COOKIE)
        .map(|cookie| cookie.value() == "open")
        .unwrap_or(false);

    Ok(Json(IndexResponse {
        counts,
        nav_menu_open,
        username: claims.map(|c| c.username),
    }))
}
