//! Genre endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::{genre::GenreForm, Action, Genre},
};

use super::AuthenticatedUser;

#[utoipa::path(
    get,
    path = "/catalog/genres/",
    tag = "genres",
    responses((status = 200, description = "All genres by name", body = Vec<Genre>))
)]
pub async fn list_genres(State(state): State<crate::AppState>) -> AppResult<Json<Vec<Genre>>> {
    let genres = state.services.catalog.list_genres().await?;
    Ok(Json(genres))
}

/// Create a genre; names are compared case-insensitively
#[utoipa::path(
    post,
    path = "/catalog/genre/create/",
    tag = "genres",
    security(("bearer_auth" = [])),
    request_body = GenreForm,
    responses(
        (status = 201, description = "Genre created", body = Genre),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights"),
        (status = 409, description = "Genre already exists")
    )
)]
pub async fn create_genre(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(form): Json<GenreForm>,
) -> AppResult<(StatusCode, Json<Genre>)> {
    claims.authorize(Action::CreateGenre)?;

    let genre = state.services.catalog.create_genre(form).await?;
    Ok((StatusCode::CREATED, Json(genre)))
}
