//! Language endpoints

use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AppResult,
    models::{language::LanguageForm, Action, Language},
};

use super::AuthenticatedUser;

#[utoipa::path(
    get,
    path = "/catalog/languages/",
    tag = "languages",
    responses((status = 200, description = "All languages by name", body = Vec<Language>))
)]
pub async fn list_languages(
    State(state): State<crate::AppState>,
) -> AppResult<Json<Vec<Language>>> {
    let languages = state.services.catalog.list_languages().await?;
    Ok(Json(languages))
}

#[utoipa::path(
    post,
    path = "/catalog/language/create/",
    tag = "languages",
    security(("bearer_auth" = [])),
    request_body = LanguageForm,
    responses(
        (status = 201, description = "Language created", body = Language),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights"),
        (status = 409, description = "Language already exists")
    )
)]
pub async fn create_language(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(form): Json<LanguageForm>,
) -> AppResult<(StatusCode, Json<Language>)> {
    claims.authorize(Action::CreateLanguage)?;

    let language = state.services.catalog.create_language(form).await?;
    Ok((StatusCode::CREATED, Json(language)))
}
