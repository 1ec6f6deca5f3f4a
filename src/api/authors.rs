//! Author endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        author::{AuthorDeleteInfo, AuthorDetail, AuthorForm},
        pagination::{Page, PageQuery},
        Action, Author,
    },
};

use super::{found, AuthenticatedUser};

/// List authors by last name, then first name
#[utoipa::path(
    get,
    path = "/catalog/authors/",
    tag = "authors",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of authors (5 per page)"),
        (status = 404, description = "Page out of range")
    )
)]
pub async fn list_authors(
    State(state): State<crate::AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<Author>>> {
    let page = state.services.catalog.list_authors(query.number()).await?;
    Ok(Json(page))
}

/// Get an author and their books
#[utoipa::path(
    get,
    path = "/catalog/authors/{id}/",
    tag = "authors",
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Author details", body = AuthorDetail),
        (status = 404, description = "Author not found")
    )
)]
pub async fn get_author(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<AuthorDetail>> {
    let author = state.services.catalog.get_author(id).await?;
    Ok(Json(author))
}

#[utoipa::path(
    post,
    path = "/catalog/author/create/",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = AuthorForm,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights or email not verified")
    )
)]
pub async fn create_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(form): Json<AuthorForm>,
) -> AppResult<(StatusCode, Json<Author>)> {
    claims.authorize(Action::CreateAuthor)?;

    let author = state.services.catalog.create_author(form).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

#[utoipa::path(
    get,
    path = "/catalog/author/{id}/update/",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Author form values", body = Author),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn edit_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Author>> {
    claims.authorize(Action::UpdateAuthor)?;

    let author = state.services.catalog.get_author(id).await?;
    Ok(Json(author.author))
}

#[utoipa::path(
    post,
    path = "/catalog/author/{id}/update/",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    request_body = AuthorForm,
    responses(
        (status = 200, description = "Author updated", body = Author),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn update_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(form): Json<AuthorForm>,
) -> AppResult<Json<Author>> {
    claims.authorize(Action::UpdateAuthor)?;

    let author = state.services.catalog.update_author(id, form).await?;
    Ok(Json(author))
}

#[utoipa::path(
    get,
    path = "/catalog/author/{id}/delete/",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 200, description = "Delete confirmation", body = AuthorDeleteInfo),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn confirm_delete_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<AuthorDeleteInfo>> {
    claims.authorize(Action::DeleteAuthor)?;

    let info = state.services.catalog.author_delete_info(id).await?;
    Ok(Json(info))
}

/// Delete an author no book refers to
#[utoipa::path(
    post,
    path = "/catalog/author/{id}/delete/",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Author ID")),
    responses(
        (status = 302, description = "Deleted, redirect to the author list"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Author not found"),
        (status = 409, description = "Author still has books")
    )
)]
pub async fn delete_author(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    claims.authorize(Action::DeleteAuthor)?;

    state.services.catalog.delete_author(id).await?;
    Ok(found("/catalog/authors/"))
}
