//! Book endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};

use crate::{
    error::{AppError, AppResult, FieldErrors},
    models::{
        book::{BookDeleteInfo, BookDetail, BookEdit, BookForm, CoverImage},
        pagination::{Page, PageQuery},
        Action, Book, BookShort,
    },
};

use super::{found, AuthenticatedUser};

/// Multipart field carrying the uploaded cover
const COVER_FIELD: &str = "cover_image";

/// Bodies past the router's limit get the same message as oversized images
fn upload_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::InvalidForm(FieldErrors::single(
            COVER_FIELD,
            "Image file too large: must be less than 1MB",
        ))
    } else {
        AppError::BadRequest(e.body_text())
    }
}

/// List books, ordered by title
#[utoipa::path(
    get,
    path = "/catalog/books/",
    tag = "books",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of books (5 per page)"),
        (status = 404, description = "Page out of range")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<BookShort>>> {
    let page = state.services.catalog.list_books(query.number()).await?;
    Ok(Json(page))
}

/// Get book details with its copies
#[utoipa::path(
    get,
    path = "/catalog/book/{id}/",
    tag = "books",
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = BookDetail),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDetail>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a new book
#[utoipa::path(
    post,
    path = "/catalog/book/create/",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = BookForm,
    responses(
        (status = 201, description = "Book created", body = Book),
        (status = 302, description = "Not logged in"),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights or email not verified"),
        (status = 409, description = "ISBN already used")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(form): Json<BookForm>,
) -> AppResult<(StatusCode, Json<Book>)> {
    claims.authorize(Action::CreateBook)?;

    let book = state.services.catalog.create_book(form).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

/// Current values of a book, for the update form
#[utoipa::path(
    get,
    path = "/catalog/book/{id}/update/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book form values", body = BookEdit),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn edit_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookEdit>> {
    claims.authorize(Action::UpdateBook)?;

    let book = state.services.catalog.edit_book(id).await?;
    Ok(Json(book))
}

/// Update a book
#[utoipa::path(
    post,
    path = "/catalog/book/{id}/update/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = BookForm,
    responses(
        (status = 200, description = "Book updated", body = Book),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN already used")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(form): Json<BookForm>,
) -> AppResult<Json<Book>> {
    claims.authorize(Action::UpdateBook)?;

    let book = state.services.catalog.update_book(id, form).await?;
    Ok(Json(book))
}

/// What deleting a book would affect
#[utoipa::path(
    get,
    path = "/catalog/book/{id}/delete/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Delete confirmation", body = BookDeleteInfo),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn confirm_delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<BookDeleteInfo>> {
    claims.authorize(Action::DeleteBook)?;

    let info = state.services.catalog.book_delete_info(id).await?;
    Ok(Json(info))
}

/// Delete a book that has no copies left
#[utoipa::path(
    post,
    path = "/catalog/book/{id}/delete/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    responses(
        (status = 302, description = "Deleted, redirect to the book list"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Book still has copies")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Response> {
    claims.authorize(Action::DeleteBook)?;

    state.services.catalog.delete_book(id).await?;
    Ok(found("/catalog/books/"))
}

/// Upload or replace the cover image of a book
#[utoipa::path(
    post,
    path = "/catalog/book/{id}/cover/",
    tag = "books",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body(content = String, content_type = "multipart/form-data", description = "Image in the `cover_image` field"),
    responses(
        (status = 200, description = "Cover stored", body = CoverImage),
        (status = 400, description = "Missing, oversized or undecodable image"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found"),
        (status = 502, description = "Media storage unavailable")
    )
)]
pub async fn upload_cover(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    mut multipart: Multipart,
) -> AppResult<Json<CoverImage>> {
    claims.authorize(Action::UpdateBook)?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(upload_error)?
    {
        if field.name() != Some(COVER_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or("cover").to_string();
        let content = field
            .bytes()
            .await
            .map_err(upload_error)?;

        let cover = state
            .services
            .catalog
            .upload_cover(id, &filename, content.to_vec())
            .await?;
        return Ok(Json(cover));
    }

    Err(AppError::InvalidForm(FieldErrors::single(
        COVER_FIELD,
        "No file was submitted.",
    )))
}
