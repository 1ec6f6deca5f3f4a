//! Book instance and loan endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        book_instance::{CheckoutAction, CreateInstance, LoanSearch, RenewForm, RenewProposal},
        pagination::{Page, PageNumber, PageQuery},
        Action, BookInstance, InstanceSummary,
    },
};

use super::{found, AuthenticatedUser};

/// Where librarians land after a renewal
pub const LOANED_BOOKS_URL: &str = "/catalog/loanedbooks/";

/// Where borrowers land after a checkout change
pub const MY_BOOKS_URL: &str = "/catalog/mybooks/";

/// A malformed instance identifier names no instance
fn parse_instance_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Book instance {} not found", raw)))
}

/// Add a copy of a book; copies start in maintenance
#[utoipa::path(
    post,
    path = "/catalog/book/{id}/instances/",
    tag = "instances",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Book ID")),
    request_body = CreateInstance,
    responses(
        (status = 201, description = "Copy created", body = BookInstance),
        (status = 400, description = "Invalid form"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn create_instance(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i32>,
    Json(form): Json<CreateInstance>,
) -> AppResult<(StatusCode, Json<BookInstance>)> {
    claims.authorize(Action::CreateInstance)?;

    let instance = state.services.loans.create_instance(book_id, form).await?;
    Ok((StatusCode::CREATED, Json(instance)))
}

#[utoipa::path(
    get,
    path = "/catalog/bookinstance/{id}/delete/",
    tag = "instances",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Book instance UUID")),
    responses(
        (status = 200, description = "Delete confirmation", body = InstanceSummary),
        (status = 403, description = "Insufficient rights or email not verified"),
        (status = 404, description = "Book instance not found")
    )
)]
pub async fn confirm_delete_instance(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<InstanceSummary>> {
    claims.authorize(Action::DeleteInstance)?;

    let instance = state
        .services
        .loans
        .get_instance(parse_instance_id(&id)?)
        .await?;
    Ok(Json(instance))
}

/// Delete a copy that is not on loan
#[utoipa::path(
    post,
    path = "/catalog/bookinstance/{id}/delete/",
    tag = "instances",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Book instance UUID")),
    responses(
        (status = 302, description = "Deleted, redirect to the book's delete page"),
        (status = 403, description = "Insufficient rights or email not verified"),
        (status = 404, description = "Book instance not found"),
        (status = 409, description = "Copy is on loan")
    )
)]
pub async fn delete_instance(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    claims.authorize(Action::DeleteInstance)?;

    let book_id = state
        .services
        .loans
        .delete_instance(parse_instance_id(&id)?)
        .await?;

    Ok(match book_id {
        Some(book_id) => found(&format!("/catalog/book/{}/delete/", book_id)),
        None => found("/catalog/books/"),
    })
}

/// Copies on loan to the caller
#[utoipa::path(
    get,
    path = "/catalog/mybooks/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "Caller's loans, soonest due first (10 per page)"),
        (status = 302, description = "Not logged in")
    )
)]
pub async fn my_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<InstanceSummary>>> {
    let page = state.services.loans.loans_of(claims.user_id, query.number()).await?;
    Ok(Json(page))
}

/// Every copy on loan, optionally filtered by title
#[utoipa::path(
    get,
    path = "/catalog/loanedbooks/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanSearch),
    responses(
        (status = 200, description = "All loans, soonest due first (10 per page)"),
        (status = 302, description = "Not logged in"),
        (status = 403, description = "Insufficient rights")
    )
)]
pub async fn loaned_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<LoanSearch>,
) -> AppResult<Json<Page<InstanceSummary>>> {
    claims.authorize(Action::ViewAllLoans)?;

    let number = PageNumber::parse(query.page.as_deref());
    let page = state
        .services
        .loans
        .all_loans(query.search, number)
        .await?;
    Ok(Json(page))
}

/// Copies on loan to one user
#[utoipa::path(
    get,
    path = "/catalog/borrowers/{id}/books/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Borrower user ID"), PageQuery),
    responses(
        (status = 200, description = "The user's loans"),
        (status = 403, description = "Not the caller's list and insufficient rights"),
        (status = 404, description = "User not found")
    )
)]
pub async fn borrower_books(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(borrower_id): Path<i32>,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<InstanceSummary>>> {
    claims.authorize(Action::ViewLoansOf { borrower_id })?;

    state.services.accounts.get_user(borrower_id).await?;
    let page = state.services.loans.loans_of(borrower_id, query.number()).await?;
    Ok(Json(page))
}

/// Renewal form: the copy and the proposed due-back date
#[utoipa::path(
    get,
    path = "/catalog/book/{id}/renew/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Book instance UUID")),
    responses(
        (status = 200, description = "Renewal proposal", body = RenewProposal),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book instance not found")
    )
)]
pub async fn renew_form(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
) -> AppResult<Json<RenewProposal>> {
    claims.authorize(Action::RenewInstance)?;

    let proposal = state
        .services
        .loans
        .renew_proposal(parse_instance_id(&id)?)
        .await?;
    Ok(Json(proposal))
}

/// Renew a loan; an empty body renews to the proposed date
#[utoipa::path(
    post,
    path = "/catalog/book/{id}/renew/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Book instance UUID")),
    request_body = RenewForm,
    responses(
        (status = 302, description = "Renewed, redirect to /catalog/loanedbooks/"),
        (status = 400, description = "Date in the past or more than 4 weeks ahead"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book instance not found"),
        (status = 409, description = "Copy changed concurrently"),
        (status = 422, description = "Copy is not on loan")
    )
)]
pub async fn renew(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Response> {
    claims.authorize(Action::RenewInstance)?;
    let id = parse_instance_id(&id)?;

    let form = if body.iter().all(u8::is_ascii_whitespace) {
        RenewForm::default()
    } else {
        serde_json::from_slice::<RenewForm>(&body)
            .map_err(|e| AppError::Validation(format!("Invalid renewal form: {}", e)))?
    };

    state.services.loans.renew(id, form).await?;
    Ok(found(LOANED_BOOKS_URL))
}

/// Checkout, return, reserve or make a copy available
#[utoipa::path(
    post,
    path = "/catalog/update-checkout/{id}/",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Book instance UUID")),
    request_body = CheckoutAction,
    responses(
        (status = 302, description = "Done, redirect to /catalog/mybooks/"),
        (status = 400, description = "Invalid due-back date"),
        (status = 403, description = "Insufficient rights"),
        (status = 404, description = "Book instance or borrower not found"),
        (status = 409, description = "Copy changed concurrently"),
        (status = 422, description = "Transition not allowed from the current status")
    )
)]
pub async fn update_checkout(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<String>,
    Json(action): Json<CheckoutAction>,
) -> AppResult<Response> {
    let id = parse_instance_id(&id)?;

    state
        .services
        .loans
        .update_checkout(id, action, &claims)
        .await?;
    Ok(found(MY_BOOKS_URL))
}
