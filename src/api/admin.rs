//! Administration site for user accounts
//!
//! The site is built around an [`AuthStrategy`] handed to [`AdminSite::new`];
//! nothing about how it authenticates is decided elsewhere.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Extension, Json, Router,
};

use crate::{
    error::{AppError, AppResult},
    models::{
        pagination::{Page, PageQuery},
        user::{UpdateAccountType, UpdateActive},
        User, UserClaims, UserShort,
    },
    AppState,
};

use super::{require_login, AuthStrategy};

/// Authentication used by the admin routes
#[derive(Clone)]
pub struct AdminAuth(pub Arc<dyn AuthStrategy>);

pub struct AdminSite {
    auth: Arc<dyn AuthStrategy>,
}

impl AdminSite {
    pub fn new(auth: Arc<dyn AuthStrategy>) -> Self {
        Self { auth }
    }

    /// Routes to nest under `/admin`
    pub fn router(self) -> Router<AppState> {
        Router::new()
            .route("/users/", get(list_users))
            .route("/users/:id/", delete(delete_user))
            .route("/users/:id/account-type/", put(update_account_type))
            .route("/users/:id/verify-email/", post(verify_email))
            .route("/users/:id/active/", put(update_active))
            .layer(Extension(AdminAuth(self.auth)))
    }
}

/// Extractor for a staff member, authenticated through the site's strategy
pub struct StaffUser(pub UserClaims);

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let AdminAuth(auth) = parts
            .extensions
            .get::<AdminAuth>()
            .cloned()
            .ok_or_else(|| AppError::Internal("Admin site used without its authentication".to_string()))?;

        let claims = require_login(auth.as_ref(), parts).await?;
        claims.require_staff()?;
        Ok(StaffUser(claims))
    }
}

/// List users with their current number of loans
#[utoipa::path(
    get,
    path = "/admin/users/",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(PageQuery),
    responses(
        (status = 200, description = "One page of users (20 per page)"),
        (status = 302, description = "Not logged in"),
        (status = 403, description = "Not staff")
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Json<Page<UserShort>>> {
    let page = state.services.accounts.list_users(query.number()).await?;
    Ok(Json(page))
}

/// Change the account type (and so the permissions) of a user
#[utoipa::path(
    put,
    path = "/admin/users/{id}/account-type/",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateAccountType,
    responses(
        (status = 200, description = "Account type updated", body = User),
        (status = 400, description = "Staff cannot demote themselves"),
        (status = 403, description = "Not staff"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_account_type(
    State(state): State<AppState>,
    StaffUser(claims): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateAccountType>,
) -> AppResult<Json<User>> {
    if id == claims.user_id && !request.account_type.is_staff() {
        return Err(AppError::BadRequest(
            "You cannot remove your own administrator rights".to_string(),
        ));
    }

    let user = state
        .services
        .accounts
        .set_account_type(id, request.account_type)
        .await?;
    Ok(Json(user))
}

/// Mark a user's email address verified without the confirmation link
#[utoipa::path(
    post,
    path = "/admin/users/{id}/verify-email/",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "Email verified", body = User),
        (status = 403, description = "Not staff"),
        (status = 404, description = "User not found")
    )
)]
pub async fn verify_email(
    State(state): State<AppState>,
    StaffUser(_staff): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    let user = state.services.accounts.verify_email(id).await?;
    Ok(Json(user))
}

/// Deactivate or reactivate an account; deactivation ends its sessions
#[utoipa::path(
    put,
    path = "/admin/users/{id}/active/",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateActive,
    responses(
        (status = 200, description = "Account updated", body = User),
        (status = 400, description = "Staff cannot deactivate themselves"),
        (status = 403, description = "Not staff"),
        (status = 404, description = "User not found")
    )
)]
pub async fn update_active(
    State(state): State<AppState>,
    StaffUser(claims): StaffUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateActive>,
) -> AppResult<Json<User>> {
    if id == claims.user_id && !request.is_active {
        return Err(AppError::BadRequest(
            "You cannot deactivate your own account".to_string(),
        ));
    }

    let user = state
        .services
        .accounts
        .set_active(id, request.is_active)
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/admin/users/{id}/",
    tag = "admin",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 400, description = "Staff cannot delete themselves"),
        (status = 403, description = "Not staff"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User still has books on loan")
    )
)]
pub async fn delete_user(
    State(state): State<AppState>,
    StaffUser(claims): StaffUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    if id == claims.user_id {
        return Err(AppError::BadRequest(
            "You cannot delete your own account".to_string(),
        ));
    }

    state.services.accounts.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
