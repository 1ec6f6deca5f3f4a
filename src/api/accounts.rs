//! Account endpoints: signup, sessions, email confirmation and passwords

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppResult, LOGIN_URL},
    models::user::{
        ChangePasswordRequest, LoginRequest, PasswordResetConfirm, PasswordResetRequest,
        SignupRequest, User,
    },
    AppState,
};

use super::{clear_session_cookie, session_cookie, AuthenticatedUser};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NextQuery {
    /// Where to go once logged in
    pub next: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LoginPage {
    pub login_url: String,
    pub next: String,
}

/// Issued session
#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub token: String,
    pub token_type: String,
    pub user: User,
    /// Same-site path to continue to
    pub redirect_to: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

/// Keep only same-site relative paths; anything else goes home
pub fn safe_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Attach a fresh session cookie for `token`
fn open_session(state: &AppState, jar: CookieJar, token: &str) -> CookieJar {
    jar.add(session_cookie(
        token.to_string(),
        state.config.auth.jwt_expiration_hours,
        state.config.secure_cookies(),
    ))
}

fn session(token: String, user: User, redirect_to: String) -> Json<SessionResponse> {
    Json(SessionResponse {
        token,
        token_type: "Bearer".to_string(),
        user,
        redirect_to,
    })
}

/// Create a member account
#[utoipa::path(
    post,
    path = "/core/accounts/signup/",
    tag = "accounts",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "Account created and logged in", body = SessionResponse),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<SignupRequest>,
) -> AppResult<(StatusCode, CookieJar, Json<SessionResponse>)> {
    let (user, token) = state.services.accounts.signup(request).await?;
    let jar = open_session(&state, jar, &token);
    Ok((StatusCode::CREATED, jar, session(token, user, "/".to_string())))
}

/// Login entry point anonymous users are redirected to
#[utoipa::path(
    get,
    path = "/core/accounts/login/",
    tag = "accounts",
    params(NextQuery),
    responses((status = 200, description = "Login page data", body = LoginPage))
)]
pub async fn login_page(Query(query): Query<NextQuery>) -> Json<LoginPage> {
    Json(LoginPage {
        login_url: LOGIN_URL.to_string(),
        next: safe_next(query.next.as_deref()),
    })
}

#[utoipa::path(
    post,
    path = "/core/accounts/login/",
    tag = "accounts",
    params(NextQuery),
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Wrong username or password")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Query(query): Query<NextQuery>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let (user, token) = state.services.accounts.login(&request).await?;
    tracing::info!("User {} logged in", user.username);

    let jar = open_session(&state, jar, &token);
    Ok((jar, session(token, user, safe_next(query.next.as_deref()))))
}

#[utoipa::path(
    post,
    path = "/core/accounts/logout/",
    tag = "accounts",
    responses((status = 200, description = "Session cookie cleared", body = MessageResponse))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(clear_session_cookie(state.config.secure_cookies()));
    (jar, MessageResponse::new("Logged out"))
}

/// Get current user account
#[utoipa::path(
    get,
    path = "/core/accounts/me/",
    tag = "accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current account", body = User),
        (status = 302, description = "Not logged in")
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.accounts.get_user(claims.user_id).await?;
    Ok(Json(user))
}

/// Send the confirmation link again
#[utoipa::path(
    post,
    path = "/core/accounts/email/send/",
    tag = "accounts",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Confirmation mailed", body = MessageResponse),
        (status = 400, description = "Address already verified")
    )
)]
pub async fn send_confirmation(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<MessageResponse>> {
    let user = state.services.accounts.get_user(claims.user_id).await?;
    state.services.accounts.send_confirmation(&user).await?;
    Ok(MessageResponse::new("Confirmation email sent"))
}

/// Verify an email address and log its owner in
#[utoipa::path(
    get,
    path = "/core/accounts/email/confirm/{key}/",
    tag = "accounts",
    params(("key" = String, Path, description = "Signed confirmation key")),
    responses(
        (status = 200, description = "Address verified", body = SessionResponse),
        (status = 400, description = "Invalid or expired link")
    )
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    Path(key): Path<String>,
    jar: CookieJar,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let (user, token) = state.services.accounts.confirm_email(&key).await?;
    let jar = open_session(&state, jar, &token);
    Ok((jar, session(token, user, "/".to_string())))
}

/// Ask for a password reset link; the answer never reveals whether the address exists
#[utoipa::path(
    post,
    path = "/core/accounts/password/reset/",
    tag = "accounts",
    request_body = PasswordResetRequest,
    responses((status = 200, description = "Request accepted", body = MessageResponse))
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> AppResult<Json<MessageResponse>> {
    state
        .services
        .accounts
        .request_password_reset(&request.email)
        .await?;
    Ok(MessageResponse::new(
        "If this address belongs to an account, a reset link has been sent",
    ))
}

#[utoipa::path(
    post,
    path = "/core/accounts/password/reset/key/{key}/",
    tag = "accounts",
    params(("key" = String, Path, description = "Signed reset key")),
    request_body = PasswordResetConfirm,
    responses(
        (status = 200, description = "Password changed, every session ended", body = MessageResponse),
        (status = 400, description = "Invalid form or expired link")
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(form): Json<PasswordResetConfirm>,
) -> AppResult<Json<MessageResponse>> {
    state.services.accounts.reset_password(&key, form).await?;
    Ok(MessageResponse::new("Your password is now changed"))
}

/// Change the password; other sessions end and this one is renewed
#[utoipa::path(
    post,
    path = "/core/accounts/password/change/",
    tag = "accounts",
    security(("bearer_auth" = [])),
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed, new session issued", body = SessionResponse),
        (status = 400, description = "Invalid form")
    )
)]
pub async fn change_password(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    jar: CookieJar,
    Json(request): Json<ChangePasswordRequest>,
) -> AppResult<(CookieJar, Json<SessionResponse>)> {
    let (user, token) = state
        .services
        .accounts
        .change_password(claims.user_id, request)
        .await?;

    let jar = open_session(&state, jar, &token);
    Ok((jar, session(token, user, "/".to_string())))
}
