//! API handlers for the library catalog

pub mod accounts;
pub mod admin;
pub mod authors;
pub mod books;
pub mod genres;
pub mod health;
pub mod index;
pub mod instances;
pub mod languages;
pub mod openapi;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, OriginalUri},
    http::{
        header::{self, AUTHORIZATION, LOCATION},
        request::Parts,
        HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
    models::{book::MAX_COVER_SIZE, SessionToken, UserClaims},
    services::accounts::AccountsService,
    AppState,
};

/// Name of the cookie carrying the session token
pub const SESSION_COOKIE: &str = "library_session";

/// How a request proves who is making it.
///
/// `Ok(None)` means anonymous; an error means credentials were presented
/// but are unusable.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    async fn authenticate(&self, parts: &Parts) -> AppResult<Option<UserClaims>>;
}

/// Where a session token was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Bearer,
    Cookie,
}

/// Session token presented with the request, if any.
///
/// A malformed or invalid bearer token is an error; a stale or tampered
/// cookie behaves like no session at all.
pub fn presented_session(parts: &Parts, secret: &str) -> AppResult<Option<(SessionToken, TokenSource)>> {
    if let Some(header) = parts.headers.get(AUTHORIZATION) {
        let token = header
            .to_str()
            .ok()
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| {
                AppError::Authentication("Invalid authorization header format".to_string())
            })?;

        let session = SessionToken::from_token(token, secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;
        return Ok(Some((session, TokenSource::Bearer)));
    }

    let jar = CookieJar::from_headers(&parts.headers);
    Ok(jar
        .get(SESSION_COOKIE)
        .and_then(|cookie| SessionToken::from_token(cookie.value(), secret).ok())
        .map(|session| (session, TokenSource::Cookie)))
}

/// JWT session, carried either as a bearer token or in the session cookie,
/// resolved against the account on every request
pub struct JwtStrategy {
    secret: String,
    accounts: AccountsService,
}

impl JwtStrategy {
    pub fn new(secret: impl Into<String>, accounts: AccountsService) -> Self {
        Self {
            secret: secret.into(),
            accounts,
        }
    }
}

#[async_trait]
impl AuthStrategy for JwtStrategy {
    async fn authenticate(&self, parts: &Parts) -> AppResult<Option<UserClaims>> {
        let Some((session, source)) = presented_session(parts, &self.secret)? else {
            return Ok(None);
        };

        match (self.accounts.resolve_session(&session).await?, source) {
            (Some(claims), _) => Ok(Some(claims)),
            (None, TokenSource::Bearer) => Err(AppError::Authentication(
                "Session is no longer valid".to_string(),
            )),
            (None, TokenSource::Cookie) => Ok(None),
        }
    }
}

/// Path and query of the request, as the client sent it
pub fn request_path(parts: &Parts) -> String {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(&parts.uri);

    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// Resolve the caller with `auth`, sending anonymous requests to the login page
pub async fn require_login(auth: &dyn AuthStrategy, parts: &Parts) -> AppResult<UserClaims> {
    auth.authenticate(parts)
        .await?
        .ok_or_else(|| AppError::LoginRequired {
            next: request_path(parts),
        })
}

/// Extractor for a logged-in user; anonymous requests are redirected to login
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        require_login(state.auth.as_ref(), parts)
            .await
            .map(AuthenticatedUser)
    }
}

/// Extractor for an optional user
pub struct MaybeUser(pub Option<UserClaims>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state.auth.authenticate(parts).await.map(MaybeUser)
    }
}

/// Session cookie holding `token`
pub fn session_cookie(token: String, max_age_hours: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .max_age(time::Duration::hours(max_age_hours as i64))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// Expired session cookie, overwriting the client's copy
pub fn clear_session_cookie(secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build()
}

/// 302 Found to `location`
pub fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

/// Build the application router with every route and layer
pub fn router(state: AppState) -> Router {
    let admin = admin::AdminSite::new(state.auth.clone()).router();

    // Clients are told apart by forwarded headers first, then by peer address
    let limits = &state.config.security;
    let throttle = GovernorConfigBuilder::default()
        .key_extractor(SmartIpKeyExtractor)
        .per_second(limits.auth_throttle_period_seconds.max(1))
        .burst_size(limits.auth_throttle_burst.max(1))
        .finish()
        .map(|config| -> &'static _ { Box::leak(Box::new(config)) });
    if throttle.is_none() {
        tracing::warn!("Invalid throttle settings; account endpoints are not rate limited");
    }
    let throttled = |route: MethodRouter<AppState>| match throttle {
        Some(config) => route.layer(GovernorLayer { config }),
        None => route,
    };

    let catalog = Router::new()
        .route("/", get(index::root))
        .route("/catalog/", get(index::index))
        // Books
        .route("/catalog/books/", get(books::list_books))
        .route("/catalog/book/create/", post(books::create_book))
        .route("/catalog/book/:id/", get(books::get_book))
        .route(
            "/catalog/book/:id/update/",
            get(books::edit_book).post(books::update_book),
        )
        .route(
            "/catalog/book/:id/delete/",
            get(books::confirm_delete_book).post(books::delete_book),
        )
        .route(
            "/catalog/book/:id/cover/",
            post(books::upload_cover).layer(DefaultBodyLimit::max(MAX_COVER_SIZE * 2)),
        )
        // Authors
        .route("/catalog/authors/", get(authors::list_authors))
        .route("/catalog/authors/:id/", get(authors::get_author))
        .route("/catalog/author/create/", post(authors::create_author))
        .route(
            "/catalog/author/:id/update/",
            get(authors::edit_author).post(authors::update_author),
        )
        .route(
            "/catalog/author/:id/delete/",
            get(authors::confirm_delete_author).post(authors::delete_author),
        )
        // Genres and languages
        .route("/catalog/genres/", get(genres::list_genres))
        .route("/catalog/genre/create/", post(genres::create_genre))
        .route("/catalog/languages/", get(languages::list_languages))
        .route("/catalog/language/create/", post(languages::create_language))
        // Copies and loans
        .route("/catalog/book/:id/instances/", post(instances::create_instance))
        .route(
            "/catalog/bookinstance/:id/delete/",
            get(instances::confirm_delete_instance).post(instances::delete_instance),
        )
        .route("/catalog/mybooks/", get(instances::my_books))
        .route("/catalog/loanedbooks/", get(instances::loaned_books))
        .route("/catalog/borrowers/:id/books/", get(instances::borrower_books))
        .route(
            "/catalog/book/:id/renew/",
            get(instances::renew_form).post(instances::renew),
        )
        .route("/catalog/update-checkout/:id/", post(instances::update_checkout))
        // Accounts
        .route("/core/accounts/signup/", throttled(post(accounts::signup)))
        .route(
            "/core/accounts/login/",
            get(accounts::login_page).merge(throttled(post(accounts::login))),
        )
        .route("/core/accounts/logout/", post(accounts::logout))
        .route("/core/accounts/me/", get(accounts::me))
        .route("/core/accounts/email/send/", post(accounts::send_confirmation))
        .route("/core/accounts/email/confirm/:key/", get(accounts::confirm_email))
        .route(
            "/core/accounts/password/reset/",
            throttled(post(accounts::request_password_reset)),
        )
        .route(
            "/core/accounts/password/reset/key/:key/",
            post(accounts::reset_password),
        )
        .route("/core/accounts/password/change/", post(accounts::change_password))
        // Health
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/admin", admin)
        .with_state(state.clone());

    let mut app = catalog.merge(openapi::create_openapi_router());

    // Uploaded media is only served by the app when it lives on local disk
    if let StorageConfig::Filesystem { root, base_url } = &state.config.storage {
        let mount = base_url.trim_end_matches('/');
        if mount.starts_with('/') && !mount.is_empty() {
            app = app.nest_service(mount, ServeDir::new(root));
        }
    }

    let security = &state.config.security;
    if security.https_required {
        let hsts = format!("max-age={}; includeSubDomains", security.hsts_seconds);
        if let Ok(value) = HeaderValue::from_str(&hsts) {
            app = app.layer(SetResponseHeaderLayer::overriding(
                header::STRICT_TRANSPORT_SECURITY,
                value,
            ));
        }
    }

    app.layer(SetResponseHeaderLayer::overriding(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    ))
    .layer(cors_layer(&security.cors_allowed_origins))
    .layer(CompressionLayer::new())
    .layer(TraceLayer::new_for_http())
}

/// CORS restricted to the configured origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, header::CONTENT_TYPE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    const SECRET: &str = "test-secret";

    fn token(user_id: i32) -> String {
        let now = chrono::Utc::now().timestamp();
        SessionToken {
            sub: "reader".to_string(),
            user_id,
            pwd: "fingerprint".to_string(),
            exp: now + 3600,
            iat: now,
        }
        .create_token(SECRET)
        .unwrap()
    }

    fn parts(builder: axum::http::request::Builder) -> Parts {
        builder.body(()).unwrap().into_parts().0
    }

    /// Strategy for requests that never present credentials
    struct Nobody;

    #[async_trait]
    impl AuthStrategy for Nobody {
        async fn authenticate(&self, _parts: &Parts) -> AppResult<Option<UserClaims>> {
            Ok(None)
        }
    }

    #[test]
    fn test_bearer_token_is_read() {
        let parts = parts(
            Request::get("/catalog/mybooks/")
                .header(AUTHORIZATION, format!("Bearer {}", token(7))),
        );
        let (session, source) = presented_session(&parts, SECRET).unwrap().unwrap();
        assert_eq!(session.user_id, 7);
        assert_eq!(session.pwd, "fingerprint");
        assert_eq!(source, TokenSource::Bearer);
    }

    #[test]
    fn test_session_cookie_is_read() {
        let parts = parts(
            Request::get("/catalog/mybooks/")
                .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, token(3))),
        );
        let (session, source) = presented_session(&parts, SECRET).unwrap().unwrap();
        assert_eq!(session.user_id, 3);
        assert_eq!(source, TokenSource::Cookie);
    }

    #[test]
    fn test_bad_bearer_is_an_error_but_bad_cookie_is_anonymous() {
        let bearer = parts(Request::get("/").header(AUTHORIZATION, "Bearer nonsense"));
        assert!(matches!(
            presented_session(&bearer, SECRET),
            Err(AppError::Authentication(_))
        ));

        let basic = parts(Request::get("/").header(AUTHORIZATION, "Basic cmVhZGVy"));
        assert!(matches!(
            presented_session(&basic, SECRET),
            Err(AppError::Authentication(_))
        ));

        let cookie = parts(
            Request::get("/").header(header::COOKIE, format!("{}=nonsense", SESSION_COOKIE)),
        );
        assert!(presented_session(&cookie, SECRET).unwrap().is_none());
        assert!(presented_session(&parts(Request::get("/")), SECRET)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_anonymous_login_required_keeps_query() {
        let parts = parts(Request::get("/catalog/loanedbooks/?search=dune"));
        match require_login(&Nobody, &parts).await {
            Err(AppError::LoginRequired { next }) => {
                assert_eq!(next, "/catalog/loanedbooks/?search=dune")
            }
            other => panic!("expected login redirect, got {:?}", other.map(|c| c.user_id)),
        }
    }

    #[test]
    fn test_session_cookie_flags() {
        let cookie = session_cookie("abc".to_string(), 24, true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));

        let cleared = clear_session_cookie(false);
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cleared.secure(), Some(false));
    }
}
