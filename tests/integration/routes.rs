//! Router behavior that is decided before any query runs

use axum::http::{header, StatusCode};
use library_catalog::models::{user::AccountType, Permission};
use serde_json::json;

use crate::common::*;

#[tokio::test]
async fn test_root_redirects_to_catalog() {
    let state = offline_state();
    let response = send(router(&state), get("/", None)).await;

    assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
    assert_eq!(location(&response), "/catalog/");
}

#[tokio::test]
async fn test_anonymous_loans_redirect_to_login() {
    let state = offline_state();
    let response = send(router(&state), get("/catalog/mybooks/", None)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/core/accounts/login/?next=%2Fcatalog%2Fmybooks%2F"
    );
}

#[tokio::test]
async fn test_member_cannot_list_all_loans() {
    let state = offline_state_as(caller(5, AccountType::Member, true, vec![]));
    let response = send(router(&state), get("/catalog/loanedbooks/", None)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_member_cannot_view_another_users_loans() {
    let state = offline_state_as(caller(5, AccountType::Member, true, vec![]));
    let response = send(router(&state), get("/catalog/borrowers/6/books/", None)).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unverified_email_blocks_book_creation() {
    let state = offline_state_as(caller(
        5,
        AccountType::Librarian,
        false,
        vec![Permission::AddBook],
    ));
    let response = send(
        router(&state),
        post_json(
            "/catalog/book/create/",
            None,
            json!({"title": "Dune", "summary": "Spice", "isbn": "9780441013593"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(response).await["error"], "EmailNotVerified");
}

#[tokio::test]
async fn test_renew_with_malformed_id_is_not_found() {
    let state = offline_state_as(caller(
        5,
        AccountType::Librarian,
        true,
        vec![Permission::CanMarkReturned],
    ));
    let response = send(router(&state), get("/catalog/book/not-a-uuid/renew/", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_member_cannot_renew() {
    let state = offline_state_as(caller(5, AccountType::Member, true, vec![]));
    let response = send(
        router(&state),
        post_json(
            &format!("/catalog/book/{}/renew/", uuid::Uuid::new_v4()),
            None,
            json!({}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_site_requires_staff() {
    let state = offline_state();

    let anonymous = send(router(&state), get("/admin/users/", None)).await;
    assert_eq!(anonymous.status(), StatusCode::FOUND);
    assert_eq!(
        location(&anonymous),
        "/core/accounts/login/?next=%2Fadmin%2Fusers%2F"
    );

    let librarian = offline_state_as(caller(5, AccountType::Librarian, true, vec![]));
    let response = send(router(&librarian), get("/admin/users/", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_bearer_is_unauthorized() {
    let state = offline_state();
    let response = send(router(&state), get("/catalog/mybooks/", Some("garbage"))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_page_sanitizes_next() {
    let state = offline_state();

    let response = send(
        router(&state),
        get("/core/accounts/login/?next=%2Fcatalog%2Fmybooks%2F", None),
    )
    .await;
    assert_eq!(json(response).await["next"], "/catalog/mybooks/");

    let response = send(
        router(&state),
        get("/core/accounts/login/?next=https%3A%2F%2Fevil.example%2F", None),
    )
    .await;
    assert_eq!(json(response).await["next"], "/");
}

#[tokio::test]
async fn test_logout_clears_session_cookie() {
    let state = offline_state();
    let response = send(
        router(&state),
        post_json("/core/accounts/logout/", None, json!({})),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("library_session="));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_health_and_frame_options() {
    let state = offline_state();
    let response = send(router(&state), get("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
        "DENY"
    );
    assert!(response
        .headers()
        .get(header::STRICT_TRANSPORT_SECURITY)
        .is_none());
}

#[tokio::test]
async fn test_ready_reports_unreachable_database() {
    let state = offline_state();
    let response = send(router(&state), get("/ready", None)).await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_login_attempts_are_throttled_per_client() {
    let state = offline_state();
    let burst = state.config.security.auth_throttle_burst;
    let attempt = |client: &str| {
        let mut request = post_json(
            "/core/accounts/login/",
            None,
            json!({"username": "reader"}),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", client.parse().unwrap());
        request
    };

    // Bodies missing the password are refused before any lookup
    let app = router(&state);
    for _ in 0..burst {
        let response = send(app.clone(), attempt("203.0.113.7")).await;
        assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    let response = send(app.clone(), attempt("203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = send(app.clone(), attempt("198.51.100.20")).await;
    assert_ne!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let page = send(app, get("/core/accounts/login/", None)).await;
    assert_eq!(page.status(), StatusCode::OK);
}
