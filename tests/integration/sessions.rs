//! Sessions follow the account as it stands, not as it was at login

use axum::http::StatusCode;
use chrono::Utc;
use library_catalog::{
    models::user::{AccountType, ChangePasswordRequest, LoginRequest, PasswordResetConfirm},
    services::accounts::{KeyPurpose, KeySigner},
    AppError,
};
use serde_json::json;
use sqlx::PgPool;

use crate::common::*;

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_demoted_librarian_loses_rights_at_once(pool: PgPool) {
    let state = state(pool);
    let (librarian, token) = user(&state, "librarian", AccountType::Librarian).await;

    let response = send(router(&state), get("/catalog/loanedbooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);

    state
        .services
        .accounts
        .set_account_type(librarian.id, AccountType::Member)
        .await
        .unwrap();

    let response = send(router(&state), get("/catalog/loanedbooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Their own loans stay visible
    let response = send(router(&state), get("/catalog/mybooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_deleted_account_sessions_stop_working(pool: PgPool) {
    let state = state(pool);
    let (_, admin) = user(&state, "admin", AccountType::Admin).await;
    let (reader, token) = user(&state, "reader", AccountType::Member).await;

    let response = send(router(&state), get("/catalog/mybooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        router(&state),
        axum::http::Request::delete(format!("/admin/users/{}/", reader.id))
            .header(
                axum::http::header::AUTHORIZATION,
                format!("Bearer {}", admin),
            )
            .body(axum::body::Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(router(&state), get("/catalog/mybooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(router(&state), with_cookie(get("/catalog/mybooks/", None), &token)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "/core/accounts/login/?next=%2Fcatalog%2Fmybooks%2F"
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_admin_email_verification_applies_to_open_sessions(pool: PgPool) {
    let state = state(pool);
    let (_, admin) = user(&state, "admin", AccountType::Admin).await;

    let users = &state.services.repository.users;
    let librarian = users
        .create(
            "newhire",
            "newhire@example.org",
            &library_catalog::services::accounts::hash_password("correct horse battery").unwrap(),
            AccountType::Librarian,
        )
        .await
        .unwrap();
    let token = state.services.accounts.token_for(&librarian).unwrap();
    let book = json!({"title": "Dune", "summary": "Spice", "isbn": "9780441013593"});

    let response = send(
        router(&state),
        post_json("/catalog/book/create/", Some(&token), book.clone()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        router(&state),
        post_json(
            &format!("/admin/users/{}/verify-email/", librarian.id),
            Some(&admin),
            json!({}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        router(&state),
        post_json("/catalog/book/create/", Some(&token), book),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_password_change_ends_other_sessions(pool: PgPool) {
    let state = state(pool);
    let (_, token) = user(&state, "reader", AccountType::Member).await;
    let (_, other_device) = state
        .services
        .accounts
        .login(&LoginRequest {
            username: "reader".to_string(),
            password: "correct horse battery".to_string(),
        })
        .await
        .unwrap();

    let response = send(
        router(&state),
        post_json(
            "/core/accounts/password/change/",
            Some(&token),
            json!({
                "old_password": "correct horse battery",
                "new_password": "purple monkey dishwasher",
                "new_password2": "purple monkey dishwasher",
            }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let renewed = json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    for stale in [&token, &other_device] {
        let response = send(router(&state), get("/core/accounts/me/", Some(stale))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = send(router(&state), get("/core/accounts/me/", Some(&renewed))).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_password_reset_locks_out_existing_sessions(pool: PgPool) {
    let state = state(pool);
    let (reader, token) = user(&state, "reader", AccountType::Member).await;

    let key = KeySigner::new(state.config.auth.jwt_secret.clone())
        .sign(
            KeyPurpose::PasswordReset,
            reader.id,
            &reader.password,
            Utc::now().timestamp() + 3600,
        )
        .unwrap();

    state
        .services
        .accounts
        .reset_password(
            &key,
            PasswordResetConfirm {
                password: "purple monkey dishwasher".to_string(),
                password2: "purple monkey dishwasher".to_string(),
            },
        )
        .await
        .unwrap();

    let response = send(router(&state), get("/core/accounts/me/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let result = state
        .services
        .accounts
        .change_password(
            reader.id,
            ChangePasswordRequest {
                old_password: "correct horse battery".to_string(),
                new_password: "another long secret".to_string(),
                new_password2: "another long secret".to_string(),
            },
        )
        .await;
    assert!(matches!(result, Err(AppError::InvalidForm(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_deactivated_account_cannot_log_in(pool: PgPool) {
    let state = state(pool);
    let (admin_user, admin) = user(&state, "admin", AccountType::Admin).await;
    let (reader, token) = user(&state, "reader", AccountType::Member).await;
    let credentials = LoginRequest {
        username: "reader".to_string(),
        password: "correct horse battery".to_string(),
    };

    let response = send(
        router(&state),
        put_json(
            &format!("/admin/users/{}/active/", reader.id),
            Some(&admin),
            json!({"is_active": false}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["is_active"], false);

    let response = send(router(&state), get("/catalog/mybooks/", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(matches!(
        state.services.accounts.login(&credentials).await,
        Err(AppError::Authentication(_))
    ));

    let listed = json(send(router(&state), get("/admin/users/", Some(&admin))).await).await;
    let row = listed["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == reader.id)
        .cloned()
        .unwrap();
    assert_eq!(row["is_active"], false);

    // Staff cannot lock themselves out
    let response = send(
        router(&state),
        put_json(
            &format!("/admin/users/{}/active/", admin_user.id),
            Some(&admin),
            json!({"is_active": false}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    state
        .services
        .accounts
        .set_active(reader.id, true)
        .await
        .unwrap();
    assert!(state.services.accounts.login(&credentials).await.is_ok());
}
