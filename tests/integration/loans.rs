//! Loan lifecycle against PostgreSQL

use axum::http::StatusCode;
use chrono::Duration;
use library_catalog::{
    models::{
        book::BookForm,
        book_instance::{CheckoutAction, CreateInstance},
        loan_state::{LoanState, LoanStatus, Transition},
        user::AccountType,
        BookInstance,
    },
    AppError, AppState,
};
use serde_json::json;
use sqlx::PgPool;

use crate::common::*;

/// An available copy of a fresh book
async fn available_copy(state: &AppState, librarian_token: &str) -> BookInstance {
    let book = state
        .services
        .catalog
        .create_book(BookForm {
            title: "The Left Hand of Darkness".to_string(),
            summary: "Winter".to_string(),
            isbn: "9780441478125".to_string(),
            author_id: None,
            language_id: None,
            genre_ids: Vec::new(),
        })
        .await
        .unwrap();

    let loans = &state.services.loans;
    let instance = loans
        .create_instance(
            book.id,
            CreateInstance {
                imprint: "Ace, 1969".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(instance.status, LoanStatus::Maintenance);

    loans
        .update_checkout(
            instance.id,
            CheckoutAction::MakeAvailable,
            &claims(state, librarian_token).await,
        )
        .await
        .unwrap();
    instance
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_checkout_then_renew(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let (reader, reader_token) = user(&state, "reader", AccountType::Member).await;
    let instance = available_copy(&state, &librarian).await;

    let response = send(
        router(&state),
        post_json(
            &format!("/catalog/update-checkout/{}/", instance.id),
            Some(&reader_token),
            json!({"action": "checkout"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/catalog/mybooks/");

    let mine = json(send(router(&state), get("/catalog/mybooks/", Some(&reader_token))).await).await;
    assert_eq!(mine["total"], 1);
    assert_eq!(mine["items"][0]["borrower_id"], reader.id);
    assert_eq!(mine["items"][0]["due_back"], "2024-03-25");

    let new_date = today() + Duration::weeks(4);
    let response = send(
        router(&state),
        post_json(
            &format!("/catalog/book/{}/renew/", instance.id),
            Some(&librarian),
            json!({"due_back": new_date}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(location(&response), "/catalog/loanedbooks/");

    let stored = state
        .services
        .repository
        .instances
        .get_by_id(instance.id)
        .await
        .unwrap();
    assert_eq!(stored.status, LoanStatus::OnLoan);
    assert_eq!(stored.due_back, Some(new_date));
    assert_eq!(stored.borrower_id, Some(reader.id));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_renewal_too_far_ahead_is_a_field_error(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let (_, reader_token) = user(&state, "reader", AccountType::Member).await;
    let instance = available_copy(&state, &librarian).await;

    state
        .services
        .loans
        .update_checkout(
            instance.id,
            CheckoutAction::Checkout {
                borrower_id: None,
                due_back: None,
            },
            &claims(&state, &reader_token).await,
        )
        .await
        .unwrap();

    let response = send(
        router(&state),
        post_json(
            &format!("/catalog/book/{}/renew/", instance.id),
            Some(&librarian),
            json!({"due_back": today() + Duration::days(29)}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json(response).await["fields"]["due_back"][0],
        "Invalid date - renewal more than 4 weeks ahead"
    );
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_renewing_a_copy_not_on_loan_is_refused(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let instance = available_copy(&state, &librarian).await;

    let result = state
        .services
        .loans
        .renew(instance.id, Default::default())
        .await;
    assert!(matches!(result, Err(AppError::BusinessRule(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_loaned_books_search_and_member_view(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let (reader, reader_token) = user(&state, "reader", AccountType::Member).await;
    let (_, other_token) = user(&state, "other", AccountType::Member).await;
    let instance = available_copy(&state, &librarian).await;

    state
        .services
        .loans
        .update_checkout(
            instance.id,
            CheckoutAction::Checkout {
                borrower_id: Some(reader.id),
                due_back: None,
            },
            &claims(&state, &librarian).await,
        )
        .await
        .unwrap();

    let found = json(
        send(
            router(&state),
            get("/catalog/loanedbooks/?search=left%20HAND", Some(&librarian)),
        )
        .await,
    )
    .await;
    assert_eq!(found["total"], 1);

    let missing = json(
        send(
            router(&state),
            get("/catalog/loanedbooks/?search=dune", Some(&librarian)),
        )
        .await,
    )
    .await;
    assert_eq!(missing["total"], 0);

    let own = send(
        router(&state),
        get(&format!("/catalog/borrowers/{}/books/", reader.id), Some(&reader_token)),
    )
    .await;
    assert_eq!(own.status(), StatusCode::OK);

    let others = send(
        router(&state),
        get(&format!("/catalog/borrowers/{}/books/", reader.id), Some(&other_token)),
    )
    .await;
    assert_eq!(others.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_borrower_with_loans_cannot_be_deleted(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let (reader, reader_token) = user(&state, "reader", AccountType::Member).await;
    let instance = available_copy(&state, &librarian).await;

    state
        .services
        .loans
        .update_checkout(
            instance.id,
            CheckoutAction::Checkout {
                borrower_id: None,
                due_back: None,
            },
            &claims(&state, &reader_token).await,
        )
        .await
        .unwrap();

    let result = state.services.accounts.delete_user(reader.id).await;
    assert!(matches!(result, Err(AppError::StillReferenced(_))));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_stale_loan_write_is_refused(pool: PgPool) {
    let state = state(pool);
    let (_, librarian) = user(&state, "librarian", AccountType::Librarian).await;
    let (reader, _) = user(&state, "reader", AccountType::Member).await;
    let (other, _) = user(&state, "other", AccountType::Member).await;
    let instance = available_copy(&state, &librarian).await;

    let instances = &state.services.repository.instances;
    let snapshot = instances.get_by_id(instance.id).await.unwrap();
    let read = snapshot.state().unwrap();
    assert_eq!(read, LoanState::Available);

    let due_back = today() + Duration::weeks(3);
    let first = read
        .apply(Transition::Checkout {
            borrower_id: reader.id,
            due_back,
        })
        .unwrap();
    assert!(instances
        .compare_and_set(instance.id, &read, &first)
        .await
        .unwrap());

    let second = read
        .apply(Transition::Checkout {
            borrower_id: other.id,
            due_back,
        })
        .unwrap();
    assert!(!instances
        .compare_and_set(instance.id, &read, &second)
        .await
        .unwrap());

    let result = state
        .services
        .loans
        .transition(&snapshot, Transition::Reserve)
        .await;
    match result {
        Err(error @ AppError::Conflict(_)) => {
            assert_eq!(
                axum::response::IntoResponse::into_response(error).status(),
                StatusCode::CONFLICT
            );
        }
        other => panic!("expected a conflict, got {:?}", other),
    }

    let stored = instances.get_by_id(instance.id).await.unwrap();
    assert_eq!(stored.borrower_id, Some(reader.id));
    assert_eq!(stored.status, LoanStatus::OnLoan);
}
