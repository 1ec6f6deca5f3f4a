//! Catalog operations against PostgreSQL

use axum::http::StatusCode;
use library_catalog::{
    models::{
        author::AuthorForm, book::BookForm, genre::GenreForm, user::AccountType, PageNumber,
    },
    AppError,
};
use serde_json::json;
use sqlx::PgPool;

use crate::common::*;

fn book_form(title: &str, isbn: &str, author_id: Option<i32>) -> BookForm {
    BookForm {
        title: title.to_string(),
        summary: format!("Summary of {}", title),
        isbn: isbn.to_string(),
        author_id,
        language_id: None,
        genre_ids: Vec::new(),
    }
}

fn author_form(first: &str, last: &str) -> AuthorForm {
    AuthorForm {
        first_name: first.to_string(),
        last_name: last.to_string(),
        date_of_birth: None,
        date_of_death: None,
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_duplicate_isbn_is_rejected(pool: PgPool) {
    let state = state(pool);
    let catalog = &state.services.catalog;

    catalog
        .create_book(book_form("Dune", "9780441013593", None))
        .await
        .unwrap();

    match catalog
        .create_book(book_form("Dune Again", "9780441013593", None))
        .await
    {
        Err(AppError::Conflict(message)) => {
            assert_eq!(message, "Book with this ISBN already exists.")
        }
        other => panic!("expected a conflict, got {:?}", other.map(|b| b.id)),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_genre_names_are_case_insensitive(pool: PgPool) {
    let state = state(pool);
    let catalog = &state.services.catalog;

    catalog
        .create_genre(GenreForm {
            name: "Fantasy".to_string(),
        })
        .await
        .unwrap();

    let second = catalog
        .create_genre(GenreForm {
            name: "fantasy".to_string(),
        })
        .await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
    assert_eq!(catalog.list_genres().await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_eleven_authors_page_by_five(pool: PgPool) {
    let state = state(pool);
    let catalog = &state.services.catalog;

    for i in 0..11 {
        catalog
            .create_author(author_form("Jane", &format!("Author{:02}", i)))
            .await
            .unwrap();
    }

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    for page in 1..=3 {
        let page = catalog.list_authors(Some(PageNumber::Number(page))).await.unwrap();
        assert_eq!(page.num_pages, 3);
        sizes.push(page.items.len());
        seen.extend(page.items.into_iter().map(|a| a.id));
    }

    assert_eq!(sizes, vec![5, 5, 1]);
    let mut unique = seen.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 11);

    assert!(matches!(
        catalog.list_authors(Some(PageNumber::Number(4))).await,
        Err(AppError::NotFound(_))
    ));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_author_with_books_cannot_be_deleted(pool: PgPool) {
    let state = state(pool);
    let catalog = &state.services.catalog;

    let author = catalog
        .create_author(author_form("Frank", "Herbert"))
        .await
        .unwrap();
    catalog
        .create_book(book_form("Dune", "9780441013593", Some(author.id)))
        .await
        .unwrap();

    let (_, token) = user(&state, "librarian", AccountType::Librarian).await;
    let response = send(
        router(&state),
        post_json(
            &format!("/catalog/author/{}/delete/", author.id),
            Some(&token),
            json!({}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json(response).await["error"], "StillReferenced");
    assert!(catalog.get_author(author.id).await.is_ok());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_librarian_creates_book_through_router(pool: PgPool) {
    let state = state(pool);
    let (_, token) = user(&state, "librarian", AccountType::Librarian).await;

    let response = send(
        router(&state),
        post_json(
            "/catalog/book/create/",
            Some(&token),
            json!({"title": "Dune", "summary": "Spice", "isbn": "9780441013593"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let id = json(response).await["id"].as_i64().unwrap();

    let response = send(router(&state), get(&format!("/catalog/book/{}/", id), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["title"], "Dune");
    assert_eq!(body["checkout_due_date"], "2024-03-25");

    let counts = json(send(router(&state), get("/catalog/", None)).await).await;
    assert_eq!(counts["num_books"], 1);
    assert_eq!(counts["nav_menu_open"], false);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_member_cannot_create_book(pool: PgPool) {
    let state = state(pool);
    let (_, token) = user(&state, "reader", AccountType::Member).await;

    let response = send(
        router(&state),
        post_json(
            "/catalog/book/create/",
            Some(&token),
            json!({"title": "Dune", "summary": "Spice", "isbn": "9780441013593"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn test_page_that_is_not_a_number_is_not_found(pool: PgPool) {
    let state = state(pool);
    state
        .services
        .catalog
        .create_author(author_form("Ursula", "Le Guin"))
        .await
        .unwrap();

    let response = send(router(&state), get("/catalog/authors/?page=abc", None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["error"], "NotFound");

    let last = json(send(router(&state), get("/catalog/authors/?page=last", None)).await).await;
    assert_eq!(last["page"], 1);
    assert_eq!(last["items"][0]["last_name"], "Le Guin");
}
