//! Repository layer for database operations

pub mod authors;
pub mod books;
pub mod genres;
pub mod instances;
pub mod languages;
pub mod users;

use sqlx::{Pool, Postgres};

use crate::error::{AppError, FieldErrors};

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
    pub authors: authors::AuthorsRepository,
    pub books: books::BooksRepository,
    pub genres: genres::GenresRepository,
    pub languages: languages::LanguagesRepository,
    pub instances: instances::InstancesRepository,
    pub users: users::UsersRepository,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            authors: authors::AuthorsRepository::new(pool.clone()),
            books: books::BooksRepository::new(pool.clone()),
            genres: genres::GenresRepository::new(pool.clone()),
            languages: languages::LanguagesRepository::new(pool.clone()),
            instances: instances::InstancesRepository::new(pool.clone()),
            users: users::UsersRepository::new(pool.clone()),
            pool,
        }
    }
}

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const CHECK_VIOLATION: &str = "23514";

/// Human message for a unique constraint
fn unique_message(constraint: &str) -> &'static str {
    match constraint {
        "genre_name_case_insensitive_unique" | "genres_name_key" => {
            "Genre already exists (case insensitive match)"
        }
        "books_isbn_key" => "Book with this ISBN already exists.",
        "languages_name_key" => "Language with this Name already exists.",
        "users_username_key" => "A user with that username already exists.",
        "users_email_lower_unique" => "A user is already registered with this email address.",
        _ => "Record already exists",
    }
}

/// Form field an insert or update pointed at a missing row through
fn foreign_key_field(constraint: &str) -> &'static str {
    match constraint {
        "books_author_id_fkey" => "author_id",
        "books_language_id_fkey" => "language_id",
        "book_genres_genre_id_fkey" => "genre_ids",
        "book_instances_book_id_fkey" => "book_id",
        "book_instances_borrower_id_fkey" => "borrower_id",
        _ => "__all__",
    }
}

/// Why a delete was refused by a RESTRICT foreign key
fn restrict_message(constraint: &str) -> &'static str {
    match constraint {
        "books_author_id_fkey" => "Cannot delete author: books are still attributed to them",
        "book_instances_book_id_fkey" => "Cannot delete book: copies of it still exist",
        "book_instances_borrower_id_fkey" => "Cannot delete user: books are still on loan to them",
        _ => "Record is still referenced",
    }
}

fn violation(err: &sqlx::Error) -> Option<(String, String)> {
    let db_err = err.as_database_error()?;
    let code = db_err.code()?.to_string();
    let constraint = db_err.constraint().unwrap_or_default().to_string();
    Some((code, constraint))
}

/// Translate constraint violations raised by INSERT/UPDATE statements
pub(crate) fn map_write_error(err: sqlx::Error) -> AppError {
    match violation(&err) {
        Some((code, constraint)) if code == UNIQUE_VIOLATION => {
            AppError::Conflict(unique_message(&constraint).to_string())
        }
        Some((code, constraint)) if code == FOREIGN_KEY_VIOLATION => AppError::InvalidForm(
            FieldErrors::single(
                foreign_key_field(&constraint),
                "Select a valid choice. That choice is not one of the available choices.",
            ),
        ),
        Some((code, constraint)) if code == CHECK_VIOLATION => {
            AppError::BusinessRule(format!("Constraint {} violated", constraint))
        }
        _ => AppError::Database(err),
    }
}

/// Translate RESTRICT violations raised by DELETE statements
pub(crate) fn map_delete_error(err: sqlx::Error) -> AppError {
    match violation(&err) {
        Some((code, constraint)) if code == FOREIGN_KEY_VIOLATION => {
            tracing::warn!("Delete blocked by {}", constraint);
            AppError::StillReferenced(restrict_message(&constraint).to_string())
        }
        _ => AppError::Database(err),
    }
}

/// Escape LIKE wildcards so a search term matches literally
pub(crate) fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
