//! Book model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, FieldErrors};

use super::{author::Author, book_instance::InstanceSummary, genre::Genre, language::Language};

/// Largest accepted cover upload, in bytes
pub const MAX_COVER_SIZE: usize = 1024 * 1024;

/// Directory cover images are stored under
pub const COVER_UPLOAD_TO: &str = "cover-images/";

pub const ISBN_LENGTH: usize = 13;

/// Full book model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub summary: String,
    pub isbn: String,
    pub author_id: Option<i32>,
    pub language_id: Option<i32>,
    /// Stored name of the cover image, relative to the media store
    pub cover_image: Option<String>,
    pub cover_image_width: Option<i32>,
    pub cover_image_height: Option<i32>,
}

/// Short book representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    pub author_id: Option<i32>,
    /// "Last, First" of the author, if any
    pub author_name: Option<String>,
}

/// Public view of a stored cover image
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CoverImage {
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

/// Book with its relations resolved
#[derive(Debug, Serialize, ToSchema)]
pub struct BookDetail {
    pub id: i32,
    pub title: String,
    pub summary: String,
    pub isbn: String,
    pub author: Option<Author>,
    pub language: Option<Language>,
    pub genres: Vec<Genre>,
    pub cover_image: Option<CoverImage>,
    pub instances: Vec<InstanceSummary>,
    /// Due-back date a checkout from this page would get
    pub checkout_due_date: NaiveDate,
}

/// Payload shown before a book is deleted
#[derive(Debug, Serialize, ToSchema)]
pub struct BookDeleteInfo {
    pub id: i32,
    pub title: String,
    /// Copies still attached to the book; deletion is refused while non-zero
    pub instances: Vec<InstanceSummary>,
}

/// Current values of a book, as the update form starts from
#[derive(Debug, Serialize, ToSchema)]
pub struct BookEdit {
    #[serde(flatten)]
    pub book: Book,
    pub genre_ids: Vec<i32>,
}

/// Create or update book form
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BookForm {
    #[validate(length(min = 1, max = 200, message = "Ensure this value has at most 200 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Ensure this value has at most 1000 characters"))]
    pub summary: String,
    pub isbn: String,
    pub author_id: Option<i32>,
    pub language_id: Option<i32>,
    #[serde(default)]
    pub genre_ids: Vec<i32>,
}

impl BookForm {
    pub fn clean(&self) -> Result<(), AppError> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        if let Err(message) = check_isbn(&self.isbn) {
            errors.add("isbn", message);
        }

        errors.into_result()
    }
}

/// An ISBN is exactly 13 ASCII digits
pub fn check_isbn(isbn: &str) -> Result<(), String> {
    if isbn.len() != ISBN_LENGTH || !isbn.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("ISBN must be exactly {} digits", ISBN_LENGTH));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(isbn: &str) -> BookForm {
        BookForm {
            title: "A Wizard of Earthsea".to_string(),
            summary: "A young mage.".to_string(),
            isbn: isbn.to_string(),
            author_id: Some(1),
            language_id: None,
            genre_ids: vec![],
        }
    }

    #[test]
    fn test_isbn_must_be_thirteen_digits() {
        assert!(check_isbn("9780547773742").is_ok());
        assert!(check_isbn("978054777374").is_err());
        assert!(check_isbn("97805477737420").is_err());
        assert!(check_isbn("978054777374X").is_err());
        assert!(check_isbn("").is_err());
    }

    #[test]
    fn test_form_reports_isbn_field() {
        assert!(form("9780547773742").clean().is_ok());

        match form("0-547-77374").clean() {
            Err(AppError::InvalidForm(fields)) => {
                assert_eq!(fields.0["isbn"], vec!["ISBN must be exactly 13 digits"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_summary_length_bound() {
        let mut f = form("9780547773742");
        f.summary = "s".repeat(1001);
        assert!(f.clean().is_err());
    }
}
