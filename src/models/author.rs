//! Author model and related types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, FieldErrors};

use super::book::BookShort;

/// Full author model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Author {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

impl Author {
    /// "Last, First"
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

/// Author with the books attributed to them
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorDetail {
    #[serde(flatten)]
    pub author: Author,
    pub display_name: String,
    pub books: Vec<BookShort>,
}

/// Payload shown before an author is deleted
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthorDeleteInfo {
    #[serde(flatten)]
    pub author: Author,
    /// Books still attributed to the author; deletion is refused while non-zero
    pub nb_books: i64,
}

/// Create or update author form
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct AuthorForm {
    #[validate(length(min = 1, max = 100, message = "Ensure this value has at most 100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Ensure this value has at most 100 characters"))]
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_death: Option<NaiveDate>,
}

impl AuthorForm {
    pub fn clean(&self) -> Result<(), AppError> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        if let (Some(born), Some(died)) = (self.date_of_birth, self.date_of_death) {
            if died < born {
                errors.add("date_of_death", "Date of death cannot precede date of birth");
            }
        }

        errors.into_result()
    }
}
