//! Book instance (physical copy) model and loan request types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::loan_state::{LoanState, LoanStatus, TransitionError};

/// Book instance row as stored
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookInstance {
    pub id: Uuid,
    pub book_id: Option<i32>,
    pub imprint: String,
    pub status: LoanStatus,
    pub borrower_id: Option<i32>,
    pub due_back: Option<NaiveDate>,
}

impl BookInstance {
    pub fn state(&self) -> Result<LoanState, TransitionError> {
        LoanState::from_columns(self.status, self.borrower_id, self.due_back)
    }
}

/// Instance joined with its book title and borrower name
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct InstanceSummary {
    pub id: Uuid,
    pub book_id: Option<i32>,
    pub book_title: Option<String>,
    pub imprint: String,
    pub status: LoanStatus,
    pub borrower_id: Option<i32>,
    pub borrower_username: Option<String>,
    pub due_back: Option<NaiveDate>,
    #[sqlx(skip)]
    pub is_overdue: bool,
}

impl InstanceSummary {
    /// Overdue iff a due-back date exists and is strictly before today
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.is_overdue = self.due_back.is_some_and(|due| due < today);
        self
    }
}

/// New copy of a book
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateInstance {
    #[validate(length(min = 1, max = 200, message = "Ensure this value has at most 200 characters"))]
    pub imprint: String,
}

/// Renewal form; the default proposal is used when no date is posted
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RenewForm {
    pub due_back: Option<NaiveDate>,
}

/// What the renewal form shows before submission
#[derive(Debug, Serialize, ToSchema)]
pub struct RenewProposal {
    pub instance: InstanceSummary,
    pub proposed_due_back: NaiveDate,
}

/// Requested change on `/catalog/update-checkout/{id}/`
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CheckoutAction {
    /// Borrow the copy; `borrower_id` defaults to the caller
    Checkout {
        #[serde(default)]
        borrower_id: Option<i32>,
        #[serde(default)]
        due_back: Option<NaiveDate>,
    },
    Return,
    Reserve,
    MakeAvailable,
}

/// Filters for the all-loans list
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanSearch {
    /// Case-insensitive substring of the book title
    pub search: Option<String>,
    /// 1-based page number, or `last` (default: 1)
    pub page: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(due_back: Option<NaiveDate>) -> InstanceSummary {
        InstanceSummary {
            id: Uuid::new_v4(),
            book_id: Some(1),
            book_title: Some("Dune".to_string()),
            imprint: "Chilton, 1965".to_string(),
            status: LoanStatus::OnLoan,
            borrower_id: Some(2),
            borrower_username: Some("reader".to_string()),
            due_back,
            is_overdue: false,
        }
    }

    #[test]
    fn test_overdue_only_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let yesterday = today.pred_opt().unwrap();

        assert!(summary(Some(yesterday)).with_today(today).is_overdue);
        assert!(!summary(Some(today)).with_today(today).is_overdue);
        assert!(!summary(None).with_today(today).is_overdue);
    }

    #[test]
    fn test_checkout_action_parsing() {
        let action: CheckoutAction = serde_json::from_str(r#"{"action":"checkout"}"#).unwrap();
        assert!(matches!(
            action,
            CheckoutAction::Checkout {
                borrower_id: None,
                due_back: None
            }
        ));

        let action: CheckoutAction =
            serde_json::from_str(r#"{"action":"make_available"}"#).unwrap();
        assert!(matches!(action, CheckoutAction::MakeAvailable));

        assert!(serde_json::from_str::<CheckoutAction>(r#"{"action":"steal"}"#).is_err());
    }
}
