//! Loan lifecycle of a book instance
//!
//! Status, borrower and due-back date only ever change together through
//! [`LoanState::apply`], so a stored row can never be "available" while still
//! naming a borrower.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use thiserror::Error;
use utoipa::ToSchema;

/// Stored status code of a book instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Maintenance,
    OnLoan,
    Available,
    Reserved,
}

impl LoanStatus {
    /// Single-letter code used in the database
    pub fn code(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "m",
            LoanStatus::OnLoan => "o",
            LoanStatus::Available => "a",
            LoanStatus::Reserved => "r",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LoanStatus::Maintenance => "Maintenance",
            LoanStatus::OnLoan => "On loan",
            LoanStatus::Available => "Available",
            LoanStatus::Reserved => "Reserved",
        }
    }
}

impl Default for LoanStatus {
    fn default() -> Self {
        LoanStatus::Maintenance
    }
}

impl std::fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for LoanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "m" => Ok(LoanStatus::Maintenance),
            "o" => Ok(LoanStatus::OnLoan),
            "a" => Ok(LoanStatus::Available),
            "r" => Ok(LoanStatus::Reserved),
            other => Err(format!("Invalid loan status code: {}", other)),
        }
    }
}

// SQLx conversion for LoanStatus
impl sqlx::Type<Postgres> for LoanStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for LoanStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for LoanStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.code(), buf)
    }
}

/// Availability of one physical copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoanState {
    #[default]
    Maintenance,
    OnLoan {
        borrower_id: i32,
        due_back: NaiveDate,
    },
    Available,
    Reserved,
}

/// A requested move between loan states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Checkout { borrower_id: i32, due_back: NaiveDate },
    Renew { due_back: NaiveDate },
    Return,
    Reserve,
    MakeAvailable,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Transition::Checkout { .. } => "checkout",
            Transition::Renew { .. } => "renew",
            Transition::Return => "return",
            Transition::Reserve => "reserve",
            Transition::MakeAvailable => "make available",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot {transition} a book instance that is {from}")]
    NotAllowed {
        from: LoanStatus,
        transition: &'static str,
    },
    #[error("Inconsistent stored loan state: {0}")]
    Inconsistent(String),
}

impl LoanState {
    pub fn status(&self) -> LoanStatus {
        match self {
            LoanState::Maintenance => LoanStatus::Maintenance,
            LoanState::OnLoan { .. } => LoanStatus::OnLoan,
            LoanState::Available => LoanStatus::Available,
            LoanState::Reserved => LoanStatus::Reserved,
        }
    }

    pub fn borrower_id(&self) -> Option<i32> {
        match self {
            LoanState::OnLoan { borrower_id, .. } => Some(*borrower_id),
            _ => None,
        }
    }

    pub fn due_back(&self) -> Option<NaiveDate> {
        match self {
            LoanState::OnLoan { due_back, .. } => Some(*due_back),
            _ => None,
        }
    }

    /// Apply a transition, refusing any move outside the lifecycle
    pub fn apply(self, transition: Transition) -> Result<LoanState, TransitionError> {
        use LoanState::*;

        let next = match (self, transition) {
            (Maintenance | Available | Reserved, Transition::Checkout { borrower_id, due_back }) => {
                OnLoan {
                    borrower_id,
                    due_back,
                }
            }
            (Maintenance, Transition::MakeAvailable) => Available,
            (OnLoan { .. }, Transition::Return) => Available,
            (OnLoan { borrower_id, .. }, Transition::Renew { due_back }) => OnLoan {
                borrower_id,
                due_back,
            },
            (Available, Transition::Reserve) => Reserved,
            (from, transition) => {
                return Err(TransitionError::NotAllowed {
                    from: from.status(),
                    transition: transition.name(),
                })
            }
        };

        Ok(next)
    }

    /// Rebuild the state from its stored columns
    pub fn from_columns(
        status: LoanStatus,
        borrower_id: Option<i32>,
        due_back: Option<NaiveDate>,
    ) -> Result<Self, TransitionError> {
        match (status, borrower_id, due_back) {
            (LoanStatus::OnLoan, Some(borrower_id), Some(due_back)) => Ok(LoanState::OnLoan {
                borrower_id,
                due_back,
            }),
            (LoanStatus::OnLoan, _, _) => Err(TransitionError::Inconsistent(
                "on loan without borrower or due-back date".to_string(),
            )),
            (LoanStatus::Maintenance, None, None) => Ok(LoanState::Maintenance),
            (LoanStatus::Available, None, None) => Ok(LoanState::Available),
            (LoanStatus::Reserved, None, None) => Ok(LoanState::Reserved),
            (status, _, _) => Err(TransitionError::Inconsistent(format!(
                "{} with a borrower or due-back date",
                status.label()
            ))),
        }
    }
}
