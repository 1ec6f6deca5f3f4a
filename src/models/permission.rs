//! Catalog permissions and the action → requirement table

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Permission codenames granted to account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Permission {
    #[serde(rename = "catalog.add_book")]
    AddBook,
    #[serde(rename = "catalog.change_book")]
    ChangeBook,
    #[serde(rename = "catalog.delete_book")]
    DeleteBook,
    #[serde(rename = "catalog.add_author")]
    AddAuthor,
    #[serde(rename = "catalog.change_author")]
    ChangeAuthor,
    #[serde(rename = "catalog.delete_author")]
    DeleteAuthor,
    #[serde(rename = "catalog.add_genre")]
    AddGenre,
    #[serde(rename = "catalog.add_language")]
    AddLanguage,
    #[serde(rename = "catalog.add_bookinstance")]
    AddBookInstance,
    #[serde(rename = "catalog.change_bookinstance")]
    ChangeBookInstance,
    #[serde(rename = "catalog.delete_bookinstance")]
    DeleteBookInstance,
    #[serde(rename = "catalog.can_mark_returned")]
    CanMarkReturned,
}

impl Permission {
    pub const ALL: [Permission; 12] = [
        Permission::AddBook,
        Permission::ChangeBook,
        Permission::DeleteBook,
        Permission::AddAuthor,
        Permission::ChangeAuthor,
        Permission::DeleteAuthor,
        Permission::AddGenre,
        Permission::AddLanguage,
        Permission::AddBookInstance,
        Permission::ChangeBookInstance,
        Permission::DeleteBookInstance,
        Permission::CanMarkReturned,
    ];

    pub fn codename(&self) -> &'static str {
        match self {
            Permission::AddBook => "catalog.add_book",
            Permission::ChangeBook => "catalog.change_book",
            Permission::DeleteBook => "catalog.delete_book",
            Permission::AddAuthor => "catalog.add_author",
            Permission::ChangeAuthor => "catalog.change_author",
            Permission::DeleteAuthor => "catalog.delete_author",
            Permission::AddGenre => "catalog.add_genre",
            Permission::AddLanguage => "catalog.add_language",
            Permission::AddBookInstance => "catalog.add_bookinstance",
            Permission::ChangeBookInstance => "catalog.change_bookinstance",
            Permission::DeleteBookInstance => "catalog.delete_bookinstance",
            Permission::CanMarkReturned => "catalog.can_mark_returned",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.codename())
    }
}

impl std::str::FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.codename() == s)
            .ok_or_else(|| format!("Unknown permission: {}", s))
    }
}

/// Something a user asks to do that is subject to the access policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateBook,
    UpdateBook,
    DeleteBook,
    CreateAuthor,
    UpdateAuthor,
    DeleteAuthor,
    CreateGenre,
    CreateLanguage,
    CreateInstance,
    DeleteInstance,
    RenewInstance,
    MarkReturned,
    /// Reserve, make available, or check a copy out on somebody else's behalf
    ManageInstance,
    ViewAllLoans,
    ViewLoansOf { borrower_id: i32 },
}

/// What a user must hold for an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    /// Holding any one of these suffices
    pub any_of: &'static [Permission],
    pub verified_email: bool,
}

impl Action {
    pub fn requirement(&self) -> Requirement {
        use Permission::*;

        let (any_of, verified_email): (&'static [Permission], bool) = match self {
            Action::CreateBook => (&[AddBook], true),
            Action::UpdateBook => (&[ChangeBook], true),
            Action::DeleteBook => (&[DeleteBook], true),
            Action::CreateAuthor => (&[AddAuthor], true),
            Action::UpdateAuthor => (&[ChangeAuthor], true),
            Action::DeleteAuthor => (&[DeleteAuthor], true),
            Action::CreateGenre => (&[AddGenre], false),
            Action::CreateLanguage => (&[AddLanguage], false),
            Action::CreateInstance => (&[AddBookInstance], false),
            Action::DeleteInstance => (&[DeleteBookInstance], true),
            Action::RenewInstance | Action::MarkReturned => (&[CanMarkReturned], false),
            Action::ManageInstance => (&[ChangeBookInstance], false),
            Action::ViewAllLoans | Action::ViewLoansOf { .. } => {
                (&[ChangeBookInstance, CanMarkReturned], false)
            }
        };

        Requirement {
            any_of,
            verified_email,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Action::CreateBook => "create books",
            Action::UpdateBook => "update books",
            Action::DeleteBook => "delete books",
            Action::CreateAuthor => "create authors",
            Action::UpdateAuthor => "update authors",
            Action::DeleteAuthor => "delete authors",
            Action::CreateGenre => "create genres",
            Action::CreateLanguage => "create languages",
            Action::CreateInstance => "create book instances",
            Action::DeleteInstance => "delete book instances",
            Action::RenewInstance => "renew loans",
            Action::MarkReturned => "mark books as returned",
            Action::ManageInstance => "manage book instances",
            Action::ViewAllLoans => "view all loans",
            Action::ViewLoansOf { .. } => "view another user's loans",
        }
    }
}
