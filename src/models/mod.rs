//! Data models for the library catalog

pub mod author;
pub mod book;
pub mod book_instance;
pub mod genre;
pub mod language;
pub mod loan_state;
pub mod pagination;
pub mod permission;
pub mod renewal;
pub mod user;

// Re-export commonly used types
pub use author::Author;
pub use book::{Book, BookShort};
pub use book_instance::{BookInstance, InstanceSummary};
pub use genre::Genre;
pub use language::Language;
pub use loan_state::{LoanState, LoanStatus, Transition};
pub use pagination::{Page, PageNumber, PageQuery, Pagination};
pub use permission::{Action, Permission};
pub use user::{AccountType, SessionToken, User, UserClaims, UserShort};
