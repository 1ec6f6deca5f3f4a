//! Library catalog server
//!
//! Books, authors, genres and languages, the physical copies of each book
//! and their loans, behind a JSON API with role-gated actions.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// How requests are authenticated
    pub auth: Arc<dyn api::AuthStrategy>,
}
