//! Business logic services

pub mod accounts;
pub mod catalog;
pub mod email;
pub mod loans;
pub mod storage;

use std::sync::Arc;

use crate::{
    config::{AuthConfig, EmailConfig},
    models::renewal::Clock,
    repository::Repository,
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub accounts: accounts::AccountsService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub email: email::EmailService,
    pub store: Arc<dyn storage::Store>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        auth_config: AuthConfig,
        email_config: EmailConfig,
        store: Arc<dyn storage::Store>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let email = email::EmailService::new(email_config);
        Self {
            accounts: accounts::AccountsService::new(repository.clone(), auth_config, email.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), store.clone(), clock.clone()),
            loans: loans::LoansService::new(repository.clone(), clock.clone()),
            email,
            store,
            clock,
            repository,
        }
    }
}
