//! Loan management service: copies, checkout, return and renewal

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        book_instance::{CheckoutAction, CreateInstance, RenewForm, RenewProposal},
        loan_state::{LoanState, LoanStatus, Transition},
        pagination::{Page, PageNumber, Pagination, LOANS_PER_PAGE},
        renewal::{default_renewal_date, validate_renewal, Clock},
        Action, BookInstance, InstanceSummary, UserClaims,
    },
    repository::{instances::LoanFilter, Repository},
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl LoansService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Add a copy to a book; it starts in maintenance
    pub async fn create_instance(&self, book_id: i32, form: CreateInstance) -> AppResult<BookInstance> {
        form.validate()
            .map_err(|e| AppError::InvalidForm(e.into()))?;

        self.repository.books.get_by_id(book_id).await?;
        let instance = self
            .repository
            .instances
            .create(book_id, form.imprint.trim())
            .await?;

        tracing::info!("Book instance {} created for book {}", instance.id, book_id);
        Ok(instance)
    }

    pub async fn get_instance(&self, id: Uuid) -> AppResult<InstanceSummary> {
        let today = self.clock.today();
        Ok(self.repository.instances.get_summary(id).await?.with_today(today))
    }

    /// Delete a copy that is not on loan; returns the book it belonged to
    pub async fn delete_instance(&self, id: Uuid) -> AppResult<Option<i32>> {
        let instance = self.repository.instances.get_by_id(id).await?;
        if instance.status == LoanStatus::OnLoan {
            return Err(AppError::StillReferenced(
                "Cannot delete book instance: it is on loan".to_string(),
            ));
        }

        self.repository.instances.delete(id).await?;
        tracing::info!("Book instance {} deleted", id);
        Ok(instance.book_id)
    }

    /// Copies on loan to one user, soonest due first
    pub async fn loans_of(&self, borrower_id: i32, page: Option<PageNumber>) -> AppResult<Page<InstanceSummary>> {
        self.list_on_loan(
            LoanFilter {
                borrower_id: Some(borrower_id),
                title: None,
            },
            page,
        )
        .await
    }

    /// Every copy on loan, optionally filtered by title
    pub async fn all_loans(&self, search: Option<String>, page: Option<PageNumber>) -> AppResult<Page<InstanceSummary>> {
        self.list_on_loan(
            LoanFilter {
                borrower_id: None,
                title: search,
            },
            page,
        )
        .await
    }

    async fn list_on_loan(&self, filter: LoanFilter, page: Option<PageNumber>) -> AppResult<Page<InstanceSummary>> {
        let total = self.repository.instances.count_on_loan(&filter).await?;
        let pagination = Pagination::resolve(page, LOANS_PER_PAGE, total)?;
        let today = self.clock.today();

        let instances = self
            .repository
            .instances
            .list_on_loan(&filter, &pagination)
            .await?
            .into_iter()
            .map(|i| i.with_today(today))
            .collect();

        Ok(pagination.wrap(instances))
    }

    /// Renewal form contents: the copy and the default proposal
    pub async fn renew_proposal(&self, id: Uuid) -> AppResult<RenewProposal> {
        let instance = self.get_instance(id).await?;
        Ok(RenewProposal {
            instance,
            proposed_due_back: default_renewal_date(self.clock.today()),
        })
    }

    /// Move the due-back date of a loaned copy
    pub async fn renew(&self, id: Uuid, form: RenewForm) -> AppResult<LoanState> {
        let today = self.clock.today();
        let proposed = form.due_back.unwrap_or_else(|| default_renewal_date(today));
        let due_back = validate_renewal(proposed, today).map_err(|e| e.on_field("due_back"))?;

        let instance = self.repository.instances.get_by_id(id).await?;
        self.transition(&instance, Transition::Renew { due_back }).await
    }

    /// Checkout, return, reserve or make a copy available
    pub async fn update_checkout(
        &self,
        id: Uuid,
        action: CheckoutAction,
        claims: &UserClaims,
    ) -> AppResult<LoanState> {
        let instance = self.repository.instances.get_by_id(id).await?;

        let transition = match action {
            CheckoutAction::Checkout {
                borrower_id,
                due_back,
            } => {
                let borrower_id = borrower_id.unwrap_or(claims.user_id);
                if borrower_id != claims.user_id {
                    claims.authorize(Action::ManageInstance)?;
                    self.repository.users.get_by_id(borrower_id).await?;
                }

                let today = self.clock.today();
                let proposed = due_back.unwrap_or_else(|| default_renewal_date(today));
                let due_back =
                    validate_renewal(proposed, today).map_err(|e| e.on_field("due_back"))?;

                Transition::Checkout {
                    borrower_id,
                    due_back,
                }
            }
            CheckoutAction::Return => {
                if instance.borrower_id != Some(claims.user_id) {
                    claims.authorize(Action::MarkReturned)?;
                }
                Transition::Return
            }
            CheckoutAction::Reserve => {
                claims.authorize(Action::ManageInstance)?;
                Transition::Reserve
            }
            CheckoutAction::MakeAvailable => {
                claims.authorize(Action::ManageInstance)?;
                Transition::MakeAvailable
            }
        };

        self.transition(&instance, transition).await
    }

    /// Apply one transition to `instance` as it was read, and persist it
    /// only if nobody changed the copy meanwhile
    pub async fn transition(&self, instance: &BookInstance, transition: Transition) -> AppResult<LoanState> {
        let current = instance
            .state()
            .map_err(|e| AppError::Internal(format!("Book instance {}: {}", instance.id, e)))?;

        let next = current.apply(transition).map_err(|e| {
            tracing::warn!("Book instance {}: {}", instance.id, e);
            AppError::BusinessRule(e.to_string())
        })?;

        let written = self
            .repository
            .instances
            .compare_and_set(instance.id, &current, &next)
            .await?;

        if !written {
            tracing::warn!(
                "Book instance {} changed during {}; refusing stale write",
                instance.id,
                transition.name()
            );
            return Err(AppError::Conflict(
                "This book instance was modified by someone else; reload and try again".to_string(),
            ));
        }

        tracing::info!(
            "Book instance {}: {} ({} -> {})",
            instance.id,
            transition.name(),
            current.status(),
            next.status()
        );

        Ok(next)
    }
}
