//! Book instances repository: copies, loan lists and state writes

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan_state::{LoanState, LoanStatus},
        pagination::Pagination,
        BookInstance, InstanceSummary,
    },
};

use super::{like_pattern, map_delete_error, map_write_error};

const SUMMARY_SELECT: &str = r#"
    SELECT i.id, i.book_id, b.title AS book_title, i.imprint, i.status,
           i.borrower_id, u.username AS borrower_username, i.due_back
    FROM book_instances i
    LEFT JOIN books b ON b.id = i.book_id
    LEFT JOIN users u ON u.id = i.borrower_id
"#;

/// Restriction applied to the on-loan lists
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub borrower_id: Option<i32>,
    /// Case-insensitive substring of the book title
    pub title: Option<String>,
}

impl LoanFilter {
    fn title_pattern(&self) -> Option<String> {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(like_pattern)
    }
}

#[derive(Clone)]
pub struct InstancesRepository {
    pool: Pool<Postgres>,
}

impl InstancesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM book_instances")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn count_with_status(&self, status: LoanStatus) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM book_instances WHERE status = $1")
                .bind(status)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Get book instance by ID
    pub async fn get_by_id(&self, id: Uuid) -> AppResult<BookInstance> {
        sqlx::query_as::<_, BookInstance>("SELECT * FROM book_instances WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book instance {} not found", id)))
    }

    pub async fn get_summary(&self, id: Uuid) -> AppResult<InstanceSummary> {
        sqlx::query_as::<_, InstanceSummary>(&format!("{SUMMARY_SELECT} WHERE i.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book instance {} not found", id)))
    }

    /// Copies of a book, soonest due first
    pub async fn list_for_book(&self, book_id: i32) -> AppResult<Vec<InstanceSummary>> {
        let instances = sqlx::query_as::<_, InstanceSummary>(&format!(
            "{SUMMARY_SELECT} WHERE i.book_id = $1 ORDER BY i.due_back NULLS LAST, i.id"
        ))
        .bind(book_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(instances)
    }

    /// New copy, starting in maintenance
    pub async fn create(&self, book_id: i32, imprint: &str) -> AppResult<BookInstance> {
        sqlx::query_as::<_, BookInstance>(
            r#"
            INSERT INTO book_instances (id, book_id, imprint, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(book_id)
        .bind(imprint)
        .bind(LoanStatus::default())
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM book_instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_delete_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book instance {} not found", id)));
        }

        Ok(())
    }

    /// Write `next` only if the row still holds `previous`.
    ///
    /// Returns false when another request changed the copy in between.
    pub async fn compare_and_set(
        &self,
        id: Uuid,
        previous: &LoanState,
        next: &LoanState,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE book_instances
            SET status = $5, borrower_id = $6, due_back = $7
            WHERE id = $1
              AND status = $2
              AND borrower_id IS NOT DISTINCT FROM $3
              AND due_back IS NOT DISTINCT FROM $4
            "#,
        )
        .bind(id)
        .bind(previous.status())
        .bind(previous.borrower_id())
        .bind(previous.due_back())
        .bind(next.status())
        .bind(next.borrower_id())
        .bind(next.due_back())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn count_on_loan(&self, filter: &LoanFilter) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM book_instances i
            LEFT JOIN books b ON b.id = i.book_id
            WHERE i.status = 'o'
              AND ($1::INT IS NULL OR i.borrower_id = $1)
              AND ($2::TEXT IS NULL OR b.title ILIKE $2)
            "#,
        )
        .bind(filter.borrower_id)
        .bind(filter.title_pattern())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// On-loan copies ordered by due-back date
    pub async fn list_on_loan(
        &self,
        filter: &LoanFilter,
        pagination: &Pagination,
    ) -> AppResult<Vec<InstanceSummary>> {
        let instances = sqlx::query_as::<_, InstanceSummary>(&format!(
            r#"
            {SUMMARY_SELECT}
            WHERE i.status = 'o'
              AND ($1::INT IS NULL OR i.borrower_id = $1)
              AND ($2::TEXT IS NULL OR b.title ILIKE $2)
            ORDER BY i.due_back, i.id
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.borrower_id)
        .bind(filter.title_pattern())
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(instances)
    }
}
