//! Users repository for database operations

use sqlx::{Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::{pagination::Pagination, AccountType, Permission, User, UserShort},
};

use super::{map_delete_error, map_write_error};

#[derive(Clone)]
pub struct UsersRepository {
    pool: Pool<Postgres>,
}

impl UsersRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Get user by ID, unless the account is deactivated
    pub async fn get_active(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 AND is_active")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    /// Get active user by username (case-insensitive)
    pub async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(username) = LOWER($1) AND is_active",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Get active user by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE LOWER(email) = LOWER($1) AND is_active",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    pub async fn create(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        account_type: AccountType,
    ) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password, account_type)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(account_type)
        .fetch_one(&self.pool)
        .await
        .map_err(map_write_error)
    }

    /// Permissions granted to an account type
    pub async fn permissions_of(&self, account_type: AccountType) -> AppResult<Vec<Permission>> {
        let codenames: Vec<String> = sqlx::query_scalar(
            "SELECT permission FROM account_type_permissions WHERE account_type = $1 ORDER BY permission",
        )
        .bind(account_type)
        .fetch_all(&self.pool)
        .await?;

        let permissions = codenames
            .iter()
            .filter_map(|codename| match codename.parse::<Permission>() {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!("Ignoring stored permission: {}", e);
                    None
                }
            })
            .collect();

        Ok(permissions)
    }

    pub async fn set_email_verified(&self, id: i32) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            "UPDATE users SET email_verified = TRUE WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<User> {
        sqlx::query_as::<_, User>("UPDATE users SET password = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(password_hash)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> AppResult<User> {
        sqlx::query_as::<_, User>("UPDATE users SET is_active = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    pub async fn touch_last_login(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// One page of users with their current loan counts
    pub async fn list(&self, pagination: &Pagination) -> AppResult<Vec<UserShort>> {
        let users = sqlx::query_as::<_, UserShort>(
            r#"
            SELECT u.id, u.username, u.email, u.account_type, u.email_verified, u.is_active,
                   (SELECT COUNT(*) FROM book_instances i
                    WHERE i.borrower_id = u.id AND i.status = 'o') AS nb_loans
            FROM users u
            ORDER BY u.username, u.id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(pagination.limit())
        .bind(pagination.offset())
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    pub async fn set_account_type(&self, id: i32, account_type: AccountType) -> AppResult<User> {
        sqlx::query_as::<_, User>("UPDATE users SET account_type = $2 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(account_type)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    /// Delete a user; refused while books are on loan to them
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_delete_error)?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User with id {} not found", id)));
        }

        Ok(())
    }
}
