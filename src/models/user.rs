//! User model, account types and session claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::ToSchema;
use validator::Validate;

use crate::error::{AppError, FieldErrors};

use super::permission::{Action, Permission};

/// Account type slug; each type carries a permission set stored in the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Member,
    Librarian,
    Admin,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Member => "member",
            AccountType::Librarian => "librarian",
            AccountType::Admin => "admin",
        }
    }

    /// Staff may use the admin site
    pub fn is_staff(&self) -> bool {
        matches!(self, AccountType::Admin)
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "member" => Ok(AccountType::Member),
            "librarian" => Ok(AccountType::Librarian),
            "admin" => Ok(AccountType::Admin),
            _ => Err(format!("Invalid account type slug: {}", s)),
        }
    }
}

// SQLx conversion for AccountType
impl sqlx::Type<Postgres> for AccountType {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for AccountType {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for AccountType {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing)]
    pub password: String,
    pub email_verified: bool,
    pub account_type: AccountType,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

/// Short user representation for lists
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserShort {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub account_type: AccountType,
    pub email_verified: bool,
    pub is_active: bool,
    /// Copies currently on loan to this user
    pub nb_loans: i64,
}

/// Signup form
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 150, message = "Username must be 1 to 150 characters"))]
    pub username: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub password: String,
    /// Same password again, for verification
    pub password2: String,
}

impl SignupRequest {
    /// Form-wide checks that span several fields
    pub fn clean(&self) -> Result<(), AppError> {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        if self.password != self.password2 {
            errors.add("password2", "You must type the same password each time.");
        }
        errors.merge(password_strength(&self.password, &self.username, "password"));

        errors.into_result()
    }
}

/// Rules applied to every new password: not entirely numeric, not the username
pub fn password_strength(password: &str, username: &str, field: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "This password is entirely numeric.");
    }
    if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
        errors.add(field, "The password is too similar to the username.");
    }

    errors
}

/// Login form
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Password change for a logged-in user
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub new_password: String,
    pub new_password2: String,
}

/// Password reset request (by email address)
#[derive(Debug, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// New password chosen from a reset link
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 8, message = "This password is too short. It must contain at least 8 characters."))]
    pub password: String,
    pub password2: String,
}

/// Update account type request (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAccountType {
    pub account_type: AccountType,
}

/// Activate or deactivate an account (admin only)
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateActive {
    /// Inactive accounts cannot log in and their sessions stop working
    pub is_active: bool,
}

/// JWT payload of a session.
///
/// It only names the account: rights are read from the database on every
/// request. `pwd` fingerprints the password hash the session was opened
/// with, so changing the password ends the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub sub: String,
    pub user_id: i32,
    pub pwd: String,
    pub exp: i64,
    pub iat: i64,
}

impl SessionToken {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }
}

/// The caller of a request, as its account stands right now
#[derive(Debug, Clone)]
pub struct UserClaims {
    pub username: String,
    pub user_id: i32,
    pub account_type: AccountType,
    pub permissions: Vec<Permission>,
    pub email_verified: bool,
}

impl UserClaims {
    pub fn new(user: &User, permissions: Vec<Permission>) -> Self {
        Self {
            username: user.username.clone(),
            user_id: user.id,
            account_type: user.account_type,
            permissions,
            email_verified: user.email_verified,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.account_type.is_staff() || self.permissions.contains(&permission)
    }

    pub fn is_staff(&self) -> bool {
        self.account_type.is_staff()
    }

    /// Access policy gate: verified email first, then permissions.
    ///
    /// Viewing one's own loans is always allowed.
    pub fn authorize(&self, action: Action) -> Result<(), AppError> {
        if let Action::ViewLoansOf { borrower_id } = action {
            if borrower_id == self.user_id {
                return Ok(());
            }
        }

        let requirement = action.requirement();

        if requirement.verified_email && !self.email_verified {
            return Err(AppError::EmailNotVerified);
        }

        if requirement
            .any_of
            .iter()
            .any(|permission| self.has_permission(*permission))
        {
            Ok(())
        } else {
            Err(AppError::Authorization(format!(
                "Insufficient rights to {}",
                action.describe()
            )))
        }
    }

    /// Require admin privileges
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization(
                "Administrator privileges required".to_string(),
            ))
        }
    }
}
