//! Account service: signup, login, email confirmation and password management

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult, FieldErrors},
    models::{
        pagination::{Page, PageNumber, Pagination, USERS_PER_PAGE},
        user::{
            password_strength, ChangePasswordRequest, LoginRequest, PasswordResetConfirm,
            SignupRequest,
        },
        AccountType, SessionToken, User, UserClaims, UserShort,
    },
    repository::Repository,
};

use super::email::EmailService;

type HmacSha256 = Hmac<Sha256>;

/// What a signed account key authorizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPurpose {
    EmailConfirmation,
    PasswordReset,
    Session,
}

impl KeyPurpose {
    fn tag(&self) -> &'static str {
        match self {
            KeyPurpose::EmailConfirmation => "email-confirmation",
            KeyPurpose::PasswordReset => "password-reset",
            KeyPurpose::Session => "session",
        }
    }
}

/// Stateless HMAC keys of the form `{user_id}-{expires}-{signature}`.
///
/// The signature covers a per-purpose binding value (email address or
/// password hash), so a key dies as soon as that value changes.
#[derive(Clone)]
pub struct KeySigner {
    secret: String,
}

impl KeySigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self, purpose: KeyPurpose, user_id: i32, binding: &str, expires: i64) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| AppError::Internal(format!("Invalid signing secret: {}", e)))?;
        mac.update(format!("{}:{}:{}:{}", purpose.tag(), user_id, binding, expires).as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, purpose: KeyPurpose, user_id: i32, binding: &str, expires: i64) -> AppResult<String> {
        let signature = self
            .mac(purpose, user_id, binding, expires)?
            .finalize()
            .into_bytes();
        Ok(format!("{}-{}-{}", user_id, expires, hex::encode(signature)))
    }

    /// User id a key was issued for, before its signature is checked
    pub fn user_id(key: &str) -> Option<i32> {
        key.split('-').next()?.parse().ok()
    }

    /// Check a key against the current binding value and the clock
    pub fn verify(&self, purpose: KeyPurpose, key: &str, binding: &str, now: i64) -> AppResult<i32> {
        let invalid = || AppError::BadRequest("Invalid or expired link".to_string());

        let mut parts = key.splitn(3, '-');
        let user_id: i32 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let expires: i64 = parts.next().and_then(|p| p.parse().ok()).ok_or_else(invalid)?;
        let signature = parts
            .next()
            .and_then(|p| hex::decode(p).ok())
            .ok_or_else(invalid)?;

        self.mac(purpose, user_id, binding, expires)?
            .verify_slice(&signature)
            .map_err(|_| invalid())?;

        if expires < now {
            return Err(invalid());
        }

        Ok(user_id)
    }

    /// Fingerprint tying a session to one password hash
    pub fn session_fingerprint(&self, user_id: i32, password_hash: &str) -> AppResult<String> {
        let signature = self
            .mac(KeyPurpose::Session, user_id, password_hash, 0)?
            .finalize()
            .into_bytes();
        Ok(hex::encode(signature))
    }

    pub fn session_matches(&self, user_id: i32, password_hash: &str, fingerprint: &str) -> AppResult<bool> {
        let Ok(signature) = hex::decode(fingerprint) else {
            return Ok(false);
        };
        Ok(self
            .mac(KeyPurpose::Session, user_id, password_hash, 0)?
            .verify_slice(&signature)
            .is_ok())
    }
}

#[derive(Clone)]
pub struct AccountsService {
    repository: Repository,
    config: AuthConfig,
    email: EmailService,
    signer: KeySigner,
}

impl AccountsService {
    pub fn new(repository: Repository, config: AuthConfig, email: EmailService) -> Self {
        let signer = KeySigner::new(config.jwt_secret.clone());
        Self {
            repository,
            config,
            email,
            signer,
        }
    }

    /// Register a member account and mail the confirmation link
    pub async fn signup(&self, request: SignupRequest) -> AppResult<(User, String)> {
        request.clean()?;

        let username = request.username.trim().to_lowercase();
        let email = request.email.trim().to_string();

        if self.repository.users.get_by_username(&username).await?.is_some() {
            return Err(AppError::InvalidForm(FieldErrors::single(
                "username",
                "A user with that username already exists.",
            )));
        }
        if self.repository.users.get_by_email(&email).await?.is_some() {
            return Err(AppError::InvalidForm(FieldErrors::single(
                "email",
                "A user is already registered with this email address.",
            )));
        }

        let password_hash = hash_password(&request.password)?;
        let user = self
            .repository
            .users
            .create(&username, &email, &password_hash, AccountType::Member)
            .await?;

        tracing::info!("New member account {} ({})", user.username, user.id);

        if let Err(e) = self.send_confirmation(&user).await {
            tracing::error!("Could not send confirmation to user {}: {}", user.id, e);
        }

        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    /// Authenticate by username and password
    pub async fn login(&self, request: &LoginRequest) -> AppResult<(User, String)> {
        let user = self
            .repository
            .users
            .get_by_username(request.username.trim())
            .await?
            .ok_or_else(|| {
                AppError::Authentication("The username and/or password you specified are not correct.".to_string())
            })?;

        if !verify_password(&user.password, &request.password)? {
            tracing::warn!("Failed login for {}", user.username);
            return Err(AppError::Authentication(
                "The username and/or password you specified are not correct.".to_string(),
            ));
        }

        self.repository.users.touch_last_login(user.id).await?;
        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    /// Open a session for `user`, bound to its current password
    pub fn token_for(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let session = SessionToken {
            sub: user.username.clone(),
            user_id: user.id,
            pwd: self.signer.session_fingerprint(user.id, &user.password)?,
            exp,
            iat: now,
        };

        session
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Who a session belongs to, with the rights the account holds right now.
    ///
    /// `None` once the account is deleted or deactivated, or its password
    /// changed after the session was opened.
    pub async fn resolve_session(&self, session: &SessionToken) -> AppResult<Option<UserClaims>> {
        let Some(user) = self.repository.users.get_active(session.user_id).await? else {
            return Ok(None);
        };

        if !self
            .signer
            .session_matches(user.id, &user.password, &session.pwd)?
        {
            tracing::debug!("Session of user {} predates its password", user.id);
            return Ok(None);
        }

        let permissions = self
            .repository
            .users
            .permissions_of(user.account_type)
            .await?;
        Ok(Some(UserClaims::new(&user, permissions)))
    }

    pub async fn get_user(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    pub fn confirmation_key(&self, user: &User) -> AppResult<String> {
        let expires = (Utc::now() + Duration::days(self.config.email_confirmation_expire_days)).timestamp();
        self.signer.sign(
            KeyPurpose::EmailConfirmation,
            user.id,
            &user.email.to_lowercase(),
            expires,
        )
    }

    pub async fn send_confirmation(&self, user: &User) -> AppResult<()> {
        if user.email_verified {
            return Err(AppError::BadRequest("Email address already verified".to_string()));
        }

        let key = self.confirmation_key(user)?;
        let link = self
            .email
            .site_link(&format!("/core/accounts/email/confirm/{}/", key));

        self.email
            .send_email_confirmation(
                &user.email,
                &user.username,
                &link,
                self.config.email_confirmation_expire_days,
            )
            .await
    }

    /// Mark the address verified and open a fresh session
    pub async fn confirm_email(&self, key: &str) -> AppResult<(User, String)> {
        let user_id = KeySigner::user_id(key)
            .ok_or_else(|| AppError::BadRequest("Invalid or expired link".to_string()))?;
        let user = self
            .repository
            .users
            .get_by_id(user_id)
            .await
            .map_err(|_| AppError::BadRequest("Invalid or expired link".to_string()))?;

        self.signer.verify(
            KeyPurpose::EmailConfirmation,
            key,
            &user.email.to_lowercase(),
            Utc::now().timestamp(),
        )?;

        let user = if user.email_verified {
            user
        } else {
            let user = self.repository.users.set_email_verified(user.id).await?;
            tracing::info!("Email confirmed for user {}", user.id);
            user
        };

        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    /// Mail a reset link if the address is known; silent otherwise
    pub async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        let Some(user) = self.repository.users.get_by_email(email.trim()).await? else {
            tracing::info!("Password reset requested for an unknown address");
            return Ok(());
        };

        let expires = (Utc::now() + Duration::hours(self.config.password_reset_expire_hours)).timestamp();
        let key = self
            .signer
            .sign(KeyPurpose::PasswordReset, user.id, &user.password, expires)?;
        let link = self
            .email
            .site_link(&format!("/core/accounts/password/reset/key/{}/", key));

        if let Err(e) = self
            .email
            .send_password_reset(&user.email, &user.username, &link)
            .await
        {
            tracing::error!("Could not send password reset to user {}: {}", user.id, e);
        }
        Ok(())
    }

    /// Set a new password from a reset link; the link is single-use
    pub async fn reset_password(&self, key: &str, form: PasswordResetConfirm) -> AppResult<()> {
        let user_id = KeySigner::user_id(key)
            .ok_or_else(|| AppError::BadRequest("Invalid or expired link".to_string()))?;
        let user = self
            .repository
            .users
            .get_by_id(user_id)
            .await
            .map_err(|_| AppError::BadRequest("Invalid or expired link".to_string()))?;

        self.signer.verify(
            KeyPurpose::PasswordReset,
            key,
            &user.password,
            Utc::now().timestamp(),
        )?;

        let mut errors = match form.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        if form.password != form.password2 {
            errors.add("password2", "You must type the same password each time.");
        }
        errors.merge(password_strength(&form.password, &user.username, "password"));
        errors.into_result()?;

        self.repository
            .users
            .set_password(user.id, &hash_password(&form.password)?)
            .await?;
        tracing::info!("Password reset for user {}", user.id);
        Ok(())
    }

    /// Change the caller's password; every other session ends, the caller gets a new one
    pub async fn change_password(&self, user_id: i32, request: ChangePasswordRequest) -> AppResult<(User, String)> {
        let user = self.repository.users.get_by_id(user_id).await?;

        let mut errors = match request.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        if !verify_password(&user.password, &request.old_password)? {
            errors.add("old_password", "Please type your current password.");
        }
        if request.new_password != request.new_password2 {
            errors.add("new_password2", "You must type the same password each time.");
        }
        errors.merge(password_strength(&request.new_password, &user.username, "new_password"));
        errors.into_result()?;

        let user = self
            .repository
            .users
            .set_password(user.id, &hash_password(&request.new_password)?)
            .await?;
        tracing::info!("Password changed for user {}", user.id);

        let token = self.token_for(&user)?;
        Ok((user, token))
    }

    // Administration

    pub async fn list_users(&self, page: Option<PageNumber>) -> AppResult<Page<UserShort>> {
        let total = self.repository.users.count().await?;
        let pagination = Pagination::resolve(page, USERS_PER_PAGE, total)?;
        let users = self.repository.users.list(&pagination).await?;
        Ok(pagination.wrap(users))
    }

    pub async fn set_account_type(&self, id: i32, account_type: AccountType) -> AppResult<User> {
        let user = self.repository.users.set_account_type(id, account_type).await?;
        tracing::info!("User {} is now {}", user.id, account_type);
        Ok(user)
    }

    pub async fn verify_email(&self, id: i32) -> AppResult<User> {
        self.repository.users.set_email_verified(id).await
    }

    pub async fn set_active(&self, id: i32, is_active: bool) -> AppResult<User> {
        let user = self.repository.users.set_active(id, is_active).await?;
        if is_active {
            tracing::info!("User {} reactivated", user.id);
        } else {
            tracing::info!("User {} deactivated", user.id);
        }
        Ok(user)
    }

    pub async fn delete_user(&self, id: i32) -> AppResult<()> {
        self.repository.users.delete(id).await?;
        tracing::info!("User {} deleted", id);
        Ok(())
    }
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored Argon2 hash
pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash =
        PasswordHash::new(hash).map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
