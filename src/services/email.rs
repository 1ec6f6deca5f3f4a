//! Email service for account confirmation and password reset mail

use lettre::{
    message::{header::ContentType, Mailbox, Message, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    SmtpTransport, Transport,
};
use std::str::FromStr;

use crate::{
    config::{EmailBackend, EmailConfig},
    error::{AppError, AppResult},
};

#[derive(Clone)]
pub struct EmailService {
    config: EmailConfig,
}

impl EmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Absolute link to a path of this site
    pub fn site_link(&self, path: &str) -> String {
        format!("{}{}", self.config.site_url.trim_end_matches('/'), path)
    }

    /// Send the address confirmation link after signup
    pub async fn send_email_confirmation(
        &self,
        to: &str,
        username: &str,
        link: &str,
        expire_days: i64,
    ) -> AppResult<()> {
        let body = format!(
            r#"
Hello {username},

You're receiving this email because this address was used to register an account
at the library.

To confirm this is correct, go to {link}

The link expires in {expire_days} days.
"#
        );

        self.send_email(to, "Please Confirm Your Email Address", &body)
            .await
    }

    /// Send a password reset link
    pub async fn send_password_reset(&self, to: &str, username: &str, link: &str) -> AppResult<()> {
        let body = format!(
            r#"
Hello {username},

You're receiving this email because you or someone else has requested a password
reset for your library account.

It can be safely ignored if you did not request a password reset. Click the link
below to reset your password.

{link}
"#
        );

        self.send_email(to, "Password Reset Email", &body).await
    }

    fn subject(&self, subject: &str) -> String {
        format!("{}{}", self.config.subject_prefix, subject)
    }

    /// Generic email sending function
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> AppResult<()> {
        let subject = self.subject(subject);

        if self.config.backend == EmailBackend::Console {
            tracing::info!(to = %to, subject = %subject, "Outgoing email\n{}", body);
            return Ok(());
        }

        let from_name = self
            .config
            .smtp_from_name
            .as_deref()
            .unwrap_or("Library");
        let from_mailbox = Mailbox::from_str(&format!("{} <{}>", from_name, self.config.smtp_from))
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        let to_mailbox = Mailbox::from_str(to)
            .map_err(|e| AppError::Internal(format!("Invalid to address: {}", e)))?;

        let email = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(format!(
                                r#"<html><body><pre>{}</pre></body></html>"#,
                                body.replace('\n', "<br>")
                            )),
                    ),
            )
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        let mailer_builder = if self.config.smtp_use_tls {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
                .map_err(|e| AppError::Internal(format!("Failed to create SMTP transport: {}", e)))?
        } else {
            SmtpTransport::builder_dangerous(&self.config.smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer_builder = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer_builder.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer_builder
        };

        let mailer = mailer_builder.build();

        // SmtpTransport blocks on network I/O
        tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::Internal(format!("Email task failed: {}", e)))?
            .map_err(|e| AppError::Internal(format!("Failed to send email: {}", e)))?;

        Ok(())
    }
}
