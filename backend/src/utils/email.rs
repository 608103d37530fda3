use anyhow::Result;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;

pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
    skip_send: bool,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mailer = if config.username.is_empty() {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build()
        } else {
            let creds = Credentials::new(config.username.clone(), config.password.clone());
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
                .port(config.port)
                .credentials(creds)
                .build()
        };

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
            skip_send: config.skip_send,
        })
    }

    pub async fn send_password_reset_code(
        &self,
        to_email: &str,
        code: &str,
        valid_minutes: u64,
    ) -> Result<()> {
        let body = format!(
            r#"
We received a request to reset the password of your Storefront account.

Your reset code is: {}

The code is valid for {} minutes and can be used once.

If you did not request a password reset, you can ignore this e-mail.
"#,
            code, valid_minutes
        );

        self.deliver(to_email, "Your password reset code", body)
            .await
    }

    pub async fn send_password_changed_notification(
        &self,
        to_email: &str,
        username: &str,
    ) -> Result<()> {
        let body = format!(
            r#"
The password of the Storefront account "{}" was changed at {}.

If you did not make this change, contact support immediately.
"#,
            username,
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );

        self.deliver(to_email, "Your password was changed", body)
            .await
    }

    async fn deliver(&self, to_email: &str, subject: &str, body: String) -> Result<()> {
        if self.skip_send {
            tracing::debug!(to = %to_email, subject, "SMTP_SKIP_SEND set, dropping e-mail");
            return Ok(());
        }

        let email = Message::builder()
            .from(self.from_address.parse()?)
            .to(to_email.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;

        self.mailer.send(email).await?;
        Ok(())
    }
}
