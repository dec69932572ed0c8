// ── SMTP email transport ──

use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::ExposeSecret;

use homesentry_config::EmailSettings;
use homesentry_core::{EmailError, EmailMessage, EmailTransport};

/// Sends rendered alert mails over STARTTLS SMTP.
pub struct SmtpEmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    sender: Mailbox,
}

impl SmtpEmailTransport {
    /// Build from config. Returns `None` when the channel is disabled
    /// or not fully configured.
    pub fn from_settings(settings: &EmailSettings) -> Result<Option<Self>, EmailError> {
        if !settings.usable() {
            return Ok(None);
        }
        let (Some(user), Some(password)) = (settings.user.clone(), settings.normalized_password())
        else {
            return Ok(None);
        };

        let sender: Mailbox = settings
            .sender()
            .parse()
            .map_err(|e| EmailError::Delivery(format!("invalid sender address: {e}")))?;

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| EmailError::Delivery(format!("smtp relay setup failed: {e}")))?
            .port(settings.port)
            .credentials(Credentials::new(
                user,
                password.expose_secret().to_owned(),
            ))
            .build();

        Ok(Some(Self { mailer, sender }))
    }
}

#[async_trait]
impl EmailTransport for SmtpEmailTransport {
    async fn send(&self, message: &EmailMessage) -> Result<(), EmailError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| EmailError::Delivery(format!("invalid recipient: {e}")))?;

        let mail = Message::builder()
            .from(self.sender.clone())
            .to(to)
            .subject(&message.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )
            .map_err(|e| EmailError::Delivery(format!("message build failed: {e}")))?;

        self.mailer
            .send(mail)
            .await
            .map_err(|e| EmailError::Delivery(e.to_string()))?;
        Ok(())
    }
}
