use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{
        self,
        authentication::Credentials,
        response::{Category, Code, Detail, Severity},
    },
};
use tracing::{debug, error, info};

use crate::{
    config::SmtpConfig,
    mailer::{DeliveryError, Mailer},
    models::retry::RetryConfig,
    templates::{RenderedEmail, TemplateEngine, WelcomeDetails},
    utils::retry_when,
};

/// Welcome-email sender backed by an SMTP relay.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    templates: TemplateEngine,
    from: Mailbox,
    app_name: String,
    host: String,
    retry_config: RetryConfig,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig, retry_config: RetryConfig) -> Result<Self, DeliveryError> {
        let transport = Self::build_transport(config)?;
        let templates = TemplateEngine::new()
            .map_err(|e| DeliveryError::permanent(format!("Failed to load email templates: {}", e)))?;

        let from_address: Address = config.from_email.parse().map_err(|e| {
            DeliveryError::permanent(format!("Invalid from address '{}': {}", config.from_email, e))
        })?;

        info!(
            host = %config.host,
            port = config.port,
            use_tls = config.use_tls,
            "SMTP mailer initialized"
        );

        Ok(Self {
            transport,
            templates,
            from: Mailbox::new(Some(config.from_name.clone()), from_address),
            app_name: config.from_name.clone(),
            host: config.host.clone(),
            retry_config,
        })
    }

    fn build_transport(
        config: &SmtpConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| {
                    DeliveryError::permanent(format!("Failed to create SMTP relay: {}", e))
                })?
                .port(config.port)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host).port(config.port)
        };

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }

    fn build_message(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        rendered: RenderedEmail,
    ) -> Result<Message, DeliveryError> {
        let address: Address = recipient_email.trim().parse().map_err(|e| {
            DeliveryError::permanent(format!("Invalid recipient address '{}': {}", recipient_email, e))
        })?;

        let name = Some(recipient_name.trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(name, address))
            .subject(rendered.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(rendered.text_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(rendered.html_body),
                    ),
            )
            .map_err(|e| DeliveryError::permanent(format!("Failed to build email message: {}", e)))
    }
}

fn classify_smtp_error(err: smtp::Error) -> DeliveryError {
    if is_permanent_reply(err.is_permanent(), err.status()) {
        DeliveryError::permanent(format!("SMTP rejected message: {}", err))
    } else {
        DeliveryError::transient(format!("SMTP send failed: {}", err))
    }
}

/// A reply is permanent only for 5xx codes other than the authentication
/// failures (530, 534, 535), which an operator can fix without losing the
/// message. Errors without a reply code (connection, TLS, timeouts) are transient
/// unless lettre itself says otherwise.
fn is_permanent_reply(permanent: bool, code: Option<Code>) -> bool {
    match code {
        Some(code) => code.severity == Severity::PermanentNegativeCompletion && !is_auth_failure(code),
        None => permanent,
    }
}

fn is_auth_failure(code: Code) -> bool {
    code.severity == Severity::PermanentNegativeCompletion
        && code.category == Category::Unspecified3
        && matches!(code.detail, Detail::Zero | Detail::Four | Detail::Five)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        recipient_email: &str,
        recipient_name: &str,
        recipient_phone: Option<&str>,
        registered_at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        let rendered = self.templates.render_welcome(&WelcomeDetails {
            app_name: &self.app_name,
            username: recipient_name,
            email: recipient_email,
            phone_number: recipient_phone,
            registered_at,
        })
        .map_err(|e| DeliveryError::permanent(format!("Template render failed: {}", e)))?;

        let message = self.build_message(recipient_email, recipient_name, rendered)?;

        debug!(to = %recipient_email, host = %self.host, "Sending welcome email via SMTP");

        let transport = &self.transport;

        retry_when(
            &self.retry_config,
            || {
                let message = message.clone();
                async move { transport.send(message).await.map_err(classify_smtp_error) }
            },
            DeliveryError::is_transient,
        )
        .await
        .inspect_err(|e| {
            error!(to = %recipient_email, error = %e, "Failed to send welcome email via SMTP");
        })?;

        info!(to = %recipient_email, "Welcome email sent via SMTP");

        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn health_check(&self) -> Result<bool, DeliveryError> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| DeliveryError::transient(format!("SMTP health check failed: {}", e)))
    }
}
