//! Shipping notifications by email.
//!
//! Uses SMTP via lettre for delivery with Askama HTML and text templates.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::services::shipping::{Notifier, NotifyOutcome, ShippingNotice};

/// HTML template for the shipping-created email.
#[derive(Template)]
#[template(path = "email/shipping_created.html")]
struct ShippingCreatedHtml<'a> {
    order_id: &'a str,
    tracking_number: &'a str,
    label_url: Option<&'a str>,
}

/// Plain text template for the shipping-created email.
#[derive(Template)]
#[template(path = "email/shipping_created.txt")]
struct ShippingCreatedText<'a> {
    order_id: &'a str,
    tracking_number: &'a str,
    label_url: Option<&'a str>,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// SMTP sender for transactional emails.
#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailService {
    /// Create a new email service from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    /// Send the "your order has shipped" email.
    ///
    /// # Errors
    ///
    /// Returns error if the email fails to send or a template fails to render.
    pub async fn send_shipping_created(
        &self,
        to: &str,
        notice: &ShippingNotice,
    ) -> Result<(), EmailError> {
        let (subject, text, html) = render_shipping_created(notice)?;
        self.send_multipart_email(to, &subject, &text, &html).await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

/// Subject, text body and HTML body for a shipping notice.
fn render_shipping_created(notice: &ShippingNotice) -> Result<(String, String, String), EmailError> {
    let order_id = notice.order_id.to_string();
    let tracking_number = notice.tracking_number.as_deref().unwrap_or("pending");
    let label_url = notice.label_url.as_deref();

    let html = ShippingCreatedHtml {
        order_id: &order_id,
        tracking_number,
        label_url,
    }
    .render()?;
    let text = ShippingCreatedText {
        order_id: &order_id,
        tracking_number,
        label_url,
    }
    .render()?;

    Ok((format!("Your order {order_id} is on its way"), text, html))
}

/// [`Notifier`] backed by SMTP. Without SMTP configuration every notice is skipped.
#[derive(Clone, Default)]
pub struct EmailNotifier {
    service: Option<EmailService>,
}

impl EmailNotifier {
    #[must_use]
    pub const fn new(service: Option<EmailService>) -> Self {
        Self { service }
    }

    /// Build from optional SMTP configuration; a broken relay config disables email.
    #[must_use]
    pub fn from_config(config: Option<&EmailConfig>) -> Self {
        let service = config.and_then(|config| match EmailService::new(config) {
            Ok(service) => Some(service),
            Err(e) => {
                tracing::warn!(error = %e, "SMTP configuration unusable, notifications disabled");
                None
            }
        });
        Self { service }
    }
}

impl Notifier for EmailNotifier {
    async fn send_shipping_created(&self, notice: &ShippingNotice) -> NotifyOutcome {
        let Some(service) = self.service.as_ref() else {
            tracing::debug!(order_id = %notice.order_id, "SMTP not configured, skipping notification");
            return NotifyOutcome::skipped();
        };
        let Some(to) = notice
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
        else {
            tracing::info!(order_id = %notice.order_id, "Order has no customer email, skipping notification");
            return NotifyOutcome::skipped();
        };

        match service.send_shipping_created(to, notice).await {
            Ok(()) => NotifyOutcome::sent(),
            Err(e) => NotifyOutcome::failed(e.to_string()),
        }
    }
}
