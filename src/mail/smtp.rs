use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
};

use super::{DeliveryError, MailTransport, OutgoingMessage};
use crate::config::MailConfig;

/// Delivers through an unauthenticated SMTP relay.
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpTransport {
    pub fn from_config(config: &MailConfig) -> Self {
        // The relay accepts plain SMTP from inside the network; no TLS, no auth.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port)
            .timeout(Some(config.timeout()))
            .build();

        Self { transport }
    }
}

fn mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Compose the MIME message: a `multipart/related` body when an inline image
/// is present, a single HTML part otherwise.
pub(crate) fn build_message(message: &OutgoingMessage) -> Result<Message, DeliveryError> {
    let builder = Message::builder()
        .from(mailbox(&message.from)?)
        .to(mailbox(&message.to)?)
        .subject(message.subject.as_str());

    let html = SinglePart::html(message.html_body.clone());

    let built = match &message.inline_image {
        Some(image) => {
            let content_type = ContentType::parse(&image.content_type)
                .map_err(|e| DeliveryError::Build(e.to_string()))?;
            builder.multipart(
                MultiPart::related().singlepart(html).singlepart(
                    Attachment::new_inline(image.content_id.clone())
                        .body(image.bytes.clone(), content_type),
                ),
            )
        }
        None => builder.singlepart(html),
    };

    built.map_err(|e| DeliveryError::Build(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError> {
        let email = build_message(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}
