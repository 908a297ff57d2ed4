//! Outgoing mail: report messages, administrative notices and the transport
//! that delivers them.

mod admin;
#[cfg(feature = "mail-smtp")]
mod smtp;

pub use admin::{AdminNotice, FailureSummary, ReportFailure, RunContext};
use async_trait::async_trait;
#[cfg(feature = "mail-smtp")]
pub use smtp::SmtpTransport;
use thiserror::Error;

use crate::models::ReportPayload;

/// Content id the report body uses to reference its chart.
pub const CHART_CONTENT_ID: &str = "usage-chart";

/// An image part shown inline in an HTML body via `cid:` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub content_id: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// A fully composed message, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub inline_image: Option<InlineImage>,
}

impl OutgoingMessage {
    pub fn from_report(from: &str, payload: ReportPayload) -> Self {
        Self {
            from: from.to_string(),
            to: payload.recipient,
            subject: payload.subject,
            html_body: payload.html_body,
            inline_image: Some(InlineImage {
                content_id: CHART_CONTENT_ID.to_string(),
                content_type: "image/png".to_string(),
                bytes: payload.chart_png,
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<(), DeliveryError>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;
}

/// Escape text for inclusion in HTML element content or attribute values.
pub(crate) fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("plain"), "plain");
        assert_eq!(
            escape_html(r#"<b>"O'Neil" & co</b>"#),
            "&lt;b&gt;&quot;O&#39;Neil&quot; &amp; co&lt;/b&gt;"
        );
    }

    #[test]
    fn test_from_report_attaches_chart() {
        let payload = ReportPayload {
            recipient: "alex@example.com".into(),
            subject: "Subject".into(),
            html_body: "<p>Body</p>".into(),
            chart_png: vec![1, 2, 3],
        };
        let message = OutgoingMessage::from_report("reports@example.com", payload);
        assert_eq!(message.from, "reports@example.com");
        assert_eq!(message.to, "alex@example.com");
        let image = message.inline_image.unwrap();
        assert_eq!(image.content_id, CHART_CONTENT_ID);
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.bytes, vec![1, 2, 3]);
    }
}
