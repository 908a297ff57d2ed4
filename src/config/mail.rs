use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Outgoing mail configuration.
///
/// Mail is handed to an SMTP relay without authentication. The relay
/// limits senders to 30 messages a minute, hence the default send interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailConfig {
    /// SMTP relay host.
    pub smtp_host: String,

    /// SMTP relay port.
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Timeout for each SMTP exchange, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sender address for reports and administrative notices.
    pub from_address: String,

    /// Recipient of administrative notices. Defaults to `from_address`.
    #[serde(default)]
    pub admin_address: Option<String>,

    /// Comma-separated contact addresses allowed to receive reports.
    /// When unset, every resolved account receives its report.
    #[serde(default)]
    pub allow_list: Option<String>,

    /// Minimum pause between two consecutive messages, in milliseconds.
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,

    /// Assemble reports and log them instead of sending anything.
    #[serde(default)]
    pub dry_run: bool,
}

impl MailConfig {
    pub fn admin_address(&self) -> &str {
        self.admin_address.as_deref().unwrap_or(&self.from_address)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.smtp_host.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mail.smtp_host cannot be empty".into(),
            ));
        }
        if !looks_like_address(&self.from_address) {
            return Err(ConfigError::Validation(format!(
                "mail.from_address is not an email address: '{}'",
                self.from_address
            )));
        }
        if let Some(admin) = &self.admin_address
            && !looks_like_address(admin)
        {
            return Err(ConfigError::Validation(format!(
                "mail.admin_address is not an email address: '{admin}'"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "mail.timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn looks_like_address(value: &str) -> bool {
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.is_empty(),
        None => false,
    }
}

fn default_smtp_port() -> u16 {
    25
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_send_interval_ms() -> u64 {
    2000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> MailConfig {
        MailConfig {
            smtp_host: "localhost".into(),
            smtp_port: 25,
            timeout_secs: 30,
            from_address: "reports@example.com".into(),
            admin_address: None,
            allow_list: None,
            send_interval_ms: 2000,
            dry_run: false,
        }
    }

    #[test]
    fn test_admin_address_falls_back_to_sender() {
        let mut mail = config();
        assert_eq!(mail.admin_address(), "reports@example.com");
        mail.admin_address = Some("admins@example.com".into());
        assert_eq!(mail.admin_address(), "admins@example.com");
    }

    #[test]
    fn test_invalid_addresses_rejected() {
        let mut mail = config();
        mail.from_address = "not-an-address".into();
        assert!(mail.validate().is_err());

        let mut mail = config();
        mail.admin_address = Some("@example.com".into());
        assert!(mail.validate().is_err());
    }
}
