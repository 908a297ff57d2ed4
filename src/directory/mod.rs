//! Identity resolution against an external directory.
//!
//! A run opens one [`DirectorySession`] after the usage query has completed,
//! resolves every distinct account through it and closes it before any mail
//! is sent.

mod error;
#[cfg(feature = "directory-ldap")]
mod ldap;

use async_trait::async_trait;
pub use error::DirectoryError;
#[cfg(feature = "directory-ldap")]
pub use ldap::LdapDirectory;

use crate::models::{FailureCategory, IdentityAttributes};

/// Outcome of looking up one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found(IdentityAttributes),
    /// The account exists but lacks a contact address or display name.
    AttributeMissing { attribute: String },
    /// The lookup failed: not found, timeout, or a protocol error.
    Error { message: String },
}

impl Resolution {
    /// Build a resolution from the raw attribute values of a found entry.
    /// Empty or whitespace-only values count as missing.
    pub fn from_attributes(
        display_name: Option<String>,
        contact_address: Option<String>,
        name_attribute: &str,
        mail_attribute: &str,
    ) -> Self {
        let present = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        match (present(display_name), present(contact_address)) {
            (Some(display_name), Some(contact_address)) => Self::Found(IdentityAttributes {
                display_name,
                contact_address,
            }),
            (_, None) => Self::AttributeMissing {
                attribute: mail_attribute.to_string(),
            },
            (None, _) => Self::AttributeMissing {
                attribute: name_attribute.to_string(),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// The found attributes, or the failure category and a detail message.
    pub fn into_result(self) -> Result<IdentityAttributes, (FailureCategory, String)> {
        match self {
            Self::Found(attributes) => Ok(attributes),
            Self::AttributeMissing { attribute } => Err((
                FailureCategory::AttributeMissing,
                format!("no value for '{attribute}'"),
            )),
            Self::Error { message } => Err((FailureCategory::ResolverError, message)),
        }
    }
}

/// A directory that can be connected to.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Connect and authenticate. Failure here is fatal to the run.
    async fn open_session(&self) -> Result<Box<dyn DirectorySession>, DirectoryError>;

    /// Get the directory name for logging.
    fn name(&self) -> &'static str;
}

/// An open, authenticated directory connection reused for every lookup in a run.
#[async_trait]
pub trait DirectorySession: Send {
    async fn resolve(&mut self, identity_key: &str) -> Resolution;

    /// Release the connection. Called exactly once, after the last lookup.
    async fn close(&mut self) -> Result<(), DirectoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_attributes_found() {
        let resolution = Resolution::from_attributes(
            Some("Alex".into()),
            Some("alex@example.com".into()),
            "givenName",
            "mail",
        );
        assert_eq!(
            resolution,
            Resolution::Found(IdentityAttributes {
                display_name: "Alex".into(),
                contact_address: "alex@example.com".into(),
            })
        );
        assert!(resolution.into_result().is_ok());
    }

    #[test]
    fn test_from_attributes_missing_mail() {
        let resolution =
            Resolution::from_attributes(Some("Alex".into()), None, "givenName", "mail");
        assert_eq!(
            resolution,
            Resolution::AttributeMissing {
                attribute: "mail".into()
            }
        );
        let (category, _) = resolution.into_result().unwrap_err();
        assert_eq!(category, FailureCategory::AttributeMissing);
    }

    #[test]
    fn test_from_attributes_blank_name_is_missing() {
        let resolution = Resolution::from_attributes(
            Some("   ".into()),
            Some("alex@example.com".into()),
            "givenName",
            "mail",
        );
        assert_eq!(
            resolution,
            Resolution::AttributeMissing {
                attribute: "givenName".into()
            }
        );
    }

    #[test]
    fn test_error_is_resolver_error() {
        let (category, detail) = Resolution::error("not found").into_result().unwrap_err();
        assert_eq!(category, FailureCategory::ResolverError);
        assert_eq!(detail, "not found");
    }
}
