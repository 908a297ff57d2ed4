use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// LDAP directory configuration.
///
/// Accounts are looked up by `key_attribute` under `base_dn`, using a
/// service account bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirectoryConfig {
    /// Directory URL, e.g. `ldaps://dc.example.com:636`.
    pub url: String,

    /// DN of the service account used to bind.
    pub bind_dn: String,

    /// Password of the service account.
    pub bind_password: String,

    /// Search base for account lookups.
    pub base_dn: String,

    /// Attribute matched against the usage table's account identifier.
    #[serde(default = "default_key_attribute")]
    pub key_attribute: String,

    /// Attribute holding the contact address.
    #[serde(default = "default_mail_attribute")]
    pub mail_attribute: String,

    /// Attribute holding the name used to greet the user.
    #[serde(default = "default_name_attribute")]
    pub name_attribute: String,

    /// Timeout for connecting and for each lookup, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl DirectoryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("url", &self.url),
            ("bind_dn", &self.bind_dn),
            ("base_dn", &self.base_dn),
            ("key_attribute", &self.key_attribute),
            ("mail_attribute", &self.mail_attribute),
            ("name_attribute", &self.name_attribute),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "directory.{field} cannot be empty"
                )));
            }
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "directory.timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

fn default_key_attribute() -> String {
    "sAMAccountName".into()
}

fn default_mail_attribute() -> String {
    "mail".into()
}

fn default_name_attribute() -> String {
    "givenName".into()
}

fn default_timeout_secs() -> u64 {
    10
}
