use std::collections::HashMap;

use async_trait::async_trait;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Scope, SearchEntry, ldap_escape};

use super::{Directory, DirectoryError, DirectorySession, Resolution};
use crate::config::DirectoryConfig;

/// Resolves accounts against an LDAP / Active Directory server.
pub struct LdapDirectory {
    config: DirectoryConfig,
}

impl LdapDirectory {
    pub fn new(config: DirectoryConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn open_session(&self) -> Result<Box<dyn DirectorySession>, DirectoryError> {
        let timeout = self.config.timeout();
        let settings = LdapConnSettings::new().set_conn_timeout(timeout);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| match e {
                LdapError::Timeout { .. } => DirectoryError::Timeout(timeout),
                other => DirectoryError::Connect(other.to_string()),
            })?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                tracing::warn!(error = %e, "LDAP connection terminated with error");
            }
        });

        ldap.with_timeout(timeout)
            .simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .and_then(|result| result.success())
            .map_err(|e| match e {
                LdapError::Timeout { .. } => DirectoryError::Timeout(timeout),
                other => DirectoryError::Bind(other.to_string()),
            })?;

        tracing::debug!(url = %self.config.url, bind_dn = %self.config.bind_dn, "Bound to directory");

        Ok(Box::new(LdapSession {
            ldap,
            config: self.config.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "ldap"
    }
}

struct LdapSession {
    ldap: Ldap,
    config: DirectoryConfig,
}

/// Equality filter on `attribute` with the key escaped per RFC 4515.
fn search_filter(attribute: &str, identity_key: &str) -> String {
    format!("({}={})", attribute, ldap_escape(identity_key))
}

/// First value of `name`, matched case-insensitively since servers are free
/// to return attribute names in their own casing.
fn first_value(attrs: &HashMap<String, Vec<String>>, name: &str) -> Option<String> {
    attrs
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .and_then(|(_, values)| values.first().cloned())
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn resolve(&mut self, identity_key: &str) -> Resolution {
        let filter = search_filter(&self.config.key_attribute, identity_key);
        let attrs = vec![
            self.config.mail_attribute.as_str(),
            self.config.name_attribute.as_str(),
        ];

        let result = self
            .ldap
            .with_timeout(self.config.timeout())
            .search(&self.config.base_dn, Scope::Subtree, &filter, attrs)
            .await
            .and_then(|result| result.success());

        let entries = match result {
            Ok((entries, _)) => entries,
            Err(e) => {
                tracing::debug!(identity_key, error = %e, "Directory lookup failed");
                return Resolution::error(e.to_string());
            }
        };

        let Some(entry) = entries.into_iter().next() else {
            return Resolution::error(format!("no entry with {filter} under {}", self.config.base_dn));
        };

        let entry = SearchEntry::construct(entry);
        Resolution::from_attributes(
            first_value(&entry.attrs, &self.config.name_attribute),
            first_value(&entry.attrs, &self.config.mail_attribute),
            &self.config.name_attribute,
            &self.config.mail_attribute,
        )
    }

    async fn close(&mut self) -> Result<(), DirectoryError> {
        self.ldap
            .unbind()
            .await
            .map_err(|e| DirectoryError::Protocol(e.to_string()))
    }
}
