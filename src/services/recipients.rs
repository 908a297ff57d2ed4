//! Deciding which resolved accounts actually receive a report.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    config::{MailConfig, ReportConfig},
    models::IdentityRecord,
};

#[derive(Debug, Error)]
pub enum ExclusionListError {
    #[error("Failed to read exclusion list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    /// The account or its address opted out.
    Excluded,
    /// An allow-list is configured and the address is not on it.
    NotAllowed,
}

impl FilterDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Excluded => "excluded",
            Self::NotAllowed => "not_allowed",
        }
    }
}

/// Allow-list and opt-out filtering. All comparisons ignore case.
#[derive(Debug, Clone, Default)]
pub struct RecipientFilter {
    allow_list: Option<HashSet<String>>,
    exclusions: HashSet<String>,
}

impl RecipientFilter {
    /// `allow_list` is a comma-separated list of addresses. A missing or blank
    /// list allows everyone.
    pub fn new(allow_list: Option<&str>, exclusions: impl IntoIterator<Item = String>) -> Self {
        let allow_list = allow_list
            .map(|list| {
                list.split(',')
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect::<HashSet<_>>()
            })
            .filter(|set| !set.is_empty());

        Self {
            allow_list,
            exclusions: exclusions.into_iter().map(|e| e.to_lowercase()).collect(),
        }
    }

    /// Build from configuration, reading the exclusion directory if one is set.
    /// `exclusion_dir` overrides `report.exclusion_dir`.
    pub fn from_config(
        mail: &MailConfig,
        report: &ReportConfig,
        exclusion_dir: Option<&Path>,
    ) -> Result<Self, ExclusionListError> {
        let exclusions = match exclusion_dir.or(report.exclusion_dir.as_deref()) {
            Some(dir) => load_exclusions(dir)?,
            None => HashSet::new(),
        };
        Ok(Self::new(mail.allow_list.as_deref(), exclusions))
    }

    pub fn has_allow_list(&self) -> bool {
        self.allow_list.is_some()
    }

    pub fn exclusion_count(&self) -> usize {
        self.exclusions.len()
    }

    pub fn check(&self, record: &IdentityRecord) -> FilterDecision {
        let address = record.contact_address.to_lowercase();

        if self.exclusions.contains(&address)
            || self.exclusions.contains(&record.identity_key.to_lowercase())
        {
            return FilterDecision::Excluded;
        }

        match &self.allow_list {
            Some(allowed) if !allowed.contains(&address) => FilterDecision::NotAllowed,
            _ => FilterDecision::Accept,
        }
    }
}

/// Read every regular file in `dir`. Each non-blank line that does not start
/// with `#` is an identity key or contact address.
pub fn load_exclusions(dir: &Path) -> Result<HashSet<String>, ExclusionListError> {
    let read_err = |path: &Path, source| ExclusionListError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut exclusions = HashSet::new();
    let entries = std::fs::read_dir(dir).map_err(|e| read_err(dir, e))?;

    for entry in entries {
        let path = entry.map_err(|e| read_err(dir, e))?.path();
        if !path.is_file() {
            continue;
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| read_err(&path, e))?;
        let before = exclusions.len();
        exclusions.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_lowercase),
        );

        tracing::debug!(
            path = %path.display(),
            added = exclusions.len() - before,
            "Loaded exclusion list"
        );
    }

    Ok(exclusions)
}
