use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Report content configuration.
///
/// The defaults reproduce the home drive report sent to staff; every
/// organisation-specific string can be overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    /// Name of the storage resource, used in the subject and chart title.
    /// Must be ASCII since it appears in the subject line.
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    /// Team sending the reports.
    #[serde(default = "default_team_name")]
    pub team_name: String,

    /// Audience the reports are made available to, e.g. "NRM users".
    #[serde(default = "default_audience")]
    pub audience: String,

    /// Where users can reach the team. Defaults to `mail.from_address`.
    #[serde(default)]
    pub contact_address: Option<String>,

    /// Sign-off line at the bottom of the report.
    #[serde(default = "default_signature")]
    pub signature: String,

    /// Page with general storage tips.
    #[serde(default = "default_storage_tips_url")]
    pub storage_tips_url: String,

    /// Page explaining how to empty the recycle bin.
    #[serde(default = "default_recycle_bin_url")]
    pub recycle_bin_url: String,

    /// Page explaining how to move files to cloud storage.
    #[serde(default = "default_cloud_storage_url")]
    pub cloud_storage_url: String,

    /// Directory of opt-out lists. Every file in it is read; each non-empty,
    /// non-comment line is an account identifier or contact address.
    #[serde(default)]
    pub exclusion_dir: Option<PathBuf>,

    /// Chart rendering.
    #[serde(default)]
    pub chart: ChartConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            resource_name: default_resource_name(),
            team_name: default_team_name(),
            audience: default_audience(),
            contact_address: None,
            signature: default_signature(),
            storage_tips_url: default_storage_tips_url(),
            recycle_bin_url: default_recycle_bin_url(),
            cloud_storage_url: default_cloud_storage_url(),
            exclusion_dir: None,
            chart: ChartConfig::default(),
        }
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.resource_name.trim().is_empty() || !self.resource_name.is_ascii() {
            return Err(ConfigError::Validation(
                "report.resource_name must be non-empty ASCII".into(),
            ));
        }
        self.chart.validate()
    }
}

fn default_resource_name() -> String {
    "H: Drive".into()
}

fn default_team_name() -> String {
    "Optimization Team".into()
}

fn default_audience() -> String {
    "staff".into()
}

fn default_signature() -> String {
    "Your Friendly Neighbourhood Optimization Team".into()
}

fn default_storage_tips_url() -> String {
    "https://intranet.gov.bc.ca/iit/products-services/technical-support/storage-tips-and-info"
        .into()
}

fn default_recycle_bin_url() -> String {
    "https://intranet.gov.bc.ca/iit/products-services/technical-support/storage-tips-and-info#Emptyyourrecycling"
        .into()
}

fn default_cloud_storage_url() -> String {
    "https://intranet.gov.bc.ca/iit/onedrive/onedriveinfo".into()
}

/// Chart rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChartConfig {
    /// Image width in pixels.
    #[serde(default = "default_width")]
    pub width: u32,

    /// Image height in pixels.
    #[serde(default = "default_height")]
    pub height: u32,

    /// TrueType/OpenType font used for the title and axis labels.
    /// Without one, bars are drawn without text.
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            font_path: None,
        }
    }
}

impl ChartConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(100..=4000).contains(&self.width) || !(100..=4000).contains(&self.height) {
            return Err(ConfigError::Validation(
                "report.chart width and height must be between 100 and 4000 pixels".into(),
            ));
        }
        Ok(())
    }
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}
