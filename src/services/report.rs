//! Per-account report assembly: chart plus HTML body.

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};

use crate::{
    chart::{BarColor, ChartBar, ChartRenderer, ChartSpec, RenderError},
    config::ReportConfig,
    mail::{CHART_CONTENT_ID, escape_html},
    models::{IdentityRecord, ReportPayload, Sample},
    pricing::{FREE_ALLOWANCE_GB, PRICE_PER_GB_MONTH, format_dollars},
};

/// Number of periods shown in a report.
const PERIODS_SHOWN: usize = 2;

const Y_AXIS_LABEL: &str = "Data size (GB)";

/// Builds report payloads. Holds no per-run state, so the same record always
/// produces the same payload.
pub struct ReportAssembler {
    config: ReportConfig,
    contact_address: String,
    renderer: Arc<dyn ChartRenderer>,
}

impl ReportAssembler {
    /// `contact_address` is shown to users as the address to reach the team.
    pub fn new(
        config: ReportConfig,
        contact_address: impl Into<String>,
        renderer: Arc<dyn ChartRenderer>,
    ) -> Self {
        Self {
            config,
            contact_address: contact_address.into(),
            renderer,
        }
    }

    pub fn assemble(&self, record: &IdentityRecord) -> Result<ReportPayload, RenderError> {
        let shown = &record.samples[record.samples.len().saturating_sub(PERIODS_SHOWN)..];
        let (latest, previous) = match shown {
            [latest] => (latest, None),
            [previous, latest] => (latest, Some(previous)),
            _ => return Err(RenderError::EmptyChart),
        };

        let chart_png = self.renderer.render_png(&self.chart_spec(record, shown))?;

        Ok(ReportPayload {
            recipient: record.contact_address.clone(),
            subject: self.subject(latest),
            html_body: self.html_body(record, latest, previous),
            chart_png,
        })
    }

    pub fn subject(&self, latest: &Sample) -> String {
        format!(
            "Your {} Usage Report for {}",
            self.config.resource_name, latest.period_label
        )
    }

    fn chart_spec(&self, record: &IdentityRecord, shown: &[Sample]) -> ChartSpec {
        ChartSpec {
            title: format!(
                "{} - {} Data Usage",
                record.display_name, self.config.resource_name
            ),
            y_label: Y_AXIS_LABEL.to_string(),
            bars: shown
                .iter()
                .enumerate()
                .map(|(i, sample)| ChartBar {
                    label: sample.period_label.clone(),
                    value: sample.quantity.to_f64().unwrap_or(0.0),
                    color: BarColor::for_period(i),
                })
                .collect(),
        }
    }

    fn html_body(&self, record: &IdentityRecord, latest: &Sample, previous: Option<&Sample>) -> String {
        let c = &self.config;
        let resource = escape_html(&c.resource_name);
        let latest_month = escape_html(&latest.period_label);

        let mut body = String::with_capacity(2048);
        body.push_str("<html><head></head><body><p>");
        body.push_str(&format!("Hi {}!<br><br>", escape_html(&record.display_name)));
        body.push_str(&format!(
            "The {} is making personalized {} Usage Reports available to {} by email on a monthly basis.<br><br>",
            escape_html(&c.team_name),
            resource,
            escape_html(&c.audience)
        ));

        body.push_str(&format!(
            "Below, you will find a graph highlighting your {} usage for {}",
            resource, latest_month
        ));
        if let Some(previous) = previous {
            body.push_str(&format!(" and {}", escape_html(&previous.period_label)));
        }
        body.push_str(&format!(
            ". At the time the data usage snapshot was taken, your {} size was {} GB, \
             costing {} for the month of {}.",
            resource,
            format_gigabytes(latest.quantity),
            format_dollars(latest.cost),
            latest_month
        ));
        if let Some(previous) = previous {
            body.push_str(&format!(
                " In {}, you used {} GB at a cost of {}.",
                escape_html(&previous.period_label),
                format_gigabytes(previous.quantity),
                format_dollars(previous.cost)
            ));
        }

        body.push_str(&format!(
            r#"<br><br><img src="cid:{}" alt="Usage chart for {}">"#,
            CHART_CONTENT_ID, latest_month
        ));

        body.push_str("<br><br><b>Why is My Data Usage Important?</b><br>");
        body.push_str(&format!(
            "Data storage on the {} is expensive and billed at {} per GB, per month, \
             beyond the first {} GB. This communication is meant to raise awareness and \
             encourage you to proactively keep costs down.<br><br>",
            resource,
            format_dollars(PRICE_PER_GB_MONTH),
            FREE_ALLOWANCE_GB
        ));

        body.push_str(&format!(
            "<b>Did the size of your {} go up this month?</b><br>\
             Here are 3 simple actions to help you reduce your storage expense \"footprint\":\
             <ol>\
             <li>Delete duplicate files and old drafts (time suggested: 5-10 mins)</li>\
             <li><a href=\"{}\">Empty</a> your Recycle Bin (time suggested: 1 min)</li>\
             <li><a href=\"{}\">Move</a> your files to cloud storage (time suggested: 20 mins)</li>\
             </ol>",
            resource,
            escape_html(&c.recycle_bin_url),
            escape_html(&c.cloud_storage_url)
        ));

        body.push_str(&format!(
            "More suggestions on how to reduce can be found on our \
             <a href=\"{}\">Storage Tips and Information page</a>.<br><br>",
            escape_html(&c.storage_tips_url)
        ));
        body.push_str(&format!(
            "We welcome your questions, comments, and ideas! Connect with us at {}.<br><br>",
            escape_html(&self.contact_address)
        ));
        body.push_str(&format!("Signed,<br>{}<br></p>", escape_html(&c.signature)));
        body.push_str(
            "<p style=\"font-size: 10px\">If you do not wish to receive these emails, \
             please reply with the subject line \"unsubscribe\".</p>",
        );
        body.push_str("</body></html>");
        body
    }
}

fn format_gigabytes(quantity: Decimal) -> String {
    format!(
        "{:.2}",
        quantity.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}
