//! Usage chart rendering.
//!
//! Rendering is synchronous and entirely in memory: a [`ChartSpec`] goes in,
//! PNG bytes come out.

#[cfg(feature = "chart-png")]
mod bitmap;

#[cfg(feature = "chart-png")]
pub use bitmap::BitmapChartRenderer;
use thiserror::Error;

/// Bar colours, assigned to periods oldest first.
pub const PERIOD_PALETTE: [BarColor; 2] = [BarColor(0xe3, 0xa8, 0x2b), BarColor(0x23, 0x40, 0x75)];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarColor(pub u8, pub u8, pub u8);

impl BarColor {
    /// Palette colour for the bar at `index`, cycling if there are more bars
    /// than colours.
    pub fn for_period(index: usize) -> Self {
        PERIOD_PALETTE[index % PERIOD_PALETTE.len()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartBar {
    pub label: String,
    pub value: f64,
    pub color: BarColor,
}

/// What to draw: one bar per reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    pub y_label: String,
    pub bars: Vec<ChartBar>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Chart has no bars")]
    EmptyChart,

    #[error("Failed to draw chart: {0}")]
    Draw(String),

    #[error("Failed to encode chart: {0}")]
    Encode(String),

    #[error("Failed to load chart font: {0}")]
    Font(String),
}

pub trait ChartRenderer: Send + Sync {
    /// Render `spec` as a PNG image.
    fn render_png(&self, spec: &ChartSpec) -> Result<Vec<u8>, RenderError>;
}
