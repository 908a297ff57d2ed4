use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use plotters::{
    coord::ranged1d::SegmentValue,
    prelude::*,
    style::{FontStyle, register_font},
};

use super::{ChartRenderer, ChartSpec, RenderError};
use crate::config::ChartConfig;

const FONT_FAMILY: &str = "usage-chart";

/// Draws bar charts into an RGB buffer with `plotters` and encodes them as PNG.
///
/// Text needs a font; without one the bars are drawn on their own.
pub struct BitmapChartRenderer {
    width: u32,
    height: u32,
    has_font: bool,
}

impl BitmapChartRenderer {
    pub fn from_config(config: &ChartConfig) -> Result<Self, RenderError> {
        let has_font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| RenderError::Font(format!("{}: {}", path.display(), e)))?;
                // The font registry only holds 'static data; loaded once per process.
                let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
                register_font(FONT_FAMILY, FontStyle::Normal, bytes)
                    .map_err(|_| RenderError::Font(format!("{}: unsupported font", path.display())))?;
                true
            }
            None => {
                tracing::info!("No chart font configured, charts will be drawn without text");
                false
            }
        };

        Ok(Self {
            width: config.width,
            height: config.height,
            has_font,
        })
    }

    fn draw(&self, spec: &ChartSpec, buffer: &mut [u8]) -> Result<(), RenderError> {
        let root = BitMapBackend::with_buffer(buffer, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_error)?;

        let count = spec.bars.len() as u32;
        let max = spec.bars.iter().map(|b| b.value).fold(0.0_f64, f64::max);
        let y_max = if max > 0.0 { max * 1.15 } else { 1.0 };

        let mut builder = ChartBuilder::on(&root);
        builder.margin(20);
        if self.has_font {
            builder
                .caption(&spec.title, (FONT_FAMILY, 22))
                .x_label_area_size(35)
                .y_label_area_size(60);
        }

        let mut chart = builder
            .build_cartesian_2d((0u32..count).into_segmented(), 0f64..y_max)
            .map_err(draw_error)?;

        if self.has_font {
            let labels: Vec<&str> = spec.bars.iter().map(|b| b.label.as_str()).collect();
            chart
                .configure_mesh()
                .disable_x_mesh()
                .y_desc(spec.y_label.as_str())
                .label_style((FONT_FAMILY, 14))
                .axis_desc_style((FONT_FAMILY, 16))
                .x_label_formatter(&|v| match v {
                    SegmentValue::CenterOf(i) => labels
                        .get(*i as usize)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    _ => String::new(),
                })
                .draw()
                .map_err(draw_error)?;
        }

        chart
            .draw_series(spec.bars.iter().enumerate().map(|(i, bar)| {
                let i = i as u32;
                let color = RGBColor(bar.color.0, bar.color.1, bar.color.2);
                let mut rect = Rectangle::new(
                    [(SegmentValue::Exact(i), 0.0), (SegmentValue::Exact(i + 1), bar.value)],
                    color.mix(0.9).filled(),
                );
                rect.set_margin(0, 0, 15, 15);
                rect
            }))
            .map_err(draw_error)?;

        root.present().map_err(draw_error)?;
        Ok(())
    }
}

fn draw_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Draw(e.to_string())
}

impl ChartRenderer for BitmapChartRenderer {
    fn render_png(&self, spec: &ChartSpec) -> Result<Vec<u8>, RenderError> {
        if spec.bars.is_empty() {
            return Err(RenderError::EmptyChart);
        }

        let mut buffer = vec![0u8; (self.width as usize) * (self.height as usize) * 3];
        self.draw(spec, &mut buffer)?;

        let image = RgbImage::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| RenderError::Encode("buffer does not match image size".into()))?;
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .map_err(|e| RenderError::Encode(e.to_string()))?;

        Ok(png.into_inner())
    }
}
