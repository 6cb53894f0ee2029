//! PNG Rendering

use crate::layout::{format_value, layout_rows, AxisScale, WaterfallRow};
use crate::ChartError;
use ab_glyph::{FontVec, PxScale};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_rect_mut, draw_line_segment_mut, draw_polygon_mut, draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use inference_engine::Explanation;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MIN_WIDTH: u32 = 320;
const MIN_HEIGHT: u32 = 200;

/// Fonts tried when none is configured
const FALLBACK_FONTS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
];

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const POSITIVE: Rgb<u8> = Rgb([255, 0, 81]);
const NEGATIVE: Rgb<u8> = Rgb([0, 139, 251]);
const TEXT: Rgb<u8> = Rgb([51, 51, 51]);
const AXIS: Rgb<u8> = Rgb([136, 136, 136]);
const GRID: Rgb<u8> = Rgb([230, 230, 230]);

/// Chart settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Image width (px)
    pub width: u32,
    /// Image height (px)
    pub height: u32,
    /// Rows shown before the tail is folded into "N other features"
    pub max_display: usize,
    /// TrueType font for labels
    pub font_path: Option<PathBuf>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            width: 700,
            height: 500,
            max_display: 10,
            font_path: None,
        }
    }
}

/// Waterfall renderer, reusable across requests
pub struct WaterfallChart {
    config: ChartConfig,
    font: Option<FontVec>,
}

impl std::fmt::Debug for WaterfallChart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaterfallChart")
            .field("config", &self.config)
            .field("font_loaded", &self.font.is_some())
            .finish()
    }
}

fn load_font(path: &Path) -> Result<FontVec, ChartError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ChartError::FontLoadError(format!("{}: {}", path.display(), e)))?;
    FontVec::try_from_vec(bytes)
        .map_err(|e| ChartError::FontLoadError(format!("{}: {}", path.display(), e)))
}

impl WaterfallChart {
    /// Create a renderer
    ///
    /// A configured font that fails to load is an error. Without a
    /// configured font the common system locations are tried, and if none
    /// exists the chart is drawn without text.
    pub fn new(config: ChartConfig) -> Result<Self, ChartError> {
        if config.width < MIN_WIDTH || config.height < MIN_HEIGHT {
            return Err(ChartError::InvalidSize {
                width: config.width,
                height: config.height,
                min_width: MIN_WIDTH,
                min_height: MIN_HEIGHT,
            });
        }
        if config.max_display == 0 {
            return Err(ChartError::InvalidConfig("max_display must be at least 1".to_string()));
        }

        let font = match &config.font_path {
            Some(path) => Some(load_font(path)?),
            None => FALLBACK_FONTS
                .iter()
                .map(Path::new)
                .filter(|p| p.exists())
                .find_map(|p| load_font(p).ok()),
        };

        if font.is_some() {
            info!("Waterfall chart {}x{} with labels", config.width, config.height);
        } else {
            warn!("No font available; waterfall charts will be drawn without labels");
        }

        Ok(Self { config, font })
    }

    /// Renderer that never draws text
    pub fn without_labels(config: ChartConfig) -> Result<Self, ChartError> {
        let mut chart = Self::new(ChartConfig {
            font_path: None,
            ..config
        })?;
        chart.font = None;
        Ok(chart)
    }

    /// Chart settings
    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Whether labels are drawn
    pub fn has_labels(&self) -> bool {
        self.font.is_some()
    }

    /// Render an explanation into PNG bytes
    pub fn render(&self, explanation: &Explanation) -> Result<Vec<u8>, ChartError> {
        let img = self.draw(explanation);

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        debug!("Rendered waterfall chart: {} bytes", png.len());

        Ok(png)
    }

    /// Draw into an RGB canvas
    pub fn draw(&self, explanation: &Explanation) -> RgbImage {
        let width = self.config.width;
        let height = self.config.height;
        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);

        let rows = layout_rows(explanation, self.config.max_display);

        let w = width as f64;
        let h = height as f64;
        let plot_left = (w * 0.40).round();
        let plot_right = w - 30.0;
        let plot_top = 40.0;
        let plot_bottom = h - 55.0;
        let row_height = (plot_bottom - plot_top) / rows.len().max(1) as f64;

        let scale = AxisScale::fit(
            &rows,
            explanation.base_value,
            explanation.output_value,
            plot_left,
            plot_right,
        );

        for i in 1..rows.len() {
            let y = (plot_top + row_height * i as f64) as f32;
            draw_line_segment_mut(&mut img, (plot_left as f32, y), (plot_right as f32, y), GRID);
        }

        // Reference lines at E[f(x)] and f(x)
        let base_x = scale.to_px(explanation.base_value) as f32;
        draw_line_segment_mut(
            &mut img,
            (base_x, plot_top as f32),
            (base_x, plot_bottom as f32),
            AXIS,
        );
        let output_x = scale.to_px(explanation.output_value) as f32;
        draw_line_segment_mut(
            &mut img,
            (output_x, (plot_top - 8.0) as f32),
            (output_x, (plot_top + row_height * 0.5) as f32),
            AXIS,
        );

        // Axis
        draw_line_segment_mut(
            &mut img,
            (plot_left as f32, plot_bottom as f32),
            (plot_right as f32, plot_bottom as f32),
            AXIS,
        );
        let ticks = scale.ticks(5);
        for tick in &ticks {
            let x = scale.to_px(*tick) as f32;
            draw_line_segment_mut(
                &mut img,
                (x, plot_bottom as f32),
                (x, (plot_bottom + 5.0) as f32),
                AXIS,
            );
        }

        for (i, row) in rows.iter().enumerate() {
            let top = plot_top + row_height * i as f64 + row_height * 0.2;
            let bottom = plot_top + row_height * (i + 1) as f64 - row_height * 0.2;
            self.draw_bar(&mut img, &scale, row, top, bottom);
        }

        if let Some(font) = &self.font {
            let label_scale = PxScale::from(13.0);
            let value_scale = PxScale::from(11.0);

            for (i, row) in rows.iter().enumerate() {
                let center = plot_top + row_height * (i as f64 + 0.5);
                let (tw, th) = text_size(label_scale, font, &row.label);
                let x = (plot_left - 10.0 - tw as f64).max(2.0);
                let y = center - th as f64 / 2.0;
                draw_text_mut(&mut img, TEXT, x as i32, y as i32, label_scale, font, &row.label);

                let text = format!("{:+.2}", row.shap);
                let color = if row.shap >= 0.0 { POSITIVE } else { NEGATIVE };
                let (vw, vh) = text_size(value_scale, font, &text);
                let end = scale.to_px(row.end);
                let x = if row.shap >= 0.0 {
                    end + 4.0
                } else {
                    end - 4.0 - vw as f64
                };
                let x = x.min(w - vw as f64 - 2.0).max(plot_left);
                let y = center - vh as f64 / 2.0;
                draw_text_mut(&mut img, color, x as i32, y as i32, value_scale, font, &text);
            }

            for tick in &ticks {
                let text = format_value((tick * 1000.0).round() / 1000.0);
                let (tw, _) = text_size(value_scale, font, &text);
                let x = scale.to_px(*tick) - tw as f64 / 2.0;
                draw_text_mut(
                    &mut img,
                    TEXT,
                    x as i32,
                    (plot_bottom + 8.0) as i32,
                    value_scale,
                    font,
                    &text,
                );
            }

            let base_text = format!("E[f(X)] = {:.3}", explanation.base_value);
            let (bw, _) = text_size(label_scale, font, &base_text);
            let x = (base_x as f64 - bw as f64 / 2.0).min(w - bw as f64 - 2.0).max(2.0);
            draw_text_mut(
                &mut img,
                TEXT,
                x as i32,
                (plot_bottom + 26.0) as i32,
                label_scale,
                font,
                &base_text,
            );

            let output_text = format!("f(x) = {:.3}", explanation.output_value);
            let (ow, oh) = text_size(label_scale, font, &output_text);
            let x = (output_x as f64 - ow as f64 / 2.0).min(w - ow as f64 - 2.0).max(2.0);
            draw_text_mut(
                &mut img,
                TEXT,
                x as i32,
                (plot_top - 12.0 - oh as f64) as i32,
                label_scale,
                font,
                &output_text,
            );
        }

        img
    }

    /// Arrow-shaped bar from `row.start` to `row.end`
    fn draw_bar(&self, img: &mut RgbImage, scale: &AxisScale, row: &WaterfallRow, top: f64, bottom: f64) {
        let color = if row.shap >= 0.0 { POSITIVE } else { NEGATIVE };
        let x0 = scale.to_px(row.start).round();
        let x1 = scale.to_px(row.end).round();
        let length = (x1 - x0).abs();
        let thickness = (bottom - top).max(1.0);

        if length < 3.0 {
            // Too short for an arrow head
            let left = x0.min(x1) as i32;
            let rect = Rect::at(left, top as i32).of_size(length.max(1.0) as u32, thickness as u32);
            draw_filled_rect_mut(img, rect, color);
            return;
        }

        let direction = if x1 > x0 { 1.0 } else { -1.0 };
        let tip = (thickness * 0.5).min(length);
        let neck = x1 - direction * tip;
        let mid = (top + bottom) / 2.0;

        let points = [
            Point::new(x0 as i32, top as i32),
            Point::new(neck as i32, top as i32),
            Point::new(x1 as i32, mid as i32),
            Point::new(neck as i32, bottom as i32),
            Point::new(x0 as i32, bottom as i32),
        ];
        draw_polygon_mut(img, &points, color);
    }
}
