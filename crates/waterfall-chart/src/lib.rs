//! Waterfall Chart Rendering
//!
//! Draws a SHAP waterfall plot for a single [`Explanation`] into an
//! in-memory PNG suitable for embedding as a data URI.
//!
//! [`Explanation`]: inference_engine::Explanation

mod layout;
mod render;

pub use layout::{layout_rows, AxisScale, WaterfallRow};
pub use render::{ChartConfig, WaterfallChart};

use base64::Engine;
use thiserror::Error;

/// Errors while rendering a chart
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Font load failed: {0}")]
    FontLoadError(String),
    #[error("Invalid chart size {width}x{height} (minimum {min_width}x{min_height})")]
    InvalidSize {
        width: u32,
        height: u32,
        min_width: u32,
        min_height: u32,
    },
    #[error("Invalid chart configuration: {0}")]
    InvalidConfig(String),
    #[error("PNG encoding failed: {0}")]
    EncodeError(#[from] image::ImageError),
}

/// Embed PNG bytes as a `data:` URI
pub fn to_data_uri(png: &[u8]) -> String {
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    )
}
