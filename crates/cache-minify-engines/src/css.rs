//! CSS minification via lightningcss.

use cache_minify::{CssMinifier, MinifyError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};

/// Parses, minifies and prints stylesheets with lightningcss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightningCss;

impl CssMinifier for LightningCss {
    fn minify_css(&self, css: &str) -> Result<String, MinifyError> {
        let mut stylesheet = StyleSheet::parse(css, ParserOptions::default())
            .map_err(|e| MinifyError::new("css", format!("failed to parse CSS: {e}")))?;

        stylesheet
            .minify(MinifyOptions::default())
            .map_err(|e| MinifyError::new("css", format!("failed to minify CSS: {e}")))?;

        let printer_options = PrinterOptions {
            minify: true,
            ..Default::default()
        };
        stylesheet
            .to_css(printer_options)
            .map(|result| result.code)
            .map_err(|e| MinifyError::new("css", format!("failed to serialize CSS: {e}")))
    }
}
