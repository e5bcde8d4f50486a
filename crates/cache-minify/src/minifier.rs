//! Minifier capabilities and the page minification pipeline.

use std::borrow::Cow;
use std::sync::Arc;

use crate::settings::Settings;
use crate::skip::{self, SkipMarkers};
use crate::{MinifyError, Result};

/// Minifies a stylesheet, e.g. the body of a `<style>` element.
pub trait CssMinifier: Send + Sync {
    fn minify_css(&self, css: &str) -> std::result::Result<String, MinifyError>;
}

/// Minifies a script, e.g. the body of a `<script>` element.
pub trait JsMinifier: Send + Sync {
    fn minify_js(&self, js: &str) -> std::result::Result<String, MinifyError>;
}

/// The CSS/JS minifiers an [`HtmlMinifier`] hands embedded code to.
#[derive(Clone, Copy)]
pub struct Embedded<'a> {
    pub css: &'a dyn CssMinifier,
    pub js: &'a dyn JsMinifier,
}

/// Minifies a whole HTML document.
///
/// Implementations should run `<style>` bodies through `embedded.css` and
/// `<script>` bodies through `embedded.js`.
pub trait HtmlMinifier: Send + Sync {
    fn minify_html(&self, html: &str, embedded: &Embedded<'_>) -> std::result::Result<String, MinifyError>;
}

/// Returns its input untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl CssMinifier for Passthrough {
    fn minify_css(&self, css: &str) -> std::result::Result<String, MinifyError> {
        Ok(css.to_owned())
    }
}

impl JsMinifier for Passthrough {
    fn minify_js(&self, js: &str) -> std::result::Result<String, MinifyError> {
        Ok(js.to_owned())
    }
}

impl HtmlMinifier for Passthrough {
    fn minify_html(&self, html: &str, _embedded: &Embedded<'_>) -> std::result::Result<String, MinifyError> {
        Ok(html.to_owned())
    }
}

/// Minifies pages while leaving skip regions alone.
///
/// Each [`transform`](Self::transform) runs:
/// 1. the gate: disabled (or force-disabled) settings return the page as is
/// 2. [`skip::protect`] to swap skip regions for placeholders
/// 3. the HTML minifier, with the CSS/JS minifiers for embedded code
/// 4. [`skip::restore`] to put the regions back
pub struct PageMinifier {
    settings: Arc<Settings>,
    markers: SkipMarkers,
    html: Arc<dyn HtmlMinifier>,
    css: Arc<dyn CssMinifier>,
    js: Arc<dyn JsMinifier>,
}

impl PageMinifier {
    pub fn new(
        settings: Arc<Settings>,
        html: Arc<dyn HtmlMinifier>,
        css: Arc<dyn CssMinifier>,
        js: Arc<dyn JsMinifier>,
    ) -> Self {
        Self {
            settings,
            markers: SkipMarkers::default(),
            html,
            css,
            js,
        }
    }

    /// Use a different marker pair than `<!--[minify_skip]-->`.
    pub fn with_markers(mut self, markers: SkipMarkers) -> Self {
        self.markers = markers;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn markers(&self) -> &SkipMarkers {
        &self.markers
    }

    /// Minify `html`, or borrow it back unchanged when minification is off.
    ///
    /// Minifier errors are returned as they are; serving the unminified page
    /// instead is up to the caller.
    pub fn transform<'a>(&self, html: &'a str) -> Result<Cow<'a, str>> {
        if !self.settings.is_enabled() {
            return Ok(Cow::Borrowed(html));
        }

        let protected = skip::protect(html, &self.markers)?;
        let embedded = Embedded {
            css: self.css.as_ref(),
            js: self.js.as_ref(),
        };
        let minified = self.html.minify_html(&protected.text, &embedded)?;
        let output = protected.restore(&minified);

        if protected.has_residue(&output) {
            tracing::warn!(
                regions = protected.regions.len(),
                "minifier altered a skip placeholder, some protected content was not restored"
            );
        }
        tracing::debug!(
            input = html.len(),
            output = output.len(),
            regions = protected.regions.len(),
            "minified page"
        );

        Ok(Cow::Owned(output))
    }
}
