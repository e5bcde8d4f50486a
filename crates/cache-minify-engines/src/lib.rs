//! Default engines for [`cache_minify`].
//!
//! - [`MinifyHtmlEngine`]: HTML through [minify-html](https://docs.rs/minify-html)
//! - [`LightningCss`]: CSS through [lightningcss](https://docs.rs/lightningcss)
//! - [`OxcJs`]: JavaScript through [oxc](https://docs.rs/oxc)

use std::sync::Arc;

use cache_minify::{PageMinifier, Settings};

mod css;
mod html;
mod js;

pub use css::LightningCss;
pub use html::MinifyHtmlEngine;
pub use js::OxcJs;

/// A [`PageMinifier`] wired to the default engines.
pub fn page_minifier(settings: Arc<Settings>) -> PageMinifier {
    PageMinifier::new(
        settings,
        Arc::new(MinifyHtmlEngine::default()),
        Arc::new(LightningCss),
        Arc::new(OxcJs),
    )
}
