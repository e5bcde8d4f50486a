//! Minification of cached pages with author-protected regions.
//!
//! Pages go through an injected HTML minifier (which hands `<style>` and
//! `<script>` bodies to injected CSS/JS minifiers), except for regions the
//! author wrapped in skip markers, which come out byte-for-byte as they went
//! in:
//!
//! ```html
//! <!--[minify_skip]-->
//! <pre>  formatted   exactly   like this  </pre>
//! <!--[/minify_skip]-->
//! ```
//!
//! Whether anything happens at all is governed by [`Settings`], a persisted
//! on/off switch plus a per-process caller exemption.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cache_minify::{MemoryStore, PageMinifier, Passthrough, Settings};
//!
//! let settings = Arc::new(Settings::new(Arc::new(MemoryStore::new())));
//! settings.set(true)?;
//!
//! let minifier = PageMinifier::new(
//!     settings,
//!     Arc::new(Passthrough),
//!     Arc::new(Passthrough),
//!     Arc::new(Passthrough),
//! );
//! let page = minifier.transform("<p>a</p><!--[minify_skip]--> b <!--[/minify_skip]-->")?;
//! assert_eq!(page, "<p>a</p> b ");
//! # Ok::<(), cache_minify::Error>(())
//! ```

mod error;
pub mod hooks;
pub mod minifier;
pub mod settings;
pub mod skip;
pub mod store;

pub use error::{Error, MinifyError, StoreError};
pub use hooks::{CacheHooks, SettingsView};
pub use minifier::{CssMinifier, Embedded, HtmlMinifier, JsMinifier, PageMinifier, Passthrough};
pub use settings::{CONFIG_KEY, ConfigStore, MemoryStore, Settings};
pub use skip::{ProtectedRegion, SkipMarkers};
pub use store::LineFileStore;

/// Result type for minification and settings operations.
pub type Result<T> = std::result::Result<T, Error>;
