//! Entry points for the cache host.
//!
//! The host calls these from its own hooks: the output buffer filter, the
//! per-request visitor check and the settings page. Nonce/CSRF checks and
//! form markup stay on the host side.

use std::sync::Arc;

use crate::Result;
use crate::minifier::PageMinifier;

/// What the settings page needs to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsView {
    pub enabled: bool,
    /// Set once the value was changed during this process
    pub notice: Option<String>,
}

#[derive(Clone)]
pub struct CacheHooks {
    minifier: Arc<PageMinifier>,
}

impl CacheHooks {
    pub fn new(minifier: Arc<PageMinifier>) -> Self {
        Self { minifier }
    }

    pub fn minifier(&self) -> &PageMinifier {
        &self.minifier
    }

    /// Buffer filter: the minified page, or the original page if the
    /// minifier failed.
    pub fn filter_buffer(&self, html: String) -> String {
        match self.minifier.transform(&html) {
            Ok(std::borrow::Cow::Borrowed(_)) => html,
            Ok(std::borrow::Cow::Owned(minified)) => minified,
            Err(e) => {
                tracing::warn!(error = %e, "minification failed, serving page unminified");
                html
            }
        }
    }

    /// Visitor check: exempt visitors turn minification off for the rest of
    /// the process.
    pub fn check_caller(&self, exempt: bool) {
        if exempt {
            self.minifier.settings().force_disable();
        }
    }

    /// Settings submit, called after the host verified the request.
    pub fn apply_posted_setting(&self, raw: &str) -> Result<()> {
        self.minifier.settings().set(posted_flag(raw))
    }

    pub fn settings_view(&self) -> SettingsView {
        let settings = self.minifier.settings();
        SettingsView {
            enabled: settings.enabled(),
            notice: settings.notice(),
        }
    }
}

/// Interpret a posted form value as a boolean.
///
/// Empty, `0`, `false`, `off` and `no` are false; anything else is true.
/// This is stricter than a PHP `(bool)` cast, which reads `"false"`, `"off"`
/// and `"no"` as true.
pub fn posted_flag(raw: &str) -> bool {
    let value = raw.trim();
    !(value.is_empty()
        || value == "0"
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("off")
        || value.eq_ignore_ascii_case("no"))
}
