//! In-memory navigation history.
//!
//! Stands in for the browser history: it tracks the current location and
//! the entry stack, and guards every pushed or extracted target so the
//! client never navigates off its own origin.

use std::sync::{Mutex, PoisonError};

use reqwest::Url;

use super::{History, Location, Navigation};
use crate::config::{AuthConfig, REDIRECT_PARAM};

struct Entries {
    stack: Vec<String>,
}

pub struct MemoryHistory {
    config: AuthConfig,
    entries: Mutex<Entries>,
}

impl MemoryHistory {
    /// Start at `initial`, which must be a client route or same-origin URL.
    #[must_use]
    pub fn new(config: AuthConfig, initial: &str) -> Self {
        let history = Self { config, entries: Mutex::new(Entries { stack: Vec::new() }) };
        let start = history.ensure_safe_route(initial);
        history.lock().stack.push(start);
        history
    }

    /// Current URL, as last pushed.
    #[must_use]
    pub fn current(&self) -> String {
        self.lock().stack.last().cloned().unwrap_or_default()
    }

    /// Number of back-navigable entries, including the current one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().stack.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().stack.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn absolute(&self, url: &str) -> Option<Url> {
        self.config.url("/").join(url).ok()
    }

    /// Same-origin check. Relative paths and URLs under the base are safe;
    /// protocol-relative (`//host`) and foreign origins are not.
    fn is_safe(&self, url: &str) -> bool {
        let trimmed = url.trim();
        if trimmed.is_empty() || trimmed.starts_with("//") || trimmed.starts_with("/\\") {
            return false;
        }
        let Some(parsed) = self.absolute(trimmed) else {
            return false;
        };
        let base = self.config.url("/");
        parsed.origin() == base.origin()
    }

    fn ensure_safe_route(&self, url: &str) -> String {
        if self.is_safe(url) {
            url.trim().to_owned()
        } else {
            tracing::warn!(%url, "refusing navigation to foreign url");
            self.config.app_route().to_owned()
        }
    }
}

impl History for MemoryHistory {
    fn push(&self, url: &str, navigation: Navigation) {
        let target = self.ensure_safe_route(url);
        tracing::debug!(%target, ?navigation, "navigate");
        let mut entries = self.lock();
        if navigation == Navigation::Replace {
            entries.stack.pop();
        }
        entries.stack.push(target);
    }

    fn extract_redirect(&self) -> String {
        let current = self.current();
        let redirect = self.absolute(&current).and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == REDIRECT_PARAM)
                .map(|(_, value)| value.into_owned())
        });
        match redirect {
            Some(target) if !target.trim().is_empty() => self.ensure_safe_route(&target),
            _ => self.config.app_route().to_owned(),
        }
    }

    fn ensure_base_url(&self, url: &str) -> String {
        let base = self.config.base_url();
        if url.starts_with(base) {
            return url.to_owned();
        }
        if url.starts_with('/') { format!("{base}{url}") } else { format!("{base}/{url}") }
    }

    fn create_redirect(&self, location: &Location) -> String {
        self.ensure_base_url(&location.to_string())
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
