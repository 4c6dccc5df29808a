//! Navigation seam between the client and whatever shows pages.

use std::sync::{Mutex, PoisonError};

/// Where the user is, and how to send them somewhere else.
///
/// The interceptor reads [`Navigator::current_path`] to skip refresh on public
/// pages and calls [`Navigator::navigate`] to force sign-in.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn navigate(&self, path: &str);
}

/// In-process navigator that records every forced navigation.
pub struct MemoryNavigator {
    inner: Mutex<NavigationLog>,
}

struct NavigationLog {
    current: String,
    history: Vec<String>,
}

impl MemoryNavigator {
    #[must_use]
    pub fn new(initial: &str) -> Self {
        Self {
            inner: Mutex::new(NavigationLog {
                current: initial.to_owned(),
                history: Vec::new(),
            }),
        }
    }

    /// Move to `path` as the user would (typing a URL, following a link).
    /// Not recorded in [`MemoryNavigator::history`].
    pub fn visit(&self, path: &str) {
        self.lock().current = path.to_owned();
    }

    /// Paths passed to [`Navigator::navigate`], oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavigationLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.lock().current.clone()
    }

    fn navigate(&self, path: &str) {
        let mut log = self.lock();
        log.current = path.to_owned();
        log.history.push(path.to_owned());
    }
}
