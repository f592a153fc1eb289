//! Debounced search box that mirrors its input into the `query` URL parameter.
//!
//! Each keystroke cancels the pending update and schedules a new one; only the
//! last keystroke of a burst reaches the URL. The URL is replaced, never pushed.
//!
//! [`SearchBox`] is the reference model for the browser script served as
//! `static/search.js`. The script must keep the same parameter names, the same
//! page reset and the same replace-only navigation; the server crate checks the
//! script against [`QUERY_PARAM`] and [`PAGE_PARAM`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const QUERY_PARAM: &str = "query";
pub const PAGE_PARAM: &str = "page";

/// Ordered, URL-encoded query parameters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchParams(Vec<(String, String)>);

impl SearchParams {
    pub fn parse(query_string: &str) -> Self {
        let raw = query_string.strip_prefix('?').unwrap_or(query_string);
        match serde_urlencoded::from_str::<Vec<(String, String)>>(raw) {
            Ok(pairs) => Self(pairs),
            Err(error) => {
                warn!(error = %error, "discarding malformed query string");
                Self::default()
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }

    /// Replaces the first `key` in place and drops any later duplicates,
    /// appending when the key is absent.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.0.iter().position(|(name, _)| name == key) {
            Some(index) => {
                self.0[index].1 = value;
                let mut seen = 0usize;
                self.0.retain(|(name, _)| {
                    if name != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn delete(&mut self, key: &str) {
        self.0.retain(|(name, _)| name != key);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_query_string(&self) -> String {
        serde_urlencoded::to_string(&self.0).unwrap_or_default()
    }
}

/// Current path and query of the page the search box lives on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Location {
    pub pathname: String,
    pub params: SearchParams,
}

impl Location {
    pub fn parse(url: &str) -> Self {
        match url.split_once('?') {
            Some((pathname, query)) => {
                Self { pathname: pathname.to_string(), params: SearchParams::parse(query) }
            }
            None => Self { pathname: url.to_string(), params: SearchParams::default() },
        }
    }

    pub fn href(&self) -> String {
        if self.params.is_empty() {
            self.pathname.clone()
        } else {
            format!("{}?{}", self.pathname, self.params.to_query_string())
        }
    }

    /// Location after searching for `term`. An empty term removes `query`.
    pub fn with_search(&self, term: &str) -> Self {
        let mut params = self.params.clone();
        if term.is_empty() {
            params.delete(QUERY_PARAM);
        } else {
            params.set(QUERY_PARAM, term);
        }
        if params.get(PAGE_PARAM).is_some() {
            params.set(PAGE_PARAM, "1");
        }
        Self { pathname: self.pathname.clone(), params }
    }
}

/// Router hook used to rewrite the address bar without adding history.
pub trait Navigator: Send + Sync + 'static {
    fn replace(&self, href: String);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchState {
    Idle,
    PendingDebounce,
}

/// Single-slot cancellable timer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    slot: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, slot: None }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Cancels whatever is pending and schedules `action`. A zero delay runs
    /// it immediately.
    pub fn schedule<F>(&mut self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        if self.delay.is_zero() {
            action();
            return;
        }

        let delay = self.delay;
        self.slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action();
        }));
    }

    /// Returns true when a pending action was dropped.
    pub fn cancel(&mut self) -> bool {
        match self.slot.take() {
            Some(handle) => {
                let pending = !handle.is_finished();
                handle.abort();
                pending
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot.as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct SearchBox<N: Navigator> {
    location: Arc<Mutex<Location>>,
    navigator: Arc<N>,
    debouncer: Debouncer,
    initial_value: String,
}

impl<N: Navigator> SearchBox<N> {
    pub fn new(current_url: &str, delay: Duration, navigator: Arc<N>) -> Self {
        let location = Location::parse(current_url);
        let initial_value = location.params.get(QUERY_PARAM).unwrap_or_default().to_string();
        Self {
            location: Arc::new(Mutex::new(location)),
            navigator,
            debouncer: Debouncer::new(delay),
            initial_value,
        }
    }

    /// Value the input shows on first render, taken from the URL.
    pub fn initial_value(&self) -> &str {
        &self.initial_value
    }

    pub fn state(&self) -> SearchState {
        if self.debouncer.is_pending() {
            SearchState::PendingDebounce
        } else {
            SearchState::Idle
        }
    }

    pub fn location(&self) -> Location {
        self.location.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn on_input(&mut self, term: impl Into<String>) {
        let term = term.into();
        let location = Arc::clone(&self.location);
        let navigator = Arc::clone(&self.navigator);

        self.debouncer.schedule(move || {
            let href = {
                let mut current = location.lock().unwrap_or_else(PoisonError::into_inner);
                *current = current.with_search(&term);
                current.href()
            };
            debug!(event_name = "search.url.replaced", href = %href, "search term applied");
            navigator.replace(href);
        });
    }
}
