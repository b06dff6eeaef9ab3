//! Stylesheet import coordination.
//!
//! Stylesheets are added as `@import` rules on a single carrier sheet. Each
//! URL has at most one rule outstanding: callers arriving while an import is
//! pending wait on it, and a committed URL is never imported again.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::Duration;

use relay_core::WorkerConfig;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::host::{import_rule, ImportSheet, SheetError, StyleDocument};

/// Default selector of the carrier sheet's owner element.
pub const DEFAULT_CARRIER_SELECTOR: &str = "#import-sheet";

/// Default bound on waiting for a carrier signal.
pub const DEFAULT_IMPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error adding a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StyleError {
    /// No carrier sheet matches the configured selector.
    #[error("import carrier sheet not found: {0}")]
    CarrierNotFound(String),

    /// The carrier refused the import rule.
    #[error("failed to insert import rule for {url}: {source}")]
    Insert { url: String, source: SheetError },
}

/// How an `add_stylesheet` call resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The import completed and its rules are readable.
    Loaded,
    /// The URL had already been imported; nothing changed.
    AlreadyLoaded,
    /// The import finished but its sheet is unreadable; the rule was removed.
    Failed,
    /// No signal arrived in time; the rule was removed.
    TimedOut,
}

impl ImportOutcome {
    /// Whether the stylesheet is applied.
    pub fn is_applied(self) -> bool {
        matches!(self, Self::Loaded | Self::AlreadyLoaded)
    }
}

impl std::fmt::Display for ImportOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::AlreadyLoaded => write!(f, "already loaded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Load or error event fired by the carrier sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierSignal {
    Load,
    Error,
}

struct PendingImport {
    rule_text: String,
    waiters: Vec<oneshot::Sender<ImportOutcome>>,
    timer: Option<AbortHandle>,
}

impl PendingImport {
    fn resolve(self, outcome: ImportOutcome) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        for waiter in self.waiters {
            let _ = waiter.send(outcome);
        }
    }
}

#[derive(Default)]
struct ImportState {
    committed: HashSet<String>,
    pending: HashMap<String, PendingImport>,
}

struct Inner {
    document: Arc<dyn StyleDocument>,
    selector: String,
    timeout: Duration,
    carrier: OnceLock<Arc<dyn ImportSheet>>,
    state: Mutex<ImportState>,
}

/// Adds stylesheets to a document through its carrier sheet.
///
/// Cloning shares the same carrier and import state.
#[derive(Clone)]
pub struct StyleImporter {
    inner: Arc<Inner>,
}

impl StyleImporter {
    /// Create an importer with the default selector and timeout.
    pub fn new(document: Arc<dyn StyleDocument>) -> Self {
        Self::with_settings(document, DEFAULT_CARRIER_SELECTOR, DEFAULT_IMPORT_TIMEOUT)
    }

    /// Create an importer using the carrier selector and import timeout of `config`.
    pub fn from_config(document: Arc<dyn StyleDocument>, config: &WorkerConfig) -> Self {
        Self::with_settings(
            document,
            config.carrier_selector.clone(),
            config.style_import_timeout(),
        )
    }

    /// Create an importer with an explicit selector and timeout.
    pub fn with_settings(
        document: Arc<dyn StyleDocument>,
        selector: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                document,
                selector: selector.into(),
                timeout,
                carrier: OnceLock::new(),
                state: Mutex::new(ImportState::default()),
            }),
        }
    }

    /// Add the stylesheet at `url`.
    ///
    /// Resolves once the import is committed, fails, or times out. Only a
    /// missing carrier or a refused rule is an error.
    pub async fn add_stylesheet(&self, url: &str) -> Result<ImportOutcome, StyleError> {
        let receiver = {
            let mut state = self.inner.lock();
            if state.committed.contains(url) {
                debug!(url, "stylesheet already committed");
                return Ok(ImportOutcome::AlreadyLoaded);
            }

            let (sender, receiver) = oneshot::channel();
            if let Some(pending) = state.pending.get_mut(url) {
                debug!(url, waiters = pending.waiters.len(), "joining pending import");
                pending.waiters.push(sender);
            } else {
                let carrier = self.inner.carrier()?;
                let rule_text = import_rule(url);
                carrier
                    .insert_rule(&rule_text, carrier.rules().len())
                    .map_err(|source| StyleError::Insert {
                        url: url.to_string(),
                        source,
                    })?;

                let timer = self.start_timer(url);
                state.pending.insert(
                    url.to_string(),
                    PendingImport {
                        rule_text,
                        waiters: vec![sender],
                        timer: Some(timer),
                    },
                );
                debug!(url, "import rule inserted");
            }
            receiver
        };

        Ok(receiver.await.unwrap_or(ImportOutcome::Failed))
    }

    /// Handle a load or error event from the carrier sheet.
    ///
    /// Every pending import whose nested sheet is attached is settled: a
    /// readable sheet commits the URL, an unreadable one removes its rule.
    /// Imports without an attached sheet stay pending.
    pub fn on_carrier_signal(&self, signal: CarrierSignal) {
        let Some(carrier) = self.inner.carrier.get() else {
            return;
        };

        let mut settled = Vec::new();
        {
            let mut state = self.inner.lock();
            let mut failed_indices = Vec::new();

            for (index, rule) in carrier.rules().into_iter().enumerate() {
                let Some(sheet) = rule.sheet else { continue };
                let Some(pending) = state.pending.remove(&rule.href) else {
                    continue;
                };

                match sheet.css_rules() {
                    Ok(_) => {
                        state.committed.insert(rule.href.clone());
                        info!(url = %rule.href, ?signal, "stylesheet imported");
                        settled.push((pending, ImportOutcome::Loaded));
                    }
                    Err(e) => {
                        warn!(url = %rule.href, ?signal, error = %e, "stylesheet import failed");
                        failed_indices.push(index);
                        settled.push((pending, ImportOutcome::Failed));
                    }
                }
            }

            for index in failed_indices.into_iter().rev() {
                if let Err(e) = carrier.delete_rule(index) {
                    warn!(index, error = %e, "failed to remove import rule");
                }
            }
        }

        for (pending, outcome) in settled {
            pending.resolve(outcome);
        }
    }

    /// Whether `url` has been committed.
    pub fn is_loaded(&self, url: &str) -> bool {
        self.inner.lock().committed.contains(url)
    }

    /// Whether an import of `url` is awaiting a signal.
    pub fn is_pending(&self, url: &str) -> bool {
        self.inner.lock().pending.contains_key(url)
    }

    fn start_timer(&self, url: &str) -> AbortHandle {
        let inner = Arc::downgrade(&self.inner);
        let timeout = self.inner.timeout;
        let url = url.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            expire(inner, &url);
        })
        .abort_handle()
    }
}

impl std::fmt::Debug for StyleImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("StyleImporter")
            .field("selector", &self.inner.selector)
            .field("committed", &state.committed.len())
            .field("pending", &state.pending.len())
            .finish()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, ImportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn carrier(&self) -> Result<&Arc<dyn ImportSheet>, StyleError> {
        if let Some(carrier) = self.carrier.get() {
            return Ok(carrier);
        }
        let found = self
            .document
            .find_sheet(&self.selector)
            .ok_or_else(|| StyleError::CarrierNotFound(self.selector.clone()))?;
        Ok(self.carrier.get_or_init(|| found))
    }
}

/// Revert an import that received no signal in time.
fn expire(inner: Weak<Inner>, url: &str) {
    let Some(inner) = inner.upgrade() else {
        return;
    };

    let pending = {
        let mut state = inner.lock();
        let Some(mut pending) = state.pending.remove(url) else {
            return;
        };
        pending.timer = None;

        if let Some(carrier) = inner.carrier.get() {
            let position = carrier
                .rules()
                .iter()
                .position(|rule| rule.css_text == pending.rule_text);
            if let Some(index) = position {
                if let Err(e) = carrier.delete_rule(index) {
                    warn!(url, error = %e, "failed to remove timed out import rule");
                }
            }
        }
        pending
    };

    warn!(url, timeout = ?inner.timeout, "stylesheet import timed out");
    pending.resolve(ImportOutcome::TimedOut);
}
