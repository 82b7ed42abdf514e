use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::models::diagnostics::Diagnostic;
use crate::models::error::CaptureError;
use crate::traits::callbacks::ErrorCallback;

/// Diagnostics kept while no callback is registered.
pub const MAX_PENDING: usize = 64;

struct NotifierState {
    callback: Option<ErrorCallback>,
    pending: VecDeque<Diagnostic>,
}

/// Fans diagnostics out to the log and to the registered error callback.
///
/// Diagnostics raised before a callback exists are queued (oldest dropped
/// beyond [`MAX_PENDING`]) and flushed when one is registered. The callback
/// is invoked with the notifier lock held and must not register callbacks.
pub struct Notifier {
    inner: Mutex<NotifierState>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(NotifierState {
                callback: None,
                pending: VecDeque::new(),
            }),
        }
    }

    pub fn set_callback(&self, callback: Option<ErrorCallback>) {
        let mut state = self.inner.lock();
        state.callback = callback;
        if state.callback.is_some() {
            let pending: Vec<Diagnostic> = state.pending.drain(..).collect();
            if let Some(cb) = state.callback.as_ref() {
                for diagnostic in &pending {
                    cb(diagnostic);
                }
            }
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        let diagnostic = Diagnostic::info(message);
        log::info!("{}", diagnostic.message);
        self.emit(diagnostic);
    }

    pub fn error(&self, error: &CaptureError) {
        log::error!("{}", error);
        self.emit(Diagnostic::from_error(error));
    }

    pub fn emit(&self, diagnostic: Diagnostic) {
        let mut state = self.inner.lock();
        match state.callback.as_ref() {
            Some(cb) => cb(&diagnostic),
            None => {
                if state.pending.len() >= MAX_PENDING {
                    state.pending.pop_front();
                }
                state.pending.push_back(diagnostic);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
