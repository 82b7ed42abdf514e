use crate::models::diagnostics::Diagnostic;
use crate::models::frame::Frame;

/// Callback invoked for every delivered frame.
///
/// Runs on the capture thread. The frame and its planes are only valid for
/// the duration of the call. Must not call `stop` or `close` on the provider
/// that invoked it.
pub type FrameCallback = Box<dyn FnMut(&Frame<'_>) + Send + 'static>;

/// Callback invoked with errors and informational diagnostics.
///
/// May fire from the capture thread or from the thread driving the provider.
pub type ErrorCallback = Box<dyn Fn(&Diagnostic) + Send + Sync + 'static>;
