//! Error and toast routing
//!
//! A rejected mutation is either a genuine error or an opaque non-error
//! value thrown by the transport. Genuine errors go to the
//! [`ErrorReporter`] with the call site's tags; either kind may raise a
//! transient [`Toast`] according to the call site's [`ToastPolicy`].

use crate::error::{MutationError, NetworkError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

/// Default toast display time
pub const DEFAULT_TOAST_DURATION: Duration = Duration::from_secs(4);

/// What a rejection carried
#[derive(Debug, Clone, Copy)]
pub enum Rejection<'a> {
    /// A real error
    Error(&'a MutationError),
    /// A thrown value that is not an error
    Opaque(&'a Value),
}

impl<'a> Rejection<'a> {
    /// Classify a mutation error
    #[must_use]
    pub fn classify(error: &'a MutationError) -> Self {
        match error {
            MutationError::Network(NetworkError::Rejected(value)) => Self::Opaque(value),
            other => Self::Error(other),
        }
    }
}

/// Toast to raise on rejection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastPolicy {
    /// No toast
    #[default]
    Silent,
    /// Fixed message
    Message(String),
    /// The error's own message
    ErrorText,
}

/// Call-site context attached to reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    /// Operation or call-site name
    pub operation: String,
    /// Reporter tags (e.g. affected entity ids)
    pub tags: BTreeMap<String, String>,
    /// Toast behavior
    pub toast: ToastPolicy,
}

impl ErrorContext {
    /// Context for `operation`
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// With a reporter tag
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// With toast policy
    #[must_use]
    pub fn with_toast(mut self, toast: ToastPolicy) -> Self {
        self.toast = toast;
        self
    }
}

/// Toast severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToastKind {
    /// Failure
    Error,
    /// Neutral
    Info,
    /// Success
    Success,
}

/// User-visible transient message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    /// Text
    pub message: String,
    /// Severity
    pub kind: ToastKind,
    /// Display time
    pub duration: Duration,
}

impl Toast {
    /// Error toast with the default duration
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: ToastKind::Error,
            duration: DEFAULT_TOAST_DURATION,
        }
    }

    /// With display time
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Error-tracking sink
pub trait ErrorReporter: Send + Sync {
    /// Report `error` with `context`
    fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext);
}

/// Toast surface
pub trait ToastSink: Send + Sync {
    /// Show `toast`
    fn push(&self, toast: Toast);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext) {
        tracing::error!(
            operation = %context.operation,
            tags = ?context.tags,
            error = %error,
            "mutation failed"
        );
    }
}

/// Toast sink that logs instead of displaying
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingToasts;

impl ToastSink for TracingToasts {
    fn push(&self, toast: Toast) {
        tracing::info!(kind = ?toast.kind, message = %toast.message, "toast");
    }
}

/// Routes rejections to the reporter and the toast sink
#[derive(Clone)]
pub struct ErrorRouter {
    reporter: Arc<dyn ErrorReporter>,
    toasts: Arc<dyn ToastSink>,
    toast_duration: Duration,
}

impl ErrorRouter {
    /// Create router
    #[must_use]
    pub fn new(reporter: Arc<dyn ErrorReporter>, toasts: Arc<dyn ToastSink>) -> Self {
        Self {
            reporter,
            toasts,
            toast_duration: DEFAULT_TOAST_DURATION,
        }
    }

    /// With toast display time
    #[must_use]
    pub fn with_toast_duration(mut self, duration: Duration) -> Self {
        self.toast_duration = duration;
        self
    }

    /// Route a mutation rejection
    pub fn route(&self, rejection: &Rejection<'_>, context: &ErrorContext) {
        match rejection {
            Rejection::Error(error) => {
                self.reporter.report(*error, context);
                self.toast(&error.to_string(), context);
            }
            Rejection::Opaque(value) => {
                tracing::debug!(operation = %context.operation, %value, "non-error rejection");
                self.toast(&value.to_string(), context);
            }
        }
    }

    /// Route an error raised by the call site itself
    pub fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext) {
        self.reporter.report(error, context);
        self.toast(&error.to_string(), context);
    }

    fn toast(&self, error_text: &str, context: &ErrorContext) {
        let message = match &context.toast {
            ToastPolicy::Silent => return,
            ToastPolicy::Message(message) => message.clone(),
            ToastPolicy::ErrorText => error_text.to_string(),
        };
        self.toasts
            .push(Toast::error(message).with_duration(self.toast_duration));
    }
}

impl Default for ErrorRouter {
    fn default() -> Self {
        Self::new(Arc::new(TracingReporter), Arc::new(TracingToasts))
    }
}

impl std::fmt::Debug for ErrorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRouter")
            .field("toast_duration", &self.toast_duration)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Capture {
        reports: Mutex<Vec<(String, ErrorContext)>>,
        toasts: Mutex<Vec<Toast>>,
    }

    impl ErrorReporter for Capture {
        fn report(&self, error: &(dyn Error + 'static), context: &ErrorContext) {
            self.reports.lock().push((error.to_string(), context.clone()));
        }
    }

    impl ToastSink for Capture {
        fn push(&self, toast: Toast) {
            self.toasts.lock().push(toast);
        }
    }

    fn router() -> (ErrorRouter, Arc<Capture>) {
        let capture = Arc::new(Capture::default());
        let router = ErrorRouter::new(capture.clone(), capture.clone());
        (router, capture)
    }

    #[test]
    fn errors_are_reported_with_tags() {
        let (router, capture) = router();
        let error = MutationError::UnknownOperation("FollowUserMutation".into());
        let context = ErrorContext::new("follow").with_tag("userId", "u1");
        router.route(&Rejection::classify(&error), &context);

        let reports = capture.reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1.tags["userId"], "u1");
        assert!(capture.toasts.lock().is_empty());
    }

    #[test]
    fn opaque_values_only_toast() {
        let (router, capture) = router();
        let error = MutationError::Network(NetworkError::Rejected(json!("nope")));
        let context = ErrorContext::new("follow")
            .with_toast(ToastPolicy::Message("Could not follow".into()));
        let rejection = Rejection::classify(&error);
        assert!(matches!(rejection, Rejection::Opaque(_)));
        router.route(&rejection, &context);

        assert!(capture.reports.lock().is_empty());
        let toasts = capture.toasts.lock();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].message, "Could not follow");
        assert_eq!(toasts[0].kind, ToastKind::Error);
    }

    #[test]
    fn error_text_policy_uses_message() {
        let (router, capture) = router();
        let router = router.with_toast_duration(Duration::from_secs(1));
        let error = MutationError::UnknownOperation("X".into());
        let context = ErrorContext::new("x").with_toast(ToastPolicy::ErrorText);
        router.route(&Rejection::classify(&error), &context);

        let toasts = capture.toasts.lock();
        assert_eq!(toasts[0].message, error.to_string());
        assert_eq!(toasts[0].duration, Duration::from_secs(1));
    }
}
