//! Transient user-facing notifications (toasts).

use tokio::sync::mpsc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

/// Sending side of the notification channel. Sends never fail: a dropped
/// receiver just means nobody is looking.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notice>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Notifier { tx: Some(tx) }, rx)
    }

    /// Notifier that only logs.
    pub fn silent() -> Self {
        Notifier { tx: None }
    }

    pub fn notify(&self, level: NoticeLevel, text: impl Into<String>) {
        let text = text.into();
        match level {
            NoticeLevel::Error => tracing::warn!(notice = %text, "error notice"),
            NoticeLevel::Warning => tracing::info!(notice = %text, "warning notice"),
            NoticeLevel::Info => tracing::debug!(notice = %text, "info notice"),
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(Notice { level, text });
        }
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.notify(NoticeLevel::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.notify(NoticeLevel::Error, text);
    }
}
