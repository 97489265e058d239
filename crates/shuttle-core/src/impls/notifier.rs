//! Notifier 実装
//!
//! - **LogNotifier**: alert を warn ログとして出すだけ（メール送信の代わり）
//! - **RecordingNotifier**: 送られた alert を保持する（テスト用）

use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use crate::error::NotifyError;
use crate::ports::{Notification, Notifier};

/// Writes each alert to the log at WARN level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError> {
        warn!(
            from = %notification.from,
            to = %notification.to,
            subject = %notification.subject,
            body = %notification.body,
            "operator alert"
        );
        Ok(())
    }
}

/// Keeps every alert it is given.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut sent = self.sent.lock().map_err(|_| NotifyError {
            to: notification.to.clone(),
            message: "recording notifier poisoned".to_string(),
        })?;
        sent.push(notification.clone());
        Ok(())
    }
}
