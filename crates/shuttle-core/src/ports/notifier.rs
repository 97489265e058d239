//! Notifier port - 運用者へのアラート送信
//!
//! 送信は best-effort: 失敗はログに残すだけで、呼び出し側には伝播させません。

use async_trait::async_trait;

use crate::error::NotifyError;

/// One operator alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_notification(&self, notification: &Notification) -> Result<(), NotifyError>;
}
