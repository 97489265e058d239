//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryOrchestration**: プロセス内のオーケストレーションサービス
//! - **LogNotifier**: alert をログに出す Notifier
//! - **RecordingNotifier**: alert を記録する Notifier（テスト用）
//!
//! # 本番用実装
//! 実際のワークフローサービスやメール送信の実装は別クレートに置き、
//! `OrchestrationService` / `Notifier` を実装して差し込みます。

pub mod inmem_orchestration;
pub mod notifier;

pub use self::inmem_orchestration::{ExecutionStatus, InMemoryOrchestration, RecordedResponse};
pub use self::notifier::{LogNotifier, RecordingNotifier};
