//! shuttle-core
//!
//! Client-side building blocks for driving workflows on an external
//! orchestration service: a decider that turns history into decisions and a
//! worker that runs activities.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, history, decision, task）
//! - **ports**: 抽象化レイヤー（OrchestrationService, Notifier, Interpreter, Continuation, ActivityHandler, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（DeciderLoop, FirstDecidableInterpreter, ActivityWorker, ActivityRegistry）
//! - **impls**: 実装（InMemoryOrchestration, LogNotifier など開発用）
//! - **config**: decider / worker / alert の設定
//! - **error**: エラー型
//! - **observability**: idle loop の heartbeat

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
