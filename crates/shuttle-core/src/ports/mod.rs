//! Ports - 抽象化レイヤー
//!
//! 外部システム（オーケストレーションサービス、通知）と
//! 利用者が差し込むロジック（handler, continuation）へのインターフェース。

pub mod clock;
pub mod decider;
pub mod handler;
pub mod id_generator;
pub mod notifier;
pub mod orchestration;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::decider::{Continuation, ContinuationFn, Interpretation, Interpreter};
pub use self::handler::ActivityHandler;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::notifier::{Notification, Notifier};
pub use self::orchestration::{OrchestrationService, PollForActivityTask, PollForDecisionTask};
