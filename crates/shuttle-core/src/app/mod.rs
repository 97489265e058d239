//! App - アプリケーション層
//!
//! ports を組み合わせて decider / worker のロジックを実装します。
//!
//! # 主要コンポーネント
//! - **DeciderLoop**: decision task の polling と unit ごとの fan-out
//! - **FirstDecidableInterpreter**: history から次の decision を 1 つ決める
//! - **ActivityWorker**: activity task の polling と実行
//! - **ActivityRegistry**: activity 名 → handler の対応表

pub mod decider_loop;
pub mod interpreter;
pub mod registry;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::decider_loop::DeciderLoop;
pub use self::interpreter::{
    ACTIVITY_TIMEOUT_ALERT, FirstDecidableInterpreter, HELPDESK_NOTIFIED_MARKER,
    InterpreterSettings,
};
pub use self::registry::ActivityRegistry;
pub use self::worker_loop::ActivityWorker;
