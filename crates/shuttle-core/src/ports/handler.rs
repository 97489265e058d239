//! ActivityHandler port - activity の業務ロジック
//!
//! handler は利用者が実装します。worker は戻り値を
//! TaskCompleted / TaskFailed に変換するだけです。

use async_trait::async_trait;

use crate::error::HandlerError;

/// Executes one activity.
///
/// # 使用例
/// ```ignore
/// struct LoadData;
///
/// #[async_trait]
/// impl ActivityHandler for LoadData {
///     async fn handle(&self, _activity: &str, input: &str) -> Result<String, HandlerError> {
///         Ok(input.to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    async fn handle(&self, activity: &str, input: &str) -> Result<String, HandlerError>;
}
