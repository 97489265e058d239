//! OrchestrationService port - 外部のワークフローサービス
//!
//! long-poll でタスクを受け取り、task token を使って結果を返します。
//! 実装は構築後 immutable で、並行に動く decision unit から
//! `Arc<dyn OrchestrationService>` として共有されます。

use async_trait::async_trait;

use crate::config::{ActivityWorkerConfig, DeciderConfig};
use crate::domain::{ActivityTask, Decision, DecisionTask, TaskToken};
use crate::error::TransportError;

/// Parameters of a decision-task poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollForDecisionTask {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
    pub page_size: u32,
    pub reverse_order: bool,
}

impl From<&DeciderConfig> for PollForDecisionTask {
    fn from(config: &DeciderConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            task_list: config.task_list.clone(),
            identity: config.identity.clone(),
            page_size: config.page_size,
            reverse_order: config.reverse_order,
        }
    }
}

/// Parameters of an activity-task poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollForActivityTask {
    pub domain: String,
    pub task_list: String,
    pub identity: String,
}

impl From<&ActivityWorkerConfig> for PollForActivityTask {
    fn from(config: &ActivityWorkerConfig) -> Self {
        Self {
            domain: config.domain.clone(),
            task_list: config.task_list.clone(),
            identity: config.identity.clone(),
        }
    }
}

/// # Token の扱い
/// respond 系メソッドは `TaskToken` を値で受け取る。
/// 同じ token で二度応答することは型の上で不可能。
#[async_trait]
pub trait OrchestrationService: Send + Sync {
    /// Blocks up to the service's long-poll timeout. `Ok(None)` means no work.
    async fn poll_for_decision_task(
        &self,
        request: &PollForDecisionTask,
    ) -> Result<Option<DecisionTask>, TransportError>;

    async fn respond_decision_task_completed(
        &self,
        token: TaskToken,
        decisions: Vec<Decision>,
        execution_context: String,
    ) -> Result<(), TransportError>;

    /// Blocks up to the service's long-poll timeout. `Ok(None)` means no work.
    async fn poll_for_activity_task(
        &self,
        request: &PollForActivityTask,
    ) -> Result<Option<ActivityTask>, TransportError>;

    async fn respond_activity_task_completed(
        &self,
        token: TaskToken,
        result: String,
    ) -> Result<(), TransportError>;

    async fn respond_activity_task_failed(
        &self,
        token: TaskToken,
        reason: String,
    ) -> Result<(), TransportError>;
}
