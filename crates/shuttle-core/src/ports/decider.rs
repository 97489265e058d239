//! Decider ports - history から Decision を決める部分の抽象化
//!
//! - **Interpreter**: history page → Interpretation。polling loop から切り離して、
//!   将来 full replay 実装に差し替えられるようにする
//! - **Continuation**: 利用者が渡す「次に何をするか」

use async_trait::async_trait;

use crate::domain::{Decision, FollowUp, HistoryEvent, NextActivityPlan, WorkflowExecution};
use crate::error::ContinuationError;

/// Result of interpreting one decision task.
///
/// `decision: None` means no decision is submitted and the token is left to
/// the service's own expiry. `alert` names the reason an operator should be
/// told about, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interpretation {
    pub decision: Option<Decision>,
    pub alert: Option<String>,
}

impl Interpretation {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn decide(decision: Decision) -> Self {
        Self {
            decision: Some(decision),
            alert: None,
        }
    }

    pub fn with_alert(mut self, reason: impl Into<String>) -> Self {
        self.alert = Some(reason.into());
        self
    }
}

/// Turns a page of history into at most one decision.
///
/// Implementations must not keep per-task state between calls: one
/// interpreter is shared by every in-flight decision task.
#[async_trait]
pub trait Interpreter: Send + Sync {
    async fn interpret(
        &self,
        execution: &WorkflowExecution,
        events: &[HistoryEvent],
    ) -> Interpretation;
}

/// Caller-supplied workflow logic.
#[async_trait]
pub trait Continuation: Send + Sync {
    /// Called when an activity completed. `last_activity` is the name of the
    /// most recently scheduled activity, empty if none is on the page.
    async fn next_activity(&self, last_activity: &str)
    -> Result<NextActivityPlan, ContinuationError>;

    /// Called on `TimerFired`. `control` is the data the timer was started
    /// with, empty if the start is not on the page.
    async fn on_timer_fired(
        &self,
        _timer_id: &str,
        _control: &str,
    ) -> Result<Option<FollowUp>, ContinuationError> {
        Ok(None)
    }
}

/// Adapts a plain closure into a `Continuation` with no timer behaviour.
pub struct ContinuationFn<F> {
    f: F,
}

impl<F> ContinuationFn<F>
where
    F: Fn(&str) -> Result<NextActivityPlan, ContinuationError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Continuation for ContinuationFn<F>
where
    F: Fn(&str) -> Result<NextActivityPlan, ContinuationError> + Send + Sync,
{
    async fn next_activity(
        &self,
        last_activity: &str,
    ) -> Result<NextActivityPlan, ContinuationError> {
        (self.f)(last_activity)
    }
}
