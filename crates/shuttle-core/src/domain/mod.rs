//! Domain model (executions, tokens, history, tasks, decisions).

pub mod decision;
pub mod history;
pub mod ids;
pub mod task;

pub use decision::{
    DEFAULT_EXECUTION_CONTEXT, Decision, FollowUp, NextActivityPlan, ScheduleActivity, TimerPlan,
};
pub use history::{ActivityType, EventKind, HistoryEvent, last_scheduled_activity, timer_control};
pub use ids::{ActivityId, TaskToken, TimerId, WorkflowExecution};
pub use task::{ActivityTask, DecisionTask};
