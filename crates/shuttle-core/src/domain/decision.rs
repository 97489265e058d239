//! Decision model: what a decider tells the service to do next.
//!
//! A decision task yields zero or one `Decision`. The interpreter that picks
//! it lives in `app::interpreter`; this module only defines the shapes.

use super::history::ActivityType;
use super::ids::{ActivityId, TimerId};

/// Execution context sent with every decision that does not carry its own.
pub const DEFAULT_EXECUTION_CONTEXT: &str = "Data";

/// Attributes of a `ScheduleActivity` decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleActivity {
    pub activity_id: ActivityId,
    pub activity_type: ActivityType,
    pub input: String,
    /// Seconds, as the service expects it on the wire.
    pub start_to_close_timeout: String,
    pub task_list: String,
    /// Sent as the execution context of the respond call.
    pub context: String,
}

/// The next action for a workflow execution.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    ScheduleActivity(ScheduleActivity),

    CompleteWorkflow {
        result: String,
    },

    FailWorkflow {
        reason: String,
        details: String,
    },

    /// Annotate the execution's history.
    RecordMarker {
        name: String,
        details: String,
    },

    StartTimer {
        timer_id: TimerId,
        /// Seconds.
        start_to_fire_timeout: String,
        control: String,
    },
}

impl Decision {
    pub fn fail(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Decision::FailWorkflow {
            reason: reason.into(),
            details: details.into(),
        }
    }

    /// Wire name of the decision type.
    pub fn decision_type(&self) -> &'static str {
        match self {
            Decision::ScheduleActivity(_) => "ScheduleActivityTask",
            Decision::CompleteWorkflow { .. } => "CompleteWorkflowExecution",
            Decision::FailWorkflow { .. } => "FailWorkflowExecution",
            Decision::RecordMarker { .. } => "RecordMarker",
            Decision::StartTimer { .. } => "StartTimer",
        }
    }

    /// Does accepting this decision close the execution?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Decision::CompleteWorkflow { .. } | Decision::FailWorkflow { .. }
        )
    }

    pub fn execution_context(&self) -> &str {
        match self {
            Decision::ScheduleActivity(attrs) => &attrs.context,
            _ => DEFAULT_EXECUTION_CONTEXT,
        }
    }
}

/// Caller-supplied continuation result for "activity completed".
///
/// `is_complete = true` finishes the workflow with `input` as its result;
/// otherwise the remaining fields describe the activity to schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextActivityPlan {
    pub name: String,
    pub version: String,
    pub input: String,
    pub start_to_close_timeout: String,
    pub task_list: String,
    pub context: String,
    pub is_complete: bool,
}

impl NextActivityPlan {
    /// Schedule `name` next. Timeout defaults to `"10000"`.
    pub fn schedule(
        name: impl Into<String>,
        version: impl Into<String>,
        input: impl Into<String>,
        task_list: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            input: input.into(),
            start_to_close_timeout: "10000".to_string(),
            task_list: task_list.into(),
            context: String::new(),
            is_complete: false,
        }
    }

    /// Finish the workflow with `result`.
    pub fn complete(result: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            input: result.into(),
            start_to_close_timeout: String::new(),
            task_list: String::new(),
            context: String::new(),
            is_complete: true,
        }
    }

    pub fn with_timeout(mut self, seconds: impl Into<String>) -> Self {
        self.start_to_close_timeout = seconds.into();
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

/// A timer the timer hook wants started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerPlan {
    pub name: String,
    pub start_to_fire_timeout: String,
    pub control: String,
}

/// What a timer hook may ask for after `TimerFired`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    Activity(NextActivityPlan),
    Timer(TimerPlan),
}
