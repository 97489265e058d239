//! Units of work handed out by one poll.

use super::history::{ActivityType, HistoryEvent};
use super::ids::{TaskToken, WorkflowExecution};

/// A decision task: a token plus a page of the execution's history.
///
/// `events` are in the order the service returned them (newest-first when the
/// poll asked for reverse order).
#[derive(Debug)]
pub struct DecisionTask {
    pub token: TaskToken,
    pub execution: WorkflowExecution,
    pub events: Vec<HistoryEvent>,
}

/// An activity task: a token plus the activity to run and its input.
#[derive(Debug)]
pub struct ActivityTask {
    pub token: TaskToken,
    pub activity_id: String,
    pub activity_type: ActivityType,
    pub execution: WorkflowExecution,
    pub input: String,
}

impl ActivityTask {
    pub fn activity_name(&self) -> &str {
        &self.activity_type.name
    }
}
