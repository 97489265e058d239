//! History events: the immutable record of a workflow execution.
//!
//! The orchestration service owns the history; the core only reads a page of
//! it, usually newest-first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name and version of a registered activity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActivityType {
    pub name: String,
    pub version: String,
}

impl ActivityType {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// One entry of a workflow execution's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub event_id: i64,
    pub event_timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl HistoryEvent {
    pub fn new(event_id: i64, kind: EventKind) -> Self {
        Self::at(event_id, Utc::now(), kind)
    }

    pub fn at(event_id: i64, event_timestamp: DateTime<Utc>, kind: EventKind) -> Self {
        Self {
            event_id,
            event_timestamp,
            kind,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

/// Event type plus its type-specific attributes.
///
/// Event types this crate does not model deserialize as `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", content = "attributes", rename_all_fields = "camelCase")]
pub enum EventKind {
    WorkflowExecutionStarted {
        input: String,
    },
    WorkflowExecutionCancelRequested {
        #[serde(default)]
        cause: Option<String>,
    },
    WorkflowExecutionCompleted {
        result: String,
    },
    WorkflowExecutionFailed {
        reason: String,
        details: String,
    },
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted {
        execution_context: String,
    },
    DecisionTaskTimedOut {
        timeout_type: String,
    },
    ActivityTaskScheduled {
        activity_id: String,
        activity_type: ActivityType,
        input: String,
        task_list: String,
    },
    ActivityTaskStarted {
        scheduled_event_id: i64,
        identity: String,
    },
    ActivityTaskCompleted {
        scheduled_event_id: i64,
        result: String,
    },
    ActivityTaskFailed {
        scheduled_event_id: i64,
        reason: String,
        #[serde(default)]
        details: String,
    },
    ActivityTaskTimedOut {
        scheduled_event_id: i64,
        timeout_type: String,
    },
    ActivityTaskCanceled {
        scheduled_event_id: i64,
        #[serde(default)]
        details: String,
    },
    MarkerRecorded {
        marker_name: String,
        details: String,
    },
    TimerStarted {
        timer_id: String,
        start_to_fire_timeout: String,
        control: String,
    },
    TimerFired {
        timer_id: String,
    },
    #[serde(other)]
    Unknown,
}

impl EventKind {
    pub fn event_type(&self) -> &'static str {
        match self {
            EventKind::WorkflowExecutionStarted { .. } => "WorkflowExecutionStarted",
            EventKind::WorkflowExecutionCancelRequested { .. } => {
                "WorkflowExecutionCancelRequested"
            }
            EventKind::WorkflowExecutionCompleted { .. } => "WorkflowExecutionCompleted",
            EventKind::WorkflowExecutionFailed { .. } => "WorkflowExecutionFailed",
            EventKind::DecisionTaskScheduled => "DecisionTaskScheduled",
            EventKind::DecisionTaskStarted => "DecisionTaskStarted",
            EventKind::DecisionTaskCompleted { .. } => "DecisionTaskCompleted",
            EventKind::DecisionTaskTimedOut { .. } => "DecisionTaskTimedOut",
            EventKind::ActivityTaskScheduled { .. } => "ActivityTaskScheduled",
            EventKind::ActivityTaskStarted { .. } => "ActivityTaskStarted",
            EventKind::ActivityTaskCompleted { .. } => "ActivityTaskCompleted",
            EventKind::ActivityTaskFailed { .. } => "ActivityTaskFailed",
            EventKind::ActivityTaskTimedOut { .. } => "ActivityTaskTimedOut",
            EventKind::ActivityTaskCanceled { .. } => "ActivityTaskCanceled",
            EventKind::MarkerRecorded { .. } => "MarkerRecorded",
            EventKind::TimerStarted { .. } => "TimerStarted",
            EventKind::TimerFired { .. } => "TimerFired",
            EventKind::Unknown => "Unknown",
        }
    }
}

/// Name of the most recently scheduled activity, by event id.
///
/// Works on pages in either order.
pub fn last_scheduled_activity(events: &[HistoryEvent]) -> Option<&str> {
    events
        .iter()
        .filter_map(|event| match &event.kind {
            EventKind::ActivityTaskScheduled { activity_type, .. } => {
                Some((event.event_id, activity_type.name.as_str()))
            }
            _ => None,
        })
        .max_by_key(|(event_id, _)| *event_id)
        .map(|(_, name)| name)
}

/// Control data attached when `timer_id` was started, if it is on the page.
pub fn timer_control<'a>(events: &'a [HistoryEvent], timer_id: &str) -> Option<&'a str> {
    events.iter().find_map(|event| match &event.kind {
        EventKind::TimerStarted {
            timer_id: started,
            control,
            ..
        } if started == timer_id => Some(control.as_str()),
        _ => None,
    })
}
