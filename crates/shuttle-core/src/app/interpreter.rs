//! FirstDecidableInterpreter - history page から Decision を 1 つ決める
//!
//! # ルール
//! page を先頭（newest-first なら最新）から走査し、
//! 最初に判断できたイベントで止まる。
//!
//! | event                            | decision                                   |
//! |----------------------------------|--------------------------------------------|
//! | WorkflowExecutionStarted         | 最初の activity を routing key の task list へ |
//! | ActivityTaskCompleted            | continuation の結果で schedule / complete     |
//! | ActivityTaskTimedOut             | alert + RecordMarker                       |
//! | ActivityTaskFailed               | alert + FailWorkflow(details = reason)     |
//! | ActivityTaskCanceled             | FailWorkflow                               |
//! | WorkflowExecutionCancelRequested | FailWorkflow                               |
//! | TimerFired                       | continuation の timer hook（既定は何もしない）  |
//! | その他                            | skip して次のイベントへ                       |

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::DeciderConfig;
use crate::domain::{
    ActivityType, Decision, EventKind, FollowUp, HistoryEvent, NextActivityPlan,
    ScheduleActivity, TimerPlan, WorkflowExecution, last_scheduled_activity, timer_control,
};
use crate::ports::{
    Continuation, IdGenerator, Interpretation, Interpreter, SystemClock, UlidGenerator,
};

/// Marker recorded after a timeout alert.
pub const HELPDESK_NOTIFIED_MARKER: &str = "HelpdeskNotified";

/// Alert reason for activity timeouts.
pub const ACTIVITY_TIMEOUT_ALERT: &str = "Activity Timeout";

/// The parts of `DeciderConfig` the interpreter reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterSettings {
    pub first_activity: String,
    pub first_activity_version: String,
    pub first_activity_timeout: String,
    pub routing_key_field: String,
    /// Details of the `HelpdeskNotified` marker: who was alerted.
    pub marker_details: String,
}

impl From<&DeciderConfig> for InterpreterSettings {
    fn from(config: &DeciderConfig) -> Self {
        Self {
            first_activity: config.first_activity.clone(),
            first_activity_version: config.first_activity_version.clone(),
            first_activity_timeout: config.first_activity_timeout.clone(),
            routing_key_field: config.routing_key_field.clone(),
            marker_details: config.alerts.to.clone(),
        }
    }
}

/// "First decidable event wins" over one page of history.
///
/// Holds no per-task state; a single instance serves every in-flight task.
pub struct FirstDecidableInterpreter {
    settings: InterpreterSettings,
    continuation: Arc<dyn Continuation>,
    ids: Arc<dyn IdGenerator>,
}

impl FirstDecidableInterpreter {
    pub fn new(settings: InterpreterSettings, continuation: Arc<dyn Continuation>) -> Self {
        Self {
            settings,
            continuation,
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// `None` means the event is not decidable and the scan goes on.
    async fn decide(
        &self,
        event: &HistoryEvent,
        events: &[HistoryEvent],
    ) -> Option<Interpretation> {
        let interpretation = match &event.kind {
            EventKind::WorkflowExecutionStarted { input } => self.start(input),

            EventKind::ActivityTaskCompleted { .. } => {
                let last_activity = last_scheduled_activity(events).unwrap_or_default();
                debug!(last_activity, "activity completed; asking continuation");
                match self.continuation.next_activity(last_activity).await {
                    Ok(plan) => Interpretation::decide(self.follow(plan)),
                    Err(err) => {
                        warn!(last_activity, error = %err, "continuation failed");
                        Interpretation::decide(Decision::fail("ContinuationFailed", err.to_string()))
                            .with_alert("ContinuationFailed")
                    }
                }
            }

            // 重複チェックはしない。timeout のたびに alert と marker が出る。
            EventKind::ActivityTaskTimedOut { timeout_type, .. } => {
                info!(timeout_type = %timeout_type, "activity timed out");
                Interpretation::decide(Decision::RecordMarker {
                    name: HELPDESK_NOTIFIED_MARKER.to_string(),
                    details: self.settings.marker_details.clone(),
                })
                .with_alert(ACTIVITY_TIMEOUT_ALERT)
            }

            EventKind::ActivityTaskFailed { reason, .. } => {
                info!(reason = %reason, "activity failed; failing workflow");
                Interpretation::decide(Decision::fail("ActivityTaskFailed", reason.clone()))
                    .with_alert("ActivityTaskFailed")
            }

            EventKind::ActivityTaskCanceled { .. } => Interpretation::decide(Decision::fail(
                "ActivityTaskCanceled",
                "workflow cancelled after activity cancelled",
            )),

            EventKind::WorkflowExecutionCancelRequested { .. } => Interpretation::decide(
                Decision::fail("WorkflowExecutionCancelRequested", "workflow cancelled by request"),
            ),

            EventKind::TimerFired { timer_id } => {
                let control = timer_control(events, timer_id).unwrap_or_default();
                match self.continuation.on_timer_fired(timer_id, control).await {
                    Ok(None) => Interpretation::none(),
                    Ok(Some(FollowUp::Activity(plan))) => Interpretation::decide(self.follow(plan)),
                    Ok(Some(FollowUp::Timer(plan))) => Interpretation::decide(self.timer(plan)),
                    Err(err) => {
                        warn!(timer_id = %timer_id, error = %err, "timer hook failed");
                        Interpretation::decide(Decision::fail("ContinuationFailed", err.to_string()))
                            .with_alert("ContinuationFailed")
                    }
                }
            }

            _ => return None,
        };
        Some(interpretation)
    }

    fn start(&self, input: &str) -> Interpretation {
        match routing_key(input, &self.settings.routing_key_field) {
            Ok(task_list) => {
                info!(
                    activity = %self.settings.first_activity,
                    task_list = %task_list,
                    "workflow started; scheduling first activity"
                );
                Interpretation::decide(Decision::ScheduleActivity(ScheduleActivity {
                    activity_id: self.ids.activity_id(&self.settings.first_activity),
                    activity_type: ActivityType::new(
                        self.settings.first_activity.clone(),
                        self.settings.first_activity_version.clone(),
                    ),
                    input: input.to_string(),
                    start_to_close_timeout: self.settings.first_activity_timeout.clone(),
                    task_list,
                    context: String::new(),
                }))
            }
            Err(details) => {
                warn!(%details, "workflow input has no usable routing key");
                Interpretation::decide(Decision::fail("InvalidInput", details))
            }
        }
    }

    fn follow(&self, plan: NextActivityPlan) -> Decision {
        if plan.is_complete {
            info!("workflow complete");
            return Decision::CompleteWorkflow { result: plan.input };
        }
        info!(activity = %plan.name, task_list = %plan.task_list, "scheduling next activity");
        Decision::ScheduleActivity(ScheduleActivity {
            activity_id: self.ids.activity_id(&plan.name),
            activity_type: ActivityType::new(plan.name, plan.version),
            input: plan.input,
            start_to_close_timeout: plan.start_to_close_timeout,
            task_list: plan.task_list,
            context: plan.context,
        })
    }

    fn timer(&self, plan: TimerPlan) -> Decision {
        info!(timer = %plan.name, seconds = %plan.start_to_fire_timeout, "starting timer");
        Decision::StartTimer {
            timer_id: self.ids.timer_id(&plan.name),
            start_to_fire_timeout: plan.start_to_fire_timeout,
            control: plan.control,
        }
    }
}

#[async_trait]
impl Interpreter for FirstDecidableInterpreter {
    async fn interpret(
        &self,
        execution: &WorkflowExecution,
        events: &[HistoryEvent],
    ) -> Interpretation {
        for event in events {
            if let Some(interpretation) = self.decide(event, events).await {
                debug!(
                    event_id = event.event_id,
                    event_type = event.event_type(),
                    "decided"
                );
                return interpretation;
            }
            debug!(
                event_id = event.event_id,
                event_type = event.event_type(),
                "unhandled event"
            );
        }
        info!(%execution, events = events.len(), "no decidable event on page");
        Interpretation::none()
    }
}

/// Pull the routing key (a string field of a JSON object) out of the input.
fn routing_key(input: &str, field: &str) -> Result<String, String> {
    let value: serde_json::Value =
        serde_json::from_str(input).map_err(|e| format!("input is not JSON: {e}"))?;
    let object = value
        .as_object()
        .ok_or_else(|| "input is not a JSON object".to_string())?;
    match object.get(field).and_then(|v| v.as_str()) {
        Some(key) if !key.is_empty() => Ok(key.to_string()),
        _ => Err(format!("input has no string field {field}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ActivityId;
    use crate::error::ContinuationError;
    use crate::ports::ContinuationFn;
    use rstest::rstest;
    use std::sync::Mutex;

    fn settings() -> InterpreterSettings {
        InterpreterSettings {
            first_activity: "loadData".to_string(),
            first_activity_version: "1".to_string(),
            first_activity_timeout: "10000".to_string(),
            routing_key_field: "SupplierID".to_string(),
            marker_details: "helpdesk@example.com".to_string(),
        }
    }

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new("order-42", "run-1")
    }

    /// Records every `last_activity` it is asked about.
    #[derive(Default)]
    struct Recording {
        asked: Mutex<Vec<String>>,
        plan: Option<NextActivityPlan>,
    }

    #[async_trait]
    impl Continuation for Recording {
        async fn next_activity(
            &self,
            last_activity: &str,
        ) -> Result<NextActivityPlan, ContinuationError> {
            self.asked.lock().unwrap().push(last_activity.to_string());
            self.plan
                .clone()
                .ok_or_else(|| ContinuationError::new("no plan for this activity"))
        }
    }

    fn interpreter(continuation: Arc<dyn Continuation>) -> FirstDecidableInterpreter {
        FirstDecidableInterpreter::new(settings(), continuation)
    }

    fn never() -> Arc<dyn Continuation> {
        Arc::new(ContinuationFn::new(|_: &str| {
            Err(ContinuationError::new("continuation must not be called"))
        }))
    }

    fn started(event_id: i64, input: &str) -> HistoryEvent {
        HistoryEvent::new(
            event_id,
            EventKind::WorkflowExecutionStarted {
                input: input.to_string(),
            },
        )
    }

    fn scheduled(event_id: i64, name: &str) -> HistoryEvent {
        HistoryEvent::new(
            event_id,
            EventKind::ActivityTaskScheduled {
                activity_id: format!("{name}-x"),
                activity_type: ActivityType::new(name, "1"),
                input: String::new(),
                task_list: "S123".to_string(),
            },
        )
    }

    fn completed(event_id: i64, scheduled_event_id: i64) -> HistoryEvent {
        HistoryEvent::new(
            event_id,
            EventKind::ActivityTaskCompleted {
                scheduled_event_id,
                result: "ok".to_string(),
            },
        )
    }

    fn schedule_attrs(decision: Option<Decision>) -> ScheduleActivity {
        match decision {
            Some(Decision::ScheduleActivity(attrs)) => attrs,
            other => panic!("expected ScheduleActivity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn started_schedules_first_activity_on_routing_key() {
        let input = r#"{"SupplierID":"S123"}"#;
        let out = interpreter(never())
            .interpret(&execution(), &[started(1, input)])
            .await;

        assert_eq!(out.alert, None);
        let attrs = schedule_attrs(out.decision);
        assert_eq!(attrs.activity_type, ActivityType::new("loadData", "1"));
        assert_eq!(attrs.input, input);
        assert_eq!(attrs.task_list, "S123");
        assert_eq!(attrs.start_to_close_timeout, "10000");
        assert!(attrs.activity_id.to_string().starts_with("loadData-"));
    }

    #[rstest]
    #[case::not_json("not json")]
    #[case::not_object(r#"["S123"]"#)]
    #[case::missing_key(r#"{"Other":"x"}"#)]
    #[case::non_string_key(r#"{"SupplierID":42}"#)]
    #[tokio::test]
    async fn started_without_routing_key_fails_workflow(#[case] input: &str) {
        let out = interpreter(never())
            .interpret(&execution(), &[started(1, input)])
            .await;
        assert!(matches!(
            out.decision,
            Some(Decision::FailWorkflow { ref reason, .. }) if reason == "InvalidInput"
        ));
    }

    #[tokio::test]
    async fn completed_asks_continuation_with_last_scheduled_name() {
        let continuation = Arc::new(Recording {
            plan: Some(NextActivityPlan::schedule("publish", "2", "file.csv", "S123")),
            ..Default::default()
        });
        // newest-first page
        let events = vec![completed(6, 5), scheduled(5, "loadData"), started(1, "{}")];

        let out = interpreter(continuation.clone())
            .interpret(&execution(), &events)
            .await;

        assert_eq!(*continuation.asked.lock().unwrap(), vec!["loadData".to_string()]);
        let attrs = schedule_attrs(out.decision);
        assert_eq!(attrs.activity_type, ActivityType::new("publish", "2"));
        assert_eq!(attrs.input, "file.csv");
        assert_eq!(attrs.task_list, "S123");
    }

    #[tokio::test]
    async fn completed_with_complete_plan_finishes_workflow() {
        let continuation = Arc::new(Recording {
            plan: Some(NextActivityPlan::complete("all done")),
            ..Default::default()
        });
        let events = vec![completed(6, 5), scheduled(5, "publish")];

        let out = interpreter(continuation).interpret(&execution(), &events).await;

        assert_eq!(
            out.decision,
            Some(Decision::CompleteWorkflow {
                result: "all done".to_string()
            })
        );
    }

    #[tokio::test]
    async fn continuation_error_fails_workflow_and_alerts() {
        let continuation = Arc::new(Recording::default());
        let events = vec![completed(6, 5), scheduled(5, "loadData")];

        let out = interpreter(continuation).interpret(&execution(), &events).await;

        assert_eq!(
            out.decision,
            Some(Decision::fail("ContinuationFailed", "no plan for this activity"))
        );
        assert_eq!(out.alert.as_deref(), Some("ContinuationFailed"));
    }

    #[tokio::test]
    async fn failed_activity_fails_workflow_with_reason_as_details() {
        let events = vec![HistoryEvent::new(
            7,
            EventKind::ActivityTaskFailed {
                scheduled_event_id: 5,
                reason: "disk full".to_string(),
                details: String::new(),
            },
        )];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(
            out.decision,
            Some(Decision::fail("ActivityTaskFailed", "disk full"))
        );
        assert_eq!(out.alert.as_deref(), Some("ActivityTaskFailed"));
    }

    #[tokio::test]
    async fn timeout_records_marker_and_alerts() {
        let events = vec![HistoryEvent::new(
            7,
            EventKind::ActivityTaskTimedOut {
                scheduled_event_id: 5,
                timeout_type: "START_TO_CLOSE".to_string(),
            },
        )];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(
            out.decision,
            Some(Decision::RecordMarker {
                name: HELPDESK_NOTIFIED_MARKER.to_string(),
                details: "helpdesk@example.com".to_string(),
            })
        );
        assert_eq!(out.alert.as_deref(), Some(ACTIVITY_TIMEOUT_ALERT));
    }

    #[rstest]
    #[case::activity_canceled(
        EventKind::ActivityTaskCanceled { scheduled_event_id: 5, details: String::new() },
        "workflow cancelled after activity cancelled"
    )]
    #[case::cancel_requested(
        EventKind::WorkflowExecutionCancelRequested { cause: None },
        "workflow cancelled by request"
    )]
    #[tokio::test]
    async fn cancellation_fails_workflow_without_alert(
        #[case] kind: EventKind,
        #[case] details: &str,
    ) {
        let events = vec![HistoryEvent::new(9, kind)];
        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert!(matches!(
            out.decision,
            Some(Decision::FailWorkflow { details: ref d, .. }) if d == details
        ));
        assert_eq!(out.alert, None);
    }

    #[tokio::test]
    async fn unhandled_events_are_skipped_until_a_decidable_one() {
        let events = vec![
            HistoryEvent::new(4, EventKind::DecisionTaskStarted),
            HistoryEvent::new(3, EventKind::DecisionTaskScheduled),
            HistoryEvent::new(2, EventKind::Unknown),
            started(1, r#"{"SupplierID":"S9"}"#),
        ];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(schedule_attrs(out.decision).task_list, "S9");
    }

    #[tokio::test]
    async fn first_decidable_event_wins() {
        // 最新の失敗で止まり、古い Started までは見ない
        let events = vec![
            HistoryEvent::new(
                8,
                EventKind::ActivityTaskFailed {
                    scheduled_event_id: 5,
                    reason: "boom".to_string(),
                    details: String::new(),
                },
            ),
            scheduled(5, "loadData"),
            started(1, r#"{"SupplierID":"S123"}"#),
        ];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(out.decision, Some(Decision::fail("ActivityTaskFailed", "boom")));
    }

    #[tokio::test]
    async fn terminal_history_yields_no_decision() {
        let events = vec![
            HistoryEvent::new(
                9,
                EventKind::WorkflowExecutionCompleted {
                    result: "done".to_string(),
                },
            ),
            HistoryEvent::new(
                8,
                EventKind::DecisionTaskCompleted {
                    execution_context: "Data".to_string(),
                },
            ),
            HistoryEvent::new(7, EventKind::DecisionTaskStarted),
        ];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(out, Interpretation::none());
    }

    #[tokio::test]
    async fn timer_fired_without_hook_stops_scan_with_no_decision() {
        let events = vec![
            HistoryEvent::new(
                6,
                EventKind::TimerFired {
                    timer_id: "wait-1".to_string(),
                },
            ),
            started(1, r#"{"SupplierID":"S123"}"#),
        ];

        let out = interpreter(never()).interpret(&execution(), &events).await;

        assert_eq!(out, Interpretation::none());
    }

    struct Rearm;

    #[async_trait]
    impl Continuation for Rearm {
        async fn next_activity(&self, _: &str) -> Result<NextActivityPlan, ContinuationError> {
            Err(ContinuationError::new("unused"))
        }

        async fn on_timer_fired(
            &self,
            _timer_id: &str,
            control: &str,
        ) -> Result<Option<FollowUp>, ContinuationError> {
            Ok(Some(FollowUp::Timer(TimerPlan {
                name: "poll-again".to_string(),
                start_to_fire_timeout: "60".to_string(),
                control: format!("{control}+1"),
            })))
        }
    }

    #[tokio::test]
    async fn timer_hook_can_start_another_timer() {
        let events = vec![
            HistoryEvent::new(
                6,
                EventKind::TimerFired {
                    timer_id: "wait-1".to_string(),
                },
            ),
            HistoryEvent::new(
                5,
                EventKind::TimerStarted {
                    timer_id: "wait-1".to_string(),
                    start_to_fire_timeout: "60".to_string(),
                    control: "round".to_string(),
                },
            ),
        ];

        let out = interpreter(Arc::new(Rearm))
            .interpret(&execution(), &events)
            .await;

        match out.decision {
            Some(Decision::StartTimer {
                timer_id,
                start_to_fire_timeout,
                control,
            }) => {
                assert_eq!(timer_id.scope(), "poll-again");
                assert_eq!(start_to_fire_timeout, "60");
                assert_eq!(control, "round+1");
            }
            other => panic!("expected StartTimer, got {other:?}"),
        }
    }

    struct FixedIds;

    impl IdGenerator for FixedIds {
        fn activity_id(&self, name: &str) -> ActivityId {
            ActivityId::new(name, ulid::Ulid::nil())
        }

        fn timer_id(&self, name: &str) -> crate::domain::TimerId {
            crate::domain::TimerId::new(name, ulid::Ulid::nil())
        }
    }

    #[tokio::test]
    async fn activity_ids_come_from_the_generator() {
        let out = interpreter(never())
            .with_id_generator(Arc::new(FixedIds))
            .interpret(&execution(), &[started(1, r#"{"SupplierID":"S1"}"#)])
            .await;

        let attrs = schedule_attrs(out.decision);
        assert_eq!(
            attrs.activity_id.to_string(),
            format!("loadData-{}", ulid::Ulid::nil())
        );
    }
}
