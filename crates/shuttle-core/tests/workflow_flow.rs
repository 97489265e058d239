//! End-to-end runs of a decider and an activity worker against the
//! in-process orchestration service.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use shuttle_core::app::{
    ActivityRegistry, ActivityWorker, DeciderLoop, FirstDecidableInterpreter, InterpreterSettings,
};
use shuttle_core::config::{ActivityWorkerConfig, AlertConfig, DeciderConfig};
use shuttle_core::domain::{
    ActivityType, Decision, EventKind, HistoryEvent, NextActivityPlan, WorkflowExecution,
};
use shuttle_core::error::{ContinuationError, HandlerError, LoopError};
use shuttle_core::impls::{
    ExecutionStatus, InMemoryOrchestration, RecordedResponse, RecordingNotifier,
};
use shuttle_core::ports::{ActivityHandler, ContinuationFn};

const WAIT: Duration = Duration::from_secs(5);

struct Reply(&'static str);

#[async_trait]
impl ActivityHandler for Reply {
    async fn handle(&self, _activity: &str, _input: &str) -> Result<String, HandlerError> {
        Ok(self.0.to_string())
    }
}

struct Refuse(&'static str);

#[async_trait]
impl ActivityHandler for Refuse {
    async fn handle(&self, _activity: &str, _input: &str) -> Result<String, HandlerError> {
        Err(HandlerError::failed(self.0))
    }
}

fn decider_config() -> DeciderConfig {
    DeciderConfig::new(
        "Orders",
        "OrderDecider",
        "test-decider",
        "loadData",
        AlertConfig {
            from: "support@example.com".to_string(),
            to: "helpdesk@example.com".to_string(),
            console_url: Some("https://console.example.com/swf".to_string()),
        },
    )
}

/// Running decider + worker sharing one service.
struct Harness {
    service: Arc<InMemoryOrchestration>,
    notifier: Arc<RecordingNotifier>,
    shutdown: watch::Sender<bool>,
    loops: Vec<JoinHandle<Result<(), LoopError>>>,
}

impl Harness {
    fn start(publish: Arc<dyn ActivityHandler>, with_worker: bool) -> Self {
        let service =
            Arc::new(InMemoryOrchestration::new().with_poll_timeout(Duration::from_millis(50)));
        let notifier = Arc::new(RecordingNotifier::new());
        let (shutdown, rx) = watch::channel(false);

        let continuation = ContinuationFn::new(|last: &str| match last {
            "loadData" => Ok(NextActivityPlan::schedule("publish", "1", "{}", "S123")),
            "publish" => Ok(NextActivityPlan::complete("published")),
            other => Err(ContinuationError::new(format!("unexpected {other}"))),
        });
        let config = decider_config();
        let interpreter = FirstDecidableInterpreter::new(
            InterpreterSettings::from(&config),
            Arc::new(continuation),
        );
        let decider = DeciderLoop::new(
            service.clone(),
            notifier.clone(),
            Arc::new(interpreter),
            config,
        );
        let mut loops = vec![tokio::spawn(decider.run(rx.clone()))];

        if with_worker {
            let mut registry = ActivityRegistry::new();
            registry
                .register("loadData", Arc::new(Reply("rows=3")))
                .unwrap();
            registry.register("publish", publish).unwrap();
            let worker = ActivityWorker::new(
                service.clone(),
                Arc::new(registry),
                ActivityWorkerConfig::new("Orders", "S123", "test-worker"),
            );
            loops.push(tokio::spawn(worker.run(rx)));
        }

        Self {
            service,
            notifier,
            shutdown,
            loops,
        }
    }

    async fn start_workflow(&self, input: &str) -> WorkflowExecution {
        self.service
            .start_workflow_execution("order-42", "OrderDecider", input)
            .await
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        for handle in self.loops {
            handle.await.unwrap().unwrap();
        }
    }
}

fn scheduled_activities(history: &[HistoryEvent]) -> Vec<(String, String)> {
    history
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::ActivityTaskScheduled {
                activity_type,
                task_list,
                ..
            } => Some((activity_type.name.clone(), task_list.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn two_step_workflow_completes() {
    let harness = Harness::start(Arc::new(Reply("ok")), true);
    let execution = harness.start_workflow(r#"{"SupplierID":"S123"}"#).await;

    let status = harness.service.wait_for_close(&execution, WAIT).await;

    assert_eq!(
        status,
        Some(ExecutionStatus::Completed {
            result: "published".to_string()
        })
    );
    let history = harness.service.history(&execution).await;
    assert_eq!(
        scheduled_activities(&history),
        vec![
            ("loadData".to_string(), "S123".to_string()),
            ("publish".to_string(), "S123".to_string()),
        ]
    );
    assert!(harness.notifier.sent().is_empty());

    // token はどれも一度しか使われていない
    let responses = harness.service.responses().await;
    let tokens: HashSet<_> = responses.iter().map(|r| r.token().to_string()).collect();
    assert_eq!(tokens.len(), responses.len());

    harness.stop().await;
}

#[tokio::test]
async fn start_schedules_first_activity_on_routing_key() {
    let harness = Harness::start(Arc::new(Reply("ok")), false);
    let input = r#"{"SupplierID":"S123"}"#;
    harness.start_workflow(input).await;

    let responses = harness.service.wait_for_responses(1, WAIT).await;

    match responses.first() {
        Some(RecordedResponse::DecisionTaskCompleted {
            decisions,
            execution_context,
            ..
        }) => {
            let [Decision::ScheduleActivity(attrs)] = decisions.as_slice() else {
                panic!("expected one ScheduleActivity, got {decisions:?}");
            };
            assert_eq!(attrs.activity_type, ActivityType::new("loadData", "1"));
            assert_eq!(attrs.activity_id.scope(), "loadData");
            assert_eq!(attrs.task_list, "S123");
            assert_eq!(attrs.input, input);
            assert_eq!(attrs.start_to_close_timeout, "10000");
            assert_eq!(execution_context, "");
        }
        other => panic!("unexpected response {other:?}"),
    }

    harness.stop().await;
}

#[tokio::test]
async fn input_without_routing_key_fails_the_workflow() {
    let harness = Harness::start(Arc::new(Reply("ok")), true);
    let execution = harness.start_workflow(r#"{"Other":"x"}"#).await;

    let status = harness.service.wait_for_close(&execution, WAIT).await;

    assert!(matches!(
        status,
        Some(ExecutionStatus::Failed { reason, .. }) if reason == "InvalidInput"
    ));
    harness.stop().await;
}

#[tokio::test]
async fn failed_activity_fails_workflow_and_alerts_helpdesk() {
    let harness = Harness::start(Arc::new(Refuse("target rejected")), true);
    let execution = harness.start_workflow(r#"{"SupplierID":"S123"}"#).await;

    let status = harness.service.wait_for_close(&execution, WAIT).await;

    assert_eq!(
        status,
        Some(ExecutionStatus::Failed {
            reason: "ActivityTaskFailed".to_string(),
            details: "target rejected".to_string(),
        })
    );

    // alert は応答の前に送られる
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Workflow ActivityTaskFailed Occurred");
    assert_eq!(sent[0].from, "support@example.com");
    assert!(sent[0].body.starts_with("https://console.example.com/swf#execution_events:"));
    assert!(sent[0].body.contains(&format!("runId={}", execution.run_id)));

    harness.stop().await;
}

#[tokio::test]
async fn replayed_history_of_a_closed_workflow_decides_nothing() {
    let harness = Harness::start(Arc::new(Reply("ok")), false);
    let execution = WorkflowExecution::new("order-7", "run-7");
    // newest-first
    let events = vec![
        HistoryEvent::new(3, EventKind::DecisionTaskStarted),
        HistoryEvent::new(
            2,
            EventKind::WorkflowExecutionCompleted {
                result: "done".to_string(),
            },
        ),
        HistoryEvent::new(1, EventKind::DecisionTaskCompleted {
            execution_context: "Data".to_string(),
        }),
    ];
    harness
        .service
        .inject_decision_task("OrderDecider", execution, events)
        .await;

    let responses = harness
        .service
        .wait_for_responses(1, Duration::from_millis(300))
        .await;

    assert!(responses.is_empty());
    assert!(harness.notifier.sent().is_empty());
    harness.stop().await;
}
