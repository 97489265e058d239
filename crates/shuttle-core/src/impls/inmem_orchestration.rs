//! InMemoryOrchestration - 開発用・テスト用のオーケストレーションサービス
//!
//! 本物のサービスと同じ契約（long-poll, task token, history の追記）を
//! プロセス内で再現します。
//!
//! # 実装詳細
//! - tokio::sync::Mutex で状態を保護
//! - tokio::sync::Notify で状態変化を待機中の poll に通知
//! - decision task は execution ごとに高々 1 つ（Idle → Scheduled → Started）
//! - task token は poll のたびに新しい ULID で払い出し、応答で消費する
//! - 応答されないまま start-to-close timeout を過ぎた decision task は
//!   DecisionTaskTimedOut を記録して schedule し直す（poll 時に遅延評価）
//!
//! テスト向けに fault injection（次の poll / respond を失敗させる）と
//! 応答の記録を持ちます。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::debug;
use ulid::Ulid;

use crate::domain::{
    ActivityTask, ActivityType, Decision, DecisionTask, EventKind, HistoryEvent,
    ScheduleActivity, TaskToken, WorkflowExecution,
};
use crate::error::TransportError;
use crate::ports::{
    Clock, OrchestrationService, PollForActivityTask, PollForDecisionTask, SystemClock,
};

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_DECISION_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Where an execution stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Completed { result: String },
    Failed { reason: String, details: String },
}

impl ExecutionStatus {
    pub fn is_closed(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

/// One successful respond call, as the service saw it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedResponse {
    DecisionTaskCompleted {
        token: String,
        decisions: Vec<Decision>,
        execution_context: String,
    },
    ActivityTaskCompleted {
        token: String,
        result: String,
    },
    ActivityTaskFailed {
        token: String,
        reason: String,
    },
}

impl RecordedResponse {
    pub fn token(&self) -> &str {
        match self {
            RecordedResponse::DecisionTaskCompleted { token, .. }
            | RecordedResponse::ActivityTaskCompleted { token, .. }
            | RecordedResponse::ActivityTaskFailed { token, .. } => token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecisionState {
    Idle,
    Scheduled,
    /// `dirty`: 処理中に新しいイベントが来たので、完了後にもう一度 schedule する
    Started { dirty: bool },
}

struct Execution {
    task_list: String,
    history: Vec<HistoryEvent>,
    status: ExecutionStatus,
    decision: DecisionState,
}

enum PendingDecision {
    Execution(WorkflowExecution),
    Injected {
        execution: WorkflowExecution,
        events: Vec<HistoryEvent>,
    },
}

struct PendingActivity {
    execution: WorkflowExecution,
    scheduled_event_id: i64,
    activity_id: String,
    activity_type: ActivityType,
    input: String,
}

enum Outstanding {
    Decision {
        execution: WorkflowExecution,
        tracked: bool,
        deadline: Instant,
    },
    Activity {
        execution: WorkflowExecution,
        scheduled_event_id: i64,
    },
}

#[derive(Default)]
struct State {
    executions: HashMap<WorkflowExecution, Execution>,
    decision_queues: HashMap<String, VecDeque<PendingDecision>>,
    activity_queues: HashMap<String, VecDeque<PendingActivity>>,
    outstanding: HashMap<String, Outstanding>,
    responses: Vec<RecordedResponse>,
    poll_faults: VecDeque<TransportError>,
    respond_faults: VecDeque<TransportError>,
}

/// In-process orchestration service.
///
/// # 使用例
/// ```ignore
/// let service = InMemoryOrchestration::new();
/// let execution = service
///     .start_workflow_execution("order-42", "OrderDecider", r#"{"SupplierID":"S123"}"#)
///     .await;
/// // ... run a DeciderLoop and an ActivityWorker against `service` ...
/// let status = service.wait_for_close(&execution, Duration::from_secs(5)).await;
/// ```
pub struct InMemoryOrchestration {
    state: Mutex<State>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    poll_timeout: Duration,
    decision_task_timeout: Duration,
}

impl InMemoryOrchestration {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            clock: Arc::new(SystemClock),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            decision_task_timeout: DEFAULT_DECISION_TASK_TIMEOUT,
        }
    }

    /// How long an empty poll blocks before returning `Ok(None)`.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// How long a decision task may stay unanswered before it is handed out
    /// again.
    pub fn with_decision_task_timeout(mut self, timeout: Duration) -> Self {
        self.decision_task_timeout = timeout;
        self
    }

    /// Clock used for event timestamps and run ids.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start a new run and schedule its first decision task.
    pub async fn start_workflow_execution(
        &self,
        workflow_id: impl Into<String>,
        task_list: impl Into<String>,
        input: impl Into<String>,
    ) -> WorkflowExecution {
        let run_id = Ulid::from_parts(self.clock.now().timestamp_millis() as u64, rand::random());
        let execution = WorkflowExecution::new(workflow_id, run_id.to_string());
        let mut state = self.state.lock().await;
        state.executions.insert(
            execution.clone(),
            Execution {
                task_list: task_list.into(),
                history: Vec::new(),
                status: ExecutionStatus::Running,
                decision: DecisionState::Idle,
            },
        );
        self.append(
            &mut state,
            &execution,
            EventKind::WorkflowExecutionStarted {
                input: input.into(),
            },
        );
        self.request_decision(&mut state, &execution);
        drop(state);

        debug!(execution = %execution, "workflow execution started");
        self.notify.notify_waiters();
        execution
    }

    /// Queue a decision task carrying exactly `events`.
    ///
    /// The events are handed out as given (no reordering, no paging). A
    /// response to the task is recorded but not applied to any history.
    pub async fn inject_decision_task(
        &self,
        task_list: &str,
        execution: WorkflowExecution,
        events: Vec<HistoryEvent>,
    ) {
        let mut state = self.state.lock().await;
        state
            .decision_queues
            .entry(task_list.to_string())
            .or_default()
            .push_back(PendingDecision::Injected { execution, events });
        drop(state);
        self.notify.notify_waiters();
    }

    /// Fire a timer started earlier by a `StartTimer` decision.
    ///
    /// Returns `false` when the execution is unknown or closed.
    pub async fn fire_timer(&self, execution: &WorkflowExecution, timer_id: &str) -> bool {
        let mut state = self.state.lock().await;
        let running = state
            .executions
            .get(execution)
            .is_some_and(|e| !e.status.is_closed());
        if !running {
            return false;
        }
        self.append(
            &mut state,
            execution,
            EventKind::TimerFired {
                timer_id: timer_id.to_string(),
            },
        );
        self.request_decision(&mut state, execution);
        drop(state);
        self.notify.notify_waiters();
        true
    }

    /// Make the next poll (decision or activity) fail with `err`.
    pub async fn fail_next_poll(&self, err: TransportError) {
        self.state.lock().await.poll_faults.push_back(err);
    }

    /// Make the next respond call fail with `err`. The token stays unredeemed.
    pub async fn fail_next_respond(&self, err: TransportError) {
        self.state.lock().await.respond_faults.push_back(err);
    }

    pub async fn responses(&self) -> Vec<RecordedResponse> {
        self.state.lock().await.responses.clone()
    }

    /// Wait until at least `n` responses are recorded or `timeout` passes;
    /// returns whatever has been recorded by then.
    pub async fn wait_for_responses(&self, n: usize, timeout: Duration) -> Vec<RecordedResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.state.lock().await;
                if state.responses.len() >= n {
                    return state.responses.clone();
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.responses().await;
            }
        }
    }

    /// Full history of an execution, oldest first.
    pub async fn history(&self, execution: &WorkflowExecution) -> Vec<HistoryEvent> {
        self.state
            .lock()
            .await
            .executions
            .get(execution)
            .map(|e| e.history.clone())
            .unwrap_or_default()
    }

    pub async fn status(&self, execution: &WorkflowExecution) -> Option<ExecutionStatus> {
        self.state
            .lock()
            .await
            .executions
            .get(execution)
            .map(|e| e.status.clone())
    }

    /// Wait for the execution to complete or fail. `None` on timeout or
    /// unknown execution.
    pub async fn wait_for_close(
        &self,
        execution: &WorkflowExecution,
        timeout: Duration,
    ) -> Option<ExecutionStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.status(execution).await {
                Some(status) if status.is_closed() => return Some(status),
                Some(_) => {}
                None => return None,
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    fn append(&self, state: &mut State, execution: &WorkflowExecution, kind: EventKind) -> i64 {
        let now = self.clock.now();
        match state.executions.get_mut(execution) {
            Some(exec) => {
                let event_id = exec.history.len() as i64 + 1;
                exec.history.push(HistoryEvent::at(event_id, now, kind));
                event_id
            }
            None => 0,
        }
    }

    /// Something happened that the decider must look at.
    fn request_decision(&self, state: &mut State, execution: &WorkflowExecution) {
        let Some(exec) = state.executions.get_mut(execution) else {
            return;
        };
        if exec.status.is_closed() {
            return;
        }
        match exec.decision {
            DecisionState::Idle => {
                exec.decision = DecisionState::Scheduled;
                let task_list = exec.task_list.clone();
                self.append(state, execution, EventKind::DecisionTaskScheduled);
                state
                    .decision_queues
                    .entry(task_list)
                    .or_default()
                    .push_back(PendingDecision::Execution(execution.clone()));
            }
            DecisionState::Scheduled => {}
            DecisionState::Started { .. } => {
                exec.decision = DecisionState::Started { dirty: true };
            }
        }
    }

    fn take_decision_task(&self, state: &mut State, request: &PollForDecisionTask) -> Option<DecisionTask> {
        let pending = state.decision_queues.get_mut(&request.task_list)?.pop_front()?;
        let token = new_token();

        let (execution, events, tracked) = match pending {
            PendingDecision::Injected { execution, events } => (execution, events, false),
            PendingDecision::Execution(execution) => {
                self.append(state, &execution, EventKind::DecisionTaskStarted);
                let exec = state.executions.get_mut(&execution)?;
                exec.decision = DecisionState::Started { dirty: false };

                let mut events = exec.history.clone();
                if request.reverse_order {
                    events.reverse();
                }
                if request.page_size > 0 {
                    events.truncate(request.page_size as usize);
                }
                (execution, events, true)
            }
        };

        state.outstanding.insert(
            token.as_str().to_string(),
            Outstanding::Decision {
                execution: execution.clone(),
                tracked,
                deadline: Instant::now() + self.decision_task_timeout,
            },
        );
        Some(DecisionTask {
            token,
            execution,
            events,
        })
    }

    fn take_activity_task(&self, state: &mut State, request: &PollForActivityTask) -> Option<ActivityTask> {
        let pending = state.activity_queues.get_mut(&request.task_list)?.pop_front()?;
        let token = new_token();

        self.append(
            state,
            &pending.execution,
            EventKind::ActivityTaskStarted {
                scheduled_event_id: pending.scheduled_event_id,
                identity: request.identity.clone(),
            },
        );
        state.outstanding.insert(
            token.as_str().to_string(),
            Outstanding::Activity {
                execution: pending.execution.clone(),
                scheduled_event_id: pending.scheduled_event_id,
            },
        );
        Some(ActivityTask {
            token,
            activity_id: pending.activity_id,
            activity_type: pending.activity_type,
            execution: pending.execution,
            input: pending.input,
        })
    }

    fn apply_decision(&self, state: &mut State, execution: &WorkflowExecution, decision: &Decision) {
        match decision {
            Decision::ScheduleActivity(ScheduleActivity {
                activity_id,
                activity_type,
                input,
                task_list,
                ..
            }) => {
                let scheduled_event_id = self.append(
                    state,
                    execution,
                    EventKind::ActivityTaskScheduled {
                        activity_id: activity_id.to_string(),
                        activity_type: activity_type.clone(),
                        input: input.clone(),
                        task_list: task_list.clone(),
                    },
                );
                state
                    .activity_queues
                    .entry(task_list.clone())
                    .or_default()
                    .push_back(PendingActivity {
                        execution: execution.clone(),
                        scheduled_event_id,
                        activity_id: activity_id.to_string(),
                        activity_type: activity_type.clone(),
                        input: input.clone(),
                    });
            }
            Decision::CompleteWorkflow { result } => {
                self.append(
                    state,
                    execution,
                    EventKind::WorkflowExecutionCompleted {
                        result: result.clone(),
                    },
                );
                self.close(
                    state,
                    execution,
                    ExecutionStatus::Completed {
                        result: result.clone(),
                    },
                );
            }
            Decision::FailWorkflow { reason, details } => {
                self.append(
                    state,
                    execution,
                    EventKind::WorkflowExecutionFailed {
                        reason: reason.clone(),
                        details: details.clone(),
                    },
                );
                self.close(
                    state,
                    execution,
                    ExecutionStatus::Failed {
                        reason: reason.clone(),
                        details: details.clone(),
                    },
                );
            }
            Decision::RecordMarker { name, details } => {
                self.append(
                    state,
                    execution,
                    EventKind::MarkerRecorded {
                        marker_name: name.clone(),
                        details: details.clone(),
                    },
                );
            }
            Decision::StartTimer {
                timer_id,
                start_to_fire_timeout,
                control,
            } => {
                self.append(
                    state,
                    execution,
                    EventKind::TimerStarted {
                        timer_id: timer_id.to_string(),
                        start_to_fire_timeout: start_to_fire_timeout.clone(),
                        control: control.clone(),
                    },
                );
            }
        }
    }

    fn close(&self, state: &mut State, execution: &WorkflowExecution, status: ExecutionStatus) {
        if let Some(exec) = state.executions.get_mut(execution) {
            exec.status = status;
        }
    }

    /// Drop decision tokens past their deadline and reschedule their tasks.
    fn expire_decision_tasks(&self, state: &mut State) {
        let now = Instant::now();
        let expired: Vec<String> = state
            .outstanding
            .iter()
            .filter(|(_, o)| matches!(o, Outstanding::Decision { deadline, .. } if *deadline <= now))
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            let Some(Outstanding::Decision {
                execution, tracked, ..
            }) = state.outstanding.remove(&token)
            else {
                continue;
            };
            if !tracked || !Self::is_running(state, &execution) {
                continue;
            }
            debug!(execution = %execution, "decision task timed out");
            self.append(
                state,
                &execution,
                EventKind::DecisionTaskTimedOut {
                    timeout_type: "START_TO_CLOSE".to_string(),
                },
            );
            if let Some(exec) = state.executions.get_mut(&execution) {
                exec.decision = DecisionState::Idle;
            }
            self.request_decision(state, &execution);
        }
    }

    /// Earliest deadline among outstanding decision tokens.
    fn next_decision_deadline(state: &State) -> Option<Instant> {
        state
            .outstanding
            .values()
            .filter_map(|o| match o {
                Outstanding::Decision { deadline, .. } => Some(*deadline),
                Outstanding::Activity { .. } => None,
            })
            .min()
    }

    fn is_running(state: &State, execution: &WorkflowExecution) -> bool {
        state
            .executions
            .get(execution)
            .is_some_and(|e| !e.status.is_closed())
    }

    /// Validate and consume a token, honouring an injected respond fault.
    fn redeem(&self, state: &mut State, token: &TaskToken) -> Result<Outstanding, TransportError> {
        if let Some(err) = state.respond_faults.pop_front() {
            return Err(err);
        }
        state
            .outstanding
            .remove(token.as_str())
            .ok_or_else(|| TransportError::UnknownToken(token.as_str().to_string()))
    }

    /// Record an activity outcome and wake the decider.
    fn finish_activity(
        &self,
        state: &mut State,
        outstanding: Outstanding,
        outcome: impl FnOnce(i64) -> EventKind,
    ) -> Result<(), TransportError> {
        let Outstanding::Activity {
            execution,
            scheduled_event_id,
        } = outstanding
        else {
            return Err(TransportError::Rejected(
                "decision task token used for an activity response".to_string(),
            ));
        };
        if Self::is_running(state, &execution) {
            self.append(state, &execution, outcome(scheduled_event_id));
            self.request_decision(state, &execution);
        }
        Ok(())
    }
}

impl Default for InMemoryOrchestration {
    fn default() -> Self {
        Self::new()
    }
}

fn new_token() -> TaskToken {
    TaskToken::new(Ulid::new().to_string())
}

#[async_trait]
impl OrchestrationService for InMemoryOrchestration {
    async fn poll_for_decision_task(
        &self,
        request: &PollForDecisionTask,
    ) -> Result<Option<DecisionTask>, TransportError> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            // enable() してから状態を見ることで、その間の通知を取りこぼさない
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake = {
                let mut state = self.state.lock().await;
                if let Some(err) = state.poll_faults.pop_front() {
                    return Err(err);
                }
                self.expire_decision_tasks(&mut state);
                if let Some(task) = self.take_decision_task(&mut state, request) {
                    return Ok(Some(task));
                }
                Self::next_decision_deadline(&state)
                    .map_or(deadline, |next| next.min(deadline))
            };

            // 期限切れの token があれば deadline 前でも起きて見直す
            if tokio::time::timeout_at(wake, notified).await.is_err() && Instant::now() >= deadline
            {
                return Ok(None);
            }
        }
    }

    async fn respond_decision_task_completed(
        &self,
        token: TaskToken,
        decisions: Vec<Decision>,
        execution_context: String,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let Outstanding::Decision {
            execution, tracked, ..
        } = self.redeem(&mut state, &token)?
        else {
            return Err(TransportError::Rejected(
                "activity task token used for a decision response".to_string(),
            ));
        };

        if tracked && Self::is_running(&state, &execution) {
            self.append(
                &mut state,
                &execution,
                EventKind::DecisionTaskCompleted {
                    execution_context: execution_context.clone(),
                },
            );
            for decision in &decisions {
                self.apply_decision(&mut state, &execution, decision);
            }
            if let Some(exec) = state.executions.get_mut(&execution) {
                let dirty = matches!(exec.decision, DecisionState::Started { dirty: true });
                exec.decision = DecisionState::Idle;
                if dirty {
                    self.request_decision(&mut state, &execution);
                }
            }
        }

        state.responses.push(RecordedResponse::DecisionTaskCompleted {
            token: token.into_inner(),
            decisions,
            execution_context,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn poll_for_activity_task(
        &self,
        request: &PollForActivityTask,
    ) -> Result<Option<ActivityTask>, TransportError> {
        let deadline = Instant::now() + self.poll_timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(err) = state.poll_faults.pop_front() {
                    return Err(err);
                }
                if let Some(task) = self.take_activity_task(&mut state, request) {
                    return Ok(Some(task));
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn respond_activity_task_completed(
        &self,
        token: TaskToken,
        result: String,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let outstanding = self.redeem(&mut state, &token)?;
        let recorded = result.clone();
        self.finish_activity(&mut state, outstanding, |scheduled_event_id| {
            EventKind::ActivityTaskCompleted {
                scheduled_event_id,
                result,
            }
        })?;
        state.responses.push(RecordedResponse::ActivityTaskCompleted {
            token: token.into_inner(),
            result: recorded,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn respond_activity_task_failed(
        &self,
        token: TaskToken,
        reason: String,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().await;
        let outstanding = self.redeem(&mut state, &token)?;
        let recorded = reason.clone();
        self.finish_activity(&mut state, outstanding, |scheduled_event_id| {
            EventKind::ActivityTaskFailed {
                scheduled_event_id,
                reason,
                details: String::new(),
            }
        })?;
        state.responses.push(RecordedResponse::ActivityTaskFailed {
            token: token.into_inner(),
            reason: recorded,
        });
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }
}
