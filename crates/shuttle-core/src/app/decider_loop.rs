//! DeciderLoop - decision task の polling と fan-out
//!
//! # フロー
//! 1. OrchestrationService::poll_for_decision_task() で task を取得
//! 2. 空なら heartbeat を数えて再 poll
//! 3. task があれば DecisionUnit を作って tokio::spawn（join しない）
//! 4. DecisionUnit: Interpreter → alert → respond_decision_task_completed
//!
//! # 並行性
//! DecisionUnit は dispatch 時点の token / execution / events を所有する。
//! loop 側のフィールドを unit が書き換えることはない。共有するのは
//! immutable な service / notifier / interpreter / config の Arc だけ。
//! unit 内の transport error は mpsc で loop に返し、loop が終了する。

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::DeciderConfig;
use crate::domain::{DecisionTask, HistoryEvent, TaskToken, WorkflowExecution};
use crate::error::{LoopError, TransportError};
use crate::observability::Heartbeat;
use crate::ports::{Interpreter, Notification, Notifier, OrchestrationService, PollForDecisionTask};

/// Polls for decision tasks and fans each one out to its own task.
pub struct DeciderLoop {
    service: Arc<dyn OrchestrationService>,
    notifier: Arc<dyn Notifier>,
    interpreter: Arc<dyn Interpreter>,
    config: Arc<DeciderConfig>,
    span: Span,
}

impl DeciderLoop {
    pub fn new(
        service: Arc<dyn OrchestrationService>,
        notifier: Arc<dyn Notifier>,
        interpreter: Arc<dyn Interpreter>,
        config: DeciderConfig,
    ) -> Self {
        let span = info_span!(
            "decider",
            identity = %config.identity,
            task_list = %config.task_list
        );
        Self {
            service,
            notifier,
            interpreter,
            config: Arc::new(config),
            span,
        }
    }

    /// Log under `span` instead of the default `decider` span.
    ///
    /// The caller owns the span (and the subscriber behind it).
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// Returns `Err` when a poll or respond call fails; the operator has
    /// already been notified by then. In-flight decision units are not joined.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), LoopError> {
        let span = self.span.clone();
        self.poll_loop(shutdown).instrument(span).await
    }

    async fn poll_loop(self, mut shutdown: watch::Receiver<bool>) -> Result<(), LoopError> {
        let request = PollForDecisionTask::from(self.config.as_ref());
        let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel::<TransportError>();
        let mut heartbeat = Heartbeat::new(self.config.heartbeat_every);

        info!(domain = %request.domain, "starting decider");

        loop {
            if *shutdown.borrow() {
                info!("decider stopping");
                return Ok(());
            }

            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown sender dropped; decider stopping");
                        return Ok(());
                    }
                    continue;
                }
                Some(err) = fatal_rx.recv() => {
                    return Err(self.abort("respond to decision task", err).await);
                }
                polled = self.service.poll_for_decision_task(&request) => polled,
            };

            let task = match polled {
                Ok(task) => task,
                Err(err) => return Err(self.abort("poll", err).await),
            };

            let Some(task) = task else {
                if heartbeat.idle() {
                    info!("no decisions required");
                }
                continue;
            };
            heartbeat.reset();

            let unit = DecisionUnit::new(
                task,
                Arc::clone(&self.service),
                Arc::clone(&self.notifier),
                Arc::clone(&self.interpreter),
                Arc::clone(&self.config),
                fatal_tx.clone(),
            );
            tokio::spawn(unit.run().in_current_span());
        }
    }

    /// Log, tell the operator, and hand back the fatal error.
    ///
    /// `operation` names the failed call in the alert subject.
    async fn abort(&self, operation: &str, err: TransportError) -> LoopError {
        error!(operation, error = %err, "orchestration service call failed; decider terminating");
        let notification = self.config.alerts.plain(
            format!("{} unable to {operation}", self.config.identity),
            err.to_string(),
        );
        send_best_effort(self.notifier.as_ref(), &notification).await;
        LoopError::Transport(err)
    }
}

/// One decision task, owned outright by the task that processes it.
pub(crate) struct DecisionUnit {
    token: TaskToken,
    execution: WorkflowExecution,
    events: Vec<HistoryEvent>,
    service: Arc<dyn OrchestrationService>,
    notifier: Arc<dyn Notifier>,
    interpreter: Arc<dyn Interpreter>,
    config: Arc<DeciderConfig>,
    fatal: mpsc::UnboundedSender<TransportError>,
}

impl DecisionUnit {
    pub(crate) fn new(
        task: DecisionTask,
        service: Arc<dyn OrchestrationService>,
        notifier: Arc<dyn Notifier>,
        interpreter: Arc<dyn Interpreter>,
        config: Arc<DeciderConfig>,
        fatal: mpsc::UnboundedSender<TransportError>,
    ) -> Self {
        let DecisionTask {
            token,
            execution,
            events,
        } = task;
        Self {
            token,
            execution,
            events,
            service,
            notifier,
            interpreter,
            config,
            fatal,
        }
    }

    pub(crate) async fn run(self) {
        let span = info_span!(
            "decision",
            workflow_id = %self.execution.workflow_id,
            run_id = %self.execution.run_id
        );
        self.decide().instrument(span).await
    }

    async fn decide(self) {
        info!(events = self.events.len(), "handling decision task");

        let interpretation = self
            .interpreter
            .interpret(&self.execution, &self.events)
            .await;

        if let Some(reason) = &interpretation.alert {
            let notification =
                self.config
                    .alerts
                    .notification(reason, &self.config.domain, &self.execution);
            send_best_effort(self.notifier.as_ref(), &notification).await;
        }

        let Some(decision) = interpretation.decision else {
            // token は使わずに捨てる。サービス側の task timeout に任せる。
            info!("no decision reached; leaving task token unredeemed");
            return;
        };

        let decision_type = decision.decision_type();
        let execution_context = decision.execution_context().to_string();
        match self
            .service
            .respond_decision_task_completed(self.token, vec![decision], execution_context)
            .await
        {
            Ok(()) => info!(decision = decision_type, "decision submitted"),
            Err(err) => {
                error!(decision = decision_type, error = %err, "unable to submit decision");
                // loop が既に止まっていれば受け手はいない
                let _ = self.fatal.send(err);
            }
        }
    }
}

/// Send an alert; failures are logged and swallowed.
pub(crate) async fn send_best_effort(notifier: &dyn Notifier, notification: &Notification) {
    match notifier.send_notification(notification).await {
        Ok(()) => info!(to = %notification.to, subject = %notification.subject, "operator notified"),
        Err(err) => warn!(error = %err, subject = %notification.subject, "notification failed"),
    }
}
