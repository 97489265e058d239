//! ActivityWorker - activity task の実行ループ
//!
//! # フロー
//! 1. OrchestrationService::poll_for_activity_task() で task を取得
//! 2. ActivityHandler を同期的に実行（実行中は次の poll をしない）
//! 3. 成功: respond_activity_task_completed / 失敗: respond_activity_task_failed
//!
//! 同時実行は 1 worker につき 1 activity まで。スケールさせたい場合は
//! 同じ task list に worker プロセスを複数立てる（competing consumers）。
//! poll / respond の transport error は致命的で、loop は Err を返して終わる。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, Span, error, info, info_span, warn};

use crate::config::ActivityWorkerConfig;
use crate::domain::ActivityTask;
use crate::error::{LoopError, TransportError};
use crate::observability::Heartbeat;
use crate::ports::{ActivityHandler, OrchestrationService, PollForActivityTask};

pub struct ActivityWorker {
    service: Arc<dyn OrchestrationService>,
    handler: Arc<dyn ActivityHandler>,
    config: ActivityWorkerConfig,
    span: Span,
}

impl ActivityWorker {
    pub fn new(
        service: Arc<dyn OrchestrationService>,
        handler: Arc<dyn ActivityHandler>,
        config: ActivityWorkerConfig,
    ) -> Self {
        let span = info_span!(
            "activity_worker",
            identity = %config.identity,
            task_list = %config.task_list
        );
        Self {
            service,
            handler,
            config,
            span,
        }
    }

    /// Log under `span` instead of the default `activity_worker` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Poll, handle, report, repeat until `shutdown` flips to `true`.
    ///
    /// Shutdown does not cancel a running handler; it only stops taking new
    /// tasks.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), LoopError> {
        let span = self.span.clone();
        self.poll_loop(shutdown).instrument(span).await
    }

    async fn poll_loop(self, mut shutdown: watch::Receiver<bool>) -> Result<(), LoopError> {
        let request = PollForActivityTask::from(&self.config);
        let mut heartbeat = Heartbeat::new(self.config.heartbeat_every);

        info!(domain = %request.domain, "starting activity worker");

        loop {
            if *shutdown.borrow() {
                info!("activity worker stopping");
                return Ok(());
            }

            // poll は待つ可能性があるので select で shutdown と競合させる
            let polled = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        info!("shutdown sender dropped; activity worker stopping");
                        return Ok(());
                    }
                    continue;
                }
                polled = self.service.poll_for_activity_task(&request) => polled,
            };

            let task = match polled {
                Ok(task) => task,
                Err(err) => {
                    error!(error = %err, "unable to poll for activity task; worker terminating");
                    return Err(LoopError::Transport(err));
                }
            };

            let Some(task) = task else {
                if heartbeat.idle() {
                    info!("no activity required");
                }
                continue;
            };
            heartbeat.reset();

            if let Err(err) = self.execute(task).await {
                error!(error = %err, "unable to report activity result; worker terminating");
                return Err(LoopError::Transport(err));
            }
        }
    }

    /// Run one task to completion and redeem its token exactly once.
    async fn execute(&self, task: ActivityTask) -> Result<(), TransportError> {
        let ActivityTask {
            token,
            activity_id,
            activity_type,
            execution,
            input,
        } = task;
        let span = info_span!(
            "activity",
            activity = %activity_type.name,
            activity_id = %activity_id,
            workflow_id = %execution.workflow_id
        );

        async move {
            info!("activity started");
            match self.handler.handle(&activity_type.name, &input).await {
                Ok(result) => {
                    info!("setting task as completed");
                    self.service
                        .respond_activity_task_completed(token, result)
                        .await
                }
                Err(err) => {
                    warn!(error = %err, input = %input, "setting task as failed");
                    self.service
                        .respond_activity_task_failed(token, err.to_string())
                        .await
                }
            }
        }
        .instrument(span)
        .await
    }
}
