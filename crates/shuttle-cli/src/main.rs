use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shuttle_core::app::{
    ActivityRegistry, ActivityWorker, DeciderLoop, FirstDecidableInterpreter, InterpreterSettings,
};
use shuttle_core::config::{ActivityWorkerConfig, AlertConfig, DeciderConfig, ShuttleConfig};
use shuttle_core::domain::{NextActivityPlan, WorkflowExecution};
use shuttle_core::error::{ContinuationError, HandlerError, LoopError};
use shuttle_core::impls::{ExecutionStatus, InMemoryOrchestration, LogNotifier};
use shuttle_core::ports::{ActivityHandler, ContinuationFn};

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Drive workflows with a decider and an activity worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run loadData -> publish end-to-end against an in-process service
    Demo {
        /// Routing key; also the task list the activities run on
        #[arg(long, default_value = "S123")]
        supplier_id: String,

        /// Make the publish activity fail
        #[arg(long)]
        fail: bool,

        /// Config file (JSON); built-in defaults when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Give up waiting for the workflow after this many seconds
        #[arg(long, default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Load and validate a config file
    CheckConfig {
        /// Path to the JSON config
        path: PathBuf,
    },
}

#[derive(Debug, Deserialize)]
struct LoadDataInput {
    #[serde(rename = "SupplierID")]
    supplier_id: String,
}

/// worker 側の demo handler: supplier ごとの行数を返すだけ
struct LoadData;

#[async_trait]
impl ActivityHandler for LoadData {
    async fn handle(&self, _activity: &str, input: &str) -> Result<String, HandlerError> {
        let p: LoadDataInput = serde_json::from_str(input)
            .map_err(|e| HandlerError::failed(format!("json decode: {e}")))?;
        info!(supplier = %p.supplier_id, "loading data");
        Ok(serde_json::json!({ "supplier": p.supplier_id, "rows": 3 }).to_string())
    }
}

struct Publish {
    fail: bool,
}

#[async_trait]
impl ActivityHandler for Publish {
    async fn handle(&self, _activity: &str, _input: &str) -> Result<String, HandlerError> {
        if self.fail {
            return Err(HandlerError::failed("publish rejected by target"));
        }
        Ok("published".to_string())
    }
}

fn default_config(supplier_id: &str) -> ShuttleConfig {
    ShuttleConfig {
        decider: DeciderConfig::new(
            "Demo",
            "DemoDecider",
            "shuttle-decider",
            "loadData",
            AlertConfig {
                from: "shuttle@example.com".to_string(),
                to: "helpdesk@example.com".to_string(),
                console_url: None,
            },
        ),
        worker: ActivityWorkerConfig::new("Demo", supplier_id, "shuttle-worker"),
    }
}

async fn demo(
    supplier_id: String,
    fail: bool,
    config: Option<PathBuf>,
    timeout: Duration,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => ShuttleConfig::load(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => default_config(&supplier_id),
    };
    // activity は routing key の task list に流れる
    config.worker.task_list = supplier_id.clone();

    // (A) service と handler を用意
    let service = Arc::new(InMemoryOrchestration::new().with_poll_timeout(Duration::from_secs(1)));

    let mut registry = ActivityRegistry::new();
    registry.register("loadData", Arc::new(LoadData))?;
    registry.register("publish", Arc::new(Publish { fail }))?;

    let task_list = supplier_id.clone();
    let continuation = ContinuationFn::new(move |last: &str| match last {
        "loadData" => Ok(NextActivityPlan::schedule(
            "publish",
            "1",
            "{}",
            task_list.clone(),
        )),
        "publish" => Ok(NextActivityPlan::complete("published")),
        other => Err(ContinuationError::new(format!(
            "no activity follows {other:?}"
        ))),
    });
    let interpreter = FirstDecidableInterpreter::new(
        InterpreterSettings::from(&config.decider),
        Arc::new(continuation),
    );

    // (B) decider と worker を起動
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let decider = DeciderLoop::new(
        service.clone(),
        Arc::new(LogNotifier),
        Arc::new(interpreter),
        config.decider.clone(),
    );
    let worker = ActivityWorker::new(service.clone(), Arc::new(registry), config.worker.clone());
    let mut decider = tokio::spawn(decider.run(shutdown_rx.clone()));
    let mut worker = tokio::spawn(worker.run(shutdown_rx));

    // (C) workflow を開始
    let input = serde_json::json!({ "SupplierID": supplier_id }).to_string();
    let execution = service
        .start_workflow_execution("demo", config.decider.task_list.clone(), input)
        .await;
    info!(%execution, "workflow started");

    // (D) 完了 / 失敗を待つ（Ctrl-C で中断、loop が先に落ちたらそのエラーを返す）
    let status = await_close(&service, &execution, timeout, &mut decider, &mut worker).await?;

    // (E) loop を止める
    let _ = shutdown_tx.send(true);
    decider.await??;
    worker.await??;

    for event in service.history(&execution).await {
        println!("{}", serde_json::to_string(&event)?);
    }

    match status {
        Some(ExecutionStatus::Completed { result }) => {
            println!("workflow completed: {result}");
            Ok(())
        }
        Some(ExecutionStatus::Failed { reason, details }) => {
            bail!("workflow failed: {reason}: {details}")
        }
        Some(ExecutionStatus::Running) | None => {
            bail!("workflow did not finish within {}s", timeout.as_secs())
        }
    }
}

type LoopHandle = JoinHandle<Result<(), LoopError>>;

/// Wait for the workflow to close, or for either loop to stop first.
///
/// A loop that ends before the workflow does is an error, even if it ended
/// cleanly.
async fn await_close(
    service: &InMemoryOrchestration,
    execution: &WorkflowExecution,
    timeout: Duration,
    decider: &mut LoopHandle,
    worker: &mut LoopHandle,
) -> anyhow::Result<Option<ExecutionStatus>> {
    tokio::select! {
        status = service.wait_for_close(execution, timeout) => Ok(status),
        joined = decider => {
            joined?.context("decider stopped")?;
            bail!("decider stopped before the workflow finished")
        }
        joined = worker => {
            joined?.context("activity worker stopped")?;
            bail!("activity worker stopped before the workflow finished")
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; stopping loops");
            Ok(None)
        }
    }
}

fn check_config(path: PathBuf) -> anyhow::Result<()> {
    let config = ShuttleConfig::load(&path)
        .with_context(|| format!("loading config {}", path.display()))?;
    println!(
        "ok: decider {} on {}/{}, worker {} on {}/{}",
        config.decider.identity,
        config.decider.domain,
        config.decider.task_list,
        config.worker.identity,
        config.worker.domain,
        config.worker.task_list,
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo {
            supplier_id,
            fail,
            config,
            timeout_secs,
        } => demo(supplier_id, fail, config, Duration::from_secs(timeout_secs)).await,
        Commands::CheckConfig { path } => check_config(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuttle_core::error::TransportError;
    use std::time::Instant;

    fn loop_failing_with(err: TransportError) -> LoopHandle {
        tokio::spawn(async move { Err(LoopError::Transport(err)) })
    }

    fn idle_loop() -> LoopHandle {
        tokio::spawn(std::future::pending())
    }

    #[tokio::test]
    async fn dead_decider_ends_the_wait_with_its_error() {
        let service = InMemoryOrchestration::new();
        let execution = service
            .start_workflow_execution("demo", "DemoDecider", r#"{"SupplierID":"S123"}"#)
            .await;
        let mut decider =
            loop_failing_with(TransportError::Unavailable("connection refused".to_string()));
        let mut worker = idle_loop();
        let started = Instant::now();

        let err = await_close(
            &service,
            &execution,
            Duration::from_secs(10),
            &mut decider,
            &mut worker,
        )
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        let chain = format!("{err:#}");
        assert!(chain.contains("decider stopped"), "{chain}");
        assert!(chain.contains("connection refused"), "{chain}");
        worker.abort();
    }

    #[tokio::test]
    async fn running_workflow_times_out_without_status() {
        let service = InMemoryOrchestration::new();
        let execution = service
            .start_workflow_execution("demo", "DemoDecider", r#"{"SupplierID":"S123"}"#)
            .await;
        let mut decider = idle_loop();
        let mut worker = idle_loop();

        let status = await_close(
            &service,
            &execution,
            Duration::from_millis(50),
            &mut decider,
            &mut worker,
        )
        .await
        .unwrap();

        assert_eq!(status, None);
        decider.abort();
        worker.abort();
    }
}
