//! `WorkerManager`: owns the worker table and drives a worker through
//! its transport's spawn/prompt/cancel lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use relay_budget::BudgetLedger;
use relay_core::{Method, ProviderDefinition, RelayError, RelayResult, RoutingDecision, Task, Worker, WorkerStatus};
use relay_router::Router;
use relay_transport_acp::AcpSession;
use relay_transport_api::{ApiClient, ApiEvent};
use relay_transport_cli::CliInvocation;
use tokio::sync::{mpsc, RwLock, Semaphore};
use uuid::Uuid;

use crate::events::WorkerEvent;
use crate::transport::WorkerTransport;
use crate::worker::WorkerRecord;
use crate::write_tracker::WriteTracker;

/// Default window a cancelled worker is given to reach a terminal state
/// cooperatively before the manager forces it.
const DEFAULT_CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Owns every live worker and the concurrency semaphore bounding how
/// many may run at once.
pub struct WorkerManager {
    router: Arc<Router>,
    ledger: Arc<BudgetLedger>,
    workers: RwLock<HashMap<String, Arc<WorkerRecord>>>,
    semaphore: Arc<Semaphore>,
    cancel_grace_period: Duration,
}

impl std::fmt::Debug for WorkerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerManager")
            .field("available_permits", &self.semaphore.available_permits())
            .finish_non_exhaustive()
    }
}

impl WorkerManager {
    /// Build a manager bounded to `max_concurrent_workers` live workers
    /// at a time, routing through `router` and recording each worker's
    /// actual cost to `router`'s own ledger once it terminates.
    #[must_use]
    pub fn new(router: Arc<Router>, max_concurrent_workers: usize) -> Self {
        let ledger = Arc::clone(router.ledger());
        Self {
            router,
            ledger,
            workers: RwLock::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(max_concurrent_workers)),
            cancel_grace_period: DEFAULT_CANCEL_GRACE_PERIOD,
        }
    }

    /// Override the cancel grace period, mainly for tests.
    #[must_use]
    pub fn with_cancel_grace_period(mut self, grace_period: Duration) -> Self {
        self.cancel_grace_period = grace_period;
        self
    }

    /// Route `task`, establish its transport, and register it in the
    /// worker table. Blocks if the manager is already at its concurrency
    /// limit.
    #[tracing::instrument(skip(self, task), fields(task_type = ?task.task_type))]
    pub async fn spawn(&self, task: Task) -> RelayResult<String> {
        let decision = self.router.route(&task).await?;

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .expect("semaphore is never closed");

        let provider = self
            .router
            .registry()
            .get(&decision.provider)
            .ok_or_else(|| RelayError::ProviderNotFound(decision.provider.clone()))?
            .clone();

        let transport = match decision.method {
            Method::Acp => self.spawn_acp(&provider, &decision).await?,
            Method::Cli => Self::spawn_cli(&provider, &decision),
            Method::Api => Self::spawn_api(&provider, &decision)?,
        };

        let id = Uuid::new_v4().to_string();
        let record = Arc::new(WorkerRecord::new(
            id.clone(),
            decision.provider.clone(),
            decision.method,
            task,
            transport,
            permit,
            decision.estimated_cost,
        ));

        self.workers.write().await.insert(id.clone(), Arc::clone(&record));

        tracing::info!(
            worker_id = %id,
            provider = %decision.provider,
            method = %decision.method,
            estimated_cost = decision.estimated_cost,
            "worker spawned"
        );

        Ok(id)
    }

    async fn spawn_acp(&self, provider: &ProviderDefinition, decision: &RoutingDecision) -> RelayResult<WorkerTransport> {
        let envs = provider
            .config_path
            .clone()
            .map(|cfg| ("OPENCODE_CONFIG".to_string(), relay_core::expand_env(&cfg)));

        let session = AcpSession::spawn(&provider.name, &[], envs)?;

        let write_paths: crate::transport::WritePaths = Arc::new(std::sync::Mutex::new(Vec::new()));
        session
            .register_tool_handler("fs/write_text_file", Arc::new(WriteTracker::new(Arc::clone(&write_paths))))
            .await;

        session.initialize("1.0", serde_json::json!({})).await?;
        session.session_new(&decision.provider, &decision.model).await?;
        Ok(WorkerTransport::Acp(Arc::new(session), write_paths))
    }

    fn spawn_cli(provider: &ProviderDefinition, decision: &RoutingDecision) -> WorkerTransport {
        let config_path = provider.config_path.as_deref().map(relay_core::expand_env);
        let mut invocation =
            CliInvocation::new(provider.name.as_str(), decision.provider.as_str(), decision.model.as_str(), config_path);
        if let Some(env_var) = &provider.api_key_env_var {
            if let Ok(value) = std::env::var(env_var) {
                invocation = invocation.with_credential_env(env_var.clone(), value);
            }
        }
        WorkerTransport::Cli(Arc::new(invocation))
    }

    fn spawn_api(provider: &ProviderDefinition, decision: &RoutingDecision) -> RelayResult<WorkerTransport> {
        let base_url = provider.base_url.as_deref().ok_or_else(|| {
            RelayError::InvalidTask(format!("provider {} has no base_url for the API method", provider.name))
        })?;
        let api_key = provider
            .api_key_env_var
            .as_ref()
            .and_then(|env_var| std::env::var(env_var).ok());
        let client = ApiClient::new(relay_core::expand_env(base_url), api_key, decision.provider.as_str(), decision.model.as_str());
        Ok(WorkerTransport::Api(Arc::new(client)))
    }

    /// Issue a prompt to a `Ready` or `Idle` worker, returning a channel
    /// of unified events. The channel closes after the terminal event.
    pub async fn prompt(&self, id: &str, text: &str) -> RelayResult<mpsc::UnboundedReceiver<WorkerEvent>> {
        let record = self.get(id).await?;
        record.set_status(WorkerStatus::Running);

        let (event_tx, event_rx) = mpsc::unbounded_channel();

        match record.transport().clone() {
            WorkerTransport::Acp(session, _) => {
                let updates = session.prompt(text).await?;
                spawn_acp_relay(Arc::clone(&record), Arc::clone(&self.ledger), updates, event_tx);
            },
            WorkerTransport::Cli(invocation) => {
                spawn_cli_relay(Arc::clone(&record), Arc::clone(&self.ledger), invocation, text.to_string(), event_tx);
            },
            WorkerTransport::Api(client) => {
                let events = client.complete(text).await?;
                spawn_api_relay(Arc::clone(&record), Arc::clone(&self.ledger), events, event_tx);
            },
        }

        Ok(event_rx)
    }

    /// Current `{status, progress, step}` for a worker.
    pub async fn status(&self, id: &str) -> RelayResult<(WorkerStatus, f64, Option<String>)> {
        let record = self.get(id).await?;
        let (progress, step) = record.progress();
        Ok((record.status(), progress, step))
    }

    /// Text written to `id`'s output buffer since `since_cursor`, plus
    /// the cursor to pass on the next call.
    pub async fn output(&self, id: &str, since_cursor: usize) -> RelayResult<(String, usize)> {
        let record = self.get(id).await?;
        Ok(record.output().read_since(since_cursor))
    }

    /// A worker's identity/status snapshot, plus its paths written
    /// (always empty outside ACP) and full output text. Used by the
    /// aggregator, which needs the whole picture rather than the
    /// cursor-paginated view `output` gives a streaming caller.
    pub async fn worker_report(&self, id: &str) -> RelayResult<(Worker, Vec<String>, String)> {
        let record = self.get(id).await?;
        let (output, _) = record.output().read_since(0);
        Ok((record.snapshot(), record.write_paths(), output))
    }

    /// Cooperatively cancel a worker: send the transport's own cancel
    /// signal, then force a transition to `Cancelled` if the worker
    /// hasn't reached a terminal state on its own within the grace
    /// period. Idempotent on an already-terminal worker.
    pub async fn cancel(&self, id: &str) -> RelayResult<()> {
        let record = self.get(id).await?;
        if record.status().is_terminal() {
            return Ok(());
        }

        match record.transport() {
            WorkerTransport::Acp(session, _) => session.cancel().await?,
            WorkerTransport::Cli(invocation) => invocation.cancel().await?,
            WorkerTransport::Api(client) => client.cancel().await?,
        }

        let record = Arc::clone(&record);
        let grace_period = self.cancel_grace_period;
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            record.set_status(WorkerStatus::Cancelled);
        });

        Ok(())
    }

    /// Snapshot every worker currently in the table, live or terminal
    /// but not yet reaped.
    pub async fn list(&self) -> Vec<Worker> {
        self.workers.read().await.values().map(|record| record.snapshot()).collect()
    }

    /// Remove a terminal worker's record from the table, releasing its
    /// output buffer and transport handle. Errors if the worker is still
    /// live, or does not exist.
    pub async fn reap(&self, id: &str) -> RelayResult<()> {
        let mut workers = self.workers.write().await;
        let record = workers.get(id).ok_or_else(|| RelayError::WorkerNotFound(id.to_string()))?;
        if !record.status().is_terminal() {
            return Err(RelayError::InvalidTask(format!(
                "worker {id} is still live; cancel it before reaping"
            )));
        }
        workers.remove(id);
        Ok(())
    }

    async fn get(&self, id: &str) -> RelayResult<Arc<WorkerRecord>> {
        self.workers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::WorkerNotFound(id.to_string()))
    }
}

/// Records `record`'s estimated cost to `ledger` the first time its
/// worker reaches a terminal state. There is no provider-reported usage
/// signal available at this transport layer, so the router's own
/// estimate, fixed at spawn time, is what gets recorded.
fn record_cost_once(record: &WorkerRecord, ledger: &BudgetLedger) {
    if record.mark_cost_recorded() {
        ledger.record(&record.provider, record.estimated_cost);
    }
}

fn spawn_acp_relay(
    record: Arc<WorkerRecord>,
    ledger: Arc<BudgetLedger>,
    mut updates: mpsc::UnboundedReceiver<relay_transport_acp::SessionUpdate>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) {
    tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            if let Some(text) = &update.text {
                record.output().append(text);
                let _ = event_tx.send(WorkerEvent::Output(text.clone()));
            }
            record.set_progress(update.progress, update.step.clone());
            let _ = event_tx.send(WorkerEvent::Progress {
                progress: update.progress,
                step: update.step,
            });
            if let Some(terminal) = update.terminal {
                let status = match terminal {
                    relay_transport_acp::TerminalOutcome::Completed => WorkerStatus::Completed,
                    relay_transport_acp::TerminalOutcome::Failed(_) => WorkerStatus::Failed,
                    relay_transport_acp::TerminalOutcome::Cancelled => WorkerStatus::Cancelled,
                };
                record.set_status(status);
                record_cost_once(&record, &ledger);
                let _ = event_tx.send(WorkerEvent::Terminal(record.status()));
                break;
            }
        }
    });
}

fn spawn_cli_relay(
    record: Arc<WorkerRecord>,
    ledger: Arc<BudgetLedger>,
    invocation: Arc<CliInvocation>,
    text: String,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) {
    tokio::spawn(async move {
        let status = match invocation.run(&text).await {
            Ok(outcome) => {
                record.output().append(&outcome.stdout);
                let _ = event_tx.send(WorkerEvent::Output(outcome.stdout));
                if outcome.success {
                    WorkerStatus::Completed
                } else {
                    WorkerStatus::Failed
                }
            },
            Err(e) => {
                tracing::warn!(worker_id = %record.id, error = %e, "cli invocation failed");
                WorkerStatus::Failed
            },
        };
        record.set_status(status);
        record_cost_once(&record, &ledger);
        let _ = event_tx.send(WorkerEvent::Terminal(record.status()));
    });
}

fn spawn_api_relay(
    record: Arc<WorkerRecord>,
    ledger: Arc<BudgetLedger>,
    mut events: mpsc::UnboundedReceiver<ApiEvent>,
    event_tx: mpsc::UnboundedSender<WorkerEvent>,
) {
    tokio::spawn(async move {
        let mut status = WorkerStatus::Completed;
        while let Some(event) = events.recv().await {
            match event {
                ApiEvent::TextDelta(delta) => {
                    record.output().append(&delta);
                    let _ = event_tx.send(WorkerEvent::Output(delta));
                },
                ApiEvent::Done => break,
                ApiEvent::Failed(message) => {
                    status = if message == "cancelled" {
                        WorkerStatus::Cancelled
                    } else {
                        WorkerStatus::Failed
                    };
                    break;
                },
            }
        }
        record.set_status(status);
        record_cost_once(&record, &ledger);
        let _ = event_tx.send(WorkerEvent::Terminal(record.status()));
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_budget::BudgetLedger;
    use relay_core::{Method, ProviderDefinition, ProviderRegistry, Task, TaskType};
    use relay_router::{DefaultRoutes, Router};

    use super::*;

    fn manager_with_provider(name: &str, method: Method) -> WorkerManager {
        let registry = ProviderRegistry::new(vec![ProviderDefinition::new(name, method, "model-1", "anthropic")])
            .expect("unique provider name");
        let ledger = Arc::new(BudgetLedger::new());
        let router = Arc::new(Router::new(registry, vec![], DefaultRoutes::default(), ledger));
        WorkerManager::new(router, 4).with_cancel_grace_period(Duration::from_millis(50))
    }

    fn task_forcing(provider: &str, method: Method) -> Task {
        let mut task = Task::new(TaskType::Implement, "echo something back");
        task.overrides.force_provider = Some(provider.to_string());
        task.overrides.force_method = Some(method);
        task
    }

    #[tokio::test]
    async fn spawn_and_prompt_a_cli_worker_to_completion() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();

        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Ready);

        let mut events = manager.prompt(&id, "hello").await.unwrap();
        let mut saw_terminal = None;
        while let Some(event) = events.recv().await {
            if let WorkerEvent::Terminal(status) = event {
                saw_terminal = Some(status);
            }
        }
        assert_eq!(saw_terminal, Some(WorkerStatus::Completed));

        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Completed);

        let (output, cursor) = manager.output(&id, 0).await.unwrap();
        assert!(output.contains("hello"));
        assert!(cursor > 0);
    }

    #[tokio::test]
    async fn failing_cli_worker_is_reported_as_failed() {
        let manager = manager_with_provider("/bin/false", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/false", Method::Cli)).await.unwrap();

        let mut events = manager.prompt(&id, "anything").await.unwrap();
        while events.recv().await.is_some() {}

        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Failed);
    }

    #[tokio::test]
    async fn unknown_worker_id_is_rejected_by_every_operation() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        assert!(matches!(
            manager.status("does-not-exist").await,
            Err(RelayError::WorkerNotFound(_))
        ));
        assert!(matches!(
            manager.output("does-not-exist", 0).await,
            Err(RelayError::WorkerNotFound(_))
        ));
        assert!(matches!(
            manager.cancel("does-not-exist").await,
            Err(RelayError::WorkerNotFound(_))
        ));
        assert!(matches!(
            manager.reap("does-not-exist").await,
            Err(RelayError::WorkerNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancelling_a_terminal_worker_is_a_no_op() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();

        let mut events = manager.prompt(&id, "hello").await.unwrap();
        while events.recv().await.is_some() {}

        manager.cancel(&id).await.unwrap();
        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_before_prompt_forces_cancelled_after_grace_period() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();

        manager.cancel(&id).await.unwrap();
        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Ready);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let (status, _, _) = manager.status(&id).await.unwrap();
        assert_eq!(status, WorkerStatus::Cancelled);
    }

    #[tokio::test]
    async fn reap_removes_a_terminal_worker_but_rejects_a_live_one() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();

        assert!(manager.reap(&id).await.is_err());

        let mut events = manager.prompt(&id, "hello").await.unwrap();
        while events.recv().await.is_some() {}

        manager.reap(&id).await.unwrap();
        assert!(matches!(manager.status(&id).await, Err(RelayError::WorkerNotFound(_))));
    }

    #[tokio::test]
    async fn list_reflects_spawned_workers() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        assert!(manager.list().await.is_empty());
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();
        let workers = manager.list().await;
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].id, id);
    }

    #[tokio::test]
    async fn completing_a_worker_records_its_cost_exactly_once() {
        let manager = manager_with_provider("/bin/echo", Method::Cli);
        let id = manager.spawn(task_forcing("/bin/echo", Method::Cli)).await.unwrap();

        let mut events = manager.prompt(&id, "hello").await.unwrap();
        while events.recv().await.is_some() {}

        let snapshot = manager.router.ledger().snapshot();
        let recorded = *snapshot.per_provider.get("/bin/echo").unwrap();
        assert!(recorded > 0.0);
    }
}
