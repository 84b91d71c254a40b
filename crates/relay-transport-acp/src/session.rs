//! `AcpSession`: the ACP handshake/prompt/cancel state machine.
//!
//! Reads and writes are each driven by their own scheduling unit (a
//! `tokio::spawn`ed task) connected to the public API through channels,
//! the way the design doc's concurrency notes ask for: a writer task
//! drains an outbound line queue, a reader task is the sole JSON-RPC
//! correlator and consumes the inbound line queue, matching responses
//! against a pending-request table and fanning notifications out to
//! whichever caller is currently awaiting a prompt.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{RwLock, mpsc, oneshot};

use crate::error::{AcpError, AcpResult};
use crate::framing;
use crate::protocol::{InboundMessage, Notification, RawMessage, Request, Response, RpcError};

/// Handshake/prompt lifecycle state. See the module doc comment and the
/// design doc's ACP state machine diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport established, nothing sent yet.
    Created,
    /// `initialize` completed.
    Initialized,
    /// `authenticate` completed. Skipped entirely when the server does
    /// not advertise authentication, in which case the session goes
    /// straight from `Initialized` to `SessionReady`.
    Authenticated,
    /// `session/new` completed; a session id has been assigned.
    SessionReady,
    /// A `session/prompt` call is in flight.
    Prompting,
    /// Session is ready to prompt, not currently doing so.
    Idle,
    /// The transport has closed, explicitly or otherwise. Terminal.
    Closed,
}

/// One `session/update` event, or the final event of a prompt.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    /// Monotonically increasing progress in `[0, 1]`.
    pub progress: f64,
    /// Optional human-readable step description.
    pub step: Option<String>,
    /// Streamed partial output text, if the provider sent any.
    pub text: Option<String>,
    /// Set only on the final update of a prompt.
    pub terminal: Option<TerminalOutcome>,
}

/// How a prompt concluded.
#[derive(Debug, Clone)]
pub enum TerminalOutcome {
    /// The provider finished successfully.
    Completed,
    /// The provider reported a failure.
    Failed(String),
    /// The prompt was cancelled.
    Cancelled,
}

/// A handler for a reverse tool call such as `fs/read_text_file`.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Handle one reverse call and produce its JSON-RPC result, or an
    /// error message that becomes a `-32603 Internal error` response.
    async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, String>;
}

/// The outcome of a `permission/request` mid-prompt.
#[derive(Debug, Clone)]
pub struct PermissionDecision {
    /// Whether the action is approved.
    pub approved: bool,
    /// Reason, present particularly on denial.
    pub reason: Option<String>,
}

/// A handler for `permission/request` calls.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Decide whether to approve a permission request.
    async fn handle(&self, params: Option<Value>) -> PermissionDecision;
}

type PendingTable = Arc<StdMutex<HashMap<u64, oneshot::Sender<Response>>>>;
type ToolHandlers = Arc<RwLock<HashMap<String, Arc<dyn ToolHandler>>>>;

/// An ACP session: a JSON-RPC 2.0 connection to a provider subprocess
/// over ndjson stdio.
pub struct AcpSession {
    outbound_tx: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
    pending: PendingTable,
    state: Arc<StdMutex<SessionState>>,
    session_id: Arc<StdMutex<Option<String>>>,
    tool_handlers: ToolHandlers,
    permission_handler: Arc<RwLock<Option<Arc<dyn PermissionHandler>>>>,
    current_update_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<SessionUpdate>>>>,
    capabilities: Arc<StdMutex<Option<Value>>>,
    reader_task: tokio::task::JoinHandle<()>,
    writer_task: tokio::task::JoinHandle<()>,
    child: Option<StdMutex<Child>>,
}

impl std::fmt::Debug for AcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcpSession")
            .field("state", &self.state())
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}

impl AcpSession {
    /// Spawn a provider subprocess and attach a session to its stdio.
    pub fn spawn(
        program: &str,
        args: &[String],
        env: impl IntoIterator<Item = (String, String)>,
    ) -> AcpResult<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| AcpError::SpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AcpError::SpawnFailed("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AcpError::SpawnFailed("child stdout not captured".to_string()))?;

        let mut session = Self::from_io(BufReader::new(stdout), stdin);
        session.child = Some(StdMutex::new(child));
        Ok(session)
    }

    /// Attach a session to an arbitrary async byte stream. Used directly
    /// by tests (over `tokio::io::duplex`), and internally by `spawn`.
    pub fn from_io<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let pending: PendingTable = Arc::new(StdMutex::new(HashMap::new()));
        let state = Arc::new(StdMutex::new(SessionState::Created));
        let session_id = Arc::new(StdMutex::new(None));
        let tool_handlers: ToolHandlers = Arc::new(RwLock::new(HashMap::new()));
        let permission_handler = Arc::new(RwLock::new(None));
        let current_update_tx = Arc::new(StdMutex::new(None));
        let capabilities = Arc::new(StdMutex::new(None));

        let writer_task = tokio::spawn(Self::run_writer(writer, outbound_rx));
        let reader_task = tokio::spawn(Self::run_reader(
            reader,
            outbound_tx.clone(),
            pending.clone(),
            state.clone(),
            tool_handlers.clone(),
            permission_handler.clone(),
            current_update_tx.clone(),
        ));

        Self {
            outbound_tx,
            next_id: AtomicU64::new(1),
            pending,
            state,
            session_id,
            tool_handlers,
            permission_handler,
            current_update_tx,
            capabilities,
            reader_task,
            writer_task,
            child: None,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The session id assigned by `session/new`, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Server-advertised capability flags from the `initialize` response.
    #[must_use]
    pub fn capabilities(&self) -> Option<Value> {
        self.capabilities
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Register a handler for a reverse tool call method, e.g.
    /// `fs/read_text_file`. Calls with no registered handler receive a
    /// `-32601 Method not found` response.
    pub async fn register_tool_handler(&self, method: impl Into<String>, handler: Arc<dyn ToolHandler>) {
        self.tool_handlers.write().await.insert(method.into(), handler);
    }

    /// Register a handler for `permission/request` calls. Without one,
    /// every permission request is denied.
    pub async fn set_permission_handler(&self, handler: Arc<dyn PermissionHandler>) {
        *self.permission_handler.write().await = Some(handler);
    }

    /// Perform the `initialize` handshake.
    #[tracing::instrument(skip(self, capabilities))]
    pub async fn initialize(&self, protocol_version: &str, capabilities: Value) -> AcpResult<Value> {
        let result = self
            .send_request(
                "initialize",
                Some(serde_json::json!({
                    "protocolVersion": protocol_version,
                    "capabilities": capabilities,
                })),
            )
            .await?;

        let server_version = result.get("protocolVersion").and_then(Value::as_str);
        if let Some(server_version) = server_version {
            if server_version != protocol_version {
                self.set_state(SessionState::Closed);
                return Err(AcpError::HandshakeFailed(format!(
                    "protocol version mismatch: requested {protocol_version}, server reported {server_version}"
                )));
            }
        }

        *self.capabilities.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(result.clone());
        self.set_state(SessionState::Initialized);
        Ok(result)
    }

    /// Perform the optional `authenticate` step. Callers should skip this
    /// entirely when `capabilities()` does not advertise authentication.
    pub async fn authenticate(&self, params: Option<Value>) -> AcpResult<()> {
        self.send_request("authenticate", params).await?;
        self.set_state(SessionState::Authenticated);
        Ok(())
    }

    /// Perform `session/new`, returning the assigned session id.
    pub async fn session_new(&self, provider: &str, model: &str) -> AcpResult<String> {
        let result = self
            .send_request(
                "session/new",
                Some(serde_json::json!({ "provider": provider, "model": model })),
            )
            .await?;
        let id = result
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| AcpError::HandshakeFailed("session/new response missing sessionId".to_string()))?
            .to_string();
        *self.session_id.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(id.clone());
        self.set_state(SessionState::SessionReady);
        self.set_state(SessionState::Idle);
        Ok(id)
    }

    /// Issue `session/prompt`, returning a channel of `SessionUpdate`
    /// events. The channel closes once the terminal update has been
    /// delivered.
    #[tracing::instrument(skip(self, text))]
    pub async fn prompt(&self, text: &str) -> AcpResult<mpsc::UnboundedReceiver<SessionUpdate>> {
        if self.state() == SessionState::Closed {
            return Err(AcpError::Closed);
        }
        if self.state() == SessionState::Prompting {
            return Err(AcpError::AlreadyPrompting);
        }

        let (update_tx, update_rx) = mpsc::unbounded_channel();
        *self
            .current_update_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(update_tx);
        self.set_state(SessionState::Prompting);

        let session_id = self.session_id();
        let params = serde_json::json!({ "sessionId": session_id, "prompt": text });

        // `session/prompt`'s own response just acknowledges receipt; the
        // actual outcome streams in as `session/update` notifications and
        // is observed through `update_rx`.
        if let Err(e) = self.send_request("session/prompt", Some(params)).await {
            self.set_state(SessionState::Idle);
            *self
                .current_update_tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
            return Err(e);
        }

        Ok(update_rx)
    }

    /// Cancel the in-flight prompt. A no-op if the session is not
    /// currently prompting.
    pub async fn cancel(&self) -> AcpResult<()> {
        if self.state() != SessionState::Prompting {
            return Ok(());
        }
        let session_id = self.session_id();
        self.send_request(
            "session/cancel",
            Some(serde_json::json!({ "sessionId": session_id })),
        )
        .await?;
        Ok(())
    }

    /// Close the session: stop the reader/writer tasks and, if this
    /// session owns a subprocess, kill it.
    pub async fn close(self) {
        self.set_state(SessionState::Closed);
        self.reader_task.abort();
        self.writer_task.abort();
        if let Some(child) = &self.child {
            let mut child = child.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let _ = child.start_kill();
        }
    }

    fn set_state(&self, new_state: SessionState) {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if *state == SessionState::Closed {
            return;
        }
        *state = new_state;
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> AcpResult<Value> {
        if self.state() == SessionState::Closed {
            return Err(AcpError::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, tx);

        let request = Request::new(id, method, params);
        let line = serde_json::to_string(&request).map_err(|e| AcpError::MalformedMessage(e.to_string()))?;
        self.outbound_tx
            .send(line)
            .map_err(|_| AcpError::Closed)?;

        let response = rx.await.map_err(|_| AcpError::Closed)?;
        match response.error {
            Some(err) => Err(AcpError::Remote {
                code: err.code,
                message: err.message,
            }),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }

    async fn run_writer<W>(mut writer: W, mut outbound_rx: mpsc::UnboundedReceiver<String>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        while let Some(line) = outbound_rx.recv().await {
            if let Err(e) = framing::write_line(&mut writer, &line).await {
                tracing::warn!(error = %e, "acp writer failed, stopping");
                break;
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_reader<R>(
        mut reader: R,
        outbound_tx: mpsc::UnboundedSender<String>,
        pending: PendingTable,
        state: Arc<StdMutex<SessionState>>,
        tool_handlers: ToolHandlers,
        permission_handler: Arc<RwLock<Option<Arc<dyn PermissionHandler>>>>,
        current_update_tx: Arc<StdMutex<Option<mpsc::UnboundedSender<SessionUpdate>>>>,
    ) where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        loop {
            let line = match framing::read_line(&mut reader).await {
                Ok(Some(line)) if !line.trim().is_empty() => line,
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "acp reader io error, stopping");
                    break;
                }
            };

            Self::handle_line(
                &line,
                &outbound_tx,
                &pending,
                &tool_handlers,
                &permission_handler,
                &current_update_tx,
            )
            .await;
        }

        Self::close_with_synthetic_cancellation(&pending, &current_update_tx);
        let mut guard = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = SessionState::Closed;
    }

    async fn handle_line(
        line: &str,
        outbound_tx: &mpsc::UnboundedSender<String>,
        pending: &PendingTable,
        tool_handlers: &ToolHandlers,
        permission_handler: &Arc<RwLock<Option<Arc<dyn PermissionHandler>>>>,
        current_update_tx: &Arc<StdMutex<Option<mpsc::UnboundedSender<SessionUpdate>>>>,
    ) {
        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "could not parse ACP message as JSON, dropping");
                return;
            }
        };

        let raw: RawMessage = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(_) => {
                if let Some(id) = value.get("id").cloned() {
                    let response = Response::failure(
                        id,
                        RpcError::new(crate::protocol::PARSE_ERROR, "malformed JSON-RPC message"),
                    );
                    if let Ok(text) = serde_json::to_string(&response) {
                        let _ = outbound_tx.send(text);
                    }
                } else {
                    tracing::warn!(line, "malformed message with no id, logging only");
                }
                return;
            }
        };

        match raw.classify() {
            Some(InboundMessage::Response(response)) => {
                Self::handle_response(response, pending);
            }
            Some(InboundMessage::Request(request)) => {
                Self::handle_request(request, outbound_tx.clone(), tool_handlers.clone(), permission_handler.clone());
            }
            Some(InboundMessage::Notification(notification)) => {
                Self::handle_notification(notification, current_update_tx);
            }
            None => {
                tracing::debug!(line, "unrecognized ACP message shape, dropping");
            }
        }
    }

    fn handle_response(response: Response, pending: &PendingTable) {
        let Some(id) = response.id.as_u64() else {
            tracing::warn!("orphan response with non-numeric id dropped");
            return;
        };
        let sender = pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&id);
        match sender {
            Some(sender) => {
                let _ = sender.send(response);
            }
            None => {
                tracing::warn!(id, "orphan response dropped: no pending request with this id");
            }
        }
    }

    fn handle_request(
        request: Request,
        outbound_tx: mpsc::UnboundedSender<String>,
        tool_handlers: ToolHandlers,
        permission_handler: Arc<RwLock<Option<Arc<dyn PermissionHandler>>>>,
    ) {
        // Handlers run in their own task so a slow or misbehaving handler
        // can never block the correlator from servicing other messages.
        tokio::spawn(async move {
            let response = if request.method == "permission/request" {
                let decision = match permission_handler.read().await.as_ref() {
                    Some(handler) => handler.handle(request.params.clone()).await,
                    None => PermissionDecision {
                        approved: false,
                        reason: Some("no permission handler registered".to_string()),
                    },
                };
                Response::success(
                    request.id.clone(),
                    serde_json::json!({ "approved": decision.approved, "reason": decision.reason }),
                )
            } else {
                let handler = tool_handlers.read().await.get(&request.method).cloned();
                match handler {
                    None => Response::failure(request.id.clone(), RpcError::method_not_found(&request.method)),
                    Some(handler) => match handler.handle(&request.method, request.params.clone()).await {
                        Ok(result) => Response::success(request.id.clone(), result),
                        Err(e) => Response::failure(request.id.clone(), RpcError::internal(e)),
                    },
                }
            };

            if let Ok(text) = serde_json::to_string(&response) {
                let _ = outbound_tx.send(text);
            }
        });
    }

    fn handle_notification(
        notification: Notification,
        current_update_tx: &Arc<StdMutex<Option<mpsc::UnboundedSender<SessionUpdate>>>>,
    ) {
        if notification.method != "session/update" {
            tracing::debug!(method = %notification.method, "orphan notification with unregistered method dropped");
            return;
        }

        let params = notification.params.unwrap_or(Value::Null);
        let progress = params.get("progress").and_then(Value::as_f64).unwrap_or(0.0);
        let step = params.get("step").and_then(Value::as_str).map(str::to_string);
        let text = params.get("text").and_then(Value::as_str).map(str::to_string);
        let status = params.get("status").and_then(Value::as_str);

        let terminal = match status {
            Some("completed") => Some(TerminalOutcome::Completed),
            Some("failed") => Some(TerminalOutcome::Failed(
                params.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string(),
            )),
            Some("cancelled") => Some(TerminalOutcome::Cancelled),
            _ => None,
        };

        let update = SessionUpdate { progress, step, text, terminal: terminal.clone() };

        let mut guard = current_update_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(update);
        }
        if terminal.is_some() {
            // Dropping the sender closes the caller's stream, signalling
            // that the prompt has resolved.
            *guard = None;
        }
    }

    fn close_with_synthetic_cancellation(
        pending: &PendingTable,
        current_update_tx: &Arc<StdMutex<Option<mpsc::UnboundedSender<SessionUpdate>>>>,
    ) {
        let mut pending = pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, sender) in pending.drain() {
            let synthetic = Response::failure(
                Value::Null,
                RpcError::new(crate::protocol::INTERNAL_ERROR, "transport closed before response arrived"),
            );
            let _ = sender.send(synthetic);
        }
        drop(pending);

        let mut guard = current_update_tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(tx) = guard.take() {
            let _ = tx.send(SessionUpdate {
                progress: 1.0,
                step: None,
                text: None,
                terminal: Some(TerminalOutcome::Failed("transport closed".to_string())),
            });
        }
    }
}
