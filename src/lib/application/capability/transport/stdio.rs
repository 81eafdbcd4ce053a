use super::{RpcMessage, Transport, TransportError, TransportReply};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Pending = Arc<AsyncMutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;
type Writer = Arc<AsyncMutex<BufWriter<ChildStdin>>>;

/// Runs a capability server as a child process and exchanges
/// newline-delimited JSON-RPC over its stdin/stdout.
///
/// A process is only started by an `initialize` request. Once it exits,
/// every other request fails with [`TransportError::Closed`] until the next
/// handshake.
pub struct StdioTransport {
    inner: Arc<StdioInner>,
}

struct StdioInner {
    owner: String,
    command: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    workdir: Option<PathBuf>,
    process: AsyncMutex<Option<Process>>,
    generations: AtomicU64,
}

/// One spawned server and the state its reader task owns.
struct Process {
    generation: u64,
    child: Child,
    writer: Writer,
    pending: Pending,
    stop: CancellationToken,
}

impl StdioTransport {
    pub fn new(
        owner: String,
        command: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        workdir: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(StdioInner {
                owner,
                command,
                args,
                env,
                workdir,
                process: AsyncMutex::new(None),
                generations: AtomicU64::new(0),
            }),
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(
        &self,
        message: RpcMessage,
        _session: Option<&str>,
    ) -> Result<TransportReply, TransportError> {
        let waiting = {
            let mut slot = self.inner.process.lock().await;
            if message.method == "initialize" {
                if let Some(previous) = slot.take() {
                    debug!(owner = %self.inner.owner, "Restarting capability server for a new handshake");
                    previous.shutdown(&self.inner.owner).await;
                }
                *slot = Some(self.inner.spawn()?);
            }
            let process = slot.as_mut().ok_or(TransportError::Closed)?;

            let waiting = match message.id {
                Some(id) => {
                    let (tx, rx) = oneshot::channel();
                    process.pending.lock().await.insert(id, tx);
                    Some((id, rx))
                }
                None => None,
            };
            if let Err(err) = write_line(&process.writer, &message.to_json()).await {
                if let Some((id, _)) = &waiting {
                    process.pending.lock().await.remove(id);
                }
                return Err(err);
            }
            waiting
        };

        let Some((_, reply)) = waiting else {
            return Ok(TransportReply::default());
        };
        match reply.await {
            Ok(Ok(value)) => Ok(TransportReply {
                message: Some(value),
                session: None,
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(TransportError::Closed),
        }
    }

    async fn close(&self, _session: Option<&str>) -> Result<(), TransportError> {
        let previous = self.inner.process.lock().await.take();
        if let Some(process) = previous {
            process.shutdown(&self.inner.owner).await;
        }
        Ok(())
    }
}

impl StdioInner {
    fn spawn(self: &Arc<Self>) -> Result<Process, TransportError> {
        let mut command = Command::new(&self.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .args(&self.args)
            .envs(&self.env);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|err| TransportError::Unreachable(err.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TransportError::Io("failed to capture server stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TransportError::Io("failed to capture server stdout".into()))?;

        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let process = Process {
            generation,
            child,
            writer: Arc::new(AsyncMutex::new(BufWriter::new(stdin))),
            pending: Arc::new(AsyncMutex::new(HashMap::new())),
            stop: CancellationToken::new(),
        };
        let reader = Reader {
            owner: self.owner.clone(),
            generation,
            writer: Arc::clone(&process.writer),
            pending: Arc::clone(&process.pending),
            stop: process.stop.clone(),
            transport: Arc::downgrade(self),
        };
        tokio::spawn(reader.run(stdout));
        debug!(
            owner = %self.owner,
            command = %self.command.display(),
            generation,
            "Spawned capability server"
        );
        Ok(process)
    }

    /// Drops the running process if it is still `generation`.
    async fn retire(&self, generation: u64) {
        let mut slot = self.process.lock().await;
        if slot.as_ref().is_some_and(|process| process.generation == generation) {
            if let Some(process) = slot.take() {
                process.shutdown(&self.owner).await;
            }
        }
    }
}

impl Process {
    async fn shutdown(mut self, owner: &str) {
        self.stop.cancel();
        if let Err(err) = self.child.kill().await {
            debug!(owner, generation = self.generation, %err, "Capability server already exited");
        }
        fail_pending(&self.pending).await;
    }
}

struct Reader {
    owner: String,
    generation: u64,
    writer: Writer,
    pending: Pending,
    stop: CancellationToken,
    transport: Weak<StdioInner>,
}

impl Reader {
    async fn run(self, stdout: ChildStdout) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = tokio::select! {
                biased;
                _ = self.stop.cancelled() => return,
                line = lines.next_line() => line,
            };
            let raw = match line {
                Ok(Some(raw)) => raw,
                Ok(None) => break,
                Err(err) => {
                    debug!(owner = %self.owner, %err, "Failed to read from capability server");
                    break;
                }
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('\u{1b}') {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => self.dispatch(value).await,
                Err(err) => {
                    warn!(owner = %self.owner, line = trimmed, %err, "Ignoring non-JSON line from capability server");
                }
            }
        }

        warn!(owner = %self.owner, generation = self.generation, "Capability server exited");
        if let Some(transport) = self.transport.upgrade() {
            transport.retire(self.generation).await;
        }
        fail_pending(&self.pending).await;
    }

    async fn dispatch(&self, value: Value) {
        let method = value.get("method").and_then(Value::as_str).map(str::to_string);
        match (value.get("id").cloned(), method) {
            (Some(id), Some(method)) => self.answer_server_request(id, &method).await,
            (Some(id), None) => {
                let Some(key) = id.as_u64().or_else(|| id.as_str().and_then(|s| s.parse().ok()))
                else {
                    return;
                };
                let responder = self.pending.lock().await.remove(&key);
                match responder {
                    Some(sender) => {
                        let _ = sender.send(Ok(value));
                    }
                    None => debug!(owner = %self.owner, id = key, "Reply for unknown request"),
                }
            }
            (None, Some(method)) => {
                debug!(owner = %self.owner, method, "Notification from capability server");
            }
            (None, None) => {}
        }
    }

    async fn answer_server_request(&self, id: Value, method: &str) {
        let reply = if method == "ping" {
            json!({ "jsonrpc": "2.0", "id": id, "result": {} })
        } else {
            warn!(owner = %self.owner, method, "Capability server sent unsupported request");
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {
                    "code": -32601,
                    "message": format!("client does not implement method '{method}'"),
                }
            })
        };
        if let Err(err) = write_line(&self.writer, &reply).await {
            warn!(owner = %self.owner, %err, "Failed to answer server request");
        }
    }
}

async fn write_line(writer: &Writer, message: &Value) -> Result<(), TransportError> {
    let mut encoded = serde_json::to_string(message)
        .map_err(|err| TransportError::InvalidPayload(err.to_string()))?;
    encoded.push('\n');

    let mut stream = writer.lock().await;
    stream
        .write_all(encoded.as_bytes())
        .await
        .map_err(|err| TransportError::Io(err.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|err| TransportError::Io(err.to_string()))
}

async fn fail_pending(pending: &Pending) {
    for (_, sender) in pending.lock().await.drain() {
        let _ = sender.send(Err(TransportError::Closed));
    }
}
