//! The transport session owning the server process and its stdio
//!
//! All outbound packets flow through a single writer task (one complete,
//! newline-terminated line per packet); a reader task splits stdout into
//! lines and routes them: responses back into the scheduler, events onto
//! the broadcast bus, plain text and `log` events to the tracing sink.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BridgeError, Result};
use crate::process::spawn_server;
use crate::process::ProcessHandle;
use crate::protocol::wire::{
    self, Decoded, DropReason, EventPacket, ResponsePacket, LOG_EVENT, STARTED_EVENT,
};
use crate::queue::{DispatchFn, PendingRequest, RequestQueueCollection};
use crate::types::{ServerEvent, ServerOptions, SessionState};

/// Log target for text the server itself produced
const SERVER_LOG_TARGET: &str = "omnisharp_bridge::server";

struct Inner {
    options: ServerOptions,
    /// Present only while a transport is attached
    scheduler: Mutex<Option<RequestQueueCollection>>,
    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<ServerEvent>,
    /// Sequence ids are assigned at send time and never reset, not even
    /// across restarts; a reset would make correlation ambiguous
    seq: Arc<AtomicU64>,
    next_handle: AtomicU64,
    process: Mutex<Option<ProcessHandle>>,
}

/// One session with an external analysis server
///
/// Cloning yields another handle to the same session. Must be created and
/// used inside a tokio runtime; the transport runs on spawned tasks.
#[derive(Clone)]
pub struct ServerSession {
    inner: Arc<Inner>,
}

impl ServerSession {
    /// Create a session that has not been started yet
    pub fn new(options: ServerOptions) -> Self {
        let (state_tx, _) = watch::channel(SessionState::NotStarted);
        let (events, _) = broadcast::channel(128);

        Self {
            inner: Arc::new(Inner {
                options,
                scheduler: Mutex::new(None),
                state_tx,
                events,
                seq: Arc::new(AtomicU64::new(1)),
                next_handle: AtomicU64::new(1),
                process: Mutex::new(None),
            }),
        }
    }

    /// Attach to an already-running server over arbitrary byte streams
    ///
    /// The session is immediately `Ready`; no process is owned, so `stop`
    /// only aborts outstanding requests. This is also how the protocol
    /// plumbing is exercised in tests.
    pub fn connect_streams<R, W>(options: ServerOptions, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let session = Self::new(options);
        session.attach(reader, writer);
        session.inner.state_tx.send_replace(SessionState::Ready);
        session
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    /// Observe lifecycle transitions, including the started/stopped pair
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Whether requests may currently be sent
    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Subscribe to named server events
    ///
    /// `log` events never appear here; they are redirected to the
    /// diagnostic sink.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inner.events.subscribe()
    }

    /// Launch the server process and wait for its readiness event
    ///
    /// Fails fast with `StartTimeout` or `ProcessExited` instead of hanging;
    /// either way the child is killed and the session ends up `Stopped`,
    /// from which `start` may be called again.
    pub async fn start(&self) -> Result<()> {
        let state = self.state();
        if !matches!(state, SessionState::NotStarted | SessionState::Stopped) {
            return Err(BridgeError::NotReady { state });
        }

        self.inner.options.validate()?;
        self.inner.state_tx.send_replace(SessionState::Starting);
        info!(executable = %self.inner.options.executable, "starting analysis server");

        let mut handle = match spawn_server(&self.inner.options) {
            Ok(handle) => handle,
            Err(err) => {
                self.inner.state_tx.send_replace(SessionState::Stopped);
                return Err(err);
            }
        };

        let (stdin, stdout, stderr) = handle.take_stdio();
        let (Some(stdin), Some(stdout)) = (stdin, stdout) else {
            handle.kill_tree().await;
            self.inner.state_tx.send_replace(SessionState::Stopped);
            return Err(BridgeError::Spawn(std::io::Error::other(
                "server stdio was not piped",
            )));
        };

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let line = wire::strip_bom(&line);
                    if !line.is_empty() {
                        warn!(target: SERVER_LOG_TARGET, "{}", line);
                    }
                }
            });
        }

        // subscribe before the reader task pumps its first line so the
        // started event cannot be missed
        let mut events = self.inner.events.subscribe();
        let mut state_rx = self.inner.state_tx.subscribe();

        self.attach(stdout, stdin);
        *self.inner.process.lock() = Some(handle);

        enum Handshake {
            Started,
            Died,
        }

        let timeout_ms = self.inner.options.start_timeout_ms;
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) if event.name == STARTED_EVENT => return Handshake::Started,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => return Handshake::Died,
                    },
                    changed = state_rx.changed() => {
                        if changed.is_err() || *state_rx.borrow() == SessionState::Stopped {
                            return Handshake::Died;
                        }
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(Handshake::Started) => {
                self.inner.state_tx.send_replace(SessionState::Ready);
                info!("analysis server is ready");
                Ok(())
            }
            Ok(Handshake::Died) => {
                warn!("analysis server exited before signalling readiness");
                self.teardown().await;
                Err(BridgeError::ProcessExited)
            }
            Err(_) => {
                warn!(timeout_ms, "timed out waiting for the analysis server to start");
                self.teardown().await;
                Err(BridgeError::StartTimeout { timeout_ms })
            }
        }
    }

    /// Stop the session, killing the server's whole process tree
    ///
    /// Outstanding requests are rejected; the `Stopped` state transition is
    /// the stopped signal observers wait on.
    pub async fn stop(&self) {
        let state = self.state();
        if matches!(state, SessionState::NotStarted | SessionState::Stopped) {
            return;
        }

        self.inner.state_tx.send_replace(SessionState::Stopping);
        info!("stopping analysis server");
        self.teardown().await;
        info!("analysis server stopped");
    }

    /// Stop, then start again with the same options
    pub async fn restart(&self) -> Result<()> {
        self.stop().await;
        self.start().await
    }

    /// Send a request and await its response
    ///
    /// The sole entry point for talking to the server: classification,
    /// queueing, sending, and correlation all happen behind it.
    pub async fn make_request(&self, command: &str, data: Option<Value>) -> Result<Value> {
        self.submit(command, data, None).await
    }

    /// `make_request` with a cancellation token
    ///
    /// A cancelled pending request never reaches the server; a cancelled
    /// in-flight request is forgotten so its late response is discarded,
    /// and the caller is rejected immediately either way.
    pub async fn make_request_with_token(
        &self,
        command: &str,
        data: Option<Value>,
        token: CancellationToken,
    ) -> Result<Value> {
        self.submit(command, data, Some(token)).await
    }

    /// Resolve once no queue has requests waiting to be sent
    pub async fn wait_for_empty_queue(&self) {
        loop {
            let empty = self
                .inner
                .scheduler
                .lock()
                .as_ref()
                .map(|scheduler| scheduler.is_empty())
                .unwrap_or(true);
            if empty {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn submit(
        &self,
        command: &str,
        data: Option<Value>,
        token: Option<CancellationToken>,
    ) -> Result<Value> {
        let state = self.state();
        if state != SessionState::Ready {
            return Err(BridgeError::NotReady { state });
        }

        let handle = self.inner.next_handle.fetch_add(1, Ordering::SeqCst);
        let (request, mut rx) = PendingRequest::new(command, data, handle);

        {
            let mut guard = self.inner.scheduler.lock();
            match guard.as_mut() {
                Some(scheduler) => scheduler.enqueue(request),
                None => {
                    return Err(BridgeError::NotReady {
                        state: self.state(),
                    })
                }
            }
        }

        let Some(token) = token else {
            return match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(BridgeError::TransportClosed),
            };
        };

        tokio::select! {
            outcome = &mut rx => match outcome {
                Ok(outcome) => outcome,
                Err(_) => Err(BridgeError::TransportClosed),
            },
            _ = token.cancelled() => {
                debug!(command, "cancellation requested");
                {
                    let mut guard = self.inner.scheduler.lock();
                    if let Some(scheduler) = guard.as_mut() {
                        scheduler.cancel_request(command, handle);
                    }
                }
                // a response that won the race is already in the channel
                match rx.try_recv() {
                    Ok(outcome) => outcome,
                    Err(_) => Err(BridgeError::Cancelled),
                }
            }
        }
    }

    /// Wire a transport: writer task, fresh scheduler, reader task
    fn attach<R, W>(&self, reader: R, writer: W)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<String>();

        // stdin is a single-writer resource; every outbound packet flows
        // through this one task, one complete line per send
        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(line) = writer_rx.recv().await {
                if let Err(err) = writer.write_all(line.as_bytes()).await {
                    warn!(error = %err, "write to server stdin failed");
                    break;
                }
                if let Err(err) = writer.flush().await {
                    warn!(error = %err, "flush to server stdin failed");
                    break;
                }
            }
        });

        let seq = Arc::clone(&self.inner.seq);
        let dispatch: DispatchFn = Box::new(move |request| {
            let id = seq.fetch_add(1, Ordering::SeqCst);
            debug!(command = %request.command, seq = id, "sending request");
            let line = wire::encode_request(id, &request.command, request.data.as_ref());
            if writer_tx.send(line).is_err() {
                // the reader will notice the dead transport and abort
                warn!(command = %request.command, seq = id, "writer task is gone");
            }
            id
        });

        *self.inner.scheduler.lock() = Some(RequestQueueCollection::new(
            self.inner.options.concurrency,
            dispatch,
        ));

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => handle_line(&inner, &line),
                    Ok(None) => break,
                    Err(err) => {
                        warn!(error = %err, "error reading from server stdout");
                        break;
                    }
                }
            }
            handle_transport_down(&inner);
        });
    }

    async fn teardown(&self) {
        let handle = self.inner.process.lock().take();
        if let Some(mut handle) = handle {
            handle.kill_tree().await;
        }

        if let Some(mut scheduler) = self.inner.scheduler.lock().take() {
            scheduler.abort_all(|| BridgeError::TransportClosed);
        }

        self.inner.state_tx.send_replace(SessionState::Stopped);
    }
}

fn handle_line(inner: &Inner, raw: &str) {
    match wire::decode_line(raw) {
        Decoded::Diagnostic => {
            let line = wire::strip_bom(raw).trim_end();
            if !line.is_empty() {
                info!(target: SERVER_LOG_TARGET, "{}", line);
            }
        }
        Decoded::Dropped(DropReason::Malformed) => {
            trace!("dropping unparseable line from server");
        }
        Decoded::Dropped(DropReason::MissingType) => {
            trace!("dropping packet with no type");
        }
        Decoded::Dropped(DropReason::UnknownType(packet_type)) => {
            debug!(packet_type = %packet_type, "dropping packet of unknown type");
        }
        Decoded::Response(packet) => handle_response(inner, packet),
        Decoded::Event(packet) => handle_event(inner, packet),
    }
}

fn handle_response(inner: &Inner, packet: ResponsePacket) {
    let mut guard = inner.scheduler.lock();
    let Some(scheduler) = guard.as_mut() else {
        return;
    };

    match scheduler.complete(&packet.command, packet.request_seq) {
        Some(request) => {
            if packet.success {
                request.resolve(packet.body);
            } else {
                let message = packet.message.unwrap_or_else(|| packet.body.to_string());
                request.reject(BridgeError::RequestFailed {
                    command: packet.command,
                    message,
                });
            }
            scheduler.drain();
        }
        None => {
            warn!(
                command = %packet.command,
                seq = packet.request_seq,
                "received response with no matching in-flight request; dropping"
            );
        }
    }
}

fn handle_event(inner: &Inner, packet: EventPacket) {
    if packet.event == LOG_EVENT {
        forward_server_log(&packet.body);
        return;
    }

    trace!(event = %packet.event, "server event");
    let _ = inner.events.send(ServerEvent {
        name: packet.event,
        body: packet.body,
    });
}

/// Server-side log entries carry LogLevel/Name/Message fields; route them
/// to our own sink at a comparable level
fn forward_server_log(body: &Value) {
    let level = body.get("LogLevel").and_then(Value::as_str).unwrap_or("");
    let name = body.get("Name").and_then(Value::as_str).unwrap_or("");
    let message = body.get("Message").and_then(Value::as_str).unwrap_or("");

    if level.eq_ignore_ascii_case("error") || level.eq_ignore_ascii_case("critical") {
        error!(target: SERVER_LOG_TARGET, source = name, "{}", message);
    } else if level.eq_ignore_ascii_case("warning") {
        warn!(target: SERVER_LOG_TARGET, source = name, "{}", message);
    } else if level.eq_ignore_ascii_case("information") {
        info!(target: SERVER_LOG_TARGET, source = name, "{}", message);
    } else {
        debug!(target: SERVER_LOG_TARGET, source = name, "{}", message);
    }
}

fn handle_transport_down(inner: &Inner) {
    if let Some(mut scheduler) = inner.scheduler.lock().take() {
        scheduler.abort_all(|| BridgeError::TransportClosed);
    }

    match *inner.state_tx.borrow() {
        SessionState::Stopping | SessionState::Stopped => {}
        _ => {
            warn!("connection to the analysis server closed unexpectedly");
            inner.state_tx.send_replace(SessionState::Stopped);
        }
    }
}
