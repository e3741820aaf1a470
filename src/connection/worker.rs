//! Connection Worker
//!
//! The capability every TNC connection exposes to the pool, the frame
//! callback handed to it, and the connect-retry-read loop shared by all
//! transport/protocol variants.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ConnectionSpec, ConnectionState};
use crate::error::{ConnectError, SessionError};
use crate::kiss::Frame;
use crate::transport::Transport;

/// A named, long-lived TNC connection driven by a background task
pub trait Connection: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> &ConnectionSpec;

    /// Spawn the background loop on `runtime`. Does not block.
    fn start(&self, runtime: &Handle);

    /// Request termination. Idempotent, does not wait for the task to exit,
    /// and does nothing if the connection was never started.
    fn stop(&self);

    /// Point-in-time snapshot of the lifecycle state
    fn status(&self) -> ConnectionState;

    /// True until the background task has exited
    fn is_running(&self) -> bool;

    /// Retries used so far by the open loop
    fn retry_attempts(&self) -> u32;

    /// Signal resolving once the background task has exited. Any number of
    /// waiters may hold one; dropping a wait does not affect the others.
    fn exit_signal(&self) -> WorkerExit;

    /// Cancel the background task at its next suspension point
    fn abort(&self);
}

/// Completion signal of one connection worker
#[derive(Debug, Clone)]
pub struct WorkerExit {
    rx: watch::Receiver<bool>,
}

impl WorkerExit {
    /// A signal that is already complete
    fn exited() -> Self {
        let (_, rx) = watch::channel(true);
        Self { rx }
    }

    pub fn has_exited(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the worker has exited
    pub async fn wait(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[derive(Clone)]
enum CallbackKind {
    Func(Arc<dyn Fn(Frame) -> anyhow::Result<()> + Send + Sync>),
    Channel(mpsc::UnboundedSender<Frame>),
    FanOut(Vec<FrameCallback>),
}

/// Consumer of decoded frames.
///
/// Invoked only from the owning connection's task, so one connection never
/// runs its callback concurrently. Callbacks of different connections can run
/// in parallel.
#[derive(Clone)]
pub struct FrameCallback {
    kind: CallbackKind,
}

impl FrameCallback {
    /// Wrap a closure. An error returned from it ends the session.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(Frame) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            kind: CallbackKind::Func(Arc::new(f)),
        }
    }

    /// Forward frames into a channel
    pub fn channel(tx: mpsc::UnboundedSender<Frame>) -> Self {
        Self {
            kind: CallbackKind::Channel(tx),
        }
    }

    /// Invoke several consumers in order for every frame
    pub fn fan_out(callbacks: Vec<FrameCallback>) -> Self {
        Self {
            kind: CallbackKind::FanOut(callbacks),
        }
    }

    /// Whether the callback can still accept frames
    pub fn is_invocable(&self) -> bool {
        match &self.kind {
            CallbackKind::Func(_) => true,
            CallbackKind::Channel(tx) => !tx.is_closed(),
            CallbackKind::FanOut(callbacks) => {
                !callbacks.is_empty() && callbacks.iter().all(FrameCallback::is_invocable)
            }
        }
    }

    pub fn invoke(&self, frame: Frame) -> Result<(), SessionError> {
        match &self.kind {
            CallbackKind::Func(f) => f(frame).map_err(SessionError::Callback),
            CallbackKind::Channel(tx) => tx
                .send(frame)
                .map_err(|_| SessionError::Callback(anyhow::anyhow!("frame receiver dropped"))),
            CallbackKind::FanOut(callbacks) => {
                if let Some((last, rest)) = callbacks.split_last() {
                    for callback in rest {
                        callback.invoke(frame.clone())?;
                    }
                    last.invoke(frame)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            CallbackKind::Func(_) => f.write_str("FrameCallback::Func"),
            CallbackKind::Channel(_) => f.write_str("FrameCallback::Channel"),
            CallbackKind::FanOut(callbacks) => {
                f.debug_tuple("FrameCallback::FanOut").field(callbacks).finish()
            }
        }
    }
}

#[derive(Debug)]
struct WorkerInner {
    state: ConnectionState,
    retry_attempts: u32,
    stop_requested: bool,
    started: bool,
}

/// State shared between a connection handle and its background task.
///
/// One lock guards the state, the retry counter and the stop flag, so a
/// status query never sees an inconsistent combination.
pub struct WorkerCore {
    name: String,
    inner: Mutex<WorkerInner>,
    stop_tx: watch::Sender<bool>,
    exit_tx: watch::Sender<bool>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerCore {
    pub fn new(name: impl Into<String>) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (exit_tx, _) = watch::channel(false);

        Self {
            name: name.into(),
            inner: Mutex::new(WorkerInner {
                state: ConnectionState::Connecting,
                retry_attempts: 0,
                stop_requested: false,
                started: false,
            }),
            stop_tx,
            exit_tx,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn retry_attempts(&self) -> u32 {
        self.inner.lock().retry_attempts
    }

    pub fn stop_requested(&self) -> bool {
        self.inner.lock().stop_requested
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Move to `next` if the lifecycle allows it
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut inner = self.inner.lock();
        Self::transition_locked(&self.name, &mut inner, next)
    }

    fn transition_locked(name: &str, inner: &mut WorkerInner, next: ConnectionState) -> bool {
        if !inner.state.can_transition_to(next) {
            debug!(
                "TNC {}: ignoring transition {} -> {}",
                name, inner.state, next
            );
            return false;
        }
        debug!("TNC {}: {} -> {}", name, inner.state, next);
        inner.state = next;
        true
    }

    /// Enter CONNECTED unless a stop arrived while the link was being opened
    fn begin_session(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.stop_requested {
            return false;
        }
        Self::transition_locked(&self.name, &mut inner, ConnectionState::Connected)
    }

    fn record_retry(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.retry_attempts += 1;
        inner.retry_attempts
    }

    /// Record the stop request and wake any retry wait.
    ///
    /// Returns `false` when the connection was never started or a stop was
    /// already requested.
    pub fn request_stop(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.started || inner.stop_requested {
                return false;
            }
            inner.stop_requested = true;
            if inner.state == ConnectionState::Connected {
                Self::transition_locked(&self.name, &mut inner, ConnectionState::Disconnecting);
            }
        }
        self.stop_tx.send_replace(true);
        true
    }

    /// Spawn `task` as this connection's worker. Returns `false` if a worker
    /// was already spawned.
    pub fn spawn<F>(self: &Arc<Self>, runtime: &Handle, task: F) -> bool
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        {
            let mut inner = self.inner.lock();
            if inner.started {
                return false;
            }
            inner.started = true;
        }

        self.running.store(true, Ordering::Release);
        let guard = RunningGuard(Arc::clone(self));
        let handle = runtime.spawn(async move {
            let _guard = guard;
            task.await;
        });
        *self.handle.lock() = Some(handle);
        true
    }

    /// Completion signal of the worker. Already complete if it was never spawned.
    pub fn exit_signal(&self) -> WorkerExit {
        let rx = self.exit_tx.subscribe();
        if !self.inner.lock().started {
            return WorkerExit::exited();
        }
        WorkerExit { rx }
    }

    /// Abort the spawned task, if any. Its exit is still reported through
    /// `exit_signal`.
    pub fn abort(&self) {
        if let Some(handle) = self.handle.lock().as_ref() {
            handle.abort();
        }
    }

    fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}

/// Marks the worker finished however its task ends, panics and aborts included
struct RunningGuard(Arc<WorkerCore>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            warn!("Worker of TNC {} panicked", self.0.name());
        }
        self.0.transition(ConnectionState::Disconnected);
        self.0.running.store(false, Ordering::Release);
        self.0.exit_tx.send_replace(true);
    }
}

async fn stop_signalled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

enum OpenOutcome {
    Opened,
    Stopped,
    Failed(ConnectError),
}

async fn open_with_retry<T: Transport>(
    core: &WorkerCore,
    spec: &ConnectionSpec,
    transport: &mut T,
    stop_rx: &mut watch::Receiver<bool>,
) -> OpenOutcome {
    loop {
        let result = tokio::select! {
            biased;
            _ = stop_signalled(stop_rx) => return OpenOutcome::Stopped,
            result = transport.open() => result,
        };

        match result {
            Ok(()) => return OpenOutcome::Opened,
            Err(err) if err.is_recoverable() => {
                warn!(
                    "Could not connect TNC {} to {}: {}",
                    core.name(),
                    spec.endpoint(),
                    err
                );

                let used = core.retry_attempts();
                if used >= spec.retry_limit() {
                    warn!("Maximum TNC {} connection retries reached.", core.name());
                    return OpenOutcome::Failed(ConnectError::RetriesExhausted { attempts: used + 1 });
                }

                let attempt = core.record_retry();
                info!(
                    "Retrying TNC {} connection in {:?} (retry {}/{})...",
                    core.name(),
                    spec.retry_delay(),
                    attempt,
                    spec.retry_limit()
                );

                tokio::select! {
                    biased;
                    _ = stop_signalled(stop_rx) => return OpenOutcome::Stopped,
                    _ = tokio::time::sleep(spec.retry_delay()) => {}
                }
            }
            Err(err) => return OpenOutcome::Failed(err),
        }
    }
}

/// The connect-retry-read loop.
///
/// Opens the transport with the spec's fixed-delay retry policy, then reads
/// until stopped or until the session fails. A failed session is not
/// reconnected; the connection simply ends DISCONNECTED.
pub async fn run_connection<T: Transport>(
    core: Arc<WorkerCore>,
    spec: ConnectionSpec,
    mut transport: T,
    callback: FrameCallback,
) {
    let mut stop_rx = core.stop_signal();

    match open_with_retry(&core, &spec, &mut transport, &mut stop_rx).await {
        OpenOutcome::Opened => {}
        OpenOutcome::Stopped => {
            info!("TNC {} stopped while connecting", core.name());
            transport.close().await;
            core.transition(ConnectionState::Disconnected);
            return;
        }
        OpenOutcome::Failed(err) => {
            error!("TNC {} connection to {} failed: {}", core.name(), spec.endpoint(), err);
            core.transition(ConnectionState::Disconnected);
            return;
        }
    }

    if !core.begin_session() {
        info!("TNC {} stopped before its session started", core.name());
        transport.close().await;
        core.transition(ConnectionState::Disconnected);
        return;
    }

    info!(
        "TNC {} connected to {} ({}/{})",
        core.name(),
        spec.endpoint(),
        spec.transport(),
        spec.protocol()
    );

    let result = transport.read(|frame| callback.invoke(frame)).await;
    match result {
        Ok(()) => info!("TNC {} session stopped", core.name()),
        Err(SessionError::PeerClosed) => warn!("TNC {} closed the connection", core.name()),
        Err(err) => error!("TNC {} session ended: {}", core.name(), err),
    }

    transport.close().await;
    core.transition(ConnectionState::Disconnected);
    info!("TNC {} disconnected", core.name());
}
