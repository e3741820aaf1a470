//! Scripted in-memory transport shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;

use tncpool::connection::{Connection, ConnectionFactory, KissConnection};
use tncpool::transport::{InterruptSignal, ReadInterrupter, Transport};
use tncpool::{
    ConnectError, ConnectionPool, ConnectionSpec, ConnectionState, Frame, FrameCallback,
    PoolError, SessionError,
};

/// How a scripted transport behaves when opened and closed
#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    /// Refuse this many opens before succeeding
    pub refusals: usize,
    /// Refuse every open
    pub always_refuse: bool,
    /// Fail the first open with a non-refusal error
    pub fatal: bool,
    /// Never complete an open
    pub hang_open: bool,
    /// Time `close` takes
    pub close_delay: Duration,
}

/// Observations and controls for one scripted transport
#[derive(Clone)]
pub struct Recorder {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub open_times: Arc<Mutex<Vec<Instant>>>,
    feed: mpsc::UnboundedSender<Result<Frame, io::ErrorKind>>,
}

impl Recorder {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.open_times.lock().unwrap().clone()
    }

    /// Deliver a data frame to the reading worker
    pub fn send_frame(&self, payload: &'static [u8]) {
        let _ = self
            .feed
            .send(Ok(Frame::from_type_byte(0x00, Bytes::from_static(payload))));
    }

    /// Make the next read fail with an I/O error
    pub fn fail_read(&self) {
        let _ = self.feed.send(Err(io::ErrorKind::BrokenPipe));
    }
}

pub struct ScriptedTransport {
    script: Script,
    recorder: Recorder,
    frames: mpsc::UnboundedReceiver<Result<Frame, io::ErrorKind>>,
    interrupter: ReadInterrupter,
    signal: InterruptSignal,
}

impl ScriptedTransport {
    pub fn new(script: Script) -> (Self, Recorder) {
        let (feed, frames) = mpsc::unbounded_channel();
        let (interrupter, signal) = ReadInterrupter::pair();
        let recorder = Recorder {
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            open_times: Arc::new(Mutex::new(Vec::new())),
            feed,
        };

        let transport = Self {
            script,
            recorder: recorder.clone(),
            frames,
            interrupter,
            signal,
        };
        (transport, recorder)
    }
}

impl Transport for ScriptedTransport {
    fn open(&mut self) -> impl Future<Output = Result<(), ConnectError>> + Send {
        async move {
            let attempt = self.recorder.opens.fetch_add(1, Ordering::SeqCst);
            self.recorder.open_times.lock().unwrap().push(Instant::now());

            if self.script.hang_open {
                std::future::pending::<()>().await;
            }
            if self.script.fatal {
                return Err(ConnectError::from_io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "scripted fatal error",
                )));
            }
            if self.script.always_refuse || attempt < self.script.refusals {
                return Err(ConnectError::from_io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "scripted refusal",
                )));
            }
            Ok(())
        }
    }

    fn read<F>(&mut self, mut on_frame: F) -> impl Future<Output = Result<(), SessionError>> + Send
    where
        F: FnMut(Frame) -> Result<(), SessionError> + Send,
    {
        async move {
            loop {
                tokio::select! {
                    biased;
                    _ = self.signal.triggered() => return Ok(()),
                    item = self.frames.recv() => match item {
                        Some(Ok(frame)) => on_frame(frame)?,
                        Some(Err(kind)) => return Err(io::Error::from(kind).into()),
                        None => return Err(SessionError::PeerClosed),
                    },
                }
            }
        }
    }

    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async move {
            if !self.script.close_delay.is_zero() {
                tokio::time::sleep(self.script.close_delay).await;
            }
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn interrupter(&self) -> ReadInterrupter {
        self.interrupter.clone()
    }
}

/// Factory handing out scripted KISS connections and recording their recorders
#[derive(Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<String, Script>>,
    recorders: Mutex<HashMap<String, Vec<Recorder>>>,
    pub created: AtomicUsize,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_script(&self, name: &str, script: Script) {
        self.scripts.lock().unwrap().insert(name.to_string(), script);
    }

    /// Recorder of the most recently created transport for `name`
    pub fn recorder(&self, name: &str) -> Recorder {
        self.recorders.lock().unwrap()[name].last().cloned().unwrap()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for ScriptedFactory {
    fn create(
        &self,
        name: &str,
        spec: ConnectionSpec,
        callback: FrameCallback,
    ) -> Result<Arc<dyn Connection>, PoolError> {
        let script = self.scripts.lock().unwrap().get(name).copied().unwrap_or_default();
        let (transport, recorder) = ScriptedTransport::new(script);

        self.recorders
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .push(recorder);
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(Arc::new(KissConnection::with_transport(name, spec, transport, callback)))
    }
}

pub fn scripted_pool(factory: &Arc<ScriptedFactory>) -> ConnectionPool {
    ConnectionPool::with_factory(
        Arc::clone(factory) as Arc<dyn ConnectionFactory>,
        tokio::runtime::Handle::current(),
    )
}

pub fn spec(name: &str, retry_limit: i64, retry_delay: Duration) -> ConnectionSpec {
    ConnectionSpec::builder(name)
        .transport(tncpool::connection::TransportType::Tcpip)
        .endpoint("127.0.0.1:8001")
        .retry_limit(retry_limit)
        .retry_delay(retry_delay)
        .build()
        .unwrap()
}

pub fn noop_callback() -> FrameCallback {
    FrameCallback::new(|_| Ok(()))
}

/// Poll until `name` reaches `state`, panicking after `limit`
pub async fn wait_for_state(pool: &ConnectionPool, name: &str, state: ConnectionState, limit: Duration) {
    let deadline = Instant::now() + limit;
    loop {
        if pool.status(name).unwrap() == state {
            return;
        }
        if Instant::now() >= deadline {
            panic!(
                "TNC {} did not reach {} within {:?} (currently {})",
                name,
                state,
                limit,
                pool.status(name).unwrap()
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until the worker for `name` has exited
pub async fn wait_until_stopped(pool: &ConnectionPool, name: &str, limit: Duration) {
    let deadline = Instant::now() + limit;
    while pool.is_running(name).unwrap() {
        if Instant::now() >= deadline {
            panic!("worker for TNC {} still running after {:?}", name, limit);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
