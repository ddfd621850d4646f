//! Request queue - the thread-safety boundary between control code and a session
//!
//! Any thread may enqueue through a [`RequestSender`]; only the owning
//! session thread holds the [`RequestQueue`] and executes entries.
//!
//! ```text
//! ┌──────────────┐  send()   ┌───────────────────┐  drain_one()  ┌──────────────┐
//! │ Any thread   │──────────►│ crossbeam channel │──────────────►│ Session      │
//! │ (UI, setup)  │           │ (FIFO, unbounded) │               │ thread       │
//! └──────────────┘           └───────────────────┘               └──────┬───────┘
//!                                                                       │ execute()
//!                                                  callbacks            ▼
//!                                  ┌────────────┐◄────────────── AudioServer calls
//!                                  │ Dispatcher │
//!                                  └────────────┘
//! ```
//!
//! Entries run at most once, in enqueue order. A failing entry is logged with
//! its description and the queue moves on; nothing is retried.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use regex::Regex;

use crate::backend::AudioServer;
use crate::dispatch::Dispatcher;
use crate::ports::{skip_opposite_channel, PortDirection, PortHandle, PortType};

/// Receives the handle of a newly registered port
pub type RegisterCallback<P> = Box<dyn FnOnce(PortHandle<P>) + Send + 'static>;

/// Receives the outcome of a connect request that made at least one connection
pub type ConnectCallback = Box<dyn FnOnce(Connected) + Send + 'static>;

/// Receives the port names listed by a query
pub type QuerySink = Box<dyn FnOnce(Vec<String>) + Send + 'static>;

/// Register a port
pub struct PortRequest<P> {
    pub name: String,
    pub kind: PortType,
    pub direction: PortDirection,
    callback: Option<RegisterCallback<P>>,
}

impl<P> PortRequest<P> {
    pub fn new(name: impl Into<String>, kind: PortType, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            kind,
            direction,
            callback: None,
        }
    }

    /// Hand the registered port to `callback` (on a callback worker)
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(PortHandle<P>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl<P> fmt::Display for PortRequest<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "register {} {} port '{}'", self.kind, self.direction, self.name)
    }
}

/// Connect a local port to every live peer matching a pattern
///
/// Peers are resolved when the request is drained, not when it is created.
///
/// The direction is fixed by the port type, not by the local port's
/// direction: MIDI connects local → peer, audio connects peer → local. A
/// local audio output therefore cannot be wired through a request; call
/// [`AudioServer::connect`] on the session's client for that.
pub struct ConnectRequest {
    /// Full name of the local port
    pub local: String,
    pub local_direction: PortDirection,
    /// Exact peer name, or a regular expression over peer names
    pub pattern: String,
    pub kind: PortType,
    callback: Option<ConnectCallback>,
}

impl ConnectRequest {
    /// Capture name, direction, and type from the local port's handle
    pub fn new<P>(local: &PortHandle<P>, pattern: impl Into<String>) -> Self {
        Self {
            local: local.full_name().to_string(),
            local_direction: local.direction(),
            pattern: pattern.into(),
            kind: local.kind(),
            callback: None,
        }
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Connected) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

impl fmt::Display for ConnectRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connect {} '{}' to '{}'", self.kind, self.local, self.pattern)
    }
}

/// Result of a connect request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    /// Full name of the local port
    pub local: String,
    /// Peers that were connected
    pub peers: Vec<String>,
}

/// List live ports of one type and direction
pub struct QueryRequest {
    pub kind: PortType,
    pub direction: PortDirection,
    sink: QuerySink,
}

impl QueryRequest {
    pub fn new<F>(kind: PortType, direction: PortDirection, sink: F) -> Self
    where
        F: FnOnce(Vec<String>) + Send + 'static,
    {
        Self {
            kind,
            direction,
            sink: Box::new(sink),
        }
    }
}

impl fmt::Display for QueryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query {} {} ports", self.kind, self.direction)
    }
}

/// An entry in a session's request queue
pub enum Request<P> {
    Register(PortRequest<P>),
    Connect(ConnectRequest),
    Query(QueryRequest),
    Unregister(PortHandle<P>),
    /// Signals once everything enqueued before it has executed
    Barrier(Sender<()>),
}

impl<P> fmt::Display for Request<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Register(req) => req.fmt(f),
            Request::Connect(req) => req.fmt(f),
            Request::Query(req) => req.fmt(f),
            Request::Unregister(port) => write!(f, "unregister port '{}'", port.full_name()),
            Request::Barrier(_) => write!(f, "barrier"),
        }
    }
}

/// Create the producer and consumer ends of a request queue
pub fn request_channel<P>() -> (RequestSender<P>, Receiver<Request<P>>) {
    let (tx, rx) = channel::unbounded();
    (RequestSender { tx }, rx)
}

/// Producer side of a request queue, usable from any thread
///
/// Sending never blocks and never executes anything.
pub struct RequestSender<P> {
    tx: Sender<Request<P>>,
}

impl<P> Clone for RequestSender<P> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<P> RequestSender<P> {
    /// Enqueue a request
    ///
    /// Returns `false` if the session is gone; the request is dropped.
    pub fn send(&self, request: Request<P>) -> bool {
        match self.tx.send(request) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("Session gone, dropping request: {}", e.into_inner());
                false
            }
        }
    }

    /// Number of entries waiting to be drained
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

/// Consumer side of a request queue, owned by the session thread
pub struct RequestQueue<S: AudioServer> {
    rx: Receiver<Request<S::Port>>,
    server: Arc<S>,
    dispatcher: Dispatcher,
}

impl<S: AudioServer> RequestQueue<S> {
    pub fn new(rx: Receiver<Request<S::Port>>, server: Arc<S>, dispatcher: Dispatcher) -> Self {
        Self {
            rx,
            server,
            dispatcher,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Execute the head entry, if any. Returns whether one ran.
    pub fn drain_one(&mut self) -> bool {
        match self.rx.try_recv() {
            Ok(request) => {
                self.execute(request);
                true
            }
            Err(_) => false,
        }
    }

    /// Execute entries until the queue is empty, returning how many ran
    pub fn drain_all(&mut self) -> usize {
        let mut count = 0;
        while self.drain_one() {
            count += 1;
        }
        count
    }

    /// Wait up to `timeout` for an entry, then execute it
    ///
    /// Blocks the calling thread, so this is only for the session's idle
    /// loop. Returns whether an entry ran.
    pub fn wait_and_drain_one(&mut self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Ok(request) => {
                self.execute(request);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                // No producers left; keep the idle tick instead of spinning
                std::thread::sleep(timeout);
                false
            }
        }
    }

    fn execute(&mut self, request: Request<S::Port>) {
        log::debug!("[{}] {}", self.server.name(), request);
        match request {
            Request::Register(req) => self.register(req),
            Request::Connect(req) => self.connect(req),
            Request::Query(req) => self.query(req),
            Request::Unregister(port) => {
                let name = port.full_name().to_string();
                if let Err(e) = self.server.unregister_port(port) {
                    log::warn!("unregister port '{}' failed: {}", name, e);
                }
            }
            Request::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }

    fn register(&self, req: PortRequest<S::Port>) {
        match self.server.register_port(&req.name, req.kind, req.direction) {
            Ok(handle) => {
                if let Some(callback) = req.callback {
                    self.dispatcher.execute(move || callback(handle));
                }
            }
            Err(e) => log::warn!("{} failed: {}", req, e),
        }
    }

    fn connect(&self, req: ConnectRequest) {
        let peers = resolve_peers(self.server.as_ref(), &req);
        if peers.is_empty() {
            log::warn!("{}: no matching ports", req);
            return;
        }

        let mut connected = Vec::with_capacity(peers.len());
        for peer in peers {
            // MIDI flows out of the local port, audio flows into it
            let (source, destination) = match req.kind {
                PortType::Midi => (req.local.as_str(), peer.as_str()),
                PortType::Audio => (peer.as_str(), req.local.as_str()),
            };
            match self.server.connect(source, destination) {
                Ok(()) => {
                    log::debug!("Connected {} -> {}", source, destination);
                    connected.push(peer);
                }
                Err(e) => log::warn!("{} failed: {}", req, e),
            }
        }

        if connected.is_empty() {
            return;
        }
        if let Some(callback) = req.callback {
            let outcome = Connected {
                local: req.local,
                peers: connected,
            };
            self.dispatcher.execute(move || callback(outcome));
        }
    }

    fn query(&self, req: QueryRequest) {
        let ports = self.server.ports(None, req.kind, Some(req.direction));
        let sink = req.sink;
        self.dispatcher.execute(move || sink(ports));
    }
}

/// Live peers for a connect request
///
/// An exact name match wins on its own. Otherwise the pattern is a regular
/// expression over ports of the same type and opposite direction; the local
/// port itself and ports of the other stereo channel are skipped.
fn resolve_peers<S: AudioServer>(server: &S, req: &ConnectRequest) -> Vec<String> {
    let candidates = server.ports(None, req.kind, Some(req.local_direction.opposite()));

    if candidates.iter().any(|name| *name == req.pattern) {
        return vec![req.pattern.clone()];
    }

    let regex = match Regex::new(&req.pattern) {
        Ok(regex) => regex,
        Err(e) => {
            log::warn!("{}: invalid pattern: {}", req, e);
            return Vec::new();
        }
    };

    candidates
        .into_iter()
        .filter(|name| *name != req.local)
        .filter(|name| regex.is_match(name))
        .filter(|name| !skip_opposite_channel(&req.local, name))
        .collect()
}
