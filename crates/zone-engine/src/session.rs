//! Client session - one audio-server client and the thread that owns it
//!
//! # Lifecycle
//!
//! ```text
//! NEW ──start()──► INITIALISING ──CAS──► ACTIVE ──► CLOSING ──► TERMINATED
//!                                          │  ▲
//!                                          ▼  │ (running)
//!                                       OVERDUBBED
//! ```
//!
//! Every transition is a compare-and-set and only moves forward, so a
//! shutdown racing with startup can never be undone. The status atomic is
//! the only state shared with the realtime callback.
//!
//! On the session thread: open the client, publish it, build the request
//! queue, run `initialize`, go ACTIVE, activate the client with the
//! caller's process callback, run `make_connections`, then drain requests
//! on the idle tick until the session stops running. Teardown closes the
//! client exactly once and ends in TERMINATED.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver};
use zone_core::config::SessionConfig;

use crate::backend::{AudioServer, Connector, PortOf};
use crate::dispatch::Dispatcher;
use crate::error::{SessionError, SessionResult};
use crate::request::{request_channel, Request, RequestQueue, RequestSender};

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SessionState {
    New = 0,
    Initialising = 1,
    Active = 2,
    /// Reserved running state, reachable only from `Active`
    Overdubbed = 3,
    Closing = 4,
    Terminated = 5,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::New,
            1 => SessionState::Initialising,
            2 => SessionState::Active,
            3 => SessionState::Overdubbed,
            4 => SessionState::Closing,
            _ => SessionState::Terminated,
        }
    }

    /// Active or overdubbed
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Overdubbed)
    }

    /// Closing or terminated
    pub fn is_shutting_down(self) -> bool {
        self >= SessionState::Closing
    }

    fn can_advance_to(self, next: SessionState) -> bool {
        if next == SessionState::Overdubbed {
            return self == SessionState::Active;
        }
        next > self
    }
}

/// Atomic session state shared with the backend and the realtime callback
#[derive(Debug)]
pub struct SessionStatus {
    state: AtomicU8,
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::New as u8),
        }
    }

    #[inline]
    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the process callback should keep running (realtime safe)
    #[inline]
    pub fn is_running(&self) -> bool {
        self.get().is_running()
    }

    /// Compare-and-set `from` → `to`
    ///
    /// Fails if the current state is not `from` or the move is not forward.
    pub fn advance(&self, from: SessionState, to: SessionState) -> bool {
        if !from.can_advance_to(to) {
            return false;
        }
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `Closing` from any earlier state
    ///
    /// Returns `false` if the session was already closing or terminated.
    pub fn begin_closing(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if SessionState::from_u8(current).is_shutting_down() {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Server-side shutdown of a running client: running → `Closing`
    pub fn server_shutdown(&self) -> bool {
        self.advance(SessionState::Active, SessionState::Closing)
            || self.advance(SessionState::Overdubbed, SessionState::Closing)
    }

    /// Final state; absorbing
    ///
    /// Every other state may move to `Terminated`. Returns `false` if it was
    /// already terminated.
    pub fn mark_terminated(&self) -> bool {
        let terminated = SessionState::Terminated as u8;
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != terminated).then_some(terminated)
            })
            .is_ok()
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-supplied steps of a session's startup
///
/// Run on the session thread. Hooks may block and call the server freely;
/// only the callback returned by [`SessionHooks::process_handler`] runs on
/// the realtime thread.
pub trait SessionHooks<S: AudioServer>: Send + 'static {
    /// Before activation, e.g. register known ports
    fn initialize(&mut self, _server: &S) -> anyhow::Result<()> {
        Ok(())
    }

    /// After activation, e.g. startup wiring
    fn make_connections(&mut self, _server: &S) -> anyhow::Result<()> {
        Ok(())
    }

    /// The realtime process callback to install
    fn process_handler(&mut self) -> S::Process;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session handle and its thread
struct Shared<C: Connector> {
    name: String,
    config: SessionConfig,
    connector: Arc<C>,
    dispatcher: Dispatcher,
    status: Arc<SessionStatus>,
    server: Mutex<Option<Arc<C::Server>>>,
}

impl<C: Connector> Shared<C> {
    fn run<H: SessionHooks<C::Server>>(
        &self,
        mut hooks: H,
        requests: Receiver<Request<PortOf<C>>>,
    ) {
        log::info!("Session '{}' starting", self.name);
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.bring_up(&mut hooks, requests)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("Session '{}' failed: {:#}", self.name, e),
            Err(_) => log::error!("Session '{}' hook panicked", self.name),
        }
        self.teardown();
    }

    fn bring_up<H: SessionHooks<C::Server>>(
        &self,
        hooks: &mut H,
        requests: Receiver<Request<PortOf<C>>>,
    ) -> anyhow::Result<()> {
        let server = Arc::new(self.connector.open(&self.name)?);
        *lock(&self.server) = Some(Arc::clone(&server));

        let mut queue = RequestQueue::new(requests, Arc::clone(&server), self.dispatcher.clone());
        hooks.initialize(&server)?;

        if !self
            .status
            .advance(SessionState::Initialising, SessionState::Active)
        {
            return Err(SessionError::InvalidState {
                name: self.name.clone(),
                expected: SessionState::Initialising,
                actual: self.status.get(),
            }
            .into());
        }

        server.activate(hooks.process_handler(), Arc::clone(&self.status))?;
        hooks.make_connections(&server)?;
        log::info!("Session '{}' active", self.name);

        let tick = self.config.idle_tick();
        while self.status.is_running() {
            queue.wait_and_drain_one(tick);
        }

        let dropped = queue.len();
        if dropped > 0 {
            log::debug!("Session '{}' stopped with {} pending requests", self.name, dropped);
        }
        Ok(())
    }

    /// Close the client exactly once and end in `Terminated`
    fn teardown(&self) {
        self.status.begin_closing();
        let server = lock(&self.server).take();
        if let Some(server) = server {
            log::info!("Closing session '{}'", self.name);
            if let Err(e) = server.close() {
                log::warn!("Session '{}': {}", self.name, e);
            }
        }
        self.status.mark_terminated();
    }
}

/// One audio-server client, owned by a dedicated thread
///
/// Requests can be enqueued at any time through [`ClientSession::sender`];
/// they execute once the session thread is draining.
pub struct ClientSession<C: Connector> {
    shared: Arc<Shared<C>>,
    sender: RequestSender<PortOf<C>>,
    requests: Mutex<Option<Receiver<Request<PortOf<C>>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: Mutex<Option<ThreadId>>,
}

impl<C: Connector> ClientSession<C> {
    pub fn new(config: SessionConfig, connector: Arc<C>, dispatcher: Dispatcher) -> Self {
        let (sender, requests) = request_channel();
        Self {
            shared: Arc::new(Shared {
                name: config.client_name.clone(),
                config,
                connector,
                dispatcher,
                status: Arc::new(SessionStatus::new()),
                server: Mutex::new(None),
            }),
            sender,
            requests: Mutex::new(Some(requests)),
            thread: Mutex::new(None),
            thread_id: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> SessionState {
        self.shared.status.get()
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        Arc::clone(&self.shared.status)
    }

    /// Producer side of this session's request queue
    pub fn sender(&self) -> RequestSender<PortOf<C>> {
        self.sender.clone()
    }

    /// Spawn the session thread
    ///
    /// Fails with [`SessionError::InvalidState`] unless the session is new.
    pub fn start<H: SessionHooks<C::Server>>(&self, hooks: H) -> SessionResult<()> {
        let status = &self.shared.status;
        if !status.advance(SessionState::New, SessionState::Initialising) {
            return Err(SessionError::InvalidState {
                name: self.shared.name.clone(),
                expected: SessionState::New,
                actual: status.get(),
            });
        }

        let requests = match lock(&self.requests).take() {
            Some(requests) => requests,
            None => {
                return Err(SessionError::InvalidState {
                    name: self.shared.name.clone(),
                    expected: SessionState::New,
                    actual: status.get(),
                })
            }
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("zone-session-{}", self.shared.name))
            .spawn(move || shared.run(hooks, requests));

        match spawned {
            Ok(handle) => {
                *lock(&self.thread_id) = Some(handle.thread().id());
                *lock(&self.thread) = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.teardown();
                Err(SessionError::Spawn(e))
            }
        }
    }

    /// Wait for the client handle
    ///
    /// Blocks with short sleeps. Never call this from the process callback.
    /// Returns `None` once the session is closing or terminated.
    pub fn client(&self) -> Option<Arc<C::Server>> {
        self.poll_client(None)
    }

    /// [`Self::client`] bounded by `timeout`
    pub fn client_timeout(&self, timeout: Duration) -> Option<Arc<C::Server>> {
        self.poll_client(Some(Instant::now() + timeout))
    }

    fn poll_client(&self, deadline: Option<Instant>) -> Option<Arc<C::Server>> {
        let poll = self.shared.config.client_poll();
        loop {
            if self.shared.status.get().is_shutting_down() {
                return None;
            }
            if let Some(server) = lock(&self.shared.server).clone() {
                return Some(server);
            }
            if deadline.map_or(false, |d| Instant::now() >= d) {
                return None;
            }
            thread::sleep(poll);
        }
    }

    /// Wait until every request enqueued before this call has executed
    ///
    /// Returns `false` without waiting if the session never started or has
    /// already shut down, and if it stops before reaching the barrier.
    pub fn flush(&self) -> bool {
        let state = self.state();
        if state == SessionState::New || state.is_shutting_down() {
            return false;
        }
        let (done, reached) = channel::bounded(1);
        if !self.sender.send(Request::Barrier(done)) {
            return false;
        }
        reached.recv().is_ok()
    }

    /// Shut the session down and wait for its thread
    ///
    /// No-op once terminated.
    pub fn close(&self) {
        if self.state() == SessionState::Terminated {
            return;
        }
        self.shared.teardown();

        let on_session_thread = *lock(&self.thread_id) == Some(thread::current().id());
        if on_session_thread {
            return;
        }
        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("Session '{}' thread panicked", self.shared.name);
            }
        }
    }
}

impl<C: Connector> Drop for ClientSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryClient, MemoryConnector, MemoryGraph, MemoryProcess};
    use crate::ports::{PortDirection, PortType};
    use crate::request::PortRequest;
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(2);

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn config(name: &str) -> SessionConfig {
        SessionConfig {
            client_name: name.to_string(),
            idle_tick_ms: 5,
            client_poll_ms: 1,
        }
    }

    fn session(graph: &MemoryGraph, name: &str) -> ClientSession<MemoryConnector> {
        init_logging();
        ClientSession::new(
            config(name),
            Arc::new(MemoryConnector::new(graph.clone())),
            Dispatcher::new(1).unwrap(),
        )
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    /// Records hook order and counts process cycles
    #[derive(Clone, Default)]
    struct Recorder {
        steps: Arc<Mutex<Vec<&'static str>>>,
        cycles: Arc<AtomicUsize>,
        fail_initialize: bool,
        panic_in_connections: bool,
    }

    impl SessionHooks<MemoryClient> for Recorder {
        fn initialize(&mut self, server: &MemoryClient) -> anyhow::Result<()> {
            self.steps.lock().unwrap().push("initialize");
            if self.fail_initialize {
                anyhow::bail!("no ports today");
            }
            server.register_port("out_left", PortType::Audio, PortDirection::Out)?;
            Ok(())
        }

        fn make_connections(&mut self, _server: &MemoryClient) -> anyhow::Result<()> {
            self.steps.lock().unwrap().push("make_connections");
            if self.panic_in_connections {
                panic!("wiring bug");
            }
            Ok(())
        }

        fn process_handler(&mut self) -> MemoryProcess {
            self.steps.lock().unwrap().push("process_handler");
            let cycles = Arc::clone(&self.cycles);
            Box::new(move |_frames| {
                cycles.fetch_add(1, Ordering::SeqCst);
            })
        }
    }

    #[test]
    fn test_state_transitions_are_forward_only() {
        let status = SessionStatus::new();
        assert!(!status.advance(SessionState::New, SessionState::New));
        assert!(!status.advance(SessionState::New, SessionState::Overdubbed));
        assert!(status.advance(SessionState::New, SessionState::Initialising));
        assert!(!status.advance(SessionState::Initialising, SessionState::New));
        assert!(status.advance(SessionState::Initialising, SessionState::Active));
        assert!(status.advance(SessionState::Active, SessionState::Overdubbed));
        assert!(status.is_running());
        assert!(status.server_shutdown());
        assert_eq!(status.get(), SessionState::Closing);
        assert!(!status.begin_closing());
        assert!(status.mark_terminated());
        assert!(!status.mark_terminated());
        assert!(!status.advance(SessionState::Terminated, SessionState::Active));
        assert!(!status.begin_closing());
        assert_eq!(status.get(), SessionState::Terminated);
    }

    #[test]
    fn test_lifecycle() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        let hooks = Recorder::default();
        assert_eq!(session.state(), SessionState::New);

        session.start(hooks.clone()).unwrap();
        assert!(wait_for(|| {
            session.state() == SessionState::Active && graph.port_names().len() == 1
        }));
        let client = session.client().unwrap();
        assert!(wait_for(|| client.is_activated()));
        assert!(wait_for(|| hooks.steps.lock().unwrap().len() == 3));
        assert_eq!(
            *hooks.steps.lock().unwrap(),
            vec!["initialize", "process_handler", "make_connections"]
        );

        assert!(client.cycle(64));
        assert_eq!(hooks.cycles.load(Ordering::SeqCst), 1);

        session.close();
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(graph.clients().is_empty());
        // The realtime callback no longer runs
        assert!(!client.cycle(64));
        assert_eq!(hooks.cycles.load(Ordering::SeqCst), 1);

        session.close();
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.client().is_none());
    }

    #[test]
    fn test_second_start_rejected() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        session.start(Recorder::default()).unwrap();

        let err = session.start(Recorder::default()).unwrap_err();
        assert!(matches!(
            err,
            SessionError::InvalidState {
                expected: SessionState::New,
                ..
            }
        ));
        session.close();
    }

    #[test]
    fn test_failed_initialize_never_goes_active() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        let hooks = Recorder {
            fail_initialize: true,
            ..Default::default()
        };

        session.start(hooks.clone()).unwrap();
        assert!(wait_for(|| session.state() == SessionState::Terminated));
        assert_eq!(*hooks.steps.lock().unwrap(), vec!["initialize"]);
        assert!(graph.clients().is_empty());
    }

    #[test]
    fn test_panicking_hook_still_tears_down() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        let hooks = Recorder {
            panic_in_connections: true,
            ..Default::default()
        };

        session.start(hooks.clone()).unwrap();
        assert!(wait_for(|| session.state() == SessionState::Terminated));
        assert_eq!(
            *hooks.steps.lock().unwrap(),
            vec!["initialize", "process_handler", "make_connections"]
        );
        assert!(graph.clients().is_empty());
        assert!(session.client().is_none());
        assert!(!session.flush());
        assert_eq!(hooks.cycles.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_server_offline_terminates() {
        let graph = MemoryGraph::new();
        graph.set_offline(true);
        let session = session(&graph, "zone");

        session.start(Recorder::default()).unwrap();
        assert!(session.client().is_none());
        assert!(wait_for(|| session.state() == SessionState::Terminated));
    }

    #[test]
    fn test_server_shutdown_terminates() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        session.start(Recorder::default()).unwrap();
        assert!(wait_for(|| session.state() == SessionState::Active));

        assert!(graph.kill_client("zone"));
        assert!(wait_for(|| session.state() == SessionState::Terminated));
    }

    #[test]
    fn test_requests_before_start_run_after() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");

        session
            .sender()
            .send(Request::Register(PortRequest::new("early", PortType::Midi, PortDirection::In)));
        assert!(!session.flush());

        session.start(Recorder::default()).unwrap();
        assert!(session.flush());
        assert!(graph.port_names().contains(&"zone:early".to_string()));
        session.close();
    }

    #[test]
    fn test_flush_after_close_returns() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        session.start(Recorder::default()).unwrap();
        session.close();
        assert!(!session.flush());
    }

    #[test]
    fn test_client_timeout_on_unstarted_session() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        assert!(session.client_timeout(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_close_before_start() {
        let graph = MemoryGraph::new();
        let session = session(&graph, "zone");
        session.close();
        assert_eq!(session.state(), SessionState::Terminated);
        assert!(session.start(Recorder::default()).is_err());
    }
}
