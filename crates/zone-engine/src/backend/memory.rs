//! In-process audio server
//!
//! A port graph held in memory that behaves like a JACK server for the
//! purposes of the session and request queue: named clients, typed ports
//! with a direction, regex port listing, output-to-input connections, a
//! process callback, and server-side shutdown of a client.
//!
//! Cycles are driven by hand with [`MemoryClient::cycle`] (or
//! [`MemoryGraph::cycle_all`]), so tests run deterministically without a
//! realtime thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;

use super::{AudioServer, Connector};
use crate::error::{BackendError, BackendResult};
use crate::ports::{full_port_name, PortDirection, PortHandle, PortType};
use crate::session::SessionStatus;

/// Process callback of a memory client, called with the cycle's frame count
pub type MemoryProcess = Box<dyn FnMut(usize) + Send + 'static>;

/// Port object of a memory client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MemoryPort {
    id: u64,
}

impl MemoryPort {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Clone)]
struct PortEntry {
    name: String,
    kind: PortType,
    direction: PortDirection,
    /// Client that registered the port (`None` for external peers)
    owner: Option<String>,
    id: u64,
}

#[derive(Default)]
struct GraphState {
    offline: bool,
    ports: Vec<PortEntry>,
    connections: Vec<(String, String)>,
    /// Open clients and, once activated, their session status
    clients: HashMap<String, Option<Arc<SessionStatus>>>,
}

impl GraphState {
    fn port(&self, name: &str) -> Option<&PortEntry> {
        self.ports.iter().find(|p| p.name == name)
    }

    fn remove_port(&mut self, name: &str) -> bool {
        let before = self.ports.len();
        self.ports.retain(|p| p.name != name);
        self.connections.retain(|(src, dst)| src != name && dst != name);
        self.ports.len() != before
    }

    fn remove_client(&mut self, client: &str) -> Option<Option<Arc<SessionStatus>>> {
        let owned: Vec<String> = self
            .ports
            .iter()
            .filter(|p| p.owner.as_deref() == Some(client))
            .map(|p| p.name.clone())
            .collect();
        for name in owned {
            self.remove_port(&name);
        }
        self.clients.remove(client)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared in-memory port graph
///
/// Clones refer to the same graph.
#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<Mutex<GraphState>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a port owned by some other (external) client
    pub fn add_peer(&self, name: &str, kind: PortType, direction: PortDirection) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.state).ports.push(PortEntry {
            name: name.to_string(),
            kind,
            direction,
            owner: None,
            id,
        });
    }

    /// Remove any port, as if its owner went away
    pub fn remove_peer(&self, name: &str) -> bool {
        lock(&self.state).remove_port(name)
    }

    /// Full names of every live port, in registration order
    pub fn port_names(&self) -> Vec<String> {
        lock(&self.state).ports.iter().map(|p| p.name.clone()).collect()
    }

    /// Snapshot of `(source, destination)` connections
    pub fn connections(&self) -> Vec<(String, String)> {
        lock(&self.state).connections.clone()
    }

    pub fn is_connected(&self, source: &str, destination: &str) -> bool {
        lock(&self.state)
            .connections
            .iter()
            .any(|(s, d)| s == source && d == destination)
    }

    /// Names of open clients
    pub fn clients(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.state).clients.keys().cloned().collect();
        names.sort();
        names
    }

    /// Make the server unreachable for new clients
    pub fn set_offline(&self, offline: bool) {
        lock(&self.state).offline = offline;
    }

    /// Shut a client down from the server side
    ///
    /// Its ports disappear and an active session is moved to closing, as a
    /// JACK shutdown notification would.
    pub fn kill_client(&self, client: &str) -> bool {
        let removed = lock(&self.state).remove_client(client);
        match removed {
            Some(status) => {
                if let Some(status) = status {
                    status.server_shutdown();
                }
                log::info!("Memory server: client '{}' shut down", client);
                true
            }
            None => false,
        }
    }
}

/// Opens clients on a [`MemoryGraph`]
#[derive(Clone, Default)]
pub struct MemoryConnector {
    graph: MemoryGraph,
}

impl MemoryConnector {
    pub fn new(graph: MemoryGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &MemoryGraph {
        &self.graph
    }
}

impl Connector for MemoryConnector {
    type Server = MemoryClient;

    fn open(&self, client_name: &str) -> BackendResult<MemoryClient> {
        let mut state = lock(&self.graph.state);
        let refuse = |reason: &str| BackendError::Open {
            name: client_name.to_string(),
            reason: reason.to_string(),
        };
        if state.offline {
            return Err(refuse("server not running"));
        }
        if state.clients.contains_key(client_name) {
            return Err(refuse("name in use"));
        }
        state.clients.insert(client_name.to_string(), None);
        drop(state);

        log::info!("Memory server: client '{}' opened", client_name);
        Ok(MemoryClient {
            name: client_name.to_string(),
            graph: self.graph.clone(),
            process: Mutex::new(None),
            status: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

/// A client open on a [`MemoryGraph`]
pub struct MemoryClient {
    name: String,
    graph: MemoryGraph,
    process: Mutex<Option<MemoryProcess>>,
    status: Mutex<Option<Arc<SessionStatus>>>,
    closed: AtomicBool,
}

impl MemoryClient {
    fn ensure_open(&self) -> BackendResult<()> {
        let alive = lock(&self.graph.state).clients.contains_key(&self.name);
        if self.closed.load(Ordering::Acquire) || !alive {
            return Err(BackendError::Closed(self.name.clone()));
        }
        Ok(())
    }

    /// Run one process cycle of `frames` samples
    ///
    /// Returns `false` without calling anything if the client is not
    /// activated. Once the session stops running, the callback is dropped
    /// and never called again, as JACK does after a callback returns quit.
    pub fn cycle(&self, frames: usize) -> bool {
        let running = lock(&self.status)
            .as_ref()
            .map_or(false, |status| status.is_running());

        let mut process = lock(&self.process);
        if !running {
            if process.take().is_some() {
                log::debug!("Memory server: '{}' process callback stopped", self.name);
            }
            return false;
        }
        match process.as_mut() {
            Some(callback) => {
                callback(frames);
                true
            }
            None => false,
        }
    }

    pub fn is_activated(&self) -> bool {
        lock(&self.process).is_some()
    }
}

impl MemoryGraph {
    /// Run one cycle on each of `clients`, returning how many processed
    pub fn cycle_all(clients: &[&MemoryClient], frames: usize) -> usize {
        clients.iter().filter(|c| c.cycle(frames)).count()
    }
}

impl AudioServer for MemoryClient {
    type Port = MemoryPort;
    type Process = MemoryProcess;

    fn name(&self) -> &str {
        &self.name
    }

    fn register_port(
        &self,
        name: &str,
        kind: PortType,
        direction: PortDirection,
    ) -> BackendResult<PortHandle<MemoryPort>> {
        self.ensure_open()?;
        let full_name = full_port_name(&self.name, name);

        let mut state = lock(&self.graph.state);
        if state.port(&full_name).is_some() {
            return Err(BackendError::Register {
                name: full_name,
                reason: "port already exists".into(),
            });
        }
        let id = self.graph.next_id.fetch_add(1, Ordering::Relaxed);
        state.ports.push(PortEntry {
            name: full_name.clone(),
            kind,
            direction,
            owner: Some(self.name.clone()),
            id,
        });

        Ok(PortHandle::new(name, full_name, kind, direction, MemoryPort { id }))
    }

    fn unregister_port(&self, port: PortHandle<MemoryPort>) -> BackendResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.graph.state);
        let owned = state.port(port.full_name()).map_or(false, |p| {
            p.id == port.port().id && p.owner.as_deref() == Some(self.name.as_str())
        });
        if !owned || !state.remove_port(port.full_name()) {
            return Err(BackendError::Unregister {
                name: port.full_name().to_string(),
                reason: "no such port".into(),
            });
        }
        Ok(())
    }

    fn ports(
        &self,
        pattern: Option<&str>,
        kind: PortType,
        direction: Option<PortDirection>,
    ) -> Vec<String> {
        let regex = match pattern.map(Regex::new).transpose() {
            Ok(regex) => regex,
            Err(e) => {
                log::debug!("Memory server: invalid port pattern: {}", e);
                return Vec::new();
            }
        };

        lock(&self.graph.state)
            .ports
            .iter()
            .filter(|p| p.kind == kind)
            .filter(|p| direction.map_or(true, |d| p.direction == d))
            .filter(|p| regex.as_ref().map_or(true, |r| r.is_match(&p.name)))
            .map(|p| p.name.clone())
            .collect()
    }

    fn connect(&self, source: &str, destination: &str) -> BackendResult<()> {
        self.ensure_open()?;
        let fail = |reason: &str| BackendError::Connect {
            from: source.to_string(),
            to: destination.to_string(),
            reason: reason.to_string(),
        };

        let mut state = lock(&self.graph.state);
        let (src, dst) = match (state.port(source), state.port(destination)) {
            (Some(src), Some(dst)) => (src, dst),
            _ => return Err(fail("no such port")),
        };
        if src.direction != PortDirection::Out || dst.direction != PortDirection::In {
            return Err(fail("source must be an output and destination an input"));
        }
        if src.kind != dst.kind {
            return Err(fail("port types differ"));
        }
        if state
            .connections
            .iter()
            .any(|(s, d)| s == source && d == destination)
        {
            return Err(fail("already connected"));
        }
        state
            .connections
            .push((source.to_string(), destination.to_string()));
        Ok(())
    }

    fn activate(&self, process: MemoryProcess, status: Arc<SessionStatus>) -> BackendResult<()> {
        self.ensure_open()?;
        let mut state = lock(&self.graph.state);
        match state.clients.get_mut(&self.name) {
            Some(slot) if slot.is_none() => *slot = Some(Arc::clone(&status)),
            Some(_) => return Err(BackendError::Activate("already active".into())),
            None => return Err(BackendError::Closed(self.name.clone())),
        }
        drop(state);

        *lock(&self.status) = Some(status);
        *lock(&self.process) = Some(process);
        Ok(())
    }

    fn close(&self) -> BackendResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        lock(&self.process).take();
        lock(&self.graph.state).remove_client(&self.name);
        log::info!("Memory server: client '{}' closed", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use std::sync::atomic::AtomicUsize;

    fn open(graph: &MemoryGraph, name: &str) -> MemoryClient {
        MemoryConnector::new(graph.clone()).open(name).unwrap()
    }

    fn active_status() -> Arc<SessionStatus> {
        let status = Arc::new(SessionStatus::new());
        assert!(status.advance(SessionState::New, SessionState::Initialising));
        assert!(status.advance(SessionState::Initialising, SessionState::Active));
        status
    }

    #[test]
    fn test_open_refused_when_offline() {
        let graph = MemoryGraph::new();
        graph.set_offline(true);
        let err = MemoryConnector::new(graph.clone()).open("zone").err().unwrap();
        assert!(matches!(err, BackendError::Open { .. }));
    }

    #[test]
    fn test_open_refuses_duplicate_name() {
        let graph = MemoryGraph::new();
        let _client = open(&graph, "zone");
        assert!(MemoryConnector::new(graph.clone()).open("zone").is_err());
    }

    #[test]
    fn test_register_and_list() {
        let graph = MemoryGraph::new();
        graph.add_peer("system:capture_1", PortType::Audio, PortDirection::Out);
        let client = open(&graph, "zone");

        let handle = client
            .register_port("in_left", PortType::Audio, PortDirection::In)
            .unwrap();
        assert_eq!(handle.full_name(), "zone:in_left");

        assert_eq!(
            client.ports(None, PortType::Audio, None),
            vec!["system:capture_1".to_string(), "zone:in_left".to_string()]
        );
        assert_eq!(
            client.ports(Some("^zone:"), PortType::Audio, Some(PortDirection::In)),
            vec!["zone:in_left".to_string()]
        );
        assert!(client.ports(None, PortType::Midi, None).is_empty());
    }

    #[test]
    fn test_connect_rules() {
        let graph = MemoryGraph::new();
        graph.add_peer("synth:out", PortType::Audio, PortDirection::Out);
        graph.add_peer("keys:out", PortType::Midi, PortDirection::Out);
        let client = open(&graph, "zone");
        client.register_port("in", PortType::Audio, PortDirection::In).unwrap();

        assert!(client.connect("zone:in", "synth:out").is_err());
        assert!(client.connect("keys:out", "zone:in").is_err());
        assert!(client.connect("ghost:out", "zone:in").is_err());

        client.connect("synth:out", "zone:in").unwrap();
        assert!(graph.is_connected("synth:out", "zone:in"));
        assert!(client.connect("synth:out", "zone:in").is_err());
    }

    #[test]
    fn test_unregister_drops_connections() {
        let graph = MemoryGraph::new();
        graph.add_peer("synth:out", PortType::Audio, PortDirection::Out);
        let client = open(&graph, "zone");
        let handle = client.register_port("in", PortType::Audio, PortDirection::In).unwrap();
        client.connect("synth:out", "zone:in").unwrap();

        client.unregister_port(handle).unwrap();
        assert!(graph.connections().is_empty());
        assert_eq!(graph.port_names(), vec!["synth:out".to_string()]);
    }

    #[test]
    fn test_cycle_stops_when_session_stops() {
        let graph = MemoryGraph::new();
        let client = open(&graph, "zone");
        let count = Arc::new(AtomicUsize::new(0));
        let status = active_status();

        assert!(!client.cycle(64));
        let c = Arc::clone(&count);
        client
            .activate(
                Box::new(move |frames| {
                    c.fetch_add(frames, Ordering::SeqCst);
                }),
                Arc::clone(&status),
            )
            .unwrap();

        assert!(client.cycle(64));
        assert_eq!(MemoryGraph::cycle_all(&[&client], 64), 1);
        assert_eq!(count.load(Ordering::SeqCst), 128);

        assert!(status.begin_closing());
        assert!(!client.cycle(64));
        assert!(!client.is_activated());
        assert_eq!(count.load(Ordering::SeqCst), 128);
    }

    #[test]
    fn test_kill_client_notifies_session() {
        let graph = MemoryGraph::new();
        let client = open(&graph, "zone");
        client.register_port("out", PortType::Midi, PortDirection::Out).unwrap();
        let status = active_status();
        client.activate(Box::new(|_| {}), Arc::clone(&status)).unwrap();

        assert!(graph.kill_client("zone"));
        assert_eq!(status.get(), SessionState::Closing);
        assert!(graph.port_names().is_empty());
        assert!(matches!(
            client.register_port("again", PortType::Midi, PortDirection::Out),
            Err(BackendError::Closed(_))
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let graph = MemoryGraph::new();
        let client = open(&graph, "zone");
        client.register_port("out", PortType::Audio, PortDirection::Out).unwrap();

        client.close().unwrap();
        client.close().unwrap();
        assert!(graph.clients().is_empty());
        assert!(graph.port_names().is_empty());
    }
}
