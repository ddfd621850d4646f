//! Audio-server backends
//!
//! A [`Connector`] opens named clients on a server; the resulting
//! [`AudioServer`] registers ports, lists and connects them, and runs the
//! realtime process callback once activated.
//!
//! - [`memory`]: in-process port graph (always available, used by tests)
//! - `jack_backend`: native JACK client (Linux, `jack-backend` feature)

use std::sync::Arc;

use crate::error::BackendResult;
use crate::ports::{PortDirection, PortHandle, PortType};
use crate::session::SessionStatus;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub mod jack_backend;
pub mod memory;

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use jack_backend::{JackConnector, JackPort, JackProcess, JackServer};
pub use memory::{MemoryClient, MemoryConnector, MemoryGraph, MemoryPort, MemoryProcess};

/// An open client on an audio server
///
/// Shared between the session thread and callers of
/// [`ClientSession::client`](crate::session::ClientSession::client), so every
/// method takes `&self`. None of these may be called from the process
/// callback.
pub trait AudioServer: Send + Sync + 'static {
    /// Backend port object carried inside [`PortHandle`]
    type Port: Send + 'static;

    /// Realtime process callback installed by [`AudioServer::activate`]
    type Process: Send + 'static;

    /// Client name as assigned by the server
    fn name(&self) -> &str;

    fn register_port(
        &self,
        name: &str,
        kind: PortType,
        direction: PortDirection,
    ) -> BackendResult<PortHandle<Self::Port>>;

    fn unregister_port(&self, port: PortHandle<Self::Port>) -> BackendResult<()>;

    /// Full names of live ports of `kind`
    ///
    /// `pattern` is a regular expression over full names; `direction` of
    /// `None` lists both directions.
    fn ports(&self, pattern: Option<&str>, kind: PortType, direction: Option<PortDirection>)
        -> Vec<String>;

    /// Connect an output port to an input port
    fn connect(&self, source: &str, destination: &str) -> BackendResult<()>;

    /// Start calling `process` once per cycle
    ///
    /// The backend stops the callback once `status` leaves the running
    /// states, and moves it to closing when the server shuts the client down.
    fn activate(&self, process: Self::Process, status: Arc<SessionStatus>) -> BackendResult<()>;

    /// Deactivate and release the client
    fn close(&self) -> BackendResult<()>;
}

/// Opens clients on an audio server
pub trait Connector: Send + Sync + 'static {
    type Server: AudioServer;

    /// Open a client without auto-starting the server
    fn open(&self, client_name: &str) -> BackendResult<Self::Server>;
}

/// Port object type of a connector's server
pub type PortOf<C> = <<C as Connector>::Server as AudioServer>::Port;

/// Process callback type of a connector's server
pub type ProcessOf<C> = <<C as Connector>::Server as AudioServer>::Process;
