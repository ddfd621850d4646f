//! Zone Engine - audio-server sessions for the Zone signal path
//!
//! Two client sessions (AUDIO and MIDI) talk to the server through an
//! [`AudioServer`] backend. Port work from the control side is queued as a
//! [`Request`] and executed on the session's own thread, outside the
//! realtime callback. [`EngineFacade`] routes requests by port type.

pub mod backend;
pub mod dispatch;
pub mod error;
pub mod facade;
pub mod ports;
pub mod request;
pub mod session;

pub use backend::{AudioServer, Connector, MemoryConnector, MemoryGraph, PortOf, ProcessOf};
pub use dispatch::Dispatcher;
pub use error::{BackendError, EngineError, EngineResult, SessionError};
pub use facade::{EngineFacade, PortListing};
pub use ports::{PortDirection, PortHandle, PortType};
pub use request::{ConnectRequest, Connected, PortRequest, QueryRequest, Request, RequestQueue};
pub use session::{ClientSession, SessionHooks, SessionState, SessionStatus};

#[cfg(all(target_os = "linux", feature = "jack-backend"))]
pub use backend::{JackConnector, JackServer};
