//! Native JACK backend for Linux
//!
//! One [`JackServer`] per session. The client starts inactive so ports can
//! be registered from the session's `initialize` hook, then
//! [`AudioServer::activate`] hands the caller's process callback to JACK.
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  Session thread  │───activate()───────►│   JACK RT Thread    │
//! │  (request queue) │                     │  JackProcessor      │
//! └────────┬─────────┘                     └──────────┬──────────┘
//!          │ advance()                                │ is_running()
//!          ▼                                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                  SessionStatus (atomic, CAS)                 │
//! └──────────────────────────────────────────────────────────────┘
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jack::{
    AudioIn, AudioOut, Client, ClientOptions, ClientStatus, Control, MidiIn, MidiOut, Port,
    PortFlags, ProcessScope,
};

use super::{AudioServer, Connector};
use crate::error::{BackendError, BackendResult};
use crate::ports::{full_port_name, PortDirection, PortHandle, PortType};
use crate::session::SessionStatus;

/// JACK type name of audio ports
const AUDIO_TYPE: &str = "32 bit float mono audio";

/// JACK type name of MIDI ports
const MIDI_TYPE: &str = "8 bit raw midi";

/// Realtime process callback of a JACK session
pub type JackProcess = Box<dyn FnMut(&Client, &ProcessScope) -> Control + Send + 'static>;

/// A registered JACK port of any supported type and direction
pub enum JackPort {
    AudioIn(Port<AudioIn>),
    AudioOut(Port<AudioOut>),
    MidiIn(Port<MidiIn>),
    MidiOut(Port<MidiOut>),
}

/// JACK process handler
///
/// Stops the callback as soon as the session leaves the running states.
struct JackProcessor {
    process: JackProcess,
    status: Arc<SessionStatus>,
}

impl jack::ProcessHandler for JackProcessor {
    fn process(&mut self, client: &Client, ps: &ProcessScope) -> Control {
        if !self.status.is_running() {
            return Control::Quit;
        }
        (self.process)(client, ps)
    }
}

/// JACK notification handler
struct JackNotifications {
    name: String,
    status: Arc<SessionStatus>,
}

impl jack::NotificationHandler for JackNotifications {
    unsafe fn shutdown(&mut self, _status: ClientStatus, reason: &str) {
        log::warn!("JACK shut down client '{}': {}", self.name, reason);
        self.status.server_shutdown();
    }

    fn xrun(&mut self, _client: &Client) -> Control {
        log::warn!("JACK xrun detected");
        Control::Continue
    }
}

enum ClientState {
    Inactive(Client),
    Active(jack::AsyncClient<JackNotifications, JackProcessor>),
    Closed,
}

/// An open JACK client
pub struct JackServer {
    name: String,
    state: Mutex<ClientState>,
}

impl JackServer {
    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_client<R>(&self, f: impl FnOnce(&Client) -> BackendResult<R>) -> BackendResult<R> {
        match &*self.state() {
            ClientState::Inactive(client) => f(client),
            ClientState::Active(active) => f(active.as_client()),
            ClientState::Closed => Err(BackendError::Closed(self.name.clone())),
        }
    }

    /// Sample rate of the server (0 once closed)
    pub fn sample_rate(&self) -> usize {
        self.with_client(|c| Ok(c.sample_rate())).unwrap_or(0)
    }

    /// Current buffer size in frames (0 once closed)
    pub fn buffer_size(&self) -> u32 {
        self.with_client(|c| Ok(c.buffer_size())).unwrap_or(0)
    }
}

impl AudioServer for JackServer {
    type Port = JackPort;
    type Process = JackProcess;

    fn name(&self) -> &str {
        &self.name
    }

    fn register_port(
        &self,
        name: &str,
        kind: PortType,
        direction: PortDirection,
    ) -> BackendResult<PortHandle<JackPort>> {
        self.with_client(|client| {
            let fail = |e: jack::Error| BackendError::Register {
                name: name.to_string(),
                reason: e.to_string(),
            };
            let (full_name, port) = match (kind, direction) {
                (PortType::Audio, PortDirection::In) => {
                    let p = client.register_port(name, AudioIn::default()).map_err(fail)?;
                    (p.name(), JackPort::AudioIn(p))
                }
                (PortType::Audio, PortDirection::Out) => {
                    let p = client.register_port(name, AudioOut::default()).map_err(fail)?;
                    (p.name(), JackPort::AudioOut(p))
                }
                (PortType::Midi, PortDirection::In) => {
                    let p = client.register_port(name, MidiIn::default()).map_err(fail)?;
                    (p.name(), JackPort::MidiIn(p))
                }
                (PortType::Midi, PortDirection::Out) => {
                    let p = client.register_port(name, MidiOut::default()).map_err(fail)?;
                    (p.name(), JackPort::MidiOut(p))
                }
            };
            let full_name = full_name.unwrap_or_else(|_| full_port_name(client.name(), name));
            Ok(PortHandle::new(name, full_name, kind, direction, port))
        })
    }

    fn unregister_port(&self, port: PortHandle<JackPort>) -> BackendResult<()> {
        let name = port.full_name().to_string();
        self.with_client(move |client| {
            let result = match port.into_port() {
                JackPort::AudioIn(p) => client.unregister_port(p),
                JackPort::AudioOut(p) => client.unregister_port(p),
                JackPort::MidiIn(p) => client.unregister_port(p),
                JackPort::MidiOut(p) => client.unregister_port(p),
            };
            result.map_err(|e| BackendError::Unregister {
                name,
                reason: e.to_string(),
            })
        })
    }

    fn ports(
        &self,
        pattern: Option<&str>,
        kind: PortType,
        direction: Option<PortDirection>,
    ) -> Vec<String> {
        let type_name = match kind {
            PortType::Audio => AUDIO_TYPE,
            PortType::Midi => MIDI_TYPE,
        };
        let flags = match direction {
            Some(PortDirection::In) => PortFlags::IS_INPUT,
            Some(PortDirection::Out) => PortFlags::IS_OUTPUT,
            None => PortFlags::empty(),
        };
        self.with_client(|client| Ok(client.ports(pattern, Some(type_name), flags)))
            .unwrap_or_default()
    }

    fn connect(&self, source: &str, destination: &str) -> BackendResult<()> {
        self.with_client(|client| {
            client
                .connect_ports_by_name(source, destination)
                .map_err(|e| BackendError::Connect {
                    from: source.to_string(),
                    to: destination.to_string(),
                    reason: e.to_string(),
                })
        })
    }

    fn activate(&self, process: JackProcess, status: Arc<SessionStatus>) -> BackendResult<()> {
        let mut state = self.state();
        let client = match std::mem::replace(&mut *state, ClientState::Closed) {
            ClientState::Inactive(client) => client,
            active @ ClientState::Active(_) => {
                *state = active;
                return Err(BackendError::Activate("already active".into()));
            }
            ClientState::Closed => return Err(BackendError::Closed(self.name.clone())),
        };

        let notifications = JackNotifications {
            name: self.name.clone(),
            status: Arc::clone(&status),
        };
        let processor = JackProcessor { process, status };
        let active = client
            .activate_async(notifications, processor)
            .map_err(|e| BackendError::Activate(e.to_string()))?;

        log::info!("JACK client '{}' activated", self.name);
        *state = ClientState::Active(active);
        Ok(())
    }

    fn close(&self) -> BackendResult<()> {
        let previous = std::mem::replace(&mut *self.state(), ClientState::Closed);
        match previous {
            ClientState::Active(active) => {
                active
                    .deactivate()
                    .map_err(|e| BackendError::Close(e.to_string()))?;
            }
            ClientState::Inactive(client) => drop(client),
            ClientState::Closed => return Ok(()),
        }
        log::info!("JACK client '{}' closed", self.name);
        Ok(())
    }
}

/// Opens JACK clients without starting a server
#[derive(Debug, Clone, Copy, Default)]
pub struct JackConnector;

impl Connector for JackConnector {
    type Server = JackServer;

    fn open(&self, client_name: &str) -> BackendResult<JackServer> {
        let (client, _status) = Client::new(client_name, ClientOptions::NO_START_SERVER)
            .map_err(|e| BackendError::Open {
                name: client_name.to_string(),
                reason: e.to_string(),
            })?;

        // JACK may rename the client if the name is taken
        let name = client.name().to_string();
        log::info!(
            "JACK client '{}' created (sample rate: {}Hz, buffer: {} frames)",
            name,
            client.sample_rate(),
            client.buffer_size()
        );

        Ok(JackServer {
            name,
            state: Mutex::new(ClientState::Inactive(client)),
        })
    }
}
