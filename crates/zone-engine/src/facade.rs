//! Engine facade - routes port work to the AUDIO or MIDI session
//!
//! The facade owns two [`ClientSession`]s on the same server and a shared
//! callback [`Dispatcher`]. Requests are routed by port type; queries fan
//! out to both sessions and join with a bounded wait.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use zone_core::config::{DspConfig, EngineConfig, SessionConfig};
use zone_core::effect::{Convolution, IrProvider};
use zone_core::playback::Player;

use crate::backend::{AudioServer, Connector, PortOf};
use crate::dispatch::Dispatcher;
use crate::error::{EngineResult, SessionError};
use crate::ports::{PortDirection, PortHandle, PortType};
use crate::request::{ConnectRequest, PortRequest, QueryRequest, Request, RequestSender};
use crate::session::{ClientSession, SessionHooks};

/// Port names gathered by a query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortListing {
    pub audio: Vec<String>,
    pub midi: Vec<String>,
}

/// Entry point for port registration, connection, and queries
pub struct EngineFacade<C: Connector> {
    audio: ClientSession<C>,
    midi: ClientSession<C>,
    query_timeout: Duration,
    dsp: DspConfig,
}

impl<C: Connector> EngineFacade<C> {
    pub fn new(
        connector: Arc<C>,
        audio: SessionConfig,
        midi: SessionConfig,
        query_timeout: Duration,
        callback_workers: usize,
    ) -> EngineResult<Self> {
        let dispatcher = Dispatcher::new(callback_workers).map_err(SessionError::Spawn)?;
        Ok(Self {
            audio: ClientSession::new(audio, Arc::clone(&connector), dispatcher.clone()),
            midi: ClientSession::new(midi, connector, dispatcher),
            query_timeout,
            dsp: DspConfig::default(),
        })
    }

    /// Build the facade from engine settings
    pub fn from_config(connector: Arc<C>, config: &EngineConfig) -> EngineResult<Self> {
        let mut facade = Self::new(
            connector,
            config.audio.clone(),
            config.midi.clone(),
            config.query_timeout(),
            config.callback_workers,
        )?;
        facade.dsp = config.dsp;
        Ok(facade)
    }

    /// Block sizes for the players and effects of this engine
    pub fn dsp(&self) -> &DspConfig {
        &self.dsp
    }

    /// A stopped player sized for this engine's callback
    pub fn player(&self) -> Player {
        Player::from_config(&self.dsp)
    }

    /// A stereo convolution sized for this engine's callback
    pub fn convolution(&self, db: Arc<dyn IrProvider>) -> Convolution {
        Convolution::from_config(&self.dsp, db)
    }

    /// Session owning AUDIO ports
    pub fn audio(&self) -> &ClientSession<C> {
        &self.audio
    }

    /// Session owning MIDI ports
    pub fn midi(&self) -> &ClientSession<C> {
        &self.midi
    }

    pub fn session(&self, kind: PortType) -> &ClientSession<C> {
        match kind {
            PortType::Audio => &self.audio,
            PortType::Midi => &self.midi,
        }
    }

    /// Start both sessions
    pub fn start<A, M>(&self, audio_hooks: A, midi_hooks: M) -> EngineResult<()>
    where
        A: SessionHooks<C::Server>,
        M: SessionHooks<C::Server>,
    {
        self.audio.start(audio_hooks)?;
        self.midi.start(midi_hooks)?;
        Ok(())
    }

    /// Close both sessions
    pub fn close(&self) {
        self.audio.close();
        self.midi.close();
    }

    /// Queue a port registration on the session of its type
    pub fn register(&self, request: PortRequest<PortOf<C>>) -> bool {
        self.session(request.kind)
            .sender()
            .send(Request::Register(request))
    }

    /// Queue a connection on the session of its type
    ///
    /// MIDI connects local → peer and audio connects peer → local, whatever
    /// the local port's direction. See [`ConnectRequest`].
    pub fn connect(&self, request: ConnectRequest) -> bool {
        self.session(request.kind)
            .sender()
            .send(Request::Connect(request))
    }

    /// Queue the removal of a port on the session of its type
    pub fn unregister(&self, port: PortHandle<PortOf<C>>) -> bool {
        self.session(port.kind())
            .sender()
            .send(Request::Unregister(port))
    }

    /// List AUDIO outputs and MIDI inputs
    ///
    /// Waits at most the configured query timeout. A session that does not
    /// answer in time leaves its list empty.
    pub fn query(&self) -> PortListing {
        self.query_ports(PortDirection::Out, PortDirection::In)
    }

    /// List AUDIO and MIDI ports of the given directions
    pub fn query_ports(&self, audio: PortDirection, midi: PortDirection) -> PortListing {
        join_query(
            &self.audio.sender(),
            &self.midi.sender(),
            audio,
            midi,
            self.query_timeout,
        )
    }

    /// Run [`Self::query`] on a background thread and hand the result to `sink`
    pub fn query_with<F>(&self, sink: F)
    where
        F: FnOnce(PortListing) + Send + 'static,
    {
        let audio = self.audio.sender();
        let midi = self.midi.sender();
        let timeout = self.query_timeout;
        let spawned = thread::Builder::new()
            .name("zone-port-query".into())
            .spawn(move || {
                sink(join_query(
                    &audio,
                    &midi,
                    PortDirection::Out,
                    PortDirection::In,
                    timeout,
                ))
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn port query thread: {}", e);
        }
    }

    /// Wait until both sessions have executed everything queued so far
    ///
    /// Sessions that never started or have shut down are skipped.
    pub fn flush(&self) {
        self.audio.flush();
        self.midi.flush();
    }

    /// Register a port right away, bypassing the queue
    ///
    /// Blocks until the session has a client. Never call from the process
    /// callback.
    pub fn register_now(
        &self,
        kind: PortType,
        direction: PortDirection,
        name: &str,
    ) -> EngineResult<PortHandle<PortOf<C>>> {
        let server = self.client(kind)?;
        Ok(server.register_port(name, kind, direction)?)
    }

    /// Connect a local port to the peer named exactly `peer`, bypassing the queue
    ///
    /// MIDI flows out of the local port, audio into it. Never call from the
    /// process callback.
    pub fn connect_now<P>(&self, local: &PortHandle<P>, peer: &str) -> EngineResult<()> {
        let kind = local.kind();
        let server = self.client(kind)?;
        let (source, destination) = match kind {
            PortType::Midi => (local.full_name(), peer),
            PortType::Audio => (peer, local.full_name()),
        };
        log::debug!("Connecting {} -> {}", source, destination);
        Ok(server.connect(source, destination)?)
    }

    fn client(&self, kind: PortType) -> EngineResult<Arc<C::Server>> {
        let session = self.session(kind);
        session
            .client()
            .ok_or_else(|| SessionError::NoClient(session.name().to_string()).into())
    }
}

/// Send one query to each session and wait for both answers
fn join_query<P>(
    audio: &RequestSender<P>,
    midi: &RequestSender<P>,
    audio_direction: PortDirection,
    midi_direction: PortDirection,
    timeout: Duration,
) -> PortListing {
    let (tx, answers) = channel::bounded(2);
    let deadline = Instant::now() + timeout;

    let audio_tx = tx.clone();
    audio.send(Request::Query(QueryRequest::new(
        PortType::Audio,
        audio_direction,
        move |ports| {
            let _ = audio_tx.send((PortType::Audio, ports));
        },
    )));
    midi.send(Request::Query(QueryRequest::new(
        PortType::Midi,
        midi_direction,
        move |ports| {
            let _ = tx.send((PortType::Midi, ports));
        },
    )));

    let mut listing = PortListing::default();
    for _ in 0..2 {
        match answers.recv_deadline(deadline) {
            Ok((PortType::Audio, ports)) => listing.audio = ports,
            Ok((PortType::Midi, ports)) => listing.midi = ports,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Timed out waiting for port queries after {:?}", timeout);
                break;
            }
            // Both requests dropped without answering
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    listing
}
