//! Transport notifications from the player to a non-realtime observer
//!
//! The player never calls the observer directly. It pushes small events
//! into a pre-allocated `rtrb` ring; a UI or housekeeping thread calls
//! [`PositionRelay::pump`] to deliver them.
//!
//! ```text
//! ┌──────────────────┐  push (wait-free)  ┌──────────────┐  pump()  ┌──────────┐
//! │  Player (RT)     │───────────────────►│ PlayerEvent  │─────────►│  Played  │
//! │  process()       │                    │ ring buffer  │          │ observer │
//! └──────────────────┘                    └──────────────┘          └──────────┘
//! ```

/// Capacity of the notification ring
///
/// One head update per callback; 256 entries covers several seconds of
/// transport updates at typical buffer sizes before the relay must run.
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Observer of a player's transport
pub trait Played: Send {
    /// The play head moved to `sample` (absolute sample index)
    fn set_head(&mut self, sample: u64);

    /// Playback stopped on its own (end of a one-shot)
    fn play_state(&mut self);
}

/// Notification posted by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// Head position in absolute samples
    Head(u64),
    /// Transition from playing to stopped
    Stopped,
}

/// Create the producer/consumer pair backing a relay
pub(crate) fn event_channel() -> (rtrb::Producer<PlayerEvent>, rtrb::Consumer<PlayerEvent>) {
    rtrb::RingBuffer::new(EVENT_QUEUE_CAPACITY)
}

/// Delivers queued player events to an observer off the realtime thread
pub struct PositionRelay {
    events: rtrb::Consumer<PlayerEvent>,
    observer: Box<dyn Played>,
}

impl PositionRelay {
    pub(crate) fn new(events: rtrb::Consumer<PlayerEvent>, observer: Box<dyn Played>) -> Self {
        Self { events, observer }
    }

    /// Deliver every pending event, returning how many were delivered
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.events.pop() {
            match event {
                PlayerEvent::Head(sample) => self.observer.set_head(sample),
                PlayerEvent::Stopped => self.observer.play_state(),
            }
            delivered += 1;
        }
        delivered
    }

    /// Number of events waiting to be delivered
    pub fn pending(&self) -> usize {
        self.events.slots()
    }

    /// Check if the player side has been dropped or detached
    pub fn is_detached(&self) -> bool {
        self.events.is_abandoned()
    }
}
