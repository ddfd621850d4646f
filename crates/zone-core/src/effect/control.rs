//! Lock-free parameter changes for effects running in the process callback
//!
//! [`ParamControl::set`] pushes a [`ParamChange`] into an `rtrb` ring; the
//! callback calls [`ParamQueue::apply`] before processing a block. Values
//! the effect rejects leave it unchanged and are counted for the control
//! side, since the realtime thread does not log.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::Effect;

/// Capacity of the parameter ring
pub const PARAM_QUEUE_CAPACITY: usize = 64;

/// A parameter change for [`Effect::set`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamChange {
    pub index: usize,
    pub value: i32,
}

/// Create a linked control/queue pair
pub fn param_channel() -> (ParamControl, ParamQueue) {
    let (tx, rx) = rtrb::RingBuffer::new(PARAM_QUEUE_CAPACITY);
    let rejected = Arc::new(AtomicUsize::new(0));
    let control = ParamControl {
        changes: tx,
        rejected: Arc::clone(&rejected),
    };
    let queue = ParamQueue {
        changes: rx,
        rejected,
    };
    (control, queue)
}

/// Control-thread side
pub struct ParamControl {
    changes: rtrb::Producer<ParamChange>,
    rejected: Arc<AtomicUsize>,
}

impl ParamControl {
    /// Queue `value` for parameter `index`; `false` if the ring is full
    pub fn set(&mut self, index: usize, value: i32) -> bool {
        self.changes.push(ParamChange { index, value }).is_ok()
    }

    /// Changes the effect has refused so far
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Changes not yet applied
    pub fn pending(&self) -> usize {
        PARAM_QUEUE_CAPACITY - self.changes.slots()
    }
}

/// Callback side
pub struct ParamQueue {
    changes: rtrb::Consumer<ParamChange>,
    rejected: Arc<AtomicUsize>,
}

impl ParamQueue {
    /// Apply every queued change to `effect`, returning how many took
    pub fn apply<E: Effect + ?Sized>(&mut self, effect: &mut E) -> usize {
        let mut applied = 0;
        while let Ok(change) = self.changes.pop() {
            match effect.set(change.index, change.value) {
                Ok(()) => applied += 1,
                Err(_) => {
                    self.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::convolution::{CABINET, WET};
    use crate::effect::gain::VOLUME;
    use crate::effect::{Convolution, Gain, ImpulseResponse, IrLibrary};

    #[test]
    fn test_changes_wait_for_apply() {
        let (mut control, mut queue) = param_channel();
        let mut gain = Gain::new();

        assert!(control.set(VOLUME, 80));
        assert_eq!(gain.get(VOLUME).unwrap(), 50);
        assert_eq!(control.pending(), 1);

        assert_eq!(queue.apply(&mut gain), 1);
        assert_eq!(gain.get(VOLUME).unwrap(), 80);
        assert_eq!(control.pending(), 0);
    }

    #[test]
    fn test_rejected_change_leaves_effect_alone() {
        let taps = [1.0];
        let ir = ImpulseResponse::from_samples("unit", &taps, 256).unwrap();
        let library = IrLibrary::new().with(ir);
        let mut convolution = Convolution::new(64, 256, Arc::new(library));
        let (mut control, mut queue) = param_channel();

        control.set(CABINET, 0);
        control.set(CABINET, 3);
        control.set(WET, 40);
        assert_eq!(queue.apply(&mut convolution), 2);

        assert_eq!(control.rejected(), 1);
        assert_eq!(convolution.get(CABINET).unwrap(), 0);
        assert_eq!(convolution.get(WET).unwrap(), 40);
    }

    #[test]
    fn test_full_ring_refuses() {
        let (mut control, _queue) = param_channel();
        for _ in 0..PARAM_QUEUE_CAPACITY {
            assert!(control.set(VOLUME, 10));
        }
        assert!(!control.set(VOLUME, 10));
    }
}
