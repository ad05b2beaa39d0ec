//! Batched write reservations for external producers.

use crate::segment::Segment;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{MutexGuard, RwLockReadGuard};
use std::sync::Arc;

/// A bounded, exclusive view into the writable tail of a writer's current
/// segment, intended for batched external producers (e.g. draining a
/// kernel receive buffer in one go).
///
/// While the hook lives it holds the participant's execution slot, the
/// segment's writer-entry gate and a shared hold on the dispatcher's
/// teardown latch, so the view cannot be invalidated: no other append
/// lands in the segment, the pruner leaves claimed segments alone, and
/// `shutdown` waits for the hook to be dropped. The flip side is that any
/// further dispatcher operation on the same participant waits until the
/// hook is dropped; issuing one from the same thread deadlocks.
///
/// Items pushed through the hook are published slot by slot and become
/// visible to readers immediately.
pub struct WriteHook<'a, T> {
    segment: Arc<Segment<T>>,
    start: usize,
    _gate: ArcMutexGuard<parking_lot::RawMutex, ()>,
    _op: MutexGuard<'a, ()>,
    _running: RwLockReadGuard<'a, ()>,
}

impl<'a, T> WriteHook<'a, T> {
    pub(crate) fn new(
        segment: Arc<Segment<T>>,
        op: MutexGuard<'a, ()>,
        running: RwLockReadGuard<'a, ()>,
    ) -> Self {
        let gate = segment.write_gate.lock_arc();
        segment.begin_write();
        let start = segment.len();
        Self {
            segment,
            start,
            _gate: gate,
            _op: op,
            _running: running,
        }
    }

    /// Slots still available behind this segment's frontier.
    pub fn remaining(&self) -> usize {
        self.segment.capacity() - self.segment.len()
    }

    /// Items published through this hook so far.
    pub fn written(&self) -> usize {
        self.segment.len() - self.start
    }

    /// Sequence number of the reserved segment.
    pub fn segment_seq(&self) -> u64 {
        self.segment.seq()
    }

    /// Publish one item, or hand it back once the reservation is spent.
    /// The caller then drops the hook and requests a new one, which opens
    /// the next segment.
    pub fn try_push(&mut self, item: T) -> Result<(), T> {
        // Exclusive: this hook holds the segment's writer-entry gate.
        unsafe { self.segment.push(item) }
    }
}

impl<T> Drop for WriteHook<'_, T> {
    fn drop(&mut self) {
        self.segment.end_write();
    }
}

#[cfg(test)]
mod tests {
    use crate::access::AccessLevel;
    use crate::config::BufferConfig;
    use crate::dispatcher::Dispatcher;
    use crate::participant::Participant;

    fn quiet_config() -> BufferConfig {
        BufferConfig {
            segment_capacity: 4,
            prune_interval_ms: 3_600_000,
            ..BufferConfig::default()
        }
    }

    #[test]
    fn hook_fills_the_tail_segment() {
        let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
        let writer = Participant::make(Some("source"), AccessLevel::WRITE);
        dispatcher.write(0u32, &writer).unwrap();

        let mut hook = dispatcher.write_hook(&writer).unwrap();
        assert_eq!(hook.remaining(), 3);
        for value in 1..4u32 {
            assert!(hook.try_push(value).is_ok());
        }
        assert_eq!(hook.remaining(), 0);
        assert_eq!(hook.written(), 3);
        assert_eq!(hook.try_push(9), Err(9));
        drop(hook);

        let reader = Participant::make(Some("sink"), AccessLevel::READ);
        for expected in 0..4u32 {
            assert_eq!(dispatcher.read(&reader).unwrap(), expected);
        }
    }

    #[test]
    fn hook_on_full_tail_opens_next_segment() {
        let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
        let writer = Participant::make(Some("source"), AccessLevel::WRITE);
        for value in 0..4u32 {
            dispatcher.write(value, &writer).unwrap();
        }
        assert_eq!(dispatcher.segment_count(), 1);

        let hook = dispatcher.write_hook(&writer).unwrap();
        assert_eq!(dispatcher.segment_count(), 2);
        assert_eq!(hook.remaining(), 4);
        assert_eq!(hook.written(), 0);
    }

    #[test]
    fn hook_requires_write_capability() {
        let dispatcher: Dispatcher<u32> = Dispatcher::with_config(quiet_config()).unwrap();
        let reader = Participant::make(Some("sink"), AccessLevel::READ);
        assert!(dispatcher.write_hook(&reader).is_err());
    }

    #[test]
    fn writes_resume_in_order_after_hook() {
        let dispatcher = Dispatcher::with_config(quiet_config()).unwrap();
        let (reader, writer) = Participant::make_pair("sink", "source");

        dispatcher.write(0u32, &writer).unwrap();
        {
            let mut hook = dispatcher.write_hook(&writer).unwrap();
            assert!(hook.try_push(1).is_ok());
        }
        dispatcher.write(2u32, &writer).unwrap();

        for expected in 0..3u32 {
            assert_eq!(dispatcher.read(&reader).unwrap(), expected);
        }
    }
}
