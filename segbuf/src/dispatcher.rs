//! Dispatcher façade: routes operations to segments for participants.
//!
//! The dispatcher is the unique owner of the ordered segment list. It
//! assigns participant ids, allocates segments on demand, enforces
//! capability checks, and routes `write`, `read` and `has_next` to the
//! segment indicated by each participant's state. Participants refer to
//! segments by creation sequence number only; strong references run
//! dispatcher → segment → participant, so teardown never has to break a
//! cycle.

use crate::access::AccessLevel;
use crate::config::BufferConfig;
use crate::error::{BufferError, BufferResult};
use crate::hook::WriteHook;
use crate::participant::{Participant, ParticipantId, ReadCursor, UNASSIGNED_ID};
use crate::pruner::PrunerEngine;
use crate::segment::Segment;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter snapshot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Segments allocated since the dispatcher was created.
    pub segments_created: u64,
    /// Segments reclaimed by the pruner.
    pub segments_pruned: u64,
    /// Completed pruner sweeps.
    pub prune_passes: u64,
}

/// Internal counters, updated with relaxed ordering on the hot paths.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) segments_created: AtomicU64,
    pub(crate) segments_pruned: AtomicU64,
    pub(crate) prune_passes: AtomicU64,
}

/// State shared between the dispatcher handle and the pruner engine.
pub(crate) struct Shared<T> {
    pub(crate) segments: RwLock<Vec<Arc<Segment<T>>>>,
    pub(crate) config: BufferConfig,
    pub(crate) stats: Counters,
    /// Teardown latch: held shared for the duration of every operation,
    /// exclusively by `shutdown`, which thereby joins anything in flight.
    ops_gate: RwLock<()>,
    next_participant_id: AtomicU64,
    next_segment_seq: AtomicU64,
}

impl<T> Shared<T> {
    pub(crate) fn new(config: BufferConfig) -> Self {
        Self {
            segments: RwLock::new(Vec::new()),
            config,
            stats: Counters::default(),
            ops_gate: RwLock::new(()),
            next_participant_id: AtomicU64::new(0),
            next_segment_seq: AtomicU64::new(0),
        }
    }

    /// Issue the next monotonic participant id.
    fn issue_id(&self) -> BufferResult<ParticipantId> {
        let id = self.next_participant_id.fetch_add(1, Ordering::Relaxed) + 1;
        if id == UNASSIGNED_ID {
            // Counter rolled over; the id space is spent.
            return Err(BufferError::CapacityExhausted);
        }
        Ok(id)
    }

    /// Next segment sequence number. Called under the list write latch so
    /// the list stays sorted by creation order.
    fn next_seq(&self) -> u64 {
        self.next_segment_seq.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Façade owning the segment list and routing all buffer operations.
pub struct Dispatcher<T> {
    pub(crate) shared: Arc<Shared<T>>,
    pruner: Mutex<Option<PrunerEngine>>,
}

impl<T> Dispatcher<T> {
    /// Number of live segments.
    pub fn segment_count(&self) -> usize {
        self.shared.segments.read().len()
    }

    /// Snapshot of the live segments, oldest first, for diagnostics.
    pub fn segments(&self) -> Vec<Arc<Segment<T>>> {
        self.shared.segments.read().clone()
    }

    /// Number of rosters the given participant currently appears in.
    pub fn claimed_segments(&self, participant: &Participant) -> usize {
        let id = participant.id();
        self.shared
            .segments
            .read()
            .iter()
            .filter(|seg| seg.roster_contains(id))
            .count()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> BufferStats {
        let stats = &self.shared.stats;
        BufferStats {
            segments_created: stats.segments_created.load(Ordering::Relaxed),
            segments_pruned: stats.segments_pruned.load(Ordering::Relaxed),
            prune_passes: stats.prune_passes.load(Ordering::Relaxed),
        }
    }

    /// The configuration this dispatcher was built with.
    pub fn config(&self) -> &BufferConfig {
        &self.shared.config
    }

    /// Stop the pruner, release every participant and free all segments.
    ///
    /// In-flight operations are joined first: every operation holds the
    /// teardown latch shared for its whole duration (a live [`WriteHook`]
    /// included), and this method takes it exclusively before draining.
    /// Also invoked from `Drop`; calling it twice is harmless.
    pub fn shutdown(&self) {
        if let Some(engine) = self.pruner.lock().take() {
            engine.stop();
        }
        let _quiesced = self.shared.ops_gate.write();
        let drained: Vec<_> = self.shared.segments.write().drain(..).collect();
        for segment in &drained {
            segment.clear_roster();
        }
        if !drained.is_empty() {
            tracing::debug!(segments = drained.len(), "dispatcher teardown freed segments");
        }
    }
}

impl<T> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<T: Clone + Send + Sync + 'static> Dispatcher<T> {
    /// Create a dispatcher with default configuration and start its
    /// pruner engine.
    pub fn new() -> BufferResult<Self> {
        Self::with_config(BufferConfig::default())
    }

    /// Create a dispatcher with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidConfig`] if validation fails.
    pub fn with_config(config: BufferConfig) -> BufferResult<Self> {
        config.validate()?;
        let shared = Arc::new(Shared::new(config));
        let pruner = PrunerEngine::start(Arc::clone(&shared));
        Ok(Self {
            shared,
            pruner: Mutex::new(Some(pruner)),
        })
    }

    /// Create a dispatcher holding one segment of `capacity` slots,
    /// claimed by `participant`.
    pub fn with_initial_segment(
        config: BufferConfig,
        capacity: usize,
        participant: &Arc<Participant>,
    ) -> BufferResult<Self> {
        Self::with_initial_segments(config, capacity, participant, 1)
    }

    /// Create a dispatcher pre-populated with `count` segments of
    /// `capacity` slots, each claimed by `participant`.
    pub fn with_initial_segments(
        config: BufferConfig,
        capacity: usize,
        participant: &Arc<Participant>,
        count: usize,
    ) -> BufferResult<Self> {
        if capacity == 0 {
            return Err(BufferError::InvalidConfig {
                reason: "segment capacity must be at least 1".to_string(),
            });
        }
        let dispatcher = Self::with_config(config)?;
        for _ in 0..count {
            dispatcher.allocate_segment(capacity, participant)?;
        }
        Ok(dispatcher)
    }

    /// Append `item` to the participant's stream.
    ///
    /// Writes go to the participant's most recent segment; when that
    /// segment is full (or the participant has none) a fresh one of the
    /// same capacity is opened at the tail of the list. Writes by one
    /// participant are observed in submission order; writes by different
    /// participants interleave at segment granularity.
    ///
    /// # Errors
    ///
    /// [`BufferError::InsufficientCapability`] without WRITE access;
    /// [`BufferError::AllocationFailed`] if a slab cannot be allocated.
    pub fn write(&self, item: T, participant: &Arc<Participant>) -> BufferResult<()> {
        let held = participant.access_level();
        if !held.can_write() {
            return Err(BufferError::InsufficientCapability {
                required: AccessLevel::WRITE,
                held,
            });
        }
        let _running = self.shared.ops_gate.read_recursive();
        let id = self.ensure_assigned(participant)?;
        let _op = participant.begin_op();

        let target = match self.writer_tail(id) {
            Some(seg) if seg.writable() => seg,
            Some(seg) => self.allocate_segment(seg.capacity(), participant)?,
            None => self.allocate_segment(self.shared.config.segment_capacity, participant)?,
        };

        if let Err(item) = Self::append(&target, item) {
            // The tail filled since it was selected; open the next segment.
            let next = self.allocate_segment(target.capacity(), participant)?;
            if Self::append(&next, item).is_err() {
                return Err(BufferError::AllocationFailed {
                    capacity: next.capacity(),
                });
            }
        }
        Ok(())
    }

    /// Return the next item in the participant's logical stream and
    /// advance its cursor, crossing segment boundaries as needed.
    ///
    /// Concurrent readers do not exclude each other; cursors are private
    /// and published slots are immutable.
    ///
    /// # Errors
    ///
    /// [`BufferError::InsufficientCapability`] without READ access;
    /// [`BufferError::NoAssociatedSegment`] if the buffer holds no
    /// segment at all; [`BufferError::EndOfStream`] once everything
    /// visible has been consumed.
    pub fn read(&self, participant: &Arc<Participant>) -> BufferResult<T> {
        let held = participant.access_level();
        if !held.can_read() {
            return Err(BufferError::InsufficientCapability {
                required: AccessLevel::READ,
                held,
            });
        }
        let _running = self.shared.ops_gate.read_recursive();
        let id = self.ensure_assigned(participant)?;
        let _op = participant.begin_op();
        let mut cursor = participant.cursor.lock();
        let list = self.shared.segments.read();

        let mut index = match cursor.segment_seq {
            Some(seq) => list
                .binary_search_by_key(&seq, |seg| seg.seq())
                .map_err(|_| BufferError::NoAssociatedSegment { participant: id })?,
            None => {
                if list.is_empty() {
                    return Err(BufferError::NoAssociatedSegment { participant: id });
                }
                Self::enter_segment(&list[0], participant, &mut cursor)?;
                0
            }
        };

        loop {
            let segment = &list[index];
            segment.begin_read();
            let item = segment.get(cursor.slot);
            segment.end_read();
            if let Some(item) = item {
                cursor.slot += 1;
                return Ok(item);
            }
            // Frontier reached; cross into the next live segment if any.
            index += 1;
            if index == list.len() {
                return Err(BufferError::EndOfStream);
            }
            Self::enter_segment(&list[index], participant, &mut cursor)?;
        }
    }

    /// Returns `true` if a `read` would currently succeed: the current
    /// segment has published slots beyond the cursor, or a later live
    /// segment has any content.
    pub fn has_next(&self, participant: &Arc<Participant>) -> BufferResult<bool> {
        let held = participant.access_level();
        if !held.can_read() {
            return Err(BufferError::InsufficientCapability {
                required: AccessLevel::READ,
                held,
            });
        }
        let _running = self.shared.ops_gate.read_recursive();
        let id = self.ensure_assigned(participant)?;
        let cursor = participant.cursor.lock();
        let list = self.shared.segments.read();
        if list.is_empty() {
            return Ok(false);
        }
        let (index, slot) = match cursor.segment_seq {
            Some(seq) => (
                list.binary_search_by_key(&seq, |seg| seg.seq())
                    .map_err(|_| BufferError::NoAssociatedSegment { participant: id })?,
                cursor.slot,
            ),
            None => (0, 0),
        };
        if slot < list[index].len() {
            return Ok(true);
        }
        Ok(list[index + 1..].iter().any(|seg| !seg.is_empty()))
    }

    /// General-purpose entry point: guarantee the participant an id and
    /// at least one claimed segment, then run `op` with no locks held.
    ///
    /// Locking is the business of the operation primitives `op` calls;
    /// nothing internal is exposed to the closure.
    pub fn with_participant<R>(
        &self,
        participant: &Arc<Participant>,
        op: impl FnOnce(&Self) -> R,
    ) -> BufferResult<R> {
        let _running = self.shared.ops_gate.read_recursive();
        let id = self.ensure_assigned(participant)?;
        let has_claim = {
            let list = self.shared.segments.read();
            list.iter().any(|seg| seg.roster_contains(id))
        };
        if !has_claim {
            self.allocate_segment(self.shared.config.segment_capacity, participant)?;
        }
        Ok(op(self))
    }

    /// Reserve the writable tail of the participant's current segment for
    /// batched appends. See [`WriteHook`] for the exclusivity the guard
    /// provides and the deadlock hazard of further operations on the same
    /// participant while it lives.
    pub fn write_hook<'a>(
        &'a self,
        participant: &'a Arc<Participant>,
    ) -> BufferResult<WriteHook<'a, T>> {
        let held = participant.access_level();
        if !held.can_write() {
            return Err(BufferError::InsufficientCapability {
                required: AccessLevel::WRITE,
                held,
            });
        }
        let running = self.shared.ops_gate.read_recursive();
        let id = self.ensure_assigned(participant)?;
        let op = participant.begin_op();
        let target = match self.writer_tail(id) {
            Some(seg) if seg.writable() => seg,
            Some(seg) => self.allocate_segment(seg.capacity(), participant)?,
            None => self.allocate_segment(self.shared.config.segment_capacity, participant)?,
        };
        Ok(WriteHook::new(target, op, running))
    }

    /// Revoke the participant from every roster it appears in, joining
    /// any in-flight operation first, and reset its cursor.
    ///
    /// Once the reference count reaches zero nothing inside the buffer
    /// holds the participant; the handle is destroyed when the caller's
    /// own `Arc` goes away.
    pub fn release(&self, participant: &Arc<Participant>) -> BufferResult<()> {
        let id = participant.id();
        if id == UNASSIGNED_ID {
            return Err(BufferError::InvalidParticipant);
        }
        let _running = self.shared.ops_gate.read_recursive();
        let _op = participant.begin_op();
        {
            let list = self.shared.segments.read();
            for segment in list.iter() {
                segment.release(participant);
            }
        }
        *participant.cursor.lock() = ReadCursor::default();
        tracing::debug!(participant = id, "revoked participant from all rosters");
        Ok(())
    }

    /// Assign an id on first dispatcher interaction.
    fn ensure_assigned(&self, participant: &Participant) -> BufferResult<ParticipantId> {
        let existing = participant.id();
        if existing != UNASSIGNED_ID {
            return Ok(existing);
        }
        let id = self.shared.issue_id()?;
        if participant.assign_id(id) {
            tracing::debug!(id, name = ?participant.name(), "assigned participant id");
            Ok(id)
        } else {
            // A concurrent operation on the same handle won the race.
            Ok(participant.id())
        }
    }

    /// Allocate a segment claimed by `participant` and append it to the
    /// list. If the participant is WRITE-capable it becomes the segment's
    /// designated writer.
    fn allocate_segment(
        &self,
        capacity: usize,
        participant: &Arc<Participant>,
    ) -> BufferResult<Arc<Segment<T>>> {
        self.ensure_assigned(participant)?;
        let mut list = self.shared.segments.write();
        let seq = self.shared.next_seq();
        let segment = Arc::new(Segment::new(seq, capacity)?);
        if participant.access_level().can_write() {
            segment.set_designated_writer(participant.id());
        }
        segment.claim(participant)?;
        list.push(Arc::clone(&segment));
        self.shared
            .stats
            .segments_created
            .fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            seq,
            capacity,
            participant = participant.id(),
            "segment appended"
        );
        Ok(segment)
    }

    /// The participant's most recent segment for which it is the
    /// designated writer and which it still claims. Segments merely
    /// claimed for reading are never write targets, and a segment the
    /// participant was revoked from stays off limits: appending there
    /// would hand the item to a roster-empty segment the pruner may
    /// reclaim at any moment.
    fn writer_tail(&self, id: ParticipantId) -> Option<Arc<Segment<T>>> {
        let list = self.shared.segments.read();
        list.iter()
            .rev()
            .find(|seg| seg.designated_writer() == id && seg.roster_contains(id))
            .cloned()
    }

    /// One exclusive append under the segment's writer-entry gate.
    fn append(segment: &Arc<Segment<T>>, item: T) -> Result<(), T> {
        let _gate = segment.write_gate.lock();
        segment.begin_write();
        let result = unsafe { segment.push(item) };
        segment.end_write();
        result
    }

    /// Claim `segment` for the participant (if not already claimed) and
    /// point the cursor at its first slot.
    fn enter_segment(
        segment: &Arc<Segment<T>>,
        participant: &Arc<Participant>,
        cursor: &mut ReadCursor,
    ) -> BufferResult<()> {
        if !segment.roster_contains(participant.id()) {
            segment.claim(participant)?;
        }
        cursor.ordinal = if cursor.segment_seq.is_some() {
            cursor.ordinal + 1
        } else {
            0
        };
        cursor.segment_seq = Some(segment.seq());
        cursor.slot = 0;
        Ok(())
    }
}
