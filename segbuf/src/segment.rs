//! Fixed-capacity buffer segments.
//!
//! A [`Segment`] is the unit of allocation and pruning: a slab of
//! write-once slots, a write frontier published with release/acquire
//! ordering, and a roster of the participants currently claiming the
//! segment. At most one WRITE-capable roster member is the designated
//! writer; only it may advance the frontier, and only while holding the
//! segment's writer-entry gate. Readers never contend: slots below the
//! frontier are immutable once published.

use crate::error::{BufferError, BufferResult};
use crate::participant::{Participant, ParticipantId, UNASSIGNED_ID};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Write-once slot storage with an atomic publication frontier.
///
/// Slots `[0, frontier)` are initialized and immutable; the slot at
/// `frontier` is written by the designated writer and then published by
/// storing `frontier + 1` with release ordering. Readers load the
/// frontier with acquire ordering before touching any slot.
struct Slab<T> {
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
    frontier: AtomicUsize,
}

// Slots below the frontier are never written again, and the slot at the
// frontier is only touched by the single gate-holding writer.
unsafe impl<T: Send + Sync> Send for Slab<T> {}
unsafe impl<T: Send + Sync> Sync for Slab<T> {}

impl<T> Slab<T> {
    fn new(capacity: usize) -> BufferResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| BufferError::AllocationFailed { capacity })?;
        slots.extend((0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())));
        Ok(Self {
            slots: slots.into_boxed_slice(),
            frontier: AtomicUsize::new(0),
        })
    }

    /// Published slot count.
    fn len(&self) -> usize {
        self.frontier.load(Ordering::Acquire)
    }

    /// Append one item and publish it.
    ///
    /// Returns the item back if the slab is full.
    ///
    /// # Safety
    ///
    /// The caller must hold the owning segment's writer-entry gate; two
    /// concurrent calls race on the frontier slot.
    unsafe fn publish(&self, item: T) -> Result<(), T> {
        let w = self.frontier.load(Ordering::Relaxed);
        if w == self.slots.len() {
            return Err(item);
        }
        unsafe { (*self.slots[w].get()).write(item) };
        self.frontier.store(w + 1, Ordering::Release);
        Ok(())
    }
}

impl<T: Clone> Slab<T> {
    /// Copy out a published slot, or `None` at or beyond the frontier.
    fn get(&self, slot: usize) -> Option<T> {
        if slot >= self.len() {
            return None;
        }
        // The acquire load above sequences this read after the write that
        // published the slot, and published slots are never written again.
        Some(unsafe { (*self.slots[slot].get()).assume_init_ref().clone() })
    }
}

impl<T> Drop for Slab<T> {
    fn drop(&mut self) {
        let initialized = *self.frontier.get_mut();
        for cell in &mut self.slots[..initialized] {
            unsafe { cell.get_mut().assume_init_drop() };
        }
    }
}

/// A fixed-capacity slab of slots plus claim and liveness metadata.
pub struct Segment<T> {
    seq: u64,
    slab: Slab<T>,
    roster: Mutex<Vec<Arc<Participant>>>,
    writer_id: AtomicU64,
    in_write: AtomicBool,
    in_read: AtomicBool,
    pub(crate) write_gate: Arc<Mutex<()>>,
}

impl<T> Segment<T> {
    /// Allocate an empty segment with the given creation sequence number.
    pub(crate) fn new(seq: u64, capacity: usize) -> BufferResult<Self> {
        Ok(Self {
            seq,
            slab: Slab::new(capacity)?,
            roster: Mutex::new(Vec::new()),
            writer_id: AtomicU64::new(UNASSIGNED_ID),
            in_write: AtomicBool::new(false),
            in_read: AtomicBool::new(false),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    /// Creation sequence number; the segment list is totally ordered by it.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Slot capacity fixed at construction.
    pub fn capacity(&self) -> usize {
        self.slab.slots.len()
    }

    /// Write frontier: the number of published slots.
    pub fn len(&self) -> usize {
        self.slab.len()
    }

    /// Returns `true` if no slot has been published yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the write frontier has reached capacity.
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Returns `true` while a write or read is in flight on this segment.
    pub fn in_use(&self) -> bool {
        self.in_read.load(Ordering::Acquire) || self.in_write.load(Ordering::Acquire)
    }

    /// Returns `true` if the designated writer may still append here:
    /// no write in flight and spare capacity behind the frontier. Once
    /// full, the next segment is opened instead.
    pub fn writable(&self) -> bool {
        !self.in_write.load(Ordering::Acquire) && self.len() < self.capacity()
    }

    /// Number of participants currently claiming this segment.
    pub fn roster_len(&self) -> usize {
        self.roster.lock().len()
    }

    /// Returns `true` if the given participant claims this segment.
    pub fn roster_contains(&self, id: ParticipantId) -> bool {
        id != UNASSIGNED_ID && self.roster.lock().iter().any(|p| p.id() == id)
    }

    /// Id of the designated writer, or [`UNASSIGNED_ID`] if the segment
    /// was opened without one.
    pub fn designated_writer(&self) -> ParticipantId {
        self.writer_id.load(Ordering::Acquire)
    }

    /// Record the WRITE-capable participant present at creation. Roster
    /// members added later never gain write access to this segment.
    pub(crate) fn set_designated_writer(&self, id: ParticipantId) {
        self.writer_id.store(id, Ordering::Release);
    }

    /// Add a participant to the roster and take a reference on it.
    ///
    /// # Errors
    ///
    /// [`BufferError::InvalidParticipant`] if the participant has no id,
    /// [`BufferError::AlreadyClaimed`] if it is already in the roster.
    pub(crate) fn claim(&self, participant: &Arc<Participant>) -> BufferResult<()> {
        let id = participant.id();
        if id == UNASSIGNED_ID {
            return Err(BufferError::InvalidParticipant);
        }
        let mut roster = self.roster.lock();
        if roster.iter().any(|p| p.id() == id) {
            return Err(BufferError::AlreadyClaimed {
                participant: id,
                segment: self.seq,
            });
        }
        roster.push(Arc::clone(participant));
        participant.add_ref();
        Ok(())
    }

    /// Remove a participant from the roster and drop its reference.
    ///
    /// Returns `true` if the participant was present. A participant whose
    /// reference count reaches zero is no longer held anywhere in the
    /// buffer and is destroyed once the caller's own handle goes away.
    pub(crate) fn release(&self, participant: &Participant) -> bool {
        let id = participant.id();
        let mut roster = self.roster.lock();
        let before = roster.len();
        roster.retain(|p| p.id() != id);
        if roster.len() < before {
            participant.sub_ref();
            true
        } else {
            false
        }
    }

    /// Drop every roster entry. Used at dispatcher teardown.
    pub(crate) fn clear_roster(&self) {
        let mut roster = self.roster.lock();
        for participant in roster.drain(..) {
            participant.sub_ref();
        }
    }

    /// Append one item behind the frontier and publish it. Returns the
    /// item back if the segment is full.
    ///
    /// # Safety
    ///
    /// The caller must hold this segment's writer-entry gate.
    pub(crate) unsafe fn push(&self, item: T) -> Result<(), T> {
        unsafe { self.slab.publish(item) }
    }

    /// Mark a write in flight.
    pub(crate) fn begin_write(&self) {
        self.in_write.store(true, Ordering::Release);
    }

    /// Clear the write-in-flight mark.
    pub(crate) fn end_write(&self) {
        self.in_write.store(false, Ordering::Release);
    }

    /// Mark a read in flight. Advisory: the roster, not this flag, is
    /// what keeps the pruner away from a segment a reader still claims.
    pub(crate) fn begin_read(&self) {
        self.in_read.store(true, Ordering::Release);
    }

    /// Clear the read-in-flight mark.
    pub(crate) fn end_read(&self) {
        self.in_read.store(false, Ordering::Release);
    }
}

impl<T: Clone> Segment<T> {
    /// Copy out a published slot, or `None` at or beyond the frontier.
    pub(crate) fn get(&self, slot: usize) -> Option<T> {
        self.slab.get(slot)
    }
}

impl<T> std::fmt::Debug for Segment<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("seq", &self.seq)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("roster_len", &self.roster_len())
            .field("designated_writer", &self.designated_writer())
            .field("in_use", &self.in_use())
            .finish()
    }
}
