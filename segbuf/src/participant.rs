//! Buffer participants and the reader/writer pair factory.
//!
//! A [`Participant`] is an addressable handle representing one user of the
//! buffer. It carries a frozen [`AccessLevel`], an id assigned lazily on
//! first dispatcher interaction, a reference count equal to the number of
//! segment rosters it appears in, and, for readers, a two-level cursor
//! (which segment, which slot within it).
//!
//! A handle moves through three phases: unassigned (id zero) until the
//! dispatcher issues an id, assigned while it takes part in operations,
//! and released once the last roster lets go of it. At most one operation
//! is in flight per participant at a time; a second operation waits on the
//! execution-slot latch until the first completes.

use crate::access::AccessLevel;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Process-unique participant identifier. Zero means unassigned.
pub type ParticipantId = u64;

/// Sentinel id of a participant that has not interacted with a dispatcher.
pub const UNASSIGNED_ID: ParticipantId = 0;

/// Reader position: which claimed segment, which slot within it.
///
/// The segment is named by its creation sequence number rather than by
/// reference, so participants never keep segments alive on their own and
/// the dispatcher remains the sole owner of the segment list.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ReadCursor {
    /// Sequence number of the segment currently being consumed.
    pub(crate) segment_seq: Option<u64>,
    /// Next slot to read within that segment.
    pub(crate) slot: usize,
    /// How many segments this reader has entered so far, minus one.
    pub(crate) ordinal: usize,
}

/// One user of the buffer: a capability-tagged, reference-counted handle.
pub struct Participant {
    id: AtomicU64,
    name: Option<String>,
    access: AccessLevel,
    partner: OnceLock<Weak<Participant>>,
    ref_count: AtomicUsize,
    pub(crate) cursor: Mutex<ReadCursor>,
    op_gate: Mutex<()>,
}

impl Participant {
    /// Construct a participant with the given capability and optional
    /// display name. The capability is frozen for the handle's lifetime;
    /// an id is assigned on first dispatcher interaction.
    pub fn make(name: Option<&str>, access: AccessLevel) -> Arc<Self> {
        Arc::new(Self {
            id: AtomicU64::new(UNASSIGNED_ID),
            name: name.map(str::to_owned),
            access,
            partner: OnceLock::new(),
            ref_count: AtomicUsize::new(0),
            cursor: Mutex::new(ReadCursor::default()),
            op_gate: Mutex::new(()),
        })
    }

    /// Construct two cross-linked participants representing the two ends
    /// of a pipe: a READ handle and a WRITE handle.
    ///
    /// Pairing is advisory metadata. The runtime does not couple the
    /// partners' progress; the links are weak and symmetric.
    pub fn make_pair(reader_name: &str, writer_name: &str) -> (Arc<Self>, Arc<Self>) {
        let reader = Self::make(Some(reader_name), AccessLevel::READ);
        let writer = Self::make(Some(writer_name), AccessLevel::WRITE);
        let _ = reader.partner.set(Arc::downgrade(&writer));
        let _ = writer.partner.set(Arc::downgrade(&reader));
        (reader, writer)
    }

    /// The participant's id, or [`UNASSIGNED_ID`] before first use.
    pub fn id(&self) -> ParticipantId {
        self.id.load(Ordering::Acquire)
    }

    /// The capability this participant was constructed with.
    pub fn access_level(&self) -> AccessLevel {
        self.access
    }

    /// Number of segment rosters currently holding this participant.
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// The display name, if one was given.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The paired partner, if this handle was created through
    /// [`Participant::make_pair`] and the partner is still alive.
    pub fn partner(&self) -> Option<Arc<Participant>> {
        self.partner.get().and_then(Weak::upgrade)
    }

    /// Returns `true` if this handle was created as one end of a pair.
    pub fn is_paired(&self) -> bool {
        self.partner.get().is_some()
    }

    /// The reader's two-level position as `(segment ordinal, slot)`, where
    /// the ordinal counts the segments this reader has entered. `None`
    /// before the first read.
    pub fn cursor_position(&self) -> Option<(usize, usize)> {
        let cursor = self.cursor.lock();
        cursor.segment_seq.map(|_| (cursor.ordinal, cursor.slot))
    }

    /// Identity comparison by id. Unassigned handles are never the same.
    pub fn same(a: &Participant, b: &Participant) -> bool {
        let (ia, ib) = (a.id(), b.id());
        ia != UNASSIGNED_ID && ia == ib
    }

    /// Store an issued id. Returns `false` if the handle already has one
    /// (a concurrent operation won the assignment race).
    pub(crate) fn assign_id(&self, id: ParticipantId) -> bool {
        self.id
            .compare_exchange(UNASSIGNED_ID, id, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter the execution slot. At most one operation runs per
    /// participant; a concurrent second operation parks here until the
    /// first completes.
    pub(crate) fn begin_op(&self) -> MutexGuard<'_, ()> {
        self.op_gate.lock()
    }

    /// Roster bookkeeping. Called only under the owning segment's roster
    /// latch.
    pub(crate) fn add_ref(&self) -> usize {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Roster bookkeeping. Called only under the owning segment's roster
    /// latch. Returns the remaining count.
    pub(crate) fn sub_ref(&self) -> usize {
        self.ref_count.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("id", &self.id())
            .field("name", &self.name)
            .field("access", &self.access)
            .field("ref_count", &self.ref_count())
            .field("paired", &self.is_paired())
            .finish()
    }
}
