//! # Dynamic Segmented Buffer
//!
//! An in-process, dynamically growing buffer for streaming data between
//! producer and consumer participants of unpredictable relative speed.
//! The buffer grows by appending fixed-capacity segments on demand and
//! shrinks again as a background pruner reclaims segments no live
//! participant still needs.
//!
//! ## Features
//!
//! - **Single-Writer Multi-Reader Segments**: each segment has one
//!   designated writer; any number of readers consume published slots
//!   without mutual exclusion
//! - **Per-Participant Cursors**: readers carry a private two-level
//!   position (segment, slot) spanning the whole segment chain
//! - **Capability Checks**: READ / WRITE / READ_WRITE access frozen at
//!   participant construction and enforced by the dispatcher
//! - **Reference-Counted Lifecycle**: segments track their claimants;
//!   participants track the rosters holding them
//! - **Background Pruning**: a supervised engine sweeps the list on a
//!   tunable interval and adapts its parallelism to the segment count
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   write    ┌─────────────────────────────┐
//! │ Participant  ├───────────►│         Dispatcher          │
//! │ (WRITE)      │            │                             │
//! └──────────────┘            │  [Seg 1][Seg 2]...[Seg n]   │
//! ┌──────────────┐    read    │     ▲               ▲       │
//! │ Participant  ├───────────►│     └── rosters ────┘       │
//! │ (READ)       │            └──────────────┬──────────────┘
//! └──────────────┘                           │ sweep
//!                                   ┌────────┴────────┐
//!                                   │  Pruner Engine  │
//!                                   └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use segbuf::{Dispatcher, Participant};
//!
//! # fn main() -> segbuf::BufferResult<()> {
//! let dispatcher = Dispatcher::new()?;
//! let (reader, writer) = Participant::make_pair("sink", "source");
//!
//! dispatcher.write(1u32, &writer)?;
//! dispatcher.write(2u32, &writer)?;
//!
//! assert_eq!(dispatcher.read(&reader)?, 1);
//! assert_eq!(dispatcher.read(&reader)?, 2);
//! assert!(!dispatcher.has_next(&reader)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Ordering Guarantees
//!
//! Writes by a single participant are observed by every reader in
//! submission order; a read returning a slot is sequenced after the write
//! that published it (release/acquire across the segment's frontier).
//! Different writers interleave at segment granularity only; no ordering
//! is defined between their streams.
//!
//! ## Thread Safety
//!
//! - **Dispatcher**: thread-safe; share it behind an `Arc` and call from
//!   any number of threads
//! - **Participant**: thread-safe handle, but at most one operation runs
//!   per participant at a time; a second call parks until the first ends
//! - **Pruner Engine**: internal; started by the dispatcher, stopped and
//!   joined on `shutdown`
//!
//! ## Error Handling
//!
//! All operations return [`BufferResult`] and surface failures to the
//! caller synchronously; nothing is retried or swallowed. The pruner
//! logs per-segment trouble and keeps sweeping.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod access;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hook;
pub mod participant;
mod pruner;
pub mod segment;

pub use access::AccessLevel;
pub use config::{
    BufferConfig, DEFAULT_MAX_PRUNE_WORKERS, DEFAULT_PRUNE_INTERVAL_MS, DEFAULT_PRUNE_REGION,
    DEFAULT_SEGMENT_CAPACITY,
};
pub use dispatcher::{BufferStats, Dispatcher};
pub use error::{BufferError, BufferResult};
pub use hook::WriteHook;
pub use participant::{Participant, ParticipantId, UNASSIGNED_ID};
pub use segment::Segment;

/// Initialize tracing with an environment-driven filter.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_thread_ids(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
