//! Error types for buffer operations

use crate::access::AccessLevel;
use thiserror::Error;

/// Errors that can occur during buffer operations
#[derive(Error, Debug)]
pub enum BufferError {
    /// Participant has no assigned id (id zero)
    #[error("Participant is unassigned and cannot take part in buffer operations")]
    InvalidParticipant,

    /// Operation not covered by the participant's capability
    #[error("Insufficient capability: operation requires {required:?}, participant holds {held:?}")]
    InsufficientCapability {
        /// Capability the operation requires
        required: AccessLevel,
        /// Capability the participant holds
        held: AccessLevel,
    },

    /// Participant already present in the segment's roster
    #[error("Participant {participant} already claims segment {segment}")]
    AlreadyClaimed {
        /// Participant id
        participant: u64,
        /// Segment sequence number
        segment: u64,
    },

    /// Operation requires at least one claimed segment and there is none
    #[error("Participant {participant} has no associated segment")]
    NoAssociatedSegment {
        /// Participant id
        participant: u64,
    },

    /// Reader has consumed everything currently visible
    #[error("End of stream - no further items are visible to this reader")]
    EndOfStream,

    /// Participant id space exhausted
    #[error("Participant id space exhausted")]
    CapacityExhausted,

    /// Segment slab allocation failed
    #[error("Failed to allocate a segment slab of {capacity} slots")]
    AllocationFailed {
        /// Requested slot count
        capacity: usize,
    },

    /// Configuration validation failed
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Why validation rejected the configuration
        reason: String,
    },
}

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;
