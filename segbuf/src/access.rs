//! Access capabilities for buffer participants.

use bitflags::bitflags;

bitflags! {
    /// Capability set granted to a participant at construction.
    ///
    /// The capability is frozen for the participant's lifetime; the
    /// dispatcher rejects operations the capability does not cover.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessLevel: u8 {
        /// Permission to consume items from the buffer.
        const READ  = 0b01;
        /// Permission to append items to the buffer.
        const WRITE = 0b10;
        /// Full access, both consuming and appending.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl AccessLevel {
    /// No access at all. Such a participant can only be inspected.
    pub const NONE: AccessLevel = AccessLevel::empty();

    /// Returns `true` if the capability covers read operations.
    #[inline]
    pub const fn can_read(self) -> bool {
        self.contains(AccessLevel::READ)
    }

    /// Returns `true` if the capability covers write operations.
    #[inline]
    pub const fn can_write(self) -> bool {
        self.contains(AccessLevel::WRITE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_implies_both() {
        assert!(AccessLevel::READ_WRITE.can_read());
        assert!(AccessLevel::READ_WRITE.can_write());
    }

    #[test]
    fn single_capabilities_are_exclusive() {
        assert!(AccessLevel::READ.can_read());
        assert!(!AccessLevel::READ.can_write());
        assert!(AccessLevel::WRITE.can_write());
        assert!(!AccessLevel::WRITE.can_read());
    }

    #[test]
    fn none_grants_nothing() {
        assert!(!AccessLevel::NONE.can_read());
        assert!(!AccessLevel::NONE.can_write());
        assert_eq!(AccessLevel::NONE, AccessLevel::empty());
    }
}
