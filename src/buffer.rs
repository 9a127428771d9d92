//! Buffer tokens passed between elements.
//!
//! The state protocol only needs to know *that* data arrived, so a buffer
//! here carries no payload: a sequence number, a timestamp and an
//! end-of-stream marker.

use crate::clock::ClockTime;

/// Flags attached to a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u8);

impl BufferFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Last buffer of the stream.
    pub const LAST: Self = Self(1 << 0);
    /// First buffer after a discontinuity.
    pub const DISCONT: Self = Self(1 << 1);

    /// Whether every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// A unit of data flowing from a source's streaming thread downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buffer {
    sequence: u64,
    pts: ClockTime,
    flags: BufferFlags,
}

impl Buffer {
    /// Create a buffer.
    pub fn new(sequence: u64, pts: ClockTime) -> Self {
        Self {
            sequence,
            pts,
            flags: BufferFlags::NONE,
        }
    }

    /// Add flags.
    pub fn with_flags(mut self, flags: BufferFlags) -> Self {
        self.flags = self.flags.union(flags);
        self
    }

    /// Sequence number assigned by the producer.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Presentation timestamp in running time.
    #[inline]
    pub fn pts(&self) -> ClockTime {
        self.pts
    }

    /// Buffer flags.
    #[inline]
    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    /// Whether this is the last buffer of the stream.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.flags.contains(BufferFlags::LAST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_flags() {
        let buf = Buffer::new(7, ClockTime::from_millis(40));
        assert!(!buf.is_last());
        assert_eq!(buf.sequence(), 7);

        let buf = buf.with_flags(BufferFlags::LAST.union(BufferFlags::DISCONT));
        assert!(buf.is_last());
        assert!(buf.flags().contains(BufferFlags::DISCONT));
    }
}
