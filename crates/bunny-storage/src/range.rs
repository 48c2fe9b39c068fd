use crate::StorageError;
use std::fmt;
use std::ops::{Range, RangeInclusive};

/// Inclusive byte bounds for an HTTP range request.
///
/// Both `start` and `end` are part of the requested bytes, so `ByteRange::new(20, 1023)`
/// asks for 1004 bytes. Half-open Rust ranges are converted at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    start: u64,
    end: u64,
}

// A valid range always covers at least one byte.
#[allow(clippy::len_without_is_empty)]
impl ByteRange {
    pub fn new(start: u64, end: u64) -> Result<Self, StorageError> {
        if start > end {
            return Err(StorageError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of bytes covered, both ends included.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl TryFrom<RangeInclusive<u64>> for ByteRange {
    type Error = StorageError;

    fn try_from(r: RangeInclusive<u64>) -> Result<Self, Self::Error> {
        Self::new(*r.start(), *r.end())
    }
}

impl TryFrom<Range<u64>> for ByteRange {
    type Error = StorageError;

    fn try_from(r: Range<u64>) -> Result<Self, Self::Error> {
        if r.start >= r.end {
            return Err(StorageError::InvalidRange {
                start: r.start,
                end: r.end,
            });
        }
        Self::new(r.start, r.end - 1)
    }
}

impl From<ByteRange> for RangeInclusive<u64> {
    fn from(r: ByteRange) -> Self {
        r.start..=r.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inclusive_bounds_header() {
        let r = ByteRange::new(20, 1023).unwrap();
        assert_eq!(r.header_value(), "bytes=20-1023");
        assert_eq!(r.len(), 1004);
    }

    #[test]
    fn single_byte_range() {
        let r = ByteRange::try_from(5..=5).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(r.header_value(), "bytes=5-5");
    }

    #[test]
    fn half_open_converts_at_boundary() {
        let r = ByteRange::try_from(20..1024).unwrap();
        assert_eq!((r.start(), r.end()), (20, 1023));
        assert_eq!(RangeInclusive::from(r), 20..=1023);
    }

    #[test]
    fn reversed_range_rejected() {
        assert!(matches!(
            ByteRange::new(10, 9),
            Err(StorageError::InvalidRange { start: 10, end: 9 })
        ));
    }

    #[test]
    fn empty_half_open_rejected() {
        assert!(ByteRange::try_from(7..7).is_err());
    }
}
