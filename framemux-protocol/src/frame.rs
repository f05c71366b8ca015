//! Response frames.
//!
//! Frame layout on the wire:
//!
//! ```text
//! +-----+------------------------------+
//! | 'D' | payload (no 'D' or 'Z' byte) |   data frame
//! +-----+------------------------------+
//! | 'Z' |                                  terminator frame
//! +-----+
//! ```

use crate::TERMINATOR;

/// One unit extracted from a response buffer.
///
/// A `Data` frame borrows the buffer it was extracted from and keeps its
/// leading `'D'` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A `'D'`-prefixed data frame.
    Data(&'a [u8]),
    /// The single-byte `'Z'` terminator.
    Terminator,
}

impl<'a> Frame<'a> {
    /// Returns the raw bytes of the frame, marker included.
    pub fn as_bytes(&self) -> &'a [u8] {
        match self {
            Frame::Data(bytes) => bytes,
            Frame::Terminator => &[TERMINATOR],
        }
    }

    /// Number of bytes the frame occupies in the buffer.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Frame::Terminator)
    }
}

/// Returns true iff `frame` is exactly the 1-byte terminator.
pub fn is_terminator_frame(frame: &[u8]) -> bool {
    frame.len() == 1 && frame[0] == TERMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminator_frame() {
        assert!(is_terminator_frame(b"Z"));
        assert!(!is_terminator_frame(b"ZZ"));
        assert!(!is_terminator_frame(b"DZ"));
        assert!(!is_terminator_frame(b""));
    }

    #[test]
    fn test_frame_bytes() {
        let data = Frame::Data(b"Dabc");
        assert_eq!(data.as_bytes(), b"Dabc");
        assert_eq!(data.len(), 4);
        assert!(!data.is_terminator());

        let end = Frame::Terminator;
        assert_eq!(end.as_bytes(), b"Z");
        assert_eq!(end.len(), 1);
        assert!(end.is_terminator());
        assert!(is_terminator_frame(end.as_bytes()));
    }
}
