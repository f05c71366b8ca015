//! Request validation and response frame extraction.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::{FRAME_START, MAX_FRAME_LENGTH, REQUEST_MARKER, TERMINATOR};

/// Returns true iff the request starts with the `'Q'` marker.
///
/// An empty request is never valid.
pub fn is_valid_request(request: &[u8]) -> bool {
    request.first() == Some(&REQUEST_MARKER)
}

/// Extracts the frame at the front of `buf`.
///
/// Returns `Ok(Some(frame))` if a complete frame (or the terminator) is at the
/// front of the buffer, `Ok(None)` if more data is needed, or `Err` if the
/// buffer cannot hold a valid frame.
///
/// A data frame ends right before the first `'D'` or `'Z'` that follows its
/// own marker; that byte belongs to the next unit and is left in the buffer.
pub fn extract_frame(buf: &[u8]) -> Result<Option<Frame<'_>>, ProtocolError> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };

    if first == TERMINATOR {
        return Ok(Some(Frame::Terminator));
    }
    if first != FRAME_START {
        return Err(ProtocolError::InvalidMarker(first));
    }

    if let Some(i) = buf[1..]
        .iter()
        .position(|&b| b == FRAME_START || b == TERMINATOR)
    {
        return Ok(Some(Frame::Data(&buf[..i + 1])));
    }

    if buf.len() >= MAX_FRAME_LENGTH {
        return Err(ProtocolError::MaxFrameSizeExceeded {
            max: MAX_FRAME_LENGTH,
        });
    }

    Ok(None)
}
