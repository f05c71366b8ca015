//! # framemux-protocol
//!
//! Wire codec for the framemux backend protocol.
//!
//! A request is an opaque byte sequence whose first byte is `'Q'`. A response
//! is a sequence of `'D'`-prefixed frames closed by a single `'Z'` byte:
//!
//! ```text
//! D<payload>D<payload>...Z
//! ```
//!
//! A frame runs from its `'D'` up to (not including) the next `'D'` or `'Z'`.
//! Nothing here performs I/O or keeps state; buffering lives with the caller.

pub mod codec;
pub mod error;
pub mod frame;

pub use codec::{extract_frame, is_valid_request};
pub use error::ProtocolError;
pub use frame::{is_terminator_frame, Frame};

/// First byte of every request.
pub const REQUEST_MARKER: u8 = b'Q';

/// First byte of every response data frame.
pub const FRAME_START: u8 = b'D';

/// The single byte that ends a response.
pub const TERMINATOR: u8 = b'Z';

/// Maximum bytes a frame may occupy (marker included) before its boundary is found.
pub const MAX_FRAME_LENGTH: usize = 5120;
