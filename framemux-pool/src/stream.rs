//! Streaming response reader.
//!
//! A [`ResponseStream`] owns one backend connection for the lifetime of one
//! response. It pulls raw bytes from the connection into a fixed-size buffer,
//! cuts frames out of that buffer with [`extract_frame`], and hands the
//! connection back at its first terminal event:
//!
//! - terminator seen, or [`ResponseStream::close`] drained up to it: recycled
//! - protocol error, read error or premature end-of-input: destroyed
//! - dropped while still open: destroyed
//!
//! The buffer is returned to the [`BufferPool`] at that same point.

use crate::buffer::BufferPool;
use crate::connection::Connection;
use crate::error::PoolError;
use crate::pool::ConnectionId;
use bytes::BytesMut;
use framemux_protocol::{extract_frame, Frame, TERMINATOR};
use std::sync::{Arc, Weak};

/// Receives connections back from finished response streams.
pub trait Disposer<C>: Send + Sync {
    /// The response ended cleanly; `conn` may serve another request.
    fn recycle(&self, id: ConnectionId, conn: C);

    /// `conn` is unusable and must not be handed out again.
    fn destroy(&self, id: ConnectionId, conn: C);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposal {
    Recycle,
    Destroy,
}

/// What the buffered bytes hold right now.
enum Buffered {
    Frame(usize),
    End,
    NeedMore,
}

/// Cursor over the frames of one response.
///
/// Not safe for concurrent use; `read` and `close` take `&mut self`.
pub struct ResponseStream<C: Connection> {
    id: ConnectionId,
    /// `None` once the stream is closed.
    conn: Option<C>,
    buf: Option<BytesMut>,
    /// Bytes of `buf` holding response data.
    filled: usize,
    /// Length of the frame last returned, discarded on the next read.
    carry: usize,
    disposer: Weak<dyn Disposer<C>>,
    buffers: Arc<BufferPool>,
}

impl<C: Connection> ResponseStream<C> {
    /// Binds a stream to a connection whose request has already been sent.
    pub fn new(
        id: ConnectionId,
        conn: C,
        disposer: Weak<dyn Disposer<C>>,
        buffers: Arc<BufferPool>,
    ) -> Self {
        let buf = buffers.acquire();
        Self {
            id,
            conn: Some(conn),
            buf: Some(buf),
            filled: 0,
            carry: 0,
            disposer,
            buffers,
        }
    }

    /// Identifier of the pooled connection this stream reads from.
    pub fn connection_id(&self) -> ConnectionId {
        self.id
    }

    /// Returns whether the stream reached a terminal state.
    ///
    /// A stream closes itself after the terminator or any error.
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Reads the next frame.
    ///
    /// Returns `Ok(Some(frame))` with the frame bytes, `'D'` marker included,
    /// or `Ok(None)` once the terminator has been seen. The frame borrows the
    /// stream's buffer and is only valid until the next call.
    ///
    /// Errors close the stream; every later call returns `Ok(None)`.
    pub async fn read(&mut self) -> Result<Option<&[u8]>, PoolError> {
        if self.is_closed() {
            return Ok(None);
        }

        loop {
            self.discard_carry();

            match self.scan() {
                Ok(Buffered::Frame(len)) => {
                    self.carry = len;
                    break;
                }
                Ok(Buffered::End) => {
                    tracing::debug!("Response on connection {} complete", self.id);
                    self.dispose(Disposal::Recycle);
                    return Ok(None);
                }
                Ok(Buffered::NeedMore) => {}
                Err(e) => {
                    tracing::warn!("Protocol error on connection {}: {}", self.id, e);
                    self.dispose(Disposal::Destroy);
                    return Err(e);
                }
            }

            let result = match (self.conn.as_mut(), self.buf.as_mut()) {
                (Some(conn), Some(buf)) => conn.read(&mut buf[self.filled..]).await,
                _ => return Ok(None),
            };

            match result {
                Ok(0) => {
                    let buffered = self.filled;
                    tracing::warn!(
                        "Connection {} closed mid-response ({} bytes buffered)",
                        self.id,
                        buffered
                    );
                    self.dispose(Disposal::Destroy);
                    return Err(PoolError::IncompleteResponse { buffered });
                }
                Ok(n) => self.filled += n,
                Err(e) => {
                    tracing::warn!("Read error on connection {}: {}", self.id, e);
                    self.dispose(Disposal::Destroy);
                    return Err(PoolError::Io(e));
                }
            }
        }

        Ok(self.buf.as_deref().map(|buf| &buf[..self.carry]))
    }

    /// Abandons the response.
    ///
    /// Unread response bytes are drained from the connection up to the
    /// terminator so the connection can be recycled. A closed stream is left
    /// alone.
    ///
    /// There is no bound on the drain: a backend that never sends the
    /// terminator blocks this call until the connection fails.
    pub async fn close(&mut self) -> Result<(), PoolError> {
        if self.is_closed() {
            return Ok(());
        }

        if self.terminator_buffered() {
            tracing::debug!("Response on connection {} already terminated", self.id);
            self.dispose(Disposal::Recycle);
            return Ok(());
        }

        tracing::debug!("Draining connection {}", self.id);
        loop {
            let result = match (self.conn.as_mut(), self.buf.as_mut()) {
                (Some(conn), Some(buf)) => conn
                    .read(&mut buf[..])
                    .await
                    .map(|n| (n, n > 0 && buf[n - 1] == TERMINATOR)),
                _ => return Ok(()),
            };

            match result {
                Ok((0, _)) => {
                    tracing::warn!("Connection {} closed while draining", self.id);
                    self.dispose(Disposal::Destroy);
                    return Err(PoolError::IncompleteResponse { buffered: 0 });
                }
                Ok((_, true)) => {
                    self.dispose(Disposal::Recycle);
                    return Ok(());
                }
                Ok((_, false)) => {}
                Err(e) => {
                    tracing::warn!("Read error draining connection {}: {}", self.id, e);
                    self.dispose(Disposal::Destroy);
                    return Err(PoolError::Io(e));
                }
            }
        }
    }

    fn discard_carry(&mut self) {
        if self.carry == 0 {
            return;
        }
        if let Some(buf) = self.buf.as_mut() {
            buf.copy_within(self.carry..self.filled, 0);
        }
        self.filled -= self.carry;
        self.carry = 0;
    }

    fn scan(&self) -> Result<Buffered, PoolError> {
        let Some(buf) = self.buf.as_ref() else {
            return Ok(Buffered::NeedMore);
        };
        Ok(match extract_frame(&buf[..self.filled])? {
            Some(Frame::Terminator) => Buffered::End,
            Some(Frame::Data(bytes)) => Buffered::Frame(bytes.len()),
            None => Buffered::NeedMore,
        })
    }

    /// Any `'Z'` past the returned frame ends the response, since frame
    /// payloads never contain one.
    fn terminator_buffered(&self) -> bool {
        self.buf
            .as_ref()
            .is_some_and(|buf| buf[self.carry..self.filled].contains(&TERMINATOR))
    }

    fn dispose(&mut self, disposal: Disposal) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if let Some(buf) = self.buf.take() {
            self.buffers.release(buf);
        }
        self.filled = 0;
        self.carry = 0;

        match self.disposer.upgrade() {
            Some(disposer) => match disposal {
                Disposal::Recycle => disposer.recycle(self.id, conn),
                Disposal::Destroy => disposer.destroy(self.id, conn),
            },
            None => tracing::debug!("Pool gone, dropping connection {}", self.id),
        }
    }
}

impl<C: Connection> Drop for ResponseStream<C> {
    fn drop(&mut self) {
        if !self.is_closed() {
            tracing::warn!(
                "Response stream on connection {} dropped while open, discarding connection",
                self.id
            );
            self.dispose(Disposal::Destroy);
        }
    }
}

impl<C: Connection> std::fmt::Debug for ResponseStream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseStream")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("filled", &self.filled)
            .field("carry", &self.carry)
            .finish()
    }
}
