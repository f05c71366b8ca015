//! Bounded backend connection pool.
//!
//! Connections live in an arena of slots addressed by [`ConnectionId`]. A
//! slot is vacant, idle (holding a free connection) or busy (its connection
//! has been moved into a [`ResponseStream`]). The stream gives the connection
//! back through the [`Disposer`] capability when the response ends.
//!
//! ```text
//!            request()                     read() -> terminator
//!   Vacant ------------> Busy ----------------------------------> Idle
//!     ^     (connect)     |  ^                                     |
//!     |                   |  +------------- request() -------------+
//!     +---- destroy ------+
//! ```

use crate::buffer::BufferPool;
use crate::connection::{Connection, Transport};
use crate::error::PoolError;
use crate::stream::{Disposer, ResponseStream};
use framemux_protocol::is_valid_request;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};

/// Stable handle to one pooled connection.
///
/// The generation changes whenever a slot is vacated, so a handle held by a
/// finished stream can never address a newer connection in the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    index: u32,
    generation: u32,
}

impl ConnectionId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

enum SlotState<C> {
    Vacant,
    Idle(C),
    Busy,
}

struct Slot<C> {
    generation: u32,
    state: SlotState<C>,
}

/// Connection arena. Invariant: `busy <= live <= slots.len()`.
struct Slots<C> {
    slots: Vec<Slot<C>>,
    live: usize,
    busy: usize,
}

impl<C> Slots<C> {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            busy: 0,
        }
    }

    /// Moves any idle connection out of its slot and marks the slot busy.
    fn take_idle(&mut self) -> Option<(ConnectionId, C)> {
        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| matches!(slot.state, SlotState::Idle(_)))?;

        match std::mem::replace(&mut slot.state, SlotState::Busy) {
            SlotState::Idle(conn) => {
                self.busy += 1;
                Some((ConnectionId::new(index as u32, slot.generation), conn))
            }
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Registers a freshly created connection as busy.
    fn insert_busy(&mut self) -> ConnectionId {
        self.live += 1;
        self.busy += 1;

        if let Some((index, slot)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| matches!(slot.state, SlotState::Vacant))
        {
            slot.state = SlotState::Busy;
            return ConnectionId::new(index as u32, slot.generation);
        }

        self.slots.push(Slot {
            generation: 0,
            state: SlotState::Busy,
        });
        ConnectionId::new((self.slots.len() - 1) as u32, 0)
    }

    fn get_mut(&mut self, id: ConnectionId) -> Option<&mut Slot<C>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }

    /// Busy -> Idle. Returns false (dropping `conn`) if `id` is not busy.
    fn release(&mut self, id: ConnectionId, conn: C) -> bool {
        match self.get_mut(id) {
            Some(slot) if matches!(slot.state, SlotState::Busy) => {
                slot.state = SlotState::Idle(conn);
                self.busy -= 1;
                true
            }
            _ => false,
        }
    }

    /// Busy or Idle -> Vacant. Returns false if `id` is not live.
    fn remove(&mut self, id: ConnectionId) -> bool {
        let Some(slot) = self.get_mut(id) else {
            return false;
        };
        let was_busy = match slot.state {
            SlotState::Vacant => return false,
            SlotState::Idle(_) => false,
            SlotState::Busy => true,
        };
        slot.state = SlotState::Vacant;
        slot.generation = slot.generation.wrapping_add(1);

        self.live -= 1;
        if was_busy {
            self.busy -= 1;
        }
        true
    }
}

/// Vacates a busy slot unless disarmed, so a `request` cancelled mid-send
/// cannot leave a slot busy with no stream owning it.
struct SlotGuard<'a, C> {
    slots: &'a Mutex<Slots<C>>,
    id: ConnectionId,
    armed: bool,
}

impl<'a, C> SlotGuard<'a, C> {
    fn new(slots: &'a Mutex<Slots<C>>, id: ConnectionId) -> Self {
        Self {
            slots,
            id,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<C> Drop for SlotGuard<'_, C> {
    fn drop(&mut self) {
        if self.armed && self.slots.lock().remove(self.id) {
            tracing::debug!("Connection {} discarded before its response started", self.id);
        }
    }
}

struct Shared<T: Transport> {
    transport: T,
    max_connections: usize,
    buffers: Arc<BufferPool>,
    /// Serializes the acquire/create/send section of `request`.
    acquire: tokio::sync::Mutex<()>,
    slots: Mutex<Slots<T::Connection>>,
}

impl<T: Transport> Disposer<T::Connection> for Shared<T> {
    fn recycle(&self, id: ConnectionId, conn: T::Connection) {
        if self.slots.lock().release(id, conn) {
            tracing::debug!("Connection {} recycled", id);
        } else {
            tracing::debug!("Connection {} not busy, recycle ignored", id);
        }
    }

    fn destroy(&self, id: ConnectionId, conn: T::Connection) {
        drop(conn);
        if self.slots.lock().remove(id) {
            tracing::debug!("Connection {} destroyed", id);
        }
    }
}

/// A bounded pool of backend connections.
///
/// Each [`request`](ConnectionPool::request) binds one free connection (or a
/// new one, while fewer than `max_connections` exist) to the returned
/// [`ResponseStream`]. Requests never wait for a connection to free up.
///
/// Cloning the pool is cheap and yields a handle to the same pool.
pub struct ConnectionPool<T: Transport> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Transport> ConnectionPool<T> {
    /// Creates a pool with its own buffer pool sized to `max_connections`.
    pub fn new(transport: T, max_connections: usize) -> Self {
        let buffers = Arc::new(BufferPool::new(max_connections));
        Self::with_buffer_pool(transport, max_connections, buffers)
    }

    /// Creates a pool that draws response buffers from `buffers`.
    pub fn with_buffer_pool(transport: T, max_connections: usize, buffers: Arc<BufferPool>) -> Self {
        Self {
            shared: Arc::new(Shared {
                transport,
                max_connections,
                buffers,
                acquire: tokio::sync::Mutex::new(()),
                slots: Mutex::new(Slots::new()),
            }),
        }
    }

    /// Sends `query` on a pooled connection and returns a stream over its response.
    ///
    /// Reuses any free connection, otherwise opens a new one if the pool is
    /// below capacity. Fails with [`PoolError::ClientCountExceeded`] when
    /// every connection is busy.
    pub async fn request(&self, query: &[u8]) -> Result<ResponseStream<T::Connection>, PoolError> {
        if !is_valid_request(query) {
            return Err(PoolError::BadRequest);
        }

        let _guard = self.shared.acquire.lock().await;

        let idle = {
            let mut slots = self.shared.slots.lock();
            match slots.take_idle() {
                Some(found) => Some(found),
                None if slots.live >= self.shared.max_connections => {
                    tracing::warn!(
                        "Connection limit reached ({}), rejecting request",
                        self.shared.max_connections
                    );
                    return Err(PoolError::ClientCountExceeded {
                        max: self.shared.max_connections,
                    });
                }
                None => None,
            }
        };

        let (id, mut conn) = match idle {
            Some((id, conn)) => {
                tracing::debug!("Reusing connection {}", id);
                (id, conn)
            }
            None => {
                let conn = self
                    .shared
                    .transport
                    .connect()
                    .await
                    .map_err(PoolError::Connect)?;
                let id = self.shared.slots.lock().insert_busy();
                tracing::debug!("Opened connection {}", id);
                (id, conn)
            }
        };

        let slot = SlotGuard::new(&self.shared.slots, id);
        if let Err(e) = conn.send(query).await {
            tracing::warn!("Send failed on connection {}, discarding: {}", id, e);
            drop(conn);
            return Err(PoolError::BadConnection(e));
        }
        slot.disarm();

        Ok(ResponseStream::new(
            id,
            conn,
            self.disposer(),
            self.shared.buffers.clone(),
        ))
    }

    /// Configured capacity.
    pub fn max_connections(&self) -> usize {
        self.shared.max_connections
    }

    /// Number of live connections, busy or idle.
    pub fn live_count(&self) -> usize {
        self.shared.slots.lock().live
    }

    /// Number of connections bound to an open response stream.
    pub fn busy_count(&self) -> usize {
        self.shared.slots.lock().busy
    }

    /// Number of live connections free for reuse.
    pub fn idle_count(&self) -> usize {
        let slots = self.shared.slots.lock();
        slots.live - slots.busy
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.shared.buffers
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    fn disposer(&self) -> Weak<dyn Disposer<T::Connection>> {
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        weak
    }
}

impl<T: Transport> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.shared.slots.lock();
        f.debug_struct("ConnectionPool")
            .field("max_connections", &self.shared.max_connections)
            .field("live", &slots.live)
            .field("busy", &slots.busy)
            .finish()
    }
}
