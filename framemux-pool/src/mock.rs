//! Scripted in-memory transport for unit tests.

use crate::connection::{Connection, Transport};
use crate::pool::ConnectionId;
use crate::stream::Disposer;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Outcome of one `send` on a scripted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStep {
    Ok,
    Fail,
    /// Never completes.
    Hang,
}

/// Hands every new connection the same scripted sequence of reads and sends.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub reads: Vec<Vec<u8>>,
    /// Per-connection send outcomes; sends past the end succeed.
    pub sends: Vec<SendStep>,
    pub fail_connect: bool,
    pub fail_reads: bool,
    pub connects: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedTransport {
    pub fn new(reads: &[&[u8]]) -> Self {
        Self {
            reads: reads.iter().map(|r| r.to_vec()).collect(),
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn connect(&self) -> io::Result<ScriptedConnection> {
        tokio::task::yield_now().await;
        if self.fail_connect {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "backend down"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let mut conn = ScriptedConnection::new(self.reads.clone());
        conn.sends = self.sends.iter().copied().collect();
        conn.fail_reads = self.fail_reads;
        conn.sent = self.sent.clone();
        Ok(conn)
    }
}

/// A connection that replays one scripted chunk per read, then reports
/// end-of-input.
#[derive(Debug, Default)]
pub struct ScriptedConnection {
    pub chunks: VecDeque<Vec<u8>>,
    pub sends: VecDeque<SendStep>,
    pub fail_reads: bool,
    pub reads: Arc<AtomicUsize>,
    pub sent: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl ScriptedConnection {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            ..Default::default()
        }
    }

    pub fn from_reads(chunks: &[&[u8]]) -> Self {
        Self::new(chunks.iter().map(|c| c.to_vec()).collect())
    }
}

impl Connection for ScriptedConnection {
    async fn send(&mut self, payload: &[u8]) -> io::Result<()> {
        match self.sends.pop_front().unwrap_or(SendStep::Ok) {
            SendStep::Ok => {}
            SendStep::Fail => {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "send failed"));
            }
            SendStep::Hang => std::future::pending::<()>().await,
        }
        self.sent.lock().push(payload.to_vec());
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        }
        let Some(mut chunk) = self.chunks.pop_front() else {
            return Ok(0);
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposed {
    Recycled(ConnectionId),
    Destroyed(ConnectionId),
}

/// Records every disposal a stream performs.
#[derive(Debug, Default)]
pub struct RecordingDisposer {
    pub events: Mutex<Vec<Disposed>>,
}

impl RecordingDisposer {
    pub fn events(&self) -> Vec<Disposed> {
        self.events.lock().clone()
    }
}

impl Disposer<ScriptedConnection> for RecordingDisposer {
    fn recycle(&self, id: ConnectionId, _conn: ScriptedConnection) {
        self.events.lock().push(Disposed::Recycled(id));
    }

    fn destroy(&self, id: ConnectionId, _conn: ScriptedConnection) {
        self.events.lock().push(Disposed::Destroyed(id));
    }
}
