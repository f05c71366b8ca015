//! # framemux-pool
//!
//! Bounded backend connection pool for framemux.
//!
//! This crate provides:
//! - A connection pool that reuses free backend connections and rejects
//!   requests once `max_connections` are busy
//! - Response streams that cut `'D'`/`'Z'` frames out of the backend byte
//!   stream and hand their connection back when the response ends
//! - A shared pool of reusable frame buffers
//! - The transport traits plus a TCP implementation
//! - YAML/environment configuration

pub mod buffer;
pub mod config;
pub mod connection;
pub mod error;
pub mod pool;
pub mod stream;

#[cfg(test)]
mod mock;

pub use buffer::BufferPool;
pub use config::{BackendConfig, Config, ConfigError, PoolConfig};
pub use connection::{Connection, TcpConfig, TcpConnection, TcpTransport, Transport};
pub use error::PoolError;
pub use pool::{ConnectionId, ConnectionPool};
pub use stream::{Disposer, ResponseStream};
