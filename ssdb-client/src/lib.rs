//! # SSDB Sync Client
//!
//! Purpose: Provide a blocking client for the SSDB key-value server with a
//! bounded, thread-safe connection pool.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Reuse TCP connections and cap how many exist.
//! 2. **Layered Core**: `Pool` hands out `Connection`s, `Connection` drives the
//!    pure frame codec from `ssdb-common`, and `Client` only builds argument
//!    lists and interprets status blocks.
//! 3. **Discard on Failure**: A connection that saw an I/O or framing error is
//!    never reused.
//! 4. **Injected Observability**: Logging goes through `tracing`; per-frame
//!    tracing is a pool configuration flag, not a process-wide switch.
//!
//! ## Example
//!
//! ```no_run
//! use ssdb_client::{Client, ClientConfig};
//!
//! let mut config = ClientConfig::new("127.0.0.1", 8888);
//! config.pool_size = 4;
//! let client = Client::with_config(config)?;
//! client.set(b"gossdb", "value")?;
//! assert_eq!(client.get(b"gossdb")?.as_deref(), Some(&b"value"[..]));
//! # Ok::<(), ssdb_client::ClientError>(())
//! ```

mod client;
mod config;
mod connection;
mod error;
mod ordered_map;
mod pool;

pub use client::{Client, KeyTtl};
pub use config::ClientConfig;
pub use connection::{BrokenCause, Connection, ConnectionState, READ_CHUNK_SIZE};
pub use error::{ClientError, ClientResult};
pub use ordered_map::OrderedMap;
pub use pool::{Pool, PooledConnection};
pub use ssdb_common::{Request, Response, Status, Value};
