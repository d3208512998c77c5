//! # Connection Pool
//!
//! Purpose: Share a bounded set of server connections between threads,
//! dialing lazily and blocking callers when every connection is checked out.
//!
//! ## Design Principles
//! 1. **Object Pool Pattern**: Keep at most `pool_size` connections, idle or
//!    checked out, and hand idle ones back out before dialing.
//! 2. **Atomic Reservation**: Capacity is claimed with a single
//!    compare-and-swap before dialing, so concurrent growth can never exceed
//!    the configured size.
//! 3. **Minimal Locking**: The mutex guards only the idle queue and the
//!    open flag; dialing and authentication happen outside it.
//! 4. **Self-Healing**: Broken connections, and connections released with a
//!    response still unread, are closed on release and their slot is freed
//!    for a fresh dial.
//!
//! ## Notes
//! - `PooledConnection` releases itself on drop; `Pool::release` is the
//!   explicit spelling of the same thing.
//! - After a failed dial the caller waits for a release or a freed slot. If
//!   the pool holds no connections at all, the dial error is returned instead
//!   of waiting on a release that can never happen.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::{ClientError, ClientResult};

struct PoolState {
    idle: VecDeque<Connection>,
    open: bool,
    // Bumped whenever a slot is given back, so waiters know to retry a dial.
    freed_slots: u64,
}

struct PoolInner {
    config: ClientConfig,
    size: usize,
    active: AtomicUsize,
    state: Mutex<PoolState>,
    available: Condvar,
}

/// Connection pool handle. Cloning shares the same pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Opens a pool for the configured server. No connection is dialed yet.
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        let size = if config.pool_size < 1 {
            warn!(requested = config.pool_size, "pool size below 1, clamping to 1");
            1
        } else {
            config.pool_size
        };

        debug!(addr = %config.server_address(), size, "opened connection pool");
        Ok(Pool {
            inner: Arc::new(PoolInner {
                config,
                size,
                active: AtomicUsize::new(0),
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(size),
                    open: true,
                    freed_slots: 0,
                }),
                available: Condvar::new(),
            }),
        })
    }

    /// Returns a connection, blocking while the pool is exhausted.
    ///
    /// Fails with `PoolClosed` if the pool is or becomes closed. When a dial
    /// fails the caller waits for a release or a freed slot, except when the
    /// pool holds no connections at all: then nothing can ever be released,
    /// so the dial error is returned instead of blocking forever.
    pub fn acquire(&self) -> ClientResult<PooledConnection> {
        self.acquire_until(None)
    }

    /// Like [`Pool::acquire`], but gives up with `AcquireTimeout` after `timeout`.
    pub fn acquire_timeout(&self, timeout: Duration) -> ClientResult<PooledConnection> {
        self.acquire_until(Some(Instant::now() + timeout))
    }

    /// Returns an idle or freshly dialed connection without waiting.
    ///
    /// `Ok(None)` means the pool is at capacity with nothing idle.
    pub fn try_acquire(&self) -> ClientResult<Option<PooledConnection>> {
        {
            let mut state = self.inner.lock_state();
            if !state.open {
                return Err(ClientError::PoolClosed);
            }
            if let Some(conn) = state.idle.pop_front() {
                return Ok(Some(self.checkout(conn)));
            }
        }

        if !self.inner.try_reserve() {
            return Ok(None);
        }
        match self.inner.dial() {
            Ok(conn) => Ok(Some(self.checkout(self.inner.admit(conn)?))),
            Err(err) => {
                self.inner.release_slot();
                Err(err)
            }
        }
    }

    /// Hands a connection back; equivalent to dropping it.
    pub fn release(&self, conn: PooledConnection) {
        drop(conn);
    }

    /// Closes the pool and every idle connection. Idempotent.
    ///
    /// Checked-out connections are closed when their holders release them,
    /// and blocked `acquire` calls wake with `PoolClosed`.
    pub fn close(&self) {
        let drained: Vec<Connection> = {
            let mut state = self.inner.lock_state();
            if !state.open {
                return;
            }
            state.open = false;
            state.idle.drain(..).collect()
        };
        self.inner.available.notify_all();

        debug!(idle = drained.len(), "closing connection pool");
        for mut conn in drained {
            conn.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.inner.lock_state().open
    }

    /// Maximum number of connections.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Connections dialed and not yet retired. Informational only.
    pub fn active_connections(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Connections currently waiting in the idle queue.
    pub fn idle_connections(&self) -> usize {
        self.inner.lock_state().idle.len()
    }

    pub fn server_address(&self) -> String {
        self.inner.config.server_address()
    }

    fn checkout(&self, conn: Connection) -> PooledConnection {
        PooledConnection {
            pool: self.inner.clone(),
            conn: Some(conn),
        }
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> ClientResult<PooledConnection> {
        let mut dial_failed = false;

        loop {
            {
                let mut state = self.inner.lock_state();
                loop {
                    if !state.open {
                        return Err(ClientError::PoolClosed);
                    }
                    if let Some(conn) = state.idle.pop_front() {
                        return Ok(self.checkout(conn));
                    }
                    if !dial_failed && self.inner.has_room() {
                        break;
                    }

                    let seen = state.freed_slots;
                    state = self.inner.wait(state, deadline)?;
                    if state.freed_slots != seen {
                        dial_failed = false;
                    }
                }
            }

            if !self.inner.try_reserve() {
                // Another caller took the last slot first.
                continue;
            }

            match self.inner.dial() {
                Ok(conn) => return Ok(self.checkout(self.inner.admit(conn)?)),
                Err(err) => {
                    self.inner.release_slot();
                    warn!(addr = %self.inner.config.server_address(), error = %err, "failed to open pooled connection");
                    if self.inner.active.load(Ordering::Acquire) == 0 {
                        return Err(err);
                    }
                    dial_failed = true;
                }
            }
        }
    }
}

impl PoolInner {
    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().expect("pool mutex poisoned")
    }

    fn has_room(&self) -> bool {
        self.active.load(Ordering::Acquire) < self.size
    }

    /// Claims one slot if the pool is below capacity.
    fn try_reserve(&self) -> bool {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < self.size).then_some(active + 1)
            })
            .is_ok()
    }

    /// Gives a slot back and wakes one waiter so it can dial.
    fn release_slot(&self) {
        let mut state = self.lock_state();
        self.active.fetch_sub(1, Ordering::AcqRel);
        state.freed_slots = state.freed_slots.wrapping_add(1);
        drop(state);
        self.available.notify_one();
    }

    fn dial(&self) -> ClientResult<Connection> {
        let mut conn = Connection::connect(&self.config)?;
        if let Some(password) = self.config.auth_password() {
            if let Err(err) = conn.authenticate(password) {
                conn.close();
                return Err(err);
            }
        }
        debug!(conn_id = conn.id(), active = self.active.load(Ordering::Acquire), "added connection to pool");
        Ok(conn)
    }

    /// Hands a fresh dial to its caller, unless the pool closed meanwhile.
    fn admit(&self, mut conn: Connection) -> ClientResult<Connection> {
        if self.lock_state().open {
            return Ok(conn);
        }
        debug!(conn_id = conn.id(), "pool closed during dial, dropping connection");
        conn.close();
        self.release_slot();
        Err(ClientError::PoolClosed)
    }

    fn wait<'a>(
        &self,
        state: MutexGuard<'a, PoolState>,
        deadline: Option<Instant>,
    ) -> ClientResult<MutexGuard<'a, PoolState>> {
        match deadline {
            None => Ok(self.available.wait(state).expect("pool mutex poisoned")),
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(ClientError::AcquireTimeout);
                }
                let (state, _) = self
                    .available
                    .wait_timeout(state, deadline - now)
                    .expect("pool mutex poisoned");
                Ok(state)
            }
        }
    }

    fn put_back(&self, mut conn: Connection) {
        match conn.state() {
            ConnectionState::Idle => {}
            ConnectionState::AwaitingResponse => {
                // The unread response would reach the next holder.
                debug!(conn_id = conn.id(), "retiring connection with unread response");
                conn.close();
                self.release_slot();
                return;
            }
            ConnectionState::Broken => {
                debug!(conn_id = conn.id(), cause = ?conn.broken_cause(), "retiring broken connection");
                conn.close();
                self.release_slot();
                return;
            }
        }

        let mut state = self.lock_state();
        if state.open {
            state.idle.push_back(conn);
            drop(state);
            self.available.notify_one();
        } else {
            drop(state);
            conn.close();
        }
    }
}

/// A checked-out connection. Returns to the pool on drop.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    conn: Option<Connection>,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("connection exists")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("connection exists")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}
