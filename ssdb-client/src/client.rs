//! # Synchronous Client API
//!
//! Purpose: Expose a compact, blocking API for common SSDB commands on top of
//! the connection pool.
//!
//! ## Design Principles
//! 1. **Facade Pattern**: `Client` hides pooling and framing; each call
//!    acquires a connection, performs one round trip and releases it.
//! 2. **Borrow-Friendly API**: Keys and names are `&[u8]`; values accept
//!    anything convertible into a wire `Value`.
//! 3. **One Status Policy**: `ok` is success even without payload, a miss is
//!    reported only for `not_found`, and every other status is a
//!    `ClientError::Server`.

use std::time::Duration;

use bytes::Bytes;
use ssdb_common::{Request, Response, Status, Value};

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::ordered_map::OrderedMap;
use crate::pool::Pool;

/// TTL state reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Key has no expiration, or does not exist.
    NoExpiry,
    /// Key expires after the provided duration.
    ExpiresIn(Duration),
}

/// Synchronous client with connection pooling.
#[derive(Clone)]
pub struct Client {
    pool: Pool,
}

impl Client {
    /// Creates a client for `host:port` with default configuration.
    pub fn connect(host: impl Into<String>, port: u16) -> ClientResult<Self> {
        Self::with_config(ClientConfig::new(host, port))
    }

    /// Creates a client with a custom configuration.
    pub fn with_config(config: ClientConfig) -> ClientResult<Self> {
        Ok(Client {
            pool: Pool::open(config)?,
        })
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Client { pool }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Closes the underlying pool.
    pub fn close(&self) {
        self.pool.close();
    }

    /// Sends an arbitrary request and returns the raw response.
    ///
    /// Failure statuses are returned as data, not as errors.
    pub fn execute(&self, request: Request) -> ClientResult<Response> {
        let mut conn = self.pool.acquire()?;
        conn.call(request)
    }

    /// Sets the value of a key.
    pub fn set(&self, key: &[u8], value: impl Into<Value>) -> ClientResult<()> {
        expect_ok(self.execute(Request::new("set").arg(key).arg(value))?)
    }

    /// Sets a value that expires after `ttl` (whole seconds).
    pub fn setx(&self, key: &[u8], value: impl Into<Value>, ttl: Duration) -> ClientResult<()> {
        expect_ok(self.execute(Request::new("setx").arg(key).arg(value).arg(secs(ttl)))?)
    }

    /// Sets a value only when the key is absent. Returns true when set.
    pub fn setnx(&self, key: &[u8], value: impl Into<Value>) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("setnx").arg(key).arg(value))?)? == 1)
    }

    /// Fetches a value by key; `Ok(None)` when the key is missing.
    pub fn get(&self, key: &[u8]) -> ClientResult<Option<Bytes>> {
        expect_value(self.execute(Request::new("get").arg(key))?)
    }

    /// Stores a new value and returns the previous one, if any.
    pub fn getset(&self, key: &[u8], value: impl Into<Value>) -> ClientResult<Option<Bytes>> {
        expect_value(self.execute(Request::new("getset").arg(key).arg(value))?)
    }

    /// Deletes a key. Deleting a missing key is not an error.
    pub fn del(&self, key: &[u8]) -> ClientResult<()> {
        expect_ok(self.execute(Request::new("del").arg(key))?)
    }

    pub fn exists(&self, key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("exists").arg(key))?)? == 1)
    }

    /// Adds `by` to an integer value and returns the new value.
    pub fn incr(&self, key: &[u8], by: i64) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("incr").arg(key).arg(by))?)
    }

    /// Sets a time-to-live on a key. Returns true when the key existed.
    pub fn expire(&self, key: &[u8], ttl: Duration) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("expire").arg(key).arg(secs(ttl)))?)? == 1)
    }

    pub fn ttl(&self, key: &[u8]) -> ClientResult<KeyTtl> {
        match expect_int(self.execute(Request::new("ttl").arg(key))?)? {
            -1 => Ok(KeyTtl::NoExpiry),
            value if value >= 0 => Ok(KeyTtl::ExpiresIn(Duration::from_secs(value as u64))),
            _ => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Keys in `(start, end]`, at most `limit` of them.
    pub fn keys(&self, start: &[u8], end: &[u8], limit: u32) -> ClientResult<Vec<Bytes>> {
        expect_list(self.execute(Request::new("keys").arg(start).arg(end).arg(limit))?)
    }

    /// Key/value pairs in `(start, end]`, at most `limit` of them.
    pub fn scan(&self, start: &[u8], end: &[u8], limit: u32) -> ClientResult<OrderedMap> {
        expect_map(self.execute(Request::new("scan").arg(start).arg(end).arg(limit))?)
    }

    /// Sets several keys at once. Returns the number of keys written.
    pub fn multi_set<'a, V, I>(&self, pairs: I) -> ClientResult<i64>
    where
        V: Into<Value>,
        I: IntoIterator<Item = (&'a [u8], V)>,
    {
        let mut request = Request::new("multi_set");
        for (key, value) in pairs {
            request.push(key);
            request.push(value);
        }
        expect_int(self.execute(request)?)
    }

    /// Fetches several keys; missing keys are absent from the result.
    pub fn multi_get(&self, keys: &[&[u8]]) -> ClientResult<OrderedMap> {
        expect_map(self.execute(Request::new("multi_get").arg(Value::list(keys.iter().copied())))?)
    }

    pub fn multi_del(&self, keys: &[&[u8]]) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("multi_del").arg(Value::list(keys.iter().copied())))?)
    }

    /// Sets a hash field. Returns true when the field was newly created.
    pub fn hset(&self, name: &[u8], key: &[u8], value: impl Into<Value>) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("hset").arg(name).arg(key).arg(value))?)? == 1)
    }

    pub fn hget(&self, name: &[u8], key: &[u8]) -> ClientResult<Option<Bytes>> {
        expect_value(self.execute(Request::new("hget").arg(name).arg(key))?)
    }

    /// Removes a hash field. Returns true when it existed.
    pub fn hdel(&self, name: &[u8], key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("hdel").arg(name).arg(key))?)? == 1)
    }

    pub fn hincr(&self, name: &[u8], key: &[u8], by: i64) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("hincr").arg(name).arg(key).arg(by))?)
    }

    pub fn hexists(&self, name: &[u8], key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("hexists").arg(name).arg(key))?)? == 1)
    }

    pub fn hsize(&self, name: &[u8]) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("hsize").arg(name))?)
    }

    pub fn hgetall(&self, name: &[u8]) -> ClientResult<OrderedMap> {
        expect_map(self.execute(Request::new("hgetall").arg(name))?)
    }

    pub fn hscan(&self, name: &[u8], start: &[u8], end: &[u8], limit: u32) -> ClientResult<OrderedMap> {
        expect_map(self.execute(Request::new("hscan").arg(name).arg(start).arg(end).arg(limit))?)
    }

    /// Sets a sorted-set member score. Returns true when the member is new.
    pub fn zset(&self, name: &[u8], key: &[u8], score: i64) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("zset").arg(name).arg(key).arg(score))?)? == 1)
    }

    pub fn zget(&self, name: &[u8], key: &[u8]) -> ClientResult<Option<i64>> {
        match expect_value(self.execute(Request::new("zget").arg(name).arg(key))?)? {
            Some(score) => parse_i64(&score).map(Some),
            None => Ok(None),
        }
    }

    pub fn zdel(&self, name: &[u8], key: &[u8]) -> ClientResult<bool> {
        Ok(expect_int(self.execute(Request::new("zdel").arg(name).arg(key))?)? == 1)
    }

    /// Members after `key_start` with scores in `[score_start, score_end]`.
    ///
    /// `None` bounds are sent empty, meaning unbounded.
    pub fn zscan(
        &self,
        name: &[u8],
        key_start: &[u8],
        score_start: Option<i64>,
        score_end: Option<i64>,
        limit: u32,
    ) -> ClientResult<OrderedMap> {
        let request = Request::new("zscan")
            .arg(name)
            .arg(key_start)
            .arg(score_start)
            .arg(score_end)
            .arg(limit);
        expect_map(self.execute(request)?)
    }

    /// Appends items to a queue. Returns the queue length afterwards.
    pub fn qpush_back<V, I>(&self, name: &[u8], items: I) -> ClientResult<i64>
    where
        V: Into<Value>,
        I: IntoIterator<Item = V>,
    {
        expect_int(self.execute(Request::new("qpush_back").arg(name).arg(Value::list(items)))?)
    }

    /// Removes and returns up to `size` items from the queue front.
    pub fn qpop_front(&self, name: &[u8], size: u32) -> ClientResult<Vec<Bytes>> {
        expect_list(self.execute(Request::new("qpop_front").arg(name).arg(size))?)
    }

    pub fn qsize(&self, name: &[u8]) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("qsize").arg(name))?)
    }

    /// Approximate database size in bytes.
    pub fn dbsize(&self) -> ClientResult<i64> {
        expect_int(self.execute(Request::new("dbsize"))?)
    }

    /// Server information lines.
    pub fn info(&self) -> ClientResult<Vec<Bytes>> {
        expect_list(self.execute(Request::new("info"))?)
    }

    /// Deletes all data on the server.
    pub fn flushdb(&self) -> ClientResult<()> {
        expect_ok(self.execute(Request::new("flushdb"))?)
    }
}

fn secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

fn server_error(response: &Response) -> ClientError {
    ClientError::Server {
        status: response.status(),
        message: response.message(),
    }
}

fn expect_ok(response: Response) -> ClientResult<()> {
    if response.is_ok() {
        Ok(())
    } else {
        Err(server_error(&response))
    }
}

fn expect_int(response: Response) -> ClientResult<i64> {
    if !response.is_ok() {
        return Err(server_error(&response));
    }
    match response.payload().first() {
        Some(value) => parse_i64(value),
        None => Err(ClientError::UnexpectedResponse),
    }
}

fn expect_value(response: Response) -> ClientResult<Option<Bytes>> {
    match response.status() {
        Status::Ok => Ok(Some(response.payload().first().cloned().unwrap_or_default())),
        Status::NotFound => Ok(None),
        _ => Err(server_error(&response)),
    }
}

fn expect_list(response: Response) -> ClientResult<Vec<Bytes>> {
    match response.status() {
        Status::Ok => Ok(response.into_payload()),
        Status::NotFound => Ok(Vec::new()),
        _ => Err(server_error(&response)),
    }
}

fn expect_map(response: Response) -> ClientResult<OrderedMap> {
    OrderedMap::from_blocks(expect_list(response)?)
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::UnexpectedResponse)
}
