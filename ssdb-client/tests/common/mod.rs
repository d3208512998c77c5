#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use ssdb_client::{ClientConfig, Value};
use ssdb_common::{decode_buf, encode};

/// What the mock server does with one request.
pub enum Reply {
    /// Respond with these blocks, status first.
    Blocks(Vec<Vec<u8>>),
    /// Write raw bytes as-is.
    Raw(Vec<u8>),
    /// Close the socket without answering.
    Hangup,
}

pub fn reply(blocks: &[&str]) -> Reply {
    Reply::Blocks(blocks.iter().map(|b| b.as_bytes().to_vec()).collect())
}

pub struct MockServer {
    pub port: u16,
    accepted: Arc<AtomicUsize>,
}

impl MockServer {
    /// Serves every accepted socket on its own thread with `handler`.
    pub fn spawn<F>(handler: F) -> MockServer
    where
        F: Fn(&[Bytes]) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(handler);

        let counter = accepted.clone();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                let handler = handler.clone();
                thread::spawn(move || serve(stream, handler.as_ref()));
            }
        });

        MockServer { port, accepted }
    }

    pub fn config(&self, pool_size: usize) -> ClientConfig {
        let mut config = ClientConfig::new("127.0.0.1", self.port);
        config.pool_size = pool_size;
        config.connect_timeout = Some(Duration::from_secs(1));
        config.read_timeout = Some(Duration::from_secs(2));
        config.write_timeout = Some(Duration::from_secs(2));
        config.trace_frames = true;
        config
    }

    /// Sockets accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Waits briefly for the accept thread to observe `expected` sockets.
    pub fn wait_accepted(&self, expected: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(2);
        while self.accepted() < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        self.accepted()
    }
}

fn serve(mut stream: TcpStream, handler: &(dyn Fn(&[Bytes]) -> Reply + Send + Sync)) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut chunk = [0u8; 4096];

    loop {
        loop {
            let request = match decode_buf(&mut buf) {
                Ok(Some(request)) => request,
                Ok(None) => break,
                Err(_) => return,
            };
            let out = match handler(request.blocks()) {
                Reply::Blocks(blocks) => {
                    let values: Vec<Value> = blocks.into_iter().map(Value::Bytes).collect();
                    let mut out = Vec::new();
                    encode(&values, &mut out).expect("encode reply");
                    out
                }
                Reply::Raw(bytes) => bytes,
                Reply::Hangup => return,
            };
            if stream.write_all(&out).is_err() {
                return;
            }
        }

        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
