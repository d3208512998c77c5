mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use ssdb_client::{ClientError, ConnectionState, Pool, PooledConnection, Request, Status};

use common::{init_tracing, reply, MockServer, Reply};

fn ok_server() -> MockServer {
    MockServer::spawn(|request| match &request[0][..] {
        b"break" => Reply::Hangup,
        b"garbage" => Reply::Raw(b"2\nok\nnot-a-length\n".to_vec()),
        _ => reply(&["ok", "1"]),
    })
}

#[test]
fn idle_connection_is_reused() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(2)).expect("pool");

    let first_id = {
        let mut conn = pool.acquire().expect("acquire");
        assert!(conn.call(Request::new("ping")).expect("call").is_ok());
        conn.id()
    };
    assert_eq!(pool.idle_connections(), 1);

    let conn = pool.acquire().expect("acquire again");
    assert_eq!(conn.id(), first_id);
    assert_eq!(pool.active_connections(), 1);
    assert_eq!(server.wait_accepted(1), 1);
}

#[test]
fn capacity_blocks_extra_caller_until_release() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(3)).expect("pool");

    let held: Vec<PooledConnection> = thread::scope(|s| {
        let handles: Vec<_> = (0..3)
            .map(|_| s.spawn(|| pool.acquire().expect("acquire")))
            .collect();
        handles.into_iter().map(|h| h.join().expect("join")).collect()
    });
    let ids: HashSet<u64> = held.iter().map(|c| c.id()).collect();
    assert_eq!(ids.len(), 3);
    assert_eq!(pool.active_connections(), 3);

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let conn = waiter_pool.acquire().expect("blocked acquire");
        tx.send(conn.id()).expect("send");
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

    let mut held = held;
    let released = held.pop().expect("held connection");
    let released_id = released.id();
    pool.release(released);

    let got = rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke");
    assert_eq!(got, released_id);
    waiter.join().expect("join waiter");

    assert_eq!(pool.active_connections(), 3);
    assert_eq!(server.wait_accepted(3), 3);
}

#[test]
fn concurrent_callers_never_exceed_size() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(3)).expect("pool");
    let in_use = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    thread::scope(|s| {
        for _ in 0..8 {
            let pool = &pool;
            let in_use = in_use.clone();
            let peak = peak.clone();
            s.spawn(move || {
                for _ in 0..25 {
                    let mut conn = pool.acquire().expect("acquire");
                    let now = in_use.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    let response = conn.call(Request::new("ping")).expect("call");
                    assert_eq!(response.status(), Status::Ok);
                    in_use.fetch_sub(1, Ordering::SeqCst);
                }
            });
        }
    });

    assert!(peak.load(Ordering::SeqCst) <= 3);
    assert!(pool.active_connections() <= 3);
    assert!(server.wait_accepted(3) <= 3);
}

#[test]
fn broken_connection_is_replaced() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");

    let broken_id = {
        let mut conn = pool.acquire().expect("acquire");
        let err = conn.call(Request::new("break")).unwrap_err();
        assert!(err.is_transport());
        assert!(conn.is_broken());
        conn.id()
    };
    assert_eq!(pool.active_connections(), 0);
    assert_eq!(pool.idle_connections(), 0);

    let mut conn = pool.acquire().expect("fresh acquire");
    assert_ne!(conn.id(), broken_id);
    assert!(conn.call(Request::new("ping")).expect("call").is_ok());
    assert_eq!(server.wait_accepted(2), 2);
}

#[test]
fn malformed_response_retires_connection() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");

    let mut conn = pool.acquire().expect("acquire");
    assert!(matches!(
        conn.call(Request::new("garbage")),
        Err(ClientError::Protocol(_))
    ));
    pool.release(conn);
    assert_eq!(pool.active_connections(), 0);
}

#[test]
fn connection_released_with_unread_response_is_retired() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");

    let abandoned_id = {
        let mut conn = pool.acquire().expect("acquire");
        conn.send(Request::new("get").arg("a")).expect("send");
        assert_eq!(conn.state(), ConnectionState::AwaitingResponse);
        conn.id()
    };
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.active_connections(), 0);

    let mut conn = pool.acquire().expect("fresh acquire");
    assert_ne!(conn.id(), abandoned_id);
    assert_eq!(conn.state(), ConnectionState::Idle);
    let response = conn.call(Request::new("ping")).expect("call");
    assert_eq!(response.blocks().len(), 2);
    assert_eq!(server.wait_accepted(2), 2);
}

#[test]
fn zero_timeouts_do_not_block_dialing() {
    init_tracing();
    let server = ok_server();
    let mut config = server.config(1);
    config.connect_timeout = Some(Duration::ZERO);
    config.read_timeout = Some(Duration::ZERO);
    config.write_timeout = Some(Duration::ZERO);
    let pool = Pool::open(config).expect("pool");

    let mut conn = pool.acquire().expect("acquire");
    assert!(conn.call(Request::new("ping")).expect("call").is_ok());
}

#[test]
fn retiring_broken_connection_wakes_waiter() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");

    let mut held = pool.acquire().expect("acquire");
    let held_id = held.id();

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let conn = waiter_pool.acquire().expect("acquire after retire");
        tx.send(conn.id()).expect("send");
    });
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    assert!(held.call(Request::new("break")).is_err());
    drop(held);

    let got = rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke");
    assert_ne!(got, held_id);
    waiter.join().expect("join waiter");
}

#[test]
fn close_wakes_blocked_caller() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");
    let held = pool.acquire().expect("acquire");

    let (tx, rx) = mpsc::channel();
    let waiter_pool = pool.clone();
    let waiter = thread::spawn(move || {
        let outcome = waiter_pool.acquire().map(|conn| conn.id());
        tx.send(outcome).expect("send");
    });
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    pool.close();
    let outcome = rx.recv_timeout(Duration::from_secs(2)).expect("waiter woke");
    assert!(matches!(outcome, Err(ClientError::PoolClosed)));
    waiter.join().expect("join waiter");

    // Released after close: closed, not queued.
    drop(held);
    assert_eq!(pool.idle_connections(), 0);
    assert!(matches!(pool.acquire(), Err(ClientError::PoolClosed)));
}

#[test]
fn close_drains_idle_connections() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(2)).expect("pool");
    {
        let _a = pool.acquire().expect("a");
        let _b = pool.acquire().expect("b");
    }
    assert_eq!(pool.idle_connections(), 2);
    pool.close();
    pool.close();
    assert_eq!(pool.idle_connections(), 0);
    assert!(pool.is_closed());
}

#[test]
fn try_acquire_does_not_block() {
    init_tracing();
    let server = ok_server();
    let pool = Pool::open(server.config(1)).expect("pool");

    let held = pool.try_acquire().expect("try").expect("connection");
    assert!(pool.try_acquire().expect("try again").is_none());
    assert!(matches!(
        pool.acquire_timeout(Duration::from_millis(50)),
        Err(ClientError::AcquireTimeout)
    ));
    drop(held);
    assert!(pool.try_acquire().expect("after release").is_some());
}

#[test]
fn password_is_sent_after_dial() {
    init_tracing();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    let server = MockServer::spawn(move |request| {
        let name = String::from_utf8_lossy(&request[0]).into_owned();
        log.lock().expect("log").push(name);
        match &request[0][..] {
            b"auth" if request.get(1).map(|p| p.as_ref()) == Some(&b"secret"[..]) => {
                reply(&["ok", "1"])
            }
            b"auth" => reply(&["error", "invalid password"]),
            _ => reply(&["ok"]),
        }
    });

    let mut config = server.config(1);
    config.password = Some("secret".into());
    let pool = Pool::open(config).expect("pool");
    {
        let mut conn = pool.acquire().expect("acquire");
        assert!(conn.call(Request::new("ping")).expect("call").is_ok());
    }
    assert_eq!(*seen.lock().expect("log"), vec!["auth".to_string(), "ping".to_string()]);

    let mut config = server.config(1);
    config.password = Some("wrong".into());
    let pool = Pool::open(config).expect("pool");
    match pool.acquire() {
        Err(ClientError::AuthFailed { status }) => assert_eq!(status, Status::Error),
        Err(other) => panic!("expected auth failure, got {}", other),
        Ok(_) => panic!("expected auth failure"),
    }
    assert_eq!(pool.active_connections(), 0);
}

#[test]
fn unreachable_server_reports_dial_error() {
    init_tracing();
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().expect("addr").port();
    drop(listener);

    let mut config = ssdb_client::ClientConfig::new("127.0.0.1", port);
    config.pool_size = 2;
    let pool = Pool::open(config).expect("pool");
    assert!(matches!(pool.acquire(), Err(ClientError::Io(_))));
    assert_eq!(pool.active_connections(), 0);
}
