use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use lantern::error::ServerError;
use lantern::http::request::Request;
use lantern::http::response::Response;
use lantern::server::poller::MioPoller;
use lantern::server::worker::{AssignPolicy, RoundRobin, WorkerPool};

struct Always(usize);

impl AssignPolicy for Always {
    fn pick(&mut self, workers: usize) -> usize {
        self.0.min(workers - 1)
    }
}

fn ok(_: &Request, res: &mut Response) -> i32 {
    res.set_body_static(b"ok");
    200
}

/// Returns a connected (client, server-side) socket pair.
fn socket_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    client.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    (client, server)
}

#[test]
fn test_round_robin_cycles() {
    let mut rr = RoundRobin::default();
    let picks: Vec<usize> = (0..7).map(|_| rr.pick(3)).collect();
    assert_eq!(picks, [0, 1, 2, 0, 1, 2, 0]);
}

#[test]
fn test_round_robin_single_worker() {
    let mut rr = RoundRobin::default();
    for _ in 0..4 {
        assert_eq!(rr.pick(1), 0);
    }
}

#[test]
fn test_pool_needs_workers() {
    let err = WorkerPool::spawn::<MioPoller>(0, Arc::new(ok)).err().unwrap();
    assert!(matches!(err, ServerError::Config(_)));
}

#[test]
fn test_pool_dispatch_follows_round_robin() {
    let mut pool = WorkerPool::spawn::<MioPoller>(3, Arc::new(ok)).unwrap();
    assert_eq!(pool.len(), 3);

    let mut clients = Vec::new();
    let mut assigned = Vec::new();
    for _ in 0..4 {
        let (client, server) = socket_pair();
        assigned.push(pool.dispatch(server).unwrap());
        clients.push(client);
    }
    assert_eq!(assigned, [0, 1, 2, 0]);

    for mut client in clients {
        client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        let mut buf = [0u8; 512];
        let mut got = Vec::new();
        while !got.ends_with(b"\r\n\r\nok") {
            let n = client.read(&mut buf).unwrap();
            assert!(n > 0, "worker closed the connection early");
            got.extend_from_slice(&buf[..n]);
        }
        assert!(got.starts_with(b"HTTP/1.1 200 OK\r\n"));
    }
}

#[test]
fn test_pool_with_custom_policy() {
    let mut pool = WorkerPool::with_policy::<MioPoller>(2, Arc::new(ok), Box::new(Always(1))).unwrap();

    let (mut client, server) = socket_pair();
    assert_eq!(pool.dispatch(server).unwrap(), 1);

    client.write_all(b"GET /x HTTP/1.1\r\n\r\n").unwrap();
    let mut buf = [0u8; 512];
    let mut got = Vec::new();
    while !got.ends_with(b"ok") {
        let n = client.read(&mut buf).unwrap();
        assert!(n > 0);
        got.extend_from_slice(&buf[..n]);
    }
    assert!(got.starts_with(b"HTTP/1.1 200 OK\r\n"));
}
