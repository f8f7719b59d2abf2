// End-to-end tests: a real server on an ephemeral loopback port
use aesd_buffer::SharedStore;
use aesd_client::AesdClient;
use aesd_core::{ResponseMode, SeekTo};
use aesd_daemon::{Server, ServerConfig, ShutdownHandle};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const IO_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    store: Arc<SharedStore>,
    shutdown: ShutdownHandle,
    thread: JoinHandle<Result<(), aesd_daemon::ServiceError>>,
}

impl Running {
    fn start(config: ServerConfig) -> Self {
        let server = Server::bind(config).unwrap();
        let addr = server.local_addr();
        let store = server.store();
        let shutdown = server.shutdown_handle();
        let thread = thread::spawn(move || server.run());
        Running { addr, store, shutdown, thread }
    }

    fn client(&self) -> AesdClient {
        let mut client = AesdClient::connect_addr(self.addr).unwrap();
        client.set_timeout(Some(IO_TIMEOUT)).unwrap();
        client
    }

    fn stop(self) {
        self.shutdown.trigger();
        self.thread.join().unwrap().unwrap();
    }
}

fn config(mode: ResponseMode) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1".to_string(),
        port: 0,
        mode,
        heartbeat: None,
        ..ServerConfig::default()
    }
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + IO_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn full_echo_returns_everything_written_so_far() {
    let dir = tempfile::tempdir().unwrap();
    let data_file = dir.path().join("aesdsocketdata");
    let server = Running::start(ServerConfig {
        data_file: Some(data_file.clone()),
        ..config(ResponseMode::FullEcho)
    });

    let mut first = server.client();
    first.send_line("hello").unwrap();
    assert_eq!(first.receive_exact(6).unwrap(), b"hello\n");
    first.disconnect().unwrap();

    let mut second = server.client();
    second.send_raw(b"wor").unwrap();
    second.send_raw(b"ld\n").unwrap();
    assert_eq!(second.receive_exact(12).unwrap(), b"hello\nworld\n");
    second.disconnect().unwrap();

    assert_eq!(std::fs::read(&data_file).unwrap(), b"hello\nworld\n");
    server.stop();
    assert!(!data_file.exists());
}

#[test]
fn capacity_three_scenario_over_tcp() {
    let server = Running::start(ServerConfig {
        capacity: 3,
        ..config(ResponseMode::FullEcho)
    });

    let mut client = server.client();
    let mut expected_len = 0;
    for line in ["a", "bb", "ccc"] {
        client.send_line(line).unwrap();
        expected_len += line.len() + 1;
        client.receive_exact(expected_len).unwrap();
    }
    client.send_line("dddd").unwrap();
    assert_eq!(client.receive_exact(12).unwrap(), b"bb\nccc\ndddd\n");

    server.stop();
}

#[test]
fn positioned_mode_seek_returns_tail() {
    let server = Running::start(config(ResponseMode::Positioned));

    let mut client = server.client();
    client.send_line("1234").unwrap();
    assert_eq!(client.receive_exact(5).unwrap(), b"1234\n");
    client.send_line("123456").unwrap();
    assert_eq!(client.receive_exact(12).unwrap(), b"1234\n123456\n");
    client.send_line("12").unwrap();
    assert_eq!(client.receive_exact(15).unwrap(), b"1234\n123456\n12\n");

    client.seek_to(SeekTo::new(1, 2)).unwrap();
    assert_eq!(client.receive_exact(8).unwrap(), b"3456\n12\n");
    assert_eq!(server.store.live_count(), 3);

    server.stop();
}

#[test]
fn invalid_seek_closes_only_that_connection() {
    let server = Running::start(config(ResponseMode::Positioned));

    let mut writer = server.client();
    writer.send_line("kept").unwrap();
    writer.receive_exact(5).unwrap();

    let mut bad = server.client();
    bad.seek_to(SeekTo::new(5, 0)).unwrap();
    assert!(bad.is_closed(IO_TIMEOUT).unwrap());

    // the other client is unaffected
    writer.send_line("more").unwrap();
    assert_eq!(writer.receive_exact(10).unwrap(), b"kept\nmore\n");

    server.stop();
}

#[test]
fn concurrent_clients_commit_whole_lines() {
    let server = Running::start(ServerConfig {
        capacity: 40,
        ..config(ResponseMode::FullEcho)
    });

    let handles: Vec<_> = (0..4)
        .map(|writer| {
            let addr = server.addr;
            thread::spawn(move || {
                let mut client = AesdClient::connect_addr(addr).unwrap();
                client.set_timeout(Some(IO_TIMEOUT)).unwrap();
                for i in 0..10 {
                    client.send_line(&format!("client{}-line{}", writer, i)).unwrap();
                    // wait for the echo so each chunk holds a single line
                    let echo = client.receive_until_idle(Duration::from_millis(300)).unwrap();
                    assert!(!echo.is_empty());
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let records = server.store.records();
    assert_eq!(records.len(), 40);
    for record in &records {
        let text = record.to_string();
        assert!(text.starts_with("client") && text.contains("-line"), "torn record {:?}", text);
    }

    server.stop();
}

#[test]
fn shutdown_interrupts_blocked_sessions() {
    let server = Running::start(config(ResponseMode::FullEcho));

    let mut first = server.client();
    let mut second = server.client();
    // unterminated input: both sessions block in receive
    first.send_raw(b"partial one").unwrap();
    second.send_raw(b"partial two").unwrap();
    thread::sleep(Duration::from_millis(100));

    let store = Arc::clone(&server.store);
    let started = Instant::now();
    server.stop();
    assert!(started.elapsed() < IO_TIMEOUT);

    assert!(first.is_closed(IO_TIMEOUT).unwrap());
    assert!(second.is_closed(IO_TIMEOUT).unwrap());
    // partial input never becomes a record
    assert_eq!(store.live_count(), 0);
}

#[test]
fn sequential_clients_accumulate_records() {
    let server = Running::start(config(ResponseMode::FullEcho));

    for i in 0..5 {
        let mut client = server.client();
        client.send_line(&format!("line {}", i)).unwrap();
        assert_eq!(client.receive_exact(7 * (i + 1)).unwrap().len(), 7 * (i + 1));
        client.finish().unwrap();
        assert!(client.is_closed(IO_TIMEOUT).unwrap());
    }

    assert!(wait_for(|| server.store.live_count() == 5));
    server.stop();
}

#[test]
fn heartbeat_appends_timestamps() {
    let server = Running::start(ServerConfig {
        heartbeat: Some(Duration::from_millis(50)),
        ..config(ResponseMode::FullEcho)
    });

    assert!(wait_for(|| server.store.live_count() >= 2));
    for record in server.store.records() {
        assert!(record.as_bytes().starts_with(b"timestamp:"));
    }

    server.stop();
}

#[test]
fn bind_failure_is_a_setup_fault() {
    let server = Running::start(config(ResponseMode::Positioned));

    let taken = ServerConfig {
        port: server.addr.port(),
        ..config(ResponseMode::Positioned)
    };
    assert!(matches!(
        Server::bind(taken),
        Err(aesd_daemon::ServiceError::Setup { .. })
    ));

    server.stop();
}
