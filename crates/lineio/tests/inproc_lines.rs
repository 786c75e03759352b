use std::thread;
use std::time::Duration;

use lineio::{Acceptor, InprocFactory, LineError, LineManager, LineOption};

fn inproc_manager() -> LineManager {
    let mut manager = LineManager::new();
    manager.register_factory(Box::new(InprocFactory::new()));
    manager
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn read_exactly(line: &mut dyn lineio::Line, buf: &mut [u8]) {
    let mut have = 0;
    while have < buf.len() {
        have += line.read(&mut buf[have..]).unwrap();
    }
}

#[test]
fn simple_echo() {
    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://echo").unwrap();
    let payload = pattern(1024);

    let client = {
        let payload = payload.clone();
        thread::spawn(move || {
            let mut client = inproc_manager().create_client("inproc://echo").unwrap();
            assert_eq!(client.write(&payload).unwrap(), 1024);
        })
    };

    let mut line = acceptor.accept(Duration::from_millis(100)).unwrap().unwrap();
    let mut received = [0; 1024];
    read_exactly(line.as_mut(), &mut received);
    client.join().unwrap();
    assert_eq!(received.to_vec(), payload);
}

#[test]
fn large_transfer_in_chunks() {
    const TOTAL: usize = 100 * 1024 * 1024;
    const CHUNK: usize = 1024;

    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://bulk").unwrap();
    let payload = pattern(TOTAL);

    let client = {
        let payload = payload.clone();
        thread::spawn(move || {
            let mut client = inproc_manager().create_client("inproc://bulk").unwrap();
            for chunk in payload.chunks(CHUNK) {
                let mut sent = 0;
                while sent < chunk.len() {
                    sent += client.write(&chunk[sent..]).unwrap();
                }
            }
        })
    };

    let mut line = acceptor.accept(Duration::from_millis(100)).unwrap().unwrap();
    let mut received = vec![0; TOTAL];
    for chunk in received.chunks_mut(CHUNK) {
        read_exactly(line.as_mut(), chunk);
    }
    client.join().unwrap();
    assert_eq!(received, payload);
}

#[test]
fn connection_delayed_at_server_side() {
    let manager = inproc_manager();
    let acceptor = manager.create_server("inproc://slow-server").unwrap();
    let payload = pattern(1024);

    let client = {
        let payload = payload.clone();
        thread::spawn(move || {
            // Blocks inside create_client until the acceptor gets around to
            // pairing.
            let mut client = inproc_manager().create_client("inproc://slow-server").unwrap();
            client.write(&payload).unwrap();
        })
    };

    let server = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let mut acceptor = acceptor;
        let mut line = acceptor.accept(Duration::from_millis(200)).unwrap().unwrap();
        let mut received = vec![0; 1024];
        read_exactly(line.as_mut(), &mut received);
        received
    });

    client.join().unwrap();
    assert_eq!(server.join().unwrap(), payload);
}

#[test]
fn connection_delayed_at_client_side() {
    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://slow-client").unwrap();
    let payload = pattern(1024);

    let client = {
        let payload = payload.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            let mut client = inproc_manager().create_client("inproc://slow-client").unwrap();
            client.write(&payload).unwrap();
        })
    };

    let mut line = acceptor.accept(Duration::from_millis(200)).unwrap().unwrap();
    let mut received = vec![0; 1024];
    read_exactly(line.as_mut(), &mut received);
    client.join().unwrap();
    assert_eq!(received, payload);
}

#[test]
fn dropped_peer_reports_connection_loss() {
    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://drop").unwrap();

    let client = thread::spawn(move || {
        let client = inproc_manager().create_client("inproc://drop").unwrap();
        drop(client);
    });

    let mut line = acceptor.accept(Duration::from_millis(100)).unwrap().unwrap();
    line.set_option(LineOption::ReceiveTimeout(Duration::from_millis(100))).unwrap();
    let mut buf = [0; 1024];
    assert!(matches!(line.read(&mut buf), Err(LineError::ConnectionLost)));
    client.join().unwrap();
}

#[test]
fn pending_clients_pair_in_fifo_order() {
    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://fifo").unwrap();

    let spawn_client = |tag: u8, delay: Duration| {
        thread::spawn(move || {
            thread::sleep(delay);
            let mut client = inproc_manager().create_client("inproc://fifo").unwrap();
            client.write(&[tag]).unwrap();
        })
    };
    let first = spawn_client(1, Duration::ZERO);
    let second = spawn_client(2, Duration::from_millis(150));

    // Let the first client enqueue well before the second.
    thread::sleep(Duration::from_millis(50));

    let mut read_tag = |acceptor: &mut Box<dyn Acceptor>| {
        let mut line = acceptor.accept(Duration::from_millis(500)).unwrap().unwrap();
        let mut tag = [0];
        line.read(&mut tag).unwrap();
        tag[0]
    };
    assert_eq!(read_tag(&mut acceptor), 1);
    assert_eq!(read_tag(&mut acceptor), 2);

    first.join().unwrap();
    second.join().unwrap();
}

#[test]
fn send_timeout_is_unsupported() {
    let manager = inproc_manager();
    let mut acceptor = manager.create_server("inproc://options").unwrap();
    let client = thread::spawn(move || {
        let mut client = inproc_manager().create_client("inproc://options").unwrap();
        assert!(matches!(
            client.set_option(LineOption::SendTimeout(Duration::from_millis(10))),
            Err(LineError::UnsupportedOption)
        ));
        // Keep the line alive until the server side finishes its checks.
        thread::sleep(Duration::from_millis(100));
        drop(client);
    });

    let mut line = acceptor.accept(Duration::from_millis(100)).unwrap().unwrap();
    line.set_option(LineOption::ReceiveTimeout(Duration::from_millis(20))).unwrap();
    let mut buf = [0; 8];
    // Nothing was sent: the bounded read comes back empty-handed.
    assert_eq!(line.read(&mut buf).unwrap(), 0);
    client.join().unwrap();
}
