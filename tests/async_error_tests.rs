use simpleperf::interval_reporter::{IntervalMessage, IntervalReporter};
use simpleperf::protocol::{find_sentinel, SENTINEL};
use simpleperf::server::receive_data;
use simpleperf::{ByteSize, Client, Config, Error, Unit};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;

fn diagnostics(receiver: &mut UnboundedReceiver<IntervalMessage>) -> Vec<String> {
    let mut found = Vec::new();
    while let Ok(msg) = receiver.try_recv() {
        if let IntervalMessage::Diagnostic(message) = msg {
            found.push(message);
        }
    }
    found
}

/// Reads until the sentinel shows up or the peer closes.
async fn read_until_sentinel(socket: &mut TcpStream) {
    let mut buf = vec![0u8; 4096];
    let mut tail = Vec::new();
    loop {
        let n = socket.read(&mut buf).await.unwrap();
        if n == 0 {
            return;
        }
        tail.extend_from_slice(&buf[..n]);
        if find_sentinel(&tail).is_some() {
            return;
        }
        let keep = tail.len().min(SENTINEL.len() - 1);
        tail.drain(..tail.len() - keep);
    }
}

/// Test that a client with no server to talk to fails with connection refused
#[tokio::test]
async fn test_connection_refused() {
    // Bind and release a port so nothing listens on it
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (reporter, mut output) = IntervalReporter::new();
    let config = Config::client(addr.ip().to_string(), addr.port());
    let client = Client::new(config).unwrap().with_reporter(reporter);

    let result = client.run().await;
    assert!(matches!(result, Err(Error::ConnectionRefused(_))));

    // The error is returned to the caller only, so it is printed once
    let mut saw_summary = false;
    let mut diagnostics = 0;
    while let Ok(msg) = output.try_recv() {
        match msg {
            IntervalMessage::Summary(_) => saw_summary = true,
            IntervalMessage::Diagnostic(_) => diagnostics += 1,
            _ => {}
        }
    }
    assert!(!saw_summary);
    assert_eq!(diagnostics, 0);
}

/// Test that a wrong acknowledgement is a soft failure without a summary
#[tokio::test]
async fn test_handshake_mismatch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_until_sentinel(&mut socket).await;
        socket.write_all(b"ACK: NO").await.unwrap();
    });

    let (reporter, mut output) = IntervalReporter::new();
    let config = Config::client(addr.ip().to_string(), addr.port())
        .with_size(ByteSize::new(20, Unit::KB));
    let client = Client::new(config).unwrap().with_reporter(reporter);

    let summaries = client.run().await.unwrap();
    server_handle.await.unwrap();

    assert!(summaries.is_empty());
    let messages = diagnostics(&mut output);
    assert!(messages.iter().any(|m| m.contains("Did not receive acknowledgement")));
}

/// Test that a server closing without replying is also a handshake failure
#[tokio::test]
async fn test_missing_acknowledgement() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_until_sentinel(&mut socket).await;
        socket.shutdown().await.unwrap();
    });

    let (reporter, mut output) = IntervalReporter::new();
    let config = Config::client(addr.ip().to_string(), addr.port())
        .with_size(ByteSize::new(3, Unit::KB));
    let client = Client::new(config).unwrap().with_reporter(reporter);

    let summaries = client.run().await.unwrap();
    server_handle.await.unwrap();

    assert!(summaries.is_empty());
    assert!(!diagnostics(&mut output).is_empty());
}

/// Test that a peer reset mid-transfer abandons only that connection
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transport_error_abandons_transfer() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        // Close with unread data pending so the client sees a reset
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(socket);
    });

    let (reporter, mut output) = IntervalReporter::new();
    let config = Config::client(addr.ip().to_string(), addr.port())
        .with_size(ByteSize::new(500, Unit::MB));
    let client = Client::new(config).unwrap().with_reporter(reporter);

    let summaries = timeout(Duration::from_secs(30), client.run())
        .await
        .expect("client did not stop after the reset")
        .unwrap();
    server_handle.await.unwrap();

    assert!(summaries.is_empty());
    assert!(diagnostics(&mut output).iter().any(|m| m.contains("abandoned")));
}

/// Test that one failing connection does not affect its sibling
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failure_is_isolated_between_parallel_connections() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_handle = tokio::spawn(async move {
        let (mut good, _) = listener.accept().await.unwrap();
        let (mut bad, _) = listener.accept().await.unwrap();

        let good_task = tokio::spawn(async move { receive_data(&mut good, 1000).await.unwrap() });
        read_until_sentinel(&mut bad).await;
        bad.write_all(b"GO AWAY").await.unwrap();

        good_task.await.unwrap()
    });

    let (reporter, _output) = IntervalReporter::new();
    let config = Config::client(addr.ip().to_string(), addr.port())
        .with_size(ByteSize::new(10, Unit::KB))
        .with_parallel(2);
    let client = Client::new(config).unwrap().with_reporter(reporter);

    let summaries = client.run().await.unwrap();
    let received = server_handle.await.unwrap();

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].bytes(), 10_000);
    assert_eq!(received.bytes, 10_000);
    assert!(received.sentinel_seen);
}

/// Test that malformed sizes and units are rejected before any networking
#[test]
fn test_configuration_errors() {
    assert!(matches!("10XB".parse::<ByteSize>(), Err(Error::InvalidSize(_))));
    assert!(matches!("GB".parse::<Unit>(), Err(Error::InvalidUnit(_))));
    assert!(matches!(
        Client::new(Config::client("127.0.0.1".to_string(), 1).with_intervals(0)),
        Err(Error::Config(_))
    ));
}
