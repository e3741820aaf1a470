//! KISS over TCP against a local listener

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

use tncpool::connection::TransportType;
use tncpool::{ConnectionPool, ConnectionSpec, ConnectionState, FrameCallback};

fn tcp_spec(name: &str, port: u16, retry_limit: i64, retry_delay: Duration) -> ConnectionSpec {
    ConnectionSpec::builder(name)
        .transport(TransportType::Tcpip)
        .endpoint(&format!("127.0.0.1:{}", port))
        .retry_limit(retry_limit)
        .retry_delay(retry_delay)
        .build()
        .unwrap()
}

async fn wait_for(pool: &ConnectionPool, name: &str, state: ConnectionState) {
    timeout(Duration::from_secs(5), async {
        while pool.status(name).unwrap() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("TNC {} never reached {}", name, state));
}

#[tokio::test]
async fn test_frames_from_tcp_tnc() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let pool = ConnectionPool::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    pool.connect("Main", tcp_spec("Main", port, 0, Duration::ZERO), FrameCallback::channel(tx))
        .unwrap();

    let (mut socket, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    wait_for(&pool, "Main", ConnectionState::Connected).await;

    // Data frame, TXDELAY command (ignored), data frame with an escaped FEND
    socket
        .write_all(&[
            0xC0, 0x00, b'h', b'i', 0xC0, 0xC0, 0x01, 0x10, 0xC0, 0xC0, 0x10, 0xDB, 0xDC, 0xC0,
        ])
        .await
        .unwrap();

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first.port, 0);
    assert_eq!(&first.payload[..], b"hi");

    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(second.port, 1);
    assert_eq!(&second.payload[..], &[0xC0]);

    pool.cleanup().await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_frames_split_across_reads() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let pool = ConnectionPool::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    pool.connect("Main", tcp_spec("Main", port, 0, Duration::ZERO), FrameCallback::channel(tx))
        .unwrap();

    let (mut socket, _) = listener.accept().await.unwrap();
    socket.write_all(&[0xC0, 0x00, b'a', b'b']).await.unwrap();
    socket.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    socket.write_all(&[b'c', 0xC0]).await.unwrap();

    let frame = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(&frame.payload[..], b"abc");

    pool.cleanup().await;
}

#[tokio::test]
async fn test_refused_port_exhausts_retries() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let pool = ConnectionPool::new();
    pool.connect(
        "Main",
        tcp_spec("Main", port, 2, Duration::from_millis(50)),
        FrameCallback::new(|_| Ok(())),
    )
    .unwrap();

    timeout(Duration::from_secs(5), pool.join("Main"))
        .await
        .unwrap()
        .unwrap();

    let info = &pool.snapshot()[0];
    assert_eq!(info.state, ConnectionState::Disconnected);
    assert!(!info.running);
    assert_eq!(info.retry_attempts, 2);
}

#[tokio::test]
async fn test_stop_interrupts_blocked_read() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let pool = ConnectionPool::new();
    pool.connect(
        "Main",
        tcp_spec("Main", port, 0, Duration::ZERO),
        FrameCallback::new(|_| Ok(())),
    )
    .unwrap();

    // Keep the peer open and silent so the worker sits in read
    let (_socket, _) = listener.accept().await.unwrap();
    wait_for(&pool, "Main", ConnectionState::Connected).await;

    pool.stop("Main").unwrap();
    timeout(Duration::from_secs(1), pool.join("Main"))
        .await
        .expect("stop should unblock the read")
        .unwrap();

    assert_eq!(pool.status("Main").unwrap(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_peer_close_ends_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let pool = ConnectionPool::new();
    pool.connect(
        "Main",
        tcp_spec("Main", port, 3, Duration::from_millis(50)),
        FrameCallback::new(|_| Ok(())),
    )
    .unwrap();

    let (socket, _) = listener.accept().await.unwrap();
    wait_for(&pool, "Main", ConnectionState::Connected).await;
    drop(socket);

    timeout(Duration::from_secs(5), pool.join("Main"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(pool.status("Main").unwrap(), ConnectionState::Disconnected);
    assert_eq!(pool.snapshot()[0].retry_attempts, 0);
}
