//! Control channel over real TCP connections

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vidcast::protocol::{decode_server_message, ServerMessage};
use vidcast::server::{Authorizer, BroadcastHub, PrivilegedAddress, ServerConfig, VidcastServer};
use vidcast::store::{AnnouncementStore, JsonFileStore, MemoryStore};

struct Running {
    control_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<vidcast::Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.cancel();
        tokio_test::assert_ok!(self.task.await.unwrap());
    }
}

async fn start(hub: BroadcastHub) -> Running {
    let config = ServerConfig::default()
        .control_addr("127.0.0.1:0".parse().unwrap())
        .video_addr("127.0.0.1:0".parse().unwrap())
        .shutdown_grace(Duration::from_millis(500));
    let shutdown = CancellationToken::new();
    let server = VidcastServer::bind(config, Arc::new(hub), shutdown.clone())
        .await
        .unwrap();
    let control_addr = server.control_addr().unwrap();

    Running {
        control_addr,
        shutdown,
        task: tokio::spawn(server.run(None)),
    }
}

struct Peer {
    local_addr: SocketAddr,
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl Peer {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let local_addr = stream.local_addr().unwrap();
        let (read, writer) = stream.into_split();
        Self {
            local_addr,
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn next(&mut self) -> ServerMessage {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for a server line")
            .unwrap()
            .expect("connection closed");
        decode_server_message(line.as_bytes()).unwrap()
    }

    /// Read and return the two snapshot messages
    async fn snapshots(&mut self) -> (ServerMessage, ServerMessage) {
        (self.next().await, self.next().await)
    }

    async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }
}

fn loopback_host() -> Arc<dyn Authorizer> {
    Arc::new(PrivilegedAddress("127.0.0.1".parse().unwrap()))
}

#[tokio::test]
async fn test_new_connection_gets_both_snapshots() {
    let store = Arc::new(MemoryStore::new());
    let hub = BroadcastHub::load(store, loopback_host()).await;
    let server = start(hub).await;

    let mut peer = Peer::connect(server.control_addr).await;
    let (announcements, chat) = peer.snapshots().await;
    assert_eq!(announcements, ServerMessage::LoadOldAnnouncements(Vec::new()));
    assert_eq!(chat, ServerMessage::LoadOldChatMessages(Vec::new()));

    server.stop().await;
}

#[tokio::test]
async fn test_chat_reaches_every_connection() {
    let hub = BroadcastHub::new(Arc::new(MemoryStore::new()), loopback_host());
    let server = start(hub).await;

    let mut alice = Peer::connect(server.control_addr).await;
    let mut bob = Peer::connect(server.control_addr).await;
    alice.snapshots().await;
    bob.snapshots().await;

    alice
        .send(r#"{"type":"chatMessage","payload":{"sender_id":"alice","message":"hello all"}}"#)
        .await;
    for peer in [&mut alice, &mut bob] {
        match peer.next().await {
            ServerMessage::ChatMessage(chat) => {
                assert_eq!(chat.sender, "alice");
                assert_eq!(chat.message, "hello all");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    // A late joiner sees the line in its history
    let mut carol = Peer::connect(server.control_addr).await;
    match carol.snapshots().await.1 {
        ServerMessage::LoadOldChatMessages(history) => {
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].message, "hello all");
        }
        other => panic!("unexpected {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_anonymous_chat_uses_port_name() {
    let hub = BroadcastHub::new(Arc::new(MemoryStore::new()), loopback_host());
    let server = start(hub).await;

    let mut peer = Peer::connect(server.control_addr).await;
    peer.snapshots().await;
    peer.send(r#"{"type":"chatMessage","payload":{"message":"who am i"}}"#)
        .await;

    match peer.next().await {
        ServerMessage::ChatMessage(chat) => {
            assert_eq!(chat.sender, format!("UnknownClient-{}", peer.local_addr.port()));
        }
        other => panic!("unexpected {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_bad_lines_do_not_close_connection() {
    let hub = BroadcastHub::new(Arc::new(MemoryStore::new()), loopback_host());
    let server = start(hub).await;

    let mut peer = Peer::connect(server.control_addr).await;
    peer.snapshots().await;

    peer.send("this is not json").await;
    assert_eq!(
        peer.next().await,
        ServerMessage::server_error("Invalid JSON format.")
    );

    peer.send(r#"{"payload":{"message":"x"}}"#).await;
    assert_eq!(
        peer.next().await,
        ServerMessage::server_error("Message type is missing.")
    );

    peer.send(r#"{"type":"chatMessage","payload":{"message":"   "}}"#)
        .await;
    peer.send(r#"{"type":"chatMessage","payload":{"message":"after"}}"#)
        .await;
    match peer.next().await {
        ServerMessage::ChatMessage(chat) => assert_eq!(chat.message, "after"),
        other => panic!("unexpected {:?}", other),
    }

    server.stop().await;
}

#[tokio::test]
async fn test_only_host_may_announce() {
    let host_addr = Arc::new(OnceLock::<SocketAddr>::new());
    let authorizer = {
        let host_addr = Arc::clone(&host_addr);
        move |peer: &SocketAddr| host_addr.get() == Some(peer)
    };
    let hub = BroadcastHub::new(Arc::new(MemoryStore::new()), Arc::new(authorizer));
    let server = start(hub).await;

    let mut host = Peer::connect(server.control_addr).await;
    let mut guest = Peer::connect(server.control_addr).await;
    host_addr.set(host.local_addr).unwrap();
    host.snapshots().await;
    guest.snapshots().await;

    guest
        .send(r#"{"type":"createAnnouncement","payload":{"message":"I am the host now"}}"#)
        .await;
    assert_eq!(
        guest.next().await,
        ServerMessage::announcement_error("Only the designated host can create announcements.")
    );

    host.send(r#"{"type":"createAnnouncement","payload":{"message":"Doors open at 8"}}"#)
        .await;
    for peer in [&mut host, &mut guest] {
        match peer.next().await {
            ServerMessage::NewAnnouncement(announcement) => {
                assert_eq!(announcement.message, "Doors open at 8")
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    host.send(r#"{"type":"createAnnouncement","payload":{"message":""}}"#)
        .await;
    assert!(matches!(
        host.next().await,
        ServerMessage::AnnouncementError(_)
    ));

    server.stop().await;
}

#[tokio::test]
async fn test_announcements_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("announcements.json");

    let first = start(BroadcastHub::load(Arc::new(JsonFileStore::new(&path)), loopback_host()).await).await;
    let mut host = Peer::connect(first.control_addr).await;
    host.snapshots().await;
    for text in ["first", "second"] {
        host.send(&format!(
            r#"{{"type":"createAnnouncement","payload":{{"message":"{}"}}}}"#,
            text
        ))
        .await;
        host.next().await;
    }
    drop(host);
    first.stop().await;

    assert_persisted(&path, &["second", "first"]);

    let second = start(BroadcastHub::load(Arc::new(JsonFileStore::new(&path)), loopback_host()).await).await;
    let mut peer = Peer::connect(second.control_addr).await;
    match peer.snapshots().await.0 {
        ServerMessage::LoadOldAnnouncements(list) => {
            let messages: Vec<_> = list.iter().map(|a| a.message.as_str()).collect();
            assert_eq!(messages, vec!["second", "first"]);
        }
        other => panic!("unexpected {:?}", other),
    }

    second.stop().await;
}

fn assert_persisted(path: &Path, expected: &[&str]) {
    let saved = JsonFileStore::new(path).load().unwrap();
    let messages: Vec<_> = saved.iter().map(|a| a.message.as_str()).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn test_restart_skips_malformed_records() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("announcements.json");
    std::fs::write(
        &path,
        r#"[
            {"id": "a", "message": "oldest", "timestamp": 1000},
            {"id": "b", "message": "newest", "timestamp": 3000},
            {"id": "c", "message": "", "timestamp": 4000},
            {"id": "d", "message": "middle", "timestamp": 2000}
        ]"#,
    )
    .unwrap();

    let hub = BroadcastHub::load(Arc::new(JsonFileStore::new(&path)), loopback_host()).await;
    let server = start(hub).await;

    let mut peer = Peer::connect(server.control_addr).await;
    match peer.snapshots().await {
        (ServerMessage::LoadOldAnnouncements(list), ServerMessage::LoadOldChatMessages(chat)) => {
            let messages: Vec<_> = list.iter().map(|a| a.message.as_str()).collect();
            assert_eq!(messages, vec!["newest", "middle", "oldest"]);
            assert!(chat.is_empty());
        }
        other => panic!("unexpected {:?}", other),
    }

    server.stop().await;
}
