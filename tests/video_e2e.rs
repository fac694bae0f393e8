//! Video fan-out from a running server to several receivers over loopback UDP

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use vidcast::client::{ClientConfig, VideoReceiver};
use vidcast::media::{CompletedFrame, FrameSource, MemorySource};
use vidcast::server::{BroadcastHub, PrivilegedAddress, ServerConfig, VidcastServer};
use vidcast::store::MemoryStore;

const FRAME_COUNT: usize = 4;

/// Frame `i` is `100_000 + i` bytes of `i`, so it spans two packets
fn frames() -> Vec<Bytes> {
    (0..FRAME_COUNT)
        .map(|i| Bytes::from(vec![i as u8; 100_000 + i]))
        .collect()
}

async fn receiver(video_addr: std::net::SocketAddr, shutdown: &CancellationToken) -> VideoReceiver {
    let config = ClientConfig::default()
        .video_server_addr(video_addr)
        .video_listen_addr("127.0.0.1:0".parse().unwrap())
        .hello_interval(Duration::from_millis(100));
    VideoReceiver::bind(&config, shutdown).await.unwrap()
}

#[tokio::test]
async fn test_frames_fan_out_to_every_receiver() {
    let hub = BroadcastHub::new(
        Arc::new(MemoryStore::new()),
        Arc::new(PrivilegedAddress("127.0.0.1".parse().unwrap())),
    );
    let config = ServerConfig::default()
        .control_addr("127.0.0.1:0".parse().unwrap())
        .video_addr("127.0.0.1:0".parse().unwrap())
        .frame_rate(50)
        .shutdown_grace(Duration::from_millis(500));
    let server_shutdown = CancellationToken::new();
    let server = VidcastServer::bind(config, Arc::new(hub), server_shutdown.clone())
        .await
        .unwrap();
    let video_addr = server.video_addr().unwrap();
    let registry = Arc::clone(server.registry());

    let source: Box<dyn FrameSource> = Box::new(MemorySource::new(frames()));
    let server_task = tokio::spawn(server.run(Some(source)));

    let client_shutdown = CancellationToken::new();
    let mut inboxes = Vec::new();
    let mut tasks = Vec::new();
    for _ in 0..2 {
        let receiver = receiver(video_addr, &client_shutdown).await;
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = move |frame: CompletedFrame| {
            let _ = tx.send(frame);
        };
        tasks.push(tokio::spawn(receiver.run(sink, client_shutdown.clone())));
        inboxes.push(rx);
    }

    for inbox in &mut inboxes {
        let mut last_id = None;
        for _ in 0..3 {
            let frame = tokio::time::timeout(Duration::from_secs(10), inbox.recv())
                .await
                .expect("no frame within 10s")
                .unwrap();

            let expected = &frames()[frame.frame_id as usize % FRAME_COUNT];
            assert_eq!(&frame.data, expected);
            if let Some(last) = last_id {
                assert!(frame.frame_id > last, "frames must arrive in order");
            }
            last_id = Some(frame.frame_id);
        }
    }
    assert_eq!(registry.len().await, 2);

    client_shutdown.cancel();
    for task in tasks {
        let stats = task.await.unwrap();
        assert!(stats.frames_delivered >= 3);
        assert_eq!(stats.malformed_packets, 0);
    }

    server_shutdown.cancel();
    tokio_test::assert_ok!(server_task.await.unwrap());
}
