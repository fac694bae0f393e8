//! Demo vidcast server
//!
//! Serves announcements and chat on the control port and, when given a
//! directory of pre-encoded frame files, streams them in a loop to every
//! receiver that says hello on the video port.
//!
//! Run with:
//!   cargo run --example demo_server
//!   cargo run --example demo_server -- --frames ./frames --fps 30
//!   cargo run --example demo_server -- --host-ip 192.168.1.10 --store /tmp/announcements.json
//!
//! Then start one or more clients with `cargo run --example demo_client`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use vidcast::media::{DirectorySource, FrameSource};
use vidcast::server::{BroadcastHub, ServerConfig, VidcastServer};
use vidcast::store::JsonFileStore;

/// Announcement/chat hub and UDP video fan-out
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Control channel bind address
    #[arg(long, default_value = "0.0.0.0:4000")]
    control: SocketAddr,

    /// Video/handshake bind address
    #[arg(long, default_value = "0.0.0.0:5000")]
    video: SocketAddr,

    /// The only address allowed to create announcements
    #[arg(long, default_value = "127.0.0.1")]
    host_ip: IpAddr,

    /// Announcement file
    #[arg(long, default_value = "announcements.json")]
    store: PathBuf,

    /// Directory of encoded frame files, sent in name order
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Payload bytes per video packet
    #[arg(long, default_value_t = 65_000)]
    chunk_size: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vidcast=info".parse()?)
                .add_directive("demo_server=info".parse()?),
        )
        .init();

    let config = ServerConfig::default()
        .control_addr(args.control)
        .video_addr(args.video)
        .privileged_ip(args.host_ip)
        .frame_rate(args.fps)
        .chunk_size(args.chunk_size);

    let source: Option<Box<dyn FrameSource>> = match &args.frames {
        Some(dir) => {
            let source = DirectorySource::open(dir)?;
            println!("Streaming {} frames from {}", source.len(), dir.display());
            Some(Box::new(source))
        }
        None => {
            println!("No --frames directory given, video is disabled");
            None
        }
    };

    let hub = BroadcastHub::load_for(Arc::new(JsonFileStore::new(args.store.clone())), &config).await;
    println!(
        "Loaded {} announcements from {}",
        hub.announcements().await.len(),
        args.store.display()
    );

    let server = VidcastServer::bind(config, Arc::new(hub), CancellationToken::new()).await?;
    println!("Control: {}", server.control_addr()?);
    println!("Video:   {}", server.video_addr()?);
    println!("Host:    {}", args.host_ip);
    println!();
    println!("Press Ctrl+C to stop");

    server
        .run_until(source, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
