//! Demo vidcast client
//!
//! Connects to the control channel, prints announcements and chat as they
//! arrive and registers for video, printing the size of every reassembled
//! frame. Lines typed on stdin are sent as chat; `/announce <text>` asks
//! the server to create an announcement.
//!
//! Run with:
//!   cargo run --example demo_client
//!   cargo run --example demo_client -- --server 192.168.1.10 --name laptop
//!   cargo run --example demo_client -- --video-port 5002 --retry-forever

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use vidcast::client::{ClientConfig, ControlClient, ControlEvent, VideoReceiver};
use vidcast::media::CompletedFrame;

/// Announcement/chat client and video receiver
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address
    #[arg(long, default_value = "127.0.0.1")]
    server: IpAddr,

    /// Local UDP port for video; each client on a host needs its own
    #[arg(long, default_value_t = 5001)]
    video_port: u16,

    /// Name shown next to chat messages
    #[arg(long)]
    name: Option<String>,

    /// Keep reconnecting instead of giving up
    #[arg(long)]
    retry_forever: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vidcast=info".parse()?)
                .add_directive("demo_client=info".parse()?),
        )
        .init();

    let mut config = ClientConfig::for_server(args.server)
        .video_listen_addr(SocketAddr::new([0, 0, 0, 0].into(), args.video_port));
    if let Some(name) = &args.name {
        config = config.sender_name(name.as_str());
    }
    if args.retry_forever {
        config = config.retry_forever();
    }

    let shutdown = CancellationToken::new();

    let receiver = VideoReceiver::bind(&config, &shutdown).await?;
    println!("Receiving video on {}", receiver.local_addr()?);
    let video = tokio::spawn(receiver.run(
        |frame: CompletedFrame| println!("Frame {}: {} bytes", frame.frame_id, frame.data.len()),
        shutdown.clone(),
    ));

    let (client, mut events) = ControlClient::new(config);
    let client = Arc::new(client);
    let control = {
        let client = Arc::clone(&client);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { client.run(shutdown).await })
    };

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    println!("Type to chat, /announce <text> to announce, Ctrl+C to quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let result = match line.strip_prefix("/announce ") {
                    Some(text) => client.create_announcement(text).await,
                    None => client.send_chat(&line).await,
                };
                if let Err(e) = result {
                    println!("Not sent: {}", e);
                }
            }
        }
    }

    shutdown.cancel();
    let final_state = control.await?;
    let stats = video.await?;
    printer.abort();

    println!();
    println!("Control: {:?}", final_state);
    println!("Frames delivered: {}", stats.frames_delivered);
    println!("Frames purged:    {}", stats.frames_purged);
    println!("Malformed:        {}", stats.malformed_packets);
    Ok(())
}

fn print_event(event: &ControlEvent) {
    match event {
        ControlEvent::StateChanged(state) => println!("* {:?}", state),
        ControlEvent::Announcements(list) => {
            println!("--- {} announcements ---", list.len());
            for announcement in list {
                println!("[{}] {}", announcement.timestamp, announcement.message);
            }
        }
        ControlEvent::NewAnnouncement(announcement) => {
            println!("!!! {}", announcement.message)
        }
        ControlEvent::ChatHistory(history) => {
            println!("--- {} chat messages ---", history.len());
            for chat in history {
                println!("<{}> {}", chat.sender, chat.message);
            }
        }
        ControlEvent::Chat(chat) => println!("<{}> {}", chat.sender, chat.message),
        ControlEvent::AnnouncementError(message) => println!("Announcement refused: {}", message),
        ControlEvent::ServerError(message) => println!("Server error: {}", message),
        ControlEvent::ConnectionLost => println!("* Connection lost, retrying"),
    }
}
