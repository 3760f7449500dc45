//! Minimal OpenFlow controller: accepts switches, logs their traffic and asks each
//! one for its description once connected.

use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ofp_core::ofp_message::Message;
use ofp_core::{DeviceEvent, DeviceManager, SessionConfig};

#[derive(Parser)]
#[command(name = "ofp_controller", about = "OpenFlow 1.0/1.3 controller")]
struct Cli {
    /// Address to accept switch connections on
    #[arg(short, long, default_value = "0.0.0.0:6653")]
    listen: String,

    /// Seconds to wait for sessions to close on shutdown
    #[arg(long, default_value_t = 5)]
    grace: u64,

    /// Seconds allowed for HELLO through FEATURES_REPLY
    #[arg(long, default_value_t = 10)]
    handshake_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ofp_core=info,ofp_controller=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = SessionConfig {
        handshake_timeout: Duration::from_secs(cli.handshake_timeout),
        ..Default::default()
    };

    let listener = TcpListener::bind(&cli.listen).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening for switches");

    let cancel = CancellationToken::new();
    let (events_tx, events_rx) = mpsc::channel(1024);
    let mut manager = DeviceManager::new(config, events_tx, cancel.clone());
    let consumer = tokio::spawn(consume(events_rx));

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }
                    let session = manager.spawn(stream);
                    tracing::info!(session, %peer, active = manager.active(), "switch connected");
                }
                Err(e) => tracing::warn!(error = %e, "accept failed"),
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }

    let aborted = manager.shutdown(Duration::from_secs(cli.grace)).await;
    consumer.await?;
    tracing::info!(aborted, "shutdown complete");
    Ok(())
}

/// Log every event; ask each new switch for its description.
async fn consume(mut events: mpsc::Receiver<DeviceEvent>) {
    let mut next_xid: u32 = 0x1000;
    while let Some(event) = events.recv().await {
        match event {
            DeviceEvent::Connected { session, version, identity, handle } => {
                tracing::info!(session,
                               version,
                               dpid = format!("{:016x}", identity.datapath_id).as_str(),
                               "switch established");
                next_xid = next_xid.wrapping_add(1);
                let request = handle.protocol().desc_request(next_xid);
                if let Err(e) = handle.send(request).await {
                    tracing::warn!(session, error = %e, "description request not sent");
                }
            }
            DeviceEvent::Message { session, xid, message: Message::DescReply(desc) } => {
                tracing::info!(session,
                               xid,
                               manufacturer = desc.manufacturer.as_str(),
                               hardware = desc.hardware.as_str(),
                               software = desc.software.as_str(),
                               "switch description");
            }
            DeviceEvent::Message { session, xid, message } => {
                tracing::debug!(session, xid, kind = message.kind(), "switch message");
            }
            DeviceEvent::Disconnected { session, datapath_id, reason } => {
                tracing::info!(session,
                               dpid = format!("{:016x}", datapath_id).as_str(),
                               reason = reason.as_str(),
                               "switch disconnected");
            }
        }
    }
}
