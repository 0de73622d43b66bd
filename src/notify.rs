//! Best-effort cycle notifications over UDP.
//!
//! One JSON datagram per completed cycle. No acknowledgement, no retry;
//! failures are logged and forgotten.

use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::NotifyConfig;
use crate::models::CycleNotification;

#[derive(Debug, Clone)]
pub struct Notifier {
    target: Option<(String, u16)>,
}

impl Notifier {
    pub fn new(config: &NotifyConfig) -> Self {
        Self {
            target: config.port.map(|port| (config.host.clone(), port)),
        }
    }

    /// A notifier that sends nothing.
    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub async fn notify(&self, note: &CycleNotification) {
        let Some((host, port)) = &self.target else {
            return;
        };

        if let Err(e) = send(host, *port, note).await {
            warn!("Cycle notification to {}:{} failed: {}", host, port, e);
        }
    }
}

async fn send(host: &str, port: u16, note: &CycleNotification) -> std::io::Result<()> {
    let payload = serde_json::to_vec(note)?;

    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.set_broadcast(true)?;
    socket.send_to(&payload, (host, port)).await?;

    debug!("Sent {} byte notification to {}:{}", payload.len(), host, port);
    Ok(())
}
