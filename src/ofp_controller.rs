use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::ofp_device::{Device, DeviceEvent, SessionConfig};

/// OpenFlow Controller
///
/// Owns one task per switch connection. Sessions share nothing but the
/// cancellation token; a failing session never affects its siblings.
pub struct DeviceManager {
    config: SessionConfig,
    events: mpsc::Sender<DeviceEvent>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    next_session: u64,
}

impl DeviceManager {
    pub fn new(config: SessionConfig,
               events: mpsc::Sender<DeviceEvent>,
               cancel: CancellationToken)
               -> DeviceManager {
        DeviceManager {
            config,
            events,
            cancel,
            tasks: JoinSet::new(),
            next_session: 0,
        }
    }

    /// Start a session on `conn` and return its id.
    pub fn spawn<T>(&mut self, conn: T) -> u64
        where T: AsyncRead + AsyncWrite + Unpin + Send + 'static
    {
        self.next_session += 1;
        let session = self.next_session;
        let device = Device::new(session,
                                 conn,
                                 self.events.clone(),
                                 self.cancel.child_token(),
                                 self.config.clone());
        let span = tracing::info_span!("device", session, dpid = tracing::field::Empty);
        self.tasks.spawn(async move {
                             match device.run().await {
                                 Ok(()) => tracing::debug!("session finished"),
                                 Err(e) => tracing::warn!(error = %e, "session failed"),
                             }
                         }
                         .instrument(span));
        session
    }

    /// Number of sessions still running. Finished sessions are reaped.
    pub fn active(&mut self) -> usize {
        while let Some(res) = self.tasks.try_join_next() {
            if let Err(e) = res {
                if e.is_panic() {
                    tracing::error!(error = %e, "session panicked");
                }
            }
        }
        self.tasks.len()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel every session and wait up to `grace` for them to close.
    ///
    /// Sessions still running afterward are aborted; their count is returned.
    pub async fn shutdown(mut self, grace: Duration) -> usize {
        self.cancel.cancel();
        let tasks = &mut self.tasks;
        let drained = tokio::time::timeout(grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
        if drained.is_ok() {
            tracing::info!("all sessions closed");
            return 0;
        }

        let stragglers = self.tasks.len();
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        tracing::warn!(aborted = stragglers, "sessions aborted after grace period");
        stragglers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_assigns_fresh_ids() {
        let (events, _rx) = mpsc::channel(8);
        let mut manager = DeviceManager::new(SessionConfig::default(), events, CancellationToken::new());
        let (_a, conn_a) = tokio::io::duplex(64);
        let (_b, conn_b) = tokio::io::duplex(64);
        assert_eq!(manager.spawn(conn_a), 1);
        assert_eq!(manager.spawn(conn_b), 2);
        assert_eq!(manager.active(), 2);
        assert_eq!(manager.shutdown(Duration::from_secs(1)).await, 0);
    }

    #[tokio::test]
    async fn peer_eof_is_reaped() {
        let (events, _rx) = mpsc::channel(8);
        let mut manager = DeviceManager::new(SessionConfig::default(), events, CancellationToken::new());
        let (switch, conn) = tokio::io::duplex(64);
        manager.spawn(conn);
        drop(switch);
        for _ in 0..100 {
            if manager.active() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(manager.active(), 0);
    }

    #[tokio::test]
    async fn external_cancel_stops_sessions() {
        let (events, _rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let mut manager = DeviceManager::new(SessionConfig::default(), events, cancel.clone());
        let (_switch, conn) = tokio::io::duplex(64);
        manager.spawn(conn);
        assert!(!manager.cancellation_token().is_cancelled());
        cancel.cancel();
        assert_eq!(manager.shutdown(Duration::from_secs(1)).await, 0);
    }
}
