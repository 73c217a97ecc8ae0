//! Background heartbeats for an open session

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{ClientError, LicenseClient, SessionResponse};

/// Why a heartbeat task ended
#[derive(Debug)]
pub enum KeepAliveExit {
    /// Stopped by its owner
    Stopped,
    /// The server no longer knows the session
    SessionLost,
    /// A heartbeat could not be delivered
    RequestFailed(ClientError),
    /// The task panicked or was cancelled
    Aborted,
}

/// Handle to a running heartbeat task.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct KeepAlive {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<KeepAliveExit>,
}

impl KeepAlive {
    /// Heartbeat cadence, half the server's default alive period
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

    /// Start sending heartbeats for `session_id` every `interval`.
    ///
    /// The first heartbeat goes out one interval after spawning. The task
    /// exits on the first `NotFound` or failed request.
    pub fn spawn(client: Arc<LicenseClient>, session_id: String, interval: Duration) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match client.keep_alive(&session_id).await {
                            Ok(SessionResponse::Ok) => {
                                debug!(session_id = %session_id, "Heartbeat accepted");
                            }
                            Ok(SessionResponse::NotFound) => {
                                warn!(session_id = %session_id, "Session lost");
                                return KeepAliveExit::SessionLost;
                            }
                            Err(e) => {
                                warn!(session_id = %session_id, error = %e, "Heartbeat failed");
                                return KeepAliveExit::RequestFailed(e);
                            }
                        }
                    }
                    _ = &mut stop_rx => {
                        info!(session_id = %session_id, "Heartbeats stopped");
                        return KeepAliveExit::Stopped;
                    }
                }
            }
        });

        Self {
            stop: Some(stop_tx),
            handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop heartbeats and wait for the task to exit
    pub async fn stop(mut self) -> KeepAliveExit {
        if let Some(stop) = self.stop.take() {
            // The task may already have exited on its own
            let _ = stop.send(());
        }
        self.join().await
    }

    /// Wait for the task to exit on its own
    pub async fn wait(self) -> KeepAliveExit {
        self.join().await
    }

    async fn join(self) -> KeepAliveExit {
        let Self { stop, handle } = self;
        let exit = handle.await.unwrap_or(KeepAliveExit::Aborted);
        drop(stop);
        exit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryPolicy;

    fn unreachable_client() -> Arc<LicenseClient> {
        Arc::new(
            LicenseClient::new("http://127.0.0.1:9")
                .unwrap()
                .with_retry(RetryPolicy::no_retry()),
        )
    }

    #[tokio::test]
    async fn stop_before_first_heartbeat() {
        let keepalive = KeepAlive::spawn(
            unreachable_client(),
            "1:0:abc".to_string(),
            Duration::from_secs(60),
        );
        assert!(!keepalive.is_finished());
        assert!(matches!(keepalive.stop().await, KeepAliveExit::Stopped));
    }

    #[tokio::test]
    async fn failed_heartbeat_ends_task() {
        let keepalive = KeepAlive::spawn(
            unreachable_client(),
            "1:0:abc".to_string(),
            Duration::from_millis(10),
        );
        assert!(matches!(
            keepalive.wait().await,
            KeepAliveExit::RequestFailed(ClientError::RequestFailed { attempts: 1, .. })
        ));
    }
}
