use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
    time::Duration,
};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::providers::relay::RelayClient;

/// Periodic `/health` ping against the relay, alive from [`KeepAlive::start`]
/// until [`KeepAlive::stop`] or drop. Records whether the last ping succeeded.
pub struct KeepAlive {
    cancel: CancellationToken,
    online: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeepAlive {
    pub fn start(client: RelayClient, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let online = Arc::new(AtomicBool::new(true));

        let stop_signal = cancel.clone();
        let online_flag = Arc::clone(&online);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop_signal.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let result = tokio::select! {
                    _ = stop_signal.cancelled() => break,
                    result = client.ping() => result,
                };
                match result {
                    Ok(()) => online_flag.store(true, AtomicOrdering::Relaxed),
                    Err(err) => {
                        tracing::warn!(error = %err, relay = client.base_url(), "keep-alive ping failed");
                        online_flag.store(false, AtomicOrdering::Relaxed);
                    }
                }
            }
            tracing::debug!("keep-alive stopped");
        });

        Self {
            cancel,
            online,
            handle: Some(handle),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(AtomicOrdering::Relaxed)
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
