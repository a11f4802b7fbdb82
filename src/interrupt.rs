use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One Ctrl-C listener per command session. Fetches take child tokens from
/// [`Interrupt::token`]; the listener task is aborted when this is dropped.
pub struct Interrupt {
    session: CancellationToken,
    listener: JoinHandle<()>,
}

impl Interrupt {
    pub fn listen() -> Self {
        let session = CancellationToken::new();
        let trigger = session.clone();
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("interrupted");
                trigger.cancel();
            }
        });
        Self { session, listener }
    }

    /// Token for a single fetch; cancelled with the session.
    pub fn token(&self) -> CancellationToken {
        self.session.child_token()
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
