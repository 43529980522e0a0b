use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tracing::{info, warn};

/// Shared shutdown flag flipped by the Ctrl-C handler and polled by the
/// reading loop.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is cancelled when the process receives Ctrl-C.
    pub fn on_ctrl_c() -> Self {
        let token = Self::new();
        let handler_token = token.clone();
        if let Err(err) = ctrlc::set_handler(move || {
            info!("Received Ctrl+C; stopping reading");
            handler_token.cancel();
        }) {
            warn!("Failed to install Ctrl+C signal handler: {err}");
        }
        token
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
