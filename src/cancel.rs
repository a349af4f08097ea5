//! Cooperative cancellation.
//!
//! The executor checks the token before starting each package. Commands
//! already running are never killed by cancellation; they finish or hit
//! their timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Cancel `token` on the first Ctrl-C; exit immediately on the second.
///
/// Must be called from within a tokio runtime.
pub fn install_interrupt_handler(token: CancelToken) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Unable to listen for Ctrl-C; interrupts will not be graceful");
                return;
            }
            if token.is_cancelled() {
                std::process::exit(130);
            }
            token.cancel();
            eprintln!("\nInterrupt received, finishing in-flight steps (press Ctrl-C again to abort)...");
        }
    });
}
