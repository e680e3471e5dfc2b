//! Cooperative shutdown.
//!
//! The pipeline checks [`ShutdownCoordinator::is_shutdown_requested`] before offering each new
//! unit. Units already in flight finish and persist, so stopping never leaves a half-written
//! output behind.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Shared handle to a shutdown coordinator.
pub type SharedShutdown = Arc<ShutdownCoordinator>;

/// Stop flag shared by the driver and the signal handler.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    requested: AtomicBool,
}

impl ShutdownCoordinator {
    /// New coordinator wrapped in [`Arc`].
    pub fn shared() -> SharedShutdown {
        Arc::new(Self::default())
    }

    /// Ask the run to stop after the units in flight. Idempotent.
    pub fn request_shutdown(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Spawn a task that requests shutdown on the first Ctrl+C.
pub fn install_ctrl_c_handler(shutdown: SharedShutdown) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received, finishing units in flight");
            shutdown.request_shutdown();
        }
    });
}
