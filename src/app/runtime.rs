use super::{ParcelwatchOrchestrator, ShutdownReason};
use crate::error::{EventBusError, ParcelwatchError, Result};
use crate::events::ParcelEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

impl ParcelwatchOrchestrator {
    /// Run the scheduler loop with signal handling until shutdown
    pub async fn run(&mut self) -> Result<i32> {
        info!("parcelwatch is running");

        // Set up signal handling for graceful shutdown
        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| ParcelwatchError::system("Shutdown sender already taken"))?;

        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| ParcelwatchError::system("Shutdown receiver already taken"))?;

        // Spawn signal handlers
        self.setup_signal_handlers(shutdown_sender).await;

        let shutdown_reason = self.run_loop(&mut shutdown_receiver).await;
        info!("Shutdown initiated: {:?}", shutdown_reason);

        // Perform graceful shutdown
        let exit_code = self.shutdown().await?;

        info!("parcelwatch shutdown complete");
        Ok(exit_code)
    }

    /// Tick until a shutdown source fires. Each iteration runs every due task
    /// to completion before the loop sleeps for the poll interval.
    pub(super) async fn run_loop(
        &mut self,
        shutdown_receiver: &mut oneshot::Receiver<ShutdownReason>,
    ) -> ShutdownReason {
        let poll = Duration::from_millis(self.config.schedule.poll_interval_ms);
        let deadline = self
            .config
            .system
            .run_for_seconds
            .map(|secs| self.clock.monotonic_ms().saturating_add(secs.saturating_mul(1000)));

        loop {
            if let Some(reason) = self.pending_shutdown_request() {
                return reason;
            }

            if let Some(deadline) = deadline {
                if self.clock.monotonic_ms() >= deadline {
                    info!("Run limit reached");
                    return ShutdownReason::RunLimit;
                }
            }

            self.tick().await;

            tokio::select! {
                reason = &mut *shutdown_receiver => {
                    return reason.unwrap_or_else(|_| {
                        ShutdownReason::Error("Shutdown channel closed unexpectedly".to_string())
                    });
                }
                _ = self.cancellation_token.cancelled() => {
                    return ShutdownReason::UserRequest;
                }
                _ = tokio::time::sleep(poll) => {}
            }
        }
    }

    /// Drain the event bus for shutdown requests published by other
    /// components (the keyboard handler)
    pub(super) fn pending_shutdown_request(&mut self) -> Option<ShutdownReason> {
        loop {
            match self.shutdown_requests.try_recv() {
                Ok(Some(ParcelEvent::ShutdownRequested { reason, .. })) => {
                    info!("Shutdown requested: {}", reason);
                    return Some(ShutdownReason::UserRequest);
                }
                Ok(Some(_)) => continue,
                Ok(None) => return None,
                Err(EventBusError::Lagged { skipped }) => {
                    debug!("Skipped {} events while polling for shutdown", skipped);
                    continue;
                }
                Err(e) => {
                    error!("Shutdown request channel failed: {}", e);
                    return Some(ShutdownReason::Error(e.to_string()));
                }
            }
        }
    }

    /// Set up signal handlers for graceful shutdown
    async fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::spawn(async move {
                        if let Some(()) = sigterm.recv().await {
                            info!("Received SIGTERM signal");
                            if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                                let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                            }
                        }
                    });
                }
                Err(e) => warn!("Failed to register SIGTERM handler: {}", e),
            }
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
