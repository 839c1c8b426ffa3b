use super::{ComponentState, ParcelwatchOrchestrator};
use crate::error::Result;
use tracing::{error, info};
#[cfg(feature = "keyboard")]
use crate::error::ParcelwatchError;
#[cfg(feature = "keyboard")]
use std::time::Duration;
#[cfg(feature = "keyboard")]
use tokio::time::timeout;

impl ParcelwatchOrchestrator {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        // Cancel all background tasks
        self.cancellation_token.cancel();

        let mut exit_code = 0;

        // Stop components in reverse start order
        if self.keyboard_enabled {
            if let Err(e) = self.stop_component("keyboard").await {
                error!("Error stopping keyboard: {}", e);
                exit_code = 1;
            }
        }

        for component in ["remote", "motion", "climate"] {
            if self.get_component_state(component).await.is_none() {
                continue;
            }
            if let Err(e) = self.stop_component(component).await {
                error!("Error stopping {}: {}", component, e);
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop a specific component
    async fn stop_component(&mut self, component: &str) -> Result<()> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match component {
            #[cfg(feature = "keyboard")]
            "keyboard" => {
                let result = match &self.keyboard_handler {
                    Some(handler) => match timeout(Duration::from_secs(2), handler.stop()).await {
                        Ok(result) => result,
                        Err(_) => Err(ParcelwatchError::component(
                            component.to_string(),
                            format!("{} component stop timeout", component),
                        )),
                    },
                    None => Ok(()),
                };
                self.finish_stop(component, result).await
            }
            // Sensors and the remote store hold no background work; every
            // call they make completes inside its scheduler task.
            _ => self.finish_stop(component, Ok(())).await,
        }
    }

    async fn finish_stop(&self, component: &str, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Err(e) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Error stopping {} component: {}", component, e);
                Err(e)
            }
        }
    }
}
