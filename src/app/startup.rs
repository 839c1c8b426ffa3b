use super::{ComponentState, ParcelwatchOrchestrator};
use crate::error::Result;
use tracing::{error, info, warn};

impl ParcelwatchOrchestrator {
    /// Initialize all system components
    pub async fn initialize(&mut self) -> Result<()> {
        info!(
            "Initializing parcelwatch {} for {}",
            self.config.device.firmware_version,
            self.identity()
        );

        // Set initial component states
        let mut states = self.component_states.lock().await;
        if self.climate.is_some() {
            states.insert("climate".to_string(), ComponentState::Stopped);
        }
        if self.motion.is_some() {
            states.insert("motion".to_string(), ComponentState::Stopped);
        }
        states.insert("remote".to_string(), ComponentState::Stopped);

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }

        drop(states);

        info!("All components initialized successfully");
        Ok(())
    }

    /// Start all system components. Missing sensors and an unreachable
    /// remote store degrade the engine but never stop it.
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting parcelwatch");

        self.start_sensors().await;

        let connected = self.network.is_connected();
        self.context.set_network_connected(connected);
        if !connected {
            warn!("Network is down, registration deferred until it returns");
        }

        self.set_component_state("remote", ComponentState::Starting)
            .await;
        if !self.attempt_registration().await {
            warn!(
                "Device not registered yet, retrying every {} ms",
                self.context.timers.liveness.interval_ms()
            );
        }

        self.start_keyboard().await?;

        info!("parcelwatch started");
        Ok(())
    }

    async fn start_sensors(&mut self) {
        if let Some(climate) = self.climate.as_mut() {
            let result = climate.begin();
            self.record_sensor_start("climate", result).await;
        } else {
            info!("Climate sensor disabled");
        }

        if let Some(motion) = self.motion.as_mut() {
            let result = motion.begin();
            self.record_sensor_start("motion", result).await;
        } else {
            info!("Motion sensor disabled");
        }
    }

    async fn record_sensor_start(
        &self,
        component: &str,
        result: std::result::Result<(), crate::error::SensorError>,
    ) {
        match result {
            Ok(()) => {
                self.set_component_state(component, ComponentState::Running)
                    .await;
                info!("{} sensor started successfully", component);
            }
            Err(e) => {
                // Keep sampling: readings stay invalid until the sensor answers
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                error!("Failed to start {} sensor: {}", component, e);
            }
        }
    }

    #[cfg(feature = "keyboard")]
    async fn start_keyboard(&mut self) -> Result<()> {
        if !self.keyboard_enabled {
            return Ok(());
        }

        if let Some(keyboard_handler) = &self.keyboard_handler {
            self.set_component_state("keyboard", ComponentState::Starting)
                .await;

            keyboard_handler.start().await.map_err(|e| {
                error!("Failed to start keyboard input handler: {}", e);
                e
            })?;

            self.set_component_state("keyboard", ComponentState::Running)
                .await;
            info!("Keyboard input handler started successfully");
        } else {
            warn!("Keyboard control requested but no simulated hardware to steer");
            self.set_component_state("keyboard", ComponentState::Failed)
                .await;
        }

        Ok(())
    }

    #[cfg(not(feature = "keyboard"))]
    async fn start_keyboard(&mut self) -> Result<()> {
        if self.keyboard_enabled {
            warn!("Keyboard control requested but the keyboard feature is not compiled in");
            self.set_component_state("keyboard", ComponentState::Failed)
                .await;
        }
        Ok(())
    }
}
