//! Scheduled tasks run by the orchestrator loop.

use super::types::CycleReport;
use super::{ComponentState, ParcelwatchOrchestrator};
use crate::classifier::classify;
use crate::device::DeviceStatus;
use crate::events::ParcelEvent;
use crate::network::NetworkInfo;
use crate::reading::{ClimateReading, MotionReading, SensorReading};
use crate::telemetry::{AlertCycle, TelemetrySnapshot};
use std::time::SystemTime;
use tracing::{debug, info, warn};

impl ParcelwatchOrchestrator {
    /// One scheduler iteration. Every timer is checked against the monotonic
    /// time taken once at the start of the iteration.
    pub async fn tick(&mut self) {
        let now = self.clock.monotonic_ms();
        self.watch_network().await;

        if self.context.timers.sample.fire(now) {
            self.sample_sensors().await;
        }

        if self.context.network_connected {
            if self.context.timers.upload.fire(now) {
                self.upload_cycle(now).await;
            }

            if self.context.timers.liveness.fire(now) {
                self.liveness_task().await;
            }

            if self.context.timers.assignment.fire(now) {
                self.assignment_task().await;
            }
        }

        if self.context.timers.report.fire(now) {
            self.report_health(now).await;
        }
    }

    /// Register, sample once and run one upload plus alert evaluation
    pub async fn run_single_cycle(&mut self) -> CycleReport {
        let now = self.clock.monotonic_ms();
        self.watch_network().await;

        if !self.reconciler.is_registered() && self.context.network_connected {
            self.attempt_registration().await;
        }

        self.sample_sensors().await;

        let cycle = if self.context.network_connected {
            self.upload_cycle(now).await
        } else {
            warn!("Network is down, skipping upload");
            None
        };

        CycleReport {
            reading: self.context.reading,
            registered: self.reconciler.is_registered(),
            uploaded: cycle.is_some(),
            alerts: cycle.map(|c| c.sent).unwrap_or_default(),
        }
    }

    /// Publish an event and fold it into the health counters
    pub(super) async fn emit(&mut self, event: ParcelEvent) {
        self.metrics.record_event(&event);
        if let Err(e) = self.event_bus.publish(event).await {
            debug!("Event not delivered: {}", e);
        }
    }

    async fn watch_network(&mut self) {
        let connected = self.network.is_connected();
        if self.context.set_network_connected(connected) {
            if connected {
                info!("Network connected ({})", self.network.ssid());
            } else {
                warn!("Network disconnected, pausing remote tasks");
            }
            self.emit(ParcelEvent::NetworkStatusChanged {
                connected,
                timestamp: SystemTime::now(),
            })
            .await;
        }
    }

    pub(super) async fn sample_sensors(&mut self) {
        let climate = match self.climate.as_mut() {
            Some(source) => source.sample(),
            None => ClimateReading::default(),
        };
        let motion = match self.motion.as_mut() {
            Some(source) => source.sample(),
            None => MotionReading::default(),
        };

        self.context.reading = SensorReading { climate, motion };
        let state = classify(&motion, self.context.thresholds.vibration);

        debug!(
            "Sampled: climate valid={}, orientation={}, |a|={:.2}",
            climate.valid,
            state.orientation,
            state.total_acceleration.unwrap_or_default()
        );

        self.emit(ParcelEvent::ReadingSampled {
            temperature: climate.temperature,
            humidity: climate.humidity,
            climate_valid: climate.valid,
            orientation: state.orientation,
            vibration: state.vibration,
            timestamp: SystemTime::now(),
        })
        .await;
    }

    /// Upload the latest reading; on success fetch thresholds and post alerts.
    /// Uploads wait until the device has been registered.
    pub(super) async fn upload_cycle(&mut self, now: u64) -> Option<AlertCycle> {
        if !self.reconciler.is_registered() {
            debug!("Skipping upload until the device is registered");
            return None;
        }

        let reading = self.context.reading;
        let epoch = self.clock.epoch_ms();
        let snapshot = TelemetrySnapshot::from_reading(
            &reading,
            self.context.thresholds.vibration,
            self.network.ssid(),
            self.network.rssi(),
            epoch,
        );

        if let Err(e) = self.uploader.upload(&snapshot).await {
            warn!("Upload failed, retrying next cycle: {}", e);
            self.mark_remote(false).await;
            self.emit(ParcelEvent::UploadCompleted {
                success: false,
                timestamp: SystemTime::now(),
            })
            .await;
            return None;
        }

        self.mark_remote(true).await;
        self.emit(ParcelEvent::UploadCompleted {
            success: true,
            timestamp: SystemTime::now(),
        })
        .await;

        let cycle = self.uploader.run_alert_cycle(&reading, epoch, now).await;
        if cycle.thresholds != self.context.thresholds {
            info!("Effective thresholds changed: {:?}", cycle.thresholds);
            self.context.thresholds = cycle.thresholds;
        }

        for (alert, delivered) in &cycle.sent {
            self.emit(ParcelEvent::AlertRaised {
                alert: alert.clone(),
                delivered: *delivered,
            })
            .await;
        }

        Some(cycle)
    }

    /// Registered devices bump `lastSeen`; unregistered ones retry registration
    async fn liveness_task(&mut self) {
        if !self.reconciler.is_registered() {
            self.attempt_registration().await;
            return;
        }

        match self.reconciler.refresh_liveness(self.clock.epoch_ms()).await {
            Ok(()) => self.mark_remote(true).await,
            Err(e) => {
                warn!("Liveness refresh failed: {}", e);
                self.mark_remote(false).await;
            }
        }
    }

    async fn assignment_task(&mut self) {
        if !self.reconciler.is_registered() {
            return;
        }

        match self.reconciler.refresh_assignment().await {
            Ok(Some(status)) => {
                self.mark_remote(true).await;
                self.update_device_status(status).await;
            }
            Ok(None) => self.mark_remote(true).await,
            Err(e) => {
                warn!("Assignment refresh failed: {}", e);
                self.mark_remote(false).await;
            }
        }
    }

    /// Run the registration read-merge-write. Returns whether it succeeded.
    pub(super) async fn attempt_registration(&mut self) -> bool {
        if !self.network.is_connected() {
            debug!("Network down, registration deferred");
            return false;
        }

        let network =
            NetworkInfo::from_link(self.network.as_ref(), &self.config.device.mdns_hostname);
        match self.reconciler.register(network, self.clock.epoch_ms()).await {
            Ok(record) => {
                self.mark_remote(true).await;
                self.update_device_status(record.status).await;
                true
            }
            Err(e) => {
                warn!("Registration failed: {}", e);
                self.mark_remote(false).await;
                false
            }
        }
    }

    async fn update_device_status(&mut self, status: DeviceStatus) {
        if self.context.device_status == Some(status) {
            return;
        }

        self.context.device_status = Some(status);
        info!("Status indicator: {}", status.indicator());
        self.emit(ParcelEvent::DeviceStatusChanged {
            status,
            timestamp: SystemTime::now(),
        })
        .await;
    }

    async fn mark_remote(&mut self, available: bool) {
        let state = if available {
            ComponentState::Running
        } else {
            ComponentState::Failed
        };
        self.set_component_state("remote", state).await;

        if !self.context.set_remote_available(available) {
            return;
        }

        self.emit(ParcelEvent::RemoteAvailabilityChanged {
            reachable: available,
            timestamp: SystemTime::now(),
        })
        .await;
    }

    async fn report_health(&mut self, now: u64) {
        let reading = self.context.reading;
        let climate = match reading.climate.usable() {
            Some((t, h)) => format!("{:.1}°C {:.1}%", t, h),
            None => "invalid".to_string(),
        };
        let motion = classify(&reading.motion, self.context.thresholds.vibration);

        info!(
            "Health: up {}s, climate {}, {}, {} samples, uploads {} ok / {} failed, {} alerts ({} undelivered), remote {}, {}",
            self.context.uptime_ms(now) / 1000,
            climate,
            motion.orientation,
            self.metrics.count("reading_sampled"),
            self.metrics.uploads_ok,
            self.metrics.uploads_failed,
            self.metrics.alerts_raised,
            self.metrics.alerts_undelivered,
            if self.context.remote_available { "reachable" } else { "unreachable" },
            self.context
                .device_status
                .map(|s| s.indicator())
                .unwrap_or("Unregistered"),
        );

        for (component, state) in self.get_all_component_states().await {
            debug!("  {}: {:?}", component, state);
        }
    }
}
