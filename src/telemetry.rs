//! Telemetry upload: the `current` snapshot, its `history` copy, and the
//! alert cycle that follows a successful upload.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::alerts::{evaluate, AlertEvent, AlertGate};
use crate::classifier::{classify, Orientation};
use crate::clock::epoch_string;
use crate::error::StoreError;
use crate::reading::{SensorReading, Vector3};
use crate::store::DeviceStore;
use crate::thresholds::{ThresholdResolver, ThresholdSet};

/// Operating state reported in every snapshot
pub const MONITORING_STATE: &str = "Monitoring";

/// Document written to `<device>/current` and appended to `<device>/history`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    #[serde(with = "epoch_string")]
    pub timestamp: u64,
    pub state: String,
    pub temperature: f64,
    pub humidity: f64,
    pub heat_index: f64,
    pub accel_x: f64,
    pub accel_y: f64,
    pub accel_z: f64,
    pub gyro_x: f64,
    pub gyro_y: f64,
    pub gyro_z: f64,
    pub orientation: Orientation,
    pub vibration: bool,
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: String,
    #[serde(rename = "wifiRSSI")]
    pub wifi_rssi: i32,
}

fn round_to(value: f32, scale: f64) -> f64 {
    (value as f64 * scale).round() / scale
}

impl TelemetrySnapshot {
    /// Build a snapshot. Climate values carry 0.1 precision and motion values
    /// 0.01; a family that is not currently usable reports zeros.
    pub fn from_reading(
        reading: &SensorReading,
        vibration_threshold: f32,
        wifi_ssid: String,
        wifi_rssi: i32,
        timestamp: u64,
    ) -> Self {
        let (temperature, humidity, heat_index) = match reading.climate.usable() {
            Some((t, h)) => (
                round_to(t, 10.0),
                round_to(h, 10.0),
                round_to(reading.climate.heat_index.unwrap_or(t), 10.0),
            ),
            None => (0.0, 0.0, 0.0),
        };

        let motion = classify(&reading.motion, vibration_threshold);
        let (accel, gyro) = match reading.motion.usable_accel() {
            Some(accel) => (accel, reading.motion.gyro.unwrap_or_default()),
            None => (Vector3::default(), Vector3::default()),
        };

        Self {
            timestamp,
            state: MONITORING_STATE.to_string(),
            temperature,
            humidity,
            heat_index,
            accel_x: round_to(accel.x, 100.0),
            accel_y: round_to(accel.y, 100.0),
            accel_z: round_to(accel.z, 100.0),
            gyro_x: round_to(gyro.x, 100.0),
            gyro_y: round_to(gyro.y, 100.0),
            gyro_z: round_to(gyro.z, 100.0),
            orientation: motion.orientation,
            vibration: motion.vibration,
            wifi_ssid,
            wifi_rssi,
        }
    }
}

/// Outcome of one alert cycle
#[derive(Debug, Clone)]
pub struct AlertCycle {
    pub thresholds: ThresholdSet,
    /// Alerts that passed the gate, with whether the post succeeded
    pub sent: Vec<(AlertEvent, bool)>,
}

pub struct TelemetryUploader {
    store: DeviceStore,
    resolver: ThresholdResolver,
    gate: AlertGate,
}

impl TelemetryUploader {
    pub fn new(store: DeviceStore, resolver: ThresholdResolver, gate: AlertGate) -> Self {
        Self {
            store,
            resolver,
            gate,
        }
    }

    /// Write `current`, then `history`, then `info/lastSeen`. Only the
    /// `current` write decides the outcome; the follow-up writes are skipped
    /// when it fails.
    pub async fn upload(&self, snapshot: &TelemetrySnapshot) -> Result<(), StoreError> {
        let paths = self.store.paths().clone();
        let body = serde_json::to_value(snapshot).map_err(|e| StoreError::Malformed {
            path: paths.current(),
            details: e.to_string(),
        })?;

        self.store.put(&paths.current(), &body).await?;
        debug!("Snapshot uploaded");

        if let Err(e) = self.store.post(&paths.history(), &body).await {
            warn!("History append failed: {}", e);
        }

        let last_seen = serde_json::Value::String(snapshot.timestamp.to_string());
        if let Err(e) = self.store.put(&paths.last_seen(), &last_seen).await {
            warn!("lastSeen update failed: {}", e);
        }

        Ok(())
    }

    /// Fetch the override thresholds, evaluate the reading and post every
    /// alert admitted by the gate exactly once.
    pub async fn run_alert_cycle(
        &mut self,
        reading: &SensorReading,
        epoch_ms: u64,
        monotonic_ms: u64,
    ) -> AlertCycle {
        let path = self.store.paths().thresholds();
        let thresholds = match self.store.get(&path).await {
            Ok(Some(doc)) => self.resolver.resolve(Some(&doc)),
            Ok(None) => {
                debug!("No custom thresholds, using defaults");
                self.resolver.defaults()
            }
            Err(e) => {
                warn!("Threshold fetch failed, using defaults: {}", e);
                self.resolver.defaults()
            }
        };

        let candidates = evaluate(reading, &thresholds, epoch_ms);
        let admitted = self.gate.admit(candidates, monotonic_ms);

        let alerts_path = self.store.paths().alerts();
        let mut sent = Vec::with_capacity(admitted.len());

        for alert in admitted {
            let delivered = match serde_json::to_value(&alert) {
                Ok(body) => match self.store.post(&alerts_path, &body).await {
                    Ok(_) => {
                        debug!("{} alert sent", alert.kind);
                        true
                    }
                    Err(e) => {
                        warn!("{} alert not delivered: {}", alert.kind, e);
                        false
                    }
                },
                Err(e) => {
                    warn!("{} alert could not be encoded: {}", alert.kind, e);
                    false
                }
            };

            if !delivered {
                self.gate.forget(alert.kind);
            }
            sent.push((alert, delivered));
        }

        AlertCycle { thresholds, sent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use crate::config::{AlertConfig, ResendPolicy};
    use crate::reading::{ClimateReading, MotionReading};
    use crate::store::{MemoryStore, StorePaths};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const ROOT: &str = "SmartParcels/TRACEON_000001";

    fn reading(temperature: f32, accel: Vector3) -> SensorReading {
        SensorReading {
            climate: ClimateReading {
                temperature: Some(temperature),
                humidity: Some(47.26),
                heat_index: Some(temperature + 0.04),
                valid: true,
                sampled_at_ms: 0,
            },
            motion: MotionReading {
                accel: Some(accel),
                gyro: Some(Vector3::new(0.123, -0.456, 0.0)),
                connected: true,
                valid: true,
                sampled_at_ms: 0,
            },
        }
    }

    fn uploader(memory: &Arc<MemoryStore>, policy: ResendPolicy) -> TelemetryUploader {
        let store = DeviceStore::new(
            memory.clone(),
            StorePaths::new("SmartParcels", "TRACEON_000001"),
            Duration::from_secs(1),
        );
        TelemetryUploader::new(
            store,
            ThresholdResolver::default(),
            AlertGate::new(&AlertConfig {
                resend_policy: policy,
                min_resend_interval_ms: 60_000,
            }),
        )
    }

    #[test]
    fn test_snapshot_rounding() {
        let snapshot = TelemetrySnapshot::from_reading(
            &reading(23.456, Vector3::new(0.014, -0.126, 9.806)),
            15.0,
            "dock-4".to_string(),
            -67,
            1_700_000_000_000,
        );

        assert_eq!(snapshot.temperature, 23.5);
        assert_eq!(snapshot.humidity, 47.3);
        assert_eq!(snapshot.accel_x, 0.01);
        assert_eq!(snapshot.accel_y, -0.13);
        assert_eq!(snapshot.accel_z, 9.81);
        assert_eq!(snapshot.gyro_y, -0.46);
        assert_eq!(snapshot.orientation, Orientation::Upright);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["timestamp"], "1700000000000");
        assert_eq!(value["state"], "Monitoring");
        assert_eq!(value["orientation"], "Upright");
        assert_eq!(value["wifiRSSI"], -67);
        assert_eq!(value["heatIndex"], 23.5);
    }

    #[test]
    fn test_snapshot_zeroes_unusable_families() {
        let mut stale = reading(45.0, Vector3::new(0.0, 0.0, -9.8));
        stale.climate.valid = false;
        stale.motion.connected = false;

        let snapshot = TelemetrySnapshot::from_reading(&stale, 15.0, String::new(), 0, 1);
        assert_eq!(snapshot.temperature, 0.0);
        assert_eq!(snapshot.heat_index, 0.0);
        assert_eq!(snapshot.accel_z, 0.0);
        assert_eq!(snapshot.orientation, Orientation::Unknown);
        assert!(!snapshot.vibration);
    }

    #[tokio::test]
    async fn test_upload_write_order() {
        let memory = Arc::new(MemoryStore::new());
        let uploader = uploader(&memory, ResendPolicy::EveryCycle);
        let snapshot = TelemetrySnapshot::from_reading(
            &reading(22.0, Vector3::new(0.0, 0.0, 9.8)),
            15.0,
            "dock-4".to_string(),
            -60,
            42,
        );

        uploader.upload(&snapshot).await.unwrap();

        let calls: Vec<(&str, String)> = memory
            .calls()
            .into_iter()
            .map(|c| (c.method, c.path))
            .collect();
        assert_eq!(
            calls,
            vec![
                ("PUT", format!("{}/current", ROOT)),
                ("POST", format!("{}/history", ROOT)),
                ("PUT", format!("{}/info/lastSeen", ROOT)),
            ]
        );
        assert_eq!(memory.children(&format!("{}/history", ROOT)).len(), 1);
        assert_eq!(
            memory.snapshot(&format!("{}/info/lastSeen", ROOT)),
            Some(json!("42"))
        );
    }

    #[tokio::test]
    async fn test_failed_current_write_skips_follow_ups() {
        let memory = Arc::new(MemoryStore::new());
        memory.set_offline(true);
        let uploader = uploader(&memory, ResendPolicy::EveryCycle);
        let snapshot = TelemetrySnapshot::from_reading(
            &reading(22.0, Vector3::new(0.0, 0.0, 9.8)),
            15.0,
            String::new(),
            0,
            42,
        );

        assert!(uploader.upload(&snapshot).await.is_err());
        assert_eq!(memory.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_cycle_uses_remote_thresholds() {
        let memory = Arc::new(MemoryStore::with_tree(json!({
            "SmartParcels": {"TRACEON_000001": {"info": {"thresholds": {
                "temperature": {"max": 20.0}
            }}}}
        })));
        let mut uploader = uploader(&memory, ResendPolicy::EveryCycle);

        let cycle = uploader
            .run_alert_cycle(&reading(22.0, Vector3::new(0.0, 0.0, 9.8)), 1_000, 0)
            .await;

        assert_eq!(cycle.thresholds.temp_max, 20.0);
        assert_eq!(cycle.thresholds.temp_min, 5.0);
        assert_eq!(cycle.sent.len(), 1);
        assert!(cycle.sent[0].1);
        assert_eq!(cycle.sent[0].0.kind, AlertKind::Temperature);

        // Posted exactly once
        let alerts = memory.children(&format!("{}/alerts", ROOT));
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0]["threshold"], 20.0);
        assert_eq!(alerts[0]["timestamp"], "1000");
    }

    #[tokio::test]
    async fn test_undelivered_alert_is_retried_under_edge_policy() {
        let memory = Arc::new(MemoryStore::new());
        let mut uploader = uploader(&memory, ResendPolicy::EdgeTriggered);
        let hot = reading(45.0, Vector3::new(0.0, 0.0, 9.8));

        memory.set_offline(true);
        let cycle = uploader.run_alert_cycle(&hot, 1_000, 0).await;
        assert_eq!(cycle.sent.len(), 1);
        assert!(!cycle.sent[0].1);
        assert_eq!(cycle.thresholds, ThresholdSet::default());

        memory.set_offline(false);
        let cycle = uploader.run_alert_cycle(&hot, 3_000, 2_000).await;
        assert_eq!(cycle.sent.len(), 1);
        assert!(cycle.sent[0].1);

        let cycle = uploader.run_alert_cycle(&hot, 5_000, 4_000).await;
        assert!(cycle.sent.is_empty());
    }
}
