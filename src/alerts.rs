//! Threshold alerting: pure evaluation of one reading plus an optional
//! re-emission gate.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

use crate::classifier::classify;
use crate::clock::epoch_string;
use crate::config::{AlertConfig, ResendPolicy};
use crate::reading::SensorReading;
use crate::thresholds::ThresholdSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    Temperature,
    Humidity,
    Vibration,
    Orientation,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Temperature => "temperature",
            AlertKind::Humidity => "humidity",
            AlertKind::Vibration => "vibration",
            AlertKind::Orientation => "orientation",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Critical,
}

/// Measured value: a number for scalar alerts, the label for orientation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AlertValue {
    Number(f64),
    Label(String),
}

/// One alert document as appended to `<device>/alerts`. Never modified
/// after it is written; the back end owns `resolved`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub value: AlertValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(with = "epoch_string")]
    pub timestamp: u64,
    pub resolved: bool,
}

impl AlertEvent {
    fn scalar(
        kind: AlertKind,
        severity: Severity,
        message: &str,
        value: f32,
        threshold: f32,
        timestamp: u64,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.to_string(),
            value: AlertValue::Number(round2(value)),
            threshold: Some(round2(threshold)),
            timestamp,
            resolved: false,
        }
    }
}

/// f32 sensor values widened without binary noise (45.3 stays 45.3)
fn round2(value: f32) -> f64 {
    (value as f64 * 100.0).round() / 100.0
}

/// Compare a reading against the effective thresholds.
///
/// Returns alerts in the fixed order temperature, humidity, vibration,
/// orientation. An invalid climate family produces no climate alerts even if
/// the values it still exposes are out of bounds; likewise for motion.
pub fn evaluate(reading: &SensorReading, thresholds: &ThresholdSet, timestamp: u64) -> Vec<AlertEvent> {
    let mut alerts = Vec::new();

    if let Some((temperature, humidity)) = reading.climate.usable() {
        if temperature > thresholds.temp_max {
            alerts.push(AlertEvent::scalar(
                AlertKind::Temperature,
                Severity::Critical,
                "Temperature exceeded maximum",
                temperature,
                thresholds.temp_max,
                timestamp,
            ));
        } else if temperature < thresholds.temp_min {
            alerts.push(AlertEvent::scalar(
                AlertKind::Temperature,
                Severity::Warning,
                "Temperature below minimum",
                temperature,
                thresholds.temp_min,
                timestamp,
            ));
        }

        if humidity > thresholds.humid_max {
            alerts.push(AlertEvent::scalar(
                AlertKind::Humidity,
                Severity::Critical,
                "Humidity exceeded maximum",
                humidity,
                thresholds.humid_max,
                timestamp,
            ));
        } else if humidity < thresholds.humid_min {
            alerts.push(AlertEvent::scalar(
                AlertKind::Humidity,
                Severity::Warning,
                "Humidity below minimum",
                humidity,
                thresholds.humid_min,
                timestamp,
            ));
        }
    }

    let motion = classify(&reading.motion, thresholds.vibration);

    if motion.vibration {
        if let Some(total) = motion.total_acceleration {
            alerts.push(AlertEvent::scalar(
                AlertKind::Vibration,
                Severity::Warning,
                "Excessive vibration detected - possible rough handling",
                total,
                thresholds.vibration,
                timestamp,
            ));
        }
    }

    if motion.orientation.is_dangerous() {
        alerts.push(AlertEvent {
            kind: AlertKind::Orientation,
            severity: Severity::Critical,
            message: format!("Dangerous orientation detected: {}", motion.orientation),
            value: AlertValue::Label(motion.orientation.label().to_string()),
            threshold: None,
            timestamp,
            resolved: false,
        });
    }

    alerts
}

/// Re-emission policy applied to the evaluator's output
#[derive(Debug)]
pub struct AlertGate {
    policy: ResendPolicy,
    min_interval_ms: u64,
    last_emitted: HashMap<AlertKind, u64>,
    firing: HashSet<AlertKind>,
}

impl AlertGate {
    pub fn new(config: &AlertConfig) -> Self {
        Self {
            policy: config.resend_policy,
            min_interval_ms: config.min_resend_interval_ms,
            last_emitted: HashMap::new(),
            firing: HashSet::new(),
        }
    }

    pub fn policy(&self) -> ResendPolicy {
        self.policy
    }

    /// Keep the alerts that should be sent this cycle. `now_ms` is monotonic.
    pub fn admit(&mut self, alerts: Vec<AlertEvent>, now_ms: u64) -> Vec<AlertEvent> {
        let active: HashSet<AlertKind> = alerts.iter().map(|a| a.kind).collect();

        let admitted: Vec<AlertEvent> = match self.policy {
            ResendPolicy::EveryCycle => alerts,
            ResendPolicy::MinInterval => {
                // A condition that cleared may fire again immediately
                self.last_emitted.retain(|kind, _| active.contains(kind));

                alerts
                    .into_iter()
                    .filter(|alert| match self.last_emitted.get(&alert.kind) {
                        Some(&last) => now_ms.saturating_sub(last) >= self.min_interval_ms,
                        None => true,
                    })
                    .collect()
            }
            ResendPolicy::EdgeTriggered => alerts
                .into_iter()
                .filter(|alert| !self.firing.contains(&alert.kind))
                .collect(),
        };

        for alert in &admitted {
            self.last_emitted.insert(alert.kind, now_ms);
        }
        self.firing = active;

        if admitted.is_empty() && !self.firing.is_empty() {
            debug!("Suppressed {} repeated alert(s)", self.firing.len());
        }

        admitted
    }

    /// Undo admission of an alert whose delivery failed, so it goes out again
    /// on the next cycle
    pub fn forget(&mut self, kind: AlertKind) {
        self.last_emitted.remove(&kind);
        self.firing.remove(&kind);
    }
}
