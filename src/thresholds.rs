//! Alert thresholds: compiled defaults merged field-by-field with a remote override.
//!
//! The override document lives at `<base>/<device>/info/thresholds` and has the
//! nested shape written by the dashboard:
//!
//! ```json
//! { "temperature": { "min": 5.0, "max": 40.0 },
//!   "humidity":    { "min": 20.0, "max": 80.0 },
//!   "vibration": 15.0 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const TEMP_MIN_DEFAULT: f32 = 5.0;
pub const TEMP_MAX_DEFAULT: f32 = 40.0;
pub const HUMIDITY_MIN_DEFAULT: f32 = 20.0;
pub const HUMIDITY_MAX_DEFAULT: f32 = 80.0;
pub const VIBRATION_DEFAULT: f32 = 15.0;

/// Effective bounds used for alerting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet {
    pub temp_min: f32,
    pub temp_max: f32,
    pub humid_min: f32,
    pub humid_max: f32,
    /// Allowed deviation from standard gravity in m/s²
    pub vibration: f32,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            temp_min: TEMP_MIN_DEFAULT,
            temp_max: TEMP_MAX_DEFAULT,
            humid_min: HUMIDITY_MIN_DEFAULT,
            humid_max: HUMIDITY_MAX_DEFAULT,
            vibration: VIBRATION_DEFAULT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f32,
    pub max: f32,
}

/// Wire form of a complete threshold set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDocument {
    pub temperature: Bounds,
    pub humidity: Bounds,
    pub vibration: f32,
}

impl From<ThresholdSet> for ThresholdDocument {
    fn from(set: ThresholdSet) -> Self {
        Self {
            temperature: Bounds {
                min: set.temp_min,
                max: set.temp_max,
            },
            humidity: Bounds {
                min: set.humid_min,
                max: set.humid_max,
            },
            vibration: set.vibration,
        }
    }
}

/// Stateless merge of an optional override document onto the defaults
#[derive(Debug, Clone)]
pub struct ThresholdResolver {
    defaults: ThresholdSet,
}

impl ThresholdResolver {
    pub fn new(defaults: ThresholdSet) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> ThresholdSet {
        self.defaults
    }

    /// Resolve the effective set. Absent or malformed fields fall back to the
    /// default one at a time; this never fails.
    pub fn resolve(&self, remote_doc: Option<&Value>) -> ThresholdSet {
        let Some(doc) = remote_doc else {
            return self.defaults;
        };

        let d = self.defaults;
        let resolved = ThresholdSet {
            temp_min: field(doc, "/temperature/min").unwrap_or(d.temp_min),
            temp_max: field(doc, "/temperature/max").unwrap_or(d.temp_max),
            humid_min: field(doc, "/humidity/min").unwrap_or(d.humid_min),
            humid_max: field(doc, "/humidity/max").unwrap_or(d.humid_max),
            vibration: field(doc, "/vibration").unwrap_or(d.vibration),
        };

        debug!(
            "Resolved thresholds: temp {:.1}-{:.1}°C, humidity {:.1}-{:.1}%, vibration {:.2} m/s²",
            resolved.temp_min,
            resolved.temp_max,
            resolved.humid_min,
            resolved.humid_max,
            resolved.vibration
        );

        resolved
    }
}

impl Default for ThresholdResolver {
    fn default() -> Self {
        Self::new(ThresholdSet::default())
    }
}

/// A finite JSON number at `pointer`, anything else counts as absent
fn field(doc: &Value, pointer: &str) -> Option<f32> {
    doc.pointer(pointer)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| v as f32)
}
