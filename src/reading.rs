use serde::{Deserialize, Serialize};

/// Three-axis sample (m/s² for acceleration, rad/s for rotation rate)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Temperature/humidity family. Values hold the last valid sample; `valid`
/// says whether the most recent hardware transaction produced them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateReading {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub heat_index: Option<f32>,
    pub valid: bool,
    pub sampled_at_ms: u64,
}

impl ClimateReading {
    /// Temperature and humidity, only when the family is currently valid
    pub fn usable(&self) -> Option<(f32, f32)> {
        if !self.valid {
            return None;
        }
        Some((self.temperature?, self.humidity?))
    }
}

/// Inertial family
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionReading {
    pub accel: Option<Vector3>,
    pub gyro: Option<Vector3>,
    /// Driver initialized and answering on the bus
    pub connected: bool,
    pub valid: bool,
    pub sampled_at_ms: u64,
}

impl MotionReading {
    pub fn usable_accel(&self) -> Option<Vector3> {
        if self.connected && self.valid {
            self.accel
        } else {
            None
        }
    }
}

/// Latest sample of both families, superseded every sampling interval
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorReading {
    pub climate: ClimateReading,
    pub motion: MotionReading,
}
