//! Sensor sources: hardware driver seams plus the rate-limited readers built on them.

mod climate;
mod motion;
pub mod simulated;

pub use climate::{heat_index_celsius, ClimateSource, HUMIDITY_RANGE, TEMPERATURE_RANGE};
pub use motion::MotionSource;
pub use simulated::{Scenario, SharedScenario, SimulatedClimate, SimulatedMotion};

use crate::error::SensorError;
use crate::reading::Vector3;

/// Raw temperature/humidity pair as returned by the hardware, possibly NaN
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawClimate {
    pub temperature: f32,
    pub humidity: f32,
}

/// Raw inertial sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawMotion {
    pub accel: Vector3,
    pub gyro: Vector3,
}

/// Blocking temperature/humidity driver (DHT11 class hardware)
pub trait ClimateDriver: Send {
    fn name(&self) -> &'static str;

    fn begin(&mut self) -> Result<(), SensorError>;

    fn read(&mut self) -> Result<RawClimate, SensorError>;
}

/// Blocking accelerometer/gyroscope driver (MPU6050 class hardware)
pub trait MotionDriver: Send {
    fn name(&self) -> &'static str;

    fn begin(&mut self) -> Result<(), SensorError>;

    fn read(&mut self) -> Result<RawMotion, SensorError>;
}
