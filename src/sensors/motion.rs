use std::sync::Arc;

use tracing::{debug, info, warn};

use super::MotionDriver;
use crate::clock::Clock;
use crate::error::SensorError;
use crate::reading::MotionReading;

/// Accelerometer/gyroscope source. No interval gate: every call is a fresh
/// bus transaction that fails closed.
pub struct MotionSource {
    driver: Box<dyn MotionDriver>,
    clock: Arc<dyn Clock>,
    current: MotionReading,
}

impl MotionSource {
    pub fn new(driver: Box<dyn MotionDriver>, clock: Arc<dyn Clock>) -> Self {
        Self {
            driver,
            clock,
            current: MotionReading::default(),
        }
    }

    /// Initialize the driver and verify it answers
    pub fn begin(&mut self) -> Result<(), SensorError> {
        info!("Initializing {} motion sensor", self.driver.name());

        if let Err(e) = self.driver.begin() {
            warn!("{} not found: {}", self.driver.name(), e);
            self.current.connected = false;
            return Err(e);
        }

        self.current.connected = true;

        if !self.sample().valid {
            warn!("{} initial read failed", self.driver.name());
            return Err(SensorError::NotInitialized {
                sensor: self.driver.name(),
            });
        }

        info!("{} initialization complete", self.driver.name());
        Ok(())
    }

    pub fn sample(&mut self) -> MotionReading {
        let now = self.clock.monotonic_ms();
        self.current.sampled_at_ms = now;

        if !self.current.connected {
            self.current.valid = false;
            return self.current;
        }

        match self.driver.read() {
            Ok(raw) if raw.accel.is_finite() && raw.gyro.is_finite() => {
                self.current.accel = Some(raw.accel);
                self.current.gyro = Some(raw.gyro);
                self.current.valid = true;
                debug!(
                    "{} accel ({:.2}, {:.2}, {:.2})",
                    self.driver.name(),
                    raw.accel.x,
                    raw.accel.y,
                    raw.accel.z
                );
            }
            Ok(_) => {
                warn!("{} returned a non-finite sample", self.driver.name());
                self.current.valid = false;
            }
            Err(e) => {
                warn!("{} read failed: {}", self.driver.name(), e);
                self.current.valid = false;
            }
        }

        self.current
    }

    pub fn current(&self) -> MotionReading {
        self.current
    }

    pub fn is_connected(&self) -> bool {
        self.current.connected
    }
}
