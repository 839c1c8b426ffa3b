use std::ops::RangeInclusive;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{ClimateDriver, RawClimate};
use crate::clock::Clock;
use crate::error::SensorError;
use crate::reading::ClimateReading;

/// Accepted temperature window in °C (DHT11 datasheet range 0-50, widened for tolerance)
pub const TEMPERATURE_RANGE: RangeInclusive<f32> = -10.0..=60.0;

/// Accepted relative humidity window in %
pub const HUMIDITY_RANGE: RangeInclusive<f32> = 0.0..=100.0;

/// Rate-limited temperature/humidity source.
///
/// Hardware is touched at most once per `min_interval_ms`; calls in between
/// return the cached reading. A failed transaction clears `valid` but keeps the
/// last good values.
pub struct ClimateSource {
    driver: Box<dyn ClimateDriver>,
    clock: Arc<dyn Clock>,
    min_interval_ms: u64,
    last_read_at: Option<u64>,
    current: ClimateReading,
    transactions: u64,
}

impl ClimateSource {
    pub fn new(driver: Box<dyn ClimateDriver>, clock: Arc<dyn Clock>, min_interval_ms: u64) -> Self {
        Self {
            driver,
            clock,
            min_interval_ms,
            last_read_at: None,
            current: ClimateReading::default(),
            transactions: 0,
        }
    }

    /// Initialize the driver and take a first reading
    pub fn begin(&mut self) -> Result<(), SensorError> {
        info!("Initializing {} climate sensor", self.driver.name());
        self.driver.begin()?;

        let reading = self.sample();
        if reading.valid {
            info!(
                "{} ready: {:.1}°C, {:.1}%",
                self.driver.name(),
                reading.temperature.unwrap_or_default(),
                reading.humidity.unwrap_or_default()
            );
            Ok(())
        } else {
            warn!("{} found but initial read failed", self.driver.name());
            Err(SensorError::NotInitialized {
                sensor: self.driver.name(),
            })
        }
    }

    /// Sample the sensor, or return the cached reading if called too soon
    pub fn sample(&mut self) -> ClimateReading {
        let now = self.clock.monotonic_ms();

        if let Some(last) = self.last_read_at {
            if now.saturating_sub(last) < self.min_interval_ms {
                return self.current;
            }
        }

        self.last_read_at = Some(now);
        self.transactions += 1;

        match self.driver.read().and_then(|raw| validate(self.driver.name(), raw)) {
            Ok(raw) => {
                self.current = ClimateReading {
                    temperature: Some(raw.temperature),
                    humidity: Some(raw.humidity),
                    heat_index: Some(heat_index_celsius(raw.temperature, raw.humidity)),
                    valid: true,
                    sampled_at_ms: now,
                };
                debug!(
                    "{} T: {:.1}°C, H: {:.1}%",
                    self.driver.name(),
                    raw.temperature,
                    raw.humidity
                );
            }
            Err(e) => {
                warn!("{} read failed: {}", self.driver.name(), e);
                self.current.valid = false;
                self.current.sampled_at_ms = now;
            }
        }

        self.current
    }

    /// Last cached reading, without touching hardware
    pub fn current(&self) -> ClimateReading {
        self.current
    }

    pub fn temperature(&self) -> Option<f32> {
        self.current.temperature
    }

    pub fn humidity(&self) -> Option<f32> {
        self.current.humidity
    }

    pub fn is_valid(&self) -> bool {
        self.current.valid
    }

    /// Number of hardware transactions attempted so far
    pub fn transactions(&self) -> u64 {
        self.transactions
    }
}

fn validate(sensor: &'static str, raw: RawClimate) -> Result<RawClimate, SensorError> {
    if raw.temperature.is_nan() || raw.humidity.is_nan() {
        return Err(SensorError::NotANumber { sensor });
    }

    if !TEMPERATURE_RANGE.contains(&raw.temperature) || !HUMIDITY_RANGE.contains(&raw.humidity) {
        return Err(SensorError::OutOfRange {
            sensor,
            details: format!("T: {:.1}°C, H: {:.1}%", raw.temperature, raw.humidity),
        });
    }

    Ok(raw)
}

/// Apparent temperature (NWS Rothfusz regression with Steadman's simple
/// formula below 80°F), °C in and out
pub fn heat_index_celsius(temperature_c: f32, humidity: f32) -> f32 {
    let t = temperature_c * 1.8 + 32.0;
    let rh = humidity;

    let mut hi = 0.5 * (t + 61.0 + (t - 68.0) * 1.2 + rh * 0.094);

    if hi > 79.0 {
        hi = -42.379 + 2.049_015_2 * t + 10.143_331 * rh
            - 0.224_755_4 * t * rh
            - 0.006_837_83 * t * t
            - 0.054_817_17 * rh * rh
            + 0.001_228_74 * t * t * rh
            + 0.000_852_82 * t * rh * rh
            - 0.000_001_99 * t * t * rh * rh;

        if rh < 13.0 && (80.0..=112.0).contains(&t) {
            hi -= ((13.0 - rh) * 0.25) * ((17.0 - (t - 95.0).abs()) * 0.058_82).sqrt();
        } else if rh > 85.0 && (80.0..=87.0).contains(&t) {
            hi += ((rh - 85.0) * 0.1) * ((87.0 - t) * 0.2);
        }
    }

    (hi - 32.0) / 1.8
}
