//! Software sensor drivers for running on a host without the parcel hardware.
//!
//! Both drivers follow a shared [`Scenario`] that can be switched at runtime
//! (the keyboard handler does this in interactive mode).

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ClimateDriver, MotionDriver, RawClimate, RawMotion};
use crate::error::SensorError;
use crate::reading::Vector3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Parcel resting upright in a benign environment
    Calm,
    /// Temperature above the default maximum
    Heatwave,
    /// Temperature below the default minimum
    Freezer,
    /// Humidity above the default maximum
    Humid,
    /// Rough handling: large acceleration spikes
    Rough,
    UpsideDown,
    OnSide,
    FreeFall,
    /// Every third climate read fails and the IMU drops out periodically
    Flaky,
}

impl Scenario {
    pub const ALL: [Scenario; 9] = [
        Scenario::Calm,
        Scenario::Heatwave,
        Scenario::Freezer,
        Scenario::Humid,
        Scenario::Rough,
        Scenario::UpsideDown,
        Scenario::OnSide,
        Scenario::FreeFall,
        Scenario::Flaky,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Calm => "calm",
            Scenario::Heatwave => "heatwave",
            Scenario::Freezer => "freezer",
            Scenario::Humid => "humid",
            Scenario::Rough => "rough",
            Scenario::UpsideDown => "upside_down",
            Scenario::OnSide => "on_side",
            Scenario::FreeFall => "free_fall",
            Scenario::Flaky => "flaky",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == wanted)
            .ok_or_else(|| format!("unknown scenario '{}'", s))
    }
}

/// Scenario shared between the drivers and whoever steers them
pub type SharedScenario = Arc<RwLock<Scenario>>;

pub fn shared_scenario(initial: Scenario) -> SharedScenario {
    Arc::new(RwLock::new(initial))
}

/// Small deterministic wobble so consecutive samples differ
fn jitter(tick: u64, amplitude: f32) -> f32 {
    ((tick as f32) * 0.7).sin() * amplitude
}

pub struct SimulatedClimate {
    scenario: SharedScenario,
    tick: u64,
}

impl SimulatedClimate {
    pub fn new(scenario: SharedScenario) -> Self {
        Self { scenario, tick: 0 }
    }
}

impl ClimateDriver for SimulatedClimate {
    fn name(&self) -> &'static str {
        "simulated-dht11"
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<RawClimate, SensorError> {
        self.tick += 1;
        let scenario = *self.scenario.read();

        let (temperature, humidity) = match scenario {
            Scenario::Heatwave => (45.0, 35.0),
            Scenario::Freezer => (1.5, 40.0),
            Scenario::Humid => (27.0, 88.0),
            Scenario::Flaky if self.tick % 3 == 0 => (f32::NAN, f32::NAN),
            _ => (22.0, 48.0),
        };

        Ok(RawClimate {
            temperature: temperature + jitter(self.tick, 0.3),
            humidity: humidity + jitter(self.tick + 1, 0.8),
        })
    }
}

pub struct SimulatedMotion {
    scenario: SharedScenario,
    tick: u64,
}

impl SimulatedMotion {
    pub fn new(scenario: SharedScenario) -> Self {
        Self { scenario, tick: 0 }
    }
}

impl MotionDriver for SimulatedMotion {
    fn name(&self) -> &'static str {
        "simulated-mpu6050"
    }

    fn begin(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn read(&mut self) -> Result<RawMotion, SensorError> {
        self.tick += 1;
        let scenario = *self.scenario.read();
        let wobble = jitter(self.tick, 0.05);

        let accel = match scenario {
            Scenario::UpsideDown => Vector3::new(wobble, 0.1, -9.8),
            Scenario::OnSide => Vector3::new(9.7, wobble, 0.4),
            Scenario::FreeFall => Vector3::new(0.2, -0.1, 0.3 + wobble),
            Scenario::Rough => Vector3::new(12.0, -9.0, 24.0 + wobble * 10.0),
            Scenario::Flaky if self.tick % 5 == 0 => {
                return Err(SensorError::Transport {
                    sensor: "simulated-mpu6050",
                    details: "I2C NACK".to_string(),
                })
            }
            _ => Vector3::new(wobble, -wobble, 9.8),
        };

        let gyro = match scenario {
            Scenario::Rough => Vector3::new(1.5, -2.0, 0.8),
            _ => Vector3::new(wobble * 0.1, 0.0, -wobble * 0.1),
        };

        Ok(RawMotion { accel, gyro })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{classify_orientation, detect_vibration, Orientation};

    #[test]
    fn test_scenario_parsing() {
        assert_eq!("calm".parse::<Scenario>().unwrap(), Scenario::Calm);
        assert_eq!("Free-Fall".parse::<Scenario>().unwrap(), Scenario::FreeFall);
        assert!("tornado".parse::<Scenario>().is_err());
        for scenario in Scenario::ALL {
            assert_eq!(scenario.name().parse::<Scenario>().unwrap(), scenario);
        }
    }

    #[test]
    fn test_motion_follows_shared_scenario() {
        let scenario = shared_scenario(Scenario::Calm);
        let mut driver = SimulatedMotion::new(Arc::clone(&scenario));

        let calm = driver.read().unwrap();
        assert_eq!(classify_orientation(calm.accel), Orientation::Upright);

        *scenario.write() = Scenario::UpsideDown;
        let flipped = driver.read().unwrap();
        assert_eq!(classify_orientation(flipped.accel), Orientation::UpsideDown);

        *scenario.write() = Scenario::Rough;
        let rough = driver.read().unwrap();
        assert!(detect_vibration(rough.accel, 15.0));
    }

    #[test]
    fn test_heatwave_exceeds_default_maximum() {
        let mut driver = SimulatedClimate::new(shared_scenario(Scenario::Heatwave));
        let raw = driver.read().unwrap();
        assert!(raw.temperature > 40.0);
    }
}
