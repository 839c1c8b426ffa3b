//! Orientation and vibration heuristics over a single accelerometer sample.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::reading::{MotionReading, Vector3};

/// Standard gravity baseline for vibration detection (m/s²)
pub const GRAVITY: f32 = 9.8;

/// Net acceleration below this is treated as free fall (m/s²)
pub const FREE_FALL_MAGNITUDE: f32 = 5.0;

/// Dominant-Z acceleration beyond this counts as level (m/s²)
pub const LEVEL_AXIS_MIN: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Orientation {
    #[serde(rename = "Upright")]
    Upright,
    #[serde(rename = "Upside Down")]
    UpsideDown,
    #[serde(rename = "Tilted")]
    Tilted,
    #[serde(rename = "On Side (Left)")]
    OnSideLeft,
    #[serde(rename = "On Side (Right)")]
    OnSideRight,
    #[serde(rename = "On Edge (Front)")]
    OnEdgeFront,
    #[serde(rename = "On Edge (Back)")]
    OnEdgeBack,
    #[serde(rename = "Free Fall")]
    FreeFall,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl Orientation {
    pub fn label(&self) -> &'static str {
        match self {
            Orientation::Upright => "Upright",
            Orientation::UpsideDown => "Upside Down",
            Orientation::Tilted => "Tilted",
            Orientation::OnSideLeft => "On Side (Left)",
            Orientation::OnSideRight => "On Side (Right)",
            Orientation::OnEdgeFront => "On Edge (Front)",
            Orientation::OnEdgeBack => "On Edge (Back)",
            Orientation::FreeFall => "Free Fall",
            Orientation::Unknown => "Unknown",
        }
    }

    /// Orientations that warrant a critical alert
    pub fn is_dangerous(&self) -> bool {
        matches!(self, Orientation::UpsideDown | Orientation::FreeFall)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Map an acceleration vector to an orientation label.
///
/// Free fall dominates every other check. Otherwise the axis with the largest
/// absolute component decides, with ties going to Z, then X, then Y.
pub fn classify_orientation(accel: Vector3) -> Orientation {
    if accel.magnitude() < FREE_FALL_MAGNITUDE {
        return Orientation::FreeFall;
    }

    let (ax, ay, az) = (accel.x.abs(), accel.y.abs(), accel.z.abs());

    if az >= ax && az >= ay {
        if accel.z > LEVEL_AXIS_MIN {
            Orientation::Upright
        } else if accel.z < -LEVEL_AXIS_MIN {
            Orientation::UpsideDown
        } else {
            Orientation::Tilted
        }
    } else if ax >= ay {
        if accel.x > 0.0 {
            Orientation::OnSideRight
        } else {
            Orientation::OnSideLeft
        }
    } else if accel.y > 0.0 {
        Orientation::OnEdgeFront
    } else {
        Orientation::OnEdgeBack
    }
}

/// True when the net acceleration strays more than `threshold` from gravity.
/// Independent of free fall; both may hold at once.
pub fn detect_vibration(accel: Vector3, threshold: f32) -> bool {
    (accel.magnitude() - GRAVITY).abs() > threshold
}

/// Classification of one motion reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub orientation: Orientation,
    pub vibration: bool,
    pub total_acceleration: Option<f32>,
}

/// Classify a reading; unavailable or invalid motion data yields `Unknown`.
pub fn classify(motion: &MotionReading, vibration_threshold: f32) -> MotionState {
    match motion.usable_accel() {
        Some(accel) => MotionState {
            orientation: classify_orientation(accel),
            vibration: detect_vibration(accel, vibration_threshold),
            total_acceleration: Some(accel.magnitude()),
        },
        None => MotionState {
            orientation: Orientation::Unknown,
            vibration: false,
            total_acceleration: None,
        },
    }
}
