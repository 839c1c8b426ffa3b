use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 2020-01-01T00:00:00Z. Wall clock readings before this are treated as an
/// unsynchronized RTC.
pub const EPOCH_SANITY_CUTOFF_MS: u64 = 1_577_836_800_000;

/// Monotonic and wall-clock time source
pub trait Clock: Send + Sync {
    /// Milliseconds since the clock was created; never goes backwards
    fn monotonic_ms(&self) -> u64;

    /// Raw wall clock in Unix epoch milliseconds (may predate the cutoff at boot)
    fn wall_ms(&self) -> i64;

    /// Epoch milliseconds for remote timestamps, falling back to uptime when
    /// the wall clock has not been synchronized yet
    fn epoch_ms(&self) -> u64 {
        let wall = self.wall_ms();
        if wall >= EPOCH_SANITY_CUTOFF_MS as i64 {
            wall as u64
        } else {
            self.monotonic_ms()
        }
    }

    fn is_synchronized(&self) -> bool {
        self.wall_ms() >= EPOCH_SANITY_CUTOFF_MS as i64
    }
}

/// Host clock: `Instant` for monotonic time, chrono for wall time
#[derive(Debug, Clone)]
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn wall_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Hand-driven clock for tests and simulation
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    monotonic: Arc<AtomicU64>,
    wall: Arc<AtomicI64>,
}

impl ManualClock {
    /// Clock whose wall time starts at `wall_ms`
    pub fn new(wall_ms: i64) -> Self {
        Self {
            monotonic: Arc::new(AtomicU64::new(0)),
            wall: Arc::new(AtomicI64::new(wall_ms)),
        }
    }

    /// Clock whose wall time has not been synchronized
    pub fn unsynchronized() -> Self {
        Self::new(0)
    }

    /// Move both clocks forward
    pub fn advance(&self, ms: u64) {
        self.monotonic.fetch_add(ms, Ordering::SeqCst);
        self.wall.fetch_add(ms as i64, Ordering::SeqCst);
    }

    pub fn set_wall_ms(&self, wall_ms: i64) {
        self.wall.store(wall_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn monotonic_ms(&self) -> u64 {
        self.monotonic.load(Ordering::SeqCst)
    }

    fn wall_ms(&self) -> i64 {
        self.wall.load(Ordering::SeqCst)
    }
}

/// Serde adapter for epoch-millisecond timestamps stored as decimal strings.
/// Reading also accepts plain JSON numbers, which older records contain.
pub mod epoch_string {
    use serde::de::{self, Deserializer};
    use serde::{Deserialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Integer(u64),
        Float(f64),
    }

    pub(crate) fn parse(raw: &serde_json::Value) -> Option<u64> {
        match raw {
            serde_json::Value::String(s) => s.trim().trim_matches('"').parse().ok(),
            serde_json::Value::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.trim().parse().map_err(de::Error::custom),
            Raw::Integer(n) => Ok(n),
            Raw::Float(f) if f.is_finite() && f >= 0.0 => Ok(f as u64),
            Raw::Float(f) => Err(de::Error::custom(format!("invalid timestamp {}", f))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synchronized_clock_uses_wall_time() {
        let clock = ManualClock::new(1_700_000_000_000);
        clock.advance(1500);
        assert!(clock.is_synchronized());
        assert_eq!(clock.epoch_ms(), 1_700_000_001_500);
    }

    #[test]
    fn test_unsynchronized_clock_falls_back_to_uptime() {
        let clock = ManualClock::unsynchronized();
        clock.advance(42_000);
        assert!(!clock.is_synchronized());
        assert_eq!(clock.epoch_ms(), 42_000);

        clock.set_wall_ms(EPOCH_SANITY_CUTOFF_MS as i64);
        assert_eq!(clock.epoch_ms(), EPOCH_SANITY_CUTOFF_MS);
    }

    #[test]
    fn test_system_clock_is_synchronized_on_host() {
        let clock = SystemClock::new();
        assert!(clock.is_synchronized());
        assert!(clock.epoch_ms() > EPOCH_SANITY_CUTOFF_MS);
    }

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Stamped {
        #[serde(with = "epoch_string")]
        at: u64,
    }

    #[test]
    fn test_epoch_string_accepts_strings_and_numbers() {
        let text: Stamped = serde_json::from_str(r#"{"at":"1700000000123"}"#).unwrap();
        assert_eq!(text.at, 1_700_000_000_123);

        let number: Stamped = serde_json::from_str(r#"{"at":1700000000123}"#).unwrap();
        assert_eq!(number.at, 1_700_000_000_123);

        let float: Stamped = serde_json::from_str(r#"{"at":1700000000123.0}"#).unwrap();
        assert_eq!(float.at, 1_700_000_000_123);

        let out = serde_json::to_value(&number).unwrap();
        assert_eq!(out["at"], "1700000000123");
    }
}
