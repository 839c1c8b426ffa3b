//! Device identity and the registration record kept under `<base>/<device>/info`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::clock::epoch_string;
use crate::config::DeviceConfig;
use crate::error::{ParcelwatchError, Result};
use crate::network::NetworkInfo;
use crate::thresholds::{ThresholdDocument, ThresholdSet};

/// Canonical `AA:BB:CC:DD:EE:FF` form of a MAC address written with or
/// without `:`/`-` separators. `None` unless exactly 12 hex digits remain.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let upper = digits.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..6).map(|i| &upper[i * 2..i * 2 + 2]).collect();
    Some(pairs.join(":"))
}

/// Fixed identity of this unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_name: String,
    pub mac_address: String,
    pub firmware_version: String,
}

impl DeviceIdentity {
    pub fn from_config(config: &DeviceConfig) -> Result<Self> {
        let mac_address = normalize_mac(&config.mac_address).ok_or_else(|| {
            ParcelwatchError::component(
                "device".to_string(),
                format!("invalid MAC address '{}'", config.mac_address),
            )
        })?;

        // Last three octets without separators
        let suffix: String = mac_address[9..].chars().filter(|c| *c != ':').collect();

        Ok(Self {
            device_name: format!("{}{}", config.name_prefix, suffix),
            mac_address,
            firmware_version: config.firmware_version.clone(),
        })
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device_name, self.mac_address)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Assigned,
    Available,
}

impl DeviceStatus {
    pub fn from_assignment(assigned_parcel_id: &str) -> Self {
        if assigned_parcel_id.trim().is_empty() {
            DeviceStatus::Available
        } else {
            DeviceStatus::Assigned
        }
    }

    /// Indicator text shown on the local status page
    pub fn indicator(&self) -> &'static str {
        match self {
            DeviceStatus::Assigned => "Assigned to Parcel",
            DeviceStatus::Available => "Available",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.indicator())
    }
}

/// Assignment id from a stored value, for status derivation only. Ids are
/// normally strings; numeric ids are accepted and stringified, anything else
/// reads as unassigned.
pub fn assignment_from_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().trim_matches('"').to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Fields owned by the back end that registration must carry over.
///
/// Both are kept as the raw stored JSON and written back exactly as read.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreservedFields {
    pub assigned_parcel_id: Option<Value>,
    pub registered_at: Option<Value>,
}

impl PreservedFields {
    /// Extract preserved fields from the stored info record, if any
    pub fn from_existing(existing: Option<&Value>) -> Self {
        let Some(doc) = existing.filter(|v| v.is_object()) else {
            return Self::default();
        };

        let field = |key: &str| doc.get(key).filter(|v| !v.is_null()).cloned();

        Self {
            assigned_parcel_id: field("assignedParcelId"),
            registered_at: field("registeredAt"),
        }
    }

    /// Parsed assignment id, empty when unassigned
    pub fn assignment(&self) -> String {
        assignment_from_value(self.assigned_parcel_id.as_ref())
    }

    pub fn is_assigned(&self) -> bool {
        !self.assignment().is_empty()
    }

    /// Stored registration time, when it parses as epoch milliseconds
    pub fn registered_at_ms(&self) -> Option<u64> {
        self.registered_at.as_ref().and_then(epoch_string::parse)
    }
}

fn unassigned() -> Value {
    Value::String(String::new())
}

/// Registration record as written to the remote store.
///
/// Written with merge semantics: a `None` field is omitted and whatever the
/// server holds for it stays in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub device_name: String,
    pub mac_address: String,
    pub firmware_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<Value>,
    #[serde(default = "unassigned")]
    pub assigned_parcel_id: Value,
    pub status: DeviceStatus,
    #[serde(with = "epoch_string")]
    pub last_seen: u64,
    #[serde(flatten)]
    pub network: NetworkInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<ThresholdDocument>,
}

impl DeviceRecord {
    /// Merge local identity with the preserved back-end fields.
    ///
    /// Remote wins for assignment and registration time, which pass through
    /// untouched; local wins for identity, network hints and `lastSeen`.
    /// Default thresholds are only published while the device is unassigned.
    pub fn merged(
        identity: &DeviceIdentity,
        network: NetworkInfo,
        preserved: &PreservedFields,
        now_ms: u64,
        default_thresholds: ThresholdSet,
    ) -> Self {
        let registered_at = preserved
            .registered_at
            .clone()
            .unwrap_or_else(|| Value::String(now_ms.to_string()));
        let assigned_parcel_id = preserved
            .assigned_parcel_id
            .clone()
            .unwrap_or_else(unassigned);
        let assigned = preserved.is_assigned();

        Self {
            device_name: identity.device_name.clone(),
            mac_address: identity.mac_address.clone(),
            firmware_version: identity.firmware_version.clone(),
            registered_at: Some(registered_at),
            assigned_parcel_id,
            status: DeviceStatus::from_assignment(&preserved.assignment()),
            last_seen: now_ms,
            network,
            thresholds: (!assigned).then(|| default_thresholds.into()),
        }
    }

    /// Registration time as epoch milliseconds, when it parses
    pub fn registered_at_ms(&self) -> Option<u64> {
        self.registered_at.as_ref().and_then(epoch_string::parse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> DeviceIdentity {
        DeviceIdentity::from_config(&DeviceConfig {
            name_prefix: "TRACEON_".to_string(),
            mac_address: "24:6f:28:a1:b2:c3".to_string(),
            firmware_version: "1.2.0".to_string(),
            mdns_hostname: "traceon".to_string(),
        })
        .unwrap()
    }

    fn network() -> NetworkInfo {
        NetworkInfo {
            ip_address: "10.0.0.7".to_string(),
            wifi_ssid: "dock-4".to_string(),
            local_access: "http://10.0.0.7".to_string(),
            mdns_access: "http://traceon.local".to_string(),
        }
    }

    #[test]
    fn test_normalize_mac() {
        assert_eq!(
            normalize_mac("246f28a1b2c3").as_deref(),
            Some("24:6F:28:A1:B2:C3")
        );
        assert_eq!(
            normalize_mac("24-6F-28-A1-B2-C3").as_deref(),
            Some("24:6F:28:A1:B2:C3")
        );
        assert!(normalize_mac("24:6F:28:A1:B2").is_none());
        assert!(normalize_mac("24:6F:28:A1:B2:ZZ").is_none());
    }

    #[test]
    fn test_device_name_uses_mac_suffix() {
        let identity = identity();
        assert_eq!(identity.device_name, "TRACEON_A1B2C3");
        assert_eq!(identity.mac_address, "24:6F:28:A1:B2:C3");
    }

    #[test]
    fn test_fresh_device_record() {
        let preserved = PreservedFields::from_existing(None);
        let record = DeviceRecord::merged(
            &identity(),
            network(),
            &preserved,
            1_700_000_000_000,
            ThresholdSet::default(),
        );

        assert_eq!(record.registered_at_ms(), Some(1_700_000_000_000));
        assert_eq!(record.status, DeviceStatus::Available);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["registeredAt"], "1700000000000");
        assert_eq!(value["lastSeen"], "1700000000000");
        assert_eq!(value["assignedParcelId"], "");
        assert_eq!(value["status"], "available");
        assert_eq!(value["wifiSSID"], "dock-4");
        assert_eq!(value["thresholds"]["temperature"]["max"], 40.0);
    }

    #[test]
    fn test_assigned_device_keeps_backend_fields() {
        let existing = json!({
            "assignedParcelId": "PCL-0042",
            "registeredAt": "1690000000000",
            "thresholds": {"temperature": {"min": 2.0, "max": 8.0}}
        });
        let preserved = PreservedFields::from_existing(Some(&existing));
        assert!(preserved.is_assigned());

        let record = DeviceRecord::merged(
            &identity(),
            network(),
            &preserved,
            1_700_000_000_000,
            ThresholdSet::default(),
        );

        assert_eq!(record.registered_at, Some(json!("1690000000000")));
        assert_eq!(record.assigned_parcel_id, json!("PCL-0042"));
        assert_eq!(record.status, DeviceStatus::Assigned);

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("thresholds").is_none());
    }

    #[test]
    fn test_malformed_registration_time_is_left_alone() {
        let existing = json!({"registeredAt": {"nested": true}});
        let preserved = PreservedFields::from_existing(Some(&existing));
        assert_eq!(preserved.registered_at_ms(), None);

        let record = DeviceRecord::merged(
            &identity(),
            network(),
            &preserved,
            1_700_000_000_000,
            ThresholdSet::default(),
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["registeredAt"], json!({"nested": true}));
    }

    #[test]
    fn test_preserved_fields_pass_through_unchanged() {
        let existing = json!({"assignedParcelId": 42, "registeredAt": 1690000000123.7});
        let preserved = PreservedFields::from_existing(Some(&existing));
        assert_eq!(preserved.registered_at_ms(), Some(1_690_000_000_123));
        assert_eq!(preserved.assignment(), "42");

        let record = DeviceRecord::merged(
            &identity(),
            network(),
            &preserved,
            1_700_000_000_000,
            ThresholdSet::default(),
        );
        assert_eq!(record.status, DeviceStatus::Assigned);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["assignedParcelId"], json!(42));
        assert_eq!(value["registeredAt"], json!(1690000000123.7));

        let padded = json!({"assignedParcelId": " PCL-9 "});
        let record = DeviceRecord::merged(
            &identity(),
            network(),
            &PreservedFields::from_existing(Some(&padded)),
            1_700_000_000_000,
            ThresholdSet::default(),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["assignedParcelId"], " PCL-9 ");
        assert_eq!(value["status"], "assigned");
    }

    #[test]
    fn test_numeric_registration_time_is_accepted() {
        let existing = json!({"registeredAt": 1690000000000u64, "assignedParcelId": ""});
        let preserved = PreservedFields::from_existing(Some(&existing));
        assert_eq!(preserved.registered_at_ms(), Some(1_690_000_000_000));
        assert!(!preserved.is_assigned());
    }

    #[test]
    fn test_record_round_trips_from_store() {
        let stored = json!({
            "deviceName": "TRACEON_A1B2C3",
            "macAddress": "24:6F:28:A1:B2:C3",
            "firmwareVersion": "1.2.0",
            "registeredAt": 1690000000000u64,
            "assignedParcelId": "PCL-7",
            "status": "assigned",
            "lastSeen": "1700000000000",
            "ipAddress": "10.0.0.7",
            "wifiSSID": "dock-4",
            "localAccess": "http://10.0.0.7",
            "mdnsAccess": "http://traceon.local"
        });
        let record: DeviceRecord = serde_json::from_value(stored).unwrap();
        assert_eq!(record.registered_at_ms(), Some(1_690_000_000_000));
        assert_eq!(record.assigned_parcel_id, json!("PCL-7"));
        assert_eq!(record.last_seen, 1_700_000_000_000);
        assert_eq!(record.network, network());
        assert!(record.thresholds.is_none());
    }
}
