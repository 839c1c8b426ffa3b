use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::NetworkConfig;

/// Station link state as seen by the engine. Provisioning and reconnection
/// live outside this crate; the engine only asks whether it may talk to the
/// remote store and what to report about the link.
pub trait NetworkLink: Send + Sync {
    fn is_connected(&self) -> bool;

    fn ssid(&self) -> String;

    fn rssi(&self) -> i32;

    fn ip_address(&self) -> String;
}

/// Link with fixed location hints and a switchable connected flag
#[derive(Debug, Clone)]
pub struct StaticNetworkLink {
    connected: Arc<AtomicBool>,
    ssid: String,
    rssi: i32,
    ip_address: String,
}

impl StaticNetworkLink {
    pub fn new(config: &NetworkConfig) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(config.connected)),
            ssid: config.ssid.clone(),
            rssi: config.rssi,
            ip_address: config.ip_address.clone(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Flip the connected flag, returning the new state
    pub fn toggle(&self) -> bool {
        !self.connected.fetch_xor(true, Ordering::SeqCst)
    }
}

impl NetworkLink for StaticNetworkLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ssid(&self) -> String {
        self.ssid.clone()
    }

    fn rssi(&self) -> i32 {
        self.rssi
    }

    fn ip_address(&self) -> String {
        self.ip_address.clone()
    }
}

/// Location hints written into the device record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    pub ip_address: String,
    #[serde(rename = "wifiSSID")]
    pub wifi_ssid: String,
    pub local_access: String,
    pub mdns_access: String,
}

impl NetworkInfo {
    pub fn from_link(link: &dyn NetworkLink, mdns_hostname: &str) -> Self {
        let ip_address = link.ip_address();
        Self {
            local_access: format!("http://{}", ip_address),
            mdns_access: format!("http://{}.local", mdns_hostname),
            wifi_ssid: link.ssid(),
            ip_address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> NetworkConfig {
        NetworkConfig {
            connected: true,
            ssid: "warehouse".to_string(),
            ip_address: "192.168.4.20".to_string(),
            rssi: -71,
        }
    }

    #[test]
    fn test_toggle_connected() {
        let link = StaticNetworkLink::new(&config());
        assert!(link.is_connected());
        assert!(!link.toggle());
        assert!(!link.is_connected());

        let shared = link.clone();
        shared.set_connected(true);
        assert!(link.is_connected());
    }

    #[test]
    fn test_network_info_wire_names() {
        let link = StaticNetworkLink::new(&config());
        let info = NetworkInfo::from_link(&link, "traceon");
        assert_eq!(info.local_access, "http://192.168.4.20");
        assert_eq!(info.mdns_access, "http://traceon.local");

        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["wifiSSID"], "warehouse");
        assert_eq!(value["ipAddress"], "192.168.4.20");
        assert_eq!(value["localAccess"], "http://192.168.4.20");
    }
}
