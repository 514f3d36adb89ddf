//! Alert categories derived from device state. Nothing here is stored;
//! callers pass in a fresh read of the collection.

use crate::model::Device;
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_LOW_BATTERY_THRESHOLD: f64 = 20.0;
pub const CRITICAL_BATTERY_LEVEL: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertCategory {
    LowBattery,
    Offline,
    Critical,
}

/// Strictly below `threshold` and still online.
pub fn is_low_battery(device: &Device, threshold: f64) -> bool {
    device.battery_level < threshold && device.is_online
}

pub fn is_offline(device: &Device) -> bool {
    !device.is_online
}

/// Online state does not matter here.
pub fn is_critical(device: &Device) -> bool {
    device.battery_level < CRITICAL_BATTERY_LEVEL || device.status == "error"
}

pub fn low_battery(devices: Vec<Device>, threshold: f64) -> Vec<Device> {
    devices
        .into_iter()
        .filter(|d| is_low_battery(d, threshold))
        .collect()
}

pub fn offline(devices: Vec<Device>) -> Vec<Device> {
    devices.into_iter().filter(is_offline).collect()
}

pub fn critical(devices: Vec<Device>) -> Vec<Device> {
    devices.into_iter().filter(is_critical).collect()
}

/// Every category a device currently falls into.
pub fn categories(device: &Device, threshold: f64) -> Vec<AlertCategory> {
    let mut found = Vec::new();
    if is_low_battery(device, threshold) {
        found.push(AlertCategory::LowBattery);
    }
    if is_offline(device) {
        found.push(AlertCategory::Offline);
    }
    if is_critical(device) {
        found.push(AlertCategory::Critical);
    }
    found
}

/// Per-category device counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AlertSummary {
    #[serde(rename = "low-battery")]
    pub low_battery: usize,
    pub offline: usize,
    pub critical: usize,
}

pub fn summary(devices: &[Device], threshold: f64) -> AlertSummary {
    let mut summary = AlertSummary::default();
    for category in devices.iter().flat_map(|d| categories(d, threshold)) {
        match category {
            AlertCategory::LowBattery => summary.low_battery += 1,
            AlertCategory::Offline => summary.offline += 1,
            AlertCategory::Critical => summary.critical += 1,
        }
    }
    summary
}

/// Dashboard headline figures for the whole fleet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetStats {
    pub total: usize,
    pub online: usize,
    pub by_type: BTreeMap<String, usize>,
    pub average_battery: f64,
}

impl FleetStats {
    pub fn from_devices(devices: &[Device]) -> Self {
        let mut by_type = BTreeMap::new();
        for device in devices {
            *by_type.entry(device.device_type.clone()).or_insert(0) += 1;
        }

        let average_battery = if devices.is_empty() {
            0.0
        } else {
            devices.iter().map(|d| d.battery_level).sum::<f64>() / devices.len() as f64
        };

        Self {
            total: devices.len(),
            online: devices.iter().filter(|d| d.is_online).count(),
            by_type,
            average_battery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn device(id: i64, battery_level: f64, status: &str, is_online: bool) -> Device {
        Device {
            id,
            name: format!("dev-{}", id),
            device_type: "robot".to_string(),
            status: status.to_string(),
            battery_level,
            location_x: 0.0,
            location_y: 0.0,
            last_updated: Utc::now(),
            is_online,
        }
    }

    fn ids(devices: &[Device]) -> Vec<i64> {
        devices.iter().map(|d| d.id).collect()
    }

    #[test]
    fn test_low_battery_threshold_is_strict() {
        let fleet = vec![device(1, 10.0, "active", true)];

        assert_eq!(ids(&low_battery(fleet.clone(), 20.0)), vec![1]);
        assert!(low_battery(fleet, 10.0).is_empty());
    }

    #[test]
    fn test_low_battery_requires_online() {
        let fleet = vec![
            device(1, 5.0, "active", false),
            device(2, 15.0, "active", true),
            device(3, 20.0, "active", true),
        ];

        assert_eq!(ids(&low_battery(fleet, DEFAULT_LOW_BATTERY_THRESHOLD)), vec![2]);
    }

    #[test]
    fn test_error_status_is_critical_but_not_low_battery() {
        let fleet = vec![device(1, 50.0, "error", true)];

        assert_eq!(ids(&critical(fleet.clone())), vec![1]);
        assert!(low_battery(fleet, DEFAULT_LOW_BATTERY_THRESHOLD).is_empty());
    }

    #[test]
    fn test_critical_ignores_online_state() {
        let fleet = vec![
            device(1, 9.9, "inactive", false),
            device(2, 10.0, "active", true),
            device(3, 80.0, "error", false),
        ];

        assert_eq!(ids(&critical(fleet.clone())), vec![1, 3]);
        assert_eq!(ids(&offline(fleet)), vec![1, 3]);
    }

    #[test]
    fn test_empty_fleet() {
        assert!(low_battery(Vec::new(), 20.0).is_empty());
        assert!(offline(Vec::new()).is_empty());
        assert!(critical(Vec::new()).is_empty());
        assert_eq!(summary(&[], 20.0), AlertSummary::default());
    }

    #[test]
    fn test_categories_and_summary() {
        let offline_and_critical = device(1, 3.0, "active", false);
        assert_eq!(
            categories(&offline_and_critical, 20.0),
            vec![AlertCategory::Offline, AlertCategory::Critical]
        );

        let fleet = vec![
            offline_and_critical,
            device(2, 15.0, "active", true),
            device(3, 90.0, "active", true),
        ];
        assert_eq!(
            summary(&fleet, 20.0),
            AlertSummary {
                low_battery: 1,
                offline: 1,
                critical: 1,
            }
        );
    }

    #[test]
    fn test_summary_serializes_category_names() {
        let value = serde_json::to_value(AlertSummary::default()).unwrap();
        assert!(value.get("low-battery").is_some());
        assert_eq!(
            serde_json::to_value(AlertCategory::LowBattery).unwrap(),
            "low-battery"
        );
    }

    #[test]
    fn test_fleet_stats() {
        let mut server = device(3, 40.0, "active", false);
        server.device_type = "server".to_string();
        let fleet = vec![device(1, 100.0, "active", true), device(2, 70.0, "active", true), server];

        let stats = FleetStats::from_devices(&fleet);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.online, 2);
        assert_eq!(stats.by_type.get("robot"), Some(&2));
        assert_eq!(stats.by_type.get("server"), Some(&1));
        assert_eq!(stats.average_battery, 70.0);
        assert_eq!(FleetStats::from_devices(&[]).average_battery, 0.0);
    }
}
