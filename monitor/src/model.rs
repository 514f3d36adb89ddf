use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_STATUS: &str = "active";
pub const DEFAULT_BATTERY_LEVEL: f64 = 100.0;

/// Monitored unit (robot, server, sensor, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub device_type: String,
    pub status: String,
    pub battery_level: f64,
    pub location_x: f64,
    pub location_y: f64,
    pub last_updated: DateTime<Utc>,
    pub is_online: bool,
}

/// Create payload. Everything but `name` and `type` has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_battery_level")]
    pub battery_level: f64,
    #[serde(default)]
    pub location_x: f64,
    #[serde(default)]
    pub location_y: f64,
    #[serde(default = "default_is_online")]
    pub is_online: bool,
}

/// Partial update. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub name: Option<String>,
    pub status: Option<String>,
    pub battery_level: Option<f64>,
    pub location_x: Option<f64>,
    pub location_y: Option<f64>,
    pub is_online: Option<bool>,
}

impl DeviceUpdate {
    /// Overwrite the supplied fields on `device`.
    pub fn apply_to(&self, device: &mut Device) {
        if let Some(name) = &self.name {
            device.name = name.clone();
        }
        if let Some(status) = &self.status {
            device.status = status.clone();
        }
        if let Some(level) = self.battery_level {
            device.battery_level = level;
        }
        if let Some(x) = self.location_x {
            device.location_x = x;
        }
        if let Some(y) = self.location_y {
            device.location_y = y;
        }
        if let Some(online) = self.is_online {
            device.is_online = online;
        }
    }
}

/// Pagination for device listings
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ListParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl ListParams {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 1000;

    pub fn skip(&self) -> usize {
        self.skip.unwrap_or(0)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }
}

/// Per-device payload pushed on the live feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub device_type: String,
    pub status: String,
    pub battery_level: f64,
    pub location_x: f64,
    pub location_y: f64,
    pub is_online: bool,
    pub last_updated: String,
}

impl From<&Device> for DeviceSnapshot {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            name: device.name.clone(),
            device_type: device.device_type.clone(),
            status: device.status.clone(),
            battery_level: device.battery_level,
            location_x: device.location_x,
            location_y: device.location_y,
            is_online: device.is_online,
            last_updated: device.last_updated.to_rfc3339(),
        }
    }
}

/// Top-level message on the live feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Vec<DeviceSnapshot>,
}

impl Envelope {
    pub const DEVICES_UPDATE: &'static str = "devices_update";

    pub fn devices_update(devices: &[Device]) -> Self {
        Self {
            kind: Self::DEVICES_UPDATE.to_string(),
            data: devices.iter().map(DeviceSnapshot::from).collect(),
        }
    }
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}

fn default_battery_level() -> f64 {
    DEFAULT_BATTERY_LEVEL
}

fn default_is_online() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            id: 7,
            name: "arm-1".to_string(),
            device_type: "robot".to_string(),
            status: "active".to_string(),
            battery_level: 55.5,
            location_x: 1.0,
            location_y: 2.0,
            last_updated: Utc::now(),
            is_online: true,
        }
    }

    #[test]
    fn test_new_device_defaults() {
        let new: NewDevice =
            serde_json::from_str(r#"{"name": "thermo", "type": "sensor"}"#).unwrap();

        assert_eq!(new.status, "active");
        assert_eq!(new.battery_level, 100.0);
        assert_eq!(new.location_x, 0.0);
        assert_eq!(new.location_y, 0.0);
        assert!(new.is_online);
    }

    #[test]
    fn test_update_touches_only_supplied_fields() {
        let mut d = device();
        let update: DeviceUpdate =
            serde_json::from_str(r#"{"battery_level": 12.0, "is_online": false}"#).unwrap();

        update.apply_to(&mut d);

        assert_eq!(d.battery_level, 12.0);
        assert!(!d.is_online);
        assert_eq!(d.name, "arm-1");
        assert_eq!(d.status, "active");
        assert_eq!(d.location_x, 1.0);
    }

    #[test]
    fn test_envelope_shape() {
        let d = device();
        let value = serde_json::to_value(Envelope::devices_update(&[d.clone()])).unwrap();

        assert_eq!(value["type"], "devices_update");
        let snap = &value["data"][0];
        assert_eq!(snap["id"], 7);
        assert_eq!(snap["type"], "robot");
        assert_eq!(snap["battery_level"], 55.5);
        assert_eq!(snap["is_online"], true);
        assert_eq!(snap["last_updated"], d.last_updated.to_rfc3339());
    }

    #[test]
    fn test_list_params_limit_capped() {
        let params = ListParams {
            skip: None,
            limit: Some(5000),
        };
        assert_eq!(params.limit(), ListParams::MAX_LIMIT);
        assert_eq!(params.skip(), 0);
    }
}
