use crate::errors::{Error, Result};
use crate::model::{DeviceUpdate, NewDevice};

pub const STATUSES: [&str; 3] = ["active", "inactive", "error"];

const NAME_MAX: usize = 100;
const TYPE_MAX: usize = 50;

/// Validates a create payload
pub fn validate_new(device: &NewDevice) -> Result<()> {
    validate_name(&device.name)?;

    if device.device_type.trim().is_empty() {
        return Err(Error::Validation("Device type cannot be empty".to_string()));
    }
    if device.device_type.chars().count() > TYPE_MAX {
        return Err(Error::Validation(format!(
            "Device type longer than {} characters",
            TYPE_MAX
        )));
    }

    validate_status(&device.status)?;
    validate_finite("battery_level", device.battery_level)?;
    validate_finite("location_x", device.location_x)?;
    validate_finite("location_y", device.location_y)?;

    Ok(())
}

/// Validates the fields present in a partial update
pub fn validate_update(update: &DeviceUpdate) -> Result<()> {
    if let Some(name) = &update.name {
        validate_name(name)?;
    }
    if let Some(status) = &update.status {
        validate_status(status)?;
    }
    if let Some(level) = update.battery_level {
        validate_finite("battery_level", level)?;
    }
    if let Some(x) = update.location_x {
        validate_finite("location_x", x)?;
    }
    if let Some(y) = update.location_y {
        validate_finite("location_y", y)?;
    }

    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation("Device name cannot be empty".to_string()));
    }
    if name.chars().count() > NAME_MAX {
        return Err(Error::Validation(format!(
            "Device name longer than {} characters",
            NAME_MAX
        )));
    }
    Ok(())
}

fn validate_status(status: &str) -> Result<()> {
    if !STATUSES.contains(&status) {
        return Err(Error::Validation(format!(
            "Status {:?} must be one of {:?}",
            status, STATUSES
        )));
    }
    Ok(())
}

// Battery level has no range check; only NaN/inf are rejected.
fn validate_finite(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::Validation(format!("{} must be a finite number", field)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_device() -> NewDevice {
        NewDevice {
            name: "rover".to_string(),
            device_type: "robot".to_string(),
            status: "active".to_string(),
            battery_level: 80.0,
            location_x: 0.0,
            location_y: 0.0,
            is_online: true,
        }
    }

    #[test]
    fn test_valid_device() {
        assert!(validate_new(&new_device()).is_ok());
    }

    #[test]
    fn test_empty_name() {
        let mut device = new_device();
        device.name = "   ".to_string();

        assert!(validate_new(&device).is_err());
    }

    #[test]
    fn test_length_limits_count_characters() {
        let mut device = new_device();
        device.name = "로봇".repeat(20);
        device.device_type = "센서".repeat(25);
        assert!(validate_new(&device).is_ok());

        device.name = "로".repeat(NAME_MAX + 1);
        assert!(validate_new(&device).is_err());

        let mut device = new_device();
        device.device_type = "센".repeat(TYPE_MAX + 1);
        assert!(validate_new(&device).is_err());
    }

    #[test]
    fn test_empty_type() {
        let mut device = new_device();
        device.device_type = "".to_string();

        assert!(validate_new(&device).is_err());
    }

    #[test]
    fn test_unknown_status() {
        let mut device = new_device();
        device.status = "exploded".to_string();

        assert!(validate_new(&device).is_err());
    }

    #[test]
    fn test_battery_out_of_usual_range_is_accepted() {
        let mut device = new_device();
        device.battery_level = 150.0;
        assert!(validate_new(&device).is_ok());

        device.battery_level = -5.0;
        assert!(validate_new(&device).is_ok());
    }

    #[test]
    fn test_nan_battery() {
        let mut device = new_device();
        device.battery_level = f64::NAN;

        assert!(validate_new(&device).is_err());
    }

    #[test]
    fn test_update_checks_only_present_fields() {
        assert!(validate_update(&DeviceUpdate::default()).is_ok());

        let update = DeviceUpdate {
            status: Some("error".to_string()),
            ..Default::default()
        };
        assert!(validate_update(&update).is_ok());

        let update = DeviceUpdate {
            name: Some("".to_string()),
            ..Default::default()
        };
        assert!(validate_update(&update).is_err());
    }
}
