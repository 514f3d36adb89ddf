use crate::errors::{Error, Result};
use crate::model::{Device, DeviceUpdate, ListParams, NewDevice};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Read/write access to device records.
///
/// Implementations must be safe to share between HTTP handlers and every
/// live feed; each call reflects the latest committed state.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// One page of devices, ordered by id.
    async fn list(&self, params: ListParams) -> Result<Vec<Device>>;

    /// The complete collection, ordered by id.
    async fn list_all(&self) -> Result<Vec<Device>>;

    async fn get(&self, id: i64) -> Result<Device>;

    async fn create(&self, device: NewDevice) -> Result<Device>;

    async fn update(&self, id: i64, update: DeviceUpdate) -> Result<Device>;

    /// Removes the record and returns it as it was.
    async fn delete(&self, id: i64) -> Result<Device>;
}

/// In-process store used for demos and tests.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    inner: RwLock<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: i64,
    devices: BTreeMap<i64, Device>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list(&self, params: ListParams) -> Result<Vec<Device>> {
        let inner = self.inner.read();
        Ok(inner
            .devices
            .values()
            .skip(params.skip())
            .take(params.limit())
            .cloned()
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Device>> {
        Ok(self.inner.read().devices.values().cloned().collect())
    }

    async fn get(&self, id: i64) -> Result<Device> {
        self.inner
            .read()
            .devices
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound(id))
    }

    async fn create(&self, new: NewDevice) -> Result<Device> {
        let mut inner = self.inner.write();
        inner.next_id += 1;
        let device = Device {
            id: inner.next_id,
            name: new.name,
            device_type: new.device_type,
            status: new.status,
            battery_level: new.battery_level,
            location_x: new.location_x,
            location_y: new.location_y,
            last_updated: Utc::now(),
            is_online: new.is_online,
        };
        inner.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn update(&self, id: i64, update: DeviceUpdate) -> Result<Device> {
        let mut inner = self.inner.write();
        let device = inner.devices.get_mut(&id).ok_or(Error::NotFound(id))?;
        update.apply_to(device);
        // Clock steps backwards must not move the timestamp back.
        device.last_updated = device.last_updated.max(Utc::now());
        Ok(device.clone())
    }

    async fn delete(&self, id: i64) -> Result<Device> {
        self.inner
            .write()
            .devices
            .remove(&id)
            .ok_or(Error::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_device(name: &str) -> NewDevice {
        NewDevice {
            name: name.to_string(),
            device_type: "sensor".to_string(),
            status: "active".to_string(),
            battery_level: 100.0,
            location_x: 0.0,
            location_y: 0.0,
            is_online: true,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryDeviceStore::new();

        let a = store.create(new_device("a")).await.unwrap();
        let b = store.create(new_device("b")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_update_keeps_id_and_advances_timestamp() {
        let store = MemoryDeviceStore::new();
        let created = store.create(new_device("a")).await.unwrap();

        let updated = store
            .update(
                created.id,
                DeviceUpdate {
                    battery_level: Some(5.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "a");
        assert_eq!(updated.battery_level, 5.0);
        assert!(updated.last_updated >= created.last_updated);
    }

    #[test]
    fn test_missing_device() {
        tokio_test::block_on(async {
            let store = MemoryDeviceStore::new();

            assert!(matches!(store.get(42).await, Err(Error::NotFound(42))));
            assert!(matches!(
                store.update(42, DeviceUpdate::default()).await,
                Err(Error::NotFound(42))
            ));
            assert!(matches!(store.delete(42).await, Err(Error::NotFound(42))));
        });
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let store = MemoryDeviceStore::new();
        for i in 0..5 {
            store.create(new_device(&format!("d{}", i))).await.unwrap();
        }

        let page = store
            .list(ListParams {
                skip: Some(1),
                limit: Some(2),
            })
            .await
            .unwrap();

        let ids: Vec<i64> = page.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_delete_returns_removed_record() {
        tokio_test::block_on(async {
            let store = MemoryDeviceStore::new();
            let created = store.create(new_device("gone")).await.unwrap();

            let deleted = store.delete(created.id).await.unwrap();

            assert_eq!(deleted, created);
            assert!(store.list_all().await.unwrap().is_empty());
        });
    }
}
