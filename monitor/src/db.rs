use crate::errors::{Error, Result};
use crate::model::{Device, DeviceUpdate, ListParams, NewDevice};
use crate::store::DeviceStore;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{error, info, warn};

const MAX_ATTEMPTS: u32 = 5;

const COLUMNS: &str =
    "id, name, type, status, battery_level, location_x, location_y, last_updated, is_online";

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Postgres-backed device records
#[derive(Debug, Clone)]
pub struct PgDeviceStore {
    pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn list_all_inner(&self) -> Result<Vec<Device>> {
        let query = format!("SELECT {} FROM devices ORDER BY id", COLUMNS);
        let devices = sqlx::query_as::<_, Device>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(devices)
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn list(&self, params: ListParams) -> Result<Vec<Device>> {
        let query = format!(
            "SELECT {} FROM devices ORDER BY id LIMIT $1 OFFSET $2",
            COLUMNS
        );
        let devices = sqlx::query_as::<_, Device>(&query)
            .bind(params.limit() as i64)
            .bind(params.skip() as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(devices)
    }

    // Every live feed calls this once per tick, so connection blips are retried.
    async fn list_all(&self) -> Result<Vec<Device>> {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match self.list_all_inner().await {
                Ok(devices) => return Ok(devices),
                Err(Error::Database(db_err))
                    if attempts < MAX_ATTEMPTS && is_transient_error(&db_err) =>
                {
                    let wait_ms = 100 * 2_u64.pow(attempts - 1).min(32);
                    warn!(
                        "Device query failed (attempt {}/{}), retrying in {}ms: {}",
                        attempts, MAX_ATTEMPTS, wait_ms, db_err
                    );
                    tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                }
                Err(e) => {
                    error!("Device query failed after {} attempts: {}", attempts, e);
                    return Err(e);
                }
            }
        }
    }

    async fn get(&self, id: i64) -> Result<Device> {
        let query = format!("SELECT {} FROM devices WHERE id = $1", COLUMNS);
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound(id))
    }

    async fn create(&self, device: NewDevice) -> Result<Device> {
        let query = format!(
            "INSERT INTO devices (name, type, status, battery_level, location_x, location_y, is_online, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
             RETURNING {}",
            COLUMNS
        );
        let created = sqlx::query_as::<_, Device>(&query)
            .bind(&device.name)
            .bind(&device.device_type)
            .bind(&device.status)
            .bind(device.battery_level)
            .bind(device.location_x)
            .bind(device.location_y)
            .bind(device.is_online)
            .fetch_one(&self.pool)
            .await?;
        Ok(created)
    }

    async fn update(&self, id: i64, update: DeviceUpdate) -> Result<Device> {
        let query = format!(
            "UPDATE devices SET
                name = COALESCE($2, name),
                status = COALESCE($3, status),
                battery_level = COALESCE($4, battery_level),
                location_x = COALESCE($5, location_x),
                location_y = COALESCE($6, location_y),
                is_online = COALESCE($7, is_online),
                last_updated = GREATEST(last_updated, NOW())
             WHERE id = $1
             RETURNING {}",
            COLUMNS
        );
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .bind(update.name)
            .bind(update.status)
            .bind(update.battery_level)
            .bind(update.location_x)
            .bind(update.location_y)
            .bind(update.is_online)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound(id))
    }

    async fn delete(&self, id: i64) -> Result<Device> {
        let query = format!("DELETE FROM devices WHERE id = $1 RETURNING {}", COLUMNS);
        sqlx::query_as::<_, Device>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::NotFound(id))
    }
}

fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => true,
        sqlx::Error::Database(db_err) => {
            // Connection-class SQLSTATEs
            db_err.code().is_some_and(|code| {
                code == "08000" || // connection_exception
                code == "08003" || // connection_does_not_exist
                code == "08006" || // connection_failure
                code == "57P03" || // cannot_connect_now
                code == "53300" // too_many_connections
            })
        }
        _ => false,
    }
}
