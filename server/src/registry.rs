use crate::errors::Result;
use crate::model::{
    Device, DevicePatch, Group, GroupPatch, Location, LocationPatch, NewDevice, NewGroup,
    NewLocation, NewNotification, Notification,
};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// The slice of the record store the ingest path depends on. The Postgres
/// registry implements it for real; tests substitute an in-memory one.
pub trait DeviceRegistry {
    async fn device_by_thing_name(&self, thing_name: &str) -> Result<Option<Device>>;
    async fn update_device(&self, id: Uuid, patch: &DevicePatch) -> Result<Option<Device>>;
    async fn create_notification(&self, new: &NewNotification) -> Result<Notification>;
}

#[derive(Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to database...");
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;

        info!("Database connection established");
        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Migrations completed");

        Ok(Self { pool })
    }

    // ── Locations ───────────────────────────────────────────────────

    pub async fn locations(&self) -> Result<Vec<Location>> {
        Ok(
            sqlx::query_as::<_, Location>("SELECT * FROM locations ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn location(&self, id: Uuid) -> Result<Option<Location>> {
        Ok(
            sqlx::query_as::<_, Location>("SELECT * FROM locations WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn create_location(&self, new: &NewLocation) -> Result<Location> {
        Ok(sqlx::query_as::<_, Location>(
            "INSERT INTO locations (name, address) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.address)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_location(
        &self,
        id: Uuid,
        patch: &LocationPatch,
    ) -> Result<Option<Location>> {
        Ok(sqlx::query_as::<_, Location>(
            "UPDATE locations
             SET name = COALESCE($2, name), address = COALESCE($3, address)
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(&patch.address)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn delete_location(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM locations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Groups ──────────────────────────────────────────────────────

    pub async fn groups(&self) -> Result<Vec<Group>> {
        Ok(
            sqlx::query_as::<_, Group>("SELECT * FROM groups ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn group(&self, id: Uuid) -> Result<Option<Group>> {
        Ok(
            sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn create_group(&self, new: &NewGroup) -> Result<Group> {
        Ok(sqlx::query_as::<_, Group>(
            "INSERT INTO groups (name, location_id) VALUES ($1, $2) RETURNING *",
        )
        .bind(&new.name)
        .bind(new.location_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_group(&self, id: Uuid, patch: &GroupPatch) -> Result<Option<Group>> {
        Ok(sqlx::query_as::<_, Group>(
            "UPDATE groups
             SET name = COALESCE($2, name), location_id = COALESCE($3, location_id)
             WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(&patch.name)
        .bind(patch.location_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn delete_group(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Devices ─────────────────────────────────────────────────────

    pub async fn devices(&self) -> Result<Vec<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn device(&self, id: Uuid) -> Result<Option<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    pub async fn create_device(&self, new: &NewDevice) -> Result<Device> {
        Ok(sqlx::query_as::<_, Device>(
            "INSERT INTO devices (name, serial_number, group_id, location_id, status, mode,
                fire_status, battery_level, pressure_level, co2_level, particulate_matter,
                wind_speed, wind_direction, height, last_maintenance, x, y, aws_thing_name)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18)
             RETURNING *",
        )
        .bind(&new.name)
        .bind(&new.serial_number)
        .bind(new.group_id)
        .bind(new.location_id)
        .bind(new.status)
        .bind(new.mode)
        .bind(new.fire_status)
        .bind(new.battery_level)
        .bind(new.pressure_level)
        .bind(new.co2_level)
        .bind(new.particulate_matter)
        .bind(new.wind_speed)
        .bind(new.wind_direction)
        .bind(new.height)
        .bind(&new.last_maintenance)
        .bind(new.x)
        .bind(new.y)
        .bind(&new.aws_thing_name)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn delete_device(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ── Notifications ───────────────────────────────────────────────

    pub async fn notifications(&self) -> Result<Vec<Notification>> {
        Ok(sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications ORDER BY timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn unread_notifications(&self) -> Result<Vec<Notification>> {
        Ok(sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE read = FALSE ORDER BY timestamp DESC",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn mark_notification_read(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_notification(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

impl DeviceRegistry for PgRegistry {
    async fn device_by_thing_name(&self, thing_name: &str) -> Result<Option<Device>> {
        Ok(
            sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE aws_thing_name = $1")
                .bind(thing_name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn update_device(&self, id: Uuid, patch: &DevicePatch) -> Result<Option<Device>> {
        if patch.is_empty() {
            return self.device(id).await;
        }

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE devices SET ");
        {
            let mut field = query.separated(", ");
            if let Some(v) = &patch.name {
                field.push("name = ").push_bind_unseparated(v);
            }
            if let Some(v) = &patch.serial_number {
                field.push("serial_number = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.group_id {
                field.push("group_id = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.location_id {
                field.push("location_id = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.status {
                field.push("status = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.mode {
                field.push("mode = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.fire_status {
                field.push("fire_status = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.battery_level {
                field.push("battery_level = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.pressure_level {
                field.push("pressure_level = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.co2_level {
                field.push("co2_level = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.particulate_matter {
                field
                    .push("particulate_matter = ")
                    .push_bind_unseparated(v);
            }
            if let Some(v) = patch.wind_speed {
                field.push("wind_speed = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.wind_direction {
                field.push("wind_direction = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.height {
                field.push("height = ").push_bind_unseparated(v);
            }
            if let Some(v) = &patch.last_maintenance {
                field.push("last_maintenance = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.x {
                field.push("x = ").push_bind_unseparated(v);
            }
            if let Some(v) = patch.y {
                field.push("y = ").push_bind_unseparated(v);
            }
            if let Some(v) = &patch.aws_thing_name {
                field.push("aws_thing_name = ").push_bind_unseparated(v);
            }
        }
        query.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        Ok(query
            .build_query_as::<Device>()
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create_notification(&self, new: &NewNotification) -> Result<Notification> {
        Ok(sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (type, title, message, device_id, read)
             VALUES ($1, $2, $3, $4, $5) RETURNING *",
        )
        .bind(new.kind)
        .bind(&new.title)
        .bind(&new.message)
        .bind(new.device_id)
        .bind(new.read)
        .fetch_one(&self.pool)
        .await?)
    }
}
