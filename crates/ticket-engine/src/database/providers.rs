//! Provider and store operations

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{parse_label, parse_opt_uuid, parse_uuid, SqliteStore};
use crate::error::{Result, TicketEngineError};
use crate::repository::{ProviderRepository, StoreRepository};
use crate::types::{GeoPoint, ServiceProvider, Store};

const PROVIDER_COLUMNS: &str = r#"
    p.id, p.company_name, p.skills, p.primary_location_coordinates,
    p.capacity_per_day, p.current_load, p.approval_status,
    EXISTS (
        SELECT 1 FROM provider_users u
        WHERE u.service_provider_id = p.id AND u.is_active = 1
    ) AS has_active_user
"#;

/// Provider row as stored
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DbServiceProvider {
    pub id: String,
    pub company_name: String,
    pub skills: String,
    pub primary_location_coordinates: Option<String>,
    pub capacity_per_day: i64,
    pub current_load: i64,
    pub approval_status: String,
    pub has_active_user: i64,
}

impl DbServiceProvider {
    pub fn into_provider(self) -> Result<ServiceProvider> {
        let id = parse_uuid(&self.id)?;
        let location = self
            .primary_location_coordinates
            .as_deref()
            .and_then(|raw| match serde_json::from_str::<GeoPoint>(raw) {
                Ok(point) => Some(point),
                Err(e) => {
                    warn!("Invalid coordinates for provider {}: {}", id, e);
                    None
                }
            });

        let skills = serde_json::from_str::<Vec<String>>(&self.skills).unwrap_or_else(|e| {
            warn!("Invalid skills for provider {}: {}", id, e);
            Vec::new()
        });

        Ok(ServiceProvider {
            id,
            company_name: self.company_name,
            skills,
            location,
            capacity_per_day: self.capacity_per_day.max(0) as u32,
            current_load: self.current_load.max(0) as u32,
            approval_status: parse_label(&self.approval_status)?,
            active: self.has_active_user != 0,
        })
    }
}

/// Store row as stored
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct DbStore {
    pub id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub moderator_user_id: Option<String>,
}

impl DbStore {
    /// Missing coordinates load as NaN and fail routing with `InvalidLocation`
    pub fn into_store(self) -> Result<Store> {
        Ok(Store {
            id: parse_uuid(&self.id)?,
            name: self.name,
            location: GeoPoint::new(
                self.latitude.unwrap_or(f64::NAN),
                self.longitude.unwrap_or(f64::NAN),
            ),
            moderator_id: parse_opt_uuid(self.moderator_user_id.as_deref())?,
        })
    }
}

impl SqliteStore {
    /// Link a user account to a provider
    pub async fn link_provider_user(&self, provider_id: Uuid, user_id: Uuid, is_active: bool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO provider_users (user_id, service_provider_id, is_active)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                service_provider_id = excluded.service_provider_id,
                is_active = excluded.is_active
            "#,
        )
        .bind(user_id.to_string())
        .bind(provider_id.to_string())
        .bind(is_active)
        .execute(self.pool())
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ProviderRepository for SqliteStore {
    async fn find_approved_with_capacity(&self) -> Result<Vec<ServiceProvider>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM service_providers p
            WHERE p.approval_status = 'APPROVED'
              AND p.current_load < p.capacity_per_day
              AND EXISTS (
                  SELECT 1 FROM provider_users u
                  WHERE u.service_provider_id = p.id AND u.is_active = 1
              )
            ORDER BY p.id
            "#,
            PROVIDER_COLUMNS
        );

        let rows: Vec<DbServiceProvider> = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        debug!("🔍 {} approved providers with capacity", rows.len());
        rows.into_iter().map(DbServiceProvider::into_provider).collect()
    }

    async fn find_provider(&self, id: Uuid) -> Result<Option<ServiceProvider>> {
        let sql = format!(
            "SELECT {} FROM service_providers p WHERE p.id = ?",
            PROVIDER_COLUMNS
        );
        let row: Option<DbServiceProvider> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(DbServiceProvider::into_provider).transpose()
    }

    /// Upsert the provider. The `active` flag is kept in line with the linked
    /// user accounts: `false` deactivates all of them, `true` activates a
    /// primary account (keyed by the provider id) when none is active.
    async fn save_provider(&self, provider: &ServiceProvider) -> Result<()> {
        let skills = serde_json::to_string(&provider.skills)?;
        let coordinates = provider
            .location
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let id = provider.id.to_string();

        let mut tx = self.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO service_providers
                (id, company_name, skills, primary_location_coordinates,
                 capacity_per_day, current_load, approval_status)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                company_name = excluded.company_name,
                skills = excluded.skills,
                primary_location_coordinates = excluded.primary_location_coordinates,
                capacity_per_day = excluded.capacity_per_day,
                current_load = excluded.current_load,
                approval_status = excluded.approval_status
            "#,
        )
        .bind(&id)
        .bind(&provider.company_name)
        .bind(skills)
        .bind(coordinates)
        .bind(provider.capacity_per_day as i64)
        .bind(provider.current_load as i64)
        .bind(provider.approval_status.as_str())
        .execute(&mut *tx)
        .await?;

        if provider.active {
            sqlx::query(
                r#"
                INSERT INTO provider_users (user_id, service_provider_id, is_active)
                SELECT ?, ?, 1
                WHERE NOT EXISTS (
                    SELECT 1 FROM provider_users
                    WHERE service_provider_id = ? AND is_active = 1
                )
                ON CONFLICT(user_id) DO UPDATE SET is_active = 1
                "#,
            )
            .bind(&id)
            .bind(&id)
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query("UPDATE provider_users SET is_active = 0 WHERE service_provider_id = ?")
                .bind(&id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn increment_load(&self, id: Uuid, delta: u32) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE service_providers
            SET current_load = current_load + ?
            WHERE id = ? AND current_load + ? <= capacity_per_day
            "#,
        )
        .bind(delta as i64)
        .bind(id.to_string())
        .bind(delta as i64)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_provider(id).await? {
                Some(_) => Err(TicketEngineError::AssignmentConflict(id)),
                None => Err(TicketEngineError::not_found(format!("provider {}", id))),
            };
        }
        Ok(())
    }

    async fn decrement_load(&self, id: Uuid, delta: u32) -> Result<()> {
        let result = sqlx::query(
            "UPDATE service_providers SET current_load = MAX(0, current_load - ?) WHERE id = ?",
        )
        .bind(delta as i64)
        .bind(id.to_string())
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(TicketEngineError::not_found(format!("provider {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreRepository for SqliteStore {
    async fn find_store(&self, id: Uuid) -> Result<Option<Store>> {
        let row: Option<DbStore> = sqlx::query_as(
            "SELECT id, name, latitude, longitude, moderator_user_id FROM stores WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(self.pool())
        .await?;
        row.map(DbStore::into_store).transpose()
    }

    async fn save_store(&self, store: &Store) -> Result<()> {
        let finite = |v: f64| if v.is_finite() { Some(v) } else { None };

        sqlx::query(
            r#"
            INSERT INTO stores (id, name, latitude, longitude, moderator_user_id)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                moderator_user_id = excluded.moderator_user_id
            "#,
        )
        .bind(store.id.to_string())
        .bind(&store.name)
        .bind(finite(store.location.latitude))
        .bind(finite(store.location.longitude))
        .bind(store.moderator_id.map(|id| id.to_string()))
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
