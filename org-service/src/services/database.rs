//! Database service for org-service: the sole writer of persisted
//! organization unit records.

use crate::models::{
    CreateOrganizationUnit, ListUnitsFilter, OrganizationUnit, ParentFilter, Tenant, UnitChanges,
    UnitStatus,
};
use crate::services::metrics::{DB_QUERY_DURATION, ERRORS_TOTAL};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgConnection;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

const UNIT_COLUMNS: &str = "unit_id, tenant_id, name, parent_unit_id, description, \
                            leader_user_id, status, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "org-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Tenant Operations (read-only collaborator data)
    // -------------------------------------------------------------------------

    /// Find a tenant by id.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_tenant_by_id"])
            .start_timer();

        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT tenant_id, tenant_slug, tenant_label, tenant_state_code, created_utc
            FROM tenants
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tenant: {}", e)))?;

        timer.observe_duration();

        Ok(tenant)
    }

    // -------------------------------------------------------------------------
    // Organization Unit Operations
    // -------------------------------------------------------------------------

    /// Insert a new unit. Status is always active on creation.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id))]
    pub async fn insert_unit(
        &self,
        input: &CreateOrganizationUnit,
    ) -> Result<OrganizationUnit, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_unit"])
            .start_timer();

        let unit_id = Uuid::new_v4();
        let unit = sqlx::query_as::<_, OrganizationUnit>(&format!(
            r#"
            INSERT INTO organization_units
                (unit_id, tenant_id, name, parent_unit_id, description, leader_user_id, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {UNIT_COLUMNS}
            "#,
        ))
        .bind(unit_id)
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.parent_unit_id)
        .bind(&input.description)
        .bind(input.leader_user_id)
        .bind(UnitStatus::Active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &input.name))?;

        timer.observe_duration();

        info!(unit_id = %unit.unit_id, name = %unit.name, "Organization unit inserted");

        Ok(unit)
    }

    /// Find a unit by id.
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn find_unit_by_id(
        &self,
        unit_id: Uuid,
    ) -> Result<Option<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_unit_by_id"])
            .start_timer();

        let unit = sqlx::query_as::<_, OrganizationUnit>(&format!(
            "SELECT {UNIT_COLUMNS} FROM organization_units WHERE unit_id = $1",
        ))
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get unit: {}", e)))?;

        timer.observe_duration();

        Ok(unit)
    }

    /// Find a unit by id, scoped to a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, unit_id = %unit_id))]
    pub async fn find_unit_in_tenant(
        &self,
        tenant_id: Uuid,
        unit_id: Uuid,
    ) -> Result<Option<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_unit_in_tenant"])
            .start_timer();

        let unit = sqlx::query_as::<_, OrganizationUnit>(&format!(
            "SELECT {UNIT_COLUMNS} FROM organization_units WHERE tenant_id = $1 AND unit_id = $2",
        ))
        .bind(tenant_id)
        .bind(unit_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get unit: {}", e)))?;

        timer.observe_duration();

        Ok(unit)
    }

    /// Count siblings sharing a name under the same (tenant, parent) group.
    /// A null parent forms the shared root group.
    #[instrument(skip(self, name), fields(tenant_id = %tenant_id))]
    pub async fn count_siblings_with_name(
        &self,
        tenant_id: Uuid,
        parent_unit_id: Option<Uuid>,
        name: &str,
    ) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_siblings_with_name"])
            .start_timer();

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM organization_units
            WHERE tenant_id = $1
              AND name = $2
              AND (($3::uuid IS NULL AND parent_unit_id IS NULL) OR parent_unit_id = $3)
            "#,
        )
        .bind(tenant_id)
        .bind(name)
        .bind(parent_unit_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count siblings: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Paginated flat listing with optional filters, ordered by name.
    #[instrument(skip(self, filter), fields(tenant_id = %filter.tenant_id))]
    pub async fn list_units(
        &self,
        filter: &ListUnitsFilter,
    ) -> Result<Vec<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_units"])
            .start_timer();

        let (roots_only, parent) = parent_binds(filter.parent);
        let limit = filter.page_size as i64;
        let offset = (filter.page.saturating_sub(1) as i64) * limit;

        let units = sqlx::query_as::<_, OrganizationUnit>(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM organization_units
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
              AND ($3::varchar IS NULL OR status = $3)
              AND (NOT $4::bool OR parent_unit_id IS NULL)
              AND ($5::uuid IS NULL OR parent_unit_id = $5)
            ORDER BY name ASC
            LIMIT $6 OFFSET $7
            "#,
        ))
        .bind(filter.tenant_id)
        .bind(&filter.name)
        .bind(filter.status)
        .bind(roots_only)
        .bind(parent)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list units: {}", e)))?;

        timer.observe_duration();

        Ok(units)
    }

    /// Total row count for the same filters as [`list_units`].
    #[instrument(skip(self, filter), fields(tenant_id = %filter.tenant_id))]
    pub async fn count_units(&self, filter: &ListUnitsFilter) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_units"])
            .start_timer();

        let (roots_only, parent) = parent_binds(filter.parent);

        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM organization_units
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
              AND ($3::varchar IS NULL OR status = $3)
              AND (NOT $4::bool OR parent_unit_id IS NULL)
              AND ($5::uuid IS NULL OR parent_unit_id = $5)
            "#,
        )
        .bind(filter.tenant_id)
        .bind(&filter.name)
        .bind(filter.status)
        .bind(roots_only)
        .bind(parent)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count units: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Full-tenant scan used by tree assembly, ordered by name.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_units_by_tenant(
        &self,
        tenant_id: Uuid,
        status: Option<UnitStatus>,
    ) -> Result<Vec<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_units_by_tenant"])
            .start_timer();

        let units = sqlx::query_as::<_, OrganizationUnit>(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM organization_units
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY name ASC
            "#,
        ))
        .bind(tenant_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to scan tenant: {}", e)))?;

        timer.observe_duration();

        Ok(units)
    }

    /// Direct children of a unit, ordered by name.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, parent_unit_id = %parent_unit_id))]
    pub async fn list_children(
        &self,
        tenant_id: Uuid,
        parent_unit_id: Uuid,
    ) -> Result<Vec<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_children"])
            .start_timer();

        let units = sqlx::query_as::<_, OrganizationUnit>(&format!(
            r#"
            SELECT {UNIT_COLUMNS}
            FROM organization_units
            WHERE tenant_id = $1 AND parent_unit_id = $2
            ORDER BY name ASC
            "#,
        ))
        .bind(tenant_id)
        .bind(parent_unit_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list children: {}", e)))?;

        timer.observe_duration();

        Ok(units)
    }

    /// Count units whose parent is the given unit.
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn count_children(&self, unit_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_children"])
            .start_timer();

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM organization_units WHERE parent_unit_id = $1",
        )
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to count children: {}", e)))?;

        timer.observe_duration();

        Ok(count)
    }

    /// Count user profiles assigned to a unit (soft delete check).
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn count_users_assigned(&self, unit_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_users_assigned"])
            .start_timer();

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user_profiles WHERE organization_unit_id = $1",
        )
        .bind(unit_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to count assignments: {}", e))
        })?;

        timer.observe_duration();

        Ok(count)
    }

    /// Apply a partial update. Only supplied fields are written; the tri-state
    /// parent/leader fields clear when explicitly set to null.
    ///
    /// Updates that set a non-null parent must go through [`reparent_unit`]
    /// instead, so the cycle walk and the write share one locked transaction.
    #[instrument(skip(self, changes), fields(unit_id = %unit_id))]
    pub async fn update_unit(
        &self,
        unit_id: Uuid,
        changes: &UnitChanges,
    ) -> Result<Option<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_unit"])
            .start_timer();

        let mut conn = self.pool.acquire().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to acquire connection: {}", e))
        })?;
        let unit = update_unit_on(&mut conn, unit_id, changes).await?;

        timer.observe_duration();

        Ok(unit)
    }

    /// Move a unit under a new parent.
    ///
    /// The ancestor walk and the parent write run in one transaction holding
    /// the tenant's advisory lock, so two concurrent re-parents cannot both
    /// validate against the old hierarchy and commit a cycle. The lock is
    /// transaction-scoped and released on commit or rollback.
    #[instrument(skip(self, changes), fields(unit_id = %unit_id, tenant_id = %tenant_id))]
    pub async fn reparent_unit(
        &self,
        unit_id: Uuid,
        tenant_id: Uuid,
        new_parent_id: Uuid,
        changes: &UnitChanges,
    ) -> Result<Option<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reparent_unit"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to take tenant lock: {}", e))
            })?;

        ensure_no_cycle(&mut tx, unit_id, new_parent_id, tenant_id).await?;

        let unit = update_unit_on(&mut tx, unit_id, changes).await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(unit)
    }

    /// Write a new status. Descendant rows are deliberately untouched.
    #[instrument(skip(self), fields(unit_id = %unit_id, status = %status))]
    pub async fn update_unit_status(
        &self,
        unit_id: Uuid,
        status: UnitStatus,
    ) -> Result<Option<OrganizationUnit>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_unit_status"])
            .start_timer();

        let unit = sqlx::query_as::<_, OrganizationUnit>(&format!(
            r#"
            UPDATE organization_units
            SET status = $2, updated_utc = now()
            WHERE unit_id = $1
            RETURNING {UNIT_COLUMNS}
            "#,
        ))
        .bind(unit_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update status: {}", e)))?;

        timer.observe_duration();

        Ok(unit)
    }

    /// Delete a unit. Returns false when no row matched.
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn delete_unit(&self, unit_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_unit"])
            .start_timer();

        let result = sqlx::query("DELETE FROM organization_units WHERE unit_id = $1")
            .bind(unit_id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                    // Backstop for the service-level child check racing with
                    // a concurrent re-parent.
                    AppError::Conflict(anyhow::anyhow!(
                        "Organization unit still has child units and cannot be deleted"
                    ))
                }
                _ => AppError::DatabaseError(anyhow::anyhow!("Failed to delete unit: {}", e)),
            })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }
}

/// The shared partial-update statement, usable on a plain connection or
/// inside the re-parent transaction.
async fn update_unit_on(
    conn: &mut PgConnection,
    unit_id: Uuid,
    changes: &UnitChanges,
) -> Result<Option<OrganizationUnit>, AppError> {
    sqlx::query_as::<_, OrganizationUnit>(&format!(
        r#"
        UPDATE organization_units
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            parent_unit_id = CASE WHEN $4::bool THEN $5::uuid ELSE parent_unit_id END,
            leader_user_id = CASE WHEN $6::bool THEN $7::uuid ELSE leader_user_id END,
            updated_utc = now()
        WHERE unit_id = $1
        RETURNING {UNIT_COLUMNS}
        "#,
    ))
    .bind(unit_id)
    .bind(&changes.name)
    .bind(&changes.description)
    .bind(changes.parent_unit_id.is_some())
    .bind(changes.parent_unit_id.flatten())
    .bind(changes.leader_user_id.is_some())
    .bind(changes.leader_user_id.flatten())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_write_error(e, changes.name.as_deref().unwrap_or("")))
}

/// Fetch just the parent link of a unit, scoped to a tenant.
///
/// `None` means the unit does not exist; `Some(None)` means it is a root.
async fn parent_link_on(
    conn: &mut PgConnection,
    tenant_id: Uuid,
    unit_id: Uuid,
) -> Result<Option<Option<Uuid>>, AppError> {
    sqlx::query_scalar::<_, Option<Uuid>>(
        "SELECT parent_unit_id FROM organization_units WHERE tenant_id = $1 AND unit_id = $2",
    )
    .bind(tenant_id)
    .bind(unit_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get parent link: {}", e)))
}

/// Walk the ancestor chain from the candidate parent, on the locked
/// transaction. Reaching the unit itself means the re-parent would close a
/// cycle; revisiting any node means the stored hierarchy is already
/// inconsistent, which is an internal failure rather than a caller error. A
/// dangling parent reference terminates the chain.
async fn ensure_no_cycle(
    conn: &mut PgConnection,
    unit_id: Uuid,
    candidate_parent_id: Uuid,
    tenant_id: Uuid,
) -> Result<(), AppError> {
    let mut current = Some(candidate_parent_id);
    let mut visited: HashSet<Uuid> = HashSet::new();

    while let Some(cursor) = current {
        if cursor == unit_id {
            ERRORS_TOTAL.with_label_values(&["cycle_rejected"]).inc();
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Re-parenting would create a cycle: {} is a descendant of {}",
                candidate_parent_id,
                unit_id
            )));
        }
        if !visited.insert(cursor) {
            error!(
                unit_id = %cursor,
                tenant_id = %tenant_id,
                "Ancestor walk revisited a node; stored hierarchy is inconsistent"
            );
            return Err(AppError::InternalError(anyhow::anyhow!(
                "Inconsistent organization hierarchy detected during cycle check"
            )));
        }

        match parent_link_on(conn, tenant_id, cursor).await? {
            Some(parent_link) => current = parent_link,
            None => {
                warn!(
                    unit_id = %cursor,
                    tenant_id = %tenant_id,
                    "Ancestor walk hit a dangling parent reference; treating chain as terminated"
                );
                break;
            }
        }
    }
    Ok(())
}

fn parent_binds(parent: ParentFilter) -> (bool, Option<Uuid>) {
    match parent {
        ParentFilter::Any => (false, None),
        ParentFilter::Root => (true, None),
        ParentFilter::Unit(id) => (false, Some(id)),
    }
}

/// Map constraint violations from unit writes to caller-facing errors. The
/// partial unique indexes and foreign keys are the real safety net for
/// concurrent writers; these messages just keep them friendly.
fn map_write_error(e: sqlx::Error, name: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "An organization unit named '{}' already exists under the same parent",
                name
            ))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::BadRequest(anyhow::anyhow!(
                "Invalid reference: ensure the tenant and parent unit exist"
            ))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to write unit: {}", e)),
    }
}
