//! Organization unit service: orchestrates tenant validation, sibling-name
//! uniqueness, cycle detection, and the hierarchy store.

use std::sync::Arc;

use service_core::error::AppError;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::dtos::ListUnitsQuery;
use crate::models::{
    CreateOrganizationUnit, ListUnitsFilter, OrganizationUnit, PaginatedUnits, ParentFilter,
    UnitChanges, UnitStatus,
};
use crate::services::metrics::{ERRORS_TOTAL, UNITS_CREATED, UNITS_DELETED};
use crate::services::tree::{self, UnitTreeNode, MAX_TREE_NODES};
use crate::services::Database;

const DEFAULT_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone)]
pub struct OrganizationService {
    db: Arc<Database>,
}

impl OrganizationService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a unit under an existing, active tenant.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, name = %input.name))]
    pub async fn create(
        &self,
        input: CreateOrganizationUnit,
    ) -> Result<OrganizationUnit, AppError> {
        self.validate_tenant_and_parent(input.tenant_id, input.parent_unit_id)
            .await?;
        self.check_name_unique(input.tenant_id, &input.name, input.parent_unit_id)
            .await?;

        let unit = self.db.insert_unit(&input).await?;
        UNITS_CREATED.inc();
        info!(
            unit_id = %unit.unit_id,
            tenant_id = %unit.tenant_id,
            name = %unit.name,
            "AUDIT organization unit created"
        );
        Ok(unit)
    }

    /// Paginated flat listing scoped to a tenant.
    #[instrument(skip(self, query), fields(tenant_id = %query.tenant_id))]
    pub async fn find_all(&self, query: &ListUnitsQuery) -> Result<PaginatedUnits, AppError> {
        let mut parent = match query.parent_id.as_deref() {
            None => ParentFilter::Any,
            // The literal sentinel "null" selects root-level units, distinct
            // from omitting the filter.
            Some("null") => ParentFilter::Root,
            Some(raw) => {
                let id = raw.parse::<Uuid>().map_err(|_| {
                    AppError::BadRequest(anyhow::anyhow!(
                        "parent_id must be a unit id or the literal \"null\""
                    ))
                })?;
                ParentFilter::Unit(id)
            }
        };

        match query.level {
            None => {}
            Some(1) => {
                if let ParentFilter::Unit(parent_id) = parent {
                    return Err(AppError::BadRequest(anyhow::anyhow!(
                        "level=1 selects root units and contradicts parent_id={}",
                        parent_id
                    )));
                }
                parent = ParentFilter::Root;
            }
            Some(level) => {
                // Known limitation: depth beyond the root level would need a
                // store-side recursive query. Reject instead of returning
                // wrong results.
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "level filtering is only supported for level 1 (root units), got {}",
                    level
                )));
            }
        }

        let filter = ListUnitsFilter {
            tenant_id: query.tenant_id,
            name: query.name.clone(),
            status: query.status,
            parent,
            page: query.page.unwrap_or(1).max(1),
            page_size: query
                .page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        };

        let total = self.db.count_units(&filter).await?;
        let items = self.db.list_units(&filter).await?;

        Ok(PaginatedUnits {
            items,
            total,
            page: filter.page,
            page_size: filter.page_size,
        })
    }

    /// Fetch every unit for the tenant in one query and assemble the forest
    /// in memory. Not meant for very large tenants; the node budget keeps a
    /// pathological tenant from pinning the process.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn get_tree(
        &self,
        tenant_id: Uuid,
        status: Option<UnitStatus>,
    ) -> Result<Vec<UnitTreeNode>, AppError> {
        self.db
            .find_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;

        let units = self.db.list_units_by_tenant(tenant_id, status).await?;
        if units.len() > MAX_TREE_NODES {
            warn!(
                tenant_id = %tenant_id,
                count = units.len(),
                "Tenant exceeds tree assembly budget"
            );
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Tenant has {} units, above the {} supported for tree reads; use the flat listing",
                units.len(),
                MAX_TREE_NODES
            )));
        }

        Ok(tree::build_tree(units, None))
    }

    /// Fetch a single unit, optionally with its direct children (one level
    /// only, not the full subtree).
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn find_one(
        &self,
        unit_id: Uuid,
        include_children: bool,
    ) -> Result<(OrganizationUnit, Option<Vec<OrganizationUnit>>), AppError> {
        let unit = self.require_unit(unit_id).await?;
        let children = if include_children {
            Some(self.db.list_children(unit.tenant_id, unit_id).await?)
        } else {
            None
        };
        Ok((unit, children))
    }

    /// Apply a partial update, enforcing self-parent, cycle, and sibling-name
    /// rules. A no-op update returns the current record without a write.
    #[instrument(skip(self, changes), fields(unit_id = %unit_id))]
    pub async fn update(
        &self,
        unit_id: Uuid,
        changes: UnitChanges,
    ) -> Result<OrganizationUnit, AppError> {
        let existing = self.require_unit(unit_id).await?;

        if changes.parent_unit_id == Some(Some(unit_id)) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "An organization unit cannot be its own parent"
            )));
        }

        let changes = changes.minimized(&existing);
        if changes.is_empty() {
            debug!(unit_id = %unit_id, "No effective changes, skipping write");
            return Ok(existing);
        }

        if let Some(new_parent) = changes.parent_unit_id {
            self.validate_tenant_and_parent(existing.tenant_id, new_parent)
                .await?;
        }

        if let Some(name) = &changes.name {
            let effective_parent = changes
                .parent_unit_id
                .unwrap_or(existing.parent_unit_id);
            self.check_name_unique(existing.tenant_id, name, effective_parent)
                .await?;
        }

        // Setting a non-null parent goes through the locked re-parent path:
        // the store runs the cycle walk and the write in one transaction
        // under the tenant's advisory lock. Moving to root never needs a
        // cycle check and takes the plain path.
        let updated = match changes.parent_unit_id {
            Some(Some(parent_id)) => {
                self.db
                    .reparent_unit(unit_id, existing.tenant_id, parent_id, &changes)
                    .await?
            }
            _ => self.db.update_unit(unit_id, &changes).await?,
        }
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization unit not found")))?;

        info!(unit_id = %unit_id, "AUDIT organization unit updated");
        Ok(updated)
    }

    /// Transition status. Both directions are always permitted.
    #[instrument(skip(self), fields(unit_id = %unit_id, status = %status))]
    pub async fn update_status(
        &self,
        unit_id: Uuid,
        status: UnitStatus,
    ) -> Result<OrganizationUnit, AppError> {
        self.require_unit(unit_id).await?;

        let updated = self
            .db
            .update_unit_status(unit_id, status)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization unit not found")))?;

        // Cascading is read-time policy: deactivation makes descendants
        // effectively inactive without touching their rows, and activation
        // never auto-activates independently inactive children.
        debug!(unit_id = %unit_id, status = %status, "Descendant rows left untouched");
        info!(unit_id = %unit_id, status = %status, "AUDIT organization unit status updated");
        Ok(updated)
    }

    /// Delete a unit. Child units block with Conflict; user assignments are
    /// a soft advisory check only - deletion proceeds with a warning. The
    /// asymmetry is deliberate and mirrors the upstream admin policy.
    #[instrument(skip(self), fields(unit_id = %unit_id))]
    pub async fn remove(&self, unit_id: Uuid) -> Result<(), AppError> {
        self.require_unit(unit_id).await?;

        let child_count = self.db.count_children(unit_id).await?;
        if child_count > 0 {
            ERRORS_TOTAL.with_label_values(&["delete_conflict"]).inc();
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Organization unit has {} child unit(s); re-parent or delete them first",
                child_count
            )));
        }

        let user_count = self.db.count_users_assigned(unit_id).await?;
        if user_count > 0 {
            warn!(
                unit_id = %unit_id,
                user_count = user_count,
                "Deleting organization unit still referenced by user profiles"
            );
        }

        if !self.db.delete_unit(unit_id).await? {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Organization unit not found"
            )));
        }
        UNITS_DELETED.inc();
        info!(unit_id = %unit_id, "AUDIT organization unit deleted");
        Ok(())
    }

    async fn require_unit(&self, unit_id: Uuid) -> Result<OrganizationUnit, AppError> {
        self.db
            .find_unit_by_id(unit_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Organization unit not found")))
    }

    async fn validate_tenant_and_parent(
        &self,
        tenant_id: Uuid,
        parent_unit_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let tenant = self
            .db
            .find_tenant_by_id(tenant_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Tenant not found")))?;
        if !tenant.is_active() {
            return Err(AppError::BadRequest(anyhow::anyhow!("Tenant is suspended")));
        }

        if let Some(parent_id) = parent_unit_id {
            self.db
                .find_unit_in_tenant(tenant_id, parent_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "Parent organization unit not found within tenant"
                    ))
                })?;
        }
        Ok(())
    }

    async fn check_name_unique(
        &self,
        tenant_id: Uuid,
        name: &str,
        parent_unit_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let count = self
            .db
            .count_siblings_with_name(tenant_id, parent_unit_id, name)
            .await?;
        if count > 0 {
            ERRORS_TOTAL.with_label_values(&["name_conflict"]).inc();
            let scope = match parent_unit_id {
                Some(_) => "under the same parent",
                None => "at the root level",
            };
            return Err(AppError::Conflict(anyhow::anyhow!(
                "An organization unit named '{}' already exists {} for this tenant",
                name,
                scope
            )));
        }
        Ok(())
    }
}
