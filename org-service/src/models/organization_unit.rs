//! Organization unit model - one node of a per-tenant hierarchy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Unit lifecycle status.
///
/// Deactivating a unit implies its descendants are effectively inactive at
/// read time; their stored status is never touched. Consumers authorizing
/// against status must walk the ancestor chain, not this field alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Active,
    Inactive,
}

impl UnitStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(UnitStatus::Active),
            "inactive" => Ok(UnitStatus::Inactive),
            _ => Err(format!("Invalid unit status: {}", s)),
        }
    }
}

/// Organization unit entity.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OrganizationUnit {
    pub unit_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub parent_unit_id: Option<Uuid>,
    pub description: Option<String>,
    pub leader_user_id: Option<Uuid>,
    pub status: UnitStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl OrganizationUnit {
    /// Check if this is a root unit.
    pub fn is_root(&self) -> bool {
        self.parent_unit_id.is_none()
    }
}

/// Input for creating a new unit. Status is always active on insert.
#[derive(Debug, Clone)]
pub struct CreateOrganizationUnit {
    pub tenant_id: Uuid,
    pub name: String,
    pub parent_unit_id: Option<Uuid>,
    pub description: Option<String>,
    pub leader_user_id: Option<Uuid>,
}

/// Field-level changes for a partial update.
///
/// `None` leaves the stored value untouched; `Some(None)` on the nullable
/// fields clears them.
#[derive(Debug, Clone, Default)]
pub struct UnitChanges {
    pub name: Option<String>,
    pub parent_unit_id: Option<Option<Uuid>>,
    pub description: Option<String>,
    pub leader_user_id: Option<Option<Uuid>>,
}

impl UnitChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.parent_unit_id.is_none()
            && self.description.is_none()
            && self.leader_user_id.is_none()
    }

    /// Drop changes that match the stored record, so a no-op update can skip
    /// the write entirely and leave `updated_utc` untouched.
    pub fn minimized(mut self, current: &OrganizationUnit) -> Self {
        if self.name.as_deref() == Some(current.name.as_str()) {
            self.name = None;
        }
        if self.parent_unit_id == Some(current.parent_unit_id) {
            self.parent_unit_id = None;
        }
        if self.description.as_deref() == current.description.as_deref() {
            self.description = None;
        }
        if self.leader_user_id == Some(current.leader_user_id) {
            self.leader_user_id = None;
        }
        self
    }
}

/// Parent filter for flat listings. The literal string "null" selects
/// root-level units, distinct from omitting the filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentFilter {
    Any,
    Root,
    Unit(Uuid),
}

/// Filter for the paginated flat listing.
#[derive(Debug, Clone)]
pub struct ListUnitsFilter {
    pub tenant_id: Uuid,
    pub name: Option<String>,
    pub status: Option<UnitStatus>,
    pub parent: ParentFilter,
    pub page: u32,
    pub page_size: u32,
}

/// One page of a flat listing.
#[derive(Debug, Clone)]
pub struct PaginatedUnits {
    pub items: Vec<OrganizationUnit>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}
