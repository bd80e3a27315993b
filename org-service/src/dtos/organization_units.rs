//! Request/response shapes for the organization unit API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{OrganizationUnit, UnitStatus};
use crate::services::tree::UnitTreeNode;

/// Deserialize helper distinguishing an absent field from an explicit null.
///
/// Missing field => `None` (leave untouched), `null` => `Some(None)` (clear),
/// value => `Some(Some(v))`.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Request to create a new organization unit.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOrganizationUnitRequest {
    pub tenant_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub parent_unit_id: Option<Uuid>,
    pub description: Option<String>,
    pub leader_user_id: Option<Uuid>,
}

/// Partial update request. Omitted fields are left untouched; explicit null
/// clears `parent_unit_id` / `leader_user_id`.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOrganizationUnitRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_unit_id: Option<Option<Uuid>>,
    pub description: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub leader_user_id: Option<Option<Uuid>>,
}

/// Request to transition a unit's status.
#[derive(Debug, Deserialize)]
pub struct UpdateUnitStatusRequest {
    pub status: UnitStatus,
}

/// Query parameters for the paginated flat listing.
#[derive(Debug, Deserialize)]
pub struct ListUnitsQuery {
    pub tenant_id: Uuid,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub name: Option<String>,
    pub status: Option<UnitStatus>,
    /// Unit id, or the literal string "null" to select root-level units.
    pub parent_id: Option<String>,
    pub level: Option<u32>,
}

/// Query parameters for the tree read.
#[derive(Debug, Deserialize)]
pub struct TreeQuery {
    pub tenant_id: Uuid,
    pub status: Option<UnitStatus>,
}

/// Query parameters for the single-unit read.
#[derive(Debug, Default, Deserialize)]
pub struct GetUnitQuery {
    #[serde(default)]
    pub include_children: bool,
}

/// Organization unit response for API.
#[derive(Debug, Serialize)]
pub struct OrganizationUnitResponse {
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

impl From<OrganizationUnit> for OrganizationUnitResponse {
    fn from(u: OrganizationUnit) -> Self {
        Self {
            unit_id: u.unit_id,
            tenant_id: u.tenant_id,
            name: u.name,
            parent_unit_id: u.parent_unit_id,
            description: u.description,
            leader_user_id: u.leader_user_id,
            status: u.status,
            created_utc: u.created_utc,
            updated_utc: u.updated_utc,
        }
    }
}

/// Single unit, optionally augmented with its direct children.
#[derive(Debug, Serialize)]
pub struct UnitWithChildrenResponse {
    #[serde(flatten)]
    pub unit: OrganizationUnitResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<OrganizationUnitResponse>>,
}

/// Paginated flat listing response.
#[derive(Debug, Serialize)]
pub struct PaginatedUnitsResponse {
    pub items: Vec<OrganizationUnitResponse>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Nested tree response.
#[derive(Debug, Serialize)]
pub struct UnitTreeResponse {
    #[serde(flatten)]
    pub unit: OrganizationUnitResponse,
    pub children: Vec<UnitTreeResponse>,
}

impl From<UnitTreeNode> for UnitTreeResponse {
    fn from(node: UnitTreeNode) -> Self {
        Self {
            unit: node.unit.into(),
            children: node.children.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<UpdateOrganizationUnitRequest> for crate::models::UnitChanges {
    fn from(req: UpdateOrganizationUnitRequest) -> Self {
        Self {
            name: req.name,
            parent_unit_id: req.parent_unit_id,
            description: req.description,
            leader_user_id: req.leader_user_id,
        }
    }
}

impl From<CreateOrganizationUnitRequest> for crate::models::CreateOrganizationUnit {
    fn from(req: CreateOrganizationUnitRequest) -> Self {
        Self {
            tenant_id: req.tenant_id,
            name: req.name,
            parent_unit_id: req.parent_unit_id,
            description: req.description,
            leader_user_id: req.leader_user_id,
        }
    }
}
