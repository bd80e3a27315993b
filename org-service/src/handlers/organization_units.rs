//! Organization unit handlers: thin HTTP wrappers over the service layer.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    CreateOrganizationUnitRequest, GetUnitQuery, ListUnitsQuery, OrganizationUnitResponse,
    PaginatedUnitsResponse, TreeQuery, UnitTreeResponse, UnitWithChildrenResponse,
    UpdateOrganizationUnitRequest, UpdateUnitStatusRequest,
};
use crate::startup::AppState;

/// Create a new organization unit.
///
/// POST /organization-units
pub async fn create_unit(
    State(state): State<AppState>,
    Json(req): Json<CreateOrganizationUnitRequest>,
) -> Result<(StatusCode, Json<OrganizationUnitResponse>), AppError> {
    req.validate()?;
    let unit = state.org.create(req.into()).await?;
    Ok((StatusCode::CREATED, Json(unit.into())))
}

/// Paginated flat listing for a tenant.
///
/// GET /organization-units
pub async fn list_units(
    State(state): State<AppState>,
    Query(query): Query<ListUnitsQuery>,
) -> Result<Json<PaginatedUnitsResponse>, AppError> {
    let page = state.org.find_all(&query).await?;
    Ok(Json(PaginatedUnitsResponse {
        items: page.items.into_iter().map(Into::into).collect(),
        total: page.total,
        page: page.page,
        page_size: page.page_size,
    }))
}

/// Full tree for a tenant, rooted at the (null-parent) root group.
///
/// GET /organization-units/tree
pub async fn get_unit_tree(
    State(state): State<AppState>,
    Query(query): Query<TreeQuery>,
) -> Result<Json<Vec<UnitTreeResponse>>, AppError> {
    let forest = state.org.get_tree(query.tenant_id, query.status).await?;
    Ok(Json(forest.into_iter().map(Into::into).collect()))
}

/// Single unit, optionally with its direct children.
///
/// GET /organization-units/{unit_id}
pub async fn get_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Query(query): Query<GetUnitQuery>,
) -> Result<Json<UnitWithChildrenResponse>, AppError> {
    let (unit, children) = state.org.find_one(unit_id, query.include_children).await?;
    Ok(Json(UnitWithChildrenResponse {
        unit: unit.into(),
        children: children.map(|c| c.into_iter().map(Into::into).collect()),
    }))
}

/// Partial update, including re-parenting.
///
/// PATCH /organization-units/{unit_id}
pub async fn update_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(req): Json<UpdateOrganizationUnitRequest>,
) -> Result<Json<OrganizationUnitResponse>, AppError> {
    req.validate()?;
    let unit = state.org.update(unit_id, req.into()).await?;
    Ok(Json(unit.into()))
}

/// Status transition.
///
/// PUT /organization-units/{unit_id}/status
pub async fn update_unit_status(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
    Json(req): Json<UpdateUnitStatusRequest>,
) -> Result<Json<OrganizationUnitResponse>, AppError> {
    let unit = state.org.update_status(unit_id, req.status).await?;
    Ok(Json(unit.into()))
}

/// Delete a unit (blocked while child units exist).
///
/// DELETE /organization-units/{unit_id}
pub async fn delete_unit(
    State(state): State<AppState>,
    Path(unit_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.org.remove(unit_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
