//! Opportunity routes. The progress engine is only observable through
//! these writes: every save re-derives the progress triple and financial
//! totals at the store boundary.
//!
//! - `POST  /opportunities`        — create with the minimal required fields
//! - `GET   /opportunities`
//! - `GET   /opportunities/{id}`
//! - `PATCH /opportunities/{id}`   — one typed partial update per call

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{Datelike, Utc};
use serde::Deserialize;
use uuid::Uuid;

use oppflow_core::domain::opportunity::{
    Opportunity, OpportunityId, OpportunityNumber, OpportunityType,
};
use oppflow_core::domain::user::Role;
use oppflow_core::update::{apply_update, OpportunityUpdate};

use crate::api::{ApiError, AppState};
use crate::auth::CurrentUser;

#[derive(Debug, Deserialize)]
pub struct CreateOpportunityRequest {
    pub opportunity_type: OpportunityType,
    pub client_id: String,
    pub participants: u32,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/opportunities", post(create).get(list))
        .route("/opportunities/{id}", get(find).patch(update))
}

async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<CreateOpportunityRequest>,
) -> Result<(StatusCode, Json<Opportunity>), ApiError> {
    if !matches!(user.role, Role::SalesExecutive | Role::SalesManager | Role::BusinessHead) {
        return Err(ApiError::forbidden("only sales roles may create opportunities"));
    }
    if request.participants == 0 {
        return Err(ApiError::validation("participants must be greater than zero"));
    }

    let client_id = oppflow_core::domain::client::ClientId(request.client_id);
    if state.clients.find_by_id(&client_id).await?.is_none() {
        return Err(ApiError::validation("unknown client"));
    }

    let now = Utc::now();
    let serial = state.opportunities.next_serial(now.year(), now.month()).await?;
    let number = OpportunityNumber::generate(&user.creator_code, now, serial)
        .map_err(|error| ApiError::validation(error.to_string()))?;

    let mut opportunity = Opportunity::new(
        OpportunityId(Uuid::new_v4().to_string()),
        number,
        request.opportunity_type,
        client_id,
        user.id.clone(),
        request.participants,
        now,
    );
    opportunity.log_activity("created opportunity", user.id, user.role, now, None);

    let stored = state.opportunities.save(opportunity).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

async fn list(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> Result<Json<Vec<Opportunity>>, ApiError> {
    let opportunities = state.opportunities.list().await?;
    Ok(Json(opportunities))
}

async fn find(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Opportunity>, ApiError> {
    state
        .opportunities
        .find_by_id(&OpportunityId(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("opportunity not found"))
}

async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(change): Json<OpportunityUpdate>,
) -> Result<Json<Opportunity>, ApiError> {
    let mut opportunity = state
        .opportunities
        .find_by_id(&OpportunityId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("opportunity not found"))?;

    apply_update(&mut opportunity, change, user.id, user.role, Utc::now())?;

    let stored = state.opportunities.save(opportunity).await?;
    Ok(Json(stored))
}
