//! Shared HTTP state and the error body every handler returns on failure.

use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use oppflow_core::errors::ErrorCode;
use oppflow_core::update::UpdateError;
use oppflow_db::repositories::{
    ApprovalRepository, ClientRepository, OpportunityRepository, RepositoryError,
    SqlApprovalRepository, SqlClientRepository, SqlNotificationRepository,
    SqlOpportunityRepository, SqlUserRepository, UserRepository,
};
use oppflow_db::DbPool;

use crate::notify::DbNotificationSink;
use crate::workflow::{ApprovalWorkflow, WorkflowError};

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ApprovalWorkflow>,
    pub opportunities: Arc<dyn OpportunityRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub users: Arc<dyn UserRepository>,
    pub clients: Arc<dyn ClientRepository>,
}

impl AppState {
    pub fn from_pool(pool: DbPool) -> Self {
        let opportunities: Arc<dyn OpportunityRepository> =
            Arc::new(SqlOpportunityRepository::new(pool.clone()));
        let approvals: Arc<dyn ApprovalRepository> =
            Arc::new(SqlApprovalRepository::new(pool.clone()));
        let users: Arc<dyn UserRepository> = Arc::new(SqlUserRepository::new(pool.clone()));
        let clients: Arc<dyn ClientRepository> = Arc::new(SqlClientRepository::new(pool.clone()));
        let sink = DbNotificationSink::new(Arc::new(SqlNotificationRepository::new(pool)));

        let workflow = Arc::new(ApprovalWorkflow::new(
            opportunities.clone(),
            approvals.clone(),
            users.clone(),
            Arc::new(sink),
        ));

        Self { workflow, opportunities, approvals, users, clients }
    }
}

/// Stable machine-readable code plus the display message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self { code: ErrorCode::Validation, message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self { code: ErrorCode::Forbidden, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { code: ErrorCode::NotFound, message: message.into() }
    }
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        // Business-rule conflicts surface as 400 with their reason.
        ErrorCode::Validation | ErrorCode::Conflict => StatusCode::BAD_REQUEST,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody { code: self.code.as_str(), message: self.message };
        (status_for(self.code), Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(error: WorkflowError) -> Self {
        Self { code: error.code(), message: error.to_string() }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        Self { code: ErrorCode::Internal, message: error.to_string() }
    }
}

impl From<UpdateError> for ApiError {
    fn from(error: UpdateError) -> Self {
        Self { code: error.code(), message: error.to_string() }
    }
}
