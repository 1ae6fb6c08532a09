//! Approval workflow routes.
//!
//! - `POST /approvals/escalate`            — open an escalation cycle
//! - `GET  /approvals`                     — approvals assigned to the caller
//! - `GET  /approvals/opportunity/{id}`    — latest approval per trigger
//! - `POST /approvals/{id}/approve`
//! - `POST /approvals/{id}/reject`         — body carries the reason
//! - `PUT  /approvals/{id}/read`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;

use oppflow_core::domain::approval::{Approval, ApprovalId, TriggerReason};
use oppflow_core::domain::opportunity::OpportunityId;

use crate::api::{ApiError, AppState};
use crate::auth::CurrentUser;
use crate::workflow::EscalateCommand;

#[derive(Debug, Deserialize)]
pub struct EscalateRequest {
    pub opportunity_id: String,
    pub gp_percent: Decimal,
    pub tov: Decimal,
    pub total_expense: Decimal,
    pub contingency_percent: Decimal,
    #[serde(default)]
    pub triggers: Vec<TriggerReason>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/approvals/escalate", post(escalate))
        .route("/approvals", get(list_assigned))
        .route("/approvals/opportunity/{id}", get(latest_for_opportunity))
        .route("/approvals/{id}/approve", post(approve))
        .route("/approvals/{id}/reject", post(reject))
        .route("/approvals/{id}/read", put(mark_read))
}

async fn escalate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(request): Json<EscalateRequest>,
) -> Result<(StatusCode, Json<Vec<Approval>>), ApiError> {
    let command = EscalateCommand {
        opportunity_id: OpportunityId(request.opportunity_id),
        gp_percent: request.gp_percent,
        tov: request.tov,
        total_expense: request.total_expense,
        contingency_percent: request.contingency_percent,
        triggers: request.triggers,
    };

    let created = state.workflow.escalate(&user, command).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_assigned(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<Approval>>, ApiError> {
    let assigned = state.approvals.list_assigned_to(&user.id).await?;
    Ok(Json(assigned))
}

/// Latest approval per trigger dimension, newest first.
async fn latest_for_opportunity(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<Approval>>, ApiError> {
    let history = state.approvals.find_for_opportunity(&OpportunityId(id)).await?;

    let mut latest: Vec<Approval> = Vec::with_capacity(2);
    for approval in history {
        if !latest.iter().any(|seen| seen.trigger_reason == approval.trigger_reason) {
            latest.push(approval);
        }
    }
    Ok(Json(latest))
}

async fn approve(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Approval>, ApiError> {
    let approval = state.workflow.approve(&user, &ApprovalId(id)).await?;
    Ok(Json(approval))
}

async fn reject(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(request): Json<RejectRequest>,
) -> Result<Json<Approval>, ApiError> {
    let approval = state.workflow.reject(&user, &ApprovalId(id), request.reason).await?;
    Ok(Json(approval))
}

async fn mark_read(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<Approval>, ApiError> {
    let approval = state.workflow.mark_read(&user, &ApprovalId(id)).await?;
    Ok(Json(approval))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use oppflow_core::domain::client::{Client, ClientId};
    use oppflow_core::domain::opportunity::{
        Opportunity, OpportunityId, OpportunityNumber, OpportunityType,
    };
    use oppflow_core::domain::user::{Role, User, UserId};
    use oppflow_db::repositories::{
        ClientRepository, OpportunityRepository, SqlClientRepository, SqlOpportunityRepository,
        SqlUserRepository, UserRepository,
    };
    use oppflow_db::{connect_with_settings, migrations};

    use crate::api::AppState;

    async fn test_app() -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let users = SqlUserRepository::new(pool.clone());
        for (id, role, manager, token) in [
            ("u-mgr", Role::SalesManager, None, Some("token-mgr")),
            ("u-exec", Role::SalesExecutive, Some("u-mgr"), Some("token-exec")),
            ("u-bh", Role::BusinessHead, None, None),
        ] {
            users
                .save(User {
                    id: UserId(id.to_string()),
                    name: id.to_string(),
                    email: format!("{id}@example.test"),
                    role,
                    reporting_manager: manager.map(|m: &str| UserId(m.to_string())),
                    creator_code: "RK".to_string(),
                    api_token: token.map(str::to_string),
                    targets: None,
                })
                .await
                .expect("seed user");
        }

        SqlClientRepository::new(pool.clone())
            .save(Client {
                id: ClientId("CL-1".to_string()),
                company_name: "Acme Learning".to_string(),
                sector: None,
                contact_persons: Vec::new(),
            })
            .await
            .expect("seed client");

        SqlOpportunityRepository::new(pool.clone())
            .save(Opportunity::new(
                OpportunityId("OPP-1".to_string()),
                OpportunityNumber::parse("GKT25RK03001").expect("number"),
                OpportunityType::Training,
                ClientId("CL-1".to_string()),
                UserId("u-exec".to_string()),
                20,
                Utc::now(),
            ))
            .await
            .expect("seed opportunity");

        Router::new().merge(super::router()).with_state(AppState::from_pool(pool))
    }

    fn escalate_request(token: &str, gp: &str) -> Request<Body> {
        let body = json!({
            "opportunity_id": "OPP-1",
            "gp_percent": gp,
            "tov": "100000",
            "total_expense": "90000",
            "contingency_percent": "12",
            "triggers": ["gp"],
        });
        Request::builder()
            .method("POST")
            .uri("/approvals/escalate")
            .header("authorization", format!("Bearer {token}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn escalate_returns_created_with_the_new_approvals() {
        let app = test_app().await;

        let response =
            app.oneshot(escalate_request("token-exec", "10")).await.expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        let created = body.as_array().expect("array of approvals");
        assert_eq!(created.len(), 1);
        assert_eq!(created[0]["trigger_reason"], "gp");
        assert_eq!(created[0]["approval_level"], "manager");
        assert_eq!(created[0]["assigned_to"], "u-mgr");
    }

    #[tokio::test]
    async fn errors_carry_a_stable_code_and_message() {
        let app = test_app().await;

        let first = app
            .clone()
            .oneshot(escalate_request("token-exec", "10"))
            .await
            .expect("first response");
        assert_eq!(first.status(), StatusCode::CREATED);

        let duplicate =
            app.oneshot(escalate_request("token-exec", "10")).await.expect("second response");
        assert_eq!(duplicate.status(), StatusCode::BAD_REQUEST);

        let body = body_json(duplicate).await;
        assert_eq!(body["code"], "conflict");
        assert_eq!(body["message"], "approval cycle already pending");
    }

    #[tokio::test]
    async fn requests_without_a_valid_token_are_refused() {
        let app = test_app().await;

        let missing = Request::builder()
            .method("GET")
            .uri("/approvals")
            .body(Body::empty())
            .expect("request");
        let response = app.clone().oneshot(missing).await.expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(escalate_request("token-nobody", "10"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_json(response).await;
        assert_eq!(body["code"], "forbidden");
    }
}
