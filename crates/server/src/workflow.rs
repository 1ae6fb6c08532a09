//! Approval workflow orchestration: escalation, resolution, read-marking.
//!
//! Threshold decisions live in `oppflow_core::escalation`; this layer adds
//! authorization, the duplicate-cycle guard, supersession, approver
//! resolution, persistence and notification fan-out. All validation fails
//! fast before any write; once the primary approval/opportunity writes
//! land, notification failures are logged and never surfaced.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use oppflow_core::domain::approval::{
    Approval, ApprovalId, ApprovalLevel, ApprovalStatus, FinancialSnapshot, TriggerReason,
};
use oppflow_core::domain::opportunity::{ApprovalState, OpportunityId};
use oppflow_core::domain::user::{Role, User, UserId};
use oppflow_core::errors::{DomainError, ErrorCode};
use oppflow_core::escalation::{self, EscalationInput};
use oppflow_db::repositories::{
    ApprovalRepository, OpportunityRepository, RepositoryError, UserRepository,
};

use crate::notify::{build_notification, NotificationSink};

const SUPERSEDED_BY_VALUES: &str = "Superseded by updated financial values before approval";
const SUPERSEDED_BY_SIBLING: &str = "Superseded by another processed approval request";
const DEFAULT_REJECTION_REASON: &str = "No reason provided";

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("opportunity not found")]
    OpportunityNotFound,
    #[error("approval not found")]
    ApprovalNotFound,
    #[error("{0}")]
    NotAuthorized(&'static str),
    #[error("approval cycle already pending")]
    DuplicateRequest,
    #[error("no approval required for the submitted values")]
    NoApprovalRequired,
    #[error("no user holds the `{}` role", .0.required_role().as_str())]
    NoApproverFound(ApprovalLevel),
    #[error("approval already processed")]
    AlreadyProcessed,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("storage failure: {0}")]
    Repository(#[from] RepositoryError),
}

impl WorkflowError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OpportunityNotFound | Self::ApprovalNotFound => ErrorCode::NotFound,
            Self::NotAuthorized(_) => ErrorCode::Forbidden,
            Self::DuplicateRequest
            | Self::NoApprovalRequired
            | Self::NoApproverFound(_)
            | Self::AlreadyProcessed => ErrorCode::Conflict,
            Self::Domain(inner) => inner.code(),
            Self::Repository(_) => ErrorCode::Internal,
        }
    }
}

/// One `escalate` call for one opportunity; the submitted figures are
/// frozen into each created approval's snapshot.
#[derive(Clone, Debug)]
pub struct EscalateCommand {
    pub opportunity_id: OpportunityId,
    pub gp_percent: Decimal,
    pub tov: Decimal,
    pub total_expense: Decimal,
    pub contingency_percent: Decimal,
    pub triggers: Vec<TriggerReason>,
}

pub struct ApprovalWorkflow {
    opportunities: Arc<dyn OpportunityRepository>,
    approvals: Arc<dyn ApprovalRepository>,
    users: Arc<dyn UserRepository>,
    notifications: Arc<dyn NotificationSink>,
}

impl ApprovalWorkflow {
    pub fn new(
        opportunities: Arc<dyn OpportunityRepository>,
        approvals: Arc<dyn ApprovalRepository>,
        users: Arc<dyn UserRepository>,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self { opportunities, approvals, users, notifications }
    }

    pub async fn escalate(
        &self,
        requester: &User,
        command: EscalateCommand,
    ) -> Result<Vec<Approval>, WorkflowError> {
        let mut opportunity = self
            .opportunities
            .find_by_id(&command.opportunity_id)
            .await?
            .ok_or(WorkflowError::OpportunityNotFound)?;

        if opportunity.created_by != requester.id && !requester.role.may_escalate_any() {
            return Err(WorkflowError::NotAuthorized(
                "only the opportunity's creator or a senior sales role may request escalation",
            ));
        }

        let triggers = escalation::resolve_triggers(&command.triggers);

        self.guard_pending_cycle(requester, &command, &triggers).await?;

        let required = escalation::evaluate(&EscalationInput {
            requester_role: requester.role,
            gp_percent: command.gp_percent,
            contingency_percent: command.contingency_percent,
            triggers: triggers.clone(),
        });
        if required.is_empty() {
            return Err(WorkflowError::NoApprovalRequired);
        }

        let snapshot = FinancialSnapshot {
            total_expense: command.total_expense,
            tov: command.tov,
            gkt_revenue: command.tov - command.total_expense,
            gross_profit: command.tov - command.total_expense,
            gp_percent: command.gp_percent,
            contingency_percent: command.contingency_percent,
        };

        let now = Utc::now();
        let mut created = Vec::with_capacity(required.len());
        for requirement in &required {
            let assigned_to = self.resolve_approver(requester, requirement.level).await?;
            let approval = Approval {
                id: ApprovalId(Uuid::new_v4().to_string()),
                opportunity_id: opportunity.id.clone(),
                trigger_reason: requirement.trigger,
                approval_level: requirement.level,
                reason: requirement.reason.to_string(),
                status: ApprovalStatus::Pending,
                assigned_to: assigned_to.id.clone(),
                requested_by: requester.id.clone(),
                snapshot: snapshot.clone(),
                is_read: false,
                approved_by: None,
                approved_at: None,
                rejected_by: None,
                rejected_at: None,
                rejection_reason: None,
                created_at: now,
                updated_at: now,
            };

            // A concurrent escalate may have slipped a pending row in
            // between the guard read and this insert; the partial unique
            // index turns that race into a conflict.
            if let Err(error) = self.approvals.save(approval.clone()).await {
                if error.is_unique_violation() {
                    return Err(WorkflowError::DuplicateRequest);
                }
                return Err(error.into());
            }
            created.push(approval);
        }

        opportunity.approval.status = ApprovalState::Pending;
        opportunity.approval.required = true;
        let summary =
            created.iter().map(|a| a.reason.clone()).collect::<Vec<_>>().join(", ");
        opportunity.log_activity(
            "requested approval",
            requester.id.clone(),
            requester.role,
            now,
            Some(summary),
        );
        self.opportunities.save(opportunity).await?;

        info!(
            event_name = "workflow.escalation.created",
            opportunity_id = %command.opportunity_id.0,
            approvals = created.len(),
            "escalation cycle created"
        );

        for approval in &created {
            self.notify(
                &approval.assigned_to,
                "Approval Request",
                format!("Approval requested: {}", approval.reason),
            )
            .await;
        }

        Ok(created)
    }

    pub async fn approve(
        &self,
        approver: &User,
        approval_id: &ApprovalId,
    ) -> Result<Approval, WorkflowError> {
        let mut approval = self.load_for_resolution(approver, approval_id).await?;

        let now = Utc::now();
        approval.approve(approver.id.clone(), now)?;
        self.approvals.save(approval.clone()).await?;

        let remaining = self
            .approvals
            .find_pending_for_opportunity(&approval.opportunity_id)
            .await?
            .into_iter()
            .filter(|sibling| sibling.id != approval.id)
            .count();

        if let Some(mut opportunity) =
            self.opportunities.find_by_id(&approval.opportunity_id).await?
        {
            if remaining == 0 {
                opportunity.approval.status = ApprovalState::Approved;
                opportunity.approval.required = false;
                opportunity.approval.approved_by = Some(approver.id.clone());
                opportunity.approval.approved_at = Some(now);
            }
            opportunity.log_activity(
                "approved escalation request",
                approver.id.clone(),
                approver.role,
                now,
                Some(approval.reason.clone()),
            );
            self.opportunities.save(opportunity).await?;
        }

        info!(
            event_name = "workflow.approval.approved",
            approval_id = %approval.id.0,
            opportunity_id = %approval.opportunity_id.0,
            remaining_pending = remaining,
            "approval resolved"
        );

        self.notify(
            &approval.requested_by,
            resolution_title(approval.trigger_reason),
            format!("{} was approved by {}", approval.reason, approver.name),
        )
        .await;

        Ok(approval)
    }

    pub async fn reject(
        &self,
        approver: &User,
        approval_id: &ApprovalId,
        reason: Option<String>,
    ) -> Result<Approval, WorkflowError> {
        let mut approval = self.load_for_resolution(approver, approval_id).await?;

        let reason = reason
            .filter(|text| !text.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        let now = Utc::now();
        approval.reject(approver.id.clone(), reason.clone(), now)?;
        self.approvals.save(approval.clone()).await?;

        // One rejection kills the whole cycle; approval is AND-composed,
        // rejection is not.
        let siblings = self
            .approvals
            .find_pending_for_opportunity(&approval.opportunity_id)
            .await?;
        for mut sibling in siblings {
            if sibling.id == approval.id {
                continue;
            }
            sibling.reject(approver.id.clone(), SUPERSEDED_BY_SIBLING.to_string(), now)?;
            self.approvals.save(sibling).await?;
        }

        if let Some(mut opportunity) =
            self.opportunities.find_by_id(&approval.opportunity_id).await?
        {
            opportunity.approval.status = ApprovalState::Rejected;
            opportunity.approval.required = false;
            opportunity.approval.rejected_by = Some(approver.id.clone());
            opportunity.approval.rejected_at = Some(now);
            opportunity.approval.rejection_reason = Some(reason.clone());
            opportunity.log_activity(
                "rejected escalation request",
                approver.id.clone(),
                approver.role,
                now,
                Some(reason.clone()),
            );
            self.opportunities.save(opportunity).await?;
        }

        info!(
            event_name = "workflow.approval.rejected",
            approval_id = %approval.id.0,
            opportunity_id = %approval.opportunity_id.0,
            "approval rejected, cycle closed"
        );

        self.notify(
            &approval.requested_by,
            resolution_title(approval.trigger_reason),
            format!("{} was rejected by {}: {}", approval.reason, approver.name, reason),
        )
        .await;

        Ok(approval)
    }

    pub async fn mark_read(
        &self,
        approver: &User,
        approval_id: &ApprovalId,
    ) -> Result<Approval, WorkflowError> {
        let mut approval = self
            .approvals
            .find_by_id(approval_id)
            .await?
            .ok_or(WorkflowError::ApprovalNotFound)?;

        if approval.assigned_to != approver.id {
            return Err(WorkflowError::NotAuthorized(
                "only the assigned approver may mark this request read",
            ));
        }

        approval.is_read = true;
        approval.updated_at = Utc::now();
        self.approvals.save(approval.clone()).await?;
        Ok(approval)
    }

    /// Duplicate-cycle guard. An unchanged resubmission is a duplicate;
    /// changed figures supersede every pending approval for the requested
    /// triggers before a new cycle is opened.
    async fn guard_pending_cycle(
        &self,
        requester: &User,
        command: &EscalateCommand,
        triggers: &[TriggerReason],
    ) -> Result<(), WorkflowError> {
        let mut pending = Vec::new();
        for trigger in triggers {
            if let Some(approval) = self
                .approvals
                .find_pending_for_trigger(&command.opportunity_id, *trigger)
                .await?
            {
                pending.push(approval);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let last = pending
            .iter()
            .max_by_key(|approval| approval.created_at)
            .cloned()
            .ok_or(WorkflowError::DuplicateRequest)?;

        if escalation::values_unchanged(
            last.snapshot.gp_percent,
            last.snapshot.contingency_percent,
            command.gp_percent,
            command.contingency_percent,
            triggers,
        ) {
            return Err(WorkflowError::DuplicateRequest);
        }

        let now = Utc::now();
        for mut approval in pending {
            approval.reject(requester.id.clone(), SUPERSEDED_BY_VALUES.to_string(), now)?;
            self.approvals.save(approval).await?;
        }
        Ok(())
    }

    async fn load_for_resolution(
        &self,
        approver: &User,
        approval_id: &ApprovalId,
    ) -> Result<Approval, WorkflowError> {
        let approval = self
            .approvals
            .find_by_id(approval_id)
            .await?
            .ok_or(WorkflowError::ApprovalNotFound)?;

        if approval.status != ApprovalStatus::Pending {
            return Err(WorkflowError::AlreadyProcessed);
        }
        if approval.assigned_to != approver.id {
            return Err(WorkflowError::NotAuthorized(
                "only the assigned approver may resolve this request",
            ));
        }
        if approver.role != approval.approval_level.required_role() {
            return Err(WorkflowError::NotAuthorized(
                "approver role does not match the approval level",
            ));
        }

        Ok(approval)
    }

    /// Manager requests route to the requester's reporting manager when one
    /// is on file; otherwise, and for the other levels, the first user
    /// holding the required role.
    async fn resolve_approver(
        &self,
        requester: &User,
        level: ApprovalLevel,
    ) -> Result<User, WorkflowError> {
        if level == ApprovalLevel::Manager {
            if let Some(manager_id) = &requester.reporting_manager {
                if let Some(manager) = self.users.find_by_id(manager_id).await? {
                    if manager.role == Role::SalesManager {
                        return Ok(manager);
                    }
                }
            }
        }

        self.users
            .find_first_with_role(level.required_role())
            .await?
            .ok_or(WorkflowError::NoApproverFound(level))
    }

    async fn notify(&self, recipient: &UserId, title: &str, body: String) {
        let notification = build_notification(recipient, title, body);
        if let Err(error) = self.notifications.deliver(notification).await {
            warn!(
                event_name = "workflow.notification.failed",
                recipient_id = %recipient.0,
                error = %error,
                "notification write failed, continuing"
            );
        }
    }
}

fn resolution_title(trigger: TriggerReason) -> &'static str {
    match trigger {
        TriggerReason::Gp => "Sales Profit Approval",
        TriggerReason::Contingency => "Contingency Approval",
    }
}
