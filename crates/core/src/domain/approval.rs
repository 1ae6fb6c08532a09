use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::opportunity::OpportunityId;
use crate::domain::user::{Role, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApprovalId(pub String);

/// The financial dimension that triggered an escalation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Gp,
    Contingency,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gp => "gp",
            Self::Contingency => "contingency",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "gp" => Some(Self::Gp),
            "contingency" => Some(Self::Contingency),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalLevel {
    Manager,
    Director,
    BusinessHead,
}

impl ApprovalLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manager => "manager",
            Self::Director => "director",
            Self::BusinessHead => "business_head",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manager" => Some(Self::Manager),
            "director" => Some(Self::Director),
            "business_head" => Some(Self::BusinessHead),
            _ => None,
        }
    }

    /// The role an approver must hold to resolve a request at this level.
    pub fn required_role(&self) -> Role {
        match self {
            Self::Manager => Role::SalesManager,
            Self::Director => Role::Director,
            Self::BusinessHead => Role::BusinessHead,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

/// Financial figures frozen at request time. Audit display uses these even
/// when the opportunity's live figures have since moved on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    pub total_expense: Decimal,
    pub tov: Decimal,
    pub gkt_revenue: Decimal,
    pub gross_profit: Decimal,
    pub gp_percent: Decimal,
    pub contingency_percent: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub opportunity_id: OpportunityId,
    pub trigger_reason: TriggerReason,
    pub approval_level: ApprovalLevel,
    pub reason: String,
    pub status: ApprovalStatus,
    pub assigned_to: UserId,
    pub requested_by: UserId,
    pub snapshot: FinancialSnapshot,
    pub is_read: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    /// Pending is the only non-terminal state; Approved and Rejected never
    /// transition out.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(
            (self.status, next),
            (ApprovalStatus::Pending, ApprovalStatus::Approved)
                | (ApprovalStatus::Pending, ApprovalStatus::Rejected)
        )
    }

    pub fn approve(&mut self, approver: UserId, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.transition_to(ApprovalStatus::Approved)?;
        self.approved_by = Some(approver);
        self.approved_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    pub fn reject(
        &mut self,
        rejector: UserId,
        reason: String,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.transition_to(ApprovalStatus::Rejected)?;
        self.rejected_by = Some(rejector);
        self.rejected_at = Some(at);
        self.rejection_reason = Some(reason);
        self.updated_at = at;
        Ok(())
    }

    fn transition_to(&mut self, next: ApprovalStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidApprovalTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::opportunity::OpportunityId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;

    use super::{
        Approval, ApprovalId, ApprovalLevel, ApprovalStatus, FinancialSnapshot, TriggerReason,
    };

    fn approval(status: ApprovalStatus) -> Approval {
        let now = Utc::now();
        Approval {
            id: ApprovalId("APR-1".to_string()),
            opportunity_id: OpportunityId("OPP-1".to_string()),
            trigger_reason: TriggerReason::Gp,
            approval_level: ApprovalLevel::Manager,
            reason: "Sales Profit 5-14%".to_string(),
            status,
            assigned_to: UserId("u-mgr".to_string()),
            requested_by: UserId("u-exec".to_string()),
            snapshot: FinancialSnapshot {
                total_expense: Decimal::new(90_000, 0),
                tov: Decimal::new(100_000, 0),
                gkt_revenue: Decimal::new(10_000, 0),
                gross_profit: Decimal::new(10_000, 0),
                gp_percent: Decimal::new(10, 0),
                contingency_percent: Decimal::new(12, 0),
            },
            is_read: false,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_approval_can_be_approved_once() {
        let mut approval = approval(ApprovalStatus::Pending);
        approval.approve(UserId("u-mgr".to_string()), Utc::now()).expect("pending -> approved");

        assert_eq!(approval.status, ApprovalStatus::Approved);
        assert!(approval.approved_at.is_some());

        let error = approval
            .approve(UserId("u-mgr".to_string()), Utc::now())
            .expect_err("terminal state must not transition");
        assert!(matches!(error, DomainError::InvalidApprovalTransition { .. }));
    }

    #[test]
    fn rejected_approval_is_terminal() {
        let mut approval = approval(ApprovalStatus::Pending);
        approval
            .reject(UserId("u-mgr".to_string()), "margin too thin".to_string(), Utc::now())
            .expect("pending -> rejected");

        assert_eq!(approval.status, ApprovalStatus::Rejected);
        assert!(!approval.can_transition_to(ApprovalStatus::Approved));
        assert!(!approval.can_transition_to(ApprovalStatus::Pending));
    }

    #[test]
    fn trigger_reason_parses_case_insensitively() {
        assert_eq!(TriggerReason::parse("GP"), Some(TriggerReason::Gp));
        assert_eq!(TriggerReason::parse(" contingency "), Some(TriggerReason::Contingency));
        assert_eq!(TriggerReason::parse("margin"), None);
    }
}
