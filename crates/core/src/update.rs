//! Typed partial updates for opportunities.
//!
//! Mutations arrive as a tagged union of allowed shapes instead of dotted
//! field paths, and are checked against a declarative role capability table
//! before application. Sales owns scope, sizing, commercials and sales
//! documents; Delivery owns expenses, SME assignment and delivery
//! documents; Finance owns the invoice and finance detail.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::opportunity::{
    Expenses, FinanceDetails, ManualStatus, Opportunity, TrainerDetails, TypeSpecificDetails,
};
use crate::domain::user::{Role, UserId};
use crate::errors::ErrorCode;
use crate::progress;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpportunityUpdate {
    RequirementSummary {
        requirement_summary: String,
    },
    Scope {
        details: TypeSpecificDetails,
    },
    Sizing {
        participants: Option<u32>,
        days: Option<u32>,
    },
    Commercials {
        tov: Option<Decimal>,
        sector: Option<String>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    },
    ManualStatus {
        status: ManualStatus,
    },
    ProposalDocument {
        path: String,
    },
    PoDocument {
        path: String,
        po_value: Option<Decimal>,
        po_date: Option<NaiveDate>,
    },
    Expenses {
        expenses: Expenses,
    },
    SmeAssignment {
        selected_sme: Option<String>,
        trainer_details: Option<TrainerDetails>,
    },
    DeliveryDocument {
        slot: DeliverySlot,
        path: String,
    },
    InvoiceDocument {
        path: String,
    },
    FinanceDetails {
        finance_details: FinanceDetails,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySlot {
    Attendance,
    Feedback,
    Assessment,
    Performance,
    SmeProfile,
}

/// Discriminant used by the capability table and the audit trail.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    RequirementSummary,
    Scope,
    Sizing,
    Commercials,
    ManualStatus,
    ProposalDocument,
    PoDocument,
    Expenses,
    SmeAssignment,
    DeliveryDocument,
    InvoiceDocument,
    FinanceDetails,
}

impl UpdateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementSummary => "requirement_summary",
            Self::Scope => "scope",
            Self::Sizing => "sizing",
            Self::Commercials => "commercials",
            Self::ManualStatus => "manual_status",
            Self::ProposalDocument => "proposal_document",
            Self::PoDocument => "po_document",
            Self::Expenses => "expenses",
            Self::SmeAssignment => "sme_assignment",
            Self::DeliveryDocument => "delivery_document",
            Self::InvoiceDocument => "invoice_document",
            Self::FinanceDetails => "finance_details",
        }
    }
}

impl OpportunityUpdate {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::RequirementSummary { .. } => UpdateKind::RequirementSummary,
            Self::Scope { .. } => UpdateKind::Scope,
            Self::Sizing { .. } => UpdateKind::Sizing,
            Self::Commercials { .. } => UpdateKind::Commercials,
            Self::ManualStatus { .. } => UpdateKind::ManualStatus,
            Self::ProposalDocument { .. } => UpdateKind::ProposalDocument,
            Self::PoDocument { .. } => UpdateKind::PoDocument,
            Self::Expenses { .. } => UpdateKind::Expenses,
            Self::SmeAssignment { .. } => UpdateKind::SmeAssignment,
            Self::DeliveryDocument { .. } => UpdateKind::DeliveryDocument,
            Self::InvoiceDocument { .. } => UpdateKind::InvoiceDocument,
            Self::FinanceDetails { .. } => UpdateKind::FinanceDetails,
        }
    }
}

const SALES: &[Role] = &[Role::SalesExecutive, Role::SalesManager, Role::BusinessHead];
const DELIVERY: &[Role] = &[Role::Delivery, Role::SalesManager, Role::BusinessHead];
const FINANCE: &[Role] = &[Role::Finance, Role::BusinessHead];

/// Declarative `(update kind, editing roles)` table, consulted once per
/// update.
const CAPABILITY_TABLE: &[(UpdateKind, &[Role])] = &[
    (UpdateKind::RequirementSummary, SALES),
    (UpdateKind::Scope, SALES),
    (UpdateKind::Sizing, SALES),
    (UpdateKind::Commercials, SALES),
    (UpdateKind::ManualStatus, SALES),
    (UpdateKind::ProposalDocument, SALES),
    (UpdateKind::PoDocument, SALES),
    (UpdateKind::Expenses, DELIVERY),
    (UpdateKind::SmeAssignment, DELIVERY),
    (UpdateKind::DeliveryDocument, DELIVERY),
    (UpdateKind::InvoiceDocument, FINANCE),
    (UpdateKind::FinanceDetails, FINANCE),
];

pub fn role_can_apply(role: Role, kind: UpdateKind) -> bool {
    CAPABILITY_TABLE
        .iter()
        .find(|(entry, _)| *entry == kind)
        .is_some_and(|(_, roles)| roles.contains(&role))
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum UpdateError {
    #[error("role `{}` may not edit `{}`", role.as_str(), kind.as_str())]
    RoleNotPermitted { role: Role, kind: UpdateKind },
    #[error("scope details do not match opportunity type `{expected}`")]
    ScopeTypeMismatch { expected: &'static str },
}

impl UpdateError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoleNotPermitted { .. } => ErrorCode::Forbidden,
            Self::ScopeTypeMismatch { .. } => ErrorCode::Validation,
        }
    }
}

/// Validate and apply one update, append the audit entry, and re-derive
/// financials and progress so the in-memory document stays coherent.
pub fn apply_update(
    opportunity: &mut Opportunity,
    update: OpportunityUpdate,
    by: UserId,
    role: Role,
    at: DateTime<Utc>,
) -> Result<(), UpdateError> {
    let kind = update.kind();
    if !role_can_apply(role, kind) {
        return Err(UpdateError::RoleNotPermitted { role, kind });
    }

    match update {
        OpportunityUpdate::RequirementSummary { requirement_summary } => {
            opportunity.requirement_summary = Some(requirement_summary);
        }
        OpportunityUpdate::Scope { details } => {
            if details.opportunity_type() != opportunity.opportunity_type {
                return Err(UpdateError::ScopeTypeMismatch {
                    expected: opportunity.opportunity_type.as_str(),
                });
            }
            opportunity.details = details;
        }
        OpportunityUpdate::Sizing { participants, days } => {
            if let Some(participants) = participants {
                opportunity.participants = participants;
            }
            if let Some(days) = days {
                opportunity.days = days;
            }
        }
        OpportunityUpdate::Commercials { tov, sector, start_date, end_date } => {
            if let Some(tov) = tov {
                opportunity.common.tov = tov;
            }
            if let Some(sector) = sector {
                opportunity.common.sector = Some(sector);
            }
            if let Some(start_date) = start_date {
                opportunity.common.start_date = Some(start_date);
            }
            if let Some(end_date) = end_date {
                opportunity.common.end_date = Some(end_date);
            }
        }
        OpportunityUpdate::ManualStatus { status } => {
            opportunity.common.status = status;
        }
        OpportunityUpdate::ProposalDocument { path } => {
            opportunity.documents.proposal_document = Some(path);
        }
        OpportunityUpdate::PoDocument { path, po_value, po_date } => {
            opportunity.documents.po_document = Some(path);
            opportunity.documents.po_value = po_value;
            opportunity.documents.po_date = po_date;
        }
        OpportunityUpdate::Expenses { expenses } => {
            opportunity.expenses = expenses;
        }
        OpportunityUpdate::SmeAssignment { selected_sme, trainer_details } => {
            if selected_sme.is_some() {
                opportunity.selected_sme = selected_sme;
            }
            if let Some(trainer_details) = trainer_details {
                opportunity.common.trainer_details = trainer_details;
            }
        }
        OpportunityUpdate::DeliveryDocument { slot, path } => {
            let docs = &mut opportunity.documents.delivery_documents;
            match slot {
                DeliverySlot::Attendance => docs.attendance = Some(path),
                DeliverySlot::Feedback => docs.feedback = Some(path),
                DeliverySlot::Assessment => docs.assessment = Some(path),
                DeliverySlot::Performance => docs.performance = Some(path),
                DeliverySlot::SmeProfile => docs.sme_profile = Some(path),
            }
        }
        OpportunityUpdate::InvoiceDocument { path } => {
            opportunity.documents.invoice_document = Some(path);
        }
        OpportunityUpdate::FinanceDetails { finance_details } => {
            opportunity.finance_details = finance_details;
        }
    }

    opportunity.refresh_financials();
    progress::apply(opportunity);
    opportunity.updated_at = at;
    opportunity.log_activity(format!("updated {}", kind.as_str()), by, role, at, None);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::client::ClientId;
    use crate::domain::opportunity::{
        ManualStatus, Opportunity, OpportunityId, OpportunityNumber, OpportunityType,
        TypeSpecificDetails,
    };
    use crate::domain::user::{Role, UserId};

    use super::{
        apply_update, role_can_apply, DeliverySlot, OpportunityUpdate, UpdateError, UpdateKind,
    };

    fn opportunity() -> Opportunity {
        Opportunity::new(
            OpportunityId("OPP-1".to_string()),
            OpportunityNumber::parse("GKT25RK03001").expect("number"),
            OpportunityType::Training,
            ClientId("CL-1".to_string()),
            UserId("u-exec".to_string()),
            20,
            Utc::now(),
        )
    }

    #[test]
    fn capability_table_partitions_field_ownership() {
        assert!(role_can_apply(Role::SalesExecutive, UpdateKind::Scope));
        assert!(role_can_apply(Role::Delivery, UpdateKind::Expenses));
        assert!(role_can_apply(Role::Finance, UpdateKind::InvoiceDocument));

        assert!(!role_can_apply(Role::SalesExecutive, UpdateKind::Expenses));
        assert!(!role_can_apply(Role::Delivery, UpdateKind::Scope));
        assert!(!role_can_apply(Role::Finance, UpdateKind::DeliveryDocument));
    }

    #[test]
    fn forbidden_role_is_rejected_before_application() {
        let mut opp = opportunity();
        let error = apply_update(
            &mut opp,
            OpportunityUpdate::InvoiceDocument { path: "invoice.pdf".to_string() },
            UserId("u-exec".to_string()),
            Role::SalesExecutive,
            Utc::now(),
        )
        .expect_err("sales may not set invoice");

        assert!(matches!(error, UpdateError::RoleNotPermitted { .. }));
        assert!(opp.documents.invoice_document.is_none());
        assert!(opp.activity_log.is_empty());
    }

    #[test]
    fn scope_update_must_match_opportunity_type() {
        let mut opp = opportunity();
        let error = apply_update(
            &mut opp,
            OpportunityUpdate::Scope {
                details: TypeSpecificDetails::ResourceSupport {
                    resource_type: Some("Trainer".to_string()),
                    resource_count: 2,
                },
            },
            UserId("u-exec".to_string()),
            Role::SalesExecutive,
            Utc::now(),
        )
        .expect_err("type mismatch");

        assert_eq!(error, UpdateError::ScopeTypeMismatch { expected: "training" });
    }

    #[test]
    fn applied_update_rederives_progress_and_logs_activity() {
        let mut opp = opportunity();
        apply_update(
            &mut opp,
            OpportunityUpdate::RequirementSummary {
                requirement_summary: "Corporate Java upskilling".to_string(),
            },
            UserId("u-exec".to_string()),
            Role::SalesExecutive,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(opp.progress_percentage, 20);
        assert_eq!(opp.activity_log.len(), 1);
        assert_eq!(opp.activity_log[0].action, "updated requirement_summary");
    }

    #[test]
    fn expense_update_refreshes_derived_financials() {
        let mut opp = opportunity();
        opp.common.tov = Decimal::new(100_000, 0);

        let mut expenses = opp.expenses.clone();
        expenses.trainer_cost = Decimal::new(40_000, 0);
        apply_update(
            &mut opp,
            OpportunityUpdate::Expenses { expenses },
            UserId("u-del".to_string()),
            Role::Delivery,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(opp.financials.total_expense, Decimal::new(40_000, 0));
        assert_eq!(opp.financials.gross_profit, Decimal::new(60_000, 0));
        assert_eq!(opp.financials.gp_percent, Decimal::new(60, 0));
    }

    #[test]
    fn cancelling_forces_progress_to_zero() {
        let mut opp = opportunity();
        opp.requirement_summary = Some("Upskilling".to_string());

        apply_update(
            &mut opp,
            OpportunityUpdate::ManualStatus { status: ManualStatus::Cancelled },
            UserId("u-exec".to_string()),
            Role::SalesExecutive,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(opp.progress_percentage, 0);
        assert_eq!(opp.status_label, "Cancelled");
    }

    #[test]
    fn delivery_document_slots_land_in_the_named_field() {
        let mut opp = opportunity();
        apply_update(
            &mut opp,
            OpportunityUpdate::DeliveryDocument {
                slot: DeliverySlot::Feedback,
                path: "feedback.pdf".to_string(),
            },
            UserId("u-del".to_string()),
            Role::Delivery,
            Utc::now(),
        )
        .expect("apply");

        assert_eq!(opp.documents.delivery_documents.feedback.as_deref(), Some("feedback.pdf"));
        assert!(opp.documents.delivery_documents.attendance.is_none());
    }
}
