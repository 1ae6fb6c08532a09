use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::client::ClientId;
use crate::domain::user::{Role, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpportunityId(pub String);

/// Business identifier in the form `GKT<YY><CC><MM><NNN>` where `CC` is the
/// creator's two-letter code and `NNN` a per-month serial. Immutable once
/// assigned.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OpportunityNumber(String);

impl OpportunityNumber {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let bytes = raw.as_bytes();
        let valid = bytes.len() == 12
            && raw.starts_with("GKT")
            && bytes[3].is_ascii_digit()
            && bytes[4].is_ascii_digit()
            && bytes[5].is_ascii_uppercase()
            && bytes[6].is_ascii_uppercase()
            && bytes[7].is_ascii_digit()
            && bytes[8].is_ascii_digit()
            && bytes[9..].iter().all(u8::is_ascii_digit);

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(DomainError::InvalidOpportunityNumber(raw.to_string()))
        }
    }

    pub fn generate(
        creator_code: &str,
        at: DateTime<Utc>,
        serial: u32,
    ) -> Result<Self, DomainError> {
        let code = creator_code.trim().to_ascii_uppercase();
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(DomainError::InvalidOpportunityNumber(format!(
                "creator code `{creator_code}` must be two letters"
            )));
        }
        if serial == 0 || serial > 999 {
            return Err(DomainError::InvalidOpportunityNumber(format!(
                "serial {serial} out of range 1-999"
            )));
        }

        Ok(Self(format!("GKT{:02}{}{:02}{:03}", at.year() % 100, code, at.month(), serial)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for OpportunityNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OpportunityNumber> for String {
    fn from(value: OpportunityNumber) -> Self {
        value.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityType {
    Training,
    ProductSupport,
    ResourceSupport,
    Vouchers,
    LabSupport,
    ContentSupport,
}

impl OpportunityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::ProductSupport => "product_support",
            Self::ResourceSupport => "resource_support",
            Self::Vouchers => "vouchers",
            Self::LabSupport => "lab_support",
            Self::ContentSupport => "content_support",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "training" => Some(Self::Training),
            "product_support" => Some(Self::ProductSupport),
            "resource_support" => Some(Self::ResourceSupport),
            "vouchers" => Some(Self::Vouchers),
            "lab_support" => Some(Self::LabSupport),
            "content_support" => Some(Self::ContentSupport),
            _ => None,
        }
    }
}

/// Manually-set lifecycle status. Cancelled and Discontinued are terminal
/// and override every derived milestone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManualStatus {
    #[default]
    Open,
    Cancelled,
    Discontinued,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusStage {
    Created,
    InProgress,
    Scheduled,
    Completed,
    Cancelled,
    Discontinued,
}

impl StatusStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::InProgress => "in_progress",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Discontinued => "discontinued",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" => Some(Self::Created),
            "in_progress" => Some(Self::InProgress),
            "scheduled" => Some(Self::Scheduled),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "discontinued" => Some(Self::Discontinued),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::InProgress => "In Progress",
            Self::Scheduled => "Scheduled",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Discontinued => "Discontinued",
        }
    }
}

/// Collapsed view over the possibly-multiple concurrent approval records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    #[default]
    NotRequired,
    Pending,
    Approved,
    Rejected,
}

/// Per-type scope and sizing detail. The variant must match the
/// opportunity's declared type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeSpecificDetails {
    Training {
        technology: Option<String>,
        mode_of_training: Option<String>,
        training_name: Option<String>,
    },
    ProductSupport {
        project_scope: Option<String>,
        team_size: u32,
    },
    ResourceSupport {
        resource_type: Option<String>,
        resource_count: u32,
    },
    Vouchers {
        technology: Option<String>,
        exam_details: Option<String>,
        exam_location: Option<String>,
        number_of_vouchers: u32,
    },
    LabSupport {
        technology: Option<String>,
        requirement: Option<String>,
        region: Option<String>,
        number_of_ids: u32,
        duration_days: u32,
    },
    ContentSupport {
        content_type: Option<String>,
        delivery_format: Option<String>,
    },
}

impl TypeSpecificDetails {
    pub fn empty_for(opportunity_type: OpportunityType) -> Self {
        match opportunity_type {
            OpportunityType::Training => {
                Self::Training { technology: None, mode_of_training: None, training_name: None }
            }
            OpportunityType::ProductSupport => {
                Self::ProductSupport { project_scope: None, team_size: 0 }
            }
            OpportunityType::ResourceSupport => {
                Self::ResourceSupport { resource_type: None, resource_count: 0 }
            }
            OpportunityType::Vouchers => Self::Vouchers {
                technology: None,
                exam_details: None,
                exam_location: None,
                number_of_vouchers: 0,
            },
            OpportunityType::LabSupport => Self::LabSupport {
                technology: None,
                requirement: None,
                region: None,
                number_of_ids: 0,
                duration_days: 0,
            },
            OpportunityType::ContentSupport => {
                Self::ContentSupport { content_type: None, delivery_format: None }
            }
        }
    }

    pub fn opportunity_type(&self) -> OpportunityType {
        match self {
            Self::Training { .. } => OpportunityType::Training,
            Self::ProductSupport { .. } => OpportunityType::ProductSupport,
            Self::ResourceSupport { .. } => OpportunityType::ResourceSupport,
            Self::Vouchers { .. } => OpportunityType::Vouchers,
            Self::LabSupport { .. } => OpportunityType::LabSupport,
            Self::ContentSupport { .. } => OpportunityType::ContentSupport,
        }
    }

    pub fn scope_complete(&self) -> bool {
        match self {
            Self::Training { technology, mode_of_training, training_name } => {
                present(technology) && present(mode_of_training) && present(training_name)
            }
            Self::ProductSupport { project_scope, .. } => present(project_scope),
            Self::ResourceSupport { resource_type, .. } => present(resource_type),
            Self::Vouchers { technology, exam_details, exam_location, .. } => {
                present(technology) && present(exam_details) && present(exam_location)
            }
            Self::LabSupport { technology, requirement, region, .. } => {
                present(technology) && present(requirement) && present(region)
            }
            Self::ContentSupport { content_type, delivery_format } => {
                present(content_type) && present(delivery_format)
            }
        }
    }

    /// Sizing milestone. Content Support has no separate sizing input, so
    /// sizing completeness equals scope completeness there.
    pub fn sizing_complete(&self, participants: u32) -> bool {
        match self {
            Self::Training { .. } => participants > 0,
            Self::ProductSupport { team_size, .. } => *team_size > 0,
            Self::ResourceSupport { resource_count, .. } => *resource_count > 0,
            Self::Vouchers { number_of_vouchers, .. } => *number_of_vouchers > 0,
            Self::LabSupport { number_of_ids, duration_days, .. } => {
                *number_of_ids > 0 && *duration_days > 0
            }
            Self::ContentSupport { .. } => self.scope_complete(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerDetails {
    pub name: Option<String>,
    pub contact: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CommonDetails {
    pub status: ManualStatus,
    pub sector: Option<String>,
    pub sales_owner: Option<UserId>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub tov: Decimal,
    pub trainer_details: TrainerDetails,
}

/// Cost line items plus the two percentages that drive escalation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Expenses {
    pub trainer_cost: Decimal,
    pub travel: Decimal,
    pub material: Decimal,
    pub labs: Decimal,
    pub venue: Decimal,
    pub contingency_percent: Decimal,
    pub target_gp_percent: Decimal,
}

impl Expenses {
    pub fn total(&self) -> Decimal {
        self.trainer_cost + self.travel + self.material + self.labs + self.venue
    }

    pub fn any_line_entered(&self) -> bool {
        [self.trainer_cost, self.travel, self.material, self.labs, self.venue]
            .iter()
            .any(|line| *line > Decimal::ZERO)
    }
}

/// Derived totals, refreshed from `expenses` and `common.tov` on save.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Financials {
    pub total_expense: Decimal,
    pub gkt_revenue: Decimal,
    pub gross_profit: Decimal,
    pub gp_percent: Decimal,
}

impl Financials {
    pub fn derive(tov: Decimal, total_expense: Decimal) -> Self {
        let gross_profit = tov - total_expense;
        let gp_percent = if tov > Decimal::ZERO {
            gross_profit * Decimal::ONE_HUNDRED / tov
        } else {
            Decimal::ZERO
        };

        Self { total_expense, gkt_revenue: gross_profit, gross_profit, gp_percent }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FinanceDetails {
    pub invoice_number: Option<String>,
    pub payment_terms: Option<String>,
    pub amount_received: Decimal,
    pub amount_payable: Decimal,
}

/// The five named delivery document slots. Completion at 100% requires the
/// first four; `sme_profile` is tracked but not gating.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDocuments {
    pub attendance: Option<String>,
    pub feedback: Option<String>,
    pub assessment: Option<String>,
    pub performance: Option<String>,
    pub sme_profile: Option<String>,
}

impl DeliveryDocuments {
    pub fn gating_complete(&self) -> bool {
        present(&self.attendance)
            && present(&self.feedback)
            && present(&self.assessment)
            && present(&self.performance)
    }
}

/// Document references set by the upload collaborator; the workflow engine
/// only observes presence or absence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Documents {
    pub proposal_document: Option<String>,
    pub po_document: Option<String>,
    pub po_value: Option<Decimal>,
    pub po_date: Option<NaiveDate>,
    pub invoice_document: Option<String>,
    pub delivery_documents: DeliveryDocuments,
}

impl Documents {
    pub fn has_proposal(&self) -> bool {
        present(&self.proposal_document)
    }

    pub fn has_po(&self) -> bool {
        present(&self.po_document)
    }

    pub fn has_invoice(&self) -> bool {
        present(&self.invoice_document)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action: String,
    pub by: UserId,
    pub role: Role,
    pub at: DateTime<Utc>,
    pub details: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSummary {
    pub status: ApprovalState,
    pub required: bool,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<UserId>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: OpportunityId,
    pub number: OpportunityNumber,
    pub opportunity_type: OpportunityType,
    pub client_id: ClientId,
    pub created_by: UserId,
    pub participants: u32,
    pub days: u32,
    pub requirement_summary: Option<String>,
    pub selected_sme: Option<String>,
    pub details: TypeSpecificDetails,
    pub common: CommonDetails,
    pub expenses: Expenses,
    pub financials: Financials,
    pub finance_details: FinanceDetails,
    pub documents: Documents,
    pub progress_percentage: u8,
    pub status_stage: StatusStage,
    pub status_label: String,
    pub approval: ApprovalSummary,
    pub activity_log: Vec<ActivityEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Opportunity {
    pub fn new(
        id: OpportunityId,
        number: OpportunityNumber,
        opportunity_type: OpportunityType,
        client_id: ClientId,
        created_by: UserId,
        participants: u32,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            number,
            opportunity_type,
            client_id,
            created_by,
            participants,
            days: 0,
            requirement_summary: None,
            selected_sme: None,
            details: TypeSpecificDetails::empty_for(opportunity_type),
            common: CommonDetails::default(),
            expenses: Expenses::default(),
            financials: Financials::default(),
            finance_details: FinanceDetails::default(),
            documents: Documents::default(),
            progress_percentage: 0,
            status_stage: StatusStage::Created,
            status_label: StatusStage::Created.label().to_string(),
            approval: ApprovalSummary::default(),
            activity_log: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }

    /// True when an SME or a named trainer has been attached.
    pub fn resource_assigned(&self) -> bool {
        present(&self.selected_sme) || present(&self.common.trainer_details.name)
    }

    pub fn refresh_financials(&mut self) {
        self.financials = Financials::derive(self.common.tov, self.expenses.total());
    }

    /// Append-only audit trail; entries are never edited or removed.
    pub fn log_activity(
        &mut self,
        action: impl Into<String>,
        by: UserId,
        role: Role,
        at: DateTime<Utc>,
        details: Option<String>,
    ) {
        self.activity_log.push(ActivityEntry { action: action.into(), by, role, at, details });
    }
}

pub(crate) fn present(value: &Option<String>) -> bool {
    matches!(value, Some(text) if !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        Expenses, Financials, OpportunityNumber, OpportunityType, TypeSpecificDetails,
    };

    #[test]
    fn generates_well_formed_opportunity_numbers() {
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 10, 0, 0).unwrap();
        let number = OpportunityNumber::generate("rk", at, 7).expect("generate");
        assert_eq!(number.as_str(), "GKT25RK03007");

        OpportunityNumber::parse(number.as_str()).expect("round-trip parse");
    }

    #[test]
    fn rejects_malformed_numbers() {
        for raw in ["GKT25rk03007", "GKT25RK3007", "OPP25RK03007", "GKT25RK030071"] {
            assert!(OpportunityNumber::parse(raw).is_err(), "{raw} should be rejected");
        }
        assert!(OpportunityNumber::generate("RKX", Utc::now(), 1).is_err());
        assert!(OpportunityNumber::generate("RK", Utc::now(), 1000).is_err());
    }

    #[test]
    fn training_scope_requires_all_three_fields() {
        let mut details = TypeSpecificDetails::Training {
            technology: Some("Java".to_string()),
            mode_of_training: Some("Virtual".to_string()),
            training_name: None,
        };
        assert!(!details.scope_complete());

        if let TypeSpecificDetails::Training { training_name, .. } = &mut details {
            *training_name = Some("Core Java".to_string());
        }
        assert!(details.scope_complete());
        assert!(details.sizing_complete(20));
        assert!(!details.sizing_complete(0));
    }

    #[test]
    fn content_support_sizing_mirrors_scope() {
        let details = TypeSpecificDetails::ContentSupport {
            content_type: Some("Courseware".to_string()),
            delivery_format: Some("SCORM".to_string()),
        };
        assert!(details.scope_complete());
        assert!(details.sizing_complete(0));

        let incomplete =
            TypeSpecificDetails::ContentSupport { content_type: None, delivery_format: None };
        assert!(!incomplete.sizing_complete(50));
    }

    #[test]
    fn lab_support_sizing_needs_ids_and_duration() {
        let details = TypeSpecificDetails::LabSupport {
            technology: Some("AWS".to_string()),
            requirement: Some("Sandbox".to_string()),
            region: Some("APAC".to_string()),
            number_of_ids: 25,
            duration_days: 0,
        };
        assert!(details.scope_complete());
        assert!(!details.sizing_complete(0));
    }

    #[test]
    fn financials_derive_gp_percent_from_tov() {
        let derived = Financials::derive(Decimal::new(100_000, 0), Decimal::new(85_000, 0));
        assert_eq!(derived.gross_profit, Decimal::new(15_000, 0));
        assert_eq!(derived.gp_percent, Decimal::new(15, 0));

        let zero_tov = Financials::derive(Decimal::ZERO, Decimal::new(500, 0));
        assert_eq!(zero_tov.gp_percent, Decimal::ZERO);
    }

    #[test]
    fn expense_lines_detect_first_entry() {
        let mut expenses = Expenses::default();
        assert!(!expenses.any_line_entered());

        expenses.venue = Decimal::new(1_200, 0);
        assert!(expenses.any_line_entered());
        assert_eq!(expenses.total(), Decimal::new(1_200, 0));
    }

    #[test]
    fn empty_details_match_declared_type() {
        for opportunity_type in [
            OpportunityType::Training,
            OpportunityType::ProductSupport,
            OpportunityType::ResourceSupport,
            OpportunityType::Vouchers,
            OpportunityType::LabSupport,
            OpportunityType::ContentSupport,
        ] {
            let details = TypeSpecificDetails::empty_for(opportunity_type);
            assert_eq!(details.opportunity_type(), opportunity_type);
            assert!(!details.scope_complete());
        }
    }
}
