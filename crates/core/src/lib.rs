pub mod config;
pub mod domain;
pub mod errors;
pub mod escalation;
pub mod progress;
pub mod update;

pub use domain::approval::{
    Approval, ApprovalId, ApprovalLevel, ApprovalStatus, FinancialSnapshot, TriggerReason,
};
pub use domain::client::{Client, ClientId, ContactPerson};
pub use domain::notification::{Notification, NotificationId};
pub use domain::opportunity::{
    ApprovalState, ApprovalSummary, CommonDetails, DeliveryDocuments, Documents, Expenses,
    FinanceDetails, Financials, ManualStatus, Opportunity, OpportunityId, OpportunityNumber,
    OpportunityType, StatusStage, TrainerDetails, TypeSpecificDetails,
};
pub use domain::user::{Role, User, UserId};
pub use errors::{DomainError, ErrorCode};
pub use escalation::{EscalationInput, RequiredApproval};
pub use progress::ProgressResult;
pub use update::{DeliverySlot, OpportunityUpdate, UpdateError, UpdateKind};
