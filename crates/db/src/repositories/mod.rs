use async_trait::async_trait;
use thiserror::Error;

use oppflow_core::domain::approval::{Approval, ApprovalId, TriggerReason};
use oppflow_core::domain::client::{Client, ClientId};
use oppflow_core::domain::notification::Notification;
use oppflow_core::domain::opportunity::{Opportunity, OpportunityId, OpportunityNumber};
use oppflow_core::domain::user::{Role, User, UserId};

pub mod approval;
pub mod client;
pub mod notification;
pub mod opportunity;
pub mod user;

pub use approval::SqlApprovalRepository;
pub use client::SqlClientRepository;
pub use notification::SqlNotificationRepository;
pub use opportunity::SqlOpportunityRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl RepositoryError {
    /// True when a write lost to a uniqueness constraint, e.g. the partial
    /// index that allows one pending approval per (opportunity, trigger).
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::Database(db)) if db.message().contains("UNIQUE")
        )
    }
}

#[async_trait]
pub trait OpportunityRepository: Send + Sync {
    async fn find_by_id(&self, id: &OpportunityId)
        -> Result<Option<Opportunity>, RepositoryError>;

    async fn find_by_number(
        &self,
        number: &OpportunityNumber,
    ) -> Result<Option<Opportunity>, RepositoryError>;

    /// Persist the document. Implementations re-derive the progress triple
    /// and financial totals before writing; client-supplied values for
    /// those fields never survive a save. Returns the document as stored.
    async fn save(&self, opportunity: Opportunity) -> Result<Opportunity, RepositoryError>;

    async fn list(&self) -> Result<Vec<Opportunity>, RepositoryError>;

    async fn delete(&self, id: &OpportunityId) -> Result<bool, RepositoryError>;

    /// Next per-month serial for opportunity number generation.
    async fn next_serial(&self, year: i32, month: u32) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError>;

    async fn save(&self, approval: Approval) -> Result<(), RepositoryError>;

    /// The single pending approval for one (opportunity, trigger) pair, if
    /// any; uniqueness is guaranteed by the partial index.
    async fn find_pending_for_trigger(
        &self,
        opportunity_id: &OpportunityId,
        trigger: TriggerReason,
    ) -> Result<Option<Approval>, RepositoryError>;

    async fn find_pending_for_opportunity(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<Approval>, RepositoryError>;

    /// All approvals for an opportunity, newest first.
    async fn find_for_opportunity(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<Approval>, RepositoryError>;

    async fn list_assigned_to(&self, user_id: &UserId) -> Result<Vec<Approval>, RepositoryError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    /// First user holding the given role, by stable id order. Used for
    /// Director and Business Head approver resolution.
    async fn find_first_with_role(&self, role: Role) -> Result<Option<User>, RepositoryError>;

    async fn save(&self, user: User) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError>;

    async fn save(&self, client: Client) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<(), RepositoryError>;

    async fn list_for_recipient(
        &self,
        recipient_id: &UserId,
    ) -> Result<Vec<Notification>, RepositoryError>;
}
