use chrono::{DateTime, Utc};
use sqlx::Row;

use oppflow_core::domain::approval::{
    Approval, ApprovalId, ApprovalLevel, ApprovalStatus, TriggerReason,
};
use oppflow_core::domain::opportunity::OpportunityId;
use oppflow_core::domain::user::UserId;

use super::{ApprovalRepository, RepositoryError};
use crate::DbPool;

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const APPROVAL_COLUMNS: &str = "id, opportunity_id, trigger_reason, approval_level, reason, \
     status, assigned_to, requested_by, snapshot, is_read, approved_by, approved_at, \
     rejected_by, rejected_at, rejection_reason, created_at, updated_at";

fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn get_opt_text(
    row: &sqlx::sqlite::SqliteRow,
    column: &str,
) -> Result<Option<String>, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_approval(row: &sqlx::sqlite::SqliteRow) -> Result<Approval, RepositoryError> {
    let trigger_str = get_text(row, "trigger_reason")?;
    let trigger_reason = TriggerReason::parse(&trigger_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown trigger reason `{trigger_str}`"))
    })?;

    let level_str = get_text(row, "approval_level")?;
    let approval_level = ApprovalLevel::parse(&level_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval level `{level_str}`"))
    })?;

    let status_str = get_text(row, "status")?;
    let status = ApprovalStatus::parse(&status_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown approval status `{status_str}`"))
    })?;

    let snapshot = serde_json::from_str(&get_text(row, "snapshot")?)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let is_read: bool =
        row.try_get("is_read").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Approval {
        id: ApprovalId(get_text(row, "id")?),
        opportunity_id: OpportunityId(get_text(row, "opportunity_id")?),
        trigger_reason,
        approval_level,
        reason: get_text(row, "reason")?,
        status,
        assigned_to: UserId(get_text(row, "assigned_to")?),
        requested_by: UserId(get_text(row, "requested_by")?),
        snapshot,
        is_read,
        approved_by: get_opt_text(row, "approved_by")?.map(UserId),
        approved_at: get_opt_text(row, "approved_at")?.as_deref().map(parse_timestamp).transpose()?,
        rejected_by: get_opt_text(row, "rejected_by")?.map(UserId),
        rejected_at: get_opt_text(row, "rejected_at")?.as_deref().map(parse_timestamp).transpose()?,
        rejection_reason: get_opt_text(row, "rejection_reason")?,
        created_at: parse_timestamp(&get_text(row, "created_at")?)?,
        updated_at: parse_timestamp(&get_text(row, "updated_at")?)?,
    })
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<Approval>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM approvals WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, approval: Approval) -> Result<(), RepositoryError> {
        let snapshot = serde_json::to_string(&approval.snapshot)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO approvals (id, opportunity_id, trigger_reason, approval_level, reason,
                                    status, assigned_to, requested_by, snapshot, is_read,
                                    approved_by, approved_at, rejected_by, rejected_at,
                                    rejection_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 reason = excluded.reason,
                 status = excluded.status,
                 is_read = excluded.is_read,
                 approved_by = excluded.approved_by,
                 approved_at = excluded.approved_at,
                 rejected_by = excluded.rejected_by,
                 rejected_at = excluded.rejected_at,
                 rejection_reason = excluded.rejection_reason,
                 updated_at = excluded.updated_at",
        )
        .bind(&approval.id.0)
        .bind(&approval.opportunity_id.0)
        .bind(approval.trigger_reason.as_str())
        .bind(approval.approval_level.as_str())
        .bind(&approval.reason)
        .bind(approval.status.as_str())
        .bind(&approval.assigned_to.0)
        .bind(&approval.requested_by.0)
        .bind(&snapshot)
        .bind(approval.is_read)
        .bind(approval.approved_by.as_ref().map(|id| id.0.as_str()))
        .bind(approval.approved_at.map(|at| at.to_rfc3339()))
        .bind(approval.rejected_by.as_ref().map(|id| id.0.as_str()))
        .bind(approval.rejected_at.map(|at| at.to_rfc3339()))
        .bind(&approval.rejection_reason)
        .bind(approval.created_at.to_rfc3339())
        .bind(approval.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_pending_for_trigger(
        &self,
        opportunity_id: &OpportunityId,
        trigger: TriggerReason,
    ) -> Result<Option<Approval>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals
             WHERE opportunity_id = ? AND trigger_reason = ? AND status = 'pending'"
        ))
        .bind(&opportunity_id.0)
        .bind(trigger.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_approval(r)?)),
            None => Ok(None),
        }
    }

    async fn find_pending_for_opportunity(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<Approval>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals
             WHERE opportunity_id = ? AND status = 'pending' ORDER BY created_at DESC"
        ))
        .bind(&opportunity_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn find_for_opportunity(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<Approval>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals
             WHERE opportunity_id = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(&opportunity_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn list_assigned_to(&self, user_id: &UserId) -> Result<Vec<Approval>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM approvals
             WHERE assigned_to = ? ORDER BY created_at DESC, id DESC"
        ))
        .bind(&user_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }
}
