use chrono::{DateTime, Utc};
use sqlx::Row;

use oppflow_core::domain::client::ClientId;
use oppflow_core::domain::opportunity::{
    Opportunity, OpportunityId, OpportunityNumber, OpportunityType, StatusStage,
};
use oppflow_core::domain::user::UserId;
use oppflow_core::progress;

use super::{OpportunityRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOpportunityRepository {
    pool: DbPool,
}

impl SqlOpportunityRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const OPPORTUNITY_COLUMNS: &str = "id, number, opportunity_type, client_id, created_by, \
     participants, days, requirement_summary, selected_sme, details, common_details, expenses, \
     financials, finance_details, documents, progress_percentage, status_stage, status_label, \
     approval_summary, activity_log, created_at, updated_at";

fn decode<T: serde::de::DeserializeOwned>(field: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|e| RepositoryError::Decode(format!("{field}: {e}")))
}

fn encode<T: serde::Serialize>(field: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Decode(format!("{field}: {e}")))
}

fn get_text(row: &sqlx::sqlite::SqliteRow, column: &str) -> Result<String, RepositoryError> {
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_opportunity(row: &sqlx::sqlite::SqliteRow) -> Result<Opportunity, RepositoryError> {
    let number_str = get_text(row, "number")?;
    let number = OpportunityNumber::parse(&number_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let type_str = get_text(row, "opportunity_type")?;
    let opportunity_type = OpportunityType::parse(&type_str).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown opportunity type `{type_str}`"))
    })?;

    let stage_str = get_text(row, "status_stage")?;
    let status_stage = StatusStage::parse(&stage_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status stage `{stage_str}`")))?;

    let participants: i64 =
        row.try_get("participants").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let days: i64 = row.try_get("days").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let progress: i64 = row
        .try_get("progress_percentage")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let requirement_summary: Option<String> =
        row.try_get("requirement_summary").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let selected_sme: Option<String> =
        row.try_get("selected_sme").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Opportunity {
        id: OpportunityId(get_text(row, "id")?),
        number,
        opportunity_type,
        client_id: ClientId(get_text(row, "client_id")?),
        created_by: UserId(get_text(row, "created_by")?),
        participants: participants.max(0) as u32,
        days: days.max(0) as u32,
        requirement_summary,
        selected_sme,
        details: decode("details", &get_text(row, "details")?)?,
        common: decode("common_details", &get_text(row, "common_details")?)?,
        expenses: decode("expenses", &get_text(row, "expenses")?)?,
        financials: decode("financials", &get_text(row, "financials")?)?,
        finance_details: decode("finance_details", &get_text(row, "finance_details")?)?,
        documents: decode("documents", &get_text(row, "documents")?)?,
        progress_percentage: progress.clamp(0, 100) as u8,
        status_stage,
        status_label: get_text(row, "status_label")?,
        approval: decode("approval_summary", &get_text(row, "approval_summary")?)?,
        activity_log: decode("activity_log", &get_text(row, "activity_log")?)?,
        created_at: parse_timestamp(&get_text(row, "created_at")?),
        updated_at: parse_timestamp(&get_text(row, "updated_at")?),
    })
}

#[async_trait::async_trait]
impl OpportunityRepository for SqlOpportunityRepository {
    async fn find_by_id(
        &self,
        id: &OpportunityId,
    ) -> Result<Option<Opportunity>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_opportunity(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_number(
        &self,
        number: &OpportunityNumber,
    ) -> Result<Option<Opportunity>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities WHERE number = ?"
        ))
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_opportunity(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, opportunity: Opportunity) -> Result<Opportunity, RepositoryError> {
        // Derived state is store-owned: re-derive on every write so
        // client-supplied progress values never land.
        let mut opportunity = opportunity;
        opportunity.refresh_financials();
        progress::apply(&mut opportunity);

        sqlx::query(
            "INSERT INTO opportunities (id, number, opportunity_type, client_id, created_by,
                                        participants, days, requirement_summary, selected_sme,
                                        details, common_details, expenses, financials,
                                        finance_details, documents, progress_percentage,
                                        status_stage, status_label, approval_summary,
                                        activity_log, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 participants = excluded.participants,
                 days = excluded.days,
                 requirement_summary = excluded.requirement_summary,
                 selected_sme = excluded.selected_sme,
                 details = excluded.details,
                 common_details = excluded.common_details,
                 expenses = excluded.expenses,
                 financials = excluded.financials,
                 finance_details = excluded.finance_details,
                 documents = excluded.documents,
                 progress_percentage = excluded.progress_percentage,
                 status_stage = excluded.status_stage,
                 status_label = excluded.status_label,
                 approval_summary = excluded.approval_summary,
                 activity_log = excluded.activity_log,
                 updated_at = excluded.updated_at",
        )
        .bind(&opportunity.id.0)
        .bind(opportunity.number.as_str())
        .bind(opportunity.opportunity_type.as_str())
        .bind(&opportunity.client_id.0)
        .bind(&opportunity.created_by.0)
        .bind(opportunity.participants as i64)
        .bind(opportunity.days as i64)
        .bind(&opportunity.requirement_summary)
        .bind(&opportunity.selected_sme)
        .bind(encode("details", &opportunity.details)?)
        .bind(encode("common_details", &opportunity.common)?)
        .bind(encode("expenses", &opportunity.expenses)?)
        .bind(encode("financials", &opportunity.financials)?)
        .bind(encode("finance_details", &opportunity.finance_details)?)
        .bind(encode("documents", &opportunity.documents)?)
        .bind(opportunity.progress_percentage as i64)
        .bind(opportunity.status_stage.as_str())
        .bind(&opportunity.status_label)
        .bind(encode("approval_summary", &opportunity.approval)?)
        .bind(encode("activity_log", &opportunity.activity_log)?)
        .bind(opportunity.created_at.to_rfc3339())
        .bind(opportunity.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(opportunity)
    }

    async fn list(&self) -> Result<Vec<Opportunity>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {OPPORTUNITY_COLUMNS} FROM opportunities ORDER BY created_at DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_opportunity).collect()
    }

    async fn delete(&self, id: &OpportunityId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM opportunities WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn next_serial(&self, year: i32, month: u32) -> Result<u32, RepositoryError> {
        // Number layout: GKT <yy> <creator code> <mm> <serial>.
        let pattern = format!("GKT{:02}__{:02}%", year.rem_euclid(100), month);
        let row = sqlx::query("SELECT COUNT(*) AS count FROM opportunities WHERE number LIKE ?")
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 =
            row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(count.max(0) as u32 + 1)
    }
}
