use sqlx::Row;

use oppflow_core::domain::client::{Client, ClientId};

use super::{ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_client(row: &sqlx::sqlite::SqliteRow) -> Result<Client, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let company_name: String =
        row.try_get("company_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sector: Option<String> =
        row.try_get("sector").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contacts_str: String =
        row.try_get("contact_persons").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let contact_persons = serde_json::from_str(&contacts_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Client { id: ClientId(id), company_name, sector, contact_persons })
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_id(&self, id: &ClientId) -> Result<Option<Client>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, company_name, sector, contact_persons FROM clients WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_client(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, client: Client) -> Result<(), RepositoryError> {
        let contact_persons = serde_json::to_string(&client.contact_persons)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO clients (id, company_name, sector, contact_persons)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 company_name = excluded.company_name,
                 sector = excluded.sector,
                 contact_persons = excluded.contact_persons",
        )
        .bind(&client.id.0)
        .bind(&client.company_name)
        .bind(&client.sector)
        .bind(&contact_persons)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use oppflow_core::domain::client::{Client, ClientId, ContactPerson};

    use super::SqlClientRepository;
    use crate::repositories::ClientRepository;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn save_and_find_round_trips_contacts() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let repo = SqlClientRepository::new(pool);

        let client = Client {
            id: ClientId("CL-1".to_string()),
            company_name: "Acme Learning".to_string(),
            sector: Some("BFSI".to_string()),
            contact_persons: vec![ContactPerson {
                name: "Priya".to_string(),
                designation: Some("L&D Head".to_string()),
                email: Some("priya@acme.test".to_string()),
                phone: None,
            }],
        };
        repo.save(client.clone()).await.expect("save");

        let found =
            repo.find_by_id(&ClientId("CL-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(found, client);
    }
}
