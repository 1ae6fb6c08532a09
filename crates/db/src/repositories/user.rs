use sqlx::Row;

use oppflow_core::domain::user::{Role, User, UserId};

use super::{RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str =
    "id, name, email, role, reporting_manager, creator_code, api_token, targets";

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role_str: String =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let reporting_manager: Option<String> =
        row.try_get("reporting_manager").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let creator_code: String =
        row.try_get("creator_code").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let api_token: Option<String> =
        row.try_get("api_token").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let targets_str: Option<String> =
        row.try_get("targets").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let role = Role::parse(&role_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown role `{role_str}`")))?;
    let targets = targets_str
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User {
        id: UserId(id),
        name,
        email,
        role,
        reporting_manager: reporting_manager.map(UserId),
        creator_code,
        api_token,
        targets,
    })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE api_token = ?"))
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn find_first_with_role(&self, role: Role) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role = ? ORDER BY id LIMIT 1"
        ))
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_user(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, user: User) -> Result<(), RepositoryError> {
        let targets = user
            .targets
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        sqlx::query(
            "INSERT INTO users (id, name, email, role, reporting_manager, creator_code, api_token, targets)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 role = excluded.role,
                 reporting_manager = excluded.reporting_manager,
                 creator_code = excluded.creator_code,
                 api_token = excluded.api_token,
                 targets = excluded.targets",
        )
        .bind(&user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(user.reporting_manager.as_ref().map(|id| id.0.as_str()))
        .bind(&user.creator_code)
        .bind(&user.api_token)
        .bind(&targets)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use oppflow_core::domain::user::{Role, User, UserId};

    use super::SqlUserRepository;
    use crate::repositories::UserRepository;
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_user(id: &str, role: Role) -> User {
        User {
            id: UserId(id.to_string()),
            name: "Ravi Kumar".to_string(),
            email: format!("{id}@example.test"),
            role,
            reporting_manager: None,
            creator_code: "RK".to_string(),
            api_token: Some(format!("token-{id}")),
            targets: None,
        }
    }

    #[tokio::test]
    async fn save_and_find_by_id_and_token() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(sample_user("u-1", Role::SalesExecutive)).await.expect("save");

        let by_id =
            repo.find_by_id(&UserId("u-1".to_string())).await.expect("find").expect("exists");
        assert_eq!(by_id.role, Role::SalesExecutive);
        assert_eq!(by_id.creator_code, "RK");

        let by_token = repo.find_by_token("token-u-1").await.expect("find").expect("exists");
        assert_eq!(by_token.id, UserId("u-1".to_string()));

        assert!(repo.find_by_token("nope").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn first_with_role_is_stable_by_id() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(sample_user("u-b", Role::Director)).await.expect("save");
        repo.save(sample_user("u-a", Role::Director)).await.expect("save");
        repo.save(sample_user("u-c", Role::Finance)).await.expect("save");

        let director =
            repo.find_first_with_role(Role::Director).await.expect("find").expect("exists");
        assert_eq!(director.id, UserId("u-a".to_string()));

        assert!(repo.find_first_with_role(Role::BusinessHead).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn reporting_manager_round_trips() {
        let pool = setup().await;
        let repo = SqlUserRepository::new(pool);

        repo.save(sample_user("u-mgr", Role::SalesManager)).await.expect("save manager");
        let mut exec = sample_user("u-exec", Role::SalesExecutive);
        exec.reporting_manager = Some(UserId("u-mgr".to_string()));
        repo.save(exec).await.expect("save exec");

        let found =
            repo.find_by_id(&UserId("u-exec".to_string())).await.expect("find").expect("exists");
        assert_eq!(found.reporting_manager, Some(UserId("u-mgr".to_string())));
    }
}
