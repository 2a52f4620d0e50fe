use std::time::Duration;

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    sqlx::{SqlitePool, sqlite::SqlitePoolOptions},
    tracing::{info, warn},
};

use {
    beacon_common::{TeamMapping, TeamMappingStore},
    beacon_config::DatabaseConfig,
};

#[derive(sqlx::FromRow)]
struct MappingRow {
    slack_team_id: String,
    user_id: String,
    created_at: i64,
    updated_at: i64,
}

impl From<MappingRow> for TeamMapping {
    fn from(r: MappingRow) -> Self {
        Self {
            team_id: r.slack_team_id,
            user_id: r.user_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

/// Open the pool, retrying a bounded number of times.
///
/// Exhausting the attempts is fatal for startup.
pub async fn connect_with_retry(config: &DatabaseConfig) -> Result<SqlitePool> {
    let attempts = config.connect_attempts.max(1);
    let delay = Duration::from_secs(config.connect_retry_secs);
    let mut attempt = 1;
    loop {
        let result = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await;
        match result {
            Ok(pool) => {
                info!(attempt, "connected to database");
                return Ok(pool);
            },
            Err(e) if attempt >= attempts => {
                return Err(e).with_context(|| {
                    format!("database unreachable after {attempts} attempts")
                });
            },
            Err(e) => {
                warn!(attempt, max_attempts = attempts, error = %e, "database connection failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

/// Create the `team_mappings` table if needed.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}

/// Round-trip a trivial query.
pub async fn ping(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// SQLite-backed team mapping store.
#[derive(Clone)]
pub struct SqliteTeamMappingStore {
    pool: SqlitePool,
}

impl SqliteTeamMappingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamMappingStore for SqliteTeamMappingStore {
    async fn lookup(&self, team_id: &str) -> Result<Option<String>> {
        let owner: Option<(String,)> =
            sqlx::query_as("SELECT user_id FROM team_mappings WHERE slack_team_id = ?")
                .bind(team_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner.map(|(user_id,)| user_id))
    }

    async fn register(&self, team_id: &str, user_id: &str) -> Result<()> {
        let now = unix_now();
        sqlx::query(
            r#"INSERT INTO team_mappings (slack_team_id, user_id, created_at, updated_at)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(slack_team_id) DO UPDATE SET
                 user_id = excluded.user_id,
                 updated_at = excluded.updated_at"#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        info!(team_id, user_id, "registered team mapping");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TeamMapping>> {
        let rows = sqlx::query_as::<_, MappingRow>(
            "SELECT slack_team_id, user_id, created_at, updated_at FROM team_mappings ORDER BY slack_team_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
