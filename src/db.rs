use crate::{
    error::{LinkError, Result},
    models::{Link, LinkStatus},
    store::LinkStore,
};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

// ── Row mapping ────────────────────────────────────────────────────────────

/// A row of the `links` table. Anonymous links carry an empty `account_id`.
#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    short_id: String,
    link: String,
    account_id: String,
    link_status: i64,
}

impl From<LinkRow> for Link {
    fn from(row: LinkRow) -> Self {
        Link {
            short_id: row.short_id,
            target_url: row.link,
            status: LinkStatus::from_code(row.link_status),
            owner_id: Some(row.account_id).filter(|a| !a.is_empty()),
        }
    }
}

// ── Pool ───────────────────────────────────────────────────────────────────

/// Open (creating if needed) the SQLite database and apply migrations.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(
            database_url
                .parse::<SqliteConnectOptions>()?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
        )
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}

// ── Store ──────────────────────────────────────────────────────────────────

/// Link store backed by the `links` table.
///
/// The primary key enforces id uniqueness and the `account_id` column is the
/// owner index, so a single row insert or delete keeps both consistent.
#[derive(Debug, Clone)]
pub struct SqliteLinkStore {
    pool: SqlitePool,
}

impl SqliteLinkStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl LinkStore for SqliteLinkStore {
    async fn exists(&self, short_id: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM links WHERE short_id = ?1")
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(found.is_some())
    }

    async fn store(&self, link: Link) -> Result<Link> {
        let inserted = sqlx::query(
            "INSERT INTO links (short_id, link, account_id, link_status) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&link.short_id)
        .bind(&link.target_url)
        .bind(link.owner_id.as_deref().unwrap_or_default())
        .bind(link.status.code())
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(link),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(LinkError::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, short_id: &str) -> Result<Link> {
        let row: Option<LinkRow> = sqlx::query_as(
            "SELECT short_id, link, account_id, link_status FROM links WHERE short_id = ?1",
        )
        .bind(short_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Link::from).ok_or(LinkError::NotFound)
    }

    async fn delete(&self, short_id: &str, owner_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let owner: Option<String> =
            sqlx::query_scalar("SELECT account_id FROM links WHERE short_id = ?1")
                .bind(short_id)
                .fetch_optional(&mut *tx)
                .await?;

        match owner {
            None => return Err(LinkError::NotFound),
            Some(owner) if owner.is_empty() || owner != owner_id => {
                return Err(LinkError::AccessDenied)
            }
            Some(_) => {}
        }

        sqlx::query("DELETE FROM links WHERE short_id = ?1")
            .bind(short_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Link>> {
        // The empty string is the anonymous sentinel, never a real owner.
        if owner_id.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<LinkRow> = sqlx::query_as(
            "SELECT short_id, link, account_id, link_status
             FROM links WHERE account_id = ?1
             ORDER BY short_id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Link::from).collect())
    }

    async fn update_status(&self, short_id: &str, status: LinkStatus) -> Result<()> {
        let affected = sqlx::query("UPDATE links SET link_status = ?2 WHERE short_id = ?1")
            .bind(short_id)
            .bind(status.code())
            .execute(&self.pool)
            .await?
            .rows_affected();

        // SQLite counts matched rows, so rewriting the same value still reports 1.
        if affected == 0 {
            return Err(LinkError::NotFound);
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<Link>> {
        let rows: Vec<LinkRow> =
            sqlx::query_as("SELECT short_id, link, account_id, link_status FROM links")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(Link::from).collect())
    }
}
