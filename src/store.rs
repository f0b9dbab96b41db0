//! Client record store: one SQLite table mapping client name to owning admin.
//!
//! The external script is the source of truth for which certificates exist;
//! this table is an ownership cache. Callers add a row only after the script
//! confirms issuance and remove one only after confirmed revocation.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("client `{0}` already exists")]
    AlreadyExists(String),
    #[error("client `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub name: String,
    pub owner_id: i64,
}

pub struct ClientStore {
    pool: SqlitePool,
}

impl ClientStore {
    /// Open the database, creating it and running migrations when asked.
    pub async fn connect(database_url: &str, auto_migrate: bool) -> Result<Self, StoreError> {
        let in_memory = database_url.contains(":memory:");

        if !in_memory && !sqlx::Sqlite::database_exists(database_url).await? {
            info!("Creating database at {}", database_url);
            sqlx::Sqlite::create_database(database_url).await?;
        }

        // An in-memory database exists per connection, so pin the pool to one.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(database_url)
                .await?
        } else {
            SqlitePool::connect(database_url).await?
        };

        if auto_migrate {
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .map_err(sqlx::Error::from)?;
        }

        Ok(Self { pool })
    }

    /// Insert a record. Uniqueness is enforced by the UNIQUE constraint, so a
    /// duplicate insert fails without touching the existing row.
    pub async fn add(&self, name: &str, owner_id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("INSERT INTO clients (name, admin_id) VALUES (?1, ?2)")
            .bind(name)
            .bind(owner_id)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::AlreadyExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a record by name. Absence is reported but callers tolerate it.
    pub async fn remove(&self, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM clients WHERE name = ?1")
            .bind(name)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Ok(())
    }

    /// List records in insertion order. `None` is the superadmin view (all
    /// rows); `Some(id)` filters to that owner.
    pub async fn list(&self, owner: Option<i64>) -> Result<Vec<ClientRecord>, StoreError> {
        let rows = match owner {
            None => {
                sqlx::query("SELECT name, admin_id FROM clients ORDER BY id")
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(owner_id) => {
                sqlx::query("SELECT name, admin_id FROM clients WHERE admin_id = ?1 ORDER BY id")
                    .bind(owner_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        Ok(rows
            .into_iter()
            .map(|row| ClientRecord {
                name: row.get("name"),
                owner_id: row.get("admin_id"),
            })
            .collect())
    }

    /// Close database connections gracefully
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }
}
