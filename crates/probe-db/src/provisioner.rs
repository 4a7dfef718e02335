//! Short-lived database principal provisioning.
//!
//! `provision` creates a randomly named role scoped to one task's database
//! and grants it read access; `revoke` tears the role (and anything it
//! created) back down, tolerating partial state from a crashed prior run.

use fastrand::Rng;
use probe_shared::DatabaseConfig;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;
use tracing::warn;

const IDENTIFIER_LENGTH: usize = 10;
const IDENTIFIER_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to connect to the database control plane: {0}")]
    Connect(#[from] sqlx::Error),
}

/// The principal created for one task invocation. Safe to log — contains
/// no secret beyond the throwaway password, which callers should avoid
/// printing directly.
#[derive(Debug, Clone)]
pub struct PrincipalHandle {
    pub name: String,
    pub password: String,
    /// The task's target database, needed again at revoke time.
    pub task_db: String,
}

impl PrincipalHandle {
    /// Generates the principal's name/password up front, before any SQL
    /// runs, so a caller can still name the principal for cleanup even if
    /// `Provisioner::provision` fails partway through.
    pub fn new(task_db: impl Into<String>) -> Self {
        Self {
            name: random_identifier(IDENTIFIER_LENGTH),
            password: random_identifier(IDENTIFIER_LENGTH),
            task_db: task_db.into(),
        }
    }
}

/// Generates a random lowercase-alphabetic identifier, safe as a bare SQL
/// token (no quoting required).
fn random_identifier(len: usize) -> String {
    let mut rng = Rng::new();
    (0..len)
        .map(|_| {
            let idx = rng.usize(0..IDENTIFIER_ALPHABET.len());
            IDENTIFIER_ALPHABET[idx] as char
        })
        .collect()
}

pub struct Provisioner {
    admin_pool: PgPool,
    database: DatabaseConfig,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("host", &self.database.host)
            .field("port", &self.database.port)
            .finish()
    }
}

impl Provisioner {
    pub async fn connect(database: &DatabaseConfig) -> Result<Self, ProvisionError> {
        let admin_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options(database, &database.admin_db))
            .await?;
        Ok(Self {
            admin_pool,
            database: database.clone(),
        })
    }

    /// Wraps an already-open pool instead of dialing a new one. `database`
    /// still carries the connection parameters `provision`/`revoke` use to
    /// open their own per-task-database connections.
    pub fn from_pool(admin_pool: PgPool, database: DatabaseConfig) -> Self {
        Self { admin_pool, database }
    }

    /// Creates the principal named by `handle` and grants it access to
    /// `handle.task_db`. Failure here aborts the pipeline before the
    /// container starts; the caller should still pass
    /// `handle` to `revoke` afterward, since `CREATE USER` may have already
    /// succeeded before a later statement failed.
    pub async fn provision(&self, handle: &PrincipalHandle) -> Result<(), ProvisionError> {
        let name = &handle.name;
        let task_db = &handle.task_db;

        sqlx::query(&format!(
            "CREATE USER {name} WITH CREATEDB ENCRYPTED PASSWORD '{}'",
            handle.password
        ))
        .execute(&self.admin_pool)
        .await?;

        sqlx::query(&format!("GRANT CONNECT ON DATABASE {task_db} TO {name}"))
            .execute(&self.admin_pool)
            .await?;

        let task_pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(&self.database, task_db))
            .await?;

        sqlx::query(&format!("GRANT USAGE ON SCHEMA public TO {name}"))
            .execute(&task_pool)
            .await?;
        sqlx::query(&format!(
            "GRANT SELECT ON ALL TABLES IN SCHEMA public TO {name}"
        ))
        .execute(&task_pool)
        .await?;
        task_pool.close().await;

        Ok(())
    }

    /// Idempotent teardown. Every statement runs independently; a failure on
    /// one never prevents the rest from running.
    pub async fn revoke(&self, handle: &PrincipalHandle) {
        let name = &handle.name;

        match PgPoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options(&self.database, &handle.task_db))
            .await
        {
            Ok(task_pool) => {
                self.try_execute(
                    &task_pool,
                    &format!("REVOKE ALL PRIVILEGES ON ALL TABLES IN SCHEMA public FROM {name}"),
                )
                .await;
                self.try_execute(
                    &task_pool,
                    &format!("REVOKE ALL PRIVILEGES ON SCHEMA public FROM {name}"),
                )
                .await;
                task_pool.close().await;
            }
            Err(e) => warn!(
                error = %e,
                principal = %name,
                "could not reach task database during revoke; skipping schema/table revokes"
            ),
        }

        self.try_execute(
            &self.admin_pool,
            &format!("REVOKE CONNECT ON DATABASE {} FROM {name}", handle.task_db),
        )
        .await;
        self.try_execute(&self.admin_pool, &format!("DROP DATABASE IF EXISTS {name}"))
            .await;
        self.try_execute(&self.admin_pool, &format!("DROP USER IF EXISTS {name}"))
            .await;
    }

    async fn try_execute(&self, pool: &PgPool, statement: &str) {
        if let Err(e) = sqlx::query(statement).execute(pool).await {
            warn!(error = %e, statement, "revoke statement failed; continuing teardown");
        }
    }
}

fn connect_options(database: &DatabaseConfig, db_name: &str) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&database.host)
        .port(database.port)
        .username(&database.user)
        .password(&database.password)
        .database(db_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_identifier_is_lowercase_alphabetic_of_fixed_length() {
        let id = random_identifier(IDENTIFIER_LENGTH);
        assert_eq!(id.len(), IDENTIFIER_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_lowercase()));
    }

    #[test]
    fn random_identifier_varies_across_calls() {
        let a = random_identifier(IDENTIFIER_LENGTH);
        let b = random_identifier(IDENTIFIER_LENGTH);
        // Collision probability is negligible (26^10 possibilities); a
        // spurious failure here would indicate a broken RNG, not bad luck.
        assert_ne!(a, b);
    }

    #[test]
    fn principal_handle_is_named_before_any_sql_runs() {
        let handle = PrincipalHandle::new("task_db");
        assert_eq!(handle.name.len(), IDENTIFIER_LENGTH);
        assert_eq!(handle.task_db, "task_db");
        assert_ne!(handle.name, handle.password);
    }
}
