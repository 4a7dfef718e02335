//! Integration tests against a real Postgres instance.
//!
//! `#[sqlx::test]` provisions a throwaway database per test (using
//! `DATABASE_URL` as the template connection) and hands it to us as `pool`;
//! we point the provisioner at that same database rather than dialing a
//! second one, since `CREATE USER`/`GRANT` need nothing beyond what the
//! throwaway database already gives us.

use probe_db::{PrincipalHandle, Provisioner};
use probe_shared::DatabaseConfig;
use sqlx::PgPool;

/// Builds the config `Provisioner` needs from the same connection
/// parameters `#[sqlx::test]` used to create `pool`, retargeted at the
/// throwaway database it actually connected to.
fn database_config_for(pool: &PgPool) -> DatabaseConfig {
    let url = std::env::var("DATABASE_URL").expect("sqlx::test requires DATABASE_URL");
    let rest = url
        .trim_start_matches("postgres://")
        .trim_start_matches("postgresql://");
    let (credentials, host_port_db) = rest.split_once('@').expect("DATABASE_URL must include a host");
    let (user, password) = credentials.split_once(':').unwrap_or((credentials, ""));
    let host_port = host_port_db.split('/').next().unwrap_or(host_port_db);
    let (host, port) = host_port.split_once(':').unwrap_or((host_port, "5432"));

    let db_name = pool
        .connect_options()
        .get_database()
        .expect("sqlx::test always connects to a named database")
        .to_string();

    DatabaseConfig {
        host: host.to_string(),
        port: port.parse().unwrap_or(5432),
        user: user.to_string(),
        password: password.to_string(),
        admin_db: db_name,
    }
}

#[sqlx::test]
async fn provision_then_revoke_leaves_no_principal_behind(pool: PgPool) -> sqlx::Result<()> {
    let database = database_config_for(&pool);
    let task_db = database.admin_db.clone();
    let provisioner = Provisioner::from_pool(pool, database);

    let handle = PrincipalHandle::new(task_db);
    provisioner.provision(&handle).await.expect("provision");
    assert_eq!(handle.name.len(), 10);
    assert!(handle.name.chars().all(|c| c.is_ascii_lowercase()));

    provisioner.revoke(&handle).await;

    // A second revoke against the same (now-gone) principal must not panic
    // or hang — this is the "tolerant of a crashed prior run" requirement.
    provisioner.revoke(&handle).await;

    Ok(())
}

#[sqlx::test]
async fn provision_against_a_nonexistent_database_fails_before_any_container_work(
    pool: PgPool,
) -> sqlx::Result<()> {
    let database = database_config_for(&pool);
    let provisioner = Provisioner::from_pool(pool, database);

    // S6: a task referencing a database that does not exist must surface a
    // provisioning failure, not a panic, so the pipeline can fall back to
    // its failed-emission path without ever starting a container.
    let handle = PrincipalHandle::new("probe_does_not_exist_db");
    let result = provisioner.provision(&handle).await;
    assert!(result.is_err());

    // CREATE USER may have already succeeded before GRANT CONNECT failed
    // against the nonexistent database; revoke must still clean it up.
    provisioner.revoke(&handle).await;

    Ok(())
}
