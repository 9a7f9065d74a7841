use cam2_db::DbPool;
use tempfile::TempDir;

/// Open a migrated database in a fresh temporary directory.
///
/// The returned [`TempDir`] must be kept alive for as long as the pool is
/// used; dropping it deletes the database file.
pub async fn test_pool() -> (DbPool, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let pool = cam2_db::create_pool_at(dir.path().join("test.db"))
        .await
        .expect("open database");
    cam2_db::run_migrations(&pool)
        .await
        .expect("run migrations");
    (pool, dir)
}
