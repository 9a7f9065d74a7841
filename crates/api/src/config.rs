use std::path::PathBuf;
use std::sync::Arc;

use cam2_jobs::config::DEFAULT_BACKEND_PROGRAM;
use cam2_jobs::SupervisorConfig;
use cam2_storage::local::LocalResultStore;
use cam2_storage::webhdfs::WebHdfsResultStore;
use cam2_storage::{ResultStore, StorageError};

use crate::auth::jwt::JwtConfig;

/// Where submission results are read from and deleted.
#[derive(Debug, Clone)]
pub enum ResultStoreConfig {
    /// HDFS through WebHDFS on the namenode.
    WebHdfs {
        namenode_url: String,
        /// `user.name` for insecure clusters.
        user: Option<String>,
    },
    /// A local directory tree.
    Local { root: PathBuf },
}

impl ResultStoreConfig {
    pub fn build(&self) -> Result<Arc<dyn ResultStore>, StorageError> {
        Ok(match self {
            Self::WebHdfs { namenode_url, user } => {
                Arc::new(WebHdfsResultStore::new(namenode_url, user.clone())?)
            }
            Self::Local { root } => Arc::new(LocalResultStore::new(root.clone())),
        })
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Durable store location (default: `sqlite://cam2.db`).
    pub database_url: String,
    /// Interval of the stuck-submission audit in seconds (default: `300`).
    pub consistency_check_secs: u64,
    pub jwt: JwtConfig,
    pub supervisor: SupervisorConfig,
    pub result_store: ResultStoreConfig,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `DATABASE_URL`           | `sqlite://cam2.db`         |
    /// | `CONSISTENCY_CHECK_SECS` | `300`                      |
    /// | `SPARK_MASTER_URL`       | `spark://localhost:7077`   |
    /// | `HDFS_NAMENODE_URL`      | `http://localhost:50070`   |
    /// | `BACKEND_PROGRAM`        | `CAM2DistributedBackend`   |
    /// | `SCRATCH_DIR`            | OS temp dir                |
    /// | `RESULT_STORE`           | `webhdfs` (or `local`)     |
    /// | `RESULT_STORE_ROOT`      | `./results`                |
    /// | `HDFS_USER`              | unset                      |
    ///
    /// JWT settings are read by [`JwtConfig::from_env`].
    ///
    /// # Panics
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");

        let port: u16 = env_or("PORT", "3000")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url = env_or("DATABASE_URL", "sqlite://cam2.db");

        let consistency_check_secs: u64 = env_or("CONSISTENCY_CHECK_SECS", "300")
            .parse()
            .expect("CONSISTENCY_CHECK_SECS must be a valid u64");
        assert!(
            consistency_check_secs > 0,
            "CONSISTENCY_CHECK_SECS must be positive"
        );

        let namenode_url = env_or("HDFS_NAMENODE_URL", "http://localhost:50070");

        let mut supervisor = SupervisorConfig::new(
            env_or("SPARK_MASTER_URL", "spark://localhost:7077"),
            namenode_url.clone(),
        );
        supervisor.backend_program = env_or("BACKEND_PROGRAM", DEFAULT_BACKEND_PROGRAM);
        if let Ok(dir) = std::env::var("SCRATCH_DIR") {
            supervisor.scratch_root = PathBuf::from(dir);
        }

        let result_store = match env_or("RESULT_STORE", "webhdfs").as_str() {
            "webhdfs" => ResultStoreConfig::WebHdfs {
                namenode_url,
                user: std::env::var("HDFS_USER").ok().filter(|u| !u.is_empty()),
            },
            "local" => ResultStoreConfig::Local {
                root: PathBuf::from(env_or("RESULT_STORE_ROOT", "./results")),
            },
            other => panic!("RESULT_STORE must be 'webhdfs' or 'local', got '{other}'"),
        };

        let jwt = JwtConfig::from_env();

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            consistency_check_secs,
            jwt,
            supervisor,
            result_store,
        }
    }
}
