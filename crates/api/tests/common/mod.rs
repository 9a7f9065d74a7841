//! Shared helpers for HTTP-level integration tests.
//!
//! Every test app gets its own SQLite file, scratch directory and local
//! result tree. The backend is `sh` running the submitted analyzer as a
//! shell script; its second positional argument is the result tree root, so
//! a script can leave results where the download route will find them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use cam2_api::auth::jwt::JwtConfig;
use cam2_api::config::{ResultStoreConfig, ServerConfig};
use cam2_api::router::build_app_router;
use cam2_api::state::AppState;
use cam2_core::submission::SubmissionKey;
use cam2_jobs::{Supervisor, SupervisorConfig};

pub const PASSWORD: &str = "correct-horse";

const MULTIPART_BOUNDARY: &str = "cam2-test-boundary";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub results_root: PathBuf,
    _db_dir: TempDir,
    _scratch: TempDir,
    _results: TempDir,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(database_url: String, scratch: &Path, results: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        database_url,
        consistency_check_secs: 300,
        jwt: JwtConfig {
            secret: "test-secret-for-integration-tests".to_string(),
            access_token_expiry_mins: 60,
        },
        supervisor: SupervisorConfig {
            backend_program: "sh".into(),
            backend_args: vec![
                "-c".into(),
                "exec sh \"$6\" \"$@\"".into(),
                "cam2-backend".into(),
            ],
            master_url: "spark://master:7077".into(),
            namenode_url: results.to_string_lossy().into_owned(),
            scratch_root: scratch.to_path_buf(),
        },
        result_store: ResultStoreConfig::Local {
            root: results.to_path_buf(),
        },
    }
}

/// Build the full application router with a fresh store, scratch root and
/// result tree.
pub async fn build_test_app() -> TestApp {
    let db_dir = tempfile::tempdir().expect("create db dir");
    let scratch = tempfile::tempdir().expect("create scratch dir");
    let results = tempfile::tempdir().expect("create results dir");

    let db_path = db_dir.path().join("api.db");
    let config = test_config(
        format!("sqlite://{}", db_path.display()),
        scratch.path(),
        results.path(),
    );

    let pool = cam2_db::create_pool_at(&db_path)
        .await
        .expect("open database");
    cam2_db::run_migrations(&pool).await.expect("migrate");

    let result_store = config
        .result_store
        .build()
        .expect("build result store");
    let supervisor = Supervisor::new(
        pool.clone(),
        Arc::clone(&result_store),
        config.supervisor.clone(),
    );

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        supervisor,
        result_store,
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        results_root: results.path().to_path_buf(),
        _db_dir: db_dir,
        _scratch: scratch,
        _results: results,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(request(Method::GET, uri, None, Body::empty())).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> Response {
        self.send(request(Method::GET, uri, Some(token), Body::empty()))
            .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response {
        self.send(json_request(Method::POST, uri, None, body)).await
    }

    pub async fn post_auth(&self, uri: &str, token: &str) -> Response {
        self.send(request(Method::POST, uri, Some(token), Body::empty()))
            .await
    }

    pub async fn delete_auth(&self, uri: &str, token: &str) -> Response {
        self.send(request(Method::DELETE, uri, Some(token), Body::empty()))
            .await
    }

    /// Register `username` with [`PASSWORD`] and return an access token.
    pub async fn register_and_login(&self, username: &str) -> String {
        let credentials = serde_json::json!({ "username": username, "password": PASSWORD });

        let response = self.post_json("/api/v1/users", credentials.clone()).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = self.post_json("/api/v1/auth/login", credentials).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        json["data"]["access_token"]
            .as_str()
            .expect("access_token in login response")
            .to_string()
    }

    /// Submit `script` as the analyzer of `submission_id`.
    pub async fn submit(&self, token: &str, submission_id: &str, script: &str) -> Response {
        let form = MultipartForm::new()
            .text("submission_id", submission_id)
            .file("conf", "conf.json", br#"{"frames": 10}"#)
            .file("analyzer", "analyzer.py", script.as_bytes());
        self.send(form.into_request("/api/v1/submissions", token))
            .await
    }

    /// Wait until the job has left the registry (finalization done).
    pub async fn wait_finalized(&self, owner: &str, submission_id: &str) {
        let key = SubmissionKey::new(owner, submission_id);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
        while self.state.supervisor.registry().contains(&key) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "{key} was not finalized in time"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

fn request(method: Method, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body).expect("valid request")
}

fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

/// Hand-assembled `multipart/form-data` body.
#[derive(Default)]
pub struct MultipartForm {
    body: Vec<u8>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.part(
            &format!("Content-Disposition: form-data; name=\"{name}\""),
            value.as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.part(
            &format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                 Content-Type: application/octet-stream"
            ),
            data,
        );
        self
    }

    fn part(&mut self, headers: &str, data: &[u8]) {
        self.body
            .extend_from_slice(format!("--{MULTIPART_BOUNDARY}\r\n{headers}\r\n\r\n").as_bytes());
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
    }

    pub fn into_request(mut self, uri: &str, token: &str) -> Request<Body> {
        self.body
            .extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .expect("valid request")
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("read body")
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("response body is JSON")
}
