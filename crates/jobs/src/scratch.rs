//! Per-job scratch areas.
//!
//! A scratch area is a fresh directory holding the user's configuration and
//! analyzer script for the lifetime of one backend process. It is created by
//! `submit` and released by the job's monitor after the process exits.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

/// File name of the materialized configuration.
pub const CONF_FILE_NAME: &str = "user_conf.json";
/// File name of the materialized analyzer script.
pub const ANALYZER_FILE_NAME: &str = "user_analyzer.py";

/// Prefix of scratch directory names.
const DIR_PREFIX: &str = "cam2-";

#[derive(Debug)]
pub struct ScratchArea {
    dir: PathBuf,
    conf_path: PathBuf,
    analyzer_path: PathBuf,
}

impl ScratchArea {
    /// Create a new scratch directory under `root` and write both files
    /// into it.
    ///
    /// On failure, anything already written is removed again.
    pub async fn create(root: &Path, config: &Value, analyzer: &[u8]) -> io::Result<Self> {
        let dir = root.join(format!("{DIR_PREFIX}{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(root).await?;
        tokio::fs::create_dir(&dir).await?;

        let area = Self {
            conf_path: dir.join(CONF_FILE_NAME),
            analyzer_path: dir.join(ANALYZER_FILE_NAME),
            dir,
        };

        match area.materialize(config, analyzer).await {
            Ok(()) => Ok(area),
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&area.dir).await {
                    tracing::warn!(
                        dir = %area.dir.display(),
                        error = %cleanup,
                        "Failed to remove partial scratch area",
                    );
                }
                Err(e)
            }
        }
    }

    async fn materialize(&self, config: &Value, analyzer: &[u8]) -> io::Result<()> {
        tokio::fs::write(&self.conf_path, render_config(config)?).await?;
        tokio::fs::write(&self.analyzer_path, analyzer).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.analyzer_path, std::fs::Permissions::from_mode(0o755))
                .await?;
        }
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn conf_path(&self) -> &Path {
        &self.conf_path
    }

    pub fn analyzer_path(&self) -> &Path {
        &self.analyzer_path
    }

    /// Remove the configuration, the analyzer, then the directory.
    ///
    /// Consumes the area so it can only be released once. Every step is
    /// attempted even if an earlier one fails; failures are logged.
    pub async fn release(self) {
        for file in [&self.conf_path, &self.analyzer_path] {
            if let Err(e) = tokio::fs::remove_file(file).await {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(path = %file.display(), error = %e, "Failed to remove scratch file");
                }
            }
        }

        match tokio::fs::remove_dir(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to remove scratch directory, removing recursively");
                if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
                    tracing::error!(dir = %self.dir.display(), error = %e, "Leaked scratch directory");
                }
            }
        }
    }
}

/// Render the configuration as JSON with sorted keys and a 4-space indent.
pub fn render_config(config: &Value) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    sorted(config).serialize(&mut serializer)?;
    Ok(out)
}

/// Deep copy of `value` with every object's keys in ascending order.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = Map::new();
            for (key, value) in entries {
                out.insert(key.clone(), sorted(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_is_sorted_with_four_space_indent() {
        let config = json!({"zeta": 1, "alpha": {"b": true, "a": [1, 2]}});
        let rendered = String::from_utf8(render_config(&config).unwrap()).unwrap();
        assert_eq!(
            rendered,
            "{\n    \"alpha\": {\n        \"a\": [\n            1,\n            2\n        ],\n        \"b\": true\n    },\n    \"zeta\": 1\n}"
        );
    }

    #[tokio::test]
    async fn create_writes_both_files() {
        let root = tempfile::tempdir().unwrap();
        let area = ScratchArea::create(root.path(), &json!({"k": "v"}), b"print('hi')\n")
            .await
            .unwrap();

        assert!(area.dir().starts_with(root.path()));
        assert!(area
            .dir()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("cam2-"));
        assert_eq!(
            tokio::fs::read_to_string(area.conf_path()).await.unwrap(),
            "{\n    \"k\": \"v\"\n}"
        );
        assert_eq!(
            tokio::fs::read(area.analyzer_path()).await.unwrap(),
            b"print('hi')\n"
        );
    }

    #[tokio::test]
    async fn areas_are_distinct() {
        let root = tempfile::tempdir().unwrap();
        let a = ScratchArea::create(root.path(), &json!({}), b"").await.unwrap();
        let b = ScratchArea::create(root.path(), &json!({}), b"").await.unwrap();
        assert_ne!(a.dir(), b.dir());
    }

    #[tokio::test]
    async fn release_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let area = ScratchArea::create(root.path(), &json!({}), b"x").await.unwrap();
        let dir = area.dir().to_path_buf();

        area.release().await;
        assert!(!dir.exists());
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn release_tolerates_extra_files() {
        let root = tempfile::tempdir().unwrap();
        let area = ScratchArea::create(root.path(), &json!({}), b"x").await.unwrap();
        let dir = area.dir().to_path_buf();
        tokio::fs::write(dir.join("stray.log"), "left by backend").await.unwrap();

        area.release().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn create_fails_when_root_is_a_file() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("not-a-dir");
        tokio::fs::write(&file, "").await.unwrap();

        assert!(ScratchArea::create(&file, &json!({}), b"").await.is_err());
    }
}
