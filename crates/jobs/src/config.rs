use std::path::PathBuf;

/// Default backend executable.
pub const DEFAULT_BACKEND_PROGRAM: &str = "CAM2DistributedBackend";

/// How submissions are launched.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Backend executable.
    pub backend_program: String,
    /// Arguments placed before the positional submission arguments.
    pub backend_args: Vec<String>,
    /// Processing-cluster address, e.g. `spark://master:7077`.
    pub master_url: String,
    /// Storage-cluster address, e.g. `http://namenode:50070`.
    pub namenode_url: String,
    /// Directory under which per-job scratch areas are created.
    pub scratch_root: PathBuf,
}

impl SupervisorConfig {
    /// Config running [`DEFAULT_BACKEND_PROGRAM`] with scratch areas in the
    /// OS temp directory.
    pub fn new(master_url: impl Into<String>, namenode_url: impl Into<String>) -> Self {
        Self {
            backend_program: DEFAULT_BACKEND_PROGRAM.to_string(),
            backend_args: Vec::new(),
            master_url: master_url.into(),
            namenode_url: namenode_url.into(),
            scratch_root: std::env::temp_dir(),
        }
    }
}
