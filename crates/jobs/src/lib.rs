//! Job lifecycle management for CAM2 submissions.
//!
//! A submission runs as one external backend process. The [`Supervisor`]
//! launches it, records it as `RUNNING`, and hands the process to a
//! per-job monitor task which owns it until exit. The monitor performs
//! finalization exactly once:
//!
//! 1. write captured output (and `COMPLETED`, if still `RUNNING`),
//! 2. release the scratch area,
//! 3. remove the job from the [`JobRegistry`].
//!
//! Termination requests are routed through the registry to the monitor,
//! which flips the record to `TERMINATED` before signalling the process.

pub mod config;
pub mod error;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod scratch;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use error::SupervisorError;
pub use registry::JobRegistry;
pub use supervisor::Supervisor;
