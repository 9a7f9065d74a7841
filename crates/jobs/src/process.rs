//! Backend process launch, output capture and cooperative stop.

use std::io;
use std::process::Stdio;

use cam2_core::submission::SubmissionKey;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

use crate::config::SupervisorConfig;
use crate::scratch::ScratchArea;

/// Maximum stdout or stderr size captured per stream (10 MiB).
///
/// Anything beyond the limit is read and discarded so the backend never
/// stalls on a full pipe.
pub const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Appended to captured output that is not the complete stream.
pub const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

/// Build the backend invocation:
///
/// ```text
/// <program> [args...] <master_url> <namenode_url> <owner> <submission_id> <conf> <analyzer>
/// ```
pub fn backend_command(
    config: &SupervisorConfig,
    key: &SubmissionKey,
    scratch: &ScratchArea,
) -> Command {
    let mut cmd = Command::new(&config.backend_program);
    cmd.args(&config.backend_args)
        .arg(&config.master_url)
        .arg(&config.namenode_url)
        .arg(&key.owner)
        .arg(&key.submission_id)
        .arg(scratch.conf_path())
        .arg(scratch.analyzer_path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);
    cmd
}

/// Launch the backend for `key`.
pub fn spawn_backend(
    config: &SupervisorConfig,
    key: &SubmissionKey,
    scratch: &ScratchArea,
) -> io::Result<Child> {
    backend_command(config, key, scratch).spawn()
}

/// Read a stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// When bytes were dropped, either past the limit or because the stream
/// failed, the result ends with [`TRUNCATION_MARKER`].
pub async fn read_capped<R: AsyncRead + Unpin>(
    key: SubmissionKey,
    stream: &'static str,
    handle: Option<R>,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return buf;
    };

    if let Err(e) = (&mut h)
        .take(MAX_OUTPUT_BYTES as u64)
        .read_to_end(&mut buf)
        .await
    {
        tracing::warn!(%key, stream, error = %e, "Failed to read backend output");
        buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        return buf;
    }

    match tokio::io::copy(&mut h, &mut tokio::io::sink()).await {
        Ok(0) => {}
        Ok(dropped) => {
            tracing::warn!(
                %key,
                stream,
                dropped_bytes = dropped,
                limit = MAX_OUTPUT_BYTES,
                "Backend output exceeded the capture limit",
            );
            buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        }
        Err(e) => {
            tracing::warn!(%key, stream, error = %e, "Failed to drain backend output");
            buf.extend_from_slice(TRUNCATION_MARKER.as_bytes());
        }
    }
    buf
}

/// Ask the process to stop (`SIGTERM`). Does not wait for it to exit.
#[cfg(unix)]
pub fn request_stop(child: &mut Child) -> io::Result<()> {
    let pid = child
        .id()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "process has already been reaped"))?;
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "process id out of range"))?;

    // SAFETY: `kill` only sends a signal; the pid belongs to a child we have
    // not reaped yet, so it cannot have been recycled.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Ask the process to stop. Without POSIX signals this is a kill.
#[cfg(not(unix))]
pub fn request_stop(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
