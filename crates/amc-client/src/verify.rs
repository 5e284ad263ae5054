//! Post-session artifact verification.
//!
//! After the MCP session closes, the artifact the coding tool was asked to
//! produce is executed as an independent subprocess and its output and exit
//! status are relayed to the caller. A missing artifact and a failing run
//! are distinct failures with distinct exit codes.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum ArtifactError {
    #[error("expected artifact {0} was not created")]
    Missing(PathBuf),
    #[error("failed to run artifact {path} with '{runner}': {source}")]
    Launch {
        path: PathBuf,
        runner: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub(crate) struct ArtifactRunOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Execute the artifact with the configured interpreter and capture its
/// output. The caller propagates a non-zero exit code as its own.
pub(crate) fn run_artifact(path: &Path, runner: &str) -> Result<ArtifactRunOutput, ArtifactError> {
    if !path.is_file() {
        return Err(ArtifactError::Missing(path.to_path_buf()));
    }
    let output = Command::new(runner)
        .arg(path)
        .output()
        .map_err(|source| ArtifactError::Launch {
            path: path.to_path_buf(),
            runner: runner.to_string(),
            source,
        })?;
    Ok(ArtifactRunOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        // A signal-terminated artifact has no code; treat it as a plain failure.
        exit_code: output.status.code().unwrap_or(1),
    })
}
