//! CPORT fallback: run an external converter that rewrites a CPORT library
//! as a plain SAS transport file.
//!
//! The converter only touches the two paths it is given. Creating and
//! removing them is the caller's job (see [`crate::readers::xport`]).

use crate::config::IngestConfig;
use crate::error::IngestError;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::runtime::{Builder, Handle};
use tokio::time::timeout;
use tracing::debug;

/// Fixed mode flag passed to the converter.
pub const CPORT_TO_XPT_FLAG: &str = "/cport-to-xpt";

/// Converts a CPORT library at `input` into a transport file at `output`.
///
/// Called from blocking code (readers run on tokio's blocking pool or on a
/// plain thread), never from inside an async task.
pub trait LegacyConverter: Send + Sync {
    fn convert(&self, input: &Path, output: &Path) -> Result<(), IngestError>;
}

/// Runs `<program> /in=<input> /out=<output> /cport-to-xpt`.
#[derive(Debug, Clone)]
pub struct StatTransfer {
    program: String,
    timeout: Option<Duration>,
}

impl StatTransfer {
    pub fn new(program: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(
            config.converter_program.clone(),
            config.converter_timeout_secs.map(Duration::from_secs),
        )
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(format!("/in={}", input.display()))
            .arg(format!("/out={}", output.display()))
            .arg(CPORT_TO_XPT_FLAG)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn failed(&self, detail: impl Into<String>) -> IngestError {
        IngestError::ConversionFailed {
            program: self.program.clone(),
            detail: detail.into(),
        }
    }

    /// Spawn the converter and wait for it, killing it at the deadline.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<(), IngestError> {
        debug!(
            "Running {} {} -> {}",
            self.program,
            input.display(),
            output.display()
        );
        let start = Instant::now();

        let child = self
            .command(input, output)
            .spawn()
            .map_err(|e| self.failed(format!("could not start: {e}")))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let finished = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| IngestError::ConversionTimeout {
                    program: self.program.clone(),
                    secs: limit.as_secs(),
                })?,
            None => child.wait_with_output().await,
        };
        let result = finished.map_err(|e| self.failed(format!("wait failed: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let stderr = stderr.trim();
            let mut detail = format!("exited with {}", result.status);
            if !stderr.is_empty() {
                detail.push_str(": ");
                detail.push_str(stderr);
            }
            return Err(self.failed(detail));
        }
        let written = tokio::fs::try_exists(output)
            .await
            .map_err(|e| self.failed(format!("could not check {}: {e}", output.display())))?;
        if !written {
            return Err(self.failed(format!(
                "exited successfully but wrote no file at {}",
                output.display()
            )));
        }

        debug!(
            "{} finished in {}ms",
            self.program,
            start.elapsed().as_millis()
        );
        Ok(())
    }
}

impl LegacyConverter for StatTransfer {
    /// Drives [`StatTransfer::run`] on the ambient runtime when there is
    /// one, otherwise on a single-threaded runtime built for the call.
    fn convert(&self, input: &Path, output: &Path) -> Result<(), IngestError> {
        match Handle::try_current() {
            Ok(handle) => handle.block_on(self.run(input, output)),
            Err(_) => Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| self.failed(format!("could not start a runtime: {e}")))?
                .block_on(self.run(input, output)),
        }
    }
}
