//! Headless browser render target.
//!
//! The browser runs inside an external driver process (by default
//! `node assets/render-driver.mjs`) that speaks the JSON-lines protocol in
//! [`protocol`]. One process is spawned per export and killed when the
//! target is closed or dropped.

mod protocol;

use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tempfile::TempDir;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::{Instant, timeout},
};
use tracing::{debug, info, warn};

use crate::application::engine::{
    LoadOptions, PageOptions, RenderTarget, TargetError, TargetLauncher, WaitCondition,
};

use self::protocol::{Command as DriverCommand, DriverChannel};

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Interpreter or executable that runs the driver, e.g. `node`.
    pub program: PathBuf,
    pub args: Vec<String>,
    pub startup_timeout: Duration,
    /// Upper bound for any single command round trip.
    pub command_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct DriverLauncher {
    settings: DriverSettings,
}

impl DriverLauncher {
    pub fn new(settings: DriverSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl TargetLauncher for DriverLauncher {
    async fn launch(&self) -> Result<Box<dyn RenderTarget>, TargetError> {
        let started_at = Instant::now();
        let mut child = Command::new(&self.settings.program)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                TargetError::Launch(format!(
                    "failed to spawn `{}`: {err}",
                    self.settings.program.display()
                ))
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(TargetError::Launch("driver stdio unavailable".to_string()));
        };
        if let Some(stderr) = child.stderr.take() {
            let pid = child.id();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target = "infra::browser", pid, line = %line, "driver stderr");
                }
            });
        }

        let mut channel = DriverChannel::new(stdin, stdout);
        match timeout(self.settings.startup_timeout, channel.handshake()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(TargetError::Launch(err.to_string())),
            Err(_) => {
                return Err(TargetError::Launch(format!(
                    "driver not ready after {:?}",
                    self.settings.startup_timeout
                )));
            }
        }

        let scratch = TempDir::new()?;
        info!(
            target = "infra::browser",
            op = "driver::launch",
            result = "ok",
            pid = child.id(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Render driver ready"
        );

        Ok(Box::new(ProcessRenderTarget {
            child,
            channel,
            command_timeout: self.settings.command_timeout,
            scratch,
            rasterized: 0,
        }))
    }
}

struct ProcessRenderTarget {
    child: Child,
    channel: DriverChannel<ChildStdin, ChildStdout>,
    command_timeout: Duration,
    scratch: TempDir,
    rasterized: usize,
}

impl ProcessRenderTarget {
    async fn call(
        &mut self,
        command: DriverCommand<'_>,
        limit: Duration,
    ) -> Result<Value, TargetError> {
        let operation = command.name();
        timeout(limit, self.channel.call(&command))
            .await
            .map_err(|_| TargetError::Timeout { operation })?
    }
}

#[async_trait]
impl RenderTarget for ProcessRenderTarget {
    async fn load(&mut self, html: &str, options: &LoadOptions) -> Result<(), TargetError> {
        let limit = self.command_timeout;
        self.call(DriverCommand::Load { html, options }, limit).await?;
        Ok(())
    }

    async fn wait_for(
        &mut self,
        condition: &WaitCondition,
        wait: Duration,
    ) -> Result<bool, TargetError> {
        let limit = wait + self.command_timeout;
        let result = self
            .call(
                DriverCommand::WaitFor {
                    condition,
                    timeout_ms: wait.as_millis() as u64,
                },
                limit,
            )
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, TargetError> {
        let limit = self.command_timeout;
        self.call(DriverCommand::Evaluate { script }, limit).await
    }

    async fn measure(&mut self, selector: &str) -> Result<Vec<Option<f64>>, TargetError> {
        let limit = self.command_timeout;
        let result = self.call(DriverCommand::Measure { selector }, limit).await?;
        parse_heights(result)
    }

    async fn set_style(
        &mut self,
        selector: &str,
        index: usize,
        styles: &[(String, String)],
    ) -> Result<(), TargetError> {
        let limit = self.command_timeout;
        self.call(
            DriverCommand::SetStyle {
                selector,
                index,
                styles,
            },
            limit,
        )
        .await?;
        Ok(())
    }

    async fn rasterize(&mut self, options: &PageOptions) -> Result<Bytes, TargetError> {
        self.rasterized += 1;
        let path = self
            .scratch
            .path()
            .join(format!("page-{}.pdf", self.rasterized));
        let path_str = path
            .to_str()
            .ok_or_else(|| TargetError::protocol("scratch path is not valid UTF-8"))?
            .to_string();

        let limit = self.command_timeout;
        self.call(
            DriverCommand::Rasterize {
                path: &path_str,
                format: options.format,
                margin_mm: options.margin_mm,
                print_background: options.print_background,
            },
            limit,
        )
        .await?;

        let bytes = tokio::fs::read(&path).await?;
        if let Err(err) = tokio::fs::remove_file(&path).await {
            debug!(
                target = "infra::browser",
                op = "driver::rasterize",
                path = %path.display(),
                error = %err,
                "Failed to remove rasterized scratch file"
            );
        }
        Ok(Bytes::from(bytes))
    }

    async fn close(&mut self) -> Result<(), TargetError> {
        let limit = self.command_timeout;
        let polite = self.call(DriverCommand::Close, limit).await;

        match timeout(self.command_timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!(
                    target = "infra::browser",
                    op = "driver::close",
                    status = %status,
                    "Render driver exited"
                );
            }
            Ok(Err(err)) => return Err(TargetError::Io(err)),
            Err(_) => {
                warn!(
                    target = "infra::browser",
                    op = "driver::close",
                    result = "killed",
                    "Render driver ignored close; killing"
                );
                self.child.start_kill()?;
            }
        }

        match polite {
            Ok(_) | Err(TargetError::Closed) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// `null` entries stay unmeasurable; zero is a real height.
fn parse_heights(result: Value) -> Result<Vec<Option<f64>>, TargetError> {
    let Value::Array(heights) = result else {
        return Err(TargetError::protocol("measure must return an array"));
    };
    Ok(heights
        .into_iter()
        .map(|height| height.as_f64().filter(|h| h.is_finite()))
        .collect())
}
