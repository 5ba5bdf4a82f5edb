//! JSON-lines protocol spoken with the render driver process.
//!
//! Each request is one line `{"id": n, "command": "...", ...}`; each reply is
//! one line `{"id": n, "ok": true, "result": ...}` or
//! `{"id": n, "ok": false, "error": "..."}`. The driver announces itself with
//! `{"event": "ready"}` before accepting commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::debug;

use crate::application::engine::{LoadOptions, PageFormat, TargetError, WaitCondition};

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub(crate) enum Command<'a> {
    Load {
        html: &'a str,
        #[serde(flatten)]
        options: &'a LoadOptions,
    },
    WaitFor {
        condition: &'a WaitCondition,
        timeout_ms: u64,
    },
    Evaluate {
        script: &'a str,
    },
    Measure {
        selector: &'a str,
    },
    SetStyle {
        selector: &'a str,
        index: usize,
        styles: &'a [(String, String)],
    },
    Rasterize {
        path: &'a str,
        format: PageFormat,
        margin_mm: f64,
        print_background: bool,
    },
    Close,
}

impl Command<'_> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Command::Load { .. } => "load",
            Command::WaitFor { .. } => "wait_for",
            Command::Evaluate { .. } => "evaluate",
            Command::Measure { .. } => "measure",
            Command::SetStyle { .. } => "set_style",
            Command::Rasterize { .. } => "rasterize",
            Command::Close => "close",
        }
    }
}

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a Command<'a>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Request/reply channel over the driver's stdin and stdout.
pub(crate) struct DriverChannel<W, R> {
    writer: W,
    lines: Lines<BufReader<R>>,
    next_id: u64,
}

impl<W, R> DriverChannel<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin + Send,
{
    pub(crate) fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            lines: BufReader::new(reader).lines(),
            next_id: 1,
        }
    }

    /// Wait for the driver's `ready` event. Earlier lines, JSON or not, are
    /// skipped.
    pub(crate) async fn handshake(&mut self) -> Result<(), TargetError> {
        loop {
            let line = self.read_line().await?;
            match serde_json::from_str::<Reply>(&line) {
                Ok(reply) if reply.event.as_deref() == Some("ready") => return Ok(()),
                Ok(_) => {}
                Err(_) => debug!(
                    target = "infra::browser",
                    op = "driver::handshake",
                    line = %line,
                    "Skipping driver output before ready"
                ),
            }
        }
    }

    pub(crate) async fn call(&mut self, command: &Command<'_>) -> Result<Value, TargetError> {
        let id = self.next_id;
        self.next_id += 1;

        let mut line = serde_json::to_vec(&Request { id, command })
            .map_err(|err| TargetError::protocol(err.to_string()))?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;

        loop {
            let reply = self.read_reply().await?;
            match reply.id {
                Some(reply_id) if reply_id == id => {
                    return if reply.ok {
                        Ok(reply.result)
                    } else {
                        Err(TargetError::command(
                            command.name(),
                            reply.error.unwrap_or_else(|| "unspecified failure".to_string()),
                        ))
                    };
                }
                // Replies to commands abandoned after a timeout.
                Some(stale) => debug!(
                    target = "infra::browser",
                    op = "driver::call",
                    stale,
                    expected = id,
                    "Discarding stale driver reply"
                ),
                None => debug!(
                    target = "infra::browser",
                    op = "driver::call",
                    event = reply.event.as_deref().unwrap_or("unknown"),
                    "Ignoring driver event"
                ),
            }
        }
    }

    async fn read_reply(&mut self) -> Result<Reply, TargetError> {
        let line = self.read_line().await?;
        serde_json::from_str(&line).map_err(|err| {
            TargetError::protocol(format!("unparseable driver output `{line}`: {err}"))
        })
    }

    /// Next non-blank line, trimmed.
    async fn read_line(&mut self) -> Result<String, TargetError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Err(TargetError::Closed);
            };
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok(trimmed.to_string());
            }
        }
    }
}
