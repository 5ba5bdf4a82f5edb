//! The narrow interface the render engine drives. Concrete automation
//! (a browser driver process, a fake in tests) lives behind these traits.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("render target could not be launched: {0}")]
    Launch(String),
    #[error("render target timed out during `{operation}`")]
    Timeout { operation: &'static str },
    #[error("render target command `{command}` failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
    #[error("render target protocol violation: {0}")]
    Protocol(String),
    #[error("render target i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("render target exited")]
    Closed,
}

impl TargetError {
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            command,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageFormat {
    A4,
    Letter,
}

impl PageFormat {
    /// Paper size in millimetres, portrait.
    pub fn size_mm(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::Letter => (215.9, 279.4),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PageFormat::A4 => "a4",
            PageFormat::Letter => "letter",
        }
    }
}

/// Network filtering applied while the document loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadOptions {
    pub blocked_resource_types: Vec<String>,
    /// URLs that load even when their resource type is blocked.
    pub allowed_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum WaitCondition {
    /// A global binding exists on `window`.
    GlobalDefined(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOptions {
    pub format: PageFormat,
    pub margin_mm: f64,
    pub print_background: bool,
}

#[async_trait]
pub trait RenderTarget: Send {
    async fn load(&mut self, html: &str, options: &LoadOptions) -> Result<(), TargetError>;

    /// Resolves to `false` when the condition did not hold within `timeout`.
    async fn wait_for(
        &mut self,
        condition: &WaitCondition,
        timeout: Duration,
    ) -> Result<bool, TargetError>;

    async fn evaluate(&mut self, script: &str) -> Result<Value, TargetError>;

    /// Rendered height in CSS pixels of every element matching `selector`,
    /// `None` where the height cannot be introspected.
    async fn measure(&mut self, selector: &str) -> Result<Vec<Option<f64>>, TargetError>;

    async fn set_style(
        &mut self,
        selector: &str,
        index: usize,
        styles: &[(String, String)],
    ) -> Result<(), TargetError>;

    async fn rasterize(&mut self, options: &PageOptions) -> Result<Bytes, TargetError>;

    async fn close(&mut self) -> Result<(), TargetError>;
}

/// Acquires a fresh, unshared target per export.
#[async_trait]
pub trait TargetLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn RenderTarget>, TargetError>;
}
