//! Desktop sandbox contract.
//!
//! A [`SandboxProvider`] creates isolated remote desktops; each returned
//! [`Desktop`] handle is owned by exactly one trial, which wraps it in a
//! [`guard::SandboxGuard`] so teardown happens on every exit path.

pub mod guard;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SandboxConfig;
use crate::errors::DeskBenchResult;
use crate::perception::types::{ScreenPoint, ScreenSize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

/// Primitive input operations a sandbox understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesktopCommand {
    MoveMouse { x: i32, y: i32 },
    Click { button: MouseButton },
    DoubleClick,
    Write { text: String, delay_ms: u64 },
    /// Pressed together as a chord when more than one key is given.
    Press { keys: Vec<String> },
    Scroll { direction: ScrollDirection, amount: u32 },
    Drag { from: ScreenPoint, to: ScreenPoint },
    Open { url: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// Parameters for one sandbox instance.
#[derive(Debug, Clone)]
pub struct SandboxSpec {
    pub template: String,
    pub resolution: ScreenSize,
    pub dpi: u32,
    /// Lifetime after which the provider reclaims the sandbox on its own.
    pub timeout: Duration,
}

impl From<&SandboxConfig> for SandboxSpec {
    fn from(cfg: &SandboxConfig) -> Self {
        Self {
            template: cfg.template.clone(),
            resolution: ScreenSize {
                width: cfg.width,
                height: cfg.height,
            },
            dpi: cfg.dpi,
            timeout: Duration::from_secs(cfg.timeout_secs),
        }
    }
}

/// Handle to one running remote desktop.
#[async_trait]
pub trait Desktop: Send + Sync {
    fn id(&self) -> &str;

    fn screen_size(&self) -> ScreenSize;

    async fn perform(&self, command: &DesktopCommand) -> DeskBenchResult<()>;

    /// PNG-encoded screenshot of the whole screen.
    async fn screenshot(&self) -> DeskBenchResult<Vec<u8>>;

    async fn run_command(&self, command: &str) -> DeskBenchResult<CommandOutput>;

    /// Destroys the sandbox. Called once by the owning guard.
    async fn kill(&self) -> DeskBenchResult<()>;
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn provision(&self, spec: &SandboxSpec) -> DeskBenchResult<Box<dyn Desktop>>;
}
