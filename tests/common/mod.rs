#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use deskbench::agent_engine::state::{ActionDescriptor, Decision, ModelTurn};
use deskbench::errors::{DeskBenchError, DeskBenchResult};
use deskbench::eval::trial::{TrialRunner, TrialSettings};
use deskbench::executor::registry::ActionRegistry;
use deskbench::llm::decision::{DecisionModel, ModelFactory};
use deskbench::llm::types::ChatMessage;
use deskbench::perception::types::ScreenSize;
use deskbench::sandbox::{CommandOutput, Desktop, DesktopCommand, SandboxProvider, SandboxSpec};

pub const SCREEN: ScreenSize = ScreenSize { width: 64, height: 48 };

pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([shade, shade, shade, 255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).expect("encode png");
    out.into_inner()
}

/// Shared counters observed by tests after a trial finishes.
#[derive(Default)]
pub struct DesktopLog {
    pub commands: Mutex<Vec<DesktopCommand>>,
    pub shell: Mutex<Vec<String>>,
    pub screenshots: AtomicUsize,
    pub kills: AtomicUsize,
}

impl DesktopLog {
    pub fn kills(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<DesktopCommand> {
        self.commands.lock().expect("lock").clone()
    }
}

pub struct MockDesktop {
    pub log: Arc<DesktopLog>,
    pub fail_screenshots: bool,
}

#[async_trait]
impl Desktop for MockDesktop {
    fn id(&self) -> &str {
        "mock-sandbox"
    }

    fn screen_size(&self) -> ScreenSize {
        SCREEN
    }

    async fn perform(&self, command: &DesktopCommand) -> DeskBenchResult<()> {
        self.log.commands.lock().expect("lock").push(command.clone());
        Ok(())
    }

    async fn screenshot(&self) -> DeskBenchResult<Vec<u8>> {
        let n = self.log.screenshots.fetch_add(1, Ordering::SeqCst);
        if self.fail_screenshots && n > 0 {
            return Err(DeskBenchError::Sandbox("display went away".into()));
        }
        Ok(png(SCREEN.width, SCREEN.height, (n % 255) as u8))
    }

    async fn run_command(&self, command: &str) -> DeskBenchResult<CommandOutput> {
        self.log.shell.lock().expect("lock").push(command.to_string());
        Ok(CommandOutput::default())
    }

    async fn kill(&self) -> DeskBenchResult<()> {
        self.log.kills.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out mock desktops; one shared log for all of them.
pub struct MockProvider {
    pub log: Arc<DesktopLog>,
    pub provisions: AtomicUsize,
    pub fail: bool,
    pub fail_screenshots: bool,
    /// How long `provision` takes before answering.
    pub provision_delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            log: Arc::new(DesktopLog::default()),
            provisions: AtomicUsize::new(0),
            fail: false,
            fail_screenshots: false,
            provision_delay: Duration::ZERO,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl SandboxProvider for MockProvider {
    async fn provision(&self, _spec: &SandboxSpec) -> DeskBenchResult<Box<dyn Desktop>> {
        self.provisions.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.provision_delay).await;
        if self.fail {
            return Err(DeskBenchError::Provisioning("quota exceeded".into()));
        }
        Ok(Box::new(MockDesktop {
            log: self.log.clone(),
            fail_screenshots: self.fail_screenshots,
        }))
    }
}

pub enum Script {
    Turn(ModelTurn),
    Fail(String),
    /// Sleeps past any reasonable test deadline.
    Hang,
}

/// Model answering from a fixed script; repeats the last entry when exhausted.
pub struct ScriptedModel {
    script: Mutex<VecDeque<Script>>,
    repeat: Option<ModelTurn>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Script>, repeat: Option<ModelTurn>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl DecisionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, messages: &[ChatMessage]) -> DeskBenchResult<ModelTurn> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let images: usize = messages.iter().map(ChatMessage::image_count).sum();
        assert!(images <= 1, "more than one screenshot sent to the model");

        let next = self.script.lock().expect("lock").pop_front();
        match next {
            Some(Script::Turn(t)) => Ok(t),
            Some(Script::Fail(msg)) => Err(DeskBenchError::LlmProvider(msg)),
            Some(Script::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(DeskBenchError::LlmProvider("woke up".into()))
            }
            None => self
                .repeat
                .clone()
                .ok_or_else(|| DeskBenchError::LlmProvider("script exhausted".into())),
        }
    }
}

pub fn act(name: &str, args: serde_json::Value) -> ModelTurn {
    ModelTurn {
        decision: Decision::Act(ActionDescriptor::new(name, args)),
        goal: Some(format!("do {name}")),
        reasoning: String::new(),
    }
}

pub fn finish(answer: &str) -> ModelTurn {
    ModelTurn {
        decision: Decision::Finish {
            answer: answer.to_string(),
        },
        goal: None,
        reasoning: String::new(),
    }
}

pub fn click(x: i64, y: i64) -> ModelTurn {
    act("click", json!({ "x": x, "y": y }))
}

/// Factory whose every model completes after one click.
pub fn completing_factory() -> ModelFactory {
    Arc::new(|| {
        Ok(Box::new(ScriptedModel::new(
            vec![Script::Turn(click(5, 5)), Script::Turn(finish("Done"))],
            None,
        )) as Box<dyn DecisionModel>)
    })
}

pub fn settings() -> TrialSettings {
    TrialSettings {
        sandbox: SandboxSpec {
            template: "desktop".into(),
            resolution: SCREEN,
            dpi: 96,
            timeout: Duration::from_secs(30),
        },
        provision_timeout: Duration::from_secs(5),
        setup_commands: vec!["true".into()],
        settle_delay: Duration::ZERO,
        max_consecutive_failures: 3,
    }
}

pub fn runner(provider: Arc<MockProvider>, models: ModelFactory, settings: TrialSettings) -> TrialRunner {
    TrialRunner::new(provider, models, Arc::new(ActionRegistry::standard(0)), settings)
}
