//! Observation capture: settle → screenshot → persist → mark → repetition check.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent_engine::state::ActionDescriptor;
use crate::errors::{DeskBenchError, DeskBenchResult};
use crate::perception::annotator;
use crate::perception::screenshot::{self, ScreenshotResult};
use crate::perception::types::{Observation, ScreenPoint};
use crate::sandbox::Desktop;

pub const REPEAT_WARNING: &str = "WARNING: You've executed the same action several times in a row. MAKE SURE TO NOT UNNECESSARILY REPEAT ACTIONS.";

pub struct ObservationCapturer {
    data_dir: PathBuf,
    settle_delay: Duration,
}

impl ObservationCapturer {
    pub fn new(data_dir: impl Into<PathBuf>, settle_delay: Duration) -> Self {
        Self {
            data_dir: data_dir.into(),
            settle_delay,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn step_path(&self, step_index: usize) -> PathBuf {
        self.data_dir.join(format!("step_{step_index:03}.png"))
    }

    /// Step-0 screenshot: no settle delay, no marker, no repetition check.
    pub async fn capture_initial(&self, desktop: &dyn Desktop) -> DeskBenchResult<Observation> {
        let shot = screenshot::capture(desktop).await?;
        self.persist(0, shot, None, String::new()).await
    }

    pub async fn capture(
        &self,
        desktop: &dyn Desktop,
        step_index: usize,
        last_interaction: Option<ScreenPoint>,
        previous: Option<&ActionDescriptor>,
        current: Option<&ActionDescriptor>,
    ) -> DeskBenchResult<Observation> {
        tracing::debug!(step = step_index, "analyzing screen content");
        // Action side effects are not synchronous on the remote desktop.
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let shot = screenshot::capture(desktop).await?;
        let note = repetition_note(previous, current);
        if !note.is_empty() {
            tracing::info!(step = step_index, "repeated action detected");
        }
        self.persist(step_index, shot, last_interaction, note).await
    }

    async fn persist(
        &self,
        step_index: usize,
        shot: ScreenshotResult,
        marker: Option<ScreenPoint>,
        note: String,
    ) -> DeskBenchResult<Observation> {
        let saved_path = self.step_path(step_index);
        tokio::fs::write(&saved_path, &shot.png)
            .await
            .map_err(|e| DeskBenchError::CaptureFailure(format!("write {}: {e}", saved_path.display())))?;

        let model_png = match marker {
            Some(point) => {
                tracing::debug!(x = point.x, y = point.y, "drawing marker");
                let raw = shot.png;
                tokio::task::spawn_blocking(move || annotator::mark_png(&raw, point))
                    .await
                    .map_err(|e| DeskBenchError::CaptureFailure(format!("join: {e}")))??
            }
            None => shot.png,
        };

        tracing::info!(
            step = step_index,
            path = %saved_path.display(),
            width = shot.size.width,
            height = shot.size.height,
            "saved screenshot"
        );
        Ok(Observation {
            model_png,
            saved_path,
            note,
        })
    }
}

/// Non-empty when the current descriptor equals the previous one.
pub fn repetition_note(previous: Option<&ActionDescriptor>, current: Option<&ActionDescriptor>) -> String {
    match (previous, current) {
        (Some(prev), Some(cur)) if prev == cur => REPEAT_WARNING.to_string(),
        _ => String::new(),
    }
}
