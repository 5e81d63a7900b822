use std::sync::Arc;

use crate::errors::DeskBenchResult;
use crate::sandbox::Desktop;

/// Exclusive owner of a provisioned sandbox.
///
/// Call [`SandboxGuard::release`] on the normal path. If the guard is dropped
/// without being released (the owning future was cancelled or panicked) the
/// sandbox is killed from a detached task on the current runtime.
pub struct SandboxGuard {
    desktop: Arc<dyn Desktop>,
    released: bool,
}

impl SandboxGuard {
    pub fn new(desktop: Box<dyn Desktop>) -> Self {
        Self {
            desktop: Arc::from(desktop),
            released: false,
        }
    }

    pub fn desktop(&self) -> &dyn Desktop {
        self.desktop.as_ref()
    }

    /// Kills the sandbox. Consumes the guard so teardown cannot run twice.
    pub async fn release(mut self) -> DeskBenchResult<()> {
        self.released = true;
        tracing::info!(sandbox = %self.desktop.id(), "stopping sandbox");
        let result = self.desktop.kill().await;
        match &result {
            Ok(()) => tracing::info!(sandbox = %self.desktop.id(), "sandbox terminated"),
            Err(e) => tracing::warn!(sandbox = %self.desktop.id(), error = %e, "sandbox kill failed"),
        }
        result
    }
}

impl Drop for SandboxGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let desktop = self.desktop.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(sandbox = %desktop.id(), "sandbox guard dropped without release, killing in background");
                handle.spawn(async move {
                    if let Err(e) = desktop.kill().await {
                        tracing::warn!(sandbox = %desktop.id(), error = %e, "background sandbox kill failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(sandbox = %desktop.id(), "sandbox guard dropped outside a runtime; sandbox left to its provider timeout");
            }
        }
    }
}
