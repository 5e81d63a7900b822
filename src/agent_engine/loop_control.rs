// Stop conditions checked at the top of every loop iteration.
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Ceiling on action steps, failed ones included.
    pub max_steps: usize,
    /// Consecutive invalid actions tolerated before the trial fails.
    pub max_consecutive_failures: u32,
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    StepLimit,
    Deadline,
    TooManyFailures(u32),
}

pub struct LoopController {
    config: LoopConfig,
    consecutive_failures: u32,
}

impl LoopController {
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn should_stop(&self, action_steps: usize) -> Option<StopReason> {
        if self.config.max_consecutive_failures > 0
            && self.consecutive_failures >= self.config.max_consecutive_failures
        {
            return Some(StopReason::TooManyFailures(self.consecutive_failures));
        }
        if action_steps >= self.config.max_steps {
            return Some(StopReason::StepLimit);
        }
        if let Some(deadline) = self.config.deadline {
            if Instant::now() >= deadline {
                return Some(StopReason::Deadline);
            }
        }
        None
    }
}
