use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use deskbench::config::{self, AppConfig};
use deskbench::errors::DeskBenchResult;
use deskbench::eval::orchestrator::{EvalPlan, Orchestrator};
use deskbench::eval::trial::{TrialRunner, TrialSettings};
use deskbench::eval::types::Task;
use deskbench::executor::registry::ActionRegistry;
use deskbench::llm::registry::{replay_factory, ProviderRegistry};
use deskbench::sandbox::http::HttpSandboxProvider;

/// Run the desktop agent over a batch of tasks and report success rates
#[derive(Parser, Debug)]
#[command(
    name = "deskbench",
    about = "Evaluate a vision desktop agent across tasks and repeated sandboxed trials",
    after_help = "ENVIRONMENT VARIABLES:\n\
        DESKBENCH_<PROVIDER>_API_KEY   API key for [llm.providers.<provider>]\n\
        DESKBENCH_SANDBOX_API_KEY      API key for the sandbox service\n\
        RUST_LOG                       Log filter (default: info)"
)]
struct Args {
    /// Path to config.toml (default: next to the binary, then cwd, then the user config dir)
    #[arg(short, long, env = "DESKBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Trials per task
    #[arg(short = 'n', long)]
    num_runs: Option<usize>,

    /// Directory that receives the eval_<timestamp>_<rev> folder
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Tasks evaluated concurrently
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Trials of one task run concurrently (default: --num-runs)
    #[arg(long)]
    max_parallel_runs: Option<usize>,

    /// Action steps allowed per trial
    #[arg(long)]
    max_steps: Option<usize>,

    /// Replay the decisions recorded in a trial's metadata.json instead of calling a model
    #[arg(long)]
    replay: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut AppConfig) {
        if let Some(n) = self.num_runs {
            cfg.eval.num_runs = n;
        }
        if let Some(dir) = &self.output_dir {
            cfg.eval.output_dir = dir.clone();
        }
        if let Some(n) = self.max_parallel {
            cfg.eval.max_parallel_tasks = n;
        }
        if let Some(n) = self.max_parallel_runs {
            cfg.eval.max_parallel_runs = Some(n);
        }
        if let Some(n) = self.max_steps {
            cfg.agent.max_steps = n;
        }
    }
}

async fn run(args: Args) -> DeskBenchResult<f64> {
    let mut cfg = match &args.config {
        Some(path) => config::load_config_from(path)?,
        None => config::load_config().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "no usable config.toml; using defaults");
            AppConfig::default()
        }),
    };
    args.apply(&mut cfg);

    let actions = Arc::new(ActionRegistry::standard(cfg.agent.type_delay_ms));
    let models = match &args.replay {
        Some(path) => replay_factory(path)?,
        None => ProviderRegistry::from_config(&cfg).model_factory(actions.clone())?,
    };
    let sandboxes = Arc::new(HttpSandboxProvider::new(
        cfg.sandbox.api_base.clone(),
        cfg.sandbox.resolved_api_key(),
    ));
    let runner = TrialRunner::new(sandboxes, models, actions, TrialSettings::from(&cfg));

    let plan = EvalPlan {
        tasks: cfg
            .eval
            .tasks
            .iter()
            .map(|(name, prompt)| Task::new(name.clone(), prompt.clone()))
            .collect(),
        repetitions: cfg.eval.num_runs,
        max_parallel_tasks: cfg.eval.max_parallel_tasks,
        max_parallel_repetitions: cfg.eval.max_parallel_runs.unwrap_or(cfg.eval.num_runs),
        max_steps: cfg.agent.max_steps,
    };

    let outcome = Orchestrator::new(Arc::new(runner), cfg.eval.output_dir.clone())
        .run(&plan)
        .await?;
    tracing::info!(dir = %outcome.output_dir.display(), "results saved");
    Ok(outcome.summary.success_rate)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (ignore error if not found)
    let _ = dotenvy::dotenv();
    deskbench::init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(rate) => {
            println!("Overall success rate: {:.1}%", rate * 100.0);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "evaluation failed");
            ExitCode::FAILURE
        }
    }
}
