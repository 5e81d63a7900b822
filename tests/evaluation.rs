mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{click, completing_factory, finish, runner, settings, MockProvider, Script, ScriptedModel};
use deskbench::eval::orchestrator::{EvalPlan, Orchestrator};
use deskbench::eval::trial::TrialRequest;
use deskbench::eval::types::{Task, TrialMetadata, TrialStatus};
use deskbench::llm::decision::{DecisionModel, ModelFactory};
use deskbench::llm::registry::replay_factory;

fn request(dir: &std::path::Path, max_steps: usize) -> TrialRequest {
    TrialRequest {
        task: Task::new("wiki", "Go to Wikipedia"),
        run_index: 0,
        run_dir: dir.join("example_wiki").join("run_0"),
        max_steps,
    }
}

fn factory(make: fn() -> Vec<Script>, repeat: Option<deskbench::agent_engine::state::ModelTurn>) -> ModelFactory {
    Arc::new(move || Ok(Box::new(ScriptedModel::new(make(), repeat.clone())) as Box<dyn DecisionModel>))
}

fn read_metadata(req: &TrialRequest) -> TrialMetadata {
    let raw = std::fs::read_to_string(req.run_dir.join("metadata.json")).expect("metadata.json");
    serde_json::from_str(&raw).expect("parse metadata")
}

#[tokio::test]
async fn completed_trial_tears_down_once_and_persists() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let trial = runner(provider.clone(), completing_factory(), settings());
    let req = request(dir.path(), 10);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::Completed);
    assert_eq!(result.steps, 1);
    assert_eq!(provider.log.kills(), 1);
    assert_eq!(provider.log.shell.lock().expect("lock").as_slice(), ["true".to_string()]);
    assert_eq!(
        std::fs::read_to_string(req.run_dir.join("task.txt")).expect("task.txt"),
        "Go to Wikipedia"
    );
    assert!(req.run_dir.join("step_000.png").exists());

    let meta = read_metadata(&req);
    assert_eq!(meta.status, TrialStatus::Completed);
    assert_eq!(meta.answer.as_deref(), Some("Done"));
    assert_eq!(meta.summary.len(), 3);
    assert!(meta.summary.iter().all(|s| s.observation.image.is_none()));
    assert!(meta.error_message.is_none());
}

#[tokio::test]
async fn failed_trial_tears_down_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let trial = runner(
        provider.clone(),
        factory(|| vec![Script::Fail("model offline".into())], None),
        settings(),
    );
    let req = request(dir.path(), 10);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::Failed);
    assert!(result.error_message.as_deref().unwrap_or_default().contains("model offline"));
    assert_eq!(provider.log.kills(), 1);
    assert_eq!(read_metadata(&req).status, TrialStatus::Failed);
}

#[tokio::test]
async fn step_limit_trial_tears_down_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let trial = runner(provider.clone(), factory(Vec::new, Some(click(2, 2))), settings());
    let req = request(dir.path(), 2);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::StepLimitReached);
    assert_eq!(result.steps, 2);
    assert_eq!(provider.log.kills(), 1);
}

#[tokio::test]
async fn provisioning_failure_never_enters_the_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::failing());
    let trial = runner(provider.clone(), completing_factory(), settings());
    let req = request(dir.path(), 10);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::Failed);
    assert!(result.error_message.as_deref().unwrap_or_default().contains("quota exceeded"));
    assert_eq!(provider.provisions.load(Ordering::SeqCst), 1);
    assert_eq!(provider.log.kills(), 0);
    assert!(provider.log.commands().is_empty());
    assert!(read_metadata(&req).summary.is_empty());
}

#[tokio::test]
async fn sandbox_arriving_after_provision_timeout_is_killed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider {
        provision_delay: Duration::from_millis(200),
        ..MockProvider::new()
    });
    let mut s = settings();
    s.provision_timeout = Duration::from_millis(50);
    let trial = runner(provider.clone(), completing_factory(), s);
    let req = request(dir.path(), 10);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::Failed);
    assert!(result.error_message.as_deref().unwrap_or_default().contains("no sandbox after"));
    assert!(provider.log.shell.lock().expect("lock").is_empty());

    for _ in 0..50 {
        if provider.log.kills() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(provider.log.kills(), 1);
    assert!(provider.log.commands().is_empty());
}

#[tokio::test]
async fn trial_timeout_fails_and_tears_down() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let mut s = settings();
    s.sandbox.timeout = Duration::from_millis(300);
    let trial = runner(provider.clone(), factory(|| vec![Script::Hang], None), s);
    let req = request(dir.path(), 10);

    let result = trial.run(req.clone()).await.expect("trial");

    assert_eq!(result.status, TrialStatus::Failed);
    assert!(result.error_message.as_deref().unwrap_or_default().contains("Timed out"));
    assert_eq!(provider.log.kills(), 1);
    // The seeded task step survives the timeout.
    assert_eq!(read_metadata(&req).summary.len(), 1);
}

#[tokio::test]
async fn recorded_trial_can_be_replayed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let first = runner(
        provider.clone(),
        factory(|| vec![Script::Turn(click(3, 4)), Script::Turn(finish("Paris"))], None),
        settings(),
    );
    let req = request(dir.path(), 10);
    first.run(req.clone()).await.expect("first run");

    let replay = replay_factory(&req.run_dir.join("metadata.json")).expect("replay");
    let second = runner(provider.clone(), replay, settings());
    let mut req2 = request(dir.path(), 10);
    req2.run_dir = dir.path().join("replayed");
    let result = second.run(req2.clone()).await.expect("replayed run");

    assert_eq!(result.status, TrialStatus::Completed);
    assert_eq!(read_metadata(&req2).answer.as_deref(), Some("Paris"));
    assert_eq!(provider.log.kills(), 2);
}

#[tokio::test]
async fn all_completing_batch_scores_one() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::new());
    let trial = runner(provider.clone(), completing_factory(), settings());
    let plan = EvalPlan {
        tasks: vec![Task::new("a", "task a"), Task::new("b", "task b")],
        repetitions: 3,
        max_parallel_tasks: 2,
        max_parallel_repetitions: 3,
        max_steps: 5,
    };

    let outcome = Orchestrator::new(Arc::new(trial), dir.path())
        .run(&plan)
        .await
        .expect("batch");

    assert_eq!(outcome.results.len(), 6);
    assert!(outcome.results.iter().all(|r| r.status == TrialStatus::Completed));
    assert_eq!(outcome.summary.total_successes, 6);
    assert_eq!(outcome.summary.success_rate, 1.0);
    assert_eq!(outcome.summary.example_success_rates["a"], 1.0);
    assert_eq!(outcome.summary.example_success_rates["b"], 1.0);
    assert_eq!(provider.log.kills(), 6);

    let summary: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(outcome.output_dir.join("summary.json")).expect("summary.json"),
    )
    .expect("json");
    assert_eq!(summary["total_runs"], 6);
    assert_eq!(summary["success_rate"], 1.0);
    assert!(outcome.output_dir.join("example_a").join("run_2").join("metadata.json").exists());
}

#[tokio::test]
async fn failing_provisioner_batch_scores_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let provider = Arc::new(MockProvider::failing());
    let trial = runner(provider.clone(), completing_factory(), settings());
    let plan = EvalPlan {
        tasks: vec![Task::new("only", "task")],
        repetitions: 2,
        max_parallel_tasks: 1,
        max_parallel_repetitions: 2,
        max_steps: 5,
    };

    let outcome = Orchestrator::new(Arc::new(trial), dir.path())
        .run(&plan)
        .await
        .expect("batch");

    let statuses: Vec<_> = outcome.results.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![TrialStatus::Failed, TrialStatus::Failed]);
    assert_eq!(outcome.summary.success_rate, 0.0);
    assert_eq!(outcome.summary.example_success_rates["only"], 0.0);
    assert_eq!(provider.log.kills(), 0);
    assert!(outcome.output_dir.join("summary.json").exists());
}
