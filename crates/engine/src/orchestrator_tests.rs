// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle tests for the orchestrator and its run driver, against the
//! fake collaborators.

use super::*;
use crate::channel::StreamItem;
use std::time::Duration;
use sw_adapters::{
    FakeProvisioner, ProvisionCall, ScriptedReasoner, ScriptedStep, StepOutcome, StepUnit,
};
use sw_core::test_support::test_config;
use sw_core::{FakeClock, TurnRole};
use sw_storage::MemoryStore;

type TestOrchestrator = Orchestrator<FakeProvisioner, ScriptedReasoner, MemoryStore, FakeClock>;

struct Ctx {
    orchestrator: Arc<TestOrchestrator>,
    provisioner: FakeProvisioner,
    reasoner: ScriptedReasoner,
    store: MemoryStore,
}

fn setup(steps: Vec<ScriptedStep>) -> Ctx {
    setup_with(steps, EngineConfig::default(), MemoryStore::new())
}

fn setup_with(steps: Vec<ScriptedStep>, config: EngineConfig, store: MemoryStore) -> Ctx {
    let provisioner = FakeProvisioner::new();
    let reasoner = ScriptedReasoner::new(steps);
    let channels = Arc::new(ChannelRegistry::new(256, Duration::from_secs(60)));
    let orchestrator = Arc::new(Orchestrator::new(
        EngineDeps {
            provisioner: provisioner.clone(),
            reasoner: reasoner.clone(),
            store: store.clone(),
        },
        channels,
        FakeClock::new(),
        config,
    ));
    Ctx { orchestrator, provisioner, reasoner, store }
}

impl Ctx {
    fn create(&self) -> AgentId {
        self.orchestrator.create_agent(test_config()).unwrap().id
    }

    fn status(&self, id: &AgentId) -> AgentStatus {
        self.orchestrator.get_agent(id).unwrap().status
    }
}

async fn next_event(stream: &mut EventStream) -> RunEvent {
    match tokio::time::timeout(Duration::from_secs(5), stream.next()).await {
        Ok(Some(StreamItem::Event(event))) => event,
        other => panic!("expected an event, got {other:?}"),
    }
}

async fn collect_until_finish(stream: &mut EventStream) -> Vec<RunEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(stream).await;
        let finished = matches!(event, RunEvent::Finish { .. });
        events.push(event);
        if finished {
            return events;
        }
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

// ── Start / complete ──────────────────────────────────────────────────

#[tokio::test]
async fn run_completes_with_turn_assembled_from_deltas() {
    let ctx = setup(vec![ScriptedStep::new(
        vec![
            StepUnit::TextDelta("I'll ".to_string()),
            StepUnit::TextDelta("fix ".to_string()),
            StepUnit::TextDelta("it".to_string()),
            StepUnit::FileEdit { path: "src/lib.rs".into() },
        ],
        StepOutcome::Done,
    )]);
    let id = ctx.create();
    let (snapshot, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    assert_eq!(snapshot.status, AgentStatus::Idle);
    assert!(snapshot.turns.is_empty());

    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    let events = collect_until_finish(&mut stream).await;

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec![
            "run:status",
            "run:text-delta",
            "run:text-delta",
            "run:text-delta",
            "run:file-edit",
            "run:status",
            "run:finish",
        ]
    );
    assert!(matches!(events[0], RunEvent::Status { status: AgentStatus::Running, .. }));
    assert!(matches!(events[5], RunEvent::Status { status: AgentStatus::Completed, .. }));
    assert!(matches!(events[6], RunEvent::Finish { status: AgentStatus::Completed }));

    // Exactly one new assistant turn whose content is the delta concat
    let turns = ctx.orchestrator.read_turn_log(&id).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].role, TurnRole::Assistant);
    assert_eq!(turns[0].content, "I'll fix it");
    assert!(!turns[0].in_progress);

    // The stream alone reconstructs the turn: no silent content
    let streamed: String = events
        .iter()
        .filter_map(|e| match e {
            RunEvent::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, turns[0].content);

    let agent = ctx.orchestrator.get_agent(&id).unwrap();
    assert_eq!(agent.status, AgentStatus::Completed);
    assert_eq!(agent.files_edited.len(), 1);
    assert_eq!(agent.files_edited[0].path, std::path::PathBuf::from("src/lib.rs"));

    // Environment released and terminal state durable
    assert!(ctx.provisioner.live_environments().is_empty());
    assert_eq!(ctx.store.load(&id).unwrap().unwrap().status, AgentStatus::Completed);
}

#[tokio::test]
async fn tool_calls_open_and_close_in_the_aggregate() {
    let ctx = setup(vec![
        ScriptedStep::new(
            vec![StepUnit::ToolCall {
                call_id: "call-1".to_string(),
                name: "run_tests".to_string(),
                arguments: serde_json::json!({"filter": "parser"}),
            }],
            StepOutcome::Continue,
        ),
        ScriptedStep::new(
            vec![StepUnit::ToolResult {
                call_id: "call-1".to_string(),
                output: "2 passed".to_string(),
            }],
            StepOutcome::Done,
        ),
    ]);
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    let events = collect_until_finish(&mut stream).await;
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert!(names.contains(&"run:tool-call"));
    assert!(names.contains(&"run:tool-result"));
    // The call is resolved by the end of the run
    assert!(ctx.orchestrator.snapshot(&id).unwrap().open_tool_calls.is_empty());
}

// ── Mutual exclusion ──────────────────────────────────────────────────

#[tokio::test]
async fn second_start_while_running_is_rejected() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![])]);
    let id = ctx.create();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    let err = ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap_err();
    assert!(matches!(err, RuntimeError::AlreadyRunning(_)));
    assert_eq!(ctx.status(&id), AgentStatus::Running);

    // No second environment was ever requested
    wait_for(|| !ctx.provisioner.calls().is_empty()).await;
    let provisions = ctx
        .provisioner
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ProvisionCall::Provision { .. }))
        .count();
    assert_eq!(provisions, 1);

    ctx.orchestrator.stop(&id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_yield_exactly_one_acceptance() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![])]);
    let id = ctx.create();

    let mut joins = Vec::new();
    for _ in 0..8 {
        let orchestrator = Arc::clone(&ctx.orchestrator);
        let id = id.clone();
        joins.push(tokio::spawn(async move {
            orchestrator.start(&id, sw_adapters::RunCredentials::default()).is_ok()
        }));
    }
    let mut accepted = 0;
    for join in joins {
        if join.await.unwrap() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);

    ctx.orchestrator.stop(&id).await;
}

#[tokio::test]
async fn restart_is_permitted_from_a_terminal_state() {
    let ctx = setup(vec![
        ScriptedStep::new(vec![], StepOutcome::Done),
        ScriptedStep::new(vec![], StepOutcome::Done),
    ]);
    let id = ctx.create();

    for _ in 0..2 {
        let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
        ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
        collect_until_finish(&mut stream).await;
        assert_eq!(ctx.status(&id), AgentStatus::Completed);
    }
    assert_eq!(ctx.reasoner.contexts().len(), 2);
}

// ── Instructions ──────────────────────────────────────────────────────

#[tokio::test]
async fn queued_instructions_apply_in_fifo_order_across_steps() {
    let ctx = setup(vec![
        ScriptedStep::new(vec![], StepOutcome::Continue),
        ScriptedStep::new(vec![], StepOutcome::Done),
    ]);
    let id = ctx.create();

    // Enqueued while Idle: retained and visible to the next run
    ctx.orchestrator.instruct(&id, "do X").unwrap();
    ctx.orchestrator.instruct(&id, "do Y").unwrap();

    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    collect_until_finish(&mut stream).await;

    let contexts = ctx.reasoner.contexts();
    assert_eq!(contexts.len(), 2);
    assert_eq!(contexts[0].instruction.as_ref().map(|i| i.text.as_str()), Some("do X"));
    assert_eq!(contexts[1].instruction.as_ref().map(|i| i.text.as_str()), Some("do Y"));

    let instructions = ctx.orchestrator.read_instructions(&id).unwrap();
    assert!(instructions.iter().all(|i| i.status == InstructionStatus::Applied));
    assert_eq!(ctx.orchestrator.snapshot(&id).unwrap().queued_instructions, 0);
}

#[tokio::test]
async fn instruction_on_idle_agent_is_retained_not_lost() {
    let ctx = setup(vec![]);
    let id = ctx.create();
    ctx.orchestrator.instruct(&id, "later").unwrap();

    let instructions = ctx.orchestrator.read_instructions(&id).unwrap();
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].status, InstructionStatus::Queued);
    // Durable immediately, not only at run time
    assert_eq!(ctx.store.load(&id).unwrap().unwrap().instructions.len(), 1);
}

#[tokio::test]
async fn discarded_instruction_is_skipped_by_the_driver() {
    let ctx = setup(vec![ScriptedStep::new(vec![], StepOutcome::Done)]);
    let id = ctx.create();
    let first = ctx.orchestrator.instruct(&id, "wrong approach").unwrap();
    ctx.orchestrator.instruct(&id, "right approach").unwrap();

    assert!(ctx.orchestrator.discard_instruction(&id, &first.id).unwrap());

    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    collect_until_finish(&mut stream).await;

    let contexts = ctx.reasoner.contexts();
    assert_eq!(
        contexts[0].instruction.as_ref().map(|i| i.text.as_str()),
        Some("right approach")
    );
    let instructions = ctx.orchestrator.read_instructions(&id).unwrap();
    assert_eq!(instructions[0].status, InstructionStatus::Discarded);
    assert_eq!(instructions[1].status, InstructionStatus::Applied);
}

#[tokio::test]
async fn discard_of_applied_instruction_is_refused() {
    let ctx = setup(vec![ScriptedStep::new(vec![], StepOutcome::Done)]);
    let id = ctx.create();
    let instruction = ctx.orchestrator.instruct(&id, "do X").unwrap();

    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    collect_until_finish(&mut stream).await;

    assert!(!ctx.orchestrator.discard_instruction(&id, &instruction.id).unwrap());
}

// ── Stop ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_settles_stopped_and_releases_the_environment() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![StepUnit::TextDelta(
        "thinking".to_string(),
    )])]);
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    // Wait until the in-flight step has produced observable output
    loop {
        if matches!(next_event(&mut stream).await, RunEvent::TextDelta { .. }) {
            break;
        }
    }
    ctx.orchestrator.stop(&id).await;

    let events = collect_until_finish(&mut stream).await;
    assert!(matches!(
        events.last(),
        Some(RunEvent::Finish { status: AgentStatus::Stopped })
    ));
    assert_eq!(ctx.status(&id), AgentStatus::Stopped);
    assert!(ctx.provisioner.live_environments().is_empty());

    // The in-flight streaming turn was finished, not lost
    let turns = ctx.orchestrator.read_turn_log(&id).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "thinking");
    assert!(!turns[0].in_progress);
    assert_eq!(ctx.store.load(&id).unwrap().unwrap().status, AgentStatus::Stopped);
}

#[tokio::test]
async fn stop_on_idle_agent_is_a_noop() {
    let ctx = setup(vec![]);
    let id = ctx.create();
    ctx.orchestrator.instruct(&id, "pending").unwrap();

    ctx.orchestrator.stop(&id).await;

    assert_eq!(ctx.status(&id), AgentStatus::Idle);
    assert!(ctx.orchestrator.read_turn_log(&id).unwrap().is_empty());
    // The queued instruction is untouched
    assert_eq!(ctx.orchestrator.snapshot(&id).unwrap().queued_instructions, 1);
}

#[tokio::test]
async fn stop_on_terminal_agent_keeps_the_terminal_status() {
    let ctx = setup(vec![ScriptedStep::new(vec![], StepOutcome::Done)]);
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    collect_until_finish(&mut stream).await;

    ctx.orchestrator.stop(&id).await;
    assert_eq!(ctx.status(&id), AgentStatus::Completed);
}

#[tokio::test]
async fn stop_on_unknown_agent_does_not_error() {
    let ctx = setup(vec![]);
    ctx.orchestrator.stop(&AgentId::from_string("agt-nope")).await;
}

// ── Failures ──────────────────────────────────────────────────────────

#[tokio::test]
async fn provision_failure_ends_in_error_without_reaching_active() {
    let ctx = setup(vec![]);
    ctx.provisioner.fail_next_provision("no capacity");
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    let events = collect_until_finish(&mut stream).await;
    assert!(events.iter().any(
        |e| matches!(e, RunEvent::Error { message } if message.contains("no capacity"))
    ));
    assert!(matches!(
        events.last(),
        Some(RunEvent::Finish { status: AgentStatus::Error })
    ));

    let agent = ctx.orchestrator.get_agent(&id).unwrap();
    assert_eq!(agent.status, AgentStatus::Error);
    assert!(agent.error.as_deref().unwrap_or("").contains("no capacity"));

    // The reasoning loop never started and there was nothing to tear down
    assert!(ctx.reasoner.contexts().is_empty());
    assert!(!ctx
        .provisioner
        .calls()
        .iter()
        .any(|c| matches!(c, ProvisionCall::Teardown { .. })));
}

#[tokio::test]
async fn provision_timeout_ends_in_error() {
    let config = EngineConfig {
        provision_timeout: Duration::from_millis(50),
        ..EngineConfig::default()
    };
    let ctx = setup_with(vec![], config, MemoryStore::new());
    ctx.provisioner.set_provision_delay(Duration::from_secs(30));
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    collect_until_finish(&mut stream).await;
    let agent = ctx.orchestrator.get_agent(&id).unwrap();
    assert_eq!(agent.status, AgentStatus::Error);
    assert!(agent.error.as_deref().unwrap_or("").contains("timed out"));
}

#[tokio::test]
async fn step_failure_ends_in_error_and_still_tears_down() {
    let ctx = setup(vec![ScriptedStep::failing("model exploded")]);
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    let events = collect_until_finish(&mut stream).await;
    assert!(events.iter().any(
        |e| matches!(e, RunEvent::Error { message } if message.contains("model exploded"))
    ));
    assert_eq!(ctx.status(&id), AgentStatus::Error);
    assert!(ctx.provisioner.live_environments().is_empty());
}

#[tokio::test]
async fn step_timeout_ends_in_error() {
    let config =
        EngineConfig { step_timeout: Duration::from_millis(100), ..EngineConfig::default() };
    let ctx = setup_with(vec![ScriptedStep::hanging(vec![])], config, MemoryStore::new());
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    collect_until_finish(&mut stream).await;
    let agent = ctx.orchestrator.get_agent(&id).unwrap();
    assert_eq!(agent.status, AgentStatus::Error);
    assert!(agent.error.as_deref().unwrap_or("").contains("timed out"));
    assert!(ctx.provisioner.live_environments().is_empty());
}

#[tokio::test]
async fn partial_turns_are_retained_after_a_failed_step() {
    let ctx = setup(vec![
        ScriptedStep::new(vec![StepUnit::TextDelta("progress".to_string())], StepOutcome::Continue),
        ScriptedStep::failing("then it broke"),
    ]);
    let id = ctx.create();
    let (_, mut stream) = ctx.orchestrator.subscribe(&id).unwrap();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    collect_until_finish(&mut stream).await;

    assert_eq!(ctx.status(&id), AgentStatus::Error);
    let turns = ctx.orchestrator.read_turn_log(&id).unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "progress");
}

// ── Deletion / recovery / config ──────────────────────────────────────

#[tokio::test]
async fn delete_agent_stops_the_run_and_removes_all_state() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![])]);
    let id = ctx.create();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    wait_for(|| ctx.reasoner.contexts().len() == 1).await;

    ctx.orchestrator.delete_agent(&id).await.unwrap();

    assert!(ctx.orchestrator.get_agent(&id).is_none());
    assert!(ctx.store.load(&id).unwrap().is_none());
    assert!(ctx.provisioner.live_environments().is_empty());
    assert!(matches!(
        ctx.orchestrator.instruct(&id, "too late"),
        Err(RuntimeError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_proceeds_even_when_teardown_fails() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![])]);
    ctx.provisioner.fail_teardown("backend unreachable");
    let id = ctx.create();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();
    wait_for(|| ctx.reasoner.contexts().len() == 1).await;

    ctx.orchestrator.delete_agent(&id).await.unwrap();
    assert!(ctx.store.load(&id).unwrap().is_none());
}

#[tokio::test]
async fn recover_settles_orphaned_running_records() {
    let store = MemoryStore::new();
    let mut orphan = Agent::builder().id("agt-orphan").status(AgentStatus::Running).build();
    orphan.turns.push(Turn::assistant("partial work", 5));
    store.save(&orphan).unwrap();
    store.save(&Agent::builder().id("agt-fine").build()).unwrap();

    let ctx = setup_with(vec![], EngineConfig::default(), store);
    assert_eq!(ctx.orchestrator.recover().unwrap(), 1);

    let recovered = ctx.orchestrator.get_agent(&AgentId::from_string("agt-orphan")).unwrap();
    assert_eq!(recovered.status, AgentStatus::Error);
    assert!(recovered.error.as_deref().unwrap_or("").contains("driver lost"));
    // The turn log is the source of truth and survives recovery untouched
    assert_eq!(recovered.turns.len(), 1);

    let fine = ctx.orchestrator.get_agent(&AgentId::from_string("agt-fine")).unwrap();
    assert_eq!(fine.status, AgentStatus::Idle);
}

#[tokio::test]
async fn update_config_rejected_while_running_then_allowed() {
    let ctx = setup(vec![ScriptedStep::hanging(vec![])]);
    let id = ctx.create();
    ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()).unwrap();

    let mut config = test_config();
    config.task = "new task".to_string();
    assert!(matches!(
        ctx.orchestrator.update_config(&id, config.clone()),
        Err(RuntimeError::AlreadyRunning(_))
    ));

    ctx.orchestrator.stop(&id).await;
    let updated = ctx.orchestrator.update_config(&id, config).unwrap();
    assert_eq!(updated.config.task, "new task");
}

#[tokio::test]
async fn operations_on_unknown_agents_return_not_found() {
    let ctx = setup(vec![]);
    let id = AgentId::from_string("agt-ghost");
    assert!(matches!(ctx.orchestrator.subscribe(&id), Err(RuntimeError::NotFound(_))));
    assert!(matches!(ctx.orchestrator.instruct(&id, "x"), Err(RuntimeError::NotFound(_))));
    assert!(matches!(ctx.orchestrator.read_turn_log(&id), Err(RuntimeError::NotFound(_))));
    assert!(matches!(
        ctx.orchestrator.start(&id, sw_adapters::RunCredentials::default()),
        Err(RuntimeError::NotFound(_))
    ));
    assert!(matches!(
        ctx.orchestrator.delete_agent(&id).await,
        Err(RuntimeError::NotFound(_))
    ));
}
