//! End-to-end tests for the action resolution pipeline.
//!
//! These run the full pipeline against scripted collaborators: no network,
//! forced dice, seeded template randomness.

use narrator_core::engine::{EngineReply, SideEvent};
use narrator_core::knowledge::{KnowledgeCategory, KnowledgeHit};
use narrator_core::narrative::{Genre, Stage};
use narrator_core::testing::{BrokenStore, ScriptedEngine, ScriptedKnowledge, StalledStore};
use narrator_core::{
    Action, IntentCategory, JsonFileStore, KnowledgeCache, KnowledgeConfig, LoadedDice,
    MemoryStore, NarrativeStore, Outcome, Pipeline, PipelineConfig, PipelineError, RenderConfig,
    SessionId, StepKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn goblin_hit() -> KnowledgeHit {
    KnowledgeHit {
        category: KnowledgeCategory::Monster,
        name: "Goblin".to_string(),
        slug: "goblin".to_string(),
        summary: "Small, black-hearted humanoid.".to_string(),
        detail: Default::default(),
    }
}

fn pipeline_with(source: Arc<ScriptedKnowledge>, store: Arc<dyn NarrativeStore>) -> Pipeline {
    let cache = Arc::new(KnowledgeCache::new(source, KnowledgeConfig::new()));
    Pipeline::new(cache, store, PipelineConfig::new())
}

fn rng() -> StdRng {
    StdRng::seed_from_u64(2024)
}

// =============================================================================
// Scenario 1: attack with knowledge lookup
// =============================================================================

#[tokio::test]
async fn test_attack_goblin_with_axe() {
    let source = Arc::new(ScriptedKnowledge::with_hits(vec![goblin_hit()]));
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline_with(source.clone(), store.clone());

    let action = Action::new("chat-1", "p1", "ataco al goblin con mi hacha");
    let turn = pipeline
        .handle_with(action, &mut LoadedDice::new([15, 6]), &mut rng())
        .await
        .expect("turn should resolve");

    assert_eq!(turn.intent.category, IntentCategory::Attack);
    assert!(turn.intent.requires_srd);
    assert_eq!(turn.intent.entity("target"), Some("goblin"));
    assert_eq!(turn.intent.entity("weapon"), Some("hacha"));

    assert_eq!(
        source.queries(),
        vec![(KnowledgeCategory::Monster, "goblin".to_string())]
    );

    let resolution = &turn.resolution;
    assert_eq!(resolution.outcome, Outcome::Success);
    assert_eq!(resolution.steps[0].kind, StepKind::Attack);
    assert_eq!(resolution.steps[1].kind, StepKind::Damage);
    assert_eq!(resolution.dice_log.len(), 2);
    assert_eq!(resolution.dice_log[0].expression, "1d20");
    assert_eq!(resolution.dice_log[0].total, 15);
    assert_eq!(resolution.dice_log[1].expression, "1d8");
    assert!(resolution.verify());
    assert!(resolution.steps[0].description.contains("Goblin"));

    assert!(turn.message.text.contains("goblin"));
    assert!(!turn.message.truncated);
    assert!(turn.persisted);
    assert_eq!(store.len(), 1);
}

// =============================================================================
// Scenario 2: failed investigation, no lookup
// =============================================================================

#[tokio::test]
async fn test_investigate_door_fails_on_low_roll() {
    let source = Arc::new(ScriptedKnowledge::with_hits(vec![goblin_hit()]));
    let pipeline = pipeline_with(source.clone(), Arc::new(MemoryStore::new()));

    let action = Action::new("chat-1", "p1", "investigo la puerta");
    let turn = pipeline
        .handle_with(action, &mut LoadedDice::new([8]), &mut rng())
        .await
        .expect("turn should resolve");

    assert_eq!(turn.intent.category, IntentCategory::Investigate);
    assert!(!turn.intent.requires_srd);
    assert_eq!(turn.resolution.outcome, Outcome::Failure);
    assert_eq!(turn.resolution.dice_log.len(), 1);
    assert_eq!(turn.resolution.dice_log[0].total, 8);
    assert_eq!(source.calls(), 0);
    assert!(turn.message.text.contains("puerta"));
}

// =============================================================================
// Scenario 3: spell lookup transport error
// =============================================================================

#[tokio::test]
async fn test_spell_resolves_when_lookup_fails() {
    let source = Arc::new(ScriptedKnowledge::failing());
    let pipeline = pipeline_with(source.clone(), Arc::new(MemoryStore::new()));

    let action = Action::new("chat-1", "p1", "Lanzo sueño sobre los goblins");
    let turn = pipeline
        .handle_with(action, &mut LoadedDice::new([3, 4, 5, 6, 7]), &mut rng())
        .await
        .expect("a failed lookup must not fail the turn");

    assert_eq!(turn.intent.category, IntentCategory::CastSpell);
    assert_eq!(turn.intent.entity("spell"), Some("sleep"));
    assert_eq!(source.calls(), 1);
    assert_eq!(turn.resolution.outcome, Outcome::Mixed);
    assert_eq!(turn.resolution.dice_log[0].expression, "5d8");
    assert_eq!(turn.resolution.dice_log[0].total, 25);
    assert!(turn.resolution.steps[0].notes.is_none());
    assert!(!turn.message.text.is_empty());
}

#[tokio::test]
async fn test_knowledge_cache_is_shared_across_sessions() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let pipeline = pipeline_with(source.clone(), Arc::new(MemoryStore::new()));

    for session in ["a", "b", "c"] {
        pipeline
            .handle(Action::new(session, "p1", "lanzo sueño"))
            .await
            .expect("turn should resolve");
    }
    assert_eq!(source.calls(), 1);
}

// =============================================================================
// Identification
// =============================================================================

#[tokio::test]
async fn test_unidentified_actor_is_reported() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let pipeline = pipeline_with(source, Arc::new(MemoryStore::new()));

    let err = pipeline
        .handle(Action::new("  ", "p1", "miro alrededor"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnidentifiedActor("session")));

    let err = pipeline
        .handle(Action::new("chat-1", "", "miro alrededor"))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::UnidentifiedActor("player")));

    assert!(pipeline
        .narrative_snapshot(&SessionId::new(""))
        .await
        .is_err());
    assert_eq!(pipeline.active_sessions(), 0);
}

// =============================================================================
// Narrative tracking and persistence
// =============================================================================

#[tokio::test]
async fn test_stage_change_emits_event() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let pipeline = pipeline_with(source, Arc::new(MemoryStore::new()));

    let mut events = Vec::new();
    for faces in [[15, 2], [3, 1], [12, 8]] {
        let turn = pipeline
            .handle_with(
                Action::new("chat-1", "p1", "ataco al orco"),
                &mut LoadedDice::new(faces),
                &mut rng(),
            )
            .await
            .expect("turn should resolve");
        events.push(turn.event);
    }

    assert!(events[0].is_none());
    assert!(events[1].is_none());
    let event = events[2].as_ref().expect("third significant action changes stage");
    assert_eq!(event.event_type, "stage_change");

    let snapshot = pipeline
        .narrative_snapshot(&SessionId::new("chat-1"))
        .await
        .expect("snapshot");
    assert_eq!(snapshot.stage, Stage::Ascenso);
    assert_eq!(snapshot.counter, 3);
    assert_eq!(snapshot.events, 3);
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let session = SessionId::new("campaign:7");
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));

    {
        let pipeline = pipeline_with(source.clone(), Arc::new(JsonFileStore::new(dir.path())));
        pipeline
            .set_genre(&session, Genre::Horror)
            .await
            .expect("set genre");
        for _ in 0..4 {
            let turn = pipeline
                .handle_with(
                    Action::new(session.clone(), "p1", "trepo el muro para vengar a mi padre"),
                    &mut LoadedDice::new([18]),
                    &mut rng(),
                )
                .await
                .expect("turn should resolve");
            assert!(turn.persisted);
        }
    }

    let pipeline = pipeline_with(source, Arc::new(JsonFileStore::new(dir.path())));
    let snapshot = pipeline.narrative_snapshot(&session).await.expect("snapshot");
    assert_eq!(snapshot.counter, 4);
    assert_eq!(snapshot.stage, Stage::Ascenso);
    assert_eq!(snapshot.events, 4);
    assert_eq!(snapshot.mood.genre, Genre::Horror);
    assert_eq!(snapshot.recurrent_theme, narrator_core::Theme::Vengeance);

    assert!(pipeline.reset_session(&session).await.expect("reset"));
    let snapshot = pipeline.narrative_snapshot(&session).await.expect("snapshot");
    assert_eq!(snapshot.stage, Stage::Inicio);
    assert_eq!(snapshot.events, 4);
}

#[tokio::test]
async fn test_storage_failures_never_block_the_reply() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let pipeline = pipeline_with(source, Arc::new(BrokenStore));

    let turn = pipeline
        .handle_with(
            Action::new("chat-1", "p1", "abro el cofre"),
            &mut LoadedDice::new(Vec::new()),
            &mut rng(),
        )
        .await
        .expect("turn should resolve");
    assert!(!turn.persisted);
    assert!(!turn.message.text.is_empty());

    // the unreadable state was replaced by a fresh one and kept in memory
    let snapshot = pipeline
        .narrative_snapshot(&SessionId::new("chat-1"))
        .await
        .expect("snapshot");
    assert_eq!(snapshot.events, 1);
}

fn stalled_pipeline(store: Arc<StalledStore>, save_timeout: Duration) -> Pipeline {
    let source = Arc::new(ScriptedKnowledge::with_hits(vec![goblin_hit()]));
    let cache = Arc::new(KnowledgeCache::new(source, KnowledgeConfig::new()));
    let config = PipelineConfig::new().with_save_timeout(save_timeout);
    Pipeline::new(cache, store, config)
}

#[tokio::test(start_paused = true)]
async fn test_hung_save_times_out() {
    let store = Arc::new(StalledStore::new(Duration::from_secs(60)));
    let pipeline = stalled_pipeline(store.clone(), Duration::from_secs(1));

    let turn = pipeline
        .handle_with(
            Action::new("chat-1", "p1", "ataco al goblin"),
            &mut LoadedDice::new([15, 4]),
            &mut rng(),
        )
        .await
        .expect("turn should resolve");
    assert!(!turn.persisted);
    assert_eq!(store.saves_started(), 1);
    assert!(!turn.message.text.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pending_save_does_not_block_session_reads() {
    let store = Arc::new(StalledStore::new(Duration::from_secs(60)));
    let pipeline = Arc::new(stalled_pipeline(store.clone(), Duration::from_secs(120)));

    let background = Arc::clone(&pipeline);
    let turn = tokio::spawn(async move {
        background
            .handle(Action::new("chat-1", "p1", "ataco al goblin"))
            .await
    });

    while store.saves_started() == 0 {
        tokio::task::yield_now().await;
    }

    // the save is still sleeping; the state must be readable meanwhile
    let snapshot = tokio::time::timeout(
        Duration::from_millis(10),
        pipeline.narrative_snapshot(&SessionId::new("chat-1")),
    )
    .await
    .expect("snapshot should not wait for the save")
    .expect("snapshot");
    assert_eq!(snapshot.events, 1);

    let turn = turn
        .await
        .expect("task should not panic")
        .expect("turn should resolve");
    assert!(turn.persisted);
}

// =============================================================================
// Delegated engine
// =============================================================================

#[tokio::test]
async fn test_engine_narration_and_event() {
    let source = Arc::new(ScriptedKnowledge::with_hits(vec![goblin_hit()]));
    let engine = Arc::new(ScriptedEngine::replying(
        EngineReply::narrative("The goblin falls.")
            .with_event(SideEvent::new("combat_end", "Victory", "Silence returns.")),
    ));
    let pipeline =
        pipeline_with(source, Arc::new(MemoryStore::new())).with_engine(engine.clone());

    let turn = pipeline
        .handle_with(
            Action::new("chat-1", "p1", "ataco al goblin"),
            &mut LoadedDice::new([15, 6]),
            &mut rng(),
        )
        .await
        .expect("turn should resolve");
    assert!(turn.message.text.contains("The goblin falls\\."));
    assert_eq!(
        turn.event.map(|e| e.event_type),
        Some("combat_end".to_string())
    );

    // non-attacks never reach the engine
    pipeline
        .handle(Action::new("chat-1", "p1", "hablo con el goblin"))
        .await
        .expect("turn should resolve");
    assert_eq!(engine.calls(), 1);
}

#[tokio::test]
async fn test_engine_failure_falls_back_to_local_narration() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let pipeline = pipeline_with(source, Arc::new(MemoryStore::new()))
        .with_engine(Arc::new(ScriptedEngine::failing()));

    let turn = pipeline
        .handle_with(
            Action::new("chat-1", "p1", "ataco al goblin"),
            &mut LoadedDice::new([15, 6]),
            &mut rng(),
        )
        .await
        .expect("turn should resolve");
    assert!(turn.message.text.contains("le causa 6 de daño"));
    assert!(turn.event.is_none());
}

// =============================================================================
// Rendering bounds and concurrency
// =============================================================================

#[tokio::test]
async fn test_configured_length_bound() {
    let source = Arc::new(ScriptedKnowledge::with_hits(Vec::new()));
    let cache = Arc::new(KnowledgeCache::new(source, KnowledgeConfig::new()));
    let config = PipelineConfig::new().with_render(RenderConfig::new().with_max_len(40));
    let pipeline = Pipeline::new(cache, Arc::new(MemoryStore::new()), config);

    for _ in 0..20 {
        let turn = pipeline
            .handle(Action::new("chat-1", "p1", "ataco al goblin con mi hacha"))
            .await
            .expect("turn should resolve");
        assert!(turn.message.text.chars().count() <= 40);
        assert!(turn.message.truncated);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sessions_are_independent_under_concurrency() {
    let source = Arc::new(ScriptedKnowledge::with_hits(vec![goblin_hit()]));
    let store = Arc::new(MemoryStore::new());
    let pipeline = Arc::new(pipeline_with(source, store.clone()));

    let mut handles = Vec::new();
    for s in 0..8 {
        for _ in 0..10 {
            let pipeline = Arc::clone(&pipeline);
            handles.push(tokio::spawn(async move {
                pipeline
                    .handle(Action::new(format!("session-{s}"), "p1", "ataco al goblin"))
                    .await
            }));
        }
    }
    for handle in handles {
        let turn = handle.await.expect("task").expect("turn should resolve");
        assert!(turn.persisted);
    }

    assert_eq!(pipeline.active_sessions(), 8);
    assert_eq!(store.len(), 8);
    for s in 0..8 {
        let snapshot = pipeline
            .narrative_snapshot(&SessionId::new(format!("session-{s}")))
            .await
            .expect("snapshot");
        assert_eq!(snapshot.events, 10);
        // every attack is significant
        assert_eq!(snapshot.counter, 10);
        assert_eq!(snapshot.stage, Stage::Caida);
    }
}
