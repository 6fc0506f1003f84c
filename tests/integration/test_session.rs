//! End-to-end integration tests for tutoring sessions.
//!
//! These tests drive the public engine API from a lesson plan on disk through
//! path selection, teaching turns and completion, with a scripted generation
//! client standing in for the model provider.

use std::path::PathBuf;
use std::sync::Arc;

use guide_engine::{
    find_lesson_plans, Config, GenerationClient, GenerationErrorKind, GuideError, LessonPlan,
    MessageRole, OrchestrationEngine, Provider, ScriptedClient, SessionState, SessionStatus,
    TranscriptGenerator, TurnOutcome,
};
use serde_json::json;

const PATH_TEMP: f32 = 0.7;
const EVAL_TEMP: f32 = 0.1;
const TUTOR_TEMP: f32 = 0.5;

/// Path to the fixtures directory.
fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn sample_plan() -> LessonPlan {
    LessonPlan::load(fixture_dir().join("LessonPlan_sample.json"))
        .expect("Failed to load lesson plan fixture")
}

fn engine_for(client: &Arc<ScriptedClient>) -> OrchestrationEngine {
    let shared: Arc<dyn GenerationClient> = client.clone();
    OrchestrationEngine::new(shared, &Config::default())
}

/// Path generator output the way models often send it: prose around a fenced block.
fn fenced_paths_reply() -> String {
    let paths = json!({"paths": [
        {
            "id": "1",
            "name": "Follow one lookup",
            "description": "Trace a single query end to end",
            "teaching_sequence": [
                {"id": 1, "concept": "Names and records", "goal": "Read an A record"},
                {"id": 2, "concept": "Recursive resolvers", "goal": "Explain who does the walking"},
                {"id": 3, "concept": "Caching and TTLs", "goal": "Predict when a cache answers"}
            ]
        },
        {
            "id": "2",
            "name": "Phone book analogy",
            "description": "Build intuition before details",
            "sequence": [
                {"id": "a", "concept": "Directories", "goal": "Map names to numbers"},
                {"id": "b", "concept": "Delegation", "goal": "Explain referrals"},
                {"id": "c", "concept": "Local copies", "goal": "Relate caching to memory"}
            ]
        },
        {"id": "3", "name": "Broken path without nodes"}
    ]});
    format!("Here are the paths you asked for:\n```json\n{paths:#}\n```\nLet me know!")
}

fn turn_reply(n: usize) -> String {
    json!({"teaching": format!("Lesson part {n}."), "prompt_or_task": format!("Question {n}?")})
        .to_string()
}

fn approve() -> String {
    json!({"approved": true, "feedback": ""}).to_string()
}

fn evaluation(should_advance: bool, guidance: &str) -> String {
    json!({
        "user_intent": "attempt_answer",
        "assessment": if should_advance { "correct" } else { "partial" },
        "reasoning": "Checked against the node goal",
        "guidance_for_generator": guidance,
        "should_advance": should_advance,
    })
    .to_string()
}

/// Loads lesson 1 of the fixture plan and selects path "1".
async fn teaching_session(engine: &OrchestrationEngine, client: &ScriptedClient) -> SessionState {
    let lesson = sample_plan().lesson(1).expect("Lesson 1 should exist");
    client.push_response(fenced_paths_reply());

    let mut state = engine.new_session(lesson);
    engine
        .initialize_session(&mut state)
        .await
        .expect("Path generation should succeed");
    engine
        .select_path(&mut state, "1")
        .expect("Path 1 should be selectable");
    state
}

/// Tests that the sample lesson plan loads and exposes its lessons.
#[test]
fn test_sample_lesson_plan_loads() {
    let plan = sample_plan();

    assert_eq!(plan.module_title, "Networking Fundamentals");
    let summaries = plan.summaries();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].title, "TCP Handshakes");

    let lesson = plan.lesson(1).expect("Lesson 1 should exist");
    assert_eq!(lesson.title, "How DNS Resolution Works");
    assert_eq!(lesson.objectives.len(), 2);
    assert_eq!(lesson.topics, vec!["dns", "resolvers", "caching"]);

    let err = plan.lesson(9).expect_err("Lesson 9 should not exist");
    assert!(matches!(err, GuideError::LessonNotFound { .. }));
}

/// Tests that lesson plan discovery ignores other JSON files.
#[test]
fn test_find_lesson_plans_in_fixtures() {
    let plans = find_lesson_plans(&fixture_dir());
    assert_eq!(plans, vec![fixture_dir().join("LessonPlan_sample.json")]);
}

/// Tests that the sample config overrides only the fields it names.
#[test]
fn test_sample_config_loads() {
    let config = Config::load_from_file(&fixture_dir().join("guide.json"))
        .expect("Failed to load config fixture");

    assert_eq!(config.provider, Provider::Ollama);
    assert_eq!(config.model, "llama3.1:8b");
    assert_eq!(config.max_reviewer_retries, 2);
    assert!((config.temperatures.tutor - 0.6).abs() < f32::EPSILON);
    assert!((config.temperatures.evaluator - EVAL_TEMP).abs() < f32::EPSILON);
    assert_eq!(config.history.tutor_window, 4);
    assert_eq!(config.history.max_stored, 8);
    assert_eq!(config.resolved_base_url(), "http://127.0.0.1:11434/v1");
    assert_eq!(config.resolved_api_key_env(), None);
}

/// Tests that malformed paths are dropped and both valid paths are offered.
#[tokio::test]
async fn test_path_generation_from_fenced_reply() {
    let client = Arc::new(ScriptedClient::new().with_response(fenced_paths_reply()));
    let engine = engine_for(&client);
    let lesson = sample_plan().lesson(1).expect("Lesson 1 should exist");

    let mut state = engine.new_session(lesson);
    let options = engine
        .initialize_session(&mut state)
        .await
        .expect("Path generation should succeed");

    let names: Vec<_> = options.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Follow one lookup", "Phone book analogy"]);
    assert!(options.iter().all(|o| o.node_count == 3));
    assert_eq!(state.status(), SessionStatus::AwaitingPathSelection);

    let calls = client.calls_at(PATH_TEMP);
    assert_eq!(calls.len(), 1);
    assert!(calls[0].user_prompt.contains("How DNS Resolution Works"));
    assert!(calls[0]
        .user_prompt
        .contains("Trace a lookup from root to authoritative server"));

    let err = engine
        .select_path(&mut state, "3")
        .expect_err("The broken path should not be offered");
    assert!(matches!(err, GuideError::InvalidPathId { .. }));
    assert!(err.is_recoverable());
}

/// Tests a full session from the first turn to completion, with one remediation.
#[tokio::test]
async fn test_full_session_to_completion() {
    let client = Arc::new(ScriptedClient::new());
    let engine = engine_for(&client);
    let mut state = teaching_session(&engine, &client).await;

    client.push_response(turn_reply(1));
    client.push_response(approve());
    let first = engine
        .start_teaching(&mut state)
        .await
        .expect("First turn should be generated");
    assert_eq!(first, "Lesson part 1.\n\nQuestion 1?");

    // Partial answer: stay on the node.
    client.push_response(evaluation(false, "Use a concrete domain name"));
    client.push_response(turn_reply(2));
    client.push_response(approve());
    let outcome = engine
        .process_user_response(&mut state, "it finds addresses somehow")
        .await
        .expect("Remediation turn should be generated");
    assert!(matches!(outcome, TurnOutcome::Turn(_)));
    assert_eq!(state.current_index(), 0);

    let remediation_prompt = &client.calls_at(TUTOR_TEMP)[1].user_prompt;
    assert!(remediation_prompt.contains("EVALUATOR GUIDANCE:\nUse a concrete domain name"));

    for (n, answer) in [(3, "an A record"), (4, "the recursive resolver")] {
        client.push_response(evaluation(true, "Move on"));
        client.push_response(turn_reply(n));
        client.push_response(approve());
        let outcome = engine
            .process_user_response(&mut state, answer)
            .await
            .expect("Next turn should be generated");
        assert_eq!(
            outcome,
            TurnOutcome::Turn(format!("Lesson part {n}.\n\nQuestion {n}?"))
        );
    }
    assert_eq!(state.progress(), Some((3, 3)));

    client.push_response(evaluation(true, ""));
    let outcome = engine
        .process_user_response(&mut state, "until the TTL expires")
        .await
        .expect("Final answer should complete the session");

    assert_eq!(outcome, TurnOutcome::Completed);
    assert!(state.is_complete());
    assert_eq!(client.remaining(), 0);
    assert_eq!(client.calls_at(EVAL_TEMP).len(), 4);
    assert_eq!(
        state.history().back().map(|m| m.role),
        Some(MessageRole::User)
    );
}

/// Tests that a provider outage mid-session can be retried with the same reply.
#[tokio::test]
async fn test_provider_outage_is_retryable() {
    let client = Arc::new(ScriptedClient::new());
    let engine = engine_for(&client);
    let mut state = teaching_session(&engine, &client).await;

    client.push_response(turn_reply(1));
    client.push_response(approve());
    engine
        .start_teaching(&mut state)
        .await
        .expect("First turn should be generated");
    let history_len = state.history().len();

    client.push_error(GuideError::generation(
        GenerationErrorKind::Server,
        "upstream returned 503",
    ));
    let err = engine
        .process_user_response(&mut state, "an A record")
        .await
        .expect_err("The outage should surface");
    assert!(err.is_recoverable());
    assert_eq!(state.history().len(), history_len);

    client.push_response(evaluation(true, "Move on"));
    client.push_response(turn_reply(2));
    client.push_response(approve());
    let outcome = engine
        .process_user_response(&mut state, "an A record")
        .await
        .expect("The retried reply should succeed");

    assert!(matches!(outcome, TurnOutcome::Turn(_)));
    assert_eq!(state.current_index(), 1);
    assert_eq!(state.history().len(), history_len + 2);
}

/// Tests that labelled prose from the tutor still yields a turn.
#[tokio::test]
async fn test_labelled_tutor_reply_is_reconstructed() {
    let client = Arc::new(ScriptedClient::new());
    let engine = engine_for(&client);
    let mut state = teaching_session(&engine, &client).await;

    client.push_response(
        "Teaching: A name like example.com maps to an address.\nQuestion: What record holds it?",
    );
    client.push_response(approve());
    let text = engine
        .start_teaching(&mut state)
        .await
        .expect("Labelled reply should be accepted");

    assert_eq!(
        text,
        "A name like example.com maps to an address.\n\nWhat record holds it?"
    );
}

/// Tests the transcript of a short session.
#[tokio::test]
async fn test_transcript_of_session() {
    let client = Arc::new(ScriptedClient::new());
    let engine = engine_for(&client);
    let mut state = teaching_session(&engine, &client).await;

    client.push_response(turn_reply(1));
    client.push_response(approve());
    engine
        .start_teaching(&mut state)
        .await
        .expect("First turn should be generated");

    client.push_response(evaluation(true, "Move on"));
    client.push_response(turn_reply(2));
    client.push_response(approve());
    engine
        .process_user_response(&mut state, "an A record")
        .await
        .expect("Next turn should be generated");

    let markdown = TranscriptGenerator::new(&state).generate();
    let path_section = markdown
        .split("## Path: ")
        .nth(1)
        .and_then(|rest| rest.split("## Conversation").next())
        .expect("Transcript should have a path section");

    insta::assert_snapshot!(path_section.trim_end(), @r"
    Follow one lookup

    Trace a single query end to end

    - [x] **Names and records**: Read an A record
    - [ ] **Recursive resolvers**: Explain who does the walking
    - [ ] **Caching and TTLs**: Predict when a cache answers
    ");
    assert!(markdown.contains("| Status | teaching |"));
    assert!(markdown.contains("> an A record"));
}
