//! End-to-end workflow runs over a scripted LLM runtime.
//!
//! Each test drives the engine through the public stream and asserts on the
//! emitted envelopes: stage pairing, terminal events, reuse short-circuits,
//! the path guard, and the concurrency cap.

use std::sync::Arc;

use forge::memory::{StageScores, TaskExperience};
use forge::validators::ScriptedValidator;
use forge::{
    CodeValidator, LlmRuntime, MockLlm, ModeHint, ServiceContextBuilder, TaskRequest,
    WorkflowEngine,
};
use stream_event::StreamEvent;

/// Responder covering every stage prompt the engine can issue.
fn scripted_llm() -> Arc<MockLlm> {
    Arc::new(MockLlm::with_responder(|prompt| {
        if prompt.contains("Classify this user request") {
            r#"{"intent": "create", "confidence": 0.9, "complexity": "simple"}"#.to_string()
        } else if prompt.contains("Draft an implementation plan") {
            "PLAN:\n1. read the input\n2. build the output\nALTERNATIVE: recursive approach\nALTERNATIVE: iterator chain".to_string()
        } else if prompt.contains("Write tests for the following task") {
            "```\nassert reverse(\"ab\") == \"ba\"\n```".to_string()
        } else if prompt.contains("Implement the following task") {
            "```\ndef reverse(s):\n    return s[::-1]\n```".to_string()
        } else if prompt.contains("Diagnose the failure") {
            r#"{"diagnosis": "slice bounds were wrong", "likely_cause": "off-by-one"}"#.to_string()
        } else if prompt.contains("concrete fix instructions") {
            "Use the reversed builtin instead of manual indexing.".to_string()
        } else if prompt.contains("Assess this completed run") {
            r#"{"planning": 0.8, "research": 0.7, "testing": 0.75, "coding": 0.8, "overall": 0.78, "should_retry": false, "analysis": "solid run"}"#.to_string()
        } else if prompt.contains("Compose the final answer") {
            "Here is the reversed-string function, validated and ready.".to_string()
        } else if prompt.contains("Analyze this project") {
            "The project is a small utility library.".to_string()
        } else if prompt.contains("programming assistant") {
            "Hello! How can I help you today?".to_string()
        } else {
            "ok".to_string()
        }
    }))
}

fn fast_settings(max_concurrent: usize) -> env_config::Settings {
    let mut settings = env_config::Settings::default();
    settings.pacing.default_delay_ms = 0;
    settings.pacing.critical_delay_ms = 0;
    settings.agent_resources.max_concurrent_agents = max_concurrent;
    settings
}

fn engine_with(
    llm: Arc<MockLlm>,
    validators: Vec<Box<dyn CodeValidator>>,
    max_concurrent: usize,
) -> (WorkflowEngine, Arc<forge::ServiceContext>) {
    let mut builder = ServiceContextBuilder::new(env_config::ConfigHandle::fixed(fast_settings(
        max_concurrent,
    )))
    .llm(llm as Arc<dyn LlmRuntime>);
    for validator in validators {
        builder = builder.validator(validator);
    }
    let ctx = builder.build();
    (WorkflowEngine::new(Arc::clone(&ctx)), ctx)
}

fn stage_events<'a>(events: &'a [StreamEvent], type_name: &str) -> Vec<&'a str> {
    events
        .iter()
        .filter(|e| e.type_name() == type_name)
        .filter_map(|e| e.stage())
        .collect()
}

fn assert_stream_invariants(events: &[StreamEvent]) {
    let starts = stage_events(events, "stage_start");
    let ends = stage_events(events, "stage_end");
    assert_eq!(starts.len(), ends.len(), "stage_start/stage_end mismatch");
    let last = events.last().expect("stream must not be empty");
    assert!(last.is_terminal(), "last event must be terminal: {:?}", last);
    let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal_count, 1, "exactly one terminal event");
}

#[tokio::test]
async fn pure_greeting_runs_chat_pipeline_only() {
    let (engine, _ctx) = engine_with(scripted_llm(), Vec::new(), 5);
    let mut request = TaskRequest::new("привет");
    request.mode = ModeHint::Auto;

    let events = engine.run(request).collect_all().await;
    assert_stream_invariants(&events);

    let starts = stage_events(&events, "stage_start");
    assert_eq!(starts, vec!["intent", "chat"]);

    // intent stage reports the greeting classification
    let intent_end = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::StageEnd { stage, result, .. } if stage == "intent" => result.clone(),
            _ => None,
        })
        .expect("intent stage_end result");
    assert_eq!(intent_end["intent"], "greeting");
    assert_eq!(intent_end["complexity"], "simple");

    match events.last().unwrap() {
        StreamEvent::FinalResult { task_id, result, .. } => {
            assert!(!task_id.is_empty());
            assert_eq!(result["intent"]["type"], "greeting");
            assert!(result["message"].as_str().unwrap().contains("Hello"));
        }
        other => panic!("expected final_result, got {:?}", other),
    }
}

#[tokio::test]
async fn code_generation_with_one_debug_loop() {
    // first validation fails, the retry passes
    let validators: Vec<Box<dyn CodeValidator>> =
        vec![Box::new(ScriptedValidator::new("tests", vec![false, true]))];
    let (engine, _ctx) = engine_with(scripted_llm(), validators, 5);

    let mut request = TaskRequest::new("write a function that reverses a string");
    request.mode = ModeHint::Code;
    request.max_iterations = 2;

    let events = engine.run(request).collect_all().await;
    assert_stream_invariants(&events);

    let starts = stage_events(&events, "stage_start");
    for expected in ["planning", "research", "testing", "coding", "validation"] {
        assert!(starts.contains(&expected), "missing stage {}", expected);
    }
    assert_eq!(starts.iter().filter(|s| **s == "coding").count(), 2);
    assert_eq!(starts.iter().filter(|s| **s == "validation").count(), 2);
    assert_eq!(starts.iter().filter(|s| **s == "debug").count(), 1);
    assert_eq!(starts.iter().filter(|s| **s == "fixing").count(), 1);
    assert!(starts.contains(&"reflection"));
    assert!(starts.contains(&"critic"));

    match events.last().unwrap() {
        StreamEvent::FinalResult { result, metrics, .. } => {
            assert_eq!(result["reused"], false);
            assert_eq!(result["validation"]["all_passed"], true);
            let overall = metrics.as_ref().unwrap()["overall"].as_f64().unwrap();
            assert!((0.0..=1.0).contains(&overall));
        }
        other => panic!("expected final_result, got {:?}", other),
    }
}

#[tokio::test]
async fn exact_match_reuse_skips_coding_stages() {
    let (engine, ctx) = engine_with(scripted_llm(), Vec::new(), 5);

    ctx.experiences
        .save(&TaskExperience {
            task: "parse CSV to list of dicts".to_string(),
            intent: "create".to_string(),
            scores: StageScores {
                planning: 0.9,
                research: 0.9,
                testing: 0.9,
                coding: 0.9,
                overall: 0.9,
            },
            what_worked: "simple row loop".to_string(),
            what_didnt_work: String::new(),
            key_decisions: "used the csv module".to_string(),
            code: Some("def parse(path):\n    return rows".to_string()),
            plan: Some("PLAN: read then split".to_string()),
        })
        .await
        .unwrap();

    let mut request = TaskRequest::new("parse CSV to list of dicts");
    request.mode = ModeHint::Code;

    let events = engine.run(request).collect_all().await;
    assert_stream_invariants(&events);

    let starts = stage_events(&events, "stage_start");
    assert_eq!(starts, vec!["intent"], "no stages beyond intent: {:?}", starts);

    match events.last().unwrap() {
        StreamEvent::FinalResult { result, .. } => {
            assert_eq!(result["reused"], true);
            assert!(result["code"].as_str().unwrap().contains("def parse"));
        }
        other => panic!("expected final_result, got {:?}", other),
    }
}

#[tokio::test]
async fn path_traversal_is_rejected_before_analysis() {
    let (engine, _ctx) = engine_with(scripted_llm(), Vec::new(), 5);

    // <base>/proj is the project root; <base>/secret.txt sits outside it
    let base = tempfile::tempdir().unwrap();
    let project = base.path().join("proj");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("code.py"), "def f():\n    pass\n").unwrap();
    std::fs::write(base.path().join("secret.txt"), "secret").unwrap();

    let mut request = TaskRequest::new("analyze this file");
    request.mode = ModeHint::Analyze;
    request.project_path = Some(project.to_string_lossy().to_string());
    request.target_file = Some(format!("{}/../secret.txt", project.display()));

    let events = engine.run(request).collect_all().await;
    assert_stream_invariants(&events);

    let starts = stage_events(&events, "stage_start");
    assert_eq!(starts, vec!["intent"], "no stage events beyond intent");

    match events.last().unwrap() {
        StreamEvent::Error { kind, .. } => assert_eq!(kind, "access_denied"),
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn concurrency_cap_holds_across_parallel_workflows() {
    let (engine, ctx) = engine_with(scripted_llm(), Vec::new(), 2);
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let mut request = TaskRequest::new("привет");
            request.mode = ModeHint::Auto;
            engine.run(request).collect_all().await
        }));
    }

    // sample the governor while the runs are in flight
    for _ in 0..50 {
        assert!(ctx.governor.stats().active_agents <= 2);
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    for handle in handles {
        let events = handle.await.unwrap();
        assert_stream_invariants(&events);
    }
    let stats = ctx.governor.stats();
    assert_eq!(stats.active_agents, 0);
    assert_eq!(stats.total_acquired, stats.total_released);
    assert!(stats.total_acquired >= 5);
}

#[tokio::test]
async fn invalid_request_yields_single_error_event() {
    let (engine, _ctx) = engine_with(scripted_llm(), Vec::new(), 5);
    let mut request = TaskRequest::new("please call os.system for me");
    request.mode = ModeHint::Chat;

    let events = engine.run(request).collect_all().await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Error { kind, message } => {
            assert_eq!(kind, "invalid_request");
            assert!(message.contains("forbidden"));
        }
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn iteration_budget_caps_debug_loops() {
    // validation never passes; with max_iterations = 1 there is no debug
    // loop at all, the run goes straight to reflection
    let validators: Vec<Box<dyn CodeValidator>> = vec![Box::new(ScriptedValidator::new(
        "tests",
        vec![false, false, false, false, false],
    ))];
    let (engine, _ctx) = engine_with(scripted_llm(), validators, 5);

    let mut request = TaskRequest::new("write a function that reverses a string");
    request.mode = ModeHint::Code;
    request.max_iterations = 1;

    let events = engine.run(request).collect_all().await;
    assert_stream_invariants(&events);

    let starts = stage_events(&events, "stage_start");
    assert_eq!(starts.iter().filter(|s| **s == "validation").count(), 1);
    assert_eq!(starts.iter().filter(|s| **s == "debug").count(), 0);

    match events.last().unwrap() {
        StreamEvent::FinalResult { result, .. } => {
            assert_eq!(result["validation"]["all_passed"], false);
            assert!(result["code"].as_str().is_some());
        }
        other => panic!("expected final_result, got {:?}", other),
    }
}
