//! One function per workflow stage.
//!
//! Every LLM call goes through [`traced_generate`], which layers the retry
//! policy for upstream failures and an under-the-hood trace scope over the
//! gateway. Stage functions mutate the run state and return an optional
//! result object attached to the `stage_end` envelope.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::agents;
use crate::error::CoreError;
use crate::intent::Mode;
use crate::llm::{generate_with_fallback, SamplingOptions};
use crate::logfab::{LogEvent, LogSource};
use crate::memory::{Role, EXACT_MIN_SUCCESS, EXACT_SIMILARITY_THRESHOLD};
use crate::retry::{with_retry, RetryPolicy};
use crate::service::{ModelRole, ServiceContext};
use crate::stream::StreamEmitter;
use crate::trace::ToolCallKind;
use crate::workflow::{Stage, WorkflowState};

fn preview(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// One retried, traced generation through the gateway.
async fn traced_generate(
    ctx: &Arc<ServiceContext>,
    emitter: &StreamEmitter,
    stage: Stage,
    model: &str,
    prompt: &str,
    options: SamplingOptions,
) -> Result<String, CoreError> {
    let settings = ctx.config.current();
    let policy = RetryPolicy::from_settings(&settings.retry);
    let scope = ctx.trace.scope(
        settings.debug.under_the_hood_enabled,
        ToolCallKind::Llm,
        stage.agent_name(),
        Some(stage.as_str()),
        prompt,
        Some(emitter.clone()),
    );
    let result = with_retry(&policy, || ctx.llm.generate(model, prompt, &options)).await;
    if let Some(scope) = scope {
        match &result {
            Ok(text) => scope.finish(true, text),
            Err(e) => scope.finish(false, &e.to_string()),
        }
    }
    result
}

pub async fn run_stage(
    ctx: &Arc<ServiceContext>,
    stage: Stage,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    match stage {
        Stage::Intent => intent_stage(ctx, state).await,
        Stage::Chat => chat_stage(ctx, state, emitter).await,
        Stage::Analyze => analyze_stage(ctx, state, emitter).await,
        Stage::Planning => planning_stage(ctx, state, emitter).await,
        Stage::Research => research_stage(ctx, state, emitter).await,
        Stage::Testing => testing_stage(ctx, state, emitter).await,
        Stage::Coding => coding_stage(ctx, state, emitter).await,
        Stage::Validation => validation_stage(ctx, state, emitter).await,
        Stage::Debug => debug_stage(ctx, state).await,
        Stage::Fixing => fixing_stage(ctx, state, emitter).await,
        Stage::Reflection => reflection_stage(ctx, state).await,
        Stage::Critic => critic_stage(ctx, state, emitter).await,
        Stage::Final => Err(CoreError::InternalInvariant(
            "final is not a runnable stage".into(),
        )),
    }
}

async fn intent_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
) -> Result<Option<Value>, CoreError> {
    let settings = ctx.config.current();
    let decision = ctx
        .router
        .detect(
            state.task(),
            state.request.mode,
            &settings.router,
            &settings.structured_output,
            0.2,
        )
        .await?;
    state.mode = Some(decision.mode);
    state.complexity = decision.complexity;
    state.intent = decision.intent;

    // A near-identical successful task with stored code lets the run skip
    // the coding stages entirely.
    if decision.mode == Mode::Code {
        match ctx
            .experiences
            .find_exact(state.task(), EXACT_SIMILARITY_THRESHOLD, EXACT_MIN_SUCCESS)
            .await
        {
            Ok(Some(found)) if found.code.is_some() => {
                state.reused = true;
                state.code = found.code.clone();
                state.plan = found.plan.clone();
                state.final_message = Some(format!(
                    "Reusing the solution of an earlier task (similarity {:.2}).",
                    found.similarity
                ));
            }
            Ok(_) => {}
            Err(e) => ctx.logs.emit(
                LogEvent::warning(format!("experience lookup failed: {}", e))
                    .source(LogSource::Infrastructure)
                    .stage(Stage::Intent.as_str())
                    .task(&state.task_id),
            ),
        }
    }

    Ok(Some(json!({
        "mode": state.mode.map(|m| m.as_str()),
        "intent": state.intent.as_ref().map(|i| i.kind.as_str()),
        "complexity": state.complexity.as_str(),
        "reused": state.reused,
    })))
}

async fn chat_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let conversation_id = ctx
        .conversations
        .get_or_create(state.conversation_id.as_deref());
    state.conversation_id = Some(conversation_id.clone());

    let history = ctx.conversations.context(&conversation_id, 10);
    ctx.conversations
        .add_message(&conversation_id, Role::User, state.task(), None, true)
        .await?;

    let prompt = agents::chat::prompt(state.task(), &history);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 2048,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Chat);
    let reply = traced_generate(ctx, emitter, Stage::Chat, &model, &prompt, options).await?;

    ctx.conversations
        .add_message(&conversation_id, Role::Assistant, &reply, None, true)
        .await?;
    state.final_message = Some(reply.clone());
    Ok(Some(json!({"message": reply})))
}

async fn analyze_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let project_path = state
        .request
        .project_path
        .clone()
        .ok_or_else(|| CoreError::InvalidRequest("analyze mode needs project_path".into()))?;
    let extensions = state.request.extensions.clone().unwrap_or_default();

    let index = ctx.context_engine.index_project(&project_path, &extensions)?;
    let stats = agents::analyze::stats(&index);
    let files: Vec<String> = index.keys().take(50).cloned().collect();
    let context = ctx
        .context_engine
        .get_context(state.task(), &project_path, &extensions)?;

    let prompt = agents::analyze::prompt(state.task(), &stats, &files, &context);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 2048,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let overview = traced_generate(ctx, emitter, Stage::Analyze, &model, &prompt, options).await?;
    state.final_message = Some(overview);

    Ok(Some(serde_json::to_value(&stats)?))
}

async fn planning_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let intent_name = state
        .intent
        .as_ref()
        .map(|i| i.kind.as_str())
        .unwrap_or("create");
    let recommendations = match ctx.experiences.recommendations(state.task(), intent_name).await {
        Ok(block) => block,
        Err(e) => {
            ctx.logs.emit(
                LogEvent::warning(format!("memory recommendations unavailable: {}", e))
                    .source(LogSource::Agent)
                    .stage(Stage::Planning.as_str())
                    .task(&state.task_id),
            );
            String::new()
        }
    };

    let prompt = agents::planner::prompt(state.task(), &recommendations, &state.research_context);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 1024,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let answer = traced_generate(ctx, emitter, Stage::Planning, &model, &prompt, options).await?;
    let outcome = agents::planner::parse(&answer);
    state.plan = Some(outcome.plan);
    state.alternatives = outcome.alternatives;

    Ok(Some(json!({
        "alternatives": state.alternatives.len(),
        "used_memory": !recommendations.is_empty(),
    })))
}

async fn research_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let settings = ctx.config.current();

    let project_context = match state.request.project_path.as_deref() {
        Some(path) => {
            let extensions = state.request.extensions.clone().unwrap_or_default();
            match ctx.context_engine.get_context(state.task(), path, &extensions) {
                Ok(context) => context,
                Err(e) => {
                    ctx.logs.emit(
                        LogEvent::warning(format!("project context unavailable: {}", e))
                            .source(LogSource::Agent)
                            .stage(Stage::Research.as_str())
                            .task(&state.task_id),
                    );
                    String::new()
                }
            }
        }
        None => String::new(),
    };

    let similar = match ctx.experiences.find_similar(state.task(), None, 0.0, 4).await {
        Ok(similar) => similar,
        Err(e) => {
            ctx.logs.emit(
                LogEvent::warning(format!("experience retrieval failed: {}", e))
                    .source(LogSource::Agent)
                    .stage(Stage::Research.as_str())
                    .task(&state.task_id),
            );
            Vec::new()
        }
    };
    let distances: Vec<f32> = similar.iter().map(|m| 1.0 - m.similarity).collect();
    let confidence = agents::researcher::rag_confidence(&distances);
    let rag_context = similar
        .iter()
        .map(|m| format!("- {} (worked: {})", preview(&m.task, 120), preview(&m.what_worked, 120)))
        .collect::<Vec<_>>()
        .join("\n");

    let needs_web = !state.request.disable_web_search
        && (confidence < settings.limits.min_rag_confidence
            || similar.len() < settings.limits.min_rag_results);
    let mut web_context = String::new();
    if needs_web {
        let scope = ctx.trace.scope(
            settings.debug.under_the_hood_enabled,
            ToolCallKind::Search,
            "web_search",
            Some(Stage::Research.as_str()),
            state.task(),
            Some(emitter.clone()),
        );
        match ctx.web_search.search(state.task(), 3).await {
            Ok(results) => {
                web_context = crate::websearch::format_results(&results);
                if let Some(scope) = scope {
                    scope.finish(true, &web_context);
                }
            }
            Err(e) => {
                if let Some(scope) = scope {
                    scope.finish(false, &e.to_string());
                }
                ctx.logs.emit(
                    LogEvent::warning(format!("web search failed: {}", e))
                        .source(LogSource::Tool)
                        .stage(Stage::Research.as_str())
                        .task(&state.task_id),
                );
            }
        }
    }

    state.research_context =
        agents::researcher::assemble("", &project_context, &rag_context, &web_context);

    Ok(Some(json!({
        "rag_confidence": confidence,
        "documents": similar.len(),
        "web_search_used": needs_web && !web_context.is_empty(),
    })))
}

async fn testing_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let plan = state.plan.clone().unwrap_or_default();
    let prompt = agents::tester::prompt(state.task(), &plan);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 1536,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let answer = traced_generate(ctx, emitter, Stage::Testing, &model, &prompt, options).await?;
    let tests = agents::coder::extract_code(&answer);
    let tests_chars = tests.len();
    state.tests = Some(tests);
    Ok(Some(json!({"tests_chars": tests_chars})))
}

async fn coding_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let plan = state.plan.clone().unwrap_or_default();
    let tests = state.tests.clone().unwrap_or_default();
    let prompt = agents::coder::prompt(
        state.task(),
        &plan,
        &tests,
        &state.research_context,
        state.code.as_deref().filter(|_| state.fix_notes.is_some()),
        state.fix_notes.as_deref(),
    );
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 2048,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let answer = traced_generate(ctx, emitter, Stage::Coding, &model, &prompt, options).await?;
    let code = agents::coder::extract_code(&answer);
    let code_chars = code.len();
    state.code = Some(code);
    state.fix_notes = None;
    Ok(Some(json!({"code_chars": code_chars, "iteration": state.iteration})))
}

async fn validation_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let settings = ctx.config.current();
    let code = state.code.clone().unwrap_or_default();
    let scope = ctx.trace.scope(
        settings.debug.under_the_hood_enabled,
        ToolCallKind::Validation,
        "validators",
        Some(Stage::Validation.as_str()),
        &code,
        Some(emitter.clone()),
    );
    let report = crate::validators::run_validators(&ctx.validators, &code, "artifact.py").await?;
    if let Some(scope) = scope {
        scope.finish(report.all_passed, &report.failure_output());
    }
    ctx.logs.emit(
        LogEvent::info(format!(
            "validation {}: {} validators",
            if report.all_passed { "passed" } else { "failed" },
            report.results.len()
        ))
        .source(LogSource::Validator)
        .stage(Stage::Validation.as_str())
        .task(&state.task_id)
        .iteration(state.iteration),
    );
    let value = report.to_value();
    state.validation = Some(report);
    Ok(Some(value))
}

async fn debug_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
) -> Result<Option<Value>, CoreError> {
    let settings = ctx.config.current();
    let code = state.code.clone().unwrap_or_default();
    let failure = state
        .validation
        .as_ref()
        .map(|r| r.failure_output())
        .unwrap_or_default();
    let prompt = agents::debugger::prompt(state.task(), &code, &failure);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 1024,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);

    let llm = Arc::clone(&ctx.llm);
    let fallback_model = model.clone();
    let fallback_prompt = prompt.clone();
    let diagnosis: agents::debugger::Diagnosis = generate_with_fallback(
        ctx.llm.as_ref(),
        &model,
        &prompt,
        &agents::debugger::schema(),
        &options,
        "debug",
        &settings.structured_output,
        move || async move {
            let text = llm.generate(&fallback_model, &fallback_prompt, &options).await?;
            Ok(agents::debugger::parse_fallback(&text))
        },
    )
    .await?;

    let summary = preview(&diagnosis.diagnosis, 200);
    state.diagnosis = Some(diagnosis.diagnosis);
    Ok(Some(json!({"diagnosis": summary})))
}

async fn fixing_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let code = state.code.clone().unwrap_or_default();
    let diagnosis = state.diagnosis.clone().unwrap_or_default();
    let prompt = format!(
        "Turn this diagnosis into concrete fix instructions for the next code revision.\n\n\
         DIAGNOSIS:\n{}\n\nCODE:\n{}\n\nList the exact changes to make.",
        diagnosis, code
    );
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 768,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let notes = traced_generate(ctx, emitter, Stage::Fixing, &model, &prompt, options).await?;
    state.fix_notes = Some(notes);
    Ok(Some(json!({"iteration": state.iteration})))
}

async fn reflection_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
) -> Result<Option<Value>, CoreError> {
    let settings = ctx.config.current();
    let plan = state.plan.clone().unwrap_or_default();
    let code = state.code.clone().unwrap_or_default();
    let validation_passed = state
        .validation
        .as_ref()
        .map(|r| r.all_passed)
        .unwrap_or(false);
    let prompt = agents::reflection::prompt(state.task(), &plan, &code, validation_passed);
    let options = SamplingOptions {
        temperature: 0.2,
        max_tokens: 512,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);

    let llm = Arc::clone(&ctx.llm);
    let fallback_model = model.clone();
    let fallback_prompt = prompt.clone();
    let outcome: agents::reflection::ReflectionOutcome = generate_with_fallback(
        ctx.llm.as_ref(),
        &model,
        &prompt,
        &agents::reflection::schema(),
        &options,
        "reflection",
        &settings.structured_output,
        move || async move {
            let text = llm.generate(&fallback_model, &fallback_prompt, &options).await?;
            Ok(agents::reflection::parse_fallback(&text, validation_passed))
        },
    )
    .await?;

    let scores = outcome.scores();
    state.reflection = Some(outcome);
    Ok(Some(json!({
        "planning": scores.planning,
        "research": scores.research,
        "testing": scores.testing,
        "coding": scores.coding,
        "overall": scores.overall,
    })))
}

async fn critic_stage(
    ctx: &Arc<ServiceContext>,
    state: &mut WorkflowState,
    emitter: &StreamEmitter,
) -> Result<Option<Value>, CoreError> {
    let plan = state.plan.clone().unwrap_or_default();
    let code = state.code.clone().unwrap_or_default();
    let validation_passed = state
        .validation
        .as_ref()
        .map(|r| r.all_passed)
        .unwrap_or(false);
    let overall = state
        .reflection
        .as_ref()
        .map(|r| r.scores().overall)
        .unwrap_or(0.0);
    let prompt = agents::critic::prompt(state.task(), &plan, &code, validation_passed, overall);
    let options = SamplingOptions {
        temperature: state.request.temperature,
        max_tokens: 1024,
    };
    let model = ctx.model_for(&state.request.model, ModelRole::Default);
    let message = match traced_generate(ctx, emitter, Stage::Critic, &model, &prompt, options).await
    {
        Ok(message) => message,
        Err(e) => {
            // the artifacts are still worth returning
            ctx.logs.emit(
                LogEvent::warning(format!("critic call failed, assembling fallback: {}", e))
                    .source(LogSource::Agent)
                    .stage(Stage::Critic.as_str())
                    .task(&state.task_id),
            );
            agents::critic::assemble_fallback(state.task(), &code, validation_passed)
        }
    };
    state.final_message = Some(message.clone());
    Ok(Some(json!({"message": preview(&message, 200)})))
}
