//! The engine loop: validate, route, drive stages, terminate exactly once.
//!
//! Every stage runs inside a governor lease and between a matched
//! `stage_start`/`stage_end` pair — including failing stages, so the pair
//! counts balance at termination. Stream closure is observed at stage
//! boundaries; the engine then stops scheduling and returns without a
//! terminal event (the subscriber is gone). Every other exit path emits
//! exactly one `final_result` or `error`.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::CoreError;
use crate::intent::Mode;
use crate::logfab::{LogEvent, LogSource};
use crate::memory::TaskExperience;
use crate::paths;
use crate::request::TaskRequest;
use crate::service::ServiceContext;
use crate::stream::{stream_channel, EventStream, PacingConfig, StreamEmitter};
use crate::workflow::stages::run_stage;
use crate::workflow::{next_stage, Stage, WorkflowState};

pub struct WorkflowEngine {
    ctx: Arc<ServiceContext>,
}

impl WorkflowEngine {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    /// Starts one run; events stream to the returned receiver. The run is
    /// detached: dropping the receiver cancels it at the next stage
    /// boundary.
    pub fn run(&self, request: TaskRequest) -> EventStream {
        let settings = self.ctx.config.current();
        let (emitter, rx) = stream_channel(PacingConfig::from_settings(&settings.pacing));
        let ctx = Arc::clone(&self.ctx);
        tokio::spawn(async move {
            run_workflow(ctx, request, emitter).await;
        });
        rx
    }
}

fn terminate_with_error(
    ctx: &Arc<ServiceContext>,
    emitter: &StreamEmitter,
    task_id: &str,
    error: &CoreError,
) {
    let event = match error {
        CoreError::InternalInvariant(_) => LogEvent::error(error.to_string()),
        _ => LogEvent::warning(error.to_string()),
    };
    ctx.logs.emit(event.source(LogSource::System).task(task_id));
    emitter.emit_error(error.kind_tag(), &error.to_string());
}

async fn run_workflow(ctx: Arc<ServiceContext>, request: TaskRequest, emitter: StreamEmitter) {
    let task_id = Uuid::new_v4().to_string();

    let request = match request.validate() {
        Ok(request) => request,
        Err(e) => {
            terminate_with_error(&ctx, &emitter, &task_id, &e);
            return;
        }
    };

    let max_iterations = request.max_iterations;
    let mut state = WorkflowState::new(request, task_id);
    let mut stage = Stage::Intent;

    loop {
        if emitter.is_closed() {
            ctx.logs.emit(
                LogEvent::info("stream abandoned; stopping workflow".to_string())
                    .source(LogSource::System)
                    .task(&state.task_id),
            );
            return;
        }

        emitter.emit_stage_start(stage.as_str(), None);
        let lease = ctx
            .governor
            .acquire(stage.agent_name(), Some(&state.task_id))
            .await;
        let outcome = run_stage(&ctx, stage, &mut state, &emitter).await;
        drop(lease);

        match outcome {
            Ok(result) => {
                emitter.emit_stage_end(stage.as_str(), None, result);
            }
            Err(e) => {
                emitter.emit_stage_end(stage.as_str(), Some(&e.to_string()), None);
                terminate_with_error(&ctx, &emitter, &state.task_id, &e);
                return;
            }
        }

        let next = match next_stage(stage, &state, max_iterations) {
            Ok(next) => next,
            Err(e) => {
                terminate_with_error(&ctx, &emitter, &state.task_id, &e);
                return;
            }
        };

        // Path guard before any analysis touches the filesystem.
        if stage == Stage::Intent && next == Stage::Analyze {
            if let Err(e) = guard_analyze_paths(&state) {
                terminate_with_error(&ctx, &emitter, &state.task_id, &e);
                return;
            }
        }

        match next {
            Stage::Final => {
                finalize(&ctx, &mut state, &emitter).await;
                return;
            }
            Stage::Coding if stage == Stage::Fixing => {
                state.iteration += 1;
                stage = Stage::Coding;
            }
            Stage::Planning if stage == Stage::Reflection => {
                state.iteration += 1;
                stage = Stage::Planning;
            }
            other => stage = other,
        }
    }
}

fn guard_analyze_paths(state: &WorkflowState) -> Result<(), CoreError> {
    let Some(target_file) = state.request.target_file.as_deref() else {
        return Ok(());
    };
    let root = paths::project_root(state.request.project_path.as_deref())?;
    paths::validate_file_path(target_file, &root).map(|_| ())
}

async fn finalize(ctx: &Arc<ServiceContext>, state: &mut WorkflowState, emitter: &StreamEmitter) {
    // Memory writes happen at the pipeline boundary: a finished code run
    // becomes a retrievable experience.
    if state.mode == Some(Mode::Code) && !state.reused {
        if let Some(ref reflection) = state.reflection {
            let experience = TaskExperience {
                task: state.task().to_string(),
                intent: state
                    .intent
                    .as_ref()
                    .map(|i| i.kind.as_str())
                    .unwrap_or("create")
                    .to_string(),
                scores: reflection.scores(),
                what_worked: reflection.analysis.clone(),
                what_didnt_work: String::new(),
                key_decisions: state.plan.clone().unwrap_or_default(),
                code: state.code.clone(),
                plan: state.plan.clone(),
            };
            if let Err(e) = ctx.experiences.save(&experience).await {
                ctx.logs.emit(
                    LogEvent::warning(format!("failed to save task experience: {}", e))
                        .source(LogSource::Infrastructure)
                        .task(&state.task_id),
                );
            }
        }
    }

    ctx.logs.emit(
        LogEvent::info(format!(
            "workflow finished (mode {:?}, iterations {}, reused {})",
            state.mode.map(|m| m.as_str()),
            state.iteration,
            state.reused
        ))
        .source(LogSource::System)
        .task(&state.task_id),
    );

    emitter.emit_final(
        &state.task_id,
        state.final_result(),
        state.metrics(),
        state.conversation_id.as_deref(),
    );
}
