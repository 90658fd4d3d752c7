//! # Workflow engine
//!
//! The staged pipeline behind `code` mode, with single-shot branches for
//! `chat` and `analyze`:
//!
//! ```text
//! intent → planning → research → testing → coding
//!                                       ↕
//!                              validation ⇄ debug ⇄ fixing
//!                                       ↓
//!                            reflection → critic → final
//! ```
//!
//! Stages are a tagged enum with a fixed transition table
//! ([`next_stage`]): one function per node, dispatched by the engine loop.
//! The back-edges (fixing → coding, reflection → planning) count against
//! the request's iteration budget; exceeding it terminates with the best
//! artifact so far.

mod engine;
mod stages;
mod state;

use serde::Serialize;

use crate::error::CoreError;
use crate::intent::Mode;

pub use engine::WorkflowEngine;
pub use state::WorkflowState;

/// Named workflow stages. `Final` is virtual: it emits `final_result`
/// instead of a stage envelope pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Intent,
    Chat,
    Analyze,
    Planning,
    Research,
    Testing,
    Coding,
    Validation,
    Debug,
    Fixing,
    Reflection,
    Critic,
    Final,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intent => "intent",
            Stage::Chat => "chat",
            Stage::Analyze => "analyze",
            Stage::Planning => "planning",
            Stage::Research => "research",
            Stage::Testing => "testing",
            Stage::Coding => "coding",
            Stage::Validation => "validation",
            Stage::Debug => "debug",
            Stage::Fixing => "fixing",
            Stage::Reflection => "reflection",
            Stage::Critic => "critic",
            Stage::Final => "final",
        }
    }

    /// Agent name used for governor leases and tracing.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Stage::Intent => "intent",
            Stage::Chat => "chat",
            Stage::Analyze => "analyzer",
            Stage::Planning => "planner",
            Stage::Research => "researcher",
            Stage::Testing => "test_generator",
            Stage::Coding => "coder",
            Stage::Validation => "validator",
            Stage::Debug => "debugger",
            Stage::Fixing => "fixer",
            Stage::Reflection => "reflection",
            Stage::Critic => "critic",
            Stage::Final => "final",
        }
    }
}

/// The transition table. Pure over the state so it is testable on its own;
/// a stage missing from the table is an internal invariant violation.
pub fn next_stage(
    current: Stage,
    state: &WorkflowState,
    max_iterations: u32,
) -> Result<Stage, CoreError> {
    let next = match current {
        Stage::Intent => {
            if state.reused {
                Stage::Final
            } else {
                match state.mode {
                    Some(Mode::Chat) => Stage::Chat,
                    Some(Mode::Analyze) => Stage::Analyze,
                    Some(Mode::Code) => Stage::Planning,
                    None => {
                        return Err(CoreError::InternalInvariant(
                            "intent stage finished without a mode".into(),
                        ))
                    }
                }
            }
        }
        Stage::Chat | Stage::Analyze => Stage::Final,
        Stage::Planning => Stage::Research,
        Stage::Research => Stage::Testing,
        Stage::Testing => Stage::Coding,
        Stage::Coding => Stage::Validation,
        Stage::Validation => {
            let all_passed = state
                .validation
                .as_ref()
                .map(|report| report.all_passed)
                .unwrap_or(false);
            if all_passed {
                Stage::Reflection
            } else if state.iteration < max_iterations {
                Stage::Debug
            } else {
                // budget exhausted: finish with the best artifact we have
                Stage::Reflection
            }
        }
        Stage::Debug => Stage::Fixing,
        Stage::Fixing => Stage::Coding,
        Stage::Reflection => {
            let should_retry = state
                .reflection
                .as_ref()
                .map(|r| r.should_retry)
                .unwrap_or(false);
            if should_retry && state.iteration < max_iterations {
                Stage::Planning
            } else {
                Stage::Critic
            }
        }
        Stage::Critic => Stage::Final,
        Stage::Final => {
            return Err(CoreError::InternalInvariant(
                "final is terminal; no next stage".into(),
            ))
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::reflection::ReflectionOutcome;
    use crate::intent::Mode;
    use crate::request::TaskRequest;
    use crate::validators::{ValidationReport, ValidatorResult, ValidatorStatus};

    fn state_with_mode(mode: Mode) -> WorkflowState {
        let mut state = WorkflowState::new(TaskRequest::new("task"), "t-1".to_string());
        state.mode = Some(mode);
        state
    }

    fn report(all_passed: bool) -> ValidationReport {
        ValidationReport::from_results(vec![ValidatorResult {
            name: "tests".into(),
            status: if all_passed {
                ValidatorStatus::Passed
            } else {
                ValidatorStatus::Failed
            },
            output: String::new(),
        }])
    }

    #[test]
    fn intent_routes_by_mode() {
        assert_eq!(
            next_stage(Stage::Intent, &state_with_mode(Mode::Chat), 3).unwrap(),
            Stage::Chat
        );
        assert_eq!(
            next_stage(Stage::Intent, &state_with_mode(Mode::Analyze), 3).unwrap(),
            Stage::Analyze
        );
        assert_eq!(
            next_stage(Stage::Intent, &state_with_mode(Mode::Code), 3).unwrap(),
            Stage::Planning
        );
    }

    #[test]
    fn reuse_short_circuits_to_final() {
        let mut state = state_with_mode(Mode::Code);
        state.reused = true;
        assert_eq!(next_stage(Stage::Intent, &state, 3).unwrap(), Stage::Final);
    }

    #[test]
    fn linear_chain_through_coding() {
        let state = state_with_mode(Mode::Code);
        assert_eq!(next_stage(Stage::Planning, &state, 3).unwrap(), Stage::Research);
        assert_eq!(next_stage(Stage::Research, &state, 3).unwrap(), Stage::Testing);
        assert_eq!(next_stage(Stage::Testing, &state, 3).unwrap(), Stage::Coding);
        assert_eq!(next_stage(Stage::Coding, &state, 3).unwrap(), Stage::Validation);
    }

    #[test]
    fn validation_branches_on_outcome_and_budget() {
        let mut state = state_with_mode(Mode::Code);
        state.validation = Some(report(true));
        assert_eq!(next_stage(Stage::Validation, &state, 3).unwrap(), Stage::Reflection);

        state.validation = Some(report(false));
        state.iteration = 1;
        assert_eq!(next_stage(Stage::Validation, &state, 3).unwrap(), Stage::Debug);

        state.iteration = 3;
        assert_eq!(next_stage(Stage::Validation, &state, 3).unwrap(), Stage::Reflection);
    }

    #[test]
    fn debug_loop_returns_to_coding() {
        let state = state_with_mode(Mode::Code);
        assert_eq!(next_stage(Stage::Debug, &state, 3).unwrap(), Stage::Fixing);
        assert_eq!(next_stage(Stage::Fixing, &state, 3).unwrap(), Stage::Coding);
    }

    #[test]
    fn reflection_retry_respects_budget() {
        let mut state = state_with_mode(Mode::Code);
        state.reflection = Some(ReflectionOutcome {
            planning: 0.4,
            research: 0.4,
            testing: 0.4,
            coding: 0.4,
            overall: 0.4,
            should_retry: true,
            analysis: String::new(),
        });
        state.iteration = 1;
        assert_eq!(next_stage(Stage::Reflection, &state, 3).unwrap(), Stage::Planning);
        state.iteration = 3;
        assert_eq!(next_stage(Stage::Reflection, &state, 3).unwrap(), Stage::Critic);
    }

    #[test]
    fn final_has_no_successor() {
        let state = state_with_mode(Mode::Code);
        assert!(matches!(
            next_stage(Stage::Final, &state, 3),
            Err(CoreError::InternalInvariant(_))
        ));
    }
}
