//! # Mode router
//!
//! Decides how a request is executed: explicit user hints are honored
//! verbatim; in `auto` the fast greeting check and the configured keyword
//! families run first, and only unresolved requests reach the LLM
//! classifier. Keyword sets live in `[router]` config — replacing them
//! needs no code change.

use crate::error::CoreError;
use crate::intent::{Complexity, IntentClassifier, IntentKind, IntentResult, Mode};
use crate::request::ModeHint;

/// Routing outcome: the mode to run, the intent when one was determined,
/// and the complexity estimate.
#[derive(Clone, Debug)]
pub struct ModeDecision {
    pub mode: Mode,
    pub intent: Option<IntentResult>,
    pub complexity: Complexity,
}

pub struct ModeRouter {
    classifier: IntentClassifier,
}

impl ModeRouter {
    pub fn new(classifier: IntentClassifier) -> Self {
        Self { classifier }
    }

    fn contains_any(task: &str, keywords: &[String]) -> bool {
        keywords.iter().any(|k| task.contains(k.as_str()))
    }

    pub async fn detect(
        &self,
        task: &str,
        hint: ModeHint,
        router: &env_config::RouterSettings,
        structured: &env_config::StructuredOutputSettings,
        temperature: f32,
    ) -> Result<ModeDecision, CoreError> {
        match hint {
            ModeHint::Chat => Ok(self.explicit_chat(task, router)),
            ModeHint::Code => Ok(ModeDecision {
                mode: Mode::Code,
                intent: None,
                complexity: IntentClassifier::estimate_complexity(task, router),
            }),
            ModeHint::Analyze => Ok(ModeDecision {
                mode: Mode::Analyze,
                intent: Some(IntentResult::derive(IntentKind::Analyze, 1.0, Complexity::Complex)),
                complexity: Complexity::Complex,
            }),
            ModeHint::Auto => self.auto(task, router, structured, temperature).await,
        }
    }

    fn explicit_chat(&self, task: &str, router: &env_config::RouterSettings) -> ModeDecision {
        let mut intent = None;
        let mut complexity = IntentClassifier::estimate_complexity(task, router);
        if IntentClassifier::is_greeting_fast(task, &router.greetings) {
            intent = Some(IntentResult::derive(IntentKind::Greeting, 0.95, Complexity::Simple));
            complexity = Complexity::Simple;
        }
        ModeDecision {
            mode: Mode::Chat,
            intent,
            complexity,
        }
    }

    async fn auto(
        &self,
        task: &str,
        router: &env_config::RouterSettings,
        structured: &env_config::StructuredOutputSettings,
        temperature: f32,
    ) -> Result<ModeDecision, CoreError> {
        let task_lower = task.to_lowercase();

        // Fast path: short unambiguous greeting with no embedded question
        // or tell/explain verb.
        if IntentClassifier::is_greeting_fast(task, &router.greetings) {
            let has_question = Self::contains_any(&task_lower, &router.question_cues);
            let has_tell = Self::contains_any(&task_lower, &router.tell_cues);
            if !has_question && !has_tell {
                return Ok(ModeDecision {
                    mode: Mode::Chat,
                    intent: Some(IntentResult::derive(
                        IntentKind::Greeting,
                        0.95,
                        Complexity::Simple,
                    )),
                    complexity: Complexity::Simple,
                });
            }
        }

        let has_code = Self::contains_any(&task_lower, &router.code_keywords);
        let has_chat = Self::contains_any(&task_lower, &router.chat_keywords);
        let has_analyze = Self::contains_any(&task_lower, &router.analyze_keywords);
        let is_learning = Self::contains_any(&task_lower, &router.learning_keywords);

        // Learning requests are always a dialog, whatever else matched.
        if is_learning {
            return Ok(ModeDecision {
                mode: Mode::Chat,
                intent: Some(IntentResult::derive(IntentKind::Explain, 0.8, Complexity::Simple)),
                complexity: Complexity::Simple,
            });
        }

        if has_chat && !has_code && !has_analyze {
            let complexity = IntentClassifier::estimate_complexity(task, router);
            return Ok(ModeDecision {
                mode: Mode::Chat,
                intent: Some(IntentResult::derive(IntentKind::Explain, 0.8, complexity)),
                complexity,
            });
        }

        if has_analyze && !has_code {
            return Ok(ModeDecision {
                mode: Mode::Analyze,
                intent: Some(IntentResult::derive(IntentKind::Analyze, 0.8, Complexity::Complex)),
                complexity: Complexity::Complex,
            });
        }

        if has_code {
            return Ok(ModeDecision {
                mode: Mode::Code,
                intent: None,
                complexity: IntentClassifier::estimate_complexity(task, router),
            });
        }

        // Undecided: ask the classifier.
        let intent = self
            .classifier
            .classify(task, router, structured, temperature)
            .await?;
        let mut mode = intent.recommended_mode;
        let mut complexity = intent.complexity;
        if intent.kind == IntentKind::Explain && complexity == Complexity::Simple {
            complexity = Complexity::Medium;
        }
        if intent.kind == IntentKind::Analyze {
            mode = Mode::Analyze;
            complexity = Complexity::Complex;
        }
        Ok(ModeDecision {
            mode,
            intent: Some(intent),
            complexity,
        })
    }
}
