//! # Intent classification
//!
//! [`IntentResult`] is a fully-derived record: the constructor computes the
//! recommended mode and the code-generation flag from the intent kind, so
//! there is no hidden post-init state. Classification runs in tiers: the
//! fast greeting check needs no LLM at all, keyword heuristics estimate
//! complexity, and the LLM classifier (structured output with a legacy
//! parser fallback) covers everything else.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::llm::{
    extract_json, generate_with_fallback, LlmRuntime, SamplingOptions, Schema,
};

/// Interaction mode selected for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Chat,
    Code,
    Analyze,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Chat => "chat",
            Mode::Code => "code",
            Mode::Analyze => "analyze",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Simple => "simple",
            Complexity::Medium => "medium",
            Complexity::Complex => "complex",
        }
    }

    fn parse_or_simple(s: &str) -> Self {
        match s {
            "medium" => Complexity::Medium,
            "complex" => Complexity::Complex,
            _ => Complexity::Simple,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Greeting,
    Help,
    Create,
    Modify,
    Debug,
    Optimize,
    Explain,
    Test,
    Refactor,
    Analyze,
}

impl IntentKind {
    pub const ALL: [IntentKind; 10] = [
        IntentKind::Greeting,
        IntentKind::Help,
        IntentKind::Create,
        IntentKind::Modify,
        IntentKind::Debug,
        IntentKind::Optimize,
        IntentKind::Explain,
        IntentKind::Test,
        IntentKind::Refactor,
        IntentKind::Analyze,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Greeting => "greeting",
            IntentKind::Help => "help",
            IntentKind::Create => "create",
            IntentKind::Modify => "modify",
            IntentKind::Debug => "debug",
            IntentKind::Optimize => "optimize",
            IntentKind::Explain => "explain",
            IntentKind::Test => "test",
            IntentKind::Refactor => "refactor",
            IntentKind::Analyze => "analyze",
        }
    }

    /// Loose match: the model sometimes answers "create_code" or similar.
    pub fn from_loose(s: &str) -> Option<Self> {
        let s = s.to_lowercase();
        Self::ALL.iter().copied().find(|k| s.contains(k.as_str()))
    }

    pub fn is_chat_kind(&self) -> bool {
        matches!(self, IntentKind::Greeting | IntentKind::Help | IntentKind::Explain)
    }

    pub fn requires_code_generation(&self) -> bool {
        matches!(
            self,
            IntentKind::Create
                | IntentKind::Modify
                | IntentKind::Debug
                | IntentKind::Optimize
                | IntentKind::Test
                | IntentKind::Refactor
        )
    }
}

/// Classification result with its derived routing fields.
#[derive(Clone, Debug, Serialize)]
pub struct IntentResult {
    pub kind: IntentKind,
    pub confidence: f32,
    pub complexity: Complexity,
    pub recommended_mode: Mode,
    pub requires_code_generation: bool,
}

impl IntentResult {
    /// The only constructor: derivations are explicit, not hidden in
    /// allocation.
    pub fn derive(kind: IntentKind, confidence: f32, complexity: Complexity) -> Self {
        let recommended_mode = if kind == IntentKind::Analyze {
            Mode::Analyze
        } else if kind.requires_code_generation() {
            Mode::Code
        } else {
            Mode::Chat
        };
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            complexity,
            recommended_mode,
            requires_code_generation: kind.requires_code_generation(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    intent: String,
    #[serde(default = "default_confidence")]
    confidence: f32,
    #[serde(default)]
    complexity: String,
}

fn default_confidence() -> f32 {
    0.75
}

pub struct IntentClassifier {
    llm: Arc<dyn LlmRuntime>,
    model: String,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmRuntime>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    /// Fast check for short unambiguous greetings, no LLM involved. Only
    /// fires for inputs of at most three words whose text (or first word)
    /// is in the greeting set.
    pub fn is_greeting_fast(query: &str, greetings: &[String]) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return false;
        }
        let words: Vec<&str> = query.split_whitespace().collect();
        if words.len() > 3 {
            return false;
        }
        greetings.iter().any(|g| g == &query)
            || greetings.iter().any(|g| g == words[0])
    }

    /// Keyword heuristic for task complexity.
    pub fn estimate_complexity(query: &str, router: &env_config::RouterSettings) -> Complexity {
        let query = query.to_lowercase();
        if router.complex_keywords.iter().any(|k| query.contains(k.as_str())) {
            return Complexity::Complex;
        }
        if router.medium_keywords.iter().any(|k| query.contains(k.as_str())) {
            return Complexity::Medium;
        }
        Complexity::Simple
    }

    fn schema() -> Schema {
        let kinds: Vec<&str> = IntentKind::ALL.iter().map(|k| k.as_str()).collect();
        Schema::new("intent_classification")
            .one_of("intent", &kinds)
            .number("confidence", 0.0, 1.0)
            .one_of("complexity", &["simple", "medium", "complex"])
    }

    fn prompt(query: &str) -> String {
        format!(
            "Classify this user request for a code generation system.\n\n\
             REQUEST: \"{}\"\n\n\
             TYPES: greeting (simple hello), help (what can you do), create (write new code), \
             modify (change existing code), debug (fix specific broken code), optimize (make code \
             faster), explain (how something works), test (write tests), refactor (restructure \
             without behavior change), analyze (review a whole project).\n\n\
             COMPLEXITY: simple = one small function; medium = a class or module; \
             complex = a game, system, or multi-file project.",
            query
        )
    }

    fn from_raw(raw: RawClassification, query: &str, router: &env_config::RouterSettings) -> IntentResult {
        let kind = IntentKind::from_loose(&raw.intent).unwrap_or(IntentKind::Create);
        let mut complexity = Complexity::parse_or_simple(&raw.complexity.to_lowercase());
        if matches!(kind, IntentKind::Greeting | IntentKind::Help) {
            complexity = Complexity::Simple;
        }
        if raw.complexity.is_empty() {
            complexity = Self::estimate_complexity(query, router);
        }
        IntentResult::derive(kind, raw.confidence, complexity)
    }

    /// Manual parse of an unconstrained model answer: embedded JSON first,
    /// then a keyword scan, then the `create` default.
    fn legacy_parse(response: &str, query: &str, router: &env_config::RouterSettings) -> IntentResult {
        if let Some(value) = extract_json(response) {
            if let Ok(raw) = serde_json::from_value::<RawClassification>(value) {
                return Self::from_raw(raw, query, router);
            }
        }
        let response = response.to_lowercase();
        for kind in IntentKind::ALL {
            if response.contains(kind.as_str()) {
                return IntentResult::derive(
                    kind,
                    0.7,
                    Self::estimate_complexity(query, router),
                );
            }
        }
        IntentResult::derive(
            IntentKind::Create,
            0.5,
            Self::estimate_complexity(query, router),
        )
    }

    /// Full classification. Empty input is `help`; short greetings skip the
    /// LLM; the rest goes through structured output with a legacy-parser
    /// fallback.
    pub async fn classify(
        &self,
        query: &str,
        router: &env_config::RouterSettings,
        structured: &env_config::StructuredOutputSettings,
        temperature: f32,
    ) -> Result<IntentResult, CoreError> {
        if query.trim().is_empty() {
            return Ok(IntentResult::derive(IntentKind::Help, 0.5, Complexity::Simple));
        }
        if Self::is_greeting_fast(query, &router.greetings)
            && query.split_whitespace().count() <= 2
        {
            return Ok(IntentResult::derive(
                IntentKind::Greeting,
                0.95,
                Complexity::Simple,
            ));
        }

        let prompt = Self::prompt(query);
        let options = SamplingOptions {
            temperature,
            max_tokens: 256,
        };
        let llm = Arc::clone(&self.llm);
        let model = self.model.clone();
        let fallback_prompt = prompt.clone();
        let raw: RawClassification = generate_with_fallback(
            self.llm.as_ref(),
            &self.model,
            &prompt,
            &Self::schema(),
            &options,
            "intent",
            structured,
            move || async move {
                let text = llm.generate(&model, &fallback_prompt, &options).await?;
                Ok(RawClassification {
                    intent: text,
                    confidence: 0.7,
                    complexity: String::new(),
                })
            },
        )
        .await?;

        // The fallback stuffs the whole answer into `intent`; from_loose and
        // legacy parsing both cope with that.
        if raw.intent.len() > 64 || IntentKind::from_loose(&raw.intent).is_none() {
            let text = raw.intent.clone();
            return Ok(Self::legacy_parse(&text, query, router));
        }
        Ok(Self::from_raw(raw, query, router))
    }
}
