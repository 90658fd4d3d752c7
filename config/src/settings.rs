//! The typed settings tree. Every field is defaulted so partial TOML works.

use serde::Deserialize;

/// Root of the configuration tree; one field per TOML table.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub structured_output: StructuredOutputSettings,
    pub agent_resources: AgentResourceSettings,
    pub debug: DebugSettings,
    pub models: ModelSettings,
    pub paths: PathSettings,
    pub limits: LimitSettings,
    pub router: RouterSettings,
    pub retry: RetrySettings,
    pub pacing: PacingSettings,
    pub validators: Vec<ValidatorCommandSettings>,
}

/// One `[[validators]]` entry: an external validator command (test runner,
/// type checker, security linter) run against the code artifact. A missing
/// program reports "skipped", never a failure.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidatorCommandSettings {
    pub name: String,
    pub program: String,
    pub args: Vec<String>,
}

/// `[structured_output]`: schema-constrained decoding per agent, with an
/// optional fallback to manual parsing when validation keeps failing.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StructuredOutputSettings {
    pub enabled: bool,
    pub enabled_agents: Vec<String>,
    pub fallback_to_manual_parsing: bool,
}

impl Default for StructuredOutputSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            enabled_agents: vec![
                "intent".to_string(),
                "debug".to_string(),
                "reflection".to_string(),
            ],
            fallback_to_manual_parsing: true,
        }
    }
}

/// `[agent_resources]`: concurrency cap for agent-bound work.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AgentResourceSettings {
    pub max_concurrent_agents: usize,
}

impl Default for AgentResourceSettings {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 5,
        }
    }
}

/// `[debug]`: under-the-hood tool-call tracing.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub under_the_hood_enabled: bool,
    pub log_level: String,
    pub max_logs_in_memory: usize,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            under_the_hood_enabled: false,
            log_level: "INFO".to_string(),
            max_logs_in_memory: 1000,
        }
    }
}

/// `[models]`: LLM runtime endpoint and model names. Model names are opaque
/// strings passed through to the runtime.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub endpoint: String,
    pub web_search_endpoint: String,
    pub default_model: String,
    pub chat_model: String,
    pub light_model: String,
    pub embedding_model: String,
    pub request_timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434".to_string(),
            web_search_endpoint: "http://127.0.0.1:8888".to_string(),
            default_model: "qwen2.5-coder:7b".to_string(),
            chat_model: "qwen2.5-coder:7b".to_string(),
            light_model: "phi3:mini".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            request_timeout_secs: 120,
        }
    }
}

/// `[paths]`: where persisted state lives, relative to the working directory
/// unless absolute.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub output_dir: String,
    pub rag_persist_directory: String,
    pub context_cache_directory: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            output_dir: "output".to_string(),
            rag_persist_directory: ".vectors".to_string(),
            context_cache_directory: ".context_cache".to_string(),
        }
    }
}

/// `[limits]`: budgets and thresholds for context, memory, and research.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub max_context_tokens: usize,
    pub max_chunk_tokens: usize,
    pub max_messages_before_summary: usize,
    pub max_conversations: usize,
    pub conversation_ttl_hours: i64,
    pub validator_timeout_secs: u64,
    pub web_search_timeout_secs: u64,
    pub min_rag_confidence: f32,
    pub min_rag_results: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_context_tokens: 4000,
            max_chunk_tokens: 500,
            max_messages_before_summary: 20,
            max_conversations: 100,
            conversation_ttl_hours: 72,
            validator_timeout_secs: 60,
            web_search_timeout_secs: 10,
            min_rag_confidence: 0.7,
            min_rag_results: 2,
        }
    }
}

/// `[router]`: keyword families for mode detection. These are data, not code
/// constants; deployments replace them without rebuilding.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    pub code_keywords: Vec<String>,
    pub chat_keywords: Vec<String>,
    pub analyze_keywords: Vec<String>,
    pub learning_keywords: Vec<String>,
    pub greetings: Vec<String>,
    pub question_cues: Vec<String>,
    pub tell_cues: Vec<String>,
    pub complex_keywords: Vec<String>,
    pub medium_keywords: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            code_keywords: strings(&[
                "напиши", "создай", "сделай", "реализуй", "сгенерируй", "write", "create",
                "make", "implement", "generate", "функци", "класс", "модуль", "скрипт",
                "function", "class", "module", "script", "исправ", "отлад", "debug", "fix",
                "оптимизир",
            ]),
            chat_keywords: strings(&[
                "объясни", "расскажи", "что такое", "как работает", "explain", "tell me",
                "what is", "how does", "почему", "зачем", "когда", "можно ли", "why", "when",
                "can you", "should i", "посоветуй", "подскажи", "научи", "обучи",
                "покажи как", "покажи пример", "teach", "learn", "show me", "show example",
                "tutorial", "хочу научиться", "как начать", "i want to learn", "how to start",
                "новост", "событи", "погод", "сегодня", "вчера", "завтра", "news", "weather",
                "today", "yesterday", "tomorrow", "что нового", "what's happening", "latest",
                "current",
            ]),
            analyze_keywords: strings(&[
                "проанализируй", "анализ", "обзор", "структур", "архитектур", "analyze",
                "review", "overview", "structure", "architecture", "покажи проект",
                "изучи проект",
            ]),
            learning_keywords: strings(&[
                "научи", "обучи", "хочу научиться", "хочу изучить", "teach", "learn",
                "i want to learn", "how to start",
            ]),
            greetings: strings(&[
                "привет", "здравствуй", "здравствуйте", "хай", "хей", "салют", "hello", "hi",
                "hey", "howdy", "sup",
            ]),
            question_cues: strings(&[
                "?", "знаешь", "расскажи", "do you know", "tell me", "what", "who", "when",
                "where",
            ]),
            tell_cues: strings(&["расскажи", "опиши", "tell", "describe", "explain"]),
            complex_keywords: strings(&[
                "игр", "game", "систем", "system", "приложен", "application", "app", "проект",
                "project", "архитектур", "website", "платформ", "сервис", "service", "бот",
                "bot", "scraper", "змейк", "snake", "тетрис", "tetris", "шахмат", "chess",
                "магазин", "shop", "store", "crm", "cms",
            ]),
            medium_keywords: strings(&[
                "класс", "class", "модуль", "module", "api", "endpoint", "crud",
                "база данных", "database", "db", "orm", "auth", "парсер", "parser",
                "конвертер", "converter", "валидатор", "сервер", "server", "клиент", "client",
                "обработчик", "handler",
            ]),
        }
    }
}

/// `[retry]`: bounded exponential backoff for upstream failures.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: true,
        }
    }
}

/// `[pacing]`: advisory UI pacing between stream envelopes and the per-
/// subscriber queue bound.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PacingSettings {
    pub default_delay_ms: u64,
    pub critical_delay_ms: u64,
    pub queue_capacity: usize,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            default_delay_ms: 50,
            critical_delay_ms: 10,
            queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_spec_values() {
        let s = Settings::default();
        assert_eq!(s.limits.max_context_tokens, 4000);
        assert_eq!(s.limits.max_chunk_tokens, 500);
        assert_eq!(s.limits.max_conversations, 100);
        assert_eq!(s.limits.conversation_ttl_hours, 72);
        assert_eq!(s.retry.max_attempts, 3);
        assert_eq!(s.pacing.queue_capacity, 256);
    }

    #[test]
    fn validators_default_to_none() {
        assert!(Settings::default().validators.is_empty());
    }

    #[test]
    fn greeting_set_spans_both_languages() {
        let s = RouterSettings::default();
        assert!(s.greetings.iter().any(|g| g == "привет"));
        assert!(s.greetings.iter().any(|g| g == "hello"));
    }
}
