//! Composition root.
//!
//! One [`ServiceContext`] owns the pieces the original kept as process
//! singletons — log manager, governor, memory stores — and passes them
//! explicitly to request handlers. Built once at startup from config;
//! tests swap individual collaborators through the builder.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::context::ContextEngine;
use crate::governor::ResourceGovernor;
use crate::intent::IntentClassifier;
use crate::llm::{HttpLlmRuntime, LlmRuntime};
use crate::logfab::{LogFabricConfig, LogLevel, LogManager};
use crate::memory::{
    ConversationMemory, ConversationMemoryConfig, Embedder, InMemoryVectorStore, RuntimeEmbedder,
    TaskExperienceMemory, VectorStore,
};
use crate::router::ModeRouter;
use crate::trace::TraceHub;
use crate::validators::CodeValidator;
use crate::websearch::{HttpWebSearch, WebSearch};
use env_config::ConfigHandle;

/// Which configured model a call site wants.
#[derive(Clone, Copy, Debug)]
pub enum ModelRole {
    Default,
    Chat,
    Light,
}

pub struct ServiceContext {
    pub config: ConfigHandle,
    pub logs: Arc<LogManager>,
    pub governor: ResourceGovernor,
    pub llm: Arc<dyn LlmRuntime>,
    pub conversations: ConversationMemory,
    pub experiences: TaskExperienceMemory,
    pub context_engine: ContextEngine,
    pub web_search: Arc<dyn WebSearch>,
    pub validators: Vec<Box<dyn CodeValidator>>,
    pub trace: Arc<TraceHub>,
    pub router: ModeRouter,
}

impl ServiceContext {
    /// Production wiring from config: HTTP runtime, persistent vector
    /// index, file-persisted conversations.
    pub fn from_config(config: ConfigHandle) -> Result<Arc<Self>, crate::error::CoreError> {
        let settings = config.current();
        let logs = Arc::new(LogManager::new(LogFabricConfig {
            level: LogLevel::parse_or_info(&settings.debug.log_level),
            enable_file: true,
            file_path: PathBuf::from(&settings.paths.output_dir)
                .join("logs")
                .join("forge.jsonl"),
            memory_max_events: settings.debug.max_logs_in_memory,
            ..LogFabricConfig::default()
        }));
        let llm: Arc<dyn LlmRuntime> = Arc::new(HttpLlmRuntime::new(
            &settings.models.endpoint,
            Duration::from_secs(settings.models.request_timeout_secs),
        ));
        let web_search: Arc<dyn WebSearch> = Arc::new(HttpWebSearch::new(
            &settings.models.web_search_endpoint,
            Duration::from_secs(settings.limits.web_search_timeout_secs),
        ));
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryVectorStore::persistent(
            PathBuf::from(&settings.paths.rag_persist_directory).join("task_experience"),
        )?);
        let embedder: Arc<dyn Embedder> = Arc::new(RuntimeEmbedder::new(
            Arc::clone(&llm),
            settings.models.embedding_model.clone(),
        ));
        let conversations = ConversationMemory::new(
            ConversationMemoryConfig {
                max_messages_before_summary: settings.limits.max_messages_before_summary,
                persist_dir: Some(
                    PathBuf::from(&settings.paths.output_dir).join("conversations"),
                ),
                max_conversations: settings.limits.max_conversations,
                ttl_hours: settings.limits.conversation_ttl_hours,
                summarize_model: settings.models.light_model.clone(),
            },
            Arc::clone(&llm),
            Arc::clone(&logs),
        );
        let validators: Vec<Box<dyn CodeValidator>> = settings
            .validators
            .iter()
            .map(|v| {
                Box::new(crate::validators::CommandValidator::new(
                    v.name.clone(),
                    v.program.clone(),
                    v.args.clone(),
                    Duration::from_secs(settings.limits.validator_timeout_secs),
                )) as Box<dyn CodeValidator>
            })
            .collect();
        Ok(Self::assemble(
            config,
            logs,
            llm,
            web_search,
            store,
            embedder,
            conversations,
            validators,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        config: ConfigHandle,
        logs: Arc<LogManager>,
        llm: Arc<dyn LlmRuntime>,
        web_search: Arc<dyn WebSearch>,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        conversations: ConversationMemory,
        validators: Vec<Box<dyn CodeValidator>>,
    ) -> Arc<Self> {
        let settings = config.current();
        let governor = ResourceGovernor::new(
            settings.agent_resources.max_concurrent_agents,
            Arc::clone(&logs),
        );
        let experiences =
            TaskExperienceMemory::new(store, embedder, Arc::clone(&logs));
        let context_engine = ContextEngine::new(
            settings.limits.max_context_tokens,
            settings.limits.max_chunk_tokens,
            Arc::clone(&logs),
        );
        let trace = Arc::new(TraceHub::new(settings.debug.max_logs_in_memory));
        let router = ModeRouter::new(IntentClassifier::new(
            Arc::clone(&llm),
            settings.models.light_model.clone(),
        ));
        Arc::new(Self {
            config,
            logs,
            governor,
            llm,
            conversations,
            experiences,
            context_engine,
            web_search,
            validators,
            trace,
            router,
        })
    }

    /// The model to call: request override first, then the configured one
    /// for the role.
    pub fn model_for(&self, request_model: &str, role: ModelRole) -> String {
        if !request_model.is_empty() {
            return request_model.to_string();
        }
        let settings = self.config.current();
        match role {
            ModelRole::Default => settings.models.default_model.clone(),
            ModelRole::Chat => settings.models.chat_model.clone(),
            ModelRole::Light => settings.models.light_model.clone(),
        }
    }
}

/// Test/embedding wiring: every collaborator can be swapped.
pub struct ServiceContextBuilder {
    config: ConfigHandle,
    llm: Option<Arc<dyn LlmRuntime>>,
    web_search: Option<Arc<dyn WebSearch>>,
    store: Option<Arc<dyn VectorStore>>,
    embedder: Option<Arc<dyn Embedder>>,
    validators: Vec<Box<dyn CodeValidator>>,
    conversation_cfg: Option<ConversationMemoryConfig>,
}

impl ServiceContextBuilder {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            llm: None,
            web_search: None,
            store: None,
            embedder: None,
            validators: Vec::new(),
            conversation_cfg: None,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LlmRuntime>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn validator(mut self, validator: Box<dyn CodeValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn conversation_config(mut self, cfg: ConversationMemoryConfig) -> Self {
        self.conversation_cfg = Some(cfg);
        self
    }

    pub fn build(self) -> Arc<ServiceContext> {
        let settings = self.config.current();
        let logs = Arc::new(LogManager::new(LogFabricConfig {
            enable_console: false,
            enable_file: false,
            memory_max_events: settings.debug.max_logs_in_memory,
            ..LogFabricConfig::default()
        }));
        let llm = self.llm.unwrap_or_else(|| {
            Arc::new(HttpLlmRuntime::new(
                &settings.models.endpoint,
                Duration::from_secs(settings.models.request_timeout_secs),
            ))
        });
        let web_search = self
            .web_search
            .unwrap_or_else(|| Arc::new(crate::websearch::MockWebSearch::empty()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryVectorStore::new()));
        let embedder = self.embedder.unwrap_or_else(|| {
            Arc::new(RuntimeEmbedder::new(
                Arc::clone(&llm),
                settings.models.embedding_model.clone(),
            ))
        });
        let conversations = ConversationMemory::new(
            self.conversation_cfg.unwrap_or_default(),
            Arc::clone(&llm),
            Arc::clone(&logs),
        );
        ServiceContext::assemble(
            self.config,
            logs,
            llm,
            web_search,
            store,
            embedder,
            conversations,
            self.validators,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[test]
    fn model_override_wins() {
        let ctx = ServiceContextBuilder::new(ConfigHandle::fixed(Default::default()))
            .llm(Arc::new(MockLlm::fixed("x")))
            .build();
        assert_eq!(ctx.model_for("custom:1b", ModelRole::Default), "custom:1b");
        assert_eq!(
            ctx.model_for("", ModelRole::Chat),
            env_config::Settings::default().models.chat_model
        );
    }
}
