//! Host configuration and AI backend selection.
//!
//! The configuration is read from a JSON file (`appsettings.json` by default)
//! and then overlaid with environment variables for secrets. Backends are
//! chosen by section name; an unknown section name fails startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const AZURE_OPENAI_CHAT_SECTION: &str = "AzureOpenAIChat";
pub const OPENAI_CHAT_SECTION: &str = "OpenAIChat";
pub const AZURE_OPENAI_EMBEDDINGS_SECTION: &str = "AzureOpenAIEmbeddings";
pub const OPENAI_EMBEDDINGS_SECTION: &str = "OpenAIEmbeddings";

pub const DEFAULT_CONFIG_FILE: &str = "appsettings.json";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_MAXIMUM_ITERATIONS: usize = 5;

/// Azure OpenAI chat deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureOpenAIChatConfig {
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default)]
    pub model_name: String,
}

/// Azure OpenAI embeddings deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzureOpenAIEmbeddingsConfig {
    #[serde(default)]
    pub deployment_name: String,
    #[serde(default)]
    pub model_name: String,
}

/// OpenAI chat model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAIChatConfig {
    #[serde(default)]
    pub model_name: String,
}

/// OpenAI embeddings model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenAIEmbeddingsConfig {
    #[serde(default)]
    pub model_name: String,
}

/// Retrieval settings. Only the embedding backend selection is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    #[serde(default = "default_embedding_service")]
    pub ai_embedding_service: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            ai_embedding_service: default_embedding_service(),
        }
    }
}

/// How the next speaker is picked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    /// Ask the model which agent should speak next.
    #[default]
    Prompt,
    /// Round-robin over the roster.
    Sequential,
}

/// How the group chat decides it is finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationKind {
    /// Ask the model whether the task is complete.
    #[default]
    Prompt,
    /// Stop once the last message contains "approve".
    Approval,
}

/// One agent in the group chat roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub instructions: String,
    #[serde(default)]
    pub temperature: f64,
}

/// Group chat settings. An empty `agents` list means the built-in roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChatSettings {
    #[serde(default = "default_maximum_iterations")]
    pub maximum_iterations: usize,
    #[serde(default)]
    pub selection: SelectionKind,
    #[serde(default)]
    pub termination: TerminationKind,
    /// Messages kept when rendering the selection prompt.
    #[serde(default = "default_selection_history")]
    pub selection_history_limit: usize,
    /// Messages kept when rendering the termination prompt.
    #[serde(default = "default_termination_history")]
    pub termination_history_limit: usize,
    #[serde(default)]
    pub agents: Vec<AgentSettings>,
}

impl Default for GroupChatSettings {
    fn default() -> Self {
        Self {
            maximum_iterations: DEFAULT_MAXIMUM_ITERATIONS,
            selection: SelectionKind::default(),
            termination: TerminationKind::default(),
            selection_history_limit: default_selection_history(),
            termination_history_limit: default_termination_history(),
            agents: Vec::new(),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_chat_service", rename = "aiChatService")]
    pub ai_chat_service: String,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default, rename = "azureOpenAIEndpoint")]
    pub azure_openai_endpoint: Option<String>,
    #[serde(default = "default_api_version", rename = "azureOpenAIApiVersion")]
    pub azure_openai_api_version: String,
    #[serde(default, rename = "azureOpenAIChat")]
    pub azure_openai_chat: AzureOpenAIChatConfig,
    #[serde(default, rename = "azureOpenAIEmbeddings")]
    pub azure_openai_embeddings: AzureOpenAIEmbeddingsConfig,
    #[serde(default = "default_openai_base_url", rename = "openAIBaseUrl")]
    pub openai_base_url: String,
    #[serde(default, rename = "openAIChat")]
    pub openai_chat: OpenAIChatConfig,
    #[serde(default, rename = "openAIEmbeddings")]
    pub openai_embeddings: OpenAIEmbeddingsConfig,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub group_chat: GroupChatSettings,
    /// Secrets come from the environment only.
    #[serde(skip)]
    pub azure_openai_api_key: Option<String>,
    #[serde(skip)]
    pub openai_api_key: Option<String>,
    #[serde(skip)]
    pub config_path: PathBuf,
}

fn default_port() -> u16 {
    5000
}
fn default_chat_service() -> String {
    AZURE_OPENAI_CHAT_SECTION.into()
}
fn default_embedding_service() -> String {
    AZURE_OPENAI_EMBEDDINGS_SECTION.into()
}
fn default_api_version() -> String {
    DEFAULT_AZURE_API_VERSION.into()
}
fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.into()
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_maximum_iterations() -> usize {
    DEFAULT_MAXIMUM_ITERATIONS
}
fn default_selection_history() -> usize {
    3
}
fn default_termination_history() -> usize {
    4
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            ai_chat_service: default_chat_service(),
            rag: RagConfig::default(),
            azure_openai_endpoint: None,
            azure_openai_api_version: default_api_version(),
            azure_openai_chat: AzureOpenAIChatConfig::default(),
            azure_openai_embeddings: AzureOpenAIEmbeddingsConfig::default(),
            openai_base_url: default_openai_base_url(),
            openai_chat: OpenAIChatConfig::default(),
            openai_embeddings: OpenAIEmbeddingsConfig::default(),
            max_retries: default_max_retries(),
            group_chat: GroupChatSettings::default(),
            azure_openai_api_key: None,
            openai_api_key: None,
            config_path: PathBuf::new(),
        }
    }
}

/// Resolved chat completion backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatBackend {
    AzureOpenAI {
        endpoint: String,
        deployment_name: String,
        model_name: String,
        api_version: String,
        api_key: String,
    },
    OpenAI {
        base_url: String,
        model_name: String,
        api_key: String,
    },
}

impl ChatBackend {
    /// Configuration section this backend was read from.
    pub fn section_name(&self) -> &'static str {
        match self {
            ChatBackend::AzureOpenAI { .. } => AZURE_OPENAI_CHAT_SECTION,
            ChatBackend::OpenAI { .. } => OPENAI_CHAT_SECTION,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            ChatBackend::AzureOpenAI { model_name, .. } | ChatBackend::OpenAI { model_name, .. } => {
                model_name
            }
        }
    }
}

/// Resolved text embedding backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingBackend {
    AzureOpenAI {
        deployment_name: String,
        model_name: String,
    },
    OpenAI {
        model_name: String,
    },
}

impl EmbeddingBackend {
    pub fn section_name(&self) -> &'static str {
        match self {
            EmbeddingBackend::AzureOpenAI { .. } => AZURE_OPENAI_EMBEDDINGS_SECTION,
            EmbeddingBackend::OpenAI { .. } => OPENAI_EMBEDDINGS_SECTION,
        }
    }

    pub fn model_name(&self) -> &str {
        match self {
            EmbeddingBackend::AzureOpenAI { model_name, .. }
            | EmbeddingBackend::OpenAI { model_name } => model_name,
        }
    }
}

impl HostConfig {
    /// Resolve the config file path from `AGENTCREW_CONFIG`, falling back to
    /// `appsettings.json` in the working directory.
    pub fn default_path() -> PathBuf {
        std::env::var("AGENTCREW_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load config from file and the process environment.
    ///
    /// A missing file yields defaults; a malformed file is an error.
    pub fn load(config_path: &Path) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a config file without consulting the environment.
    pub fn from_file(config_path: &Path) -> Result<Self> {
        let mut config: HostConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => serde_json::from_str(&s)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Config file {} not found, using defaults",
                    config_path.display()
                );
                HostConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.config_path = config_path.to_path_buf();
        info!("Loaded host config from {}", config_path.display());
        Ok(config)
    }

    /// Overlay secrets and scalar overrides from a key lookup.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(k) = lookup("AZURE_OPENAI_API_KEY") {
            self.azure_openai_api_key = Some(k);
        }
        if let Some(k) = lookup("OPENAI_API_KEY") {
            self.openai_api_key = Some(k);
        }
        if let Some(endpoint) = lookup("AZURE_OPENAI_ENDPOINT") {
            self.azure_openai_endpoint = Some(endpoint);
        }
        if let Some(port) = lookup("PORT") {
            match port.trim().parse() {
                Ok(port) => self.port = port,
                Err(_) => warn!("Ignoring invalid PORT '{}', keeping {}", port, self.port),
            }
        }
    }

    /// Resolve the chat completion backend named by `aiChatService`.
    pub fn chat_backend(&self) -> Result<ChatBackend> {
        match self.ai_chat_service.as_str() {
            AZURE_OPENAI_CHAT_SECTION => {
                let chat = &self.azure_openai_chat;
                Ok(ChatBackend::AzureOpenAI {
                    endpoint: required(
                        self.azure_openai_endpoint.as_deref(),
                        "azureOpenAIEndpoint",
                    )?,
                    deployment_name: required(
                        Some(&chat.deployment_name),
                        "azureOpenAIChat.deploymentName",
                    )?,
                    model_name: required(Some(&chat.model_name), "azureOpenAIChat.modelName")?,
                    api_version: self.azure_openai_api_version.clone(),
                    api_key: required(
                        self.azure_openai_api_key.as_deref(),
                        "AZURE_OPENAI_API_KEY",
                    )?,
                })
            }
            OPENAI_CHAT_SECTION => Ok(ChatBackend::OpenAI {
                base_url: self.openai_base_url.trim_end_matches('/').to_string(),
                model_name: required(Some(&self.openai_chat.model_name), "openAIChat.modelName")?,
                api_key: required(self.openai_api_key.as_deref(), "OPENAI_API_KEY")?,
            }),
            other => Err(Error::Config(format!(
                "AI chat service '{}' is not supported.",
                other
            ))),
        }
    }

    /// Resolve the embedding backend named by `rag.aiEmbeddingService`.
    pub fn embedding_backend(&self) -> Result<EmbeddingBackend> {
        match self.rag.ai_embedding_service.as_str() {
            AZURE_OPENAI_EMBEDDINGS_SECTION => {
                let emb = &self.azure_openai_embeddings;
                Ok(EmbeddingBackend::AzureOpenAI {
                    deployment_name: required(
                        Some(&emb.deployment_name),
                        "azureOpenAIEmbeddings.deploymentName",
                    )?,
                    model_name: required(
                        Some(&emb.model_name),
                        "azureOpenAIEmbeddings.modelName",
                    )?,
                })
            }
            OPENAI_EMBEDDINGS_SECTION => Ok(EmbeddingBackend::OpenAI {
                model_name: required(
                    Some(&self.openai_embeddings.model_name),
                    "openAIEmbeddings.modelName",
                )?,
            }),
            other => Err(Error::Config(format!(
                "AI embeddings service '{}' is not supported.",
                other
            ))),
        }
    }
}

fn required(value: Option<&str>, name: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Config(format!("'{}' is required", name))),
    }
}
