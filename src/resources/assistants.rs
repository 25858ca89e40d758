use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{AssistantConfig, ConfigDocument};
use crate::message::Message;
use crate::model_gateway::{ApiFuture, ChatGateway, ChatRequest};
use crate::providers::ApiError;
use crate::resources::vector_stores::{VectorStoreApi, get_or_create_vector_store};

const ASSISTANT_LIST_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Assistant {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantTool {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSearchResources {
    pub vector_store_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResources {
    pub file_search: FileSearchResources,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssistantRequest {
    pub name: String,
    pub description: String,
    pub model: String,
    pub instructions: String,
    pub tools: Vec<AssistantTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_resources: Option<ToolResources>,
    pub temperature: f32,
}

impl AssistantRequest {
    /// Code interpreter plus file search, bound to the vector store if given.
    pub fn new(settings: &AssistantConfig, vector_store_id: Option<String>) -> Self {
        Self {
            name: settings.name.clone(),
            description: settings.description.clone(),
            model: settings.model.clone(),
            instructions: settings.instruction.clone(),
            tools: vec![
                AssistantTool {
                    kind: "code_interpreter".to_string(),
                },
                AssistantTool {
                    kind: "file_search".to_string(),
                },
            ],
            tool_resources: vector_store_id.map(|id| ToolResources {
                file_search: FileSearchResources {
                    vector_store_ids: vec![id],
                },
            }),
            temperature: settings.temperature as f32,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Thread {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
    #[serde(other)]
    Unknown,
}

impl RunStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextValue {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadContent {
    Text { text: TextValue },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThreadMessage {
    pub role: String,
    #[serde(default)]
    pub content: Vec<ThreadContent>,
}

impl ThreadMessage {
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|part| match part {
            ThreadContent::Text { text } => Some(text.value.as_str()),
            ThreadContent::Other => None,
        })
    }
}

pub trait AssistantApi {
    fn create_assistant<'a>(&'a self, request: &'a AssistantRequest) -> ApiFuture<'a, Assistant>;
    fn list_assistants<'a>(&'a self, limit: u32) -> ApiFuture<'a, Vec<Assistant>>;
    fn retrieve_assistant<'a>(&'a self, assistant_id: &'a str) -> ApiFuture<'a, Assistant>;
    fn create_thread<'a>(&'a self) -> ApiFuture<'a, Thread>;
    fn add_thread_message<'a>(&'a self, thread_id: &'a str, content: &'a str) -> ApiFuture<'a, ()>;
    fn create_run<'a>(&'a self, thread_id: &'a str, assistant_id: &'a str) -> ApiFuture<'a, Run>;
    fn retrieve_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> ApiFuture<'a, Run>;
    /// Newest first.
    fn list_thread_messages<'a>(&'a self, thread_id: &'a str) -> ApiFuture<'a, Vec<ThreadMessage>>;
}

/// Command-line assistant settings; `None` means the flag was not given.
#[derive(Debug, Clone, Default)]
pub struct AssistantOverrides {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub instruction: Option<String>,
    pub temperature: Option<f64>,
    pub vector_store_name: Option<String>,
    pub vector_store_id: Option<String>,
}

/// Combines command-line settings with the config entry of the same name.
/// Without a config entry every setting must come from the command line.
pub fn merge_assistant_settings(
    config: &ConfigDocument,
    overrides: &AssistantOverrides,
) -> Result<AssistantConfig> {
    let Some(name) = overrides.name.clone() else {
        bail!("assistant name is required (--assistant-name)");
    };

    if let Some(stored) = config.assistants.get(&name) {
        return Ok(AssistantConfig {
            name,
            description: overrides
                .description
                .clone()
                .unwrap_or_else(|| stored.description.clone()),
            model: overrides
                .model
                .clone()
                .unwrap_or_else(|| stored.model.clone()),
            instruction: overrides
                .instruction
                .clone()
                .unwrap_or_else(|| stored.instruction.clone()),
            temperature: overrides.temperature.unwrap_or(stored.temperature),
            vector_store_name: overrides
                .vector_store_name
                .clone()
                .unwrap_or_else(|| stored.vector_store_name.clone()),
        });
    }

    let mut missing = Vec::new();
    if overrides.description.is_none() {
        missing.push("--assistant-description");
    }
    if overrides.model.is_none() {
        missing.push("--model");
    }
    if overrides.instruction.is_none() {
        missing.push("--instruction");
    }
    if overrides.temperature.is_none() {
        missing.push("--temperature");
    }
    if overrides.vector_store_name.is_none() && overrides.vector_store_id.is_none() {
        missing.push("--vector-store-name");
    }
    if !missing.is_empty() {
        bail!(
            "assistant '{}' is not defined in the config file and these options are missing: {}",
            name,
            missing.join(", ")
        );
    }

    Ok(AssistantConfig {
        name,
        description: overrides.description.clone().unwrap_or_default(),
        model: overrides.model.clone().unwrap_or_default(),
        instruction: overrides.instruction.clone().unwrap_or_default(),
        temperature: overrides.temperature.unwrap_or_default(),
        vector_store_name: overrides.vector_store_name.clone().unwrap_or_default(),
    })
}

pub async fn create_assistant<A>(
    api: &A,
    settings: &AssistantConfig,
    vector_store_id: Option<&str>,
) -> Result<Assistant>
where
    A: AssistantApi + VectorStoreApi + ?Sized,
{
    let vector_store_id = match vector_store_id {
        Some(id) => Some(id.to_string()),
        None if !settings.vector_store_name.is_empty() => Some(
            get_or_create_vector_store(api, &settings.vector_store_name)
                .await
                .context("failed to get or create vector store")?
                .id,
        ),
        None => None,
    };

    let request = AssistantRequest::new(settings, vector_store_id);
    let assistant = api
        .create_assistant(&request)
        .await
        .context("failed to create assistant; check the settings and retry")?;
    info!(
        assistant_id = %assistant.id,
        name = %settings.name,
        model = %settings.model,
        "created assistant"
    );
    Ok(assistant)
}

/// Uses the explicit ID, else finds the assistant by exact name.
pub async fn resolve_assistant_id<A: AssistantApi + ?Sized>(
    api: &A,
    id: Option<&str>,
    name: Option<&str>,
) -> Result<String> {
    if let Some(id) = id {
        return Ok(id.to_string());
    }
    let Some(name) = name else {
        bail!("specify --assistant-id or --assistant-name to chat with an assistant");
    };

    let assistants = api
        .list_assistants(ASSISTANT_LIST_LIMIT)
        .await
        .context("failed to list assistants")?;
    assistants
        .into_iter()
        .find(|assistant| assistant.name.as_deref() == Some(name))
        .map(|assistant| assistant.id)
        .with_context(|| format!("no assistant named '{name}' was found"))
}

/// One chat completion using the assistant's model, instructions and
/// sampling settings.
pub async fn chat_with_assistant<A>(
    api: &A,
    assistant_id: &str,
    message: &str,
    temperature: Option<f64>,
) -> Result<String>
where
    A: AssistantApi + ChatGateway + ?Sized,
{
    let assistant = api
        .retrieve_assistant(assistant_id)
        .await
        .with_context(|| format!("failed to retrieve assistant ({assistant_id})"))?;

    let mut messages = Vec::new();
    if let Some(instructions) = assistant.instructions.as_deref().filter(|text| !text.is_empty()) {
        messages.push(Message::system(instructions));
    }
    messages.push(Message::user(message));

    let mut request = ChatRequest::new(assistant.model.clone(), messages);
    request.temperature = temperature
        .filter(|value| *value != 0.0)
        .map(|value| value as f32);
    request.top_p = assistant.top_p;

    let reply = api.chat(request).await.context("assistant chat failed")?;
    Ok(reply.content)
}

/// How long to wait between run status checks, and for how long in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

/// Polls until the run leaves `queued`/`in_progress`. Anything other than
/// `completed` is an error, as is exceeding the deadline.
pub async fn wait_for_run<A: AssistantApi + ?Sized>(
    api: &A,
    thread_id: &str,
    mut run: Run,
    policy: PollPolicy,
) -> Result<Run, ApiError> {
    let started = Instant::now();
    while run.status.is_pending() {
        if started.elapsed() >= policy.deadline {
            return Err(ApiError::RunTimedOut {
                run_id: run.id,
                waited_secs: started.elapsed().as_secs(),
            });
        }
        tokio::time::sleep(policy.interval).await;
        run = api.retrieve_run(thread_id, &run.id).await?;
        debug!(run_id = %run.id, status = run.status.as_str(), "polled run status");
    }

    if run.status != RunStatus::Completed {
        return Err(ApiError::RunFailed {
            run_id: run.id,
            status: run.status.as_str().to_string(),
        });
    }
    Ok(run)
}

/// Posts one user message to the thread, runs the assistant and returns its
/// newest reply, if any.
pub async fn send_thread_turn<A: AssistantApi + ?Sized>(
    api: &A,
    thread_id: &str,
    assistant_id: &str,
    text: &str,
    policy: PollPolicy,
) -> Result<Option<String>> {
    api.add_thread_message(thread_id, text)
        .await
        .context("failed to send user message")?;
    let run = api
        .create_run(thread_id, assistant_id)
        .await
        .context("failed to start assistant run")?;
    info!(run_id = %run.id, "started run");

    let run = wait_for_run(api, thread_id, run, policy).await?;
    info!(run_id = %run.id, status = run.status.as_str(), "run finished");

    let messages = api
        .list_thread_messages(thread_id)
        .await
        .context("failed to list thread messages")?;
    Ok(messages
        .iter()
        .filter(|message| message.role == "assistant")
        .find_map(|message| message.first_text().map(str::to_string)))
}
