use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RuntimeSettings;
use crate::message::Message;
use crate::model_gateway::{ApiFuture, ChatGateway, ChatReply, ChatRequest};
use crate::providers::http_errors::{ApiError, api_request_error};
use crate::resources::assistants::{
    Assistant, AssistantApi, AssistantRequest, Run, Thread, ThreadMessage,
};
use crate::resources::files::{FileApi, RemoteFile};
use crate::resources::vector_stores::{VectorStore, VectorStoreApi, VectorStoreFile};

const ASSISTANTS_BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Serialize)]
struct NamedBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct FileIdBody<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ThreadMessageBody<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RunBody<'a> {
    assistant_id: &'a str,
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// HTTP client for the hosted OpenAI-compatible API.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: String,
    timeout_secs: u64,
}

impl OpenAiClient {
    pub fn new(settings: &RuntimeSettings, timeout_secs: u64) -> Result<Self, ApiError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ApiError::MissingApiKey)?;
        // Zero disables the request timeout.
        let mut builder = Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let http = builder.build().map_err(ApiError::Client)?;

        Ok(Self {
            http,
            base_url: settings.api_base_url.clone(),
            api_key,
            timeout_secs,
        })
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.api_key)
            .header(ASSISTANTS_BETA_HEADER.0, ASSISTANTS_BETA_HEADER.1)
    }

    async fn send_raw(&self, request: RequestBuilder, url: &str) -> Result<reqwest::Response, ApiError> {
        let response = self.authorized(request).send().await.map_err(|err| {
            warn!(api_url = %url, error = %err, "api request failed");
            api_request_error(err, url, self.timeout_secs)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read response body>".to_string());
            warn!(
                api_url = %url,
                status = %status,
                response_body_len = body.len(),
                "api returned non-success status"
            );
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> Result<T, ApiError> {
        let response = self.send_raw(request, url).await?;
        response.json().await.map_err(|source| ApiError::Decode {
            url: url.to_string(),
            source,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(api_url = %url, "GET");
        self.send_json(self.http.get(&url), &url).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(api_url = %url, "POST");
        self.send_json(self.http.post(&url).json(body), &url).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let url = self.url(path);
        debug!(api_url = %url, "DELETE");
        self.send_raw(self.http.delete(&url), &url).await?;
        Ok(())
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ApiError> {
        let body = ChatCompletionBody {
            model: &request.model,
            messages: &request.messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };
        debug!(
            model = %request.model,
            message_count = request.messages.len(),
            "sending chat completion request"
        );

        let parsed: ChatCompletionResponse = self.post("chat/completions", &body).await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(ApiError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default();
        debug!(
            model = %request.model,
            response_len = content.len(),
            "received chat completion"
        );
        Ok(ChatReply { content })
    }

    async fn upload(&self, path: &Path, purpose: &str) -> Result<RemoteFile, ApiError> {
        let bytes = std::fs::read(path).map_err(|source| ApiError::UploadRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let form = Form::new()
            .text("purpose", purpose.to_string())
            .part("file", Part::bytes(bytes).file_name(file_name));

        let url = self.url("files");
        debug!(api_url = %url, path = %path.display(), purpose, "uploading file");
        self.send_json(self.http.post(&url).multipart(form), &url)
            .await
    }
}

impl ChatGateway for OpenAiClient {
    fn chat<'a>(&'a self, request: ChatRequest) -> ApiFuture<'a, ChatReply> {
        Box::pin(self.complete(request))
    }
}

impl FileApi for OpenAiClient {
    fn upload_file<'a>(&'a self, path: &'a Path, purpose: &'a str) -> ApiFuture<'a, RemoteFile> {
        Box::pin(self.upload(path, purpose))
    }

    fn list_files<'a>(&'a self) -> ApiFuture<'a, Vec<RemoteFile>> {
        Box::pin(async move {
            let list: ListResponse<RemoteFile> = self.get("files").await?;
            Ok::<_, ApiError>(list.data)
        })
    }

    fn delete_file<'a>(&'a self, file_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.delete(&format!("files/{file_id}")).await })
    }
}

impl VectorStoreApi for OpenAiClient {
    fn create_vector_store<'a>(&'a self, name: &'a str) -> ApiFuture<'a, VectorStore> {
        Box::pin(async move {
            self.post::<_, VectorStore>("vector_stores", &NamedBody { name })
                .await
        })
    }

    fn list_vector_stores<'a>(&'a self) -> ApiFuture<'a, Vec<VectorStore>> {
        Box::pin(async move {
            let list: ListResponse<VectorStore> = self.get("vector_stores").await?;
            Ok::<_, ApiError>(list.data)
        })
    }

    fn retrieve_vector_store<'a>(&'a self, vector_store_id: &'a str) -> ApiFuture<'a, VectorStore> {
        Box::pin(async move {
            self.get::<VectorStore>(&format!("vector_stores/{vector_store_id}"))
                .await
        })
    }

    fn delete_vector_store<'a>(&'a self, vector_store_id: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { self.delete(&format!("vector_stores/{vector_store_id}")).await })
    }

    fn add_file_to_vector_store<'a>(
        &'a self,
        vector_store_id: &'a str,
        file_id: &'a str,
    ) -> ApiFuture<'a, VectorStoreFile> {
        Box::pin(async move {
            self.post::<_, VectorStoreFile>(
                &format!("vector_stores/{vector_store_id}/files"),
                &FileIdBody { file_id },
            )
            .await
        })
    }
}

impl AssistantApi for OpenAiClient {
    fn create_assistant<'a>(&'a self, request: &'a AssistantRequest) -> ApiFuture<'a, Assistant> {
        Box::pin(async move { self.post::<_, Assistant>("assistants", request).await })
    }

    fn list_assistants<'a>(&'a self, limit: u32) -> ApiFuture<'a, Vec<Assistant>> {
        Box::pin(async move {
            let list: ListResponse<Assistant> = self
                .get(&format!("assistants?order=desc&limit={limit}"))
                .await?;
            Ok::<_, ApiError>(list.data)
        })
    }

    fn retrieve_assistant<'a>(&'a self, assistant_id: &'a str) -> ApiFuture<'a, Assistant> {
        Box::pin(async move { self.get::<Assistant>(&format!("assistants/{assistant_id}")).await })
    }

    fn create_thread<'a>(&'a self) -> ApiFuture<'a, Thread> {
        Box::pin(async move { self.post::<_, Thread>("threads", &serde_json::json!({})).await })
    }

    fn add_thread_message<'a>(&'a self, thread_id: &'a str, content: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move {
            let _: serde_json::Value = self
                .post(
                    &format!("threads/{thread_id}/messages"),
                    &ThreadMessageBody {
                        role: "user",
                        content,
                    },
                )
                .await?;
            Ok::<_, ApiError>(())
        })
    }

    fn create_run<'a>(&'a self, thread_id: &'a str, assistant_id: &'a str) -> ApiFuture<'a, Run> {
        Box::pin(async move {
            self.post::<_, Run>(&format!("threads/{thread_id}/runs"), &RunBody { assistant_id })
                .await
        })
    }

    fn retrieve_run<'a>(&'a self, thread_id: &'a str, run_id: &'a str) -> ApiFuture<'a, Run> {
        Box::pin(async move {
            self.get::<Run>(&format!("threads/{thread_id}/runs/{run_id}"))
                .await
        })
    }

    fn list_thread_messages<'a>(&'a self, thread_id: &'a str) -> ApiFuture<'a, Vec<ThreadMessage>> {
        Box::pin(async move {
            let list: ListResponse<ThreadMessage> = self
                .get(&format!("threads/{thread_id}/messages?order=desc"))
                .await?;
            Ok::<_, ApiError>(list.data)
        })
    }
}
