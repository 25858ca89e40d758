use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::prompt::PromptConfig;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("unsupported image format '{extension}' for attachment {}", .path.display())]
    UnsupportedImageFormat { path: PathBuf, extension: String },

    #[error("failed to read attachment {}", .path.display())]
    AttachmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

/// Plain text, or a list of parts for inline images. Serialized the way the
/// chat completions API expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// A user message carrying one inline image as a data URL.
    pub fn user_image(mime_type: &str, base64_data: &str) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(vec![ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{mime_type};base64,{base64_data}"),
                },
            }]),
        }
    }

    /// One-line human readable rendering; images show as their MIME type.
    pub fn display_content(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text.clone(),
                    ContentPart::ImageUrl { image_url } => {
                        format!("[image: {}]", data_url_mime(&image_url.url))
                    }
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn data_url_mime(url: &str) -> &str {
    url.strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .filter(|mime| !mime.is_empty())
        .unwrap_or("url")
}

/// Converts a resolved prompt into the ordered messages for one turn:
/// system (if any), user text (if any), then one message per attachment.
pub fn create_messages(prompt: &PromptConfig) -> Result<Vec<Message>, MessageError> {
    let mut messages = Vec::new();

    if !prompt.system.is_empty() {
        messages.push(Message::system(prompt.system.clone()));
    }

    if !prompt.user.is_empty() {
        messages.push(Message::user(prompt.user.clone()));
    }

    for attachment in &prompt.attachments {
        let path = Path::new(attachment);
        let (mime_type, data) = encode_image(path)?;
        debug!(
            attachment = %path.display(),
            mime_type,
            encoded_len = data.len(),
            "encoded image attachment"
        );
        messages.push(Message::user_image(mime_type, &data));
    }

    Ok(messages)
}

/// MIME type from the file extension alone; the bytes are never inspected.
pub fn image_mime_type(path: &Path) -> Result<&'static str, MessageError> {
    let extension = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "png" => Ok("image/png"),
        "gif" => Ok("image/gif"),
        _ => Err(MessageError::UnsupportedImageFormat {
            path: path.to_path_buf(),
            extension: format!(".{extension}"),
        }),
    }
}

fn encode_image(path: &Path) -> Result<(&'static str, String), MessageError> {
    let mime_type = image_mime_type(path)?;
    let bytes = fs::read(path).map_err(|source| MessageError::AttachmentRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((mime_type, STANDARD.encode(bytes)))
}
