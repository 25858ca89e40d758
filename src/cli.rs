use clap::Parser;
use std::path::PathBuf;

use crate::prompt::{PromptOverrides, split_list};
use crate::resources::assistants::AssistantOverrides;
use crate::resources::vector_stores::{VectorStoreAction, VectorStoreArgs};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_UPLOAD_PURPOSE: &str = "assistants";

#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "gpt-cli",
    about = "Compose prompts from presets, files and images and send them to a chat model",
    disable_version_flag = true
)]
pub struct Options {
    /// Prompt preset from the config file
    #[arg(short = 'p', long = "prompt", default_value = "")]
    pub prompt: String,

    /// Replace the system message
    #[arg(short = 's', long = "system", default_value = "")]
    pub system: String,

    /// Replace the user message
    #[arg(short = 'u', long = "user", default_value = "")]
    pub user: String,

    /// Comma-separated image files to attach
    #[arg(short = 'i', long = "images", default_value = "")]
    pub images: String,

    /// Config file path
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Model to use
    #[arg(short = 'm', long = "model", default_value = "")]
    pub model: String,

    /// Enable debug logging
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Print the version and exit
    #[arg(long = "version")]
    pub version: bool,

    /// Append every file under the current directory to the user message
    #[arg(long = "collect")]
    pub collect: bool,

    /// History file name under the log directory (extension optional)
    #[arg(long = "history", default_value = "")]
    pub history: String,

    /// Request timeout in seconds
    #[arg(short = 't', long = "timeout", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout: u64,

    /// Comma-separated files (glob patterns allowed) to append to the user message
    #[arg(short = 'f', long = "files", default_value = "")]
    pub files: String,

    /// Print a saved history file and exit
    #[arg(long = "show-history", default_value = "")]
    pub show_history: String,

    /// Comma-separated tool names
    #[arg(long = "tools", default_value = "")]
    pub tools: String,

    /// Comma-separated files to upload
    #[arg(long = "upload-file", default_value = "")]
    pub upload_file: String,

    /// Purpose recorded for uploaded files
    #[arg(long = "upload-purpose", default_value = DEFAULT_UPLOAD_PURPOSE)]
    pub upload_purpose: String,

    /// Comma-separated files to upload and add to a vector store
    #[arg(long = "upload-and-add-files", default_value = "")]
    pub upload_and_add_files: String,

    /// List uploaded files
    #[arg(long = "list-files")]
    pub list_files: bool,

    /// Delete the uploaded file with this ID
    #[arg(long = "delete-file-id", default_value = "")]
    pub delete_file_id: String,

    /// Delete uploaded files whose name matches this pattern
    #[arg(long = "delete-file-name", default_value = "")]
    pub delete_file_name: String,

    #[arg(long = "vector-store-action", value_enum)]
    pub vector_store_action: Option<VectorStoreAction>,

    #[arg(long = "vector-store-name", default_value = "")]
    pub vector_store_name: String,

    #[arg(long = "vector-store-id", default_value = "")]
    pub vector_store_id: String,

    #[arg(long = "file-id", default_value = "")]
    pub file_id: String,

    /// Comma-separated file IDs
    #[arg(long = "file-ids", default_value = "")]
    pub file_ids: String,

    /// Create an assistant
    #[arg(long = "create-assistant")]
    pub create_assistant: bool,

    /// Chat with an assistant
    #[arg(long = "assistant")]
    pub assistant: bool,

    #[arg(long = "assistant-id", default_value = "")]
    pub assistant_id: String,

    #[arg(long = "assistant-name", default_value = "")]
    pub assistant_name: String,

    #[arg(long = "assistant-description", default_value = "")]
    pub assistant_description: String,

    #[arg(long = "instruction", default_value = "")]
    pub instruction: String,

    #[arg(long = "temperature")]
    pub temperature: Option<f64>,

    /// Single message for the assistant; without it the chat is interactive
    #[arg(long = "message", default_value = "")]
    pub message: String,

    /// Extra words appended to the user message
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// Empty flag values mean "not given".
pub fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn paths(raw: &str) -> Vec<PathBuf> {
    split_list(raw).into_iter().map(PathBuf::from).collect()
}

impl Options {
    pub fn prompt_overrides(&self) -> PromptOverrides {
        PromptOverrides {
            preset: non_empty(&self.prompt),
            system: non_empty(&self.system),
            user: non_empty(&self.user),
            model: non_empty(&self.model),
            attachments: split_list(&self.images),
            collect_files: self.collect,
            files: non_empty(&self.files),
            tools: split_list(&self.tools),
        }
    }

    pub fn assistant_overrides(&self) -> AssistantOverrides {
        AssistantOverrides {
            name: non_empty(&self.assistant_name),
            description: non_empty(&self.assistant_description),
            model: non_empty(&self.model),
            instruction: non_empty(&self.instruction),
            temperature: self.temperature,
            vector_store_name: non_empty(&self.vector_store_name),
            vector_store_id: non_empty(&self.vector_store_id),
        }
    }

    pub fn vector_store_args(&self) -> VectorStoreArgs {
        VectorStoreArgs {
            name: non_empty(&self.vector_store_name),
            id: non_empty(&self.vector_store_id),
            file_id: non_empty(&self.file_id),
            file_ids: split_list(&self.file_ids),
        }
    }

    pub fn upload_paths(&self) -> Vec<PathBuf> {
        paths(&self.upload_file)
    }

    pub fn upload_and_add_paths(&self) -> Vec<PathBuf> {
        paths(&self.upload_and_add_files)
    }

    /// True when the invocation manages remote resources instead of chatting.
    pub fn has_resource_command(&self) -> bool {
        !self.upload_file.is_empty()
            || !self.upload_and_add_files.is_empty()
            || self.list_files
            || !self.delete_file_id.is_empty()
            || !self.delete_file_name.is_empty()
            || self.vector_store_action.is_some()
            || self.create_assistant
            || self.assistant
    }
}
