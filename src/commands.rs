use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::info;

use crate::cli::{Options, non_empty};
use crate::config::{ConfigDocument, RuntimeSettings};
use crate::model_gateway::ChatGateway;
use crate::repl::run_assistant_repl;
use crate::resources::assistants::{
    AssistantApi, PollPolicy, chat_with_assistant, create_assistant, merge_assistant_settings,
    resolve_assistant_id,
};
use crate::resources::files::{
    FileApi, delete_file, delete_files_by_name, list_files, upload_and_add_files, upload_files,
};
use crate::resources::vector_stores::{VectorStoreApi, run_vector_store_action};

/// Everything the resource commands need from the hosted service.
pub trait ResourceApi: FileApi + VectorStoreApi + AssistantApi + ChatGateway {}

impl<T> ResourceApi for T where T: FileApi + VectorStoreApi + AssistantApi + ChatGateway + ?Sized {}

pub fn poll_policy(settings: &RuntimeSettings) -> PollPolicy {
    PollPolicy {
        interval: settings.poll_interval,
        deadline: settings.poll_deadline,
    }
}

/// Runs every resource command requested on the command line, in a fixed
/// order: file commands, vector store action, assistant creation, assistant chat.
pub async fn run_resource_commands<A, R, W>(
    api: &A,
    options: &Options,
    config: &ConfigDocument,
    policy: PollPolicy,
    input: &mut R,
    out: &mut W,
) -> Result<()>
where
    A: ResourceApi + ?Sized,
    R: BufRead,
    W: Write,
{
    let upload_paths = options.upload_paths();
    if !upload_paths.is_empty() {
        upload_files(api, &upload_paths, &options.upload_purpose, out).await?;
    }

    let upload_and_add_paths = options.upload_and_add_paths();
    if !upload_and_add_paths.is_empty() {
        upload_and_add_files(
            api,
            &upload_and_add_paths,
            &options.upload_purpose,
            non_empty(&options.vector_store_id).as_deref(),
            non_empty(&options.vector_store_name).as_deref(),
            out,
        )
        .await?;
    }

    if options.list_files {
        list_files(api, out).await?;
    }

    if let Some(file_id) = non_empty(&options.delete_file_id) {
        delete_file(api, &file_id, out).await?;
    }

    if let Some(pattern) = non_empty(&options.delete_file_name) {
        delete_files_by_name(api, &pattern, out).await?;
    }

    if let Some(action) = options.vector_store_action {
        run_vector_store_action(api, action, &options.vector_store_args(), out).await?;
    }

    if options.create_assistant {
        let settings = merge_assistant_settings(config, &options.assistant_overrides())?;
        let vector_store_id = non_empty(&options.vector_store_id);
        let assistant = create_assistant(api, &settings, vector_store_id.as_deref()).await?;
        writeln!(
            out,
            "Created assistant: ID={}, Name={}",
            assistant.id, settings.name
        )?;
    }

    if options.assistant {
        let assistant_id = resolve_assistant_id(
            api,
            non_empty(&options.assistant_id).as_deref(),
            non_empty(&options.assistant_name).as_deref(),
        )
        .await?;
        info!(assistant_id = %assistant_id, "chatting with assistant");

        match non_empty(&options.message) {
            Some(message) => {
                let reply =
                    chat_with_assistant(api, &assistant_id, &message, options.temperature).await?;
                writeln!(out, "{}", reply.trim())?;
            }
            None => run_assistant_repl(api, &assistant_id, policy, input, out).await?,
        }
    }

    Ok(())
}
