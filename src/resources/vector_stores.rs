use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::io::Write;
use tracing::info;

use crate::model_gateway::ApiFuture;
use crate::providers::ApiError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VectorStore {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VectorStoreFile {
    pub id: String,
    #[serde(default)]
    pub vector_store_id: String,
    #[serde(default)]
    pub status: String,
}

pub trait VectorStoreApi {
    fn create_vector_store<'a>(&'a self, name: &'a str) -> ApiFuture<'a, VectorStore>;
    fn list_vector_stores<'a>(&'a self) -> ApiFuture<'a, Vec<VectorStore>>;
    fn retrieve_vector_store<'a>(&'a self, vector_store_id: &'a str) -> ApiFuture<'a, VectorStore>;
    fn delete_vector_store<'a>(&'a self, vector_store_id: &'a str) -> ApiFuture<'a, ()>;
    fn add_file_to_vector_store<'a>(
        &'a self,
        vector_store_id: &'a str,
        file_id: &'a str,
    ) -> ApiFuture<'a, VectorStoreFile>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VectorStoreAction {
    Create,
    List,
    Delete,
    AddFile,
}

#[derive(Debug, Clone, Default)]
pub struct VectorStoreArgs {
    pub name: Option<String>,
    pub id: Option<String>,
    pub file_id: Option<String>,
    pub file_ids: Vec<String>,
}

/// Returns the first store named `name`, creating one when none exists.
pub async fn get_or_create_vector_store<A: VectorStoreApi + ?Sized>(
    api: &A,
    name: &str,
) -> Result<VectorStore, ApiError> {
    let stores = api.list_vector_stores().await?;
    if let Some(existing) = stores.into_iter().find(|store| store.name == name) {
        info!(vector_store_id = %existing.id, name, "reusing vector store");
        return Ok(existing);
    }

    let created = api.create_vector_store(name).await?;
    info!(vector_store_id = %created.id, name, "created vector store");
    Ok(created)
}

/// Looks a store up by id, or by name (creating it if needed).
pub async fn resolve_vector_store<A: VectorStoreApi + ?Sized>(
    api: &A,
    id: Option<&str>,
    name: Option<&str>,
) -> Result<VectorStore> {
    if let Some(id) = id {
        return api
            .retrieve_vector_store(id)
            .await
            .with_context(|| format!("failed to retrieve vector store (ID: {id})"));
    }
    if let Some(name) = name {
        return get_or_create_vector_store(api, name)
            .await
            .with_context(|| format!("failed to get or create vector store '{name}'"));
    }
    bail!("specify a vector store ID or name (--vector-store-id or --vector-store-name)")
}

pub async fn add_files_to_vector_store<A: VectorStoreApi + ?Sized>(
    api: &A,
    vector_store_id: &str,
    file_ids: &[String],
) -> Result<()> {
    for file_id in file_ids {
        api.add_file_to_vector_store(vector_store_id, file_id)
            .await
            .with_context(|| format!("failed to add file {file_id} to vector store"))?;
    }
    Ok(())
}

pub async fn run_vector_store_action<A, W>(
    api: &A,
    action: VectorStoreAction,
    args: &VectorStoreArgs,
    out: &mut W,
) -> Result<()>
where
    A: VectorStoreApi + ?Sized,
    W: Write,
{
    match action {
        VectorStoreAction::Create => {
            let Some(name) = args.name.as_deref() else {
                bail!("specify the vector store name (--vector-store-name)");
            };
            let store = api
                .create_vector_store(name)
                .await
                .context("failed to create vector store")?;
            writeln!(out, "Created vector store: ID={}, Name={}", store.id, store.name)?;
        }
        VectorStoreAction::List => {
            let stores = api
                .list_vector_stores()
                .await
                .context("failed to list vector stores")?;
            for store in stores {
                writeln!(
                    out,
                    "ID: {}, Name: {}, Status: {}",
                    store.id, store.name, store.status
                )?;
            }
        }
        VectorStoreAction::Delete => {
            let Some(id) = args.id.as_deref() else {
                bail!("specify the vector store ID to delete (--vector-store-id)");
            };
            api.delete_vector_store(id)
                .await
                .context("failed to delete vector store")?;
            writeln!(out, "Deleted vector store. ID: {id}")?;
        }
        VectorStoreAction::AddFile => {
            let Some(id) = args.id.as_deref() else {
                bail!("specify the vector store ID and file ID(s) (--vector-store-id, --file-id or --file-ids)");
            };
            if let Some(file_id) = args.file_id.as_deref() {
                let added = api
                    .add_file_to_vector_store(id, file_id)
                    .await
                    .context("failed to add file to vector store")?;
                writeln!(
                    out,
                    "Added file to vector store: FileID={}, VectorStoreID={}",
                    added.id, added.vector_store_id
                )?;
            } else if !args.file_ids.is_empty() {
                add_files_to_vector_store(api, id, &args.file_ids).await?;
                writeln!(
                    out,
                    "Added {} files to vector store: VectorStoreID={}",
                    args.file_ids.len(),
                    id
                )?;
            } else {
                bail!("specify file ID(s) to add (--file-id or --file-ids)");
            }
        }
    }
    Ok(())
}
