use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::model_gateway::ApiFuture;
use crate::resources::vector_stores::{
    VectorStoreApi, add_files_to_vector_store, resolve_vector_store,
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub bytes: u64,
}

pub trait FileApi {
    fn upload_file<'a>(&'a self, path: &'a Path, purpose: &'a str) -> ApiFuture<'a, RemoteFile>;
    fn list_files<'a>(&'a self) -> ApiFuture<'a, Vec<RemoteFile>>;
    fn delete_file<'a>(&'a self, file_id: &'a str) -> ApiFuture<'a, ()>;
}

pub async fn upload_file<A: FileApi + ?Sized>(
    api: &A,
    path: &Path,
    purpose: &str,
) -> Result<RemoteFile> {
    if !path.is_file() {
        bail!("file not found: {}", path.display());
    }

    let uploaded = api
        .upload_file(path, purpose)
        .await
        .with_context(|| format!("failed to upload {}", path.display()))?;
    info!(file_id = %uploaded.id, path = %path.display(), purpose, "uploaded file");
    Ok(uploaded)
}

/// Uploads every path in order and returns the new file IDs. Stops at the
/// first failure.
pub async fn upload_files<A, W>(
    api: &A,
    paths: &[PathBuf],
    purpose: &str,
    out: &mut W,
) -> Result<Vec<String>>
where
    A: FileApi + ?Sized,
    W: Write,
{
    let mut file_ids = Vec::with_capacity(paths.len());
    for path in paths {
        let uploaded = upload_file(api, path, purpose).await?;
        writeln!(out, "Uploaded file. File ID: {}", uploaded.id)?;
        file_ids.push(uploaded.id);
    }
    Ok(file_ids)
}

pub async fn list_files<A: FileApi + ?Sized, W: Write>(api: &A, out: &mut W) -> Result<()> {
    let files = api.list_files().await.context("failed to list files")?;
    writeln!(out, "Uploaded files:")?;
    for file in files {
        writeln!(
            out,
            "- ID: {}, name: {}, status: {}",
            file.id, file.filename, file.status
        )?;
    }
    Ok(())
}

pub async fn delete_file<A: FileApi + ?Sized, W: Write>(
    api: &A,
    file_id: &str,
    out: &mut W,
) -> Result<()> {
    api.delete_file(file_id)
        .await
        .with_context(|| format!("failed to delete file {file_id}"))?;
    writeln!(out, "Deleted file. File ID: {file_id}")?;
    Ok(())
}

/// Deletes every remote file whose name matches a glob-style pattern.
/// Individual failures are collected and reported together.
pub async fn delete_files_by_name<A: FileApi + ?Sized, W: Write>(
    api: &A,
    pattern: &str,
    out: &mut W,
) -> Result<()> {
    let matcher = glob::Pattern::new(pattern)
        .with_context(|| format!("invalid file name pattern '{pattern}'"))?;
    let files = api.list_files().await.context("failed to list files")?;

    let mut failures = Vec::new();
    for file in files.iter().filter(|file| matcher.matches(&file.filename)) {
        match api.delete_file(&file.id).await {
            Ok(()) => writeln!(
                out,
                "Deleted file. Name: {}, File ID: {}",
                file.filename, file.id
            )?,
            Err(err) => {
                warn!(file_id = %file.id, error = %err, "file deletion failed");
                failures.push(format!("{} ({}): {}", file.filename, file.id, err));
            }
        }
    }

    if !failures.is_empty() {
        bail!(
            "failed to delete {} file(s): {}",
            failures.len(),
            failures.join("; ")
        );
    }
    Ok(())
}

/// Uploads the files, then adds them to a vector store: the one with the
/// given ID (checked before anything is uploaded), else the named one
/// (created on demand). Returns the vector store ID.
pub async fn upload_and_add_files<A, W>(
    api: &A,
    paths: &[PathBuf],
    purpose: &str,
    vector_store_id: Option<&str>,
    vector_store_name: Option<&str>,
    out: &mut W,
) -> Result<String>
where
    A: FileApi + VectorStoreApi + ?Sized,
    W: Write,
{
    let existing = match vector_store_id.filter(|id| !id.is_empty()) {
        Some(id) => Some(resolve_vector_store(api, Some(id), None).await?),
        None => None,
    };

    let file_ids = upload_files(api, paths, purpose, out).await?;

    let store = match existing {
        Some(store) => store,
        None => {
            let name = vector_store_name
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| {
                    format!("Auto-Generated Vector Store {}", Utc::now().timestamp())
                });
            resolve_vector_store(api, None, Some(&name)).await?
        }
    };
    writeln!(out, "Using vector store: ID={}, Name={}", store.id, store.name)?;

    add_files_to_vector_store(api, &store.id, &file_ids).await?;
    writeln!(out, "Added files to vector store: VectorStoreID={}", store.id)?;
    Ok(store.id)
}
