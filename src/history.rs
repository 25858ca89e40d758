use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::message::Message;

pub const HISTORY_EXTENSION: &str = "json";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history name is empty")]
    EmptyName,

    #[error("failed to read history file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse history file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize conversation history")]
    Serialize(#[source] serde_json::Error),

    #[error("failed to write history file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Appends `.json` when the final component has no `.` at all, so `x` and
/// `x.json` address the same file. Dotfiles such as `.notes` are kept as is.
pub fn normalize_history_name(name: &Path) -> PathBuf {
    let has_extension = name
        .file_name()
        .is_some_and(|file_name| file_name.to_string_lossy().contains('.'));
    if has_extension {
        return name.to_path_buf();
    }
    let mut normalized = name.as_os_str().to_owned();
    normalized.push(".");
    normalized.push(HISTORY_EXTENSION);
    PathBuf::from(normalized)
}

/// Places a history name under the log directory. Absolute names are kept.
pub fn resolve_history_path(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(name)
}

/// File name used when `autoSaveLogs` is on and no history name was given.
pub fn auto_history_name(now: DateTime<Local>) -> String {
    format!("log_{}.{HISTORY_EXTENSION}", now.format("%Y%m%d_%H%M%S%.3f"))
}

/// An empty name or a missing file both mean "no prior conversation".
pub fn load_conversation_history(name: impl AsRef<Path>) -> Result<Vec<Message>, HistoryError> {
    let name = name.as_ref();
    if name.as_os_str().is_empty() {
        return Ok(Vec::new());
    }

    let path = normalize_history_name(name);
    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no history file yet");
            return Ok(Vec::new());
        }
        Err(source) => return Err(HistoryError::Read { path, source }),
    };

    let messages: Vec<Message> =
        serde_json::from_slice(&data).map_err(|source| HistoryError::Parse {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), messages = messages.len(), "loaded conversation history");
    Ok(messages)
}

/// Rewrites the whole history file. The data goes to an owner-only temp file
/// first and is renamed over the target.
pub fn save_conversation_history(
    name: impl AsRef<Path>,
    messages: &[Message],
) -> Result<(), HistoryError> {
    let name = name.as_ref();
    if name.as_os_str().is_empty() {
        return Err(HistoryError::EmptyName);
    }

    let path = normalize_history_name(name);
    let data = serde_json::to_vec_pretty(messages).map_err(HistoryError::Serialize)?;
    write_private_atomic(&path, &data)?;
    debug!(path = %path.display(), messages = messages.len(), "saved conversation history");
    Ok(())
}

fn write_private_atomic(path: &Path, data: &[u8]) -> Result<(), HistoryError> {
    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent_dir).map_err(|source| HistoryError::Write {
        path: parent_dir.to_path_buf(),
        source,
    })?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("history.json");
    let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", std::process::id()));
    let _ = fs::remove_file(&temp_path);

    let write_temp = || -> std::io::Result<()> {
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()
    };

    if let Err(source) = write_temp().and_then(|()| fs::rename(&temp_path, path)) {
        let _ = fs::remove_file(&temp_path);
        return Err(HistoryError::Write {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// `[index] role: content` lines for display.
pub fn render_history(messages: &[Message]) -> String {
    if messages.is_empty() {
        return "(history is empty)\n".to_string();
    }

    let mut rendered = String::new();
    for (idx, msg) in messages.iter().enumerate() {
        rendered.push_str(&format!(
            "[{}] {}: {}\n",
            idx,
            msg.role.as_str(),
            msg.display_content()
        ));
    }
    rendered
}
