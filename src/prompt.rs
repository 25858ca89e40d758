use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::ConfigDocument;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
const VCS_DIR_NAME: &str = ".git";
const BLOCK_SEPARATOR: &str = "\n\n";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt preset '{0}' is not defined in the config file")]
    UnknownPreset(String),

    #[error("failed to read file {}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to collect files under {}", .path.display())]
    Collect {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid file pattern '{pattern}'")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// Instructions for a single invocation. Also the shape of a preset in the
/// config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct PromptConfig {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: Option<u32>,
    pub attachments: Vec<String>,
    pub tools: Vec<String>,
}

/// Command-line inputs to resolution. `None` means the flag was not given.
#[derive(Debug, Clone, Default)]
pub struct PromptOverrides {
    pub preset: Option<String>,
    pub system: Option<String>,
    pub user: Option<String>,
    pub model: Option<String>,
    pub attachments: Vec<String>,
    pub collect_files: bool,
    pub files: Option<String>,
    pub tools: Vec<String>,
}

/// Merges the named preset with command-line overrides and collected file
/// contents. File blocks are read relative to the working directory.
pub fn resolve_prompt_config(
    config: &ConfigDocument,
    overrides: &PromptOverrides,
) -> Result<PromptConfig, PromptError> {
    resolve_prompt_config_in(config, overrides, Path::new("."))
}

pub fn resolve_prompt_config_in(
    config: &ConfigDocument,
    overrides: &PromptOverrides,
    root: &Path,
) -> Result<PromptConfig, PromptError> {
    let mut prompt = match overrides.preset.as_deref() {
        Some(name) => config
            .prompts
            .get(name)
            .cloned()
            .ok_or_else(|| PromptError::UnknownPreset(name.to_string()))?,
        None => PromptConfig::default(),
    };

    if let Some(system) = &overrides.system {
        prompt.system = system.clone();
    }
    if let Some(user) = &overrides.user {
        prompt.user = user.clone();
    }
    if let Some(model) = &overrides.model {
        prompt.model = model.clone();
    }
    if !overrides.attachments.is_empty() {
        prompt.attachments = overrides.attachments.clone();
    }

    if prompt.model.is_empty() {
        prompt.model = DEFAULT_MODEL.to_string();
    }

    if overrides.collect_files {
        let block = collect_files(root)?;
        append_block(&mut prompt.user, &block);
    }

    if let Some(files) = overrides.files.as_deref() {
        let block = read_files(root, files)?;
        append_block(&mut prompt.user, &block);
    }

    prompt.tools.extend(overrides.tools.iter().cloned());

    debug!(
        preset = overrides.preset.as_deref().unwrap_or("-"),
        model = %prompt.model,
        user_len = prompt.user.len(),
        attachments = prompt.attachments.len(),
        tools = prompt.tools.len(),
        "resolved prompt configuration"
    );
    Ok(prompt)
}

fn append_block(user: &mut String, block: &str) {
    user.push_str(BLOCK_SEPARATOR);
    user.push_str(block);
}

fn file_block(label: &str, content: &[u8]) -> String {
    format!(
        "File: {label}\nContent:\n{}\n\n",
        String::from_utf8_lossy(content)
    )
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, PromptError> {
    fs::read(path).map_err(|source| PromptError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

/// Concatenates every regular file under `root` (skipping `.git`) as
/// "path + content" blocks, in file-name order.
pub fn collect_files(root: &Path) -> Result<String, PromptError> {
    let mut block = String::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !(entry.file_type().is_dir() && entry.file_name() == VCS_DIR_NAME));

    for entry in walker {
        let entry = entry.map_err(|source| PromptError::Collect {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let content = read_bytes(path)?;
        let label = path.strip_prefix(root).unwrap_or(path);
        block.push_str(&file_block(&label.display().to_string(), &content));
    }

    Ok(block)
}

/// Reads a comma-separated list of files. Entries containing glob
/// metacharacters are expanded; a pattern that matches nothing adds nothing.
pub fn read_files(root: &Path, list: &str) -> Result<String, PromptError> {
    let mut block = String::new();

    for entry in split_list(list) {
        if entry.is_empty() {
            continue;
        }

        if is_glob_pattern(&entry) {
            let pattern = root.join(&entry).to_string_lossy().into_owned();
            let matches = glob::glob(&pattern).map_err(|source| PromptError::InvalidPattern {
                pattern: entry.clone(),
                source,
            })?;
            for matched in matches {
                let path = matched.map_err(|err| PromptError::FileRead {
                    path: err.path().to_path_buf(),
                    source: std::io::Error::new(err.error().kind(), err.to_string()),
                })?;
                if !path.is_file() {
                    continue;
                }
                let content = read_bytes(&path)?;
                let label = path.strip_prefix(root).unwrap_or(&path);
                block.push_str(&file_block(&label.display().to_string(), &content));
            }
        } else {
            let content = read_bytes(&root.join(&entry))?;
            block.push_str(&file_block(&entry, &content));
        }
    }

    Ok(block)
}

fn is_glob_pattern(entry: &str) -> bool {
    entry.contains(['*', '?', '['])
}

/// Splits a comma-separated flag value verbatim. An empty value yields no
/// entries.
pub fn split_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

/// Joins the `--user` text, trailing positional words and piped stdin into
/// one user message.
pub fn build_user_message(
    base: Option<String>,
    args: &[String],
    stdin: Option<String>,
) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    if let Some(base) = base.filter(|value| !value.is_empty()) {
        parts.push(base);
    }
    if !args.is_empty() {
        parts.push(args.join(" "));
    }
    if let Some(input) = stdin {
        let trimmed = input.trim();
        if !trimmed.is_empty() {
            parts.push(trimmed.to_string());
        }
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use super::{
        DEFAULT_MODEL, PromptConfig, PromptError, PromptOverrides, build_user_message,
        collect_files, read_files, resolve_prompt_config_in, split_list,
    };
    use crate::config::ConfigDocument;

    fn demo_config() -> ConfigDocument {
        let mut prompts = HashMap::new();
        prompts.insert(
            "demo".to_string(),
            PromptConfig {
                system: "be terse".to_string(),
                user: "hello".to_string(),
                ..PromptConfig::default()
            },
        );
        prompts.insert(
            "modelled".to_string(),
            PromptConfig {
                model: "gpt-4o".to_string(),
                user: "hi".to_string(),
                attachments: vec!["preset.png".to_string()],
                tools: vec!["search".to_string(), "code".to_string()],
                ..PromptConfig::default()
            },
        );
        ConfigDocument {
            prompts,
            ..ConfigDocument::default()
        }
    }

    fn preset(name: &str) -> PromptOverrides {
        PromptOverrides {
            preset: Some(name.to_string()),
            ..PromptOverrides::default()
        }
    }

    fn resolve(overrides: &PromptOverrides) -> Result<PromptConfig, PromptError> {
        resolve_prompt_config_in(&demo_config(), overrides, Path::new("."))
    }

    #[test]
    fn preset_without_model_gets_default_model() {
        let prompt = resolve(&preset("demo")).expect("demo should resolve");
        assert_eq!(prompt.model, DEFAULT_MODEL);
        assert_eq!(prompt.system, "be terse");
        assert_eq!(prompt.user, "hello");
    }

    #[test]
    fn model_precedence_is_cli_then_preset_then_default() {
        let from_preset = resolve(&preset("modelled")).expect("preset model");
        assert_eq!(from_preset.model, "gpt-4o");

        let from_cli = resolve(&PromptOverrides {
            model: Some("o3-mini".to_string()),
            ..preset("modelled")
        })
        .expect("cli model");
        assert_eq!(from_cli.model, "o3-mini");

        let no_preset = resolve(&PromptOverrides::default()).expect("no preset");
        assert_eq!(no_preset.model, DEFAULT_MODEL);
    }

    #[test]
    fn unknown_preset_is_an_error_naming_the_preset() {
        let err = resolve(&preset("missing")).expect_err("unknown preset should fail");
        assert!(matches!(&err, PromptError::UnknownPreset(name) if name == "missing"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn cli_user_replaces_preset_user() {
        let prompt = resolve(&PromptOverrides {
            user: Some("override".to_string()),
            ..preset("demo")
        })
        .expect("override should resolve");
        assert_eq!(prompt.user, "override");
        assert_eq!(prompt.system, "be terse");
    }

    #[test]
    fn cli_attachments_replace_preset_attachments() {
        let prompt = resolve(&PromptOverrides {
            attachments: vec!["a.png".to_string(), "b.jpg".to_string()],
            ..preset("modelled")
        })
        .expect("attachments should resolve");
        assert_eq!(prompt.attachments, vec!["a.png", "b.jpg"]);

        let kept = resolve(&preset("modelled")).expect("preset attachments");
        assert_eq!(kept.attachments, vec!["preset.png"]);
    }

    #[test]
    fn cli_tools_are_appended_without_deduplication() {
        let prompt = resolve(&PromptOverrides {
            tools: vec!["search".to_string(), "browse".to_string()],
            ..preset("modelled")
        })
        .expect("tools should resolve");
        assert_eq!(prompt.tools, vec!["search", "code", "search", "browse"]);
    }

    #[test]
    fn collect_appends_directory_files_after_blank_line() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("a.txt"), "X").expect("file should be written");

        let prompt = resolve_prompt_config_in(
            &demo_config(),
            &PromptOverrides {
                collect_files: true,
                ..preset("demo")
            },
            dir.path(),
        )
        .expect("collect should resolve");

        let appended = prompt
            .user
            .strip_prefix("hello\n\n")
            .expect("collected block should follow a blank line");
        assert!(appended.contains("a.txt"), "got {appended:?}");
        assert!(appended.contains('X'), "got {appended:?}");
    }

    #[test]
    fn collect_skips_git_directory_and_walks_subdirectories() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::create_dir_all(dir.path().join(".git")).expect(".git should be created");
        fs::write(dir.path().join(".git").join("HEAD"), "ref: main").expect("HEAD");
        fs::create_dir_all(dir.path().join("src")).expect("src should be created");
        fs::write(dir.path().join("src").join("lib.rs"), "fn lib() {}").expect("lib.rs");
        fs::write(dir.path().join("b.txt"), "second").expect("b.txt");

        let block = collect_files(dir.path()).expect("collect should succeed");
        assert!(!block.contains("ref: main"), "got {block:?}");
        assert!(block.contains("fn lib() {}"));
        assert!(block.contains("second"));
        let b_index = block.find("b.txt").expect("b.txt listed");
        let src_index = block.find("lib.rs").expect("lib.rs listed");
        assert!(b_index < src_index, "walk should be sorted by name");
    }

    #[test]
    fn read_files_reads_plain_entries_in_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("one.txt"), "first").expect("one.txt");
        fs::write(dir.path().join("two.txt"), "second").expect("two.txt");

        let block = read_files(dir.path(), "two.txt,one.txt").expect("read should succeed");
        assert_eq!(
            block,
            "File: two.txt\nContent:\nsecond\n\nFile: one.txt\nContent:\nfirst\n\n"
        );
    }

    #[test]
    fn read_files_expands_glob_entries() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("a.md"), "alpha").expect("a.md");
        fs::write(dir.path().join("b.md"), "beta").expect("b.md");
        fs::write(dir.path().join("c.txt"), "gamma").expect("c.txt");

        let block = read_files(dir.path(), "*.md").expect("glob should succeed");
        assert!(block.contains("alpha"));
        assert!(block.contains("beta"));
        assert!(!block.contains("gamma"));
    }

    #[test]
    fn read_files_glob_without_matches_adds_nothing() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let block = read_files(dir.path(), "*.none").expect("empty glob should succeed");
        assert!(block.is_empty());
    }

    #[test]
    fn missing_file_aborts_resolution_and_names_path() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let err = resolve_prompt_config_in(
            &demo_config(),
            &PromptOverrides {
                files: Some("absent.txt".to_string()),
                ..preset("demo")
            },
            dir.path(),
        )
        .expect_err("missing file should fail");

        match err {
            PromptError::FileRead { path, .. } => assert!(path.ends_with("absent.txt")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn split_list_keeps_entries_verbatim() {
        assert_eq!(split_list("a.png, b.png"), vec!["a.png", " b.png"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn build_user_message_joins_flag_args_and_stdin() {
        let message = build_user_message(
            Some("explain".to_string()),
            &["this".to_string(), "code".to_string()],
            Some("  fn main() {}\n".to_string()),
        );
        assert_eq!(message.as_deref(), Some("explain this code fn main() {}"));
    }

    #[test]
    fn build_user_message_is_none_without_input() {
        assert_eq!(build_user_message(None, &[], None), None);
        assert_eq!(
            build_user_message(Some(String::new()), &[], Some("  \n".to_string())),
            None
        );
    }
}
