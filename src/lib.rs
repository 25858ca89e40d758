pub mod cli;
pub mod commands;
pub mod config;
pub mod history;
pub mod logging;
pub mod message;
pub mod model_gateway;
pub mod prompt;
pub mod providers;
pub mod repl;
pub mod resources;
pub mod session;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::Parser;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use cli::{Options, non_empty};
use commands::{poll_policy, run_resource_commands};
use config::{ConfigDocument, RuntimeSettings, load_configuration};
use history::{auto_history_name, load_conversation_history, render_history, resolve_history_path};
use message::create_messages;
use prompt::{build_user_message, resolve_prompt_config};
use providers::OpenAiClient;
use session::ChatSession;

pub async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let options = Options::parse();
    let _log_guard = logging::init(options.debug);

    if options.version {
        println!("gpt-cli {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let settings = RuntimeSettings::from_env();
    let config = load_configuration(options.config.as_deref())
        .context("failed to load configuration")?;
    let log_dir = config.log_directory();
    info!(
        api_base_url = %settings.api_base_url,
        api_key_set = settings.api_key.is_some(),
        timeout_secs = options.timeout,
        log_dir = %log_dir.display(),
        poll_interval_ms = settings.poll_interval.as_millis() as u64,
        poll_deadline_secs = settings.poll_deadline.as_secs(),
        "loaded runtime configuration"
    );

    if let Some(name) = non_empty(&options.show_history) {
        return show_history(&log_dir, &name);
    }

    if options.has_resource_command() {
        let client = OpenAiClient::new(&settings, options.timeout)?;
        let mut input = io::stdin().lock();
        let mut out = io::stdout().lock();
        return run_resource_commands(
            &client,
            &options,
            &config,
            poll_policy(&settings),
            &mut input,
            &mut out,
        )
        .await;
    }

    run_chat(&options, &config, &settings, &log_dir).await
}

fn show_history(log_dir: &Path, name: &str) -> Result<()> {
    let path = resolve_history_path(log_dir, name);
    let messages = load_conversation_history(&path)
        .with_context(|| format!("failed to show history {}", path.display()))?;
    print!("{}", render_history(&messages));
    Ok(())
}

async fn run_chat(
    options: &Options,
    config: &ConfigDocument,
    settings: &RuntimeSettings,
    log_dir: &Path,
) -> Result<()> {
    let mut overrides = options.prompt_overrides();
    let piped = read_piped_stdin()?;
    overrides.user = build_user_message(overrides.user.take(), &options.args, piped);

    let prompt = resolve_prompt_config(config, &overrides)?;
    let messages = create_messages(&prompt)?;
    if messages.is_empty() {
        bail!("nothing to send: give a prompt preset, --user text, arguments or stdin input");
    }
    debug!(
        model = %prompt.model,
        message_count = messages.len(),
        "built prompt messages"
    );

    let client = OpenAiClient::new(settings, options.timeout)?;
    let history_path = history_path(options, config, log_dir);
    let mut session = ChatSession::open(&client, history_path)?;
    let reply = session.run_turn(&prompt, messages).await?;
    println!("{}", reply.trim());
    Ok(())
}

/// `--history` under the log directory, else a timestamped name when
/// `autoSaveLogs` is on.
fn history_path(options: &Options, config: &ConfigDocument, log_dir: &Path) -> Option<PathBuf> {
    if let Some(name) = non_empty(&options.history) {
        return Some(resolve_history_path(log_dir, &name));
    }
    if config.auto_save_logs {
        return Some(log_dir.join(auto_history_name(Local::now())));
    }
    None
}

fn read_piped_stdin() -> Result<Option<String>> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }
    let mut input = String::new();
    stdin
        .read_to_string(&mut input)
        .context("failed to read stdin")?;
    Ok(Some(input))
}
