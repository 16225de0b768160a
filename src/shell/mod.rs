//! Line-oriented chat shell.
//!
//! The shell owns the conversation: it appends the user message before a
//! send and the assistant reply after one, and hands the whole history to
//! the session service on every call. Core failures become status lines;
//! the loop survives all of them.

use std::io::Write as _;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::core::config::{
    coerce_max_tokens, coerce_temperature, ConfigPatch, SaveFormat, SessionConfig,
};
use crate::core::message::Message;
use crate::core::session::Session;

const HELP: &str = "\
Commands:
  /provider <id>      Switch provider (the model follows the registry)
  /model <id>         Switch model
  /temperature <t>    Set the sampling temperature
  /max-tokens <n>     Set the completion token cap
  /system [text]      Set the system prompt, or clear it with no text
  /format <fmt>       Transcript format: json or markdown
  /directory <path>   Transcript directory
  /save [title]       Save the transcript
  /config             Show the current configuration
  /help               Show this help
  /quit               Exit";

#[derive(Debug, Clone, PartialEq)]
pub enum ShellCommand {
    Send(String),
    Update(ConfigPatch),
    Save(Option<String>),
    ShowConfig,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse_command(line: &str) -> ShellCommand {
    let line = line.trim();
    if line.is_empty() {
        return ShellCommand::Empty;
    }
    if !line.starts_with('/') {
        return ShellCommand::Send(line.to_string());
    }

    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "/quit" | "/exit" => ShellCommand::Quit,
        "/help" => ShellCommand::Help,
        "/config" => ShellCommand::ShowConfig,
        "/save" => ShellCommand::Save(non_empty(rest)),
        "/provider" => require_arg(command, rest, |value| ConfigPatch {
            provider: Some(value.to_string()),
            ..Default::default()
        }),
        "/model" => require_arg(command, rest, |value| ConfigPatch {
            model: Some(value.to_string()),
            ..Default::default()
        }),
        "/temperature" => require_arg(command, rest, |value| ConfigPatch {
            temperature: Some(coerce_temperature(value)),
            ..Default::default()
        }),
        "/max-tokens" => require_arg(command, rest, |value| ConfigPatch {
            max_tokens: Some(coerce_max_tokens(value)),
            ..Default::default()
        }),
        "/system" => ShellCommand::Update(ConfigPatch {
            system_prompt: Some(non_empty(rest)),
            ..Default::default()
        }),
        "/format" => require_arg(command, rest, |value| ConfigPatch {
            save_format: Some(SaveFormat::from_str(value)),
            ..Default::default()
        }),
        "/directory" => require_arg(command, rest, |value| ConfigPatch {
            save_directory: Some(value.into()),
            ..Default::default()
        }),
        _ => ShellCommand::Invalid(format!("Unknown command: {command} (try /help)")),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn require_arg(
    command: &str,
    rest: &str,
    build: impl FnOnce(&str) -> ConfigPatch,
) -> ShellCommand {
    if rest.is_empty() {
        ShellCommand::Invalid(format!("Usage: {command} <value>"))
    } else {
        ShellCommand::Update(build(rest))
    }
}

fn print_config(config: &SessionConfig) {
    println!("  provider: {}", config.provider);
    println!("  model: {}", config.model);
    println!("  temperature: {}", config.temperature);
    println!("  max-tokens: {}", config.max_tokens);
    println!(
        "  system prompt: {}",
        config.system_prompt.as_deref().unwrap_or("(none)")
    );
    match &config.save_directory {
        Some(dir) => println!("  save directory: {}", dir.display()),
        None => println!("  save directory: (default)"),
    }
    println!("  save format: {}", config.save_format.as_str());
}

pub async fn run(mut session: Session) -> Result<(), Box<dyn std::error::Error>> {
    let config = session.config();
    println!("Chatting with {} ({})", config.model, config.provider);
    println!("Type a message to send it, /help for commands, /quit to exit");

    let mut conversation: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_command(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Quit => break,
            ShellCommand::Help => println!("{HELP}"),
            ShellCommand::ShowConfig => print_config(&session.config()),
            ShellCommand::Invalid(status) => println!("{status}"),
            ShellCommand::Save(title) => match session.save(&conversation, title.as_deref()) {
                Ok(path) => println!("✅ Saved transcript to {}", path.display()),
                Err(e) => println!("❌ {e}"),
            },
            ShellCommand::Update(patch) => match session.update(&patch) {
                Ok(()) => {
                    let config = session.config();
                    println!("Now chatting with {} ({})", config.model, config.provider);
                }
                Err(e) => println!("❌ {e}"),
            },
            ShellCommand::Send(text) => {
                conversation.push(Message::user(text));
                match session.send(&conversation).await {
                    Ok(reply) => {
                        println!("\n{reply}\n");
                        conversation.push(Message::assistant(reply));
                    }
                    Err(e) => println!("❌ {e}"),
                }
            }
        }
    }

    Ok(())
}
