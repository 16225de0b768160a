//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the
//! appropriate commands.

pub mod model_list;
pub mod provider_list;

use std::error::Error;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::model_list::list_models;
use crate::cli::provider_list::list_providers;
use crate::core::config::Config;
use crate::core::providers::find_builtin_provider;
use crate::core::session::Session;
use crate::shell;

#[derive(Parser)]
#[command(name = "causerie")]
#[command(about = "A terminal chat client for LLM providers")]
#[command(
    long_about = "Causerie is a terminal chat client that connects to LLM providers for \
interactive conversations. Providers and models can be switched mid-session \
and transcripts saved as JSON or Markdown.\n\n\
Credentials come from the provider's environment variable:\n\
  OPENAI_API_KEY        OpenAI\n\
  ANTHROPIC_API_KEY     Anthropic\n\
  OPENROUTER_API_KEY    OpenRouter\n\n\
In-session commands:\n\
  /provider <id>        Switch provider\n\
  /model <id>           Switch model\n\
  /save [title]         Save the transcript\n\
  /help                 Show all commands"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Provider to use
    #[arg(short = 'p', long, global = true, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// System prompt for this session
    #[arg(short = 's', long, global = true, value_name = "TEXT")]
    pub system: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat shell (default)
    Chat,
    /// List the built-in providers
    Providers,
    /// List the models selectable for a provider
    Models {
        /// Provider to list models for (defaults to all)
        provider: Option<String>,
    },
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key
        #[arg(trailing_var_arg = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
        /// Value to unset for the key (optional)
        value: Option<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Providers => {
            list_providers();
            Ok(())
        }
        Commands::Models { provider } => list_models(provider.or(args.provider)),
        Commands::Set { key, value } => handle_set(&key, &value),
        Commands::Unset { key, value } => handle_unset(&key, value.as_deref()),
        Commands::Chat => {
            let config = Config::load()?;
            let mut session_config =
                config.session_config(args.provider.as_deref(), args.model.as_deref())?;
            if args.system.is_some() {
                session_config.system_prompt = args.system;
            }

            let session = Session::new(session_config)?;
            shell::run(session).await
        }
    }
}

fn handle_set(key: &str, value: &[String]) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    match key {
        "default-provider" => {
            let Some(provider) = value.first() else {
                eprintln!("⚠️  To set a default provider, specify one:");
                eprintln!("Example: causerie set default-provider openai");
                return Ok(());
            };
            if find_builtin_provider(provider).is_none() {
                eprintln!("❌ Unknown provider: {provider}");
                std::process::exit(1);
            }
            config.default_provider = Some(provider.clone());
            config.save()?;
            println!("✅ Set default-provider to: {provider}");
        }
        "default-model" => {
            if let [provider, model] = value {
                config.set_default_model(provider.clone(), model.clone());
                config.save()?;
                println!("✅ Set default-model for provider '{provider}' to: {model}");
            } else {
                eprintln!("⚠️  To set a default model, specify the provider and model:");
                eprintln!("Example: causerie set default-model openai gpt-4o");
            }
        }
        _ => {
            eprintln!("❌ Unknown config key: {key}");
            std::process::exit(1);
        }
    }
    Ok(())
}

fn handle_unset(key: &str, value: Option<&str>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    match key {
        "default-provider" => {
            config.default_provider = None;
            config.save()?;
            println!("✅ Unset default-provider");
        }
        "default-model" => {
            if let Some(provider) = value {
                config.unset_default_model(provider);
                config.save()?;
                println!("✅ Unset default-model for provider: {provider}");
            } else {
                eprintln!("⚠️  To unset a default model, specify the provider:");
                eprintln!("Example: causerie unset default-model openai");
            }
        }
        _ => {
            eprintln!("❌ Unknown config key: {key}");
            std::process::exit(1);
        }
    }
    Ok(())
}
