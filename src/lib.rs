//! Causerie is a terminal chat client for conversing with remote LLM APIs.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns session state: the live provider configuration, the
//!   provider/model registry, and the session service that binds them.
//! - [`api`] defines provider wire payloads and the bound client that
//!   performs completion calls.
//! - [`transcript`] persists conversations to disk as JSON or Markdown.
//! - [`shell`] runs the interactive line-oriented loop that owns the
//!   conversation and drives the core.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod shell;
pub mod transcript;
pub mod utils;
