//! Transcript persistence.
//!
//! Each save produces one uniquely named, write-once file; there is no
//! index or manifest. Writes go through a temp file in the target
//! directory and are renamed into place, so readers never observe a
//! partial transcript.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::config::{SaveFormat, SessionConfig};
use crate::core::message::Message;

pub const SAVE_DIR_ENV: &str = "CAUSERIE_SAVE_DIR";
const DEFAULT_SAVE_DIR: &str = "transcripts";

/// Filesystem or encoding failure during a transcript save, naming the
/// path that was being written.
#[derive(Debug)]
pub enum SaveError {
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    Serialize {
        path: PathBuf,
        source: serde_json::Error,
    },
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    Persist {
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveError::CreateDir { path, source } => {
                write!(
                    f,
                    "Failed to create transcript directory at {}: {}",
                    path.display(),
                    source
                )
            }
            SaveError::Serialize { path, source } => {
                write!(
                    f,
                    "Failed to encode transcript for {}: {}",
                    path.display(),
                    source
                )
            }
            SaveError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write transcript at {}: {}",
                    path.display(),
                    source
                )
            }
            SaveError::Persist { path, source } => {
                write!(
                    f,
                    "Failed to persist transcript at {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl StdError for SaveError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            SaveError::CreateDir { source, .. } => Some(source),
            SaveError::Serialize { source, .. } => Some(source),
            SaveError::Write { source, .. } => Some(source),
            SaveError::Persist { source, .. } => Some(source),
        }
    }
}

#[derive(Serialize)]
struct TranscriptDocument<'a> {
    timestamp: String,
    provider: &'a str,
    model: &'a str,
    messages: &'a [Message],
}

/// Serialize the conversation under the config's save settings and write
/// it to a fresh file, returning the path.
pub fn save_transcript(
    conversation: &[Message],
    config: &SessionConfig,
    title: Option<&str>,
) -> Result<PathBuf, SaveError> {
    let dir = resolve_save_directory(config.save_directory.as_deref());
    fs::create_dir_all(&dir).map_err(|source| SaveError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    let now = Utc::now();
    let path = dir.join(transcript_file_name(now, title, config.save_format));

    let body = match config.save_format {
        SaveFormat::Json => render_json(conversation, config, now, &path)?,
        SaveFormat::Markdown => render_markdown(conversation, config, now),
    };

    write_atomic(&dir, &path, &body)?;
    debug!(path = %path.display(), format = config.save_format.as_str(), "transcript saved");
    Ok(path)
}

/// Target directory for saves: the explicit config value wins, then the
/// environment override, then a relative `transcripts` directory.
fn resolve_save_directory(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    std::env::var(SAVE_DIR_ENV)
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE_DIR))
}

/// `<timestamp>[-<slug>]-chat.<ext>`, with ':' and '.' in the timestamp
/// replaced so the name is safe on every filesystem.
fn transcript_file_name(now: DateTime<Utc>, title: Option<&str>, format: SaveFormat) -> String {
    let timestamp = now
        .to_rfc3339_opts(SecondsFormat::Secs, true)
        .replace([':', '.'], "-");
    let ext = format.extension();

    match title.map(str::trim).filter(|t| !t.is_empty()) {
        Some(title) => format!("{}-{}-chat.{}", timestamp, slugify(title), ext),
        None => format!("{}-chat.{}", timestamp, ext),
    }
}

/// Lowercase the title and replace everything outside `[a-z0-9]` with `-`.
fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn render_json(
    conversation: &[Message],
    config: &SessionConfig,
    now: DateTime<Utc>,
    path: &Path,
) -> Result<String, SaveError> {
    let document = TranscriptDocument {
        timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        provider: &config.provider,
        model: &config.model,
        messages: conversation,
    };

    let mut body = serde_json::to_string_pretty(&document).map_err(|source| {
        SaveError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    body.push('\n');
    Ok(body)
}

fn render_markdown(conversation: &[Message], config: &SessionConfig, now: DateTime<Utc>) -> String {
    let mut doc = String::new();
    doc.push_str(&format!(
        "# Chat transcript - {}\n\n",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    doc.push_str(&format!("Model: {} ({})\n\n", config.model, config.provider));

    if let Some(prompt) = config.system_prompt.as_deref() {
        push_section(&mut doc, "System", prompt);
    }
    for message in conversation {
        push_section(&mut doc, message.role.display_name(), &message.content);
    }

    doc
}

fn push_section(doc: &mut String, heading: &str, content: &str) {
    doc.push_str(&format!("## {}\n\n{}\n\n---\n\n", heading, content));
}

fn write_atomic(dir: &Path, path: &Path, body: &str) -> Result<(), SaveError> {
    let write_err = |source| SaveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut temp_file = NamedTempFile::new_in(dir).map_err(write_err)?;
    temp_file.write_all(body.as_bytes()).map_err(write_err)?;
    temp_file.as_file_mut().sync_all().map_err(write_err)?;
    temp_file.persist(path).map_err(|source| SaveError::Persist {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
